// src/models/mod.rs

pub mod core;
pub mod issues;
pub mod matching;

pub use self::core::{
    CompanyDomainRow, CompanyId, CompanyIdentifiers, CompanyRecord, ContactEmailRow, ContactId,
    ContactIdentifiers, ContactMobileRow, ContactRecord, EntityId, EntityType,
};
pub use issues::{
    DuplicatePair, IntegrityIssue, IssueDraft, IssueType, MergeIntent, MergeSelections,
    MergeStrategy, ReviewStatus,
};
pub use matching::{MatchCandidate, MatchType};
