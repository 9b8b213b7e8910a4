// src/lib.rs
//
// Duplicate-detection and data-integrity engine for CRM contacts and
// companies. Raw identifiers are normalized and scored against an abstract
// record store; detected duplicates and other data-quality conditions are
// tracked through a pending/resolved lifecycle, and operator-confirmed
// merges are written as intents for an external executor.

pub mod issues;
pub mod matching;
pub mod models;
pub mod store;
pub mod utils;

pub use issues::merge::{confirm_merge, dismiss_merge, MergeConfirmation};
pub use issues::tracker::{
    dismiss_issue, ignore_issue, report_issue, report_issues, resolve_issue, BatchReport,
    ReportOutcome,
};
pub use matching::companies::find_company_duplicates;
pub use matching::contacts::find_contact_duplicates;
pub use matching::domain_owner::{
    resolve_best_domain_owner, suggest_company_for_contact, suggest_company_for_domain,
    CompanySuggestion, DomainOwnerCandidate,
};
pub use matching::manager::{scan_company, scan_contact, scan_participants, ScanOutcome};
