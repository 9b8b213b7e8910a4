// src/models/issues.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::core::{EntityId, EntityType};
use super::matching::MatchType;

//------------------------------------------------------------------------------
// LIFECYCLE STATES
//------------------------------------------------------------------------------

/// Review lifecycle shared by duplicate pairs and integrity issues
///
/// `Pending` is the only live state; the other three are terminal. Reopening
/// is not supported; a fresh scan creates a new pending record if the
/// condition recurs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Awaiting operator review
    Pending,

    /// Acted on and fixed (merged, linked, corrected)
    Resolved,

    /// Reviewed and rejected as not a real problem
    Dismissed,

    /// Deliberately left alone without a verdict
    Ignored,
}

impl ReviewStatus {
    /// Converts the enum to a string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
            Self::Ignored => "ignored",
        }
    }

    /// Creates the enum from a string representation
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "resolved" => Self::Resolved,
            "dismissed" => Self::Dismissed,
            "ignored" => Self::Ignored,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Categories of tracked data-quality conditions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// A person seen in correspondence but absent from the store
    NotInCrm,

    /// A record parked by an operator for later attention
    Hold,

    /// A record missing enough fields to be actionable
    Incomplete,

    /// A contact whose employer is known but not linked
    MissingCompanyLink,

    /// A domain seen in the wild with no company owning it
    MissingCompany,

    /// A domain that probably belongs to an existing company
    PotentialCompanyMatch,
}

impl IssueType {
    /// Converts the enum to a string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotInCrm => "not_in_crm",
            Self::Hold => "hold",
            Self::Incomplete => "incomplete",
            Self::MissingCompanyLink => "missing_company_link",
            Self::MissingCompany => "missing_company",
            Self::PotentialCompanyMatch => "potential_company_match",
        }
    }

    /// Creates the enum from a string representation
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "not_in_crm" => Self::NotInCrm,
            "hold" => Self::Hold,
            "missing_company_link" => Self::MissingCompanyLink,
            "missing_company" => Self::MissingCompany,
            "potential_company_match" => Self::PotentialCompanyMatch,
            _ => Self::Incomplete,
        }
    }
}

//------------------------------------------------------------------------------
// DUPLICATE PAIRS
//------------------------------------------------------------------------------

/// A detected duplicate between two records, persisted for operator review
///
/// Stored in canonical order (`source_id` < `duplicate_id` as strings) so
/// that unordered-pair uniqueness is a plain column constraint. At most one
/// pending row exists per (source_id, duplicate_id, entity_type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatePair {
    /// Unique identifier for this pair row
    pub id: String,

    /// Lexically smaller side of the pair
    pub source_id: EntityId,

    /// Lexically larger side of the pair
    pub duplicate_id: EntityId,

    /// Whether the pair is two contacts or two companies
    pub entity_type: EntityType,

    /// The identifier category that produced the detection
    pub match_type: MatchType,

    /// Scan metadata: matched value, reason, similarity when fuzzy
    #[serde(default)]
    pub match_details: Value,

    /// Review lifecycle state
    pub status: ReviewStatus,

    /// Set when an operator dismissed the pair as not-a-duplicate; such
    /// pairs are never re-surfaced by later scans
    #[serde(default)]
    pub false_positive: bool,

    /// Free-form operator or engine note
    #[serde(default)]
    pub notes: Option<String>,

    /// When the pair was first recorded
    pub created_at: DateTime<Utc>,

    /// When the pair left the pending state
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DuplicatePair {
    /// Creates a new pending pair with canonical ordering of the two ids
    pub fn new_canonical(
        a: EntityId,
        b: EntityId,
        entity_type: EntityType,
        match_type: MatchType,
        match_details: Value,
        now: DateTime<Utc>,
    ) -> Self {
        let (source_id, duplicate_id) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        Self {
            id: Uuid::new_v4().to_string(),
            source_id,
            duplicate_id,
            entity_type,
            match_type,
            match_details,
            status: ReviewStatus::Pending,
            false_positive: false,
            notes: None,
            created_at: now,
            resolved_at: None,
        }
    }

    /// True when this row links the two given ids, in either order
    pub fn links(&self, a: &EntityId, b: &EntityId) -> bool {
        (&self.source_id == a && &self.duplicate_id == b)
            || (&self.source_id == b && &self.duplicate_id == a)
    }
}

//------------------------------------------------------------------------------
// INTEGRITY ISSUES
//------------------------------------------------------------------------------

/// Input for reporting a new integrity issue
///
/// Identifier fields are normalized by the tracker before the row is built,
/// so equal conditions produce equal natural keys.
#[derive(Debug, Clone)]
pub struct IssueDraft {
    pub issue_type: IssueType,
    pub entity_type: EntityType,

    /// The affected record; `None` for conditions about records that do not
    /// exist yet (`not_in_crm`, `missing_company`)
    pub entity_id: Option<EntityId>,

    /// Display name of the person or company involved, for the review list
    pub name: Option<String>,

    pub email: Option<String>,
    pub mobile: Option<String>,
    pub domain: Option<String>,

    /// Free-form JSON payload (completeness score, suggested company, ...)
    pub details: Value,
}

impl IssueDraft {
    pub fn new(issue_type: IssueType, entity_type: EntityType) -> Self {
        Self {
            issue_type,
            entity_type,
            entity_id: None,
            name: None,
            email: None,
            mobile: None,
            domain: None,
            details: Value::Null,
        }
    }
}

/// A tracked data-quality condition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityIssue {
    /// Unique identifier for this issue row
    pub id: String,

    pub issue_type: IssueType,
    pub entity_type: EntityType,

    /// The affected record, when it exists in the store
    #[serde(default)]
    pub entity_id: Option<EntityId>,

    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,

    /// Free-form JSON payload
    #[serde(default)]
    pub details: Value,

    /// Dedup key: equal pending conditions collapse onto one row
    pub natural_key: String,

    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl IntegrityIssue {
    /// Builds a pending row from a draft whose identifier fields are already
    /// normalized
    pub fn from_draft(draft: IssueDraft, now: DateTime<Utc>) -> Self {
        let natural_key = Self::natural_key_for(
            draft.issue_type,
            draft.entity_type,
            draft.entity_id.as_ref(),
            draft.domain.as_deref(),
            draft.email.as_deref(),
            draft.mobile.as_deref(),
        );
        Self {
            id: Uuid::new_v4().to_string(),
            issue_type: draft.issue_type,
            entity_type: draft.entity_type,
            entity_id: draft.entity_id,
            name: draft.name,
            email: draft.email,
            mobile: draft.mobile,
            domain: draft.domain,
            details: draft.details,
            natural_key,
            status: ReviewStatus::Pending,
            created_at: now,
            resolved_at: None,
        }
    }

    /// The dedup key: issue type, entity type, entity id and the
    /// distinguishing identifiers, absent parts as empty strings
    pub fn natural_key_for(
        issue_type: IssueType,
        entity_type: EntityType,
        entity_id: Option<&EntityId>,
        domain: Option<&str>,
        email: Option<&str>,
        mobile: Option<&str>,
    ) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            issue_type.as_str(),
            entity_type.as_str(),
            entity_id.map(|id| id.0.as_str()).unwrap_or(""),
            domain.unwrap_or(""),
            email.unwrap_or(""),
            mobile.unwrap_or(""),
        )
    }
}

//------------------------------------------------------------------------------
// MERGE INTENTS
//------------------------------------------------------------------------------

/// How the external merge executor should reconcile one field group
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Union both sides' values
    Combine,

    /// Keep the primary record's values, drop the duplicate's
    KeepPrimary,

    /// Keep the duplicate record's values, drop the primary's
    KeepDuplicate,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Combine => "combine",
            Self::KeepPrimary => "keep_primary",
            Self::KeepDuplicate => "keep_duplicate",
        }
    }
}

/// Per-field-group reconciliation choices for one merge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct MergeSelections(pub BTreeMap<String, MergeStrategy>);

impl MergeSelections {
    /// The field groups subject to selection for each entity kind
    pub fn field_groups(entity_type: EntityType) -> &'static [&'static str] {
        match entity_type {
            EntityType::Contact => &["emails", "mobiles", "companies", "tags", "cities"],
            EntityType::Company => &["contacts", "domains", "tags", "cities"],
        }
    }

    /// Default selections: combine every field group
    pub fn combine_all(entity_type: EntityType) -> Self {
        let map = Self::field_groups(entity_type)
            .iter()
            .map(|group| (group.to_string(), MergeStrategy::Combine))
            .collect();
        Self(map)
    }
}

/// An operator-confirmed instruction to consolidate two records
///
/// One row per (primary_id, duplicate_id, entity_type); re-confirming
/// refreshes that row in place. The external merge executor consumes rows
/// with `triggered` set and performs the actual field reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeIntent {
    /// Unique identifier for this intent row
    pub id: String,

    /// The record that survives the merge
    pub primary_id: EntityId,

    /// The record to be folded into the primary
    pub duplicate_id: EntityId,

    pub entity_type: EntityType,

    /// Reconciliation choice per field group
    pub merge_selections: MergeSelections,

    /// Set on confirmation; the executor picks up triggered pending intents
    pub triggered: bool,

    /// Executor-side lifecycle; written as pending here
    pub status: ReviewStatus,

    #[serde(default)]
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
}
