// src/store/mod.rs
//
// Storage boundary for the engine. Rows cross this seam as JSON objects
// keyed by column name; typed models (de)serialize through them with serde.

pub mod memory;
pub mod postgres;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::models::{EntityId, EntityType, IssueType, ReviewStatus};

/// Tables the engine reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Contacts,
    ContactEmails,
    ContactMobiles,
    Companies,
    CompanyDomains,
    DuplicatePairs,
    IntegrityIssues,
    MergeIntents,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::ContactEmails => "contact_emails",
            Self::ContactMobiles => "contact_mobiles",
            Self::Companies => "companies",
            Self::CompanyDomains => "company_domains",
            Self::DuplicatePairs => "duplicate_pairs",
            Self::IntegrityIssues => "integrity_issues",
            Self::MergeIntents => "merge_intents",
        }
    }

    /// Columns addressable through field-based lookups. Queries naming any
    /// other column are rejected before reaching the backend.
    pub fn queryable_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Contacts => &["id", "first_name", "last_name", "linkedin"],
            Self::ContactEmails => &["contact_id", "email"],
            Self::ContactMobiles => &["contact_id", "mobile"],
            Self::Companies => &["id", "name", "linkedin", "website"],
            Self::CompanyDomains => &["company_id", "domain"],
            Self::DuplicatePairs => &["id", "source_id", "duplicate_id"],
            Self::IntegrityIssues => &["id", "natural_key", "entity_id", "domain", "email"],
            Self::MergeIntents => &["id", "primary_id", "duplicate_id"],
        }
    }

    /// Every column of the table, in schema order. Conflict keys are
    /// validated against this list before being spliced into SQL.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Contacts => &[
                "id",
                "first_name",
                "last_name",
                "linkedin",
                "category",
                "created_at",
            ],
            Self::ContactEmails => &["contact_id", "email", "is_primary"],
            Self::ContactMobiles => &["contact_id", "mobile", "is_primary"],
            Self::Companies => &[
                "id",
                "name",
                "linkedin",
                "website",
                "category",
                "created_at",
            ],
            Self::CompanyDomains => &["company_id", "domain", "is_primary", "created_at"],
            Self::DuplicatePairs => &[
                "id",
                "source_id",
                "duplicate_id",
                "entity_type",
                "match_type",
                "match_details",
                "status",
                "false_positive",
                "notes",
                "created_at",
                "resolved_at",
            ],
            Self::IntegrityIssues => &[
                "id",
                "issue_type",
                "entity_type",
                "entity_id",
                "name",
                "email",
                "mobile",
                "domain",
                "details",
                "natural_key",
                "status",
                "created_at",
                "resolved_at",
            ],
            Self::MergeIntents => &[
                "id",
                "primary_id",
                "duplicate_id",
                "entity_type",
                "merge_selections",
                "triggered",
                "status",
                "notes",
                "created_at",
            ],
        }
    }

    /// Lifecycle tables scope upsert conflicts to pending rows; everywhere
    /// else a conflict key spans the whole table.
    pub fn pending_scoped_conflicts(&self) -> bool {
        matches!(self, Self::DuplicatePairs | Self::IntegrityIssues)
    }
}

/// Checks that every conflict-key member is a real column of the table
pub fn ensure_columns(table: Table, fields: &[&str]) -> Result<()> {
    for field in fields {
        if !table.columns().contains(field) {
            bail!(
                "Column '{}' does not exist on table '{}'",
                field,
                table.name()
            );
        }
    }
    Ok(())
}

/// Checks a field name against the table's queryable column list
pub fn ensure_queryable(table: Table, field: &str) -> Result<()> {
    if table.queryable_fields().contains(&field) {
        Ok(())
    } else {
        bail!(
            "Field '{}' is not queryable on table '{}'",
            field,
            table.name()
        )
    }
}

/// Result of an upsert: the stored row plus whether it was newly inserted
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub row: Value,
    pub inserted: bool,
}

/// Row filter for `list_pending`
///
/// All fields are optional and conjunctive. `entity_id` addresses the issue
/// table's subject column; `involving` matches either side of a duplicate
/// pair.
#[derive(Debug, Clone, Default)]
pub struct PendingFilter {
    pub entity_type: Option<EntityType>,
    pub issue_type: Option<IssueType>,

    /// Case-insensitive equality on the issue `domain` column
    pub domain: Option<String>,

    pub entity_id: Option<EntityId>,
    pub involving: Option<EntityId>,
}

/// Abstract store consumed by every engine component
///
/// Implemented by `PgStore` (postgres) and `MemoryStore` (tests). The
/// engine performs no other I/O.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows whose `field` equals any of `values`
    async fn find_by_exact_field(
        &self,
        table: Table,
        field: &str,
        values: &[String],
    ) -> Result<Vec<Value>>;

    /// Rows whose `field` matches `pattern` under SQL LIKE semantics,
    /// case-insensitively; `%` is the wildcard, and a pattern without
    /// wildcards is an exact case-insensitive probe. At most `limit` rows
    /// come back.
    async fn find_by_pattern(
        &self,
        table: Table,
        field: &str,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<Value>>;

    /// Inserts `record`; when a row conflicting on `conflict_key` already
    /// exists, returns that row instead of inserting. Conflict scope is
    /// pending rows for lifecycle tables (see
    /// [`Table::pending_scoped_conflicts`]), the whole table otherwise.
    async fn upsert(&self, table: Table, record: Value, conflict_key: &[&str])
        -> Result<UpsertOutcome>;

    /// Inserts `record`; key collisions are an error
    async fn insert(&self, table: Table, record: Value) -> Result<Value>;

    /// Transitions the row with `id` to `status`, stamping `resolved_at`
    /// with `timestamp` when the status is terminal, and returns the
    /// updated row
    async fn update_status(
        &self,
        table: Table,
        id: &str,
        status: ReviewStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<Value>;

    /// Applies a partial update to the row with `id`: every top-level key
    /// of the `patch` object overwrites its column. Keys must name real
    /// columns; the updated row is returned.
    async fn patch_row(&self, table: Table, id: &str, patch: Value) -> Result<Value>;

    /// All pending rows of `table` matching `filter`
    async fn list_pending(&self, table: Table, filter: &PendingFilter) -> Result<Vec<Value>>;
}

/// Deserializes one store row into a typed model
pub fn row_to<T: DeserializeOwned>(row: Value) -> Result<T> {
    serde_json::from_value(row).context("Failed to deserialize store row")
}

/// Deserializes a batch of store rows
pub fn rows_to<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter().map(row_to).collect()
}

/// Serializes a typed model into a store row
pub fn to_row<T: Serialize>(value: &T) -> Result<Value> {
    let row = serde_json::to_value(value).context("Failed to serialize record into store row")?;
    if !row.is_object() {
        bail!("Store rows must serialize to JSON objects");
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_queryable_accepts_known_fields() {
        assert!(ensure_queryable(Table::ContactEmails, "email").is_ok());
        assert!(ensure_queryable(Table::CompanyDomains, "domain").is_ok());
    }

    #[test]
    fn test_ensure_queryable_rejects_unknown_fields() {
        assert!(ensure_queryable(Table::Contacts, "password").is_err());
        assert!(ensure_queryable(Table::DuplicatePairs, "match_details").is_err());
    }

    #[test]
    fn test_conflict_scope_per_table() {
        assert!(Table::DuplicatePairs.pending_scoped_conflicts());
        assert!(Table::IntegrityIssues.pending_scoped_conflicts());
        assert!(!Table::MergeIntents.pending_scoped_conflicts());
        assert!(!Table::Contacts.pending_scoped_conflicts());
    }

    #[test]
    fn test_queryable_fields_are_real_columns() {
        let tables = [
            Table::Contacts,
            Table::ContactEmails,
            Table::ContactMobiles,
            Table::Companies,
            Table::CompanyDomains,
            Table::DuplicatePairs,
            Table::IntegrityIssues,
            Table::MergeIntents,
        ];
        for table in tables {
            assert!(ensure_columns(table, table.queryable_fields()).is_ok());
        }
    }

    #[test]
    fn test_ensure_columns_rejects_unknown() {
        assert!(ensure_columns(Table::MergeIntents, &["primary_id", "nope"]).is_err());
    }
}
