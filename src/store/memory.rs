// src/store/memory.rs

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{ensure_queryable, PendingFilter, RecordStore, Table, UpsertOutcome};
use crate::models::ReviewStatus;

/// In-memory [`RecordStore`] with the same conflict and pattern semantics
/// as the Postgres implementation
///
/// Backs unit and integration tests; no persistence.
pub struct MemoryStore {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Loads typed records straight into a table, bypassing conflict checks
    pub async fn seed<T: Serialize>(&self, table: Table, records: &[T]) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table).or_default();
        for record in records {
            rows.push(super::to_row(record)?);
        }
        Ok(())
    }

    /// Snapshot of every row in a table, for assertions
    pub async fn dump(&self, table: Table) -> Vec<Value> {
        let tables = self.tables.lock().await;
        tables.get(&table).cloned().unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn field_str<'a>(row: &'a Value, field: &str) -> Option<&'a str> {
    row.get(field).and_then(Value::as_str)
}

/// SQL LIKE over `%` wildcards, case-insensitive; no wildcard means exact
/// case-insensitive equality
fn like_matches(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    if !pattern.contains('%') {
        return pattern == text;
    }

    let segments: Vec<&str> = pattern.split('%').collect();
    let last = segments.len() - 1;
    let mut pos = 0usize;
    for (i, seg) in segments.iter().enumerate() {
        if seg.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(seg) {
                return false;
            }
            pos = seg.len();
        } else if i == last {
            return text[pos..].ends_with(seg);
        } else {
            match text[pos..].find(seg) {
                Some(found) => pos = pos + found + seg.len(),
                None => return false,
            }
        }
    }
    true
}

fn is_pending(row: &Value) -> bool {
    field_str(row, "status") == Some(ReviewStatus::Pending.as_str())
}

fn matches_filter(row: &Value, filter: &PendingFilter) -> bool {
    if let Some(entity_type) = filter.entity_type {
        if field_str(row, "entity_type") != Some(entity_type.as_str()) {
            return false;
        }
    }
    if let Some(issue_type) = filter.issue_type {
        if field_str(row, "issue_type") != Some(issue_type.as_str()) {
            return false;
        }
    }
    if let Some(domain) = &filter.domain {
        let matched = field_str(row, "domain")
            .map(|d| d.eq_ignore_ascii_case(domain))
            .unwrap_or(false);
        if !matched {
            return false;
        }
    }
    if let Some(entity_id) = &filter.entity_id {
        if field_str(row, "entity_id") != Some(entity_id.0.as_str()) {
            return false;
        }
    }
    if let Some(involving) = &filter.involving {
        let id = involving.0.as_str();
        if field_str(row, "source_id") != Some(id) && field_str(row, "duplicate_id") != Some(id) {
            return false;
        }
    }
    true
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_by_exact_field(
        &self,
        table: Table,
        field: &str,
        values: &[String],
    ) -> Result<Vec<Value>> {
        ensure_queryable(table, field)?;
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.lock().await;
        let rows = tables.get(&table).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| {
                field_str(row, field)
                    .map(|v| values.iter().any(|wanted| wanted == v))
                    .unwrap_or(false)
            })
            .collect())
    }

    async fn find_by_pattern(
        &self,
        table: Table,
        field: &str,
        pattern: &str,
        limit: i64,
    ) -> Result<Vec<Value>> {
        ensure_queryable(table, field)?;
        let cap = usize::try_from(limit).unwrap_or(usize::MAX);
        let tables = self.tables.lock().await;
        let rows = tables.get(&table).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| {
                field_str(row, field)
                    .map(|v| like_matches(pattern, v))
                    .unwrap_or(false)
            })
            .take(cap)
            .collect())
    }

    async fn upsert(
        &self,
        table: Table,
        record: Value,
        conflict_key: &[&str],
    ) -> Result<UpsertOutcome> {
        if !record.is_object() {
            bail!("Store rows must be JSON objects");
        }
        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table).or_default();

        if !conflict_key.is_empty() {
            let existing = rows.iter().find(|row| {
                if table.pending_scoped_conflicts() && !is_pending(row) {
                    return false;
                }
                conflict_key
                    .iter()
                    .all(|key| row.get(*key) == record.get(*key))
            });
            if let Some(row) = existing {
                return Ok(UpsertOutcome {
                    row: row.clone(),
                    inserted: false,
                });
            }
        }

        rows.push(record.clone());
        Ok(UpsertOutcome {
            row: record,
            inserted: true,
        })
    }

    async fn insert(&self, table: Table, record: Value) -> Result<Value> {
        if !record.is_object() {
            bail!("Store rows must be JSON objects");
        }
        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table).or_default();
        if let Some(id) = field_str(&record, "id") {
            if rows.iter().any(|row| field_str(row, "id") == Some(id)) {
                bail!("Duplicate id '{}' in table '{}'", id, table.name());
            }
        }
        rows.push(record.clone());
        Ok(record)
    }

    async fn update_status(
        &self,
        table: Table,
        id: &str,
        status: ReviewStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<Value> {
        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table).or_default();
        let row = rows
            .iter_mut()
            .find(|row| field_str(row, "id") == Some(id))
            .with_context(|| format!("No row with id '{}' in table '{}'", id, table.name()))?;

        let object = row
            .as_object_mut()
            .with_context(|| format!("Row '{}' in '{}' is not an object", id, table.name()))?;
        object.insert(
            "status".to_string(),
            Value::String(status.as_str().to_string()),
        );
        if status.is_terminal() {
            object.insert("resolved_at".to_string(), serde_json::to_value(timestamp)?);
        }
        Ok(row.clone())
    }

    async fn patch_row(&self, table: Table, id: &str, patch: Value) -> Result<Value> {
        let patch = match patch {
            Value::Object(map) => map,
            _ => bail!("Patch must be a JSON object"),
        };
        let keys: Vec<&str> = patch.keys().map(String::as_str).collect();
        if keys.is_empty() {
            bail!("Patch must name at least one column");
        }
        super::ensure_columns(table, &keys)?;

        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table).or_default();
        let row = rows
            .iter_mut()
            .find(|row| field_str(row, "id") == Some(id))
            .with_context(|| format!("No row with id '{}' in table '{}'", id, table.name()))?;
        let object = row
            .as_object_mut()
            .with_context(|| format!("Row '{}' in '{}' is not an object", id, table.name()))?;
        for (key, value) in patch {
            object.insert(key, value);
        }
        Ok(row.clone())
    }

    async fn list_pending(&self, table: Table, filter: &PendingFilter) -> Result<Vec<Value>> {
        let tables = self.tables.lock().await;
        let rows = tables.get(&table).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| is_pending(row) && matches_filter(row, filter))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_like_matches_wildcards() {
        assert!(like_matches("%acme%", "The ACME Company"));
        assert!(like_matches("foo.%", "foo.com"));
        assert!(like_matches("%.foo.com", "mail.foo.com"));
        assert!(like_matches("%", "anything"));
        assert!(!like_matches("foo.%", "barfoo.com"));
        assert!(!like_matches("%acme%", "emca"));
    }

    #[test]
    fn test_like_without_wildcard_is_exact_case_insensitive() {
        assert!(like_matches("Acme Corp", "acme corp"));
        assert!(!like_matches("Acme", "Acme Corp"));
    }

    #[tokio::test]
    async fn test_upsert_pending_scope() {
        let store = MemoryStore::new();
        let pending = json!({"id": "1", "source_id": "a", "duplicate_id": "b",
            "entity_type": "contact", "status": "pending"});
        let outcome = store
            .upsert(
                Table::DuplicatePairs,
                pending,
                &["source_id", "duplicate_id", "entity_type"],
            )
            .await
            .unwrap();
        assert!(outcome.inserted);

        // Same key while pending: the existing row comes back.
        let again = json!({"id": "2", "source_id": "a", "duplicate_id": "b",
            "entity_type": "contact", "status": "pending"});
        let outcome = store
            .upsert(
                Table::DuplicatePairs,
                again.clone(),
                &["source_id", "duplicate_id", "entity_type"],
            )
            .await
            .unwrap();
        assert!(!outcome.inserted);
        assert_eq!(outcome.row["id"], "1");

        // After the first row leaves pending, the same key inserts fresh.
        store
            .update_status(Table::DuplicatePairs, "1", ReviewStatus::Dismissed, Utc::now())
            .await
            .unwrap();
        let outcome = store
            .upsert(
                Table::DuplicatePairs,
                again,
                &["source_id", "duplicate_id", "entity_type"],
            )
            .await
            .unwrap();
        assert!(outcome.inserted);
    }

    #[tokio::test]
    async fn test_update_status_stamps_resolved_at() {
        let store = MemoryStore::new();
        store
            .insert(
                Table::IntegrityIssues,
                json!({"id": "i1", "status": "pending"}),
            )
            .await
            .unwrap();
        let row = store
            .update_status(Table::IntegrityIssues, "i1", ReviewStatus::Resolved, Utc::now())
            .await
            .unwrap();
        assert_eq!(row["status"], "resolved");
        assert!(row["resolved_at"].is_string());
    }

    #[tokio::test]
    async fn test_patch_row_overwrites_named_columns() {
        let store = MemoryStore::new();
        store
            .insert(
                Table::DuplicatePairs,
                json!({"id": "1", "source_id": "a", "duplicate_id": "b",
                    "entity_type": "contact", "status": "pending", "false_positive": false}),
            )
            .await
            .unwrap();

        let row = store
            .patch_row(
                Table::DuplicatePairs,
                "1",
                json!({"status": "ignored", "false_positive": true, "notes": "nope"}),
            )
            .await
            .unwrap();
        assert_eq!(row["status"], "ignored");
        assert_eq!(row["false_positive"], true);
        assert_eq!(row["source_id"], "a");

        let bad = store
            .patch_row(Table::DuplicatePairs, "1", json!({"nonsense": 1}))
            .await;
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_list_pending_filters() {
        let store = MemoryStore::new();
        store
            .insert(
                Table::IntegrityIssues,
                json!({"id": "i1", "status": "pending", "issue_type": "potential_company_match",
                    "entity_type": "company", "domain": "Foo.com"}),
            )
            .await
            .unwrap();
        store
            .insert(
                Table::IntegrityIssues,
                json!({"id": "i2", "status": "resolved", "issue_type": "potential_company_match",
                    "entity_type": "company", "domain": "foo.com"}),
            )
            .await
            .unwrap();

        let filter = PendingFilter {
            issue_type: Some(crate::models::IssueType::PotentialCompanyMatch),
            domain: Some("foo.com".to_string()),
            ..Default::default()
        };
        let rows = store
            .list_pending(Table::IntegrityIssues, &filter)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "i1");
    }
}
