// src/issues/merge.rs
//
// Writes the operator's verdict on a duplicate pair. Confirming produces a
// triggered MergeIntent for the external merge executor and resolves the
// underlying pending pair; dismissing retires the pair as a false positive
// so later scans leave it alone. Failures here propagate to the caller: a
// silently lost merge instruction would strand a known duplicate.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde_json::json;
use uuid::Uuid;

use crate::models::{
    DuplicatePair, EntityId, EntityType, MatchType, MergeIntent, MergeSelections, ReviewStatus,
};
use crate::store::{row_to, rows_to, to_row, PendingFilter, RecordStore, Table};

/// Outcome of confirming a merge
#[derive(Debug)]
pub struct MergeConfirmation {
    pub intent: MergeIntent,

    /// False when an intent for this pair already existed and was refreshed
    pub created: bool,

    /// Pending pairs for the two records transitioned to resolved
    pub resolved_pairs: Vec<DuplicatePair>,
}

/// Records the instruction to fold `duplicate_id` into `primary_id`.
///
/// One intent row exists per (primary, duplicate, entity type); confirming
/// again refreshes it in place with the new selections and re-arms the
/// trigger. Without explicit selections every field group is combined.
/// Any pending duplicate pair covering the two records, in either
/// orientation, is marked resolved.
pub async fn confirm_merge(
    store: &dyn RecordStore,
    primary_id: &EntityId,
    duplicate_id: &EntityId,
    entity_type: EntityType,
    match_type: MatchType,
    selections: Option<MergeSelections>,
    now: DateTime<Utc>,
) -> Result<MergeConfirmation> {
    let selections = selections.unwrap_or_else(|| MergeSelections::combine_all(entity_type));
    let notes = format!("From duplicates review: {} match", match_type.as_str());

    let intent = MergeIntent {
        id: Uuid::new_v4().to_string(),
        primary_id: primary_id.clone(),
        duplicate_id: duplicate_id.clone(),
        entity_type,
        merge_selections: selections.clone(),
        triggered: true,
        status: ReviewStatus::Pending,
        notes: Some(notes.clone()),
        created_at: now,
    };
    let result = store
        .upsert(
            Table::MergeIntents,
            to_row(&intent)?,
            &["primary_id", "duplicate_id", "entity_type"],
        )
        .await?;

    let intent: MergeIntent = if result.inserted {
        row_to(result.row)?
    } else {
        let existing: MergeIntent = row_to(result.row)?;
        info!(
            "Refreshing merge intent {} for {} -> {}",
            existing.id, duplicate_id.0, primary_id.0
        );
        let patch = json!({
            "merge_selections": selections,
            "triggered": true,
            "status": ReviewStatus::Pending,
            "notes": notes,
        });
        row_to(
            store
                .patch_row(Table::MergeIntents, &existing.id, patch)
                .await?,
        )?
    };

    let resolved_pairs =
        resolve_covering_pairs(store, primary_id, duplicate_id, entity_type, now).await?;
    Ok(MergeConfirmation {
        intent,
        created: result.inserted,
        resolved_pairs,
    })
}

/// Retires a pending pair as not-a-duplicate. The false-positive flag
/// keeps later scans from re-surfacing the identical pair.
pub async fn dismiss_merge(
    store: &dyn RecordStore,
    pair_id: &str,
    now: DateTime<Utc>,
) -> Result<DuplicatePair> {
    let pair = load_pair(store, pair_id).await?;
    if pair.status.is_terminal() {
        bail!(
            "Pair '{}' is already {} and cannot be dismissed",
            pair_id,
            pair.status.as_str()
        );
    }

    let patch = json!({
        "status": ReviewStatus::Ignored,
        "false_positive": true,
        "notes": format!(
            "Dismissed from duplicates review: {} match",
            pair.match_type.as_str()
        ),
        "resolved_at": now,
    });
    row_to(store.patch_row(Table::DuplicatePairs, pair_id, patch).await?)
}

/// Resolves every pending pair linking the two records, whichever side
/// was stored first
async fn resolve_covering_pairs(
    store: &dyn RecordStore,
    primary_id: &EntityId,
    duplicate_id: &EntityId,
    entity_type: EntityType,
    now: DateTime<Utc>,
) -> Result<Vec<DuplicatePair>> {
    let filter = PendingFilter {
        entity_type: Some(entity_type),
        involving: Some(primary_id.clone()),
        ..Default::default()
    };
    let pending: Vec<DuplicatePair> =
        rows_to(store.list_pending(Table::DuplicatePairs, &filter).await?)?;

    let mut resolved = Vec::new();
    for pair in pending {
        if pair.links(primary_id, duplicate_id) {
            resolved.push(row_to(
                store
                    .update_status(Table::DuplicatePairs, &pair.id, ReviewStatus::Resolved, now)
                    .await?,
            )?);
        }
    }
    Ok(resolved)
}

async fn load_pair(store: &dyn RecordStore, id: &str) -> Result<DuplicatePair> {
    let ids = [id.to_string()];
    let rows = store
        .find_by_exact_field(Table::DuplicatePairs, "id", &ids)
        .await?;
    let row = rows
        .into_iter()
        .next()
        .with_context(|| format!("No duplicate pair with id '{}'", id))?;
    row_to(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MergeStrategy;
    use crate::store::memory::MemoryStore;

    fn pending_pair(a: &str, b: &str) -> DuplicatePair {
        DuplicatePair::new_canonical(
            EntityId(a.to_string()),
            EntityId(b.to_string()),
            EntityType::Contact,
            MatchType::Email,
            json!({"value": "jane@example.com"}),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_confirm_merge_triggers_intent_and_resolves_pair() {
        let store = MemoryStore::new();
        let pair = pending_pair("a", "b");
        store
            .seed(Table::DuplicatePairs, &[pair])
            .await
            .unwrap();

        let confirmation = confirm_merge(
            &store,
            &EntityId("b".to_string()),
            &EntityId("a".to_string()),
            EntityType::Contact,
            MatchType::Email,
            None,
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(confirmation.created);
        assert!(confirmation.intent.triggered);
        assert_eq!(confirmation.intent.status, ReviewStatus::Pending);
        assert_eq!(confirmation.intent.merge_selections.0.len(), 5);
        assert_eq!(
            confirmation.intent.notes.as_deref(),
            Some("From duplicates review: email match")
        );

        assert_eq!(confirmation.resolved_pairs.len(), 1);
        assert_eq!(confirmation.resolved_pairs[0].status, ReviewStatus::Resolved);
        assert!(confirmation.resolved_pairs[0].resolved_at.is_some());

        let still_pending = store
            .list_pending(Table::DuplicatePairs, &PendingFilter::default())
            .await
            .unwrap();
        assert!(still_pending.is_empty());
    }

    #[tokio::test]
    async fn test_reconfirm_refreshes_single_intent() {
        let store = MemoryStore::new();
        let primary = EntityId("b".to_string());
        let duplicate = EntityId("a".to_string());

        let first = confirm_merge(
            &store,
            &primary,
            &duplicate,
            EntityType::Contact,
            MatchType::Email,
            None,
            Utc::now(),
        )
        .await
        .unwrap();

        let mut selections = MergeSelections::combine_all(EntityType::Contact);
        selections
            .0
            .insert("emails".to_string(), MergeStrategy::KeepPrimary);
        let second = confirm_merge(
            &store,
            &primary,
            &duplicate,
            EntityType::Contact,
            MatchType::Email,
            Some(selections),
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(!second.created);
        assert_eq!(second.intent.id, first.intent.id);
        assert_eq!(
            second.intent.merge_selections.0.get("emails"),
            Some(&MergeStrategy::KeepPrimary)
        );

        let rows = store
            .find_by_exact_field(Table::MergeIntents, "primary_id", &["b".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_without_pending_pair_still_writes_intent() {
        let store = MemoryStore::new();
        let confirmation = confirm_merge(
            &store,
            &EntityId("b".to_string()),
            &EntityId("a".to_string()),
            EntityType::Company,
            MatchType::Domain,
            None,
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(confirmation.created);
        assert!(confirmation.resolved_pairs.is_empty());
        assert_eq!(confirmation.intent.merge_selections.0.len(), 4);
    }

    #[tokio::test]
    async fn test_dismiss_merge_marks_false_positive() {
        let store = MemoryStore::new();
        let pair = pending_pair("a", "b");
        let pair_id = pair.id.clone();
        store
            .seed(Table::DuplicatePairs, &[pair])
            .await
            .unwrap();

        let dismissed = dismiss_merge(&store, &pair_id, Utc::now()).await.unwrap();
        assert_eq!(dismissed.status, ReviewStatus::Ignored);
        assert!(dismissed.false_positive);
        assert_eq!(
            dismissed.notes.as_deref(),
            Some("Dismissed from duplicates review: email match")
        );
        assert!(dismissed.resolved_at.is_some());

        assert!(dismiss_merge(&store, &pair_id, Utc::now()).await.is_err());
    }
}
