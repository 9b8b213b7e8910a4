// src/issues/tracker.rs
//
// Persists detected data-quality conditions and walks them through the
// pending -> resolved/dismissed/ignored state machine. Reporting is
// idempotent on the natural key while an issue is pending; terminal states
// are final, and a recurring condition gets a fresh pending row instead of
// a reopened old one.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::matching::normalize::{normalize_domain, normalize_email, normalize_mobile};
use crate::models::{IntegrityIssue, IssueDraft, IssueType, ReviewStatus};
use crate::store::{row_to, rows_to, to_row, PendingFilter, RecordStore, Table};

/// Outcome of reporting one draft
#[derive(Debug)]
pub struct ReportOutcome {
    pub issue: IntegrityIssue,

    /// False when a pending issue with the same natural key already existed
    pub created: bool,
}

/// Batch report result: the issues written plus the drafts that failed,
/// with their errors
#[derive(Debug)]
pub struct BatchReport {
    pub reported: Vec<ReportOutcome>,
    pub failed: Vec<(IssueDraft, anyhow::Error)>,
}

/// Records a data-quality condition. Identifier fields are normalized
/// before the natural key is built, so equal conditions reported from
/// different code paths collapse onto one pending row.
pub async fn report_issue(
    store: &dyn RecordStore,
    draft: IssueDraft,
    now: DateTime<Utc>,
) -> Result<ReportOutcome> {
    let issue = IntegrityIssue::from_draft(normalized_draft(draft), now);
    let result = store
        .upsert(Table::IntegrityIssues, to_row(&issue)?, &["natural_key"])
        .await?;
    if !result.inserted {
        debug!(
            "Issue with key '{}' already pending, returning existing row",
            issue.natural_key
        );
    }
    Ok(ReportOutcome {
        issue: row_to(result.row)?,
        created: result.inserted,
    })
}

/// Reports a batch of drafts. Each draft is written independently: a
/// failure is kept for the caller and never rolls back or aborts the rest.
/// Re-running a partially failed batch is safe because reporting is
/// idempotent on the natural key.
pub async fn report_issues(
    store: &dyn RecordStore,
    drafts: Vec<IssueDraft>,
    now: DateTime<Utc>,
) -> BatchReport {
    let mut report = BatchReport {
        reported: Vec::new(),
        failed: Vec::new(),
    };
    for draft in drafts {
        match report_issue(store, draft.clone(), now).await {
            Ok(outcome) => report.reported.push(outcome),
            Err(e) => {
                warn!(
                    "Failed to report {} issue, continuing batch: {}",
                    draft.issue_type.as_str(),
                    e
                );
                report.failed.push((draft, e));
            }
        }
    }
    report
}

/// Marks an issue fixed
pub async fn resolve_issue(
    store: &dyn RecordStore,
    id: &str,
    now: DateTime<Utc>,
) -> Result<IntegrityIssue> {
    transition(store, id, ReviewStatus::Resolved, now).await
}

/// Marks an issue reviewed and rejected
pub async fn dismiss_issue(
    store: &dyn RecordStore,
    id: &str,
    now: DateTime<Utc>,
) -> Result<IntegrityIssue> {
    transition(store, id, ReviewStatus::Dismissed, now).await
}

/// Parks an issue without a verdict
pub async fn ignore_issue(
    store: &dyn RecordStore,
    id: &str,
    now: DateTime<Utc>,
) -> Result<IntegrityIssue> {
    transition(store, id, ReviewStatus::Ignored, now).await
}

async fn transition(
    store: &dyn RecordStore,
    id: &str,
    status: ReviewStatus,
    now: DateTime<Utc>,
) -> Result<IntegrityIssue> {
    let issue = load_issue(store, id).await?;
    if issue.status.is_terminal() {
        bail!(
            "Issue '{}' is already {} and cannot change state",
            id,
            issue.status.as_str()
        );
    }

    let updated: IntegrityIssue = row_to(
        store
            .update_status(Table::IntegrityIssues, id, status, now)
            .await?,
    )?;

    // A verdict on one potential company match is a verdict on the domain:
    // every other open suggestion for it gets the same answer. Ignoring is
    // not a verdict and touches only the one issue.
    if updated.issue_type == IssueType::PotentialCompanyMatch && status != ReviewStatus::Ignored {
        close_domain_siblings(store, &updated, status, now).await?;
    }
    Ok(updated)
}

async fn close_domain_siblings(
    store: &dyn RecordStore,
    issue: &IntegrityIssue,
    status: ReviewStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(domain) = issue.domain.as_deref() else {
        return Ok(());
    };
    let filter = PendingFilter {
        issue_type: Some(IssueType::PotentialCompanyMatch),
        domain: Some(domain.to_string()),
        ..Default::default()
    };
    let siblings: Vec<IntegrityIssue> =
        rows_to(store.list_pending(Table::IntegrityIssues, &filter).await?)?;

    let mut closed = 0;
    for sibling in siblings {
        if sibling.id == issue.id {
            continue;
        }
        store
            .update_status(Table::IntegrityIssues, &sibling.id, status, now)
            .await?;
        closed += 1;
    }
    if closed > 0 {
        info!(
            "Applied {} to {} other open issues sharing domain {}",
            status.as_str(),
            closed,
            domain
        );
    }
    Ok(())
}

async fn load_issue(store: &dyn RecordStore, id: &str) -> Result<IntegrityIssue> {
    let ids = [id.to_string()];
    let rows = store
        .find_by_exact_field(Table::IntegrityIssues, "id", &ids)
        .await?;
    let row = rows
        .into_iter()
        .next()
        .with_context(|| format!("No issue with id '{}'", id))?;
    row_to(row)
}

fn normalized_draft(mut draft: IssueDraft) -> IssueDraft {
    draft.email = draft.email.as_deref().and_then(normalize_email);
    draft.mobile = draft.mobile.as_deref().and_then(normalize_mobile);
    draft.domain = draft.domain.as_deref().and_then(normalize_domain);
    draft
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, EntityType};
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn match_draft(contact_id: &str, domain: &str) -> IssueDraft {
        let mut draft = IssueDraft::new(IssueType::PotentialCompanyMatch, EntityType::Contact);
        draft.entity_id = Some(EntityId(contact_id.to_string()));
        draft.domain = Some(domain.to_string());
        draft
    }

    #[tokio::test]
    async fn test_report_issue_is_idempotent_while_pending() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let first = report_issue(&store, match_draft("c1", "foo.com"), now)
            .await
            .unwrap();
        assert!(first.created);

        let second = report_issue(&store, match_draft("c1", "foo.com"), now)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.issue.id, first.issue.id);

        let pending = store
            .list_pending(Table::IntegrityIssues, &PendingFilter::default())
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_report_normalizes_identifier_fields() {
        let store = MemoryStore::new();
        let mut draft = IssueDraft::new(IssueType::NotInCrm, EntityType::Contact);
        draft.email = Some("  Jane@Example.COM ".to_string());
        draft.domain = Some("https://www.Foo.com/about".to_string());
        draft.details = json!({"source": "inbox"});

        let outcome = report_issue(&store, draft, Utc::now()).await.unwrap();
        assert_eq!(outcome.issue.email.as_deref(), Some("jane@example.com"));
        assert_eq!(outcome.issue.domain.as_deref(), Some("foo.com"));
        assert!(outcome.issue.natural_key.contains("jane@example.com"));
    }

    #[tokio::test]
    async fn test_resolved_issue_cannot_change_state_again() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let outcome = report_issue(&store, match_draft("c1", "foo.com"), now)
            .await
            .unwrap();

        let resolved = resolve_issue(&store, &outcome.issue.id, now).await.unwrap();
        assert_eq!(resolved.status, ReviewStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        assert!(dismiss_issue(&store, &outcome.issue.id, now).await.is_err());
    }

    #[tokio::test]
    async fn test_dismissing_company_match_closes_whole_domain() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let first = report_issue(&store, match_draft("c1", "bar.com"), now)
            .await
            .unwrap();
        report_issue(&store, match_draft("c2", "Bar.com"), now)
            .await
            .unwrap();
        report_issue(&store, match_draft("c3", "other.com"), now)
            .await
            .unwrap();
        let mut unrelated = IssueDraft::new(IssueType::MissingCompany, EntityType::Company);
        unrelated.domain = Some("bar.com".to_string());
        report_issue(&store, unrelated, now).await.unwrap();

        dismiss_issue(&store, &first.issue.id, now).await.unwrap();

        let bar_matches = store
            .list_pending(
                Table::IntegrityIssues,
                &PendingFilter {
                    issue_type: Some(IssueType::PotentialCompanyMatch),
                    domain: Some("bar.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(bar_matches.is_empty());

        let survivors = store
            .list_pending(Table::IntegrityIssues, &PendingFilter::default())
            .await
            .unwrap();
        assert_eq!(survivors.len(), 2);
    }

    #[tokio::test]
    async fn test_ignore_touches_only_the_one_issue() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let first = report_issue(&store, match_draft("c1", "bar.com"), now)
            .await
            .unwrap();
        report_issue(&store, match_draft("c2", "bar.com"), now)
            .await
            .unwrap();

        ignore_issue(&store, &first.issue.id, now).await.unwrap();

        let remaining = store
            .list_pending(
                Table::IntegrityIssues,
                &PendingFilter {
                    issue_type: Some(IssueType::PotentialCompanyMatch),
                    domain: Some("bar.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_report_collapses_duplicate_drafts() {
        let store = MemoryStore::new();
        let drafts = vec![
            match_draft("c1", "foo.com"),
            match_draft("c2", "foo.com"),
            match_draft("c1", "foo.com"),
        ];

        let report = report_issues(&store, drafts, Utc::now()).await;
        assert!(report.failed.is_empty());
        assert_eq!(report.reported.len(), 3);
        let created: Vec<bool> = report.reported.iter().map(|r| r.created).collect();
        assert_eq!(created, vec![true, true, false]);
    }
}
