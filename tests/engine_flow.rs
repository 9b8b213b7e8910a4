//! Scenario tests driving the engine through its public surface over the
//! in-memory store: scan, review, merge and issue lifecycle flows.

use chrono::Utc;
use crm_dedupe::models::{
    CompanyDomainRow, CompanyId, CompanyIdentifiers, CompanyRecord, ContactEmailRow, ContactId,
    ContactIdentifiers, ContactRecord, EntityId, EntityType, IssueDraft, IssueType, MatchType,
};
use crm_dedupe::store::memory::MemoryStore;
use crm_dedupe::store::{PendingFilter, RecordStore, Table};
use crm_dedupe::{
    confirm_merge, dismiss_merge, report_issue, report_issues, resolve_issue, scan_company,
    scan_contact, scan_participants, suggest_company_for_contact, suggest_company_for_domain,
    CompanySuggestion,
};

// ---------------------------------------------------------------------------
// Seeding helpers
// ---------------------------------------------------------------------------

fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn seed_contact(store: &MemoryStore, id: &str, first: &str, last: &str, emails: &[&str]) {
    store
        .seed(
            Table::Contacts,
            &[ContactRecord {
                id: ContactId(id.to_string()),
                first_name: Some(first.to_string()),
                last_name: Some(last.to_string()),
                linkedin: None,
                category: None,
                created_at: None,
            }],
        )
        .await
        .unwrap();
    let rows: Vec<ContactEmailRow> = emails
        .iter()
        .map(|email| ContactEmailRow {
            contact_id: ContactId(id.to_string()),
            email: email.to_string(),
            is_primary: false,
        })
        .collect();
    store.seed(Table::ContactEmails, &rows).await.unwrap();
}

async fn seed_company(store: &MemoryStore, id: &str, name: &str, domains: &[(&str, bool)]) {
    store
        .seed(
            Table::Companies,
            &[CompanyRecord {
                id: CompanyId(id.to_string()),
                name: Some(name.to_string()),
                linkedin: None,
                website: None,
                category: None,
                created_at: None,
            }],
        )
        .await
        .unwrap();
    let rows: Vec<CompanyDomainRow> = domains
        .iter()
        .map(|(domain, is_primary)| CompanyDomainRow {
            company_id: CompanyId(id.to_string()),
            domain: domain.to_string(),
            is_primary: *is_primary,
            created_at: None,
        })
        .collect();
    store.seed(Table::CompanyDomains, &rows).await.unwrap();
}

fn contact_identifiers(id: &str, emails: &[&str]) -> ContactIdentifiers {
    ContactIdentifiers {
        contact_id: Some(ContactId(id.to_string())),
        emails: emails.iter().map(|e| e.to_string()).collect(),
        ..Default::default()
    }
}

fn company_match_draft(contact_id: &str, domain: &str) -> IssueDraft {
    let mut draft = IssueDraft::new(IssueType::PotentialCompanyMatch, EntityType::Contact);
    draft.entity_id = Some(EntityId(contact_id.to_string()));
    draft.domain = Some(domain.to_string());
    draft
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn email_duplicate_scan_confirm_flow() {
    init_test_logging();
    let store = MemoryStore::new();
    seed_contact(&store, "a", "Jane", "Doe", &["Jane@Example.com "]).await;
    seed_contact(&store, "b", "Janet", "Smith", &["jane@example.com"]).await;

    let outcome = scan_contact(
        &store,
        &contact_identifiers("a", &["Jane@Example.com "]),
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(outcome.recorded.len(), 1);
    let pair = &outcome.recorded[0];
    assert_eq!(pair.match_type, MatchType::Email);

    let confirmation = confirm_merge(
        &store,
        &pair.duplicate_id,
        &pair.source_id,
        EntityType::Contact,
        pair.match_type,
        None,
        Utc::now(),
    )
    .await
    .unwrap();
    assert!(confirmation.intent.triggered);
    assert_eq!(confirmation.intent.merge_selections.0.len(), 5);
    assert_eq!(confirmation.resolved_pairs.len(), 1);

    let still_pending = store
        .list_pending(Table::DuplicatePairs, &PendingFilter::default())
        .await
        .unwrap();
    assert!(still_pending.is_empty());
}

#[tokio::test]
async fn dismissed_false_positive_never_resurfaces() {
    init_test_logging();
    let store = MemoryStore::new();
    seed_contact(&store, "a", "Jane", "Doe", &["jane@example.com"]).await;
    seed_contact(&store, "b", "Janet", "Smith", &["jane@example.com"]).await;

    let ids = contact_identifiers("a", &["jane@example.com"]);
    let first = scan_contact(&store, &ids, Utc::now()).await.unwrap();
    assert_eq!(first.recorded.len(), 1);

    dismiss_merge(&store, &first.recorded[0].id, Utc::now())
        .await
        .unwrap();

    // The finder still reports the shared email; only the write side is
    // suppressed by the operator's verdict.
    let rescan = scan_contact(&store, &ids, Utc::now()).await.unwrap();
    assert_eq!(rescan.candidates.len(), 1);
    assert!(rescan.recorded.is_empty());
    assert_eq!(rescan.suppressed, 1);
}

#[tokio::test]
async fn company_scan_records_shared_domain_pair() {
    init_test_logging();
    let store = MemoryStore::new();
    seed_company(&store, "o1", "Acme", &[("acme.com", true)]).await;
    seed_company(&store, "o2", "Acme Srl", &[("https://acme.com/", true)]).await;

    let outcome = scan_company(
        &store,
        &CompanyIdentifiers {
            company_id: Some(CompanyId("o1".to_string())),
            name: Some("Acme".to_string()),
            domains: vec!["acme.com".to_string()],
            ..Default::default()
        },
        Utc::now(),
    )
    .await
    .unwrap();

    // The shared domain outranks the similar name for the same company.
    assert_eq!(outcome.recorded.len(), 1);
    assert_eq!(outcome.recorded[0].match_type, MatchType::Domain);
    assert_eq!(outcome.recorded[0].entity_type, EntityType::Company);
}

#[tokio::test]
async fn participant_scan_finds_cross_contact_duplicates() {
    init_test_logging();
    let store = MemoryStore::new();
    seed_contact(&store, "a", "Jane", "Doe", &["team@corp.com"]).await;
    seed_contact(&store, "b", "Janet", "Smith", &["team@corp.com"]).await;
    seed_contact(&store, "c", "Carl", "Stone", &["carl@elsewhere.com"]).await;

    let outcome = scan_participants(
        &store,
        &[
            "Team@Corp.com".to_string(),
            "nobody@nowhere.com".to_string(),
        ],
        Utc::now(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.recorded.len(), 1);
    let pair = &outcome.recorded[0];
    assert!(pair.links(&EntityId("a".to_string()), &EntityId("b".to_string())));
}

#[tokio::test]
async fn shared_domain_ambiguity_resolves_to_best_owner() {
    init_test_logging();
    let store = MemoryStore::new();
    seed_company(&store, "o2", "Foo", &[("foo.com", false)]).await;
    seed_company(&store, "o1", "Foo Industries", &[("foo.com", true)]).await;

    let suggestion = suggest_company_for_domain(&store, "foo.com", "Foo Bar", Utc::now())
        .await
        .unwrap()
        .unwrap();
    match suggestion {
        CompanySuggestion::Existing {
            company,
            match_reason,
            ..
        } => {
            assert_eq!(company.name.as_deref(), Some("Foo Industries"));
            assert!(match_reason.unwrap().contains("Best match among 2 companies"));
        }
        other => panic!("expected an existing company, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_domain_offers_new_company_for_contact() {
    init_test_logging();
    let store = MemoryStore::new();
    let contact = ContactRecord {
        id: ContactId("c1".to_string()),
        first_name: Some("Ada".to_string()),
        last_name: Some("Sales".to_string()),
        linkedin: None,
        category: None,
        created_at: None,
    };

    let suggestion = suggest_company_for_contact(
        &store,
        &contact,
        &["sales@brandnew.io".to_string()],
        Utc::now(),
    )
    .await
    .unwrap()
    .unwrap();
    match suggestion {
        CompanySuggestion::CreateNew {
            name,
            website,
            domain,
            category,
        } => {
            assert_eq!(name, "Brandnew");
            assert_eq!(website, "brandnew.io");
            assert_eq!(domain, "brandnew.io");
            assert_eq!(category, "Corporate");
        }
        other => panic!("expected a create-new suggestion, got {:?}", other),
    }

    let none = suggest_company_for_contact(
        &store,
        &contact,
        &["ada@gmail.com".to_string()],
        Utc::now(),
    )
    .await
    .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn company_match_verdict_clears_the_domain() {
    init_test_logging();
    let store = MemoryStore::new();
    let now = Utc::now();

    let first = report_issue(&store, company_match_draft("c1", "bar.com"), now)
        .await
        .unwrap();
    report_issue(&store, company_match_draft("c2", "Bar.com"), now)
        .await
        .unwrap();
    report_issue(&store, company_match_draft("c3", "other.com"), now)
        .await
        .unwrap();

    resolve_issue(&store, &first.issue.id, now).await.unwrap();

    let open = store
        .list_pending(
            Table::IntegrityIssues,
            &PendingFilter {
                issue_type: Some(IssueType::PotentialCompanyMatch),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn batch_reporting_is_idempotent() {
    init_test_logging();
    let store = MemoryStore::new();
    let drafts = || {
        vec![
            company_match_draft("c1", "foo.com"),
            company_match_draft("c2", "foo.com"),
            company_match_draft("c1", "foo.com"),
        ]
    };

    let report = report_issues(&store, drafts(), Utc::now()).await;
    assert!(report.failed.is_empty());
    let created: Vec<bool> = report.reported.iter().map(|r| r.created).collect();
    assert_eq!(created, vec![true, true, false]);

    let rerun = report_issues(&store, drafts(), Utc::now()).await;
    assert!(rerun.reported.iter().all(|r| !r.created));

    let pending = store
        .list_pending(Table::IntegrityIssues, &PendingFilter::default())
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
}
