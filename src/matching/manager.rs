// src/matching/manager.rs
//
// Turns finder output into persisted review work. A scan runs a finder,
// drops weak candidates, and records one pending pair per surviving
// candidate unless an earlier decision stands in the way: a pending pair
// for the same two records, or a terminal pair an operator flagged as a
// false positive. A plain dismissed or ignored pair does not block; if
// the condition persists, a later scan may raise it again.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::join;
use log::{debug, info, warn};
use serde_json::json;

use crate::matching::companies::find_company_duplicates;
use crate::matching::contacts::find_contact_duplicates;
use crate::matching::normalize::normalize_email;
use crate::matching::similarity::DUPLICATE_CONFIDENCE_THRESHOLD;
use crate::matching::{contains_pattern, probe_rows};
use crate::models::{
    CompanyIdentifiers, ContactEmailRow, ContactIdentifiers, ContactMobileRow, ContactRecord,
    DuplicatePair, EntityId, EntityType, MatchCandidate, ReviewStatus,
};
use crate::store::{row_to, rows_to, to_row, RecordStore, Table};

/// Cap on email rows pulled when resolving participants to contacts
const PARTICIPANT_PROBE_LIMIT: i64 = 50;

/// Contacts scanned concurrently in a participant batch
const PARTICIPANT_BATCH_SIZE: usize = 10;

/// What one scan did
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Candidates that cleared the confidence threshold
    pub candidates: Vec<MatchCandidate>,

    /// Pairs actually written as new pending review work
    pub recorded: Vec<DuplicatePair>,

    /// Candidates skipped because an existing pair already covers them
    pub suppressed: usize,
}

/// Scans one contact and records pending pairs for the strong candidates
pub async fn scan_contact(
    store: &dyn RecordStore,
    identifiers: &ContactIdentifiers,
    now: DateTime<Utc>,
) -> Result<ScanOutcome> {
    let Some(subject) = identifiers.contact_id.as_ref() else {
        return Ok(ScanOutcome::default());
    };
    let subject = EntityId(subject.0.clone());
    let candidates = find_contact_duplicates(store, identifiers).await?;
    record_candidates(store, subject, EntityType::Contact, candidates, now).await
}

/// Scans one company and records pending pairs for the strong candidates
pub async fn scan_company(
    store: &dyn RecordStore,
    identifiers: &CompanyIdentifiers,
    now: DateTime<Utc>,
) -> Result<ScanOutcome> {
    let Some(subject) = identifiers.company_id.as_ref() else {
        return Ok(ScanOutcome::default());
    };
    let subject = EntityId(subject.0.clone());
    let candidates = find_company_duplicates(store, identifiers).await?;
    record_candidates(store, subject, EntityType::Company, candidates, now).await
}

/// Scans every contact owning one of the given email addresses, the way a
/// conversation thread is checked for duplicate participants. Contacts are
/// scanned in small concurrent batches; one failing contact degrades the
/// result instead of aborting the batch. Mirror findings (A against B and
/// B against A) collapse onto one pair.
pub async fn scan_participants(
    store: &dyn RecordStore,
    emails: &[String],
    now: DateTime<Utc>,
) -> Result<ScanOutcome> {
    let contacts = contacts_for_emails(store, emails).await?;
    if contacts.is_empty() {
        return Ok(ScanOutcome::default());
    }
    info!(
        "Scanning {} contacts resolved from {} participant emails",
        contacts.len(),
        emails.len()
    );

    let mut unique: Vec<(EntityId, MatchCandidate)> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for batch in contacts.chunks(PARTICIPANT_BATCH_SIZE) {
        let scans = batch
            .iter()
            .map(|contact| participant_candidates(store, contact));
        for (contact, result) in batch.iter().zip(join_all(scans).await) {
            match result {
                Ok(candidates) => {
                    for candidate in candidates {
                        let key = unordered_key(&contact.id.0, &candidate.entity_id.0);
                        if seen.insert(key) {
                            unique.push((EntityId(contact.id.0.clone()), candidate));
                        }
                    }
                }
                Err(e) => warn!(
                    "Participant scan failed for contact {}, continuing: {}",
                    contact.id.0, e
                ),
            }
        }
    }

    let mut combined = ScanOutcome::default();
    for (subject, candidate) in unique {
        let partial =
            record_candidates(store, subject, EntityType::Contact, vec![candidate], now).await?;
        combined.candidates.extend(partial.candidates);
        combined.recorded.extend(partial.recorded);
        combined.suppressed += partial.suppressed;
    }
    Ok(combined)
}

async fn record_candidates(
    store: &dyn RecordStore,
    subject: EntityId,
    entity_type: EntityType,
    candidates: Vec<MatchCandidate>,
    now: DateTime<Utc>,
) -> Result<ScanOutcome> {
    let mut outcome = ScanOutcome::default();
    for candidate in candidates {
        if candidate.confidence_score < DUPLICATE_CONFIDENCE_THRESHOLD {
            debug!(
                "Dropping {} candidate {} below threshold ({:.2})",
                candidate.match_type.as_str(),
                candidate.entity_id.0,
                candidate.confidence_score
            );
            continue;
        }

        let pair = DuplicatePair::new_canonical(
            subject.clone(),
            EntityId(candidate.entity_id.0.clone()),
            entity_type,
            candidate.match_type,
            json!({
                "value": candidate.matched_value.clone(),
                "reason": candidate.match_reason.clone(),
            }),
            now,
        );

        if pair_blocks_recreation(store, &pair).await? {
            outcome.suppressed += 1;
            outcome.candidates.push(candidate);
            continue;
        }

        let result = store
            .upsert(
                Table::DuplicatePairs,
                to_row(&pair)?,
                &["source_id", "duplicate_id", "entity_type"],
            )
            .await?;
        if result.inserted {
            outcome.recorded.push(row_to(result.row)?);
        } else {
            // Lost the race to a concurrent scan; the winner's row stands.
            outcome.suppressed += 1;
        }
        outcome.candidates.push(candidate);
    }
    Ok(outcome)
}

/// True when an existing pair for the same two records should stop a scan
/// from recording a fresh one
async fn pair_blocks_recreation(store: &dyn RecordStore, pair: &DuplicatePair) -> Result<bool> {
    let rows = store
        .find_by_exact_field(
            Table::DuplicatePairs,
            "source_id",
            std::slice::from_ref(&pair.source_id.0),
        )
        .await?;
    let existing = rows_to::<DuplicatePair>(rows)?;
    Ok(existing.iter().any(|row| {
        row.duplicate_id == pair.duplicate_id
            && row.entity_type == pair.entity_type
            && (row.status == ReviewStatus::Pending
                || (row.status.is_terminal() && row.false_positive))
    }))
}

async fn participant_candidates(
    store: &dyn RecordStore,
    contact: &ContactRecord,
) -> Result<Vec<MatchCandidate>> {
    let identifiers = contact_identifiers(store, contact).await?;
    find_contact_duplicates(store, &identifiers).await
}

/// Rebuilds a contact's full identifier set from its stored rows
async fn contact_identifiers(
    store: &dyn RecordStore,
    contact: &ContactRecord,
) -> Result<ContactIdentifiers> {
    let ids = [contact.id.0.clone()];
    let (emails, mobiles) = join!(
        store.find_by_exact_field(Table::ContactEmails, "contact_id", &ids),
        store.find_by_exact_field(Table::ContactMobiles, "contact_id", &ids),
    );
    let emails = rows_to::<ContactEmailRow>(emails?)?;
    let mobiles = rows_to::<ContactMobileRow>(mobiles?)?;
    Ok(ContactIdentifiers {
        contact_id: Some(contact.id.clone()),
        emails: emails.into_iter().map(|row| row.email).collect(),
        mobiles: mobiles.into_iter().map(|row| row.mobile).collect(),
        linkedin: contact.linkedin.clone(),
        first_name: contact.first_name.clone(),
        last_name: contact.last_name.clone(),
    })
}

/// Resolves email addresses to the contacts owning them, tolerating stored
/// casing and whitespace differences
async fn contacts_for_emails(
    store: &dyn RecordStore,
    emails: &[String],
) -> Result<Vec<ContactRecord>> {
    let targets: Vec<String> = emails.iter().filter_map(|e| normalize_email(e)).collect();
    if targets.is_empty() {
        return Ok(Vec::new());
    }
    let patterns: Vec<String> = targets.iter().map(|t| contains_pattern(t)).collect();
    let rows = probe_rows(
        store,
        Table::ContactEmails,
        "email",
        &targets,
        &patterns,
        PARTICIPANT_PROBE_LIMIT,
    )
    .await?;

    let mut ids: Vec<String> = Vec::new();
    for row in rows_to::<ContactEmailRow>(rows)? {
        match normalize_email(&row.email) {
            Some(normalized) if targets.contains(&normalized) => {
                if !ids.contains(&row.contact_id.0) {
                    ids.push(row.contact_id.0.clone());
                }
            }
            _ => {}
        }
    }
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    rows_to(store.find_by_exact_field(Table::Contacts, "id", &ids).await?)
}

fn unordered_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}
