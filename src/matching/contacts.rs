// src/matching/contacts.rs
//
// Duplicate candidate search for contacts. Four checks run against the
// store, strongest identifier first: shared email, shared mobile, shared
// LinkedIn profile, then similar name. Checks are independent; one
// failing check only costs its own candidates.

use std::collections::HashMap;

use anyhow::Result;
use futures::join;
use log::warn;

use crate::matching::normalize::{normalize_email, normalize_linkedin, normalize_mobile};
use crate::matching::similarity::{base_confidence, last_names_compatible};
use crate::matching::{consider_candidate, contains_pattern, probe_rows, ranked_candidates};
use crate::models::{
    ContactEmailRow, ContactId, ContactIdentifiers, ContactMobileRow, ContactRecord, EntityId,
    MatchCandidate, MatchType,
};
use crate::store::{rows_to, RecordStore, Table};

/// Cap on rows returned per identifier pattern sweep
const IDENTIFIER_PROBE_LIMIT: i64 = 50;

/// Cap on rows considered by the first-name probe
const NAME_PROBE_LIMIT: i64 = 200;

/// Finds likely duplicates of one contact given its current identifier
/// set. Returns candidates ranked by confidence, one per other contact;
/// an unsaved contact (no id yet) has nothing to deduplicate against.
pub async fn find_contact_duplicates(
    store: &dyn RecordStore,
    identifiers: &ContactIdentifiers,
) -> Result<Vec<MatchCandidate>> {
    let subject = match &identifiers.contact_id {
        Some(id) => id.clone(),
        None => return Ok(Vec::new()),
    };

    let (email_hits, mobile_hits, linkedin_hits, name_hits) = join!(
        email_candidates(store, &subject, &identifiers.emails),
        mobile_candidates(store, &subject, &identifiers.mobiles),
        linkedin_candidates(store, &subject, identifiers.linkedin.as_deref()),
        name_candidates(
            store,
            &subject,
            identifiers.first_name.as_deref(),
            identifiers.last_name.as_deref(),
        ),
    );

    let mut best = HashMap::new();
    let checks = [
        ("email", email_hits),
        ("mobile", mobile_hits),
        ("linkedin", linkedin_hits),
        ("name", name_hits),
    ];
    for (label, outcome) in checks {
        match outcome {
            Ok(hits) => {
                for candidate in hits {
                    consider_candidate(&mut best, candidate);
                }
            }
            Err(e) => warn!(
                "Contact {} check failed for {}, continuing with partial results: {}",
                label, subject.0, e
            ),
        }
    }

    Ok(ranked_candidates(best))
}

/// Contacts sharing any of the given email addresses after normalization.
/// Stored addresses are probed both exactly and by containment because the
/// store may hold them with stray casing or whitespace.
async fn email_candidates(
    store: &dyn RecordStore,
    subject: &ContactId,
    emails: &[String],
) -> Result<Vec<MatchCandidate>> {
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
        IDENTIFIER_PROBE_LIMIT,
    )
    .await?;

    let mut matched: HashMap<ContactId, String> = HashMap::new();
    for row in rows_to::<ContactEmailRow>(rows)? {
        if row.contact_id == *subject {
            continue;
        }
        let Some(normalized) = normalize_email(&row.email) else {
            continue;
        };
        if targets.contains(&normalized) {
            matched.entry(row.contact_id).or_insert(row.email);
        }
    }

    candidates_for_existing_contacts(store, matched, MatchType::Email, "Same email address").await
}

/// Contacts sharing any of the given mobile numbers after formatting is
/// stripped. A stored number with interleaved punctuation cannot be found
/// by containment, so the sweep threads a wildcard between every
/// character of the normalized number instead.
async fn mobile_candidates(
    store: &dyn RecordStore,
    subject: &ContactId,
    mobiles: &[String],
) -> Result<Vec<MatchCandidate>> {
    let targets: Vec<String> = mobiles.iter().filter_map(|m| normalize_mobile(m)).collect();
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let mut exact = targets.clone();
    for raw in mobiles {
        let raw = raw.trim().to_string();
        if !raw.is_empty() && !exact.contains(&raw) {
            exact.push(raw);
        }
    }
    let patterns: Vec<String> = targets.iter().map(|t| interleaved_pattern(t)).collect();
    let rows = probe_rows(
        store,
        Table::ContactMobiles,
        "mobile",
        &exact,
        &patterns,
        IDENTIFIER_PROBE_LIMIT,
    )
    .await?;

    let mut matched: HashMap<ContactId, String> = HashMap::new();
    for row in rows_to::<ContactMobileRow>(rows)? {
        if row.contact_id == *subject {
            continue;
        }
        let Some(normalized) = normalize_mobile(&row.mobile) else {
            continue;
        };
        if targets.contains(&normalized) {
            matched.entry(row.contact_id).or_insert(row.mobile);
        }
    }

    candidates_for_existing_contacts(store, matched, MatchType::Mobile, "Same mobile number").await
}

/// Contacts whose LinkedIn URL normalizes to the same profile
async fn linkedin_candidates(
    store: &dyn RecordStore,
    subject: &ContactId,
    linkedin: Option<&str>,
) -> Result<Vec<MatchCandidate>> {
    let Some(target) = linkedin.and_then(normalize_linkedin) else {
        return Ok(Vec::new());
    };

    let rows = probe_rows(
        store,
        Table::Contacts,
        "linkedin",
        std::slice::from_ref(&target),
        &[contains_pattern(&target)],
        IDENTIFIER_PROBE_LIMIT,
    )
    .await?;

    let mut candidates = Vec::new();
    for contact in rows_to::<ContactRecord>(rows)? {
        if contact.id == *subject {
            continue;
        }
        let stored = match contact.linkedin.as_deref().and_then(normalize_linkedin) {
            Some(s) => s,
            None => continue,
        };
        if stored == target {
            candidates.push(MatchCandidate {
                entity_id: EntityId::from(contact.id.clone()),
                match_type: MatchType::Linkedin,
                matched_value: contact.linkedin.clone().unwrap_or_default(),
                confidence_score: base_confidence(MatchType::Linkedin),
                match_reason: "Same LinkedIn profile".to_string(),
            });
        }
    }
    Ok(candidates)
}

/// Contacts with the exact same first name (case-insensitive) and a
/// compatible last name
async fn name_candidates(
    store: &dyn RecordStore,
    subject: &ContactId,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Result<Vec<MatchCandidate>> {
    let first_lower = first_name.unwrap_or("").trim().to_lowercase();
    if first_lower.is_empty() {
        return Ok(Vec::new());
    }
    let last_lower = last_name.unwrap_or("").trim().to_lowercase();

    // No wildcards: an exact case-insensitive probe on the first name.
    let rows = store
        .find_by_pattern(Table::Contacts, "first_name", &first_lower, NAME_PROBE_LIMIT)
        .await?;

    let mut candidates = Vec::new();
    for contact in rows_to::<ContactRecord>(rows)? {
        if contact.id == *subject {
            continue;
        }
        let candidate_first = contact
            .first_name
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        if candidate_first != first_lower {
            continue;
        }
        let candidate_last = contact.last_name.as_deref().unwrap_or("");
        if !last_names_compatible(&last_lower, candidate_last) {
            continue;
        }
        candidates.push(MatchCandidate {
            entity_id: EntityId::from(contact.id.clone()),
            match_type: MatchType::Name,
            matched_value: contact.display_name(),
            confidence_score: base_confidence(MatchType::Name),
            match_reason: "Similar name".to_string(),
        });
    }
    Ok(candidates)
}

/// Emits one candidate per matched contact that still exists, dropping
/// hits whose owning contact row has been deleted out from under its
/// identifier rows.
async fn candidates_for_existing_contacts(
    store: &dyn RecordStore,
    matched: HashMap<ContactId, String>,
    match_type: MatchType,
    reason: &str,
) -> Result<Vec<MatchCandidate>> {
    if matched.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = matched.keys().map(|id| id.0.clone()).collect();
    let rows = store.find_by_exact_field(Table::Contacts, "id", &ids).await?;

    let mut candidates = Vec::new();
    for contact in rows_to::<ContactRecord>(rows)? {
        if let Some(value) = matched.get(&contact.id) {
            candidates.push(MatchCandidate {
                entity_id: EntityId::from(contact.id.clone()),
                match_type,
                matched_value: value.clone(),
                confidence_score: base_confidence(match_type),
                match_reason: reason.to_string(),
            });
        }
    }
    Ok(candidates)
}

/// LIKE pattern threading a wildcard between every character, so stored
/// values with arbitrary interleaved formatting still surface
fn interleaved_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() * 2 + 1);
    pattern.push('%');
    for c in value.chars() {
        pattern.push(c);
        pattern.push('%');
    }
    pattern
}
