// src/matching/companies.rs
//
// Duplicate candidate search for companies: shared LinkedIn page, shared
// website, shared domain, similar name, plus any pair a previous scan
// already put on file. Checks degrade independently on store errors.

use std::collections::HashMap;

use anyhow::Result;
use futures::join;
use log::warn;

use crate::matching::normalize::{normalize_company_name, normalize_domain, normalize_linkedin};
use crate::matching::similarity::{base_confidence, company_names_similar};
use crate::matching::{consider_candidate, contains_pattern, probe_rows, ranked_candidates};
use crate::models::{
    CompanyDomainRow, CompanyId, CompanyIdentifiers, CompanyRecord, DuplicatePair, EntityId,
    EntityType, MatchCandidate, MatchType,
};
use crate::store::{rows_to, PendingFilter, RecordStore, Table};

/// Cap on rows returned per identifier pattern sweep
const IDENTIFIER_PROBE_LIMIT: i64 = 50;

/// Cap on the fuzzy-name pre-filter; the edit-distance comparison never
/// sees more candidates than this per probe
const FUZZY_NAME_PROBE_LIMIT: i64 = 100;

/// Finds likely duplicates of one company given its current identifier
/// set, ranked by confidence with one candidate per other company.
pub async fn find_company_duplicates(
    store: &dyn RecordStore,
    identifiers: &CompanyIdentifiers,
) -> Result<Vec<MatchCandidate>> {
    let subject = match &identifiers.company_id {
        Some(id) => id.clone(),
        None => return Ok(Vec::new()),
    };

    let (linkedin_hits, website_hits, domain_hits, name_hits, recorded_hits) = join!(
        linkedin_candidates(store, &subject, identifiers.linkedin.as_deref()),
        website_candidates(store, &subject, identifiers.website.as_deref()),
        domain_candidates(store, &subject, &identifiers.domains),
        name_candidates(store, &subject, identifiers.name.as_deref()),
        recorded_pair_candidates(store, &subject),
    );

    let mut best = HashMap::new();
    let checks = [
        ("linkedin", linkedin_hits),
        ("website", website_hits),
        ("domain", domain_hits),
        ("name", name_hits),
        ("recorded pair", recorded_hits),
    ];
    for (label, outcome) in checks {
        match outcome {
            Ok(hits) => {
                for candidate in hits {
                    consider_candidate(&mut best, candidate);
                }
            }
            Err(e) => warn!(
                "Company {} check failed for {}, continuing with partial results: {}",
                label, subject.0, e
            ),
        }
    }

    Ok(ranked_candidates(best))
}

/// Companies whose LinkedIn URL normalizes to the same page
async fn linkedin_candidates(
    store: &dyn RecordStore,
    subject: &CompanyId,
    linkedin: Option<&str>,
) -> Result<Vec<MatchCandidate>> {
    let Some(target) = linkedin.and_then(normalize_linkedin) else {
        return Ok(Vec::new());
    };

    let rows = probe_rows(
        store,
        Table::Companies,
        "linkedin",
        std::slice::from_ref(&target),
        &[contains_pattern(&target)],
        IDENTIFIER_PROBE_LIMIT,
    )
    .await?;

    let mut candidates = Vec::new();
    for company in rows_to::<CompanyRecord>(rows)? {
        if company.id == *subject {
            continue;
        }
        let stored = match company.linkedin.as_deref().and_then(normalize_linkedin) {
            Some(s) => s,
            None => continue,
        };
        if stored == target {
            candidates.push(MatchCandidate {
                entity_id: EntityId::from(company.id.clone()),
                match_type: MatchType::Linkedin,
                matched_value: company.linkedin.clone().unwrap_or_default(),
                confidence_score: base_confidence(MatchType::Linkedin),
                match_reason: "Same LinkedIn page".to_string(),
            });
        }
    }
    Ok(candidates)
}

/// Companies with the same website after trimming and lowercasing; URL
/// structure is deliberately left alone here, the domain check below
/// handles host-level equivalence
async fn website_candidates(
    store: &dyn RecordStore,
    subject: &CompanyId,
    website: Option<&str>,
) -> Result<Vec<MatchCandidate>> {
    let target = website.unwrap_or("").trim().to_lowercase();
    if target.is_empty() {
        return Ok(Vec::new());
    }

    let rows = probe_rows(
        store,
        Table::Companies,
        "website",
        std::slice::from_ref(&target),
        &[contains_pattern(&target)],
        IDENTIFIER_PROBE_LIMIT,
    )
    .await?;

    let mut candidates = Vec::new();
    for company in rows_to::<CompanyRecord>(rows)? {
        if company.id == *subject {
            continue;
        }
        let stored_raw = company.website.clone().unwrap_or_default();
        if stored_raw.trim().to_lowercase() == target {
            candidates.push(MatchCandidate {
                entity_id: EntityId::from(company.id.clone()),
                match_type: MatchType::Website,
                matched_value: stored_raw,
                confidence_score: base_confidence(MatchType::Website),
                match_reason: "Same website".to_string(),
            });
        }
    }
    Ok(candidates)
}

/// Companies attached to any of the given domains. Stored domain rows may
/// carry schemes or trailing slashes, so hits are verified by normalizing
/// both sides to bare hosts.
async fn domain_candidates(
    store: &dyn RecordStore,
    subject: &CompanyId,
    domains: &[String],
) -> Result<Vec<MatchCandidate>> {
    let targets: Vec<String> = domains.iter().filter_map(|d| normalize_domain(d)).collect();
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let mut exact = targets.clone();
    for raw in domains {
        let raw = raw.trim().to_string();
        if !raw.is_empty() && !exact.contains(&raw) {
            exact.push(raw);
        }
    }
    let patterns: Vec<String> = targets.iter().map(|t| contains_pattern(t)).collect();
    let rows = probe_rows(
        store,
        Table::CompanyDomains,
        "domain",
        &exact,
        &patterns,
        IDENTIFIER_PROBE_LIMIT,
    )
    .await?;

    let mut matched: HashMap<CompanyId, String> = HashMap::new();
    for row in rows_to::<CompanyDomainRow>(rows)? {
        if row.company_id == *subject {
            continue;
        }
        let Some(normalized) = normalize_domain(&row.domain) else {
            continue;
        };
        if targets.contains(&normalized) {
            matched.entry(row.company_id).or_insert(row.domain);
        }
    }

    Ok(matched
        .into_iter()
        .map(|(company_id, domain)| MatchCandidate {
            entity_id: EntityId::from(company_id),
            match_type: MatchType::Domain,
            matched_value: domain,
            confidence_score: base_confidence(MatchType::Domain),
            match_reason: "Shared domain".to_string(),
        })
        .collect())
}

/// Companies with a similar name. A bounded pattern pre-filter (normalized
/// containment plus a case-insensitive probe of the raw name) narrows the
/// field before the full heuristic cascade runs.
async fn name_candidates(
    store: &dyn RecordStore,
    subject: &CompanyId,
    name: Option<&str>,
) -> Result<Vec<MatchCandidate>> {
    let raw_name = name.unwrap_or("").trim().to_string();
    if raw_name.is_empty() {
        return Ok(Vec::new());
    }
    let normalized = match normalize_company_name(&raw_name) {
        Some(n) if n.chars().count() >= 4 => n,
        _ => return Ok(Vec::new()),
    };

    let rows = probe_rows(
        store,
        Table::Companies,
        "name",
        &[],
        &[contains_pattern(&normalized), raw_name.clone()],
        FUZZY_NAME_PROBE_LIMIT,
    )
    .await?;

    let mut candidates = Vec::new();
    for company in rows_to::<CompanyRecord>(rows)? {
        if company.id == *subject {
            continue;
        }
        let candidate_name = company.name.clone().unwrap_or_default();
        if company_names_similar(&raw_name, &candidate_name) {
            candidates.push(MatchCandidate {
                entity_id: EntityId::from(company.id.clone()),
                match_type: MatchType::Name,
                matched_value: candidate_name,
                confidence_score: base_confidence(MatchType::Name),
                match_reason: "Similar company name".to_string(),
            });
        }
    }
    Ok(candidates)
}

/// Pairs already sitting in pending review that involve this company;
/// re-surfaced so a scan's result set is complete without the caller
/// consulting the review queue separately
async fn recorded_pair_candidates(
    store: &dyn RecordStore,
    subject: &CompanyId,
) -> Result<Vec<MatchCandidate>> {
    let filter = PendingFilter {
        entity_type: Some(EntityType::Company),
        involving: Some(EntityId(subject.0.clone())),
        ..Default::default()
    };
    let rows = store.list_pending(Table::DuplicatePairs, &filter).await?;

    let mut candidates = Vec::new();
    for pair in rows_to::<DuplicatePair>(rows)? {
        let other = if pair.source_id.0 == subject.0 {
            pair.duplicate_id.clone()
        } else {
            pair.source_id.clone()
        };
        candidates.push(MatchCandidate {
            entity_id: other,
            match_type: MatchType::Manual,
            matched_value: "Previously detected".to_string(),
            confidence_score: base_confidence(MatchType::Manual),
            match_reason: "Pending duplicate pair".to_string(),
        });
    }
    Ok(candidates)
}
