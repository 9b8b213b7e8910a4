// src/matching/domain_owner.rs
//
// When a domain maps to more than one company, somebody has to pick the
// owner a new contact should be attached to. Scoring is deliberately
// simple and fully deterministic: ties keep the first candidate in input
// order so repeated runs agree.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;

use crate::matching::normalize::{
    capitalize_label, core_label, extract_business_domain, normalize_domain,
};
use crate::matching::similarity::base_confidence;
use crate::matching::{contains_pattern, probe_rows};
use crate::models::{CompanyDomainRow, CompanyRecord, ContactRecord, EntityId, MatchCandidate, MatchType};
use crate::store::{rows_to, RecordStore, Table};

/// Cap on rows pulled per domain-variant pattern
const VARIANT_PROBE_LIMIT: i64 = 5;

/// Minimum variant score before an existing company is suggested over
/// creating a new one
const VARIANT_ACCEPT_SCORE: f64 = 30.0;

/// One company holding a domain, with the facts scoring looks at
#[derive(Debug, Clone)]
pub struct DomainOwnerCandidate {
    pub company: CompanyRecord,

    /// The domain row's stored value
    pub domain: String,

    /// Whether the row is flagged as the company's primary domain
    pub is_primary: bool,
}

/// Outcome of asking which company a domain belongs to
#[derive(Debug, Clone)]
pub enum CompanySuggestion {
    /// An existing company should take the contact
    Existing {
        company: CompanyRecord,
        domain: String,
        is_primary_domain: bool,

        /// Present when the pick needed scoring (shared domain or domain
        /// variant); absent for a sole-owner match
        match_reason: Option<String>,
    },

    /// Nothing matched; offer to create a company with these fields
    CreateNew {
        name: String,
        website: String,
        domain: String,
        category: String,
    },
}

/// Picks the company that most plausibly owns `domain` when several share
/// it. Returns `None` only for an empty candidate list.
pub fn resolve_best_domain_owner(
    domain: &str,
    contact_name: &str,
    candidates: &[DomainOwnerCandidate],
    now: DateTime<Utc>,
) -> Option<MatchCandidate> {
    let index = best_owner_index(contact_name, candidates, now)?;
    let winner = &candidates[index];
    Some(MatchCandidate {
        entity_id: EntityId(winner.company.id.0.clone()),
        match_type: MatchType::Domain,
        matched_value: winner.domain.clone(),
        confidence_score: base_confidence(MatchType::Domain),
        match_reason: format!(
            "Best match among {} companies sharing {}",
            candidates.len(),
            domain
        ),
    })
}

fn best_owner_index(
    contact_name: &str,
    candidates: &[DomainOwnerCandidate],
    now: DateTime<Utc>,
) -> Option<usize> {
    let contact_lower = contact_name.trim().to_lowercase();
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = exact_owner_score(candidate, &contact_lower, now);
        debug!(
            "Domain owner candidate {}: score {:.1}",
            candidate.company.id.0, score
        );
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Score for a company that holds the exact domain: primary-domain bonus,
/// first-token overlap with the contact's name, a specificity bonus for
/// longer names, and a small recency bonus.
fn exact_owner_score(candidate: &DomainOwnerCandidate, contact_lower: &str, now: DateTime<Utc>) -> f64 {
    let mut score = 0.0;
    if candidate.is_primary {
        score += 10.0;
    }

    let name = candidate.company.name.as_deref().unwrap_or("");
    let company_lower = name.to_lowercase();
    let company_token = company_lower.split_whitespace().next().unwrap_or("");
    let contact_token = contact_lower.split_whitespace().next().unwrap_or("");
    if (!company_token.is_empty() && contact_lower.contains(company_token))
        || (!contact_token.is_empty() && company_lower.contains(contact_token))
    {
        score += 20.0;
    }

    score += (name.chars().count() as f64 / 5.0).min(10.0);

    if created_recently(candidate.company.created_at, now) {
        score += 5.0;
    }
    score
}

/// Score for a company holding a sibling domain of the same corporate
/// group (`acme.it` when looking for `acme.com`)
fn variant_score(candidate: &DomainOwnerCandidate, core: &str, now: DateTime<Utc>) -> f64 {
    let mut score = 0.0;

    let variant_core = normalize_domain(&candidate.domain)
        .and_then(|d| d.split('.').next().map(|s| s.to_string()))
        .unwrap_or_default();
    if variant_core == core {
        score += 50.0;
    }

    let name = candidate.company.name.as_deref().unwrap_or("");
    if name.to_lowercase().contains(core) {
        score += 30.0;
    }

    if candidate.is_primary {
        score += 10.0;
    }

    if name.chars().count() < 50 && !name.contains('.') {
        score += 15.0;
    }

    if created_recently(candidate.company.created_at, now) {
        score += 5.0;
    }
    score
}

fn created_recently(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match created_at {
        Some(created) => (now - created).num_days() < 365,
        None => false,
    }
}

/// Suggests the company a domain belongs to: the sole exact owner, the
/// best-scored owner when several share the domain, a scored domain-group
/// variant, or an offer to create a new company.
pub async fn suggest_company_for_domain(
    store: &dyn RecordStore,
    domain: &str,
    contact_name: &str,
    now: DateTime<Utc>,
) -> Result<Option<CompanySuggestion>> {
    let Some(normalized) = normalize_domain(domain) else {
        return Ok(None);
    };

    let owners = exact_domain_owners(store, &normalized).await?;
    if owners.len() == 1 {
        let owner = owners.into_iter().next().map(|o| CompanySuggestion::Existing {
            company: o.company,
            domain: o.domain,
            is_primary_domain: o.is_primary,
            match_reason: None,
        });
        return Ok(owner);
    }
    if owners.len() > 1 {
        debug!(
            "Found {} companies sharing domain {}",
            owners.len(),
            normalized
        );
        let index = match best_owner_index(contact_name, &owners, now) {
            Some(index) => index,
            None => return Ok(None),
        };
        let reason = format!(
            "Best match among {} companies sharing {}",
            owners.len(),
            normalized
        );
        let winner = owners.into_iter().nth(index);
        return Ok(winner.map(|o| CompanySuggestion::Existing {
            company: o.company,
            domain: o.domain,
            is_primary_domain: o.is_primary,
            match_reason: Some(reason),
        }));
    }

    if let Some(core) = core_label(&normalized) {
        if let Some(suggestion) =
            variant_owner_suggestion(store, &normalized, &core, now).await?
        {
            return Ok(Some(suggestion));
        }
    }

    let label = normalized.split('.').next().unwrap_or(&normalized);
    Ok(Some(CompanySuggestion::CreateNew {
        name: capitalize_label(label),
        website: normalized.clone(),
        domain: normalized,
        category: "Corporate".to_string(),
    }))
}

/// Suggests a company for a contact from its first email address; generic
/// mail providers yield no suggestion
pub async fn suggest_company_for_contact(
    store: &dyn RecordStore,
    contact: &ContactRecord,
    emails: &[String],
    now: DateTime<Utc>,
) -> Result<Option<CompanySuggestion>> {
    let Some(email) = emails.first() else {
        return Ok(None);
    };
    let Some(domain) = extract_business_domain(email) else {
        return Ok(None);
    };
    suggest_company_for_domain(store, &domain, &contact.display_name(), now).await
}

/// All companies holding exactly this domain, tolerating stored values
/// with schemes or trailing slashes, in stored-row order
async fn exact_domain_owners(
    store: &dyn RecordStore,
    normalized: &str,
) -> Result<Vec<DomainOwnerCandidate>> {
    let exact = vec![
        normalized.to_string(),
        format!("https://{}/", normalized),
        format!("http://{}/", normalized),
        format!("{}/", normalized),
    ];
    let rows = probe_rows(
        store,
        Table::CompanyDomains,
        "domain",
        &exact,
        &[contains_pattern(normalized)],
        VARIANT_PROBE_LIMIT * 4,
    )
    .await?;

    let verified: Vec<CompanyDomainRow> = rows_to::<CompanyDomainRow>(rows)?
        .into_iter()
        .filter(|row| normalize_domain(&row.domain).as_deref() == Some(normalized))
        .collect();
    owners_for_rows(store, verified).await
}

/// Scores sibling domains sharing the core label and returns an existing
/// company when one clears the acceptance floor
async fn variant_owner_suggestion(
    store: &dyn RecordStore,
    normalized: &str,
    core: &str,
    now: DateTime<Utc>,
) -> Result<Option<CompanySuggestion>> {
    let patterns = vec![
        format!("{}.%", core),
        format!("www.{}.%", core),
        format!("%.{}.%", core),
    ];
    let rows = probe_rows(
        store,
        Table::CompanyDomains,
        "domain",
        &[],
        &patterns,
        VARIANT_PROBE_LIMIT,
    )
    .await?;

    let siblings: Vec<CompanyDomainRow> = rows_to::<CompanyDomainRow>(rows)?
        .into_iter()
        .filter(|row| normalize_domain(&row.domain).as_deref() != Some(normalized))
        .collect();
    let candidates = owners_for_rows(store, siblings).await?;
    if candidates.is_empty() {
        return Ok(None);
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = variant_score(candidate, core, now);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }

    match best {
        Some((index, score)) if score >= VARIANT_ACCEPT_SCORE => {
            let winner = candidates.into_iter().nth(index);
            Ok(winner.map(|o| CompanySuggestion::Existing {
                match_reason: Some(format!(
                    "Domain variant of {} group ({})",
                    core, o.domain
                )),
                company: o.company,
                domain: o.domain,
                is_primary_domain: o.is_primary,
            }))
        }
        _ => Ok(None),
    }
}

/// Joins domain rows to their company records, preserving row order and
/// dropping rows whose company no longer exists
async fn owners_for_rows(
    store: &dyn RecordStore,
    rows: Vec<CompanyDomainRow>,
) -> Result<Vec<DomainOwnerCandidate>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let mut ids: Vec<String> = Vec::new();
    for row in &rows {
        if !ids.contains(&row.company_id.0) {
            ids.push(row.company_id.0.clone());
        }
    }
    let companies = rows_to::<CompanyRecord>(
        store.find_by_exact_field(Table::Companies, "id", &ids).await?,
    )?;

    let mut owners = Vec::new();
    for row in rows {
        if let Some(company) = companies.iter().find(|c| c.id == row.company_id) {
            owners.push(DomainOwnerCandidate {
                company: company.clone(),
                domain: row.domain,
                is_primary: row.is_primary,
            });
        }
    }
    Ok(owners)
}
