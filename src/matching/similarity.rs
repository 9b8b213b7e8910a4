// src/matching/similarity.rs
//
// Scoring heuristics for fuzzy comparison of names. These deliberately
// favor recall over precision: everything they flag goes to a human
// review queue, nothing is merged automatically.

use crate::matching::normalize::normalize_company_name;
use crate::models::MatchType;

pub const CONFIDENCE_EMAIL: f64 = 0.98;
pub const CONFIDENCE_MOBILE: f64 = 0.96;
pub const CONFIDENCE_LINKEDIN: f64 = 0.97;
pub const CONFIDENCE_DOMAIN: f64 = 0.95;
pub const CONFIDENCE_WEBSITE: f64 = 0.93;
pub const CONFIDENCE_NAME: f64 = 0.90;
pub const CONFIDENCE_MANUAL: f64 = 0.99;

/// Candidates scoring below this are dropped before a pair is recorded
pub const DUPLICATE_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Default confidence assigned to a match of the given kind
pub fn base_confidence(match_type: MatchType) -> f64 {
    match match_type {
        MatchType::Email => CONFIDENCE_EMAIL,
        MatchType::Mobile => CONFIDENCE_MOBILE,
        MatchType::Linkedin => CONFIDENCE_LINKEDIN,
        MatchType::Domain => CONFIDENCE_DOMAIN,
        MatchType::Website => CONFIDENCE_WEBSITE,
        MatchType::Name => CONFIDENCE_NAME,
        MatchType::Manual => CONFIDENCE_MANUAL,
    }
}

/// Unit-cost edit distance, symmetric in its arguments
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Normalized similarity in [0, 1]: identical non-empty strings score 1.0,
/// an empty side scores 0.0, anything else is 1 - distance / max_len
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - levenshtein_distance(&a, &b) as f64 / max_len as f64
}

/// Whether two raw company names plausibly refer to the same company.
///
/// Both names are normalized, then run through an OR-cascade: exact
/// equality, containment of one in the other (shorter side at least 4
/// chars), an 80% shared prefix of at least 4 chars, and finally a
/// bounded edit distance for names of length 5 or more.
pub fn company_names_similar(name_a: &str, name_b: &str) -> bool {
    let (a, b) = match (normalize_company_name(name_a), normalize_company_name(name_b)) {
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    if a == b {
        return true;
    }

    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let min_len = a_len.min(b_len);
    let max_len = a_len.max(b_len);

    if min_len >= 4 && (a.contains(&b) || b.contains(&a)) {
        return true;
    }

    let (shorter, longer) = if a_len <= b_len { (&a, &b) } else { (&b, &a) };
    let prefix_len = (min_len as f64 * 0.8).floor() as usize;
    if prefix_len >= 4 {
        let prefix: String = shorter.chars().take(prefix_len).collect();
        if longer.starts_with(&prefix) {
            return true;
        }
    }

    if min_len >= 5 {
        let allowed = 1.max((max_len as f64 * 0.15).floor() as usize);
        if levenshtein_distance(&a, &b) <= allowed {
            return true;
        }
    }

    false
}

/// Last-name acceptance rules for contacts whose first names already
/// match exactly: equal, a 3+ char prefix of one another, sharing a
/// leading trigram at comparable lengths, or both absent.
pub fn last_names_compatible(last_a: &str, last_b: &str) -> bool {
    let a = last_a.trim().to_lowercase();
    let b = last_b.trim().to_lowercase();

    if a.is_empty() && b.is_empty() {
        return true;
    }
    if a == b {
        return true;
    }

    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let (shorter, longer, short_len) = if a_len <= b_len {
        (&a, &b, a_len)
    } else {
        (&b, &a, b_len)
    };
    if short_len >= 3 && longer.starts_with(shorter.as_str()) {
        return true;
    }

    if a_len >= 4 && b_len >= 4 && a_len.abs_diff(b_len) <= 2 {
        let a_head: String = a.chars().take(3).collect();
        let b_head: String = b.chars().take(3).collect();
        if b.contains(&a_head) || a.contains(&b_head) {
            return true;
        }
    }

    false
}
