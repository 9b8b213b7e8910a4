// src/matching/mod.rs

pub mod companies;
pub mod contacts;
pub mod domain_owner;
pub mod manager;
pub mod normalize;
pub mod similarity;

use std::collections::HashMap;

use anyhow::Result;
use serde_json::Value;

use crate::models::{EntityId, MatchCandidate};
use crate::store::{RecordStore, Table};

/// Keeps the strongest candidate seen so far for each other entity.
/// Later checks only displace an earlier hit with a strictly higher
/// confidence, so equal-scored rematches preserve check order.
pub(crate) fn consider_candidate(
    best: &mut HashMap<EntityId, MatchCandidate>,
    candidate: MatchCandidate,
) {
    match best.get(&candidate.entity_id) {
        Some(existing) if existing.confidence_score >= candidate.confidence_score => {}
        _ => {
            best.insert(candidate.entity_id.clone(), candidate);
        }
    }
}

/// Flattens the accumulation map into a deterministic output order:
/// confidence descending, entity id as tiebreak.
pub(crate) fn ranked_candidates(best: HashMap<EntityId, MatchCandidate>) -> Vec<MatchCandidate> {
    let mut candidates: Vec<MatchCandidate> = best.into_values().collect();
    candidates.sort_by(|a, b| {
        b.confidence_score
            .partial_cmp(&a.confidence_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entity_id.0.cmp(&b.entity_id.0))
    });
    candidates
}

/// Broad row probe over one identifier column: one exact `IN` query plus a
/// pattern sweep per supplied pattern, unioned without duplicates.
///
/// Stored values are not guaranteed to be normalized, so the patterns cast
/// a wide net and every caller re-verifies rows against its normalized
/// targets before treating them as matches.
pub(crate) async fn probe_rows(
    store: &dyn RecordStore,
    table: Table,
    field: &str,
    exact_values: &[String],
    patterns: &[String],
    limit: i64,
) -> Result<Vec<Value>> {
    let mut rows = if exact_values.is_empty() {
        Vec::new()
    } else {
        store.find_by_exact_field(table, field, exact_values).await?
    };
    for pattern in patterns {
        for row in store.find_by_pattern(table, field, pattern, limit).await? {
            if !rows.contains(&row) {
                rows.push(row);
            }
        }
    }
    Ok(rows)
}

/// Case-insensitive containment pattern for a stored value that may carry
/// extra whitespace or casing around the normalized form
pub(crate) fn contains_pattern(value: &str) -> String {
    format!("%{}%", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchType;

    fn candidate(id: &str, confidence: f64, match_type: MatchType) -> MatchCandidate {
        MatchCandidate {
            entity_id: EntityId(id.to_string()),
            match_type,
            matched_value: "x".to_string(),
            confidence_score: confidence,
            match_reason: "test".to_string(),
        }
    }

    #[test]
    fn test_consider_candidate_keeps_strongest() {
        let mut best = HashMap::new();
        consider_candidate(&mut best, candidate("a", 0.96, MatchType::Mobile));
        consider_candidate(&mut best, candidate("a", 0.97, MatchType::Linkedin));
        consider_candidate(&mut best, candidate("a", 0.90, MatchType::Name));
        assert_eq!(best.len(), 1);
        assert_eq!(best[&EntityId("a".to_string())].match_type, MatchType::Linkedin);
    }

    #[test]
    fn test_consider_candidate_first_wins_on_tie() {
        let mut best = HashMap::new();
        let mut first = candidate("a", 0.90, MatchType::Name);
        first.matched_value = "first".to_string();
        let mut second = candidate("a", 0.90, MatchType::Name);
        second.matched_value = "second".to_string();
        consider_candidate(&mut best, first);
        consider_candidate(&mut best, second);
        assert_eq!(best[&EntityId("a".to_string())].matched_value, "first");
    }

    #[test]
    fn test_ranked_candidates_order() {
        let mut best = HashMap::new();
        consider_candidate(&mut best, candidate("b", 0.90, MatchType::Name));
        consider_candidate(&mut best, candidate("a", 0.98, MatchType::Email));
        consider_candidate(&mut best, candidate("c", 0.90, MatchType::Name));
        let ranked = ranked_candidates(best);
        let ids: Vec<&str> = ranked.iter().map(|c| c.entity_id.0.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
