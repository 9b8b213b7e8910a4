// src/models/matching.rs

use serde::{Deserialize, Serialize};

use super::core::EntityId;

/// Enum for supported match types
///
/// The identifier category that produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Matching based on normalized email addresses
    Email,

    /// Matching based on normalized mobile numbers
    Mobile,

    /// Matching based on normalized LinkedIn URLs
    Linkedin,

    /// Matching based on a shared web domain
    Domain,

    /// Matching based on normalized website URLs
    Website,

    /// Matching based on name similarity
    Name,

    /// Operator-flagged or previously detected pair re-surfaced by a scan
    Manual,
}

impl MatchType {
    /// Converts the enum to a string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Email => "email",
            Self::Mobile => "mobile",
            Self::Linkedin => "linkedin",
            Self::Domain => "domain",
            Self::Website => "website",
            Self::Name => "name",
            Self::Manual => "manual",
        }
    }

    /// Creates the enum from a string representation
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "email" => Self::Email,
            "mobile" => Self::Mobile,
            "linkedin" => Self::Linkedin,
            "domain" => Self::Domain,
            "website" => Self::Website,
            "name" => Self::Name,
            _ => Self::Manual,
        }
    }
}

/// One potential duplicate found by a scan
///
/// Ephemeral output of the candidate finders; never persisted. A scan that
/// decides to keep a candidate turns it into a `DuplicatePair`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// The other record this candidate points at
    pub entity_id: EntityId,

    /// The identifier category that matched
    pub match_type: MatchType,

    /// The shared value in normalized form (or a short marker for manual
    /// candidates)
    pub matched_value: String,

    /// Confidence in [0.0, 1.0]; exact identifier matches score higher than
    /// fuzzy name matches
    pub confidence_score: f64,

    /// Human-readable reason shown to the reviewing operator
    pub match_reason: String,
}
