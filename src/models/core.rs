// src/models/core.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//------------------------------------------------------------------------------
// IDENTIFIER TYPES
//------------------------------------------------------------------------------
// Using newtype pattern for type safety to prevent mixing different ID types

/// Strongly typed identifier for Contact records
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(pub String);

/// Strongly typed identifier for Company records
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub String);

/// Identifier for a record whose kind is carried separately as an
/// [`EntityType`]. Duplicate pairs, integrity issues and merge intents all
/// reference contacts or companies through this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl From<ContactId> for EntityId {
    fn from(id: ContactId) -> Self {
        EntityId(id.0)
    }
}

impl From<CompanyId> for EntityId {
    fn from(id: CompanyId) -> Self {
        EntityId(id.0)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two record kinds the engine reconciles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Contact,
    Company,
}

impl EntityType {
    /// Converts the enum to a string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Contact => "contact",
            Self::Company => "company",
        }
    }

    /// Creates the enum from a string representation
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "company" => Self::Company,
            _ => Self::Contact,
        }
    }
}

//------------------------------------------------------------------------------
// CORE DOMAIN MODELS
//------------------------------------------------------------------------------

/// A contact row as stored by the external system
///
/// The engine only reads contacts; creation and edits belong to the
/// surrounding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Unique identifier for this contact
    pub id: ContactId,

    /// Given name as entered by operators
    #[serde(default)]
    pub first_name: Option<String>,

    /// Family name as entered by operators
    #[serde(default)]
    pub last_name: Option<String>,

    /// LinkedIn profile URL, free-form
    #[serde(default)]
    pub linkedin: Option<String>,

    /// Operator-assigned category label
    #[serde(default)]
    pub category: Option<String>,

    /// When this contact was first created
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ContactRecord {
    /// Display name in "First Last" form, trimmed; empty when both parts are
    /// missing
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        format!("{} {}", first, last).trim().to_string()
    }
}

/// One email address attached to a contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactEmailRow {
    /// The contact this address belongs to
    pub contact_id: ContactId,

    /// Raw address as stored
    pub email: String,

    /// Whether this is the contact's primary address
    #[serde(default)]
    pub is_primary: bool,
}

/// One mobile number attached to a contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMobileRow {
    /// The contact this number belongs to
    pub contact_id: ContactId,

    /// Raw number as stored
    pub mobile: String,

    /// Whether this is the contact's primary number
    #[serde(default)]
    pub is_primary: bool,
}

/// A company row as stored by the external system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Unique identifier for this company
    pub id: CompanyId,

    /// Company display name
    #[serde(default)]
    pub name: Option<String>,

    /// LinkedIn company page URL, free-form
    #[serde(default)]
    pub linkedin: Option<String>,

    /// Company website URL, free-form
    #[serde(default)]
    pub website: Option<String>,

    /// Operator-assigned category label
    #[serde(default)]
    pub category: Option<String>,

    /// When this company was first created
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One web domain attached to a company
///
/// Domains carry their own primary flag and creation time because the
/// disambiguator scores on both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyDomainRow {
    /// The company this domain belongs to
    pub company_id: CompanyId,

    /// Domain in stored form (normalized on write by this engine's callers)
    pub domain: String,

    /// Whether this is the company's primary domain
    #[serde(default)]
    pub is_primary: bool,

    /// When the domain row was created
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

//------------------------------------------------------------------------------
// SCAN INPUTS
//------------------------------------------------------------------------------

/// The identifier set of a contact being scanned for duplicates
///
/// Built by the caller from current form state or a stored record; the
/// engine never refetches the subject itself.
#[derive(Debug, Clone, Default)]
pub struct ContactIdentifiers {
    /// The contact under inspection; `None` when scanning an unsaved draft
    pub contact_id: Option<ContactId>,

    /// All email addresses currently attached
    pub emails: Vec<String>,

    /// All mobile numbers currently attached
    pub mobiles: Vec<String>,

    /// LinkedIn URL, raw
    pub linkedin: Option<String>,

    /// Given name, raw
    pub first_name: Option<String>,

    /// Family name, raw
    pub last_name: Option<String>,
}

/// The identifier set of a company being scanned for duplicates
#[derive(Debug, Clone, Default)]
pub struct CompanyIdentifiers {
    /// The company under inspection; `None` when scanning an unsaved draft
    pub company_id: Option<CompanyId>,

    /// Company display name, raw
    pub name: Option<String>,

    /// LinkedIn URL, raw
    pub linkedin: Option<String>,

    /// Website URL, raw
    pub website: Option<String>,

    /// All domains currently attached, raw
    pub domains: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip() {
        assert_eq!(EntityType::from_str("contact"), EntityType::Contact);
        assert_eq!(EntityType::from_str("COMPANY"), EntityType::Company);
        assert_eq!(EntityType::Company.as_str(), "company");
    }

    #[test]
    fn test_display_name_trims_missing_parts() {
        let contact = ContactRecord {
            id: ContactId("c1".to_string()),
            first_name: Some("Jane".to_string()),
            last_name: None,
            linkedin: None,
            category: None,
            created_at: None,
        };
        assert_eq!(contact.display_name(), "Jane");
    }
}
