// src/matching/normalize.rs
//
// Pure canonicalization of raw identifier strings. Every function here is
// idempotent: feeding a result back in returns it unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Mail providers whose domains say nothing about a company
pub const GENERIC_EMAIL_PROVIDERS: [&str; 8] = [
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "icloud.com",
    "me.com",
    "aol.com",
    "protonmail.com",
];

/// Domain labels too generic to identify a company
const GENERIC_CORE_TOKENS: [&str; 4] = ["www", "mail", "email", "app"];

static SCHEME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://").expect("valid regex"));

static MOBILE_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-().]").expect("valid regex"));

static TLD_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(com|net|org|io|co|uk|it|de|fr|es|eu)$").expect("valid regex"));

static LEGAL_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(ltd|llc|inc|corp|srl|spa|gmbh|sa|ag|plc)\.?$").expect("valid regex")
});

static NAME_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\s\-_.,'"&+]"#).expect("valid regex"));

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Lowercase and trim; empty input yields `None`
pub fn normalize_email(raw: &str) -> Option<String> {
    non_empty(raw.trim().to_lowercase())
}

/// Strips whitespace, hyphens, parentheses and periods; no other
/// transformation, so differing country-code conventions stay distinct
pub fn normalize_mobile(raw: &str) -> Option<String> {
    non_empty(MOBILE_PUNCT_RE.replace_all(raw, "").into_owned())
}

/// Lowercase and trim; empty input yields `None` so that two blank
/// profiles never count as a match
pub fn normalize_linkedin(raw: &str) -> Option<String> {
    non_empty(raw.trim().to_lowercase())
}

/// Reduces a URL or bare domain to its host: lowercase, scheme and `www.`
/// stripped, path and port cut off
///
/// Proper URLs go through the `url` parser; anything it rejects falls back
/// to a permissive string pass so malformed input still normalizes.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }
    // Not web addresses; their "host" would be meaningless here.
    if trimmed.starts_with("mailto:") || trimmed.starts_with("tel:") {
        return None;
    }

    let candidate = if trimmed.contains("://") {
        trimmed.clone()
    } else {
        format!("https://{}", trimmed)
    };
    if let Ok(parsed) = Url::parse(&candidate) {
        if let Some(host) = parsed.host_str() {
            let host = host.strip_prefix("www.").unwrap_or(host);
            return non_empty(host.to_string());
        }
    }

    // Best-effort fallback for input the parser rejects.
    let stripped = SCHEME_RE.replace(&trimmed, "");
    let stripped = stripped.strip_prefix("www.").unwrap_or(&stripped);
    let host = stripped
        .split('/')
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("");
    non_empty(host.to_string())
}

/// Reduces a company name to a comparison key: lowercase, trailing
/// TLD-like and legal suffixes stripped, all whitespace and punctuation
/// removed
///
/// The strip passes run to a fixpoint; one pass can expose another
/// strippable suffix ("Acme S.A." collapses to "acmesa" and then "acme").
pub fn normalize_company_name(raw: &str) -> Option<String> {
    let mut current = raw.trim().to_lowercase();
    loop {
        let mut next = TLD_SUFFIX_RE.replace(&current, "").into_owned();
        next = LEGAL_SUFFIX_RE.replace(&next, "").into_owned();
        next = NAME_PUNCT_RE.replace_all(&next, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    non_empty(current)
}

/// Domain of an email address when it can identify an employer; free mail
/// providers yield `None`
pub fn extract_business_domain(email: &str) -> Option<String> {
    let normalized = normalize_email(email)?;
    let (_, domain_part) = normalized.split_once('@')?;
    let domain = normalize_domain(domain_part)?;
    if GENERIC_EMAIL_PROVIDERS.contains(&domain.as_str()) {
        return None;
    }
    Some(domain)
}

/// The identifying first label of a domain, `www.` stripped; labels that
/// are too short or too generic yield `None`
pub fn core_label(domain: &str) -> Option<String> {
    let normalized = normalize_domain(domain)?;
    let label = normalized.split('.').next().unwrap_or("");
    if label.len() <= 3 || GENERIC_CORE_TOKENS.contains(&label) {
        return None;
    }
    Some(label.to_string())
}

/// Display-name form of a core label, for create-company suggestions
pub fn capitalize_label(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
