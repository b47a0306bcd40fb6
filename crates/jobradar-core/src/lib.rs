//! Core domain model and field normalization for Job Offer Radar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobradar-core";

/// Placeholder returned by every normalizer when the input is missing or
/// empty. Normalizers never return `None` or an empty string.
pub const SENTINEL: &str = "Non spécifié";

/// Default role title applied at the batch boundary when the crawler
/// produced no title at all.
pub const DEFAULT_ROLE_TITLE: &str = "Poste non spécifié";

/// Default employer name applied at the batch boundary.
pub const DEFAULT_EMPLOYER_NAME: &str = "Entreprise non spécifiée";

/// Raw record as produced by the external crawler/extraction collaborator.
/// Every field is optional; validation and defaulting happen once at the
/// batch boundary via [`Offer::from_scraped`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedOffer {
    #[serde(default)]
    pub role_title: Option<String>,
    #[serde(default)]
    pub employer_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub posting_date: Option<String>,
    #[serde(default)]
    pub listing_url: Option<String>,
    #[serde(default)]
    pub source_page_url: Option<String>,
}

/// Validated, pre-persistence offer. Produced per crawl batch, deduplicated
/// within the batch, then upserted. Carries the raw strings untouched;
/// normalized forms are derived at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub role_title: String,
    pub employer_name: String,
    pub location: Option<String>,
    pub posting_date: Option<String>,
    pub listing_url: Option<String>,
    pub source_page_url: Option<String>,
}

impl Offer {
    /// Validate and default one raw record. Missing role/employer fall back
    /// to fixed placeholders, a listing URL that does not look like an http
    /// URL is standardized to absent rather than rejecting the offer, and a
    /// missing listing URL falls back to the page the offer was found on.
    pub fn from_scraped(raw: ScrapedOffer) -> Self {
        let listing_url = raw
            .listing_url
            .filter(|u| u.starts_with("http"))
            .or_else(|| raw.source_page_url.clone().filter(|u| u.starts_with("http")));

        Self {
            role_title: non_empty(raw.role_title).unwrap_or_else(|| DEFAULT_ROLE_TITLE.to_string()),
            employer_name: non_empty(raw.employer_name)
                .unwrap_or_else(|| DEFAULT_EMPLOYER_NAME.to_string()),
            location: non_empty(raw.location),
            posting_date: non_empty(raw.posting_date),
            listing_url,
            source_page_url: raw.source_page_url,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Persisted offer representation. `created_at` is set once on insert and
/// never overwritten; every other field refreshes on each write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOffer {
    pub id: Uuid,
    pub role_title: String,
    pub employer_name: String,
    pub location: Option<String>,
    pub posting_date: Option<String>,
    pub listing_url: Option<String>,
    pub source_page_url: Option<String>,
    pub normalized_employer: String,
    pub normalized_location: String,
    pub normalized_source_site: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Legal-entity suffixes stripped by [`normalize_company`], checked in order,
/// longest forms first so `SASU` wins over `SAS` and `SAS` over `SA`. Only
/// one suffix is removed even when several would match.
const LEGAL_SUFFIXES: &[&str] = &[
    "S.A.R.L.", "S.A.S.", "S.A.", "SASU", "SARL", "EURL", "SCOP", "GMBH", "CORP", "SAS", "SNC",
    "SCI", "INC", "LTD", "LLC", "PLC", "SRL", "SPA", "SA", "AG", "BV", "NV",
];

/// Canonicalize a free-text city/location string: strip a leading 5-digit
/// postal code, a trailing numeric district suffix (`Lyon - 3`, `Paris 15e`),
/// and a trailing parenthetical annotation (`Lyon (69)`), then collapse
/// whitespace and title-case. Empty input yields [`SENTINEL`].
pub fn normalize_city(raw: &str) -> String {
    let mut value = raw.trim();
    if value == SENTINEL {
        return SENTINEL.to_string();
    }
    value = strip_leading_postal_code(value);
    value = strip_trailing_parenthetical(value);
    value = strip_trailing_district(value);

    let collapsed = title_case(value);
    if collapsed.is_empty() {
        SENTINEL.to_string()
    } else {
        collapsed
    }
}

/// Canonicalize a company name: upper-case, collapse whitespace, strip one
/// trailing legal-entity suffix. Empty input yields [`SENTINEL`].
pub fn normalize_company(raw: &str) -> String {
    if raw.trim() == SENTINEL {
        return SENTINEL.to_string();
    }
    let upper = raw
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if upper.is_empty() {
        return SENTINEL.to_string();
    }

    for suffix in LEGAL_SUFFIXES {
        if let Some(stem) = upper.strip_suffix(suffix) {
            // Exact trailing token only: "AXA SA" matches, "ALTRAN" must not
            // lose its final "AN" to a hypothetical suffix.
            let stem = stem.trim_end_matches([' ', ',', '-']);
            if !stem.is_empty() && stem.len() < upper.len() - suffix.len() {
                return stem.to_string();
            }
        }
    }

    upper
}

/// Extract the registrable host of a URL: host portion, leading `www.`
/// stripped, lower-cased. Malformed or missing input degrades to
/// [`SENTINEL`]; this function never fails.
pub fn extract_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return SENTINEL.to_string();
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    match Url::parse(&candidate) {
        Ok(url) => match url.host_str() {
            Some(host) if !host.is_empty() => {
                let host = host.to_ascii_lowercase();
                host.strip_prefix("www.").unwrap_or(&host).to_string()
            }
            _ => SENTINEL.to_string(),
        },
        Err(_) => SENTINEL.to_string(),
    }
}

fn strip_leading_postal_code(value: &str) -> &str {
    let digits = value.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 5 {
        value[5..].trim_start_matches([' ', '-'])
    } else {
        value
    }
}

fn strip_trailing_parenthetical(value: &str) -> &str {
    let trimmed = value.trim_end();
    if trimmed.ends_with(')') {
        if let Some(open) = trimmed.rfind('(') {
            return trimmed[..open].trim_end();
        }
    }
    trimmed
}

fn strip_trailing_district(value: &str) -> &str {
    let trimmed = value.trim_end();
    let Some(sep) = trimmed.rfind([' ', '-']) else {
        return trimmed;
    };
    let suffix = trimmed[sep + 1..].trim();
    let digits = suffix
        .trim_end_matches("ème")
        .trim_end_matches("er")
        .trim_end_matches('e');
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        trimmed[..sep].trim_end_matches([' ', '-'])
    } else {
        trimmed
    }
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(capitalize_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_strips_postal_code_and_title_cases() {
        assert_eq!(normalize_city("69001 lyon"), "Lyon");
        assert_eq!(normalize_city("  PARIS  "), "Paris");
        assert_eq!(normalize_city("saint étienne"), "Saint Étienne");
    }

    #[test]
    fn city_strips_district_and_parenthetical_suffixes() {
        assert_eq!(normalize_city("Lyon - 3"), "Lyon");
        assert_eq!(normalize_city("Paris 15e"), "Paris");
        assert_eq!(normalize_city("Lyon (69)"), "Lyon");
        assert_eq!(normalize_city("Villeurbanne (Rhône) "), "Villeurbanne");
    }

    #[test]
    fn city_empty_input_degrades_to_sentinel() {
        assert_eq!(normalize_city(""), SENTINEL);
        assert_eq!(normalize_city("   "), SENTINEL);
        assert_eq!(normalize_city("75015"), SENTINEL);
        // The sentinel itself is a fixed point.
        assert_eq!(normalize_city(SENTINEL), SENTINEL);
    }

    #[test]
    fn company_upper_cases_and_strips_one_legal_suffix() {
        assert_eq!(normalize_company("Amiltone sarl"), "AMILTONE");
        assert_eq!(normalize_company("Google Inc"), "GOOGLE");
        assert_eq!(normalize_company("Activus   Group"), "ACTIVUS GROUP");
        // Trailing token only, never a substring.
        assert_eq!(normalize_company("Alstom Transport SA"), "ALSTOM TRANSPORT");
        assert_eq!(normalize_company("Casa"), "CASA");
    }

    #[test]
    fn company_normalization_is_idempotent() {
        for input in [
            "Google Inc",
            "  thales  SAS ",
            "Entreprise non spécifiée",
            SENTINEL,
            "",
        ] {
            let once = normalize_company(input);
            assert_eq!(normalize_company(&once), once);
        }
    }

    #[test]
    fn company_empty_input_degrades_to_sentinel() {
        assert_eq!(normalize_company(""), SENTINEL);
        assert_eq!(normalize_company("   "), SENTINEL);
    }

    #[test]
    fn domain_extraction_strips_scheme_and_www() {
        assert_eq!(
            extract_domain("https://www.apec.fr/candidat/recherche.html"),
            "apec.fr"
        );
        assert_eq!(
            extract_domain("http://candidat.francetravail.fr/offres/recherche/detail/6721251"),
            "candidat.francetravail.fr"
        );
        assert_eq!(extract_domain("linkedin.com/jobs/view/123"), "linkedin.com");
    }

    #[test]
    fn domain_extraction_never_fails() {
        assert_eq!(extract_domain(""), SENTINEL);
        assert_eq!(extract_domain("not a url at all"), SENTINEL);
        assert_eq!(extract_domain("https://"), SENTINEL);
    }

    #[test]
    fn scraped_offer_defaults_apply_at_the_boundary() {
        let offer = Offer::from_scraped(ScrapedOffer::default());
        assert_eq!(offer.role_title, DEFAULT_ROLE_TITLE);
        assert_eq!(offer.employer_name, DEFAULT_EMPLOYER_NAME);
        assert!(offer.listing_url.is_none());
        assert!(offer.location.is_none());
    }

    #[test]
    fn non_http_listing_url_is_standardized_to_absent() {
        let offer = Offer::from_scraped(ScrapedOffer {
            role_title: Some("Data Scientist".into()),
            employer_name: Some("Amiltone".into()),
            listing_url: Some("javascript:void(0)".into()),
            ..Default::default()
        });
        assert!(offer.listing_url.is_none());
    }

    #[test]
    fn missing_listing_url_falls_back_to_source_page() {
        let offer = Offer::from_scraped(ScrapedOffer {
            role_title: Some("Data Scientist".into()),
            employer_name: Some("Amiltone".into()),
            source_page_url: Some("https://www.apec.fr/resultats".into()),
            ..Default::default()
        });
        assert_eq!(
            offer.listing_url.as_deref(),
            Some("https://www.apec.fr/resultats")
        );
    }
}
