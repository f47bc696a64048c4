//! Location resolution for tracked shipments.
//!
//! Picks the authoritative current location from, in priority order: the
//! designated "latest location" board column, a location extracted by the
//! assisted classifier, and finally best-effort pattern extraction from the
//! raw update text.

use regex::Regex;
use std::sync::LazyLock;

/// Sentinel returned when nothing resolves.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// `CITY - CC` / `CITY-CC` forms, e.g. "COLOGNE - DE" or "Memphis-US".
static CITY_COUNTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z][A-Za-z.']*(?:\s+[A-Z][A-Za-z.']*)*)\s*-\s*([A-Z]{2})\b").unwrap()
});

/// `at CITY` / `in CITY` forms with capitalized city names, up to three words.
static AT_IN_CITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:at|in)\s+([A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+){0,2})").unwrap()
});

/// Words that look like capitalized cities in carrier text but are not.
const CITY_STOPWORDS: &[&str] = &["Transit", "Customs", "Progress", "Process", "Clearance"];

/// Scan-event verbs that the city/country regex can pick up ahead of the
/// actual city ("Arrived ISTANBUL - TR").
const SCAN_VERBS: &[&str] = &[
    "arrived",
    "arrival",
    "departed",
    "departure",
    "processed",
    "scan",
    "held",
    "clearance",
];

/// ISO 3166 alpha-2 codes seen in carrier scans, expanded to display names.
const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("AE", "United Arab Emirates"),
    ("AT", "Austria"),
    ("AU", "Australia"),
    ("BE", "Belgium"),
    ("CA", "Canada"),
    ("CH", "Switzerland"),
    ("CN", "China"),
    ("CZ", "Czechia"),
    ("DE", "Germany"),
    ("DK", "Denmark"),
    ("ES", "Spain"),
    ("FI", "Finland"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("HK", "Hong Kong"),
    ("IE", "Ireland"),
    ("IN", "India"),
    ("IT", "Italy"),
    ("JP", "Japan"),
    ("KR", "South Korea"),
    ("MX", "Mexico"),
    ("NL", "Netherlands"),
    ("NO", "Norway"),
    ("PL", "Poland"),
    ("PT", "Portugal"),
    ("SE", "Sweden"),
    ("SG", "Singapore"),
    ("TR", "Turkey"),
    ("US", "United States"),
];

/// Expand a two-letter country code to its display name.
#[must_use]
pub fn country_name(code: &str) -> Option<&'static str> {
    COUNTRY_NAMES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// Resolve the authoritative location for a shipment.
///
/// Priority: structured "latest location" column (authoritative,
/// short-circuits) > assisted-classifier extraction > pattern extraction
/// from the update text. Falls back to [`UNKNOWN_LOCATION`].
#[must_use]
pub fn resolve_location(
    structured: Option<&str>,
    assist_hint: Option<&str>,
    update_text: Option<&str>,
) -> String {
    if let Some(value) = structured.map(str::trim).filter(|v| !v.is_empty()) {
        return value.to_string();
    }

    if let Some(value) = assist_hint.map(str::trim).filter(|v| !v.is_empty()) {
        return value.to_string();
    }

    if let Some(found) = update_text.and_then(extract_location) {
        return found;
    }

    UNKNOWN_LOCATION.to_string()
}

/// Best-effort extraction of a location from free carrier text.
///
/// Uses the *last* match in the text - carrier scans list events oldest to
/// newest, so the last mentioned location is the most recent one.
#[must_use]
pub fn extract_location(text: &str) -> Option<String> {
    let mut last: Option<String> = None;
    for caps in CITY_COUNTRY_RE.captures_iter(text) {
        let Some(city) = strip_scan_verbs(&caps[1]) else {
            continue;
        };
        let city = title_case(&city);
        let code = &caps[2];
        last = Some(match country_name(code) {
            Some(country) => format!("{city}, {country}"),
            None => format!("{city}, {code}"),
        });
    }
    if last.is_some() {
        return last;
    }

    AT_IN_CITY_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let candidate = caps[1].trim().to_string();
            let first_word = candidate.split_whitespace().next().unwrap_or_default();
            if CITY_STOPWORDS.contains(&first_word) {
                None
            } else {
                Some(candidate)
            }
        })
        .last()
}

/// Drop leading scan-event verbs from a city capture.
fn strip_scan_verbs(capture: &str) -> Option<String> {
    let words: Vec<&str> = capture
        .split_whitespace()
        .skip_while(|w| SCAN_VERBS.contains(&w.to_lowercase().as_str()))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Title-case a city name that carriers often report in all caps.
fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
