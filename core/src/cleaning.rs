//! Property normalization applied once before persistence.
//!
//! Ingested and extracted values arrive messy: padded whitespace, mixed
//! date notations, formatted numbers, inconsistent casing. The cleaner
//! rewrites what it can recognize and passes the rest through untouched;
//! it never invents or drops evidence beyond exact duplicates.

use crate::types::PropertyMap;
use chrono::NaiveDate;
use std::collections::HashSet;

const DATE_INPUT_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%m-%d-%Y",
];

const COUNTRY_CODE_LENGTH: usize = 2;
const YEAR_LENGTH: usize = 4;
const YEAR_MONTH_LENGTH: usize = 7;
const MAX_MONTH_VALUE: u32 = 12;

const DATE_FIELDS: [&str; 9] = [
    "birthDate",
    "deathDate",
    "date",
    "startDate",
    "endDate",
    "incorporationDate",
    "dissolutionDate",
    "retrievedAt",
    "modifiedAt",
];

const NUMERIC_FIELDS: [&str; 7] = [
    "amount",
    "amountUsd",
    "amountEur",
    "confidence",
    "percentage",
    "charStart",
    "charEnd",
];

const LOWERCASE_FIELDS: [&str; 3] = ["email", "sourceUrl", "website"];

const COUNTRY_FIELDS: [&str; 4] = ["country", "countries", "nationality", "jurisdiction"];

/// Clean entity properties after extraction and ingestion.
#[derive(Debug, Clone, Default)]
pub struct PropertyCleaner;

impl PropertyCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Normalize and deduplicate every value list; keys whose lists come
    /// out empty are dropped.
    pub fn clean(&self, properties: &PropertyMap) -> PropertyMap {
        let mut cleaned = PropertyMap::new();
        for (key, values) in properties.iter() {
            let normalized: Vec<String> = values
                .iter()
                .filter_map(|value| self.normalize_value(key, value))
                .collect();
            let deduped = Self::dedupe(normalized);
            if !deduped.is_empty() {
                cleaned.set(key.clone(), deduped);
            }
        }
        cleaned
    }

    fn normalize_value(&self, key: &str, value: &str) -> Option<String> {
        let text = value.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return None;
        }

        if DATE_FIELDS.contains(&key) {
            return Some(Self::normalize_date(&text).unwrap_or(text));
        }

        if NUMERIC_FIELDS.contains(&key) {
            return Some(Self::normalize_number(&text).unwrap_or(text));
        }

        if COUNTRY_FIELDS.contains(&key) {
            if text.chars().count() == COUNTRY_CODE_LENGTH {
                return Some(text.to_lowercase());
            }
            return Some(text);
        }

        if LOWERCASE_FIELDS.contains(&key) {
            return Some(text.to_lowercase());
        }

        Some(text)
    }

    fn normalize_date(value: &str) -> Option<String> {
        if value.len() == YEAR_LENGTH && value.chars().all(|ch| ch.is_ascii_digit()) {
            return Some(value.to_string());
        }

        if value.len() == YEAR_MONTH_LENGTH && value.is_ascii() {
            let separator = value.as_bytes()[YEAR_LENGTH] as char;
            if separator == '-' || separator == '/' {
                let (year, month) = value.split_at(YEAR_LENGTH);
                let month = &month[1..];
                if year.chars().all(|ch| ch.is_ascii_digit())
                    && month.chars().all(|ch| ch.is_ascii_digit())
                {
                    if let Ok(month_value) = month.parse::<u32>() {
                        if (1..=MAX_MONTH_VALUE).contains(&month_value) {
                            return Some(format!("{year}-{month_value:02}"));
                        }
                    }
                }
            }
        }

        for format in DATE_INPUT_FORMATS {
            if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
                return Some(parsed.format("%Y-%m-%d").to_string());
            }
        }
        None
    }

    fn normalize_number(value: &str) -> Option<String> {
        let compact: String = value.chars().filter(|ch| *ch != ',' && *ch != ' ').collect();
        let compact = compact.strip_suffix('%').unwrap_or(&compact);

        let number: f64 = compact.parse().ok()?;
        if !number.is_finite() {
            return None;
        }

        if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
            return Some(format!("{}", number as i64));
        }
        Some(number.to_string())
    }

    fn dedupe(values: Vec<String>) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut deduped = Vec::with_capacity(values.len());
        for value in values {
            let key = value.to_lowercase();
            if seen.insert(key) {
                deduped.push(value);
            }
        }
        deduped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &[&str])]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn collapses_whitespace_and_drops_empties() {
        let cleaner = PropertyCleaner::new();
        let cleaned = cleaner.clean(&props(&[("name", &["  John   Doe ", "", "  "])]));
        assert_eq!(cleaned.values("name"), ["John Doe"]);
    }

    #[test]
    fn empty_lists_are_dropped_entirely() {
        let cleaner = PropertyCleaner::new();
        let cleaned = cleaner.clean(&props(&[("notes", &["", " "])]));
        assert!(!cleaned.contains_key("notes"));
    }

    #[test]
    fn rewrites_common_date_formats() {
        let cleaner = PropertyCleaner::new();
        let cleaned = cleaner.clean(&props(&[(
            "birthDate",
            &["1980", "1980-02", "1980/03", "12/31/1999", "31-12-1999", "2020/01/05"],
        )]));
        assert_eq!(
            cleaned.values("birthDate"),
            ["1980", "1980-02", "1980-03", "1999-12-31", "2020-01-05"]
        );
    }

    #[test]
    fn invalid_month_passes_through() {
        let cleaner = PropertyCleaner::new();
        let cleaned = cleaner.clean(&props(&[("startDate", &["1980-13", "sometime"])]));
        assert_eq!(cleaned.values("startDate"), ["1980-13", "sometime"]);
    }

    #[test]
    fn normalizes_numbers() {
        let cleaner = PropertyCleaner::new();
        let cleaned = cleaner.clean(&props(&[
            ("amount", &["1,234,567", "12 000", "9.8%"]),
            ("percentage", &["9.80%"]),
            ("confidence", &["0.930"]),
        ]));
        assert_eq!(cleaned.values("amount"), ["1234567", "12000", "9.8"]);
        assert_eq!(cleaned.values("percentage"), ["9.8"]);
        assert_eq!(cleaned.values("confidence"), ["0.93"]);
    }

    #[test]
    fn unparseable_numbers_pass_through() {
        let cleaner = PropertyCleaner::new();
        let cleaned = cleaner.clean(&props(&[("amount", &["a lot"])]));
        assert_eq!(cleaned.values("amount"), ["a lot"]);
    }

    #[test]
    fn country_codes_lowercase_only_iso2() {
        let cleaner = PropertyCleaner::new();
        let cleaned = cleaner.clean(&props(&[
            ("country", &["US", "Germany"]),
            ("jurisdiction", &["GB"]),
        ]));
        assert_eq!(cleaned.values("country"), ["us", "Germany"]);
        assert_eq!(cleaned.values("jurisdiction"), ["gb"]);
    }

    #[test]
    fn lowercases_emails_and_urls() {
        let cleaner = PropertyCleaner::new();
        let cleaned = cleaner.clean(&props(&[
            ("email", &["Jane@Example.ORG"]),
            ("sourceUrl", &["HTTPS://Example.org/Doc"]),
        ]));
        assert_eq!(cleaned.values("email"), ["jane@example.org"]);
        assert_eq!(cleaned.values("sourceUrl"), ["https://example.org/doc"]);
    }

    #[test]
    fn dedupes_case_insensitively_keeping_first_case() {
        let cleaner = PropertyCleaner::new();
        let cleaned = cleaner.clean(&props(&[("name", &["ACME Corp", "Acme Corp", "acme corp"])]));
        assert_eq!(cleaned.values("name"), ["ACME Corp"]);
    }
}
