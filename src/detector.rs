//! Sensitive-pattern detection for profiled attributes
//!
//! Each check is an ordered list of gate stages (name, format, logical
//! constraints) that short-circuits to "not a candidate" at the first
//! failing stage. Thresholds live in [`DetectorConfig`].

use crate::profile::PatternFlags;
use aho_corasick::AhoCorasick;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static SSN_HYPHENATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}-\d{2}-\d{4}$").expect("valid SSN regex"));
static SSN_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{9}$").expect("valid SSN regex"));

const DOB_NAME_KEYWORDS: &[&str] = &["dob", "birth", "date_of_birth", "birthday"];
const SSN_NAME_KEYWORDS: &[&str] = &["ssn", "social", "security"];

static DOB_NAME_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(DOB_NAME_KEYWORDS)
        .expect("valid keyword set")
});
static SSN_NAME_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(SSN_NAME_KEYWORDS)
        .expect("valid keyword set")
});

/// Ordered datetime formats tried before the date-only table.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Ordered date formats; the first matching format wins per value. The
/// same table backs DATETIME format ranking in the profiling engine.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%m/%d/%y",
];

/// Parse a raw value as a timestamp, returning the matched format label.
/// RFC 3339 is tried first (labelled `%+`), then the explicit tables.
pub(crate) fn parse_temporal(value: &str) -> Option<(NaiveDateTime, &'static str)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some((dt.naive_utc(), "%+"));
    }
    for &format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some((dt, format));
        }
    }
    for &format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some((date.and_time(chrono::NaiveTime::MIN), format));
        }
    }
    None
}

/// Tunable thresholds for pattern detection. Every gate passes only when
/// its success fraction is strictly greater than the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Upper bound on how many sample values each check inspects.
    pub sample_size: usize,
    /// Minimum fraction of samples that must match the expected format.
    pub format_threshold: f64,
    /// Minimum fraction of format-matching samples that must pass the
    /// logical constraints.
    pub logical_threshold: f64,
    /// Oldest plausible age, in years, for a date of birth.
    pub max_age_years: f64,
    /// Reference date for DOB plausibility; fixing it makes detection
    /// deterministic across runs.
    pub reference_date: NaiveDate,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_size: 100,
            format_threshold: 0.90,
            logical_threshold: 0.90,
            max_age_years: 120.0,
            reference_date: Utc::now().date_naive(),
        }
    }
}

/// Stateless classifier for SSN and date-of-birth candidate attributes.
pub struct PatternDetector {
    config: DetectorConfig,
}

impl PatternDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(DetectorConfig::default())
    }

    /// Classify an attribute from its name and a sample of its values.
    /// Zero usable samples means insufficient evidence, not an error:
    /// both flags come back false.
    pub fn scan(&self, attribute_name: &str, samples: &[String]) -> PatternFlags {
        let usable: Vec<&str> = samples
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .take(self.config.sample_size)
            .collect();
        if usable.is_empty() {
            return PatternFlags::default();
        }
        PatternFlags {
            is_ssn_candidate: self.scan_ssn(attribute_name, &usable),
            is_dob_candidate: self.scan_dob(attribute_name, &usable),
        }
    }

    fn scan_ssn(&self, attribute_name: &str, samples: &[&str]) -> bool {
        // Name keywords inform reporting only; they never gate the check.
        if SSN_NAME_MATCHER.is_match(attribute_name) {
            debug!(attribute = attribute_name, "attribute name suggests SSN content");
        }

        let matching: Vec<&str> = samples
            .iter()
            .copied()
            .filter(|v| SSN_HYPHENATED.is_match(v) || SSN_BARE.is_match(v))
            .collect();
        if matching.is_empty() {
            return false;
        }
        let format_pct = matching.len() as f64 / samples.len() as f64;
        if format_pct <= self.config.format_threshold {
            return false;
        }

        let plausible = matching.iter().filter(|v| plausible_ssn(v)).count();
        let logical_pct = plausible as f64 / matching.len() as f64;
        logical_pct > self.config.logical_threshold
    }

    fn scan_dob(&self, attribute_name: &str, samples: &[&str]) -> bool {
        if !DOB_NAME_MATCHER.is_match(attribute_name) {
            return false;
        }

        let parsed: Vec<NaiveDateTime> = samples
            .iter()
            .filter_map(|v| parse_temporal(v).map(|(dt, _)| dt))
            .collect();
        let format_pct = parsed.len() as f64 / samples.len() as f64;
        if parsed.is_empty() || format_pct <= self.config.format_threshold {
            return false;
        }

        let plausible = parsed.iter().filter(|dt| self.plausible_dob(dt)).count();
        let logical_pct = plausible as f64 / parsed.len() as f64;
        logical_pct > self.config.logical_threshold
    }

    fn plausible_dob(&self, dt: &NaiveDateTime) -> bool {
        let date = dt.date();
        if date > self.config.reference_date {
            return false;
        }
        let age_years = (self.config.reference_date - date).num_days() as f64 / 365.25;
        (0.0..=self.config.max_age_years).contains(&age_years)
    }
}

/// Logical constraints on a format-matching SSN: area number outside
/// {000, 666} and [900, 999], group number not 00, serial not 0000.
fn plausible_ssn(value: &str) -> bool {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 9 {
        return false;
    }
    let area = &digits[0..3];
    let group = &digits[3..5];
    let serial = &digits[5..9];

    if area == "000" || area == "666" || area >= "900" {
        return false;
    }
    if group == "00" {
        return false;
    }
    serial != "0000"
}
