//! Profile records and attribute identity

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies a column to profile. Immutable once selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Source identifier (connection alias, file stem, ...).
    pub source: String,
    /// Schema-qualified table, when the source has one.
    pub table: Option<String>,
    pub column: String,
    /// Declared type name from the source catalog, if known.
    pub declared_type: Option<String>,
}

impl AttributeDescriptor {
    pub fn new(source: impl Into<String>, table: Option<&str>, column: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            table: table.map(str::to_string),
            column: column.into(),
            declared_type: None,
        }
    }

    pub fn with_declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }

    pub fn key(&self) -> AttributeKey {
        AttributeKey {
            source: self.source.clone(),
            table: self.table.clone(),
            column: self.column.clone(),
        }
    }
}

/// Unique identity of a profiled attribute. One current profile exists
/// per key; re-profiling the same key supersedes the previous record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeKey {
    pub source: String,
    pub table: Option<String>,
    pub column: String,
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}.{}", self.source, table, self.column),
            None => write!(f, "{}.{}", self.source, self.column),
        }
    }
}

/// Logical type resolved for an attribute. Drives which metric block is
/// populated; `Unsupported` marks columns with no usable non-null data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectedType {
    Numeric,
    String,
    DateTime,
    Boolean,
    Unsupported,
}

impl fmt::Display for DetectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectedType::Numeric => write!(f, "NUMERIC"),
            DetectedType::String => write!(f, "STRING"),
            DetectedType::DateTime => write!(f, "DATETIME"),
            DetectedType::Boolean => write!(f, "BOOLEAN"),
            DetectedType::Unsupported => write!(f, "UNSUPPORTED"),
        }
    }
}

/// Sensitive-pattern candidate flags. Only meaningful for STRING
/// attributes; defaults to both false elsewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternFlags {
    pub is_ssn_candidate: bool,
    pub is_dob_candidate: bool,
}

/// One quantile of a numeric attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantile {
    pub percentile: f64,
    pub value: f64,
}

/// Fixed-width histogram. `bin_edges` has one more entry than `counts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub bin_edges: Vec<f64>,
    pub counts: Vec<u64>,
}

/// A frequent value with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

/// A recognized date/time format with its support count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatCount {
    pub format: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericMetrics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub variance: f64,
    pub quantiles: Vec<Quantile>,
    pub histogram: Histogram,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringMetrics {
    /// Lengths are counted in grapheme clusters over non-null values.
    pub min_length: u64,
    pub max_length: u64,
    pub avg_length: f64,
    pub top_values: Vec<ValueCount>,
    pub top_1_frequency_pct: f64,
    pub top_5_frequency_pct: f64,
    pub patterns: PatternFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeMetrics {
    pub min: NaiveDateTime,
    pub max: NaiveDateTime,
    pub time_range_days: f64,
    /// Recognized formats ranked by support count.
    pub formats: Vec<FormatCount>,
    pub histogram_by_year: BTreeMap<i32, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanMetrics {
    pub true_count: u64,
    pub false_count: u64,
    pub true_percentage: f64,
}

/// Type-specific metric block. Exactly one variant is populated per
/// profile, so "which fields are valid" is a type-level invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeMetrics {
    Numeric(NumericMetrics),
    String(StringMetrics),
    DateTime(DateTimeMetrics),
    Boolean(BooleanMetrics),
    Unsupported,
}

impl TypeMetrics {
    pub fn detected_type(&self) -> DetectedType {
        match self {
            TypeMetrics::Numeric(_) => DetectedType::Numeric,
            TypeMetrics::String(_) => DetectedType::String,
            TypeMetrics::DateTime(_) => DetectedType::DateTime,
            TypeMetrics::Boolean(_) => DetectedType::Boolean,
            TypeMetrics::Unsupported => DetectedType::Unsupported,
        }
    }
}

/// Structured statistical summary of one attribute at one point in time.
///
/// Created by the profiling engine; `cluster_id` is later assigned by the
/// clustering engine and is the only field mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub attribute_key: AttributeKey,
    pub profiled_at: DateTime<Utc>,
    pub total_records: u64,
    pub null_count: u64,
    pub null_percentage: f64,
    pub distinct_count: u64,
    /// Distinct values as a share of the non-null count.
    pub distinct_percentage: f64,
    pub is_unique: bool,
    pub metrics: TypeMetrics,
    pub cluster_id: Option<i64>,
    /// Populated instead of metrics when the data accessor failed.
    pub error: Option<String>,
}

impl Profile {
    pub fn data_type_detected(&self) -> DetectedType {
        self.metrics.detected_type()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Pattern flags for this attribute; both false outside STRING.
    pub fn pattern_flags(&self) -> PatternFlags {
        match &self.metrics {
            TypeMetrics::String(m) => m.patterns,
            _ => PatternFlags::default(),
        }
    }

    /// Profile-shaped error record: identity plus whatever common counts
    /// were retrievable before the accessor failed.
    pub fn error_record(
        attribute_key: AttributeKey,
        total_records: u64,
        null_count: u64,
        detail: impl Into<String>,
    ) -> Self {
        let null_percentage = if total_records > 0 {
            null_count as f64 / total_records as f64 * 100.0
        } else {
            0.0
        };
        Self {
            attribute_key,
            profiled_at: Utc::now(),
            total_records,
            null_count,
            null_percentage,
            distinct_count: 0,
            distinct_percentage: 0.0,
            is_unique: false,
            metrics: TypeMetrics::Unsupported,
            cluster_id: None,
            error: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_key_display() {
        let with_table = AttributeDescriptor::new("sales_db", Some("public.orders"), "amount").key();
        assert_eq!(with_table.to_string(), "sales_db.public.orders.amount");

        let flat_file = AttributeDescriptor::new("customers_csv", None, "email").key();
        assert_eq!(flat_file.to_string(), "customers_csv.email");
    }

    #[test]
    fn error_record_keeps_partial_counts() {
        let key = AttributeDescriptor::new("db", None, "broken").key();
        let record = Profile::error_record(key, 200, 50, "connection reset");

        assert!(record.is_error());
        assert_eq!(record.total_records, 200);
        assert_eq!(record.null_percentage, 25.0);
        assert_eq!(record.data_type_detected(), DetectedType::Unsupported);
        assert_eq!(record.cluster_id, None);
    }
}
