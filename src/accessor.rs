//! Data source accessor abstraction consumed by the profiling engine
//!
//! The engine never owns a connection; it talks to a [`DataAccessor`]
//! that can answer counts, serve bounded samples, push down scalar
//! aggregates, and retrieve a full column when order statistics demand
//! it. Failures surface as [`ProfilerError::Access`]-family errors, never
//! as opaque panics.

use crate::errors::{ProfilerError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Scalar aggregates an accessor can push down to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateOp {
    Min,
    Max,
    Mean,
}

#[async_trait]
pub trait DataAccessor: Send + Sync {
    async fn row_count(&self) -> Result<u64>;

    async fn null_count(&self, column: &str) -> Result<u64>;

    async fn distinct_count(&self, column: &str) -> Result<u64>;

    /// Bounded sample of non-null raw values, in row order.
    async fn sample(&self, column: &str, n: usize) -> Result<Vec<Value>>;

    /// Aggregate over the numeric interpretation of a column. `None`
    /// when no value in the column is numeric.
    async fn aggregate(&self, column: &str, op: AggregateOp) -> Result<Option<f64>>;

    /// Full retrieval of the column's non-null values, in row order.
    async fn column_values(&self, column: &str) -> Result<Vec<Value>>;
}

/// Null semantics shared by the reference accessors: JSON null, or a
/// string that is empty after trimming (the flat-file case).
pub(crate) fn is_null_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Canonical string form of a non-null raw value.
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    if is_null_value(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Numeric interpretation of a raw value, if it has one.
pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

static NULL_CELL: Value = Value::Null;

/// Column cells across a set of JSON-object rows. A key missing from a
/// row reads as null; a key present in no row at all is an unknown
/// column.
fn column_cells<'a>(rows: &'a [Value], column: &str) -> Result<Vec<&'a Value>> {
    let mut seen = rows.is_empty();
    let cells: Vec<&Value> = rows
        .iter()
        .map(|row| match row.get(column) {
            Some(value) => {
                seen = true;
                value
            }
            None => &NULL_CELL,
        })
        .collect();
    if !seen {
        return Err(ProfilerError::UnknownColumn(column.to_string()));
    }
    Ok(cells)
}

fn count_nulls(rows: &[Value], column: &str) -> Result<u64> {
    Ok(column_cells(rows, column)?
        .into_iter()
        .filter(|v| is_null_value(v))
        .count() as u64)
}

fn count_distinct(rows: &[Value], column: &str) -> Result<u64> {
    let distinct: HashSet<String> = column_cells(rows, column)?
        .into_iter()
        .filter_map(value_to_string)
        .collect();
    Ok(distinct.len() as u64)
}

fn sample_values(rows: &[Value], column: &str, n: usize) -> Result<Vec<Value>> {
    Ok(column_cells(rows, column)?
        .into_iter()
        .filter(|v| !is_null_value(v))
        .take(n)
        .cloned()
        .collect())
}

fn non_null_values(rows: &[Value], column: &str) -> Result<Vec<Value>> {
    Ok(column_cells(rows, column)?
        .into_iter()
        .filter(|v| !is_null_value(v))
        .cloned()
        .collect())
}

fn aggregate_values(rows: &[Value], column: &str, op: AggregateOp) -> Result<Option<f64>> {
    let numeric: Vec<f64> = column_cells(rows, column)?
        .into_iter()
        .filter_map(value_to_f64)
        .filter(|v| v.is_finite())
        .collect();
    if numeric.is_empty() {
        return Ok(None);
    }
    let result = match op {
        AggregateOp::Min => numeric.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateOp::Max => numeric.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateOp::Mean => numeric.iter().sum::<f64>() / numeric.len() as f64,
    };
    Ok(Some(result))
}

/// In-memory accessor over JSON-object rows. The reference
/// implementation for unit tests and embedders with materialized data.
pub struct MemoryAccessor {
    rows: Vec<Value>,
}

impl MemoryAccessor {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl DataAccessor for MemoryAccessor {
    async fn row_count(&self) -> Result<u64> {
        Ok(self.rows.len() as u64)
    }

    async fn null_count(&self, column: &str) -> Result<u64> {
        count_nulls(&self.rows, column)
    }

    async fn distinct_count(&self, column: &str) -> Result<u64> {
        count_distinct(&self.rows, column)
    }

    async fn sample(&self, column: &str, n: usize) -> Result<Vec<Value>> {
        sample_values(&self.rows, column, n)
    }

    async fn aggregate(&self, column: &str, op: AggregateOp) -> Result<Option<f64>> {
        aggregate_values(&self.rows, column, op)
    }

    async fn column_values(&self, column: &str) -> Result<Vec<Value>> {
        non_null_values(&self.rows, column)
    }
}

/// Accessor over a delimited flat file. Rows are parsed once on first
/// use, then served from memory; empty fields count as null.
pub struct CsvAccessor {
    path: PathBuf,
    delimiter: u8,
    has_headers: bool,
    rows: RwLock<Option<Arc<Vec<Value>>>>,
}

impl CsvAccessor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            has_headers: true,
            rows: RwLock::new(None),
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Columns of a headerless file are addressed by ordinal ("0", "1", ...).
    pub fn without_headers(mut self) -> Self {
        self.has_headers = false;
        self
    }

    async fn rows(&self) -> Result<Arc<Vec<Value>>> {
        if let Some(rows) = self.rows.read().clone() {
            return Ok(rows);
        }

        let path = self.path.clone();
        let delimiter = self.delimiter;
        let has_headers = self.has_headers;
        let loaded = tokio::task::spawn_blocking(move || -> Result<Vec<Value>> {
            let file = std::fs::File::open(&path)?;
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .has_headers(has_headers)
                .from_reader(file);

            let headers: Vec<String> = if has_headers {
                reader.headers()?.iter().map(str::to_string).collect()
            } else {
                Vec::new()
            };

            let mut rows = Vec::new();
            for record in reader.records() {
                let record = record?;
                let mut row = serde_json::Map::new();
                for (i, field) in record.iter().enumerate() {
                    let name = headers.get(i).cloned().unwrap_or_else(|| i.to_string());
                    let value = if field.trim().is_empty() {
                        Value::Null
                    } else {
                        Value::String(field.to_string())
                    };
                    row.insert(name, value);
                }
                rows.push(Value::Object(row));
            }
            Ok(rows)
        })
        .await
        .map_err(|e| ProfilerError::Access(e.to_string()))??;

        let loaded = Arc::new(loaded);
        *self.rows.write() = Some(Arc::clone(&loaded));
        Ok(loaded)
    }
}

#[async_trait]
impl DataAccessor for CsvAccessor {
    async fn row_count(&self) -> Result<u64> {
        Ok(self.rows().await?.len() as u64)
    }

    async fn null_count(&self, column: &str) -> Result<u64> {
        count_nulls(&self.rows().await?, column)
    }

    async fn distinct_count(&self, column: &str) -> Result<u64> {
        count_distinct(&self.rows().await?, column)
    }

    async fn sample(&self, column: &str, n: usize) -> Result<Vec<Value>> {
        sample_values(&self.rows().await?, column, n)
    }

    async fn aggregate(&self, column: &str, op: AggregateOp) -> Result<Option<f64>> {
        aggregate_values(&self.rows().await?, column, op)
    }

    async fn column_values(&self, column: &str) -> Result<Vec<Value>> {
        non_null_values(&self.rows().await?, column)
    }
}
