//! Attribute profiling engine
//!
//! Computes one [`Profile`] per attribute through a [`DataAccessor`],
//! resolving the logical type first and then filling exactly one
//! type-specific metric block. Accessor failures are captured as error
//! records so a batch always completes for its remaining attributes.

use crate::accessor::{value_to_f64, value_to_string, AggregateOp, DataAccessor};
use crate::detector::{parse_temporal, PatternDetector};
use crate::errors::Result;
use crate::profile::{
    AttributeDescriptor, BooleanMetrics, DateTimeMetrics, DetectedType, FormatCount, Histogram,
    NumericMetrics, Profile, Quantile, StringMetrics, TypeMetrics, ValueCount,
};
use crate::ProfilerConfig;
use chrono::{Datelike, NaiveDateTime, Utc};
use futures::StreamExt;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;

pub struct ProfilingEngine {
    config: ProfilerConfig,
    detector: PatternDetector,
}

impl ProfilingEngine {
    pub fn new(config: ProfilerConfig) -> Self {
        let detector = PatternDetector::new(config.detector.clone());
        Self { config, detector }
    }

    /// Profile a single attribute. Never fails past this boundary: an
    /// accessor error becomes an error record carrying whatever common
    /// counts were still retrievable.
    pub async fn profile(
        &self,
        descriptor: &AttributeDescriptor,
        accessor: &dyn DataAccessor,
    ) -> Profile {
        match self.try_profile(descriptor, accessor).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(
                    attribute = %descriptor.key(),
                    error = %e,
                    "profiling failed, emitting error record"
                );
                let total_records = accessor.row_count().await.unwrap_or(0);
                let null_count = accessor.null_count(&descriptor.column).await.unwrap_or(0);
                Profile::error_record(descriptor.key(), total_records, null_count, e.to_string())
            }
        }
    }

    /// Profile a batch of attributes with bounded concurrency, keeping
    /// input order. One attribute's failure never aborts its siblings.
    pub async fn profile_all(
        &self,
        descriptors: &[AttributeDescriptor],
        accessor: Arc<dyn DataAccessor>,
    ) -> Vec<Profile> {
        info!(attributes = descriptors.len(), "starting profiling batch");
        let profiles: Vec<Profile> = futures::stream::iter(descriptors.iter().map(|descriptor| {
            let accessor = Arc::clone(&accessor);
            async move { self.profile(descriptor, &*accessor).await }
        }))
        .buffered(self.config.max_concurrency.max(1))
        .collect()
        .await;

        let failed = profiles.iter().filter(|p| p.is_error()).count();
        info!(
            profiled = profiles.len() - failed,
            failed, "profiling batch complete"
        );
        profiles
    }

    async fn try_profile(
        &self,
        descriptor: &AttributeDescriptor,
        accessor: &dyn DataAccessor,
    ) -> Result<Profile> {
        let key = descriptor.key();
        let total_records = accessor.row_count().await?;
        let null_count = accessor.null_count(&descriptor.column).await?;
        let distinct_count = accessor.distinct_count(&descriptor.column).await?;
        let non_null_count = total_records.saturating_sub(null_count);

        let sample = accessor
            .sample(&descriptor.column, self.config.sample_size)
            .await?;
        let sample_strings: Vec<String> = sample.iter().filter_map(value_to_string).collect();

        let detected = self.resolve_type(descriptor.declared_type.as_deref(), &sample_strings);
        debug!(attribute = %key, detected = %detected, "resolved attribute type");

        let metrics = match detected {
            DetectedType::Numeric => self.numeric_metrics(descriptor, accessor).await?,
            DetectedType::String => {
                self.string_metrics(descriptor, accessor, &sample_strings)
                    .await?
            }
            DetectedType::DateTime => self.datetime_metrics(descriptor, accessor).await?,
            DetectedType::Boolean => self.boolean_metrics(descriptor, accessor).await?,
            DetectedType::Unsupported => TypeMetrics::Unsupported,
        };

        Ok(Profile {
            attribute_key: key,
            profiled_at: Utc::now(),
            total_records,
            null_count,
            null_percentage: percentage(null_count, total_records),
            distinct_count,
            distinct_percentage: percentage(distinct_count, non_null_count),
            is_unique: non_null_count > 0 && distinct_count == non_null_count,
            metrics,
            cluster_id: None,
            error: None,
        })
    }

    /// Fixed resolution precedence: declared type mapping, then boolean
    /// literal match, numeric parse, date parse, and finally the STRING
    /// fallback. Declared textual types fall through to probing since
    /// text columns routinely carry numbers or dates.
    fn resolve_type(&self, declared_type: Option<&str>, samples: &[String]) -> DetectedType {
        if let Some(mapped) = declared_type.and_then(map_declared_type) {
            return mapped;
        }
        if samples.is_empty() {
            return DetectedType::Unsupported;
        }
        if samples.iter().all(|s| parse_bool_literal(s).is_some()) {
            return DetectedType::Boolean;
        }
        if samples.iter().all(|s| s.trim().parse::<f64>().is_ok()) {
            return DetectedType::Numeric;
        }
        let date_parseable = samples.iter().filter(|s| parse_temporal(s).is_some()).count();
        if date_parseable as f64 / samples.len() as f64 > self.config.datetime_confidence {
            return DetectedType::DateTime;
        }
        DetectedType::String
    }

    async fn numeric_metrics(
        &self,
        descriptor: &AttributeDescriptor,
        accessor: &dyn DataAccessor,
    ) -> Result<TypeMetrics> {
        let values = accessor.column_values(&descriptor.column).await?;
        let mut numeric: Vec<f64> = values
            .iter()
            .filter_map(value_to_f64)
            .filter(|v| v.is_finite())
            .collect();
        if numeric.is_empty() {
            return Ok(TypeMetrics::Unsupported);
        }
        numeric.sort_by_key(|v| OrderedFloat(*v));

        // min/max/mean are pushed down to the accessor when it can
        // aggregate; the retrieved values cover the order statistics.
        let column = &descriptor.column;
        let min = match accessor.aggregate(column, AggregateOp::Min).await? {
            Some(v) => v,
            None => numeric[0],
        };
        let max = match accessor.aggregate(column, AggregateOp::Max).await? {
            Some(v) => v,
            None => numeric[numeric.len() - 1],
        };
        let mean = match accessor.aggregate(column, AggregateOp::Mean).await? {
            Some(v) => v,
            None => numeric.iter().sum::<f64>() / numeric.len() as f64,
        };

        let variance = numeric
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / numeric.len() as f64;

        let quantiles = self
            .config
            .percentiles
            .iter()
            .map(|&p| Quantile {
                percentile: p,
                value: percentile_of_sorted(&numeric, p),
            })
            .collect();

        Ok(TypeMetrics::Numeric(NumericMetrics {
            min,
            max,
            mean,
            median: percentile_of_sorted(&numeric, 50.0),
            std_dev: variance.sqrt(),
            variance,
            quantiles,
            histogram: build_histogram(&numeric, min, max, self.config.histogram_bins),
        }))
    }

    async fn string_metrics(
        &self,
        descriptor: &AttributeDescriptor,
        accessor: &dyn DataAccessor,
        sample_strings: &[String],
    ) -> Result<TypeMetrics> {
        let values = accessor.column_values(&descriptor.column).await?;
        let strings: Vec<String> = values.iter().filter_map(value_to_string).collect();
        if strings.is_empty() {
            return Ok(TypeMetrics::Unsupported);
        }
        let non_null_count = strings.len() as u64;

        let lengths: Vec<u64> = strings
            .iter()
            .map(|s| s.graphemes(true).count() as u64)
            .collect();
        let min_length = lengths.iter().copied().min().unwrap_or(0);
        let max_length = lengths.iter().copied().max().unwrap_or(0);
        let avg_length = lengths.iter().sum::<u64>() as f64 / lengths.len() as f64;

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for value in &strings {
            *counts.entry(value.as_str()).or_insert(0) += 1;
        }
        let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
        // Ties break on the value itself so repeated runs rank identically.
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let top_1_frequency_pct = ranked
            .first()
            .map(|(_, count)| percentage(*count, non_null_count))
            .unwrap_or(0.0);
        let top_5_frequency_pct = percentage(
            ranked.iter().take(5).map(|(_, count)| count).sum::<u64>(),
            non_null_count,
        );

        let top_values = ranked
            .into_iter()
            .take(self.config.top_k)
            .map(|(value, count)| ValueCount {
                value: value.to_string(),
                count,
            })
            .collect();

        let patterns = self.detector.scan(&descriptor.column, sample_strings);

        Ok(TypeMetrics::String(StringMetrics {
            min_length,
            max_length,
            avg_length,
            top_values,
            top_1_frequency_pct,
            top_5_frequency_pct,
            patterns,
        }))
    }

    async fn datetime_metrics(
        &self,
        descriptor: &AttributeDescriptor,
        accessor: &dyn DataAccessor,
    ) -> Result<TypeMetrics> {
        let values = accessor.column_values(&descriptor.column).await?;
        let mut parsed: Vec<NaiveDateTime> = Vec::new();
        let mut format_counts: HashMap<&'static str, u64> = HashMap::new();
        for value in values.iter().filter_map(value_to_string) {
            if let Some((dt, format)) = parse_temporal(&value) {
                parsed.push(dt);
                *format_counts.entry(format).or_insert(0) += 1;
            }
        }
        let (Some(min), Some(max)) = (parsed.iter().min().copied(), parsed.iter().max().copied())
        else {
            return Ok(TypeMetrics::Unsupported);
        };

        let mut formats: Vec<FormatCount> = format_counts
            .into_iter()
            .map(|(format, count)| FormatCount {
                format: format.to_string(),
                count,
            })
            .collect();
        formats.sort_by_key(|f| (Reverse(f.count), f.format.clone()));

        let mut histogram_by_year: BTreeMap<i32, u64> = BTreeMap::new();
        for dt in &parsed {
            *histogram_by_year.entry(dt.year()).or_insert(0) += 1;
        }

        Ok(TypeMetrics::DateTime(DateTimeMetrics {
            min,
            max,
            time_range_days: (max - min).num_seconds() as f64 / 86_400.0,
            formats,
            histogram_by_year,
        }))
    }

    async fn boolean_metrics(
        &self,
        descriptor: &AttributeDescriptor,
        accessor: &dyn DataAccessor,
    ) -> Result<TypeMetrics> {
        let values = accessor.column_values(&descriptor.column).await?;
        let mut true_count = 0u64;
        let mut false_count = 0u64;
        // Values outside the literal table are skipped, not errors.
        for value in values.iter().filter_map(value_to_string) {
            match parse_bool_literal(&value) {
                Some(true) => true_count += 1,
                Some(false) => false_count += 1,
                None => {}
            }
        }
        let mapped = true_count + false_count;
        Ok(TypeMetrics::Boolean(BooleanMetrics {
            true_count,
            false_count,
            true_percentage: percentage(true_count, mapped),
        }))
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Declared catalog types that map directly; textual declarations return
/// None so the sample probe decides.
fn map_declared_type(declared: &str) -> Option<DetectedType> {
    let normalized = declared.trim().to_ascii_lowercase();
    let base = normalized.split('(').next().unwrap_or("").trim();
    match base {
        "int" | "integer" | "bigint" | "smallint" | "tinyint" | "decimal" | "numeric"
        | "number" | "float" | "double" | "double precision" | "real" => {
            Some(DetectedType::Numeric)
        }
        "date" | "datetime" | "timestamp" | "timestamptz" | "time" => Some(DetectedType::DateTime),
        "bool" | "boolean" | "bit" => Some(DetectedType::Boolean),
        _ => None,
    }
}

fn parse_bool_literal(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Linearly interpolated percentile over an already-sorted slice.
fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (percentile / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        sorted[lower] + (rank - lower as f64) * (sorted[upper] - sorted[lower])
    }
}

/// Fixed-width bins across [min, max]; a constant column collapses to a
/// single bin holding everything.
fn build_histogram(values: &[f64], min: f64, max: f64, bins: usize) -> Histogram {
    let bins = bins.max(1);
    if max <= min {
        return Histogram {
            bin_edges: vec![min, max],
            counts: vec![values.len() as u64],
        };
    }
    let width = (max - min) / bins as f64;
    let bin_edges: Vec<f64> = (0..=bins)
        .map(|i| if i == bins { max } else { min + i as f64 * width })
        .collect();
    let mut counts = vec![0u64; bins];
    for &value in values {
        let index = (((value - min) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }
    Histogram { bin_edges, counts }
}
