//! Similarity clustering over stored profiles
//!
//! Builds a fixed-order feature vector per profile, standardizes each
//! feature across the batch, and merges attributes bottom-up with Ward
//! linkage until the next merge would exceed the distance threshold.
//! Cluster ids are arbitrary labels with no cross-run stability: every
//! run recomputes assignments wholesale.

use crate::errors::{ProfilerError, Result};
use crate::profile::{AttributeKey, Profile, TypeMetrics};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Feature layout, one slot per metric. Slots that do not apply to a
/// profile's type stay at the neutral 0.0 so heterogeneous batches
/// cluster without special cases.
///
/// 0: null_percentage        7: avg_length
/// 1: distinct_percentage    8: is_ssn_candidate (0/1)
/// 2: mean                   9: is_dob_candidate (0/1)
/// 3: median                10: top_1_frequency_pct
/// 4: std_dev               11: top_5_frequency_pct
/// 5: min_length            12: time_range_days
/// 6: max_length            13: true_percentage
const FEATURE_COUNT: usize = 14;

pub struct ClusteringEngine;

impl ClusteringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Assign a cluster id to every non-error profile. Fails only on an
    /// invalid threshold; too-small inputs degrade to singleton ids
    /// without invoking the merge loop.
    pub fn cluster(
        &self,
        profiles: &[Profile],
        distance_threshold: f64,
    ) -> Result<HashMap<AttributeKey, i64>> {
        if !distance_threshold.is_finite() || distance_threshold < 0.0 {
            return Err(ProfilerError::InvalidThreshold(distance_threshold));
        }

        let usable: Vec<&Profile> = profiles.iter().filter(|p| !p.is_error()).collect();
        let skipped = profiles.len() - usable.len();
        if skipped > 0 {
            warn!(skipped, "excluding error profiles from clustering");
        }

        if usable.len() < 2 {
            debug!(
                attributes = usable.len(),
                "not enough profiles to cluster, assigning singletons"
            );
            return Ok(usable
                .iter()
                .enumerate()
                .map(|(i, p)| (p.attribute_key.clone(), i as i64))
                .collect());
        }

        let matrix: Vec<Vec<f64>> = usable.iter().map(|p| feature_vector(p)).collect();
        let scaled = standardize(&matrix);
        let labels = ward_cluster(&scaled, distance_threshold);

        let cluster_count = labels.iter().max().map(|m| m + 1).unwrap_or(0);
        info!(
            attributes = usable.len(),
            clusters = cluster_count,
            threshold = distance_threshold,
            "clustering complete"
        );

        Ok(usable
            .iter()
            .zip(labels)
            .map(|(p, label)| (p.attribute_key.clone(), label))
            .collect())
    }
}

impl Default for ClusteringEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn feature_vector(profile: &Profile) -> Vec<f64> {
    let mut features = vec![0.0; FEATURE_COUNT];
    features[0] = profile.null_percentage;
    features[1] = profile.distinct_percentage;
    match &profile.metrics {
        TypeMetrics::Numeric(m) => {
            features[2] = m.mean;
            features[3] = m.median;
            features[4] = m.std_dev;
        }
        TypeMetrics::String(m) => {
            features[5] = m.min_length as f64;
            features[6] = m.max_length as f64;
            features[7] = m.avg_length;
            features[8] = if m.patterns.is_ssn_candidate { 1.0 } else { 0.0 };
            features[9] = if m.patterns.is_dob_candidate { 1.0 } else { 0.0 };
            features[10] = m.top_1_frequency_pct;
            features[11] = m.top_5_frequency_pct;
        }
        TypeMetrics::DateTime(m) => {
            features[12] = m.time_range_days;
        }
        TypeMetrics::Boolean(m) => {
            features[13] = m.true_percentage;
        }
        TypeMetrics::Unsupported => {}
    }
    features
}

/// Zero-mean unit-variance scaling fitted on this batch alone. A
/// zero-variance column scales to all zeros rather than NaN.
fn standardize(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let rows = matrix.len();
    let mut scaled = vec![vec![0.0; FEATURE_COUNT]; rows];
    for feature in 0..FEATURE_COUNT {
        let mean = matrix.iter().map(|row| row[feature]).sum::<f64>() / rows as f64;
        let variance = matrix
            .iter()
            .map(|row| {
                let diff = row[feature] - mean;
                diff * diff
            })
            .sum::<f64>()
            / rows as f64;
        let std_dev = variance.sqrt();
        if std_dev > f64::EPSILON {
            for (row, scaled_row) in matrix.iter().zip(scaled.iter_mut()) {
                scaled_row[feature] = (row[feature] - mean) / std_dev;
            }
        }
    }
    scaled
}

fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Agglomerative clustering with Ward linkage. Inter-cluster distances
/// start as pairwise Euclidean and are updated with the Lance-Williams
/// recurrence; merging stops once the closest pair sits farther apart
/// than the threshold. Labels are dense integers in first-appearance
/// order over the input.
fn ward_cluster(points: &[Vec<f64>], distance_threshold: f64) -> Vec<i64> {
    let n = points.len();
    let mut dist2: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| (0..n).map(|j| squared_euclidean(&points[i], &points[j])).collect())
        .collect();

    let mut active = vec![true; n];
    let mut sizes = vec![1.0f64; n];
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    loop {
        let mut closest: Option<(OrderedFloat<f64>, usize, usize)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                let candidate = (OrderedFloat(dist2[i][j]), i, j);
                if closest.map_or(true, |best| candidate < best) {
                    closest = Some(candidate);
                }
            }
        }
        let Some((d2, i, j)) = closest else {
            break;
        };
        if d2.into_inner().max(0.0).sqrt() > distance_threshold {
            break;
        }

        // Lance-Williams update for Ward linkage: distances to the
        // merged cluster in terms of distances to its two halves.
        let (ni, nj) = (sizes[i], sizes[j]);
        for k in 0..n {
            if !active[k] || k == i || k == j {
                continue;
            }
            let nk = sizes[k];
            let total = ni + nj + nk;
            let updated = ((ni + nk) * dist2[i][k] + (nj + nk) * dist2[j][k] - nk * dist2[i][j])
                / total;
            dist2[i][k] = updated;
            dist2[k][i] = updated;
        }
        sizes[i] += sizes[j];
        active[j] = false;
        let merged = std::mem::take(&mut members[j]);
        members[i].extend(merged);
    }

    // Dense relabeling: walk points in input order, numbering each
    // surviving cluster the first time one of its members appears.
    let mut cluster_of = vec![0usize; n];
    for (cluster, member_list) in members.iter().enumerate() {
        if active[cluster] {
            for &point in member_list {
                cluster_of[point] = cluster;
            }
        }
    }
    let mut relabel: HashMap<usize, i64> = HashMap::new();
    let mut labels = Vec::with_capacity(n);
    for point in 0..n {
        let next = relabel.len() as i64;
        let label = *relabel.entry(cluster_of[point]).or_insert(next);
        labels.push(label);
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{AttributeDescriptor, NumericMetrics, Quantile};
    use chrono::Utc;

    fn numeric_profile(column: &str, mean: f64, null_pct: f64) -> Profile {
        let metrics = NumericMetrics {
            min: mean - 1.0,
            max: mean + 1.0,
            mean,
            median: mean,
            std_dev: 1.0,
            variance: 1.0,
            quantiles: vec![Quantile { percentile: 50.0, value: mean }],
            histogram: crate::profile::Histogram {
                bin_edges: vec![mean - 1.0, mean + 1.0],
                counts: vec![10],
            },
        };
        Profile {
            attribute_key: AttributeDescriptor::new("db", None, column).key(),
            profiled_at: Utc::now(),
            total_records: 10,
            null_count: (null_pct / 10.0) as u64,
            null_percentage: null_pct,
            distinct_count: 10,
            distinct_percentage: 100.0,
            is_unique: true,
            metrics: TypeMetrics::Numeric(metrics),
            cluster_id: None,
            error: None,
        }
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let engine = ClusteringEngine::new();
        let err = engine.cluster(&[], -1.0).unwrap_err();
        assert!(matches!(err, ProfilerError::InvalidThreshold(_)));
    }

    #[test]
    fn identical_profiles_share_a_cluster() {
        let engine = ClusteringEngine::new();
        let profiles = vec![
            numeric_profile("a", 5.0, 0.0),
            numeric_profile("b", 5.0, 0.0),
            numeric_profile("c", 500.0, 90.0),
        ];
        let assignments = engine.cluster(&profiles, 1.0).unwrap();

        let a = assignments[&profiles[0].attribute_key];
        let b = assignments[&profiles[1].attribute_key];
        let c = assignments[&profiles[2].attribute_key];
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn generous_threshold_merges_everything() {
        let engine = ClusteringEngine::new();
        let profiles = vec![
            numeric_profile("a", 5.0, 0.0),
            numeric_profile("b", 50.0, 10.0),
            numeric_profile("c", 500.0, 90.0),
        ];
        let assignments = engine.cluster(&profiles, 1_000.0).unwrap();
        let labels: Vec<i64> = assignments.values().copied().collect();
        assert!(labels.iter().all(|&l| l == labels[0]));
    }

    #[test]
    fn singleton_input_skips_the_merge_loop() {
        let engine = ClusteringEngine::new();
        let profiles = vec![numeric_profile("only", 5.0, 0.0)];
        let assignments = engine.cluster(&profiles, 1.0).unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[&profiles[0].attribute_key], 0);
    }

    #[test]
    fn empty_input_yields_no_assignments() {
        let engine = ClusteringEngine::new();
        let assignments = engine.cluster(&[], 1.0).unwrap();
        assert!(assignments.is_empty());
    }

    #[test]
    fn error_profiles_are_excluded() {
        let engine = ClusteringEngine::new();
        let broken = Profile::error_record(
            AttributeDescriptor::new("db", None, "broken").key(),
            10,
            0,
            "read failure",
        );
        let profiles = vec![
            numeric_profile("a", 5.0, 0.0),
            numeric_profile("b", 5.0, 0.0),
            broken.clone(),
        ];
        let assignments = engine.cluster(&profiles, 1.0).unwrap();
        assert_eq!(assignments.len(), 2);
        assert!(!assignments.contains_key(&broken.attribute_key));
    }

    #[test]
    fn constant_features_do_not_produce_nan() {
        // Every profile identical: all feature columns have zero
        // variance, and everything collapses into one cluster.
        let engine = ClusteringEngine::new();
        let profiles = vec![
            numeric_profile("a", 5.0, 0.0),
            numeric_profile("b", 5.0, 0.0),
            numeric_profile("c", 5.0, 0.0),
        ];
        let assignments = engine.cluster(&profiles, 0.5).unwrap();
        let labels: Vec<i64> = assignments.values().copied().collect();
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn labels_are_dense_from_zero() {
        let engine = ClusteringEngine::new();
        let profiles = vec![
            numeric_profile("a", 1.0, 0.0),
            numeric_profile("b", 1_000.0, 50.0),
            numeric_profile("c", 1.0, 0.0),
        ];
        let assignments = engine.cluster(&profiles, 0.1).unwrap();
        let mut labels: Vec<i64> = assignments.values().copied().collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels, (0..labels.len() as i64).collect::<Vec<_>>());
    }
}
