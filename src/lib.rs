//! DataProfiler: attribute profiling, sensitive-pattern detection, and
//! similarity clustering for tabular data

pub mod accessor;
pub mod cluster;
pub mod detector;
pub mod engine;
pub mod errors;
pub mod profile;
pub mod store;

// Re-exports
pub use accessor::{AggregateOp, CsvAccessor, DataAccessor, MemoryAccessor};
pub use cluster::ClusteringEngine;
pub use detector::{DetectorConfig, PatternDetector};
pub use engine::ProfilingEngine;
pub use errors::{ProfilerError, Result};
pub use profile::{
    AttributeDescriptor, AttributeKey, DetectedType, PatternFlags, Profile, TypeMetrics,
};
pub use store::{MemoryProfileStore, ProfileStore};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Main configuration for profiling runs. The heuristic constants are
/// deliberately tunable rather than hard-coded.
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    /// Bounded sample size for type probing and pattern detection.
    pub sample_size: usize,
    /// Maximum attributes profiled concurrently in a batch.
    pub max_concurrency: usize,
    /// How many most-frequent values a string profile keeps.
    pub top_k: usize,
    /// Percentiles computed for numeric attributes.
    pub percentiles: Vec<f64>,
    /// Bin count for numeric histograms.
    pub histogram_bins: usize,
    /// Fraction of sampled values that must parse as dates before an
    /// undeclared column resolves to DATETIME. Kept stricter than the
    /// detector's format threshold so near-clean date columns stay
    /// STRING and remain visible to DOB detection.
    pub datetime_confidence: f64,
    /// Pattern detection thresholds.
    pub detector: DetectorConfig,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            sample_size: 1000,
            max_concurrency: num_cpus::get(),
            top_k: 10,
            percentiles: vec![5.0, 25.0, 75.0, 95.0],
            histogram_bins: 10,
            datetime_confidence: 0.95,
            detector: DetectorConfig::default(),
        }
    }
}

/// Facade wiring the profiling and clustering engines to the
/// collaborator interfaces.
pub struct DataProfiler {
    engine: ProfilingEngine,
    clustering: ClusteringEngine,
}

impl DataProfiler {
    pub fn new(config: ProfilerConfig) -> Self {
        Self {
            engine: ProfilingEngine::new(config),
            clustering: ClusteringEngine::new(),
        }
    }

    /// Profile the selected attributes and upsert every resulting record
    /// (error records included; the caller sees them in the return
    /// value and can drop them from the store if unwanted).
    pub async fn profile_attributes(
        &self,
        descriptors: &[AttributeDescriptor],
        accessor: Arc<dyn DataAccessor>,
        store: &dyn ProfileStore,
    ) -> Result<Vec<Profile>> {
        let profiles = self.engine.profile_all(descriptors, accessor).await;
        for profile in &profiles {
            store.upsert(profile.clone()).await?;
        }
        Ok(profiles)
    }

    /// Re-cluster everything currently stored: snapshot read, one batch
    /// computation, one writeback. Ids are fresh labels each run.
    pub async fn recluster(
        &self,
        store: &dyn ProfileStore,
        distance_threshold: f64,
    ) -> Result<HashMap<AttributeKey, i64>> {
        let snapshot = store.list_current_profiles().await?;
        let assignments = self.clustering.cluster(&snapshot, distance_threshold)?;
        store.update_cluster_assignments(&assignments).await?;
        info!(
            profiles = snapshot.len(),
            assigned = assignments.len(),
            "cluster assignments written back"
        );
        Ok(assignments)
    }
}
