//! Integration tests for the profiler core

use dataprofiler_core::{
    AttributeDescriptor, CsvAccessor, DataAccessor, DataProfiler, DetectedType,
    MemoryAccessor, MemoryProfileStore, Profile, ProfileStore, ProfilerConfig, TypeMetrics,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn customers_csv() -> tempfile::NamedTempFile {
    let ssns = [
        "123-45-6789",
        "234-56-7890",
        "345-67-8901",
        "456-78-9012",
        "567-89-0123",
        "678-90-1234",
        "789-01-2345",
        "810-11-2233",
        "121-31-4151",
        "232-42-5262",
        "343-53-6373",
        "454-64-7484",
    ];
    // One junk value keeps the column STRING (below the DATETIME
    // confidence gate) while still clearing the DOB format gate.
    let birth_dates = [
        "1971-02-03",
        "1980-05-17",
        "1985-04-12",
        "1990-11-03",
        "1972-01-30",
        "1968-09-21",
        "1994-02-14",
        "1979-07-07",
        "1988-12-25",
        "2001-06-18",
        "1999-03-09",
        "unknown",
    ];
    let amounts = [
        "10.5", "20.75", "30.25", "", "40.0", "55.5", "60.0", "", "70.25", "80.5", "90.75",
        "100.0",
    ];
    let actives = ["y", "n", "y", "y", "n", "y", "n", "y", "y", "n", "y", "n"];
    let cities = [
        "austin", "boston", "austin", "chicago", "boston", "austin", "denver", "austin",
        "boston", "chicago", "austin", "boston",
    ];

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "id,ssn,birth_date,amount,active,city").unwrap();
    for i in 0..12 {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            i + 1,
            ssns[i],
            birth_dates[i],
            amounts[i],
            actives[i],
            cities[i]
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

fn descriptors() -> Vec<AttributeDescriptor> {
    ["id", "ssn", "birth_date", "amount", "active", "city"]
        .iter()
        .map(|column| AttributeDescriptor::new("customers_csv", None, *column))
        .collect()
}

fn assert_common_invariants(profile: &Profile) {
    let non_null = profile.total_records - profile.null_count;
    assert!(profile.distinct_count <= non_null, "{}", profile.attribute_key);
    assert_eq!(
        profile.is_unique,
        non_null > 0 && profile.distinct_count == non_null,
        "{}",
        profile.attribute_key
    );
}

#[tokio::test]
async fn profile_csv_end_to_end() {
    init_tracing();
    let file = customers_csv();
    let accessor: Arc<dyn DataAccessor> = Arc::new(CsvAccessor::new(file.path()));
    let store = MemoryProfileStore::new();
    let profiler = DataProfiler::new(ProfilerConfig::default());

    let profiles = profiler
        .profile_attributes(&descriptors(), accessor, &store)
        .await
        .unwrap();

    assert_eq!(profiles.len(), 6);
    assert!(profiles.iter().all(|p| !p.is_error()));
    for profile in &profiles {
        assert_eq!(profile.total_records, 12);
        assert_common_invariants(profile);
    }

    let by_column = |column: &str| {
        profiles
            .iter()
            .find(|p| p.attribute_key.column == column)
            .unwrap()
    };

    let id = by_column("id");
    assert_eq!(id.data_type_detected(), DetectedType::Numeric);
    assert!(id.is_unique);

    let ssn = by_column("ssn");
    assert_eq!(ssn.data_type_detected(), DetectedType::String);
    assert!(ssn.pattern_flags().is_ssn_candidate);
    assert!(!ssn.pattern_flags().is_dob_candidate);

    let birth_date = by_column("birth_date");
    assert_eq!(birth_date.data_type_detected(), DetectedType::String);
    assert!(birth_date.pattern_flags().is_dob_candidate);

    let amount = by_column("amount");
    assert_eq!(amount.data_type_detected(), DetectedType::Numeric);
    assert_eq!(amount.null_count, 2);
    let TypeMetrics::Numeric(metrics) = &amount.metrics else {
        panic!("expected numeric metrics for amount");
    };
    assert_eq!(metrics.min, 10.5);
    assert_eq!(metrics.max, 100.0);

    let active = by_column("active");
    assert_eq!(active.data_type_detected(), DetectedType::Boolean);
    let TypeMetrics::Boolean(metrics) = &active.metrics else {
        panic!("expected boolean metrics for active");
    };
    assert_eq!(metrics.true_count + metrics.false_count, 12);

    let city = by_column("city");
    assert_eq!(city.data_type_detected(), DetectedType::String);
    assert!(!city.pattern_flags().is_ssn_candidate);
    let TypeMetrics::String(metrics) = &city.metrics else {
        panic!("expected string metrics for city");
    };
    assert_eq!(metrics.top_values[0].value, "austin");

    assert_eq!(store.len(), 6);
}

#[tokio::test]
async fn recluster_assigns_every_stored_profile() {
    init_tracing();
    let file = customers_csv();
    let accessor: Arc<dyn DataAccessor> = Arc::new(CsvAccessor::new(file.path()));
    let store = MemoryProfileStore::new();
    let profiler = DataProfiler::new(ProfilerConfig::default());

    profiler
        .profile_attributes(&descriptors(), accessor, &store)
        .await
        .unwrap();
    let assignments = profiler.recluster(&store, 5.0).await.unwrap();

    assert_eq!(assignments.len(), 6);
    let stored = store.list_current_profiles().await.unwrap();
    assert!(stored.iter().all(|p| p.cluster_id.is_some()));
}

#[tokio::test]
async fn reprofiling_overwrites_the_stored_record() {
    let file = customers_csv();
    let accessor: Arc<dyn DataAccessor> = Arc::new(CsvAccessor::new(file.path()));
    let store = MemoryProfileStore::new();
    let profiler = DataProfiler::new(ProfilerConfig::default());

    let first = profiler
        .profile_attributes(&descriptors(), Arc::clone(&accessor), &store)
        .await
        .unwrap();
    let second = profiler
        .profile_attributes(&descriptors(), accessor, &store)
        .await
        .unwrap();

    // Same key set, still one current record per attribute.
    assert_eq!(store.len(), 6);

    // Unchanged source and config: equal in every field but the stamp.
    for (a, b) in first.iter().zip(&second) {
        let mut b = b.clone();
        b.profiled_at = a.profiled_at;
        assert_eq!(*a, b);
    }
}

#[tokio::test]
async fn failed_attributes_persist_as_error_records_and_skip_clustering() {
    init_tracing();
    let accessor: Arc<dyn DataAccessor> = Arc::new(MemoryAccessor::new(vec![
        json!({"amount": 10, "city": "austin"}),
        json!({"amount": 20, "city": "boston"}),
        json!({"amount": 30, "city": "austin"}),
    ]));
    let store = MemoryProfileStore::new();
    let profiler = DataProfiler::new(ProfilerConfig::default());

    let descriptors = vec![
        AttributeDescriptor::new("mem", None, "amount"),
        AttributeDescriptor::new("mem", None, "city"),
        AttributeDescriptor::new("mem", None, "does_not_exist"),
    ];
    let profiles = profiler
        .profile_attributes(&descriptors, accessor, &store)
        .await
        .unwrap();

    assert_eq!(profiles.len(), 3);
    let failed: Vec<_> = profiles.iter().filter(|p| p.is_error()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attribute_key.column, "does_not_exist");

    let assignments = profiler.recluster(&store, 5.0).await.unwrap();
    assert_eq!(assignments.len(), 2);

    let stored = store.list_current_profiles().await.unwrap();
    let error_record = stored
        .iter()
        .find(|p| p.attribute_key.column == "does_not_exist")
        .unwrap();
    assert!(error_record.is_error());
    assert_eq!(error_record.cluster_id, None);
}
