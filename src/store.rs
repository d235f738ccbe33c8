//! Profile persistence collaborator interface
//!
//! The real store is an external collaborator (a results table). The
//! core only needs upsert-by-key overwrite semantics, a snapshot read,
//! and cluster-assignment writeback; [`MemoryProfileStore`] implements
//! that contract for tests and embedders.

use crate::errors::Result;
use crate::profile::{AttributeKey, Profile};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::{debug, warn};

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or overwrite the current profile for its attribute key.
    async fn upsert(&self, profile: Profile) -> Result<()>;

    /// Snapshot of every current profile.
    async fn list_current_profiles(&self) -> Result<Vec<Profile>>;

    /// Write cluster assignments back onto stored profiles.
    async fn update_cluster_assignments(
        &self,
        assignments: &HashMap<AttributeKey, i64>,
    ) -> Result<()>;
}

/// Concurrent in-memory store holding one current profile per key.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: DashMap<AttributeKey, Profile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn upsert(&self, profile: Profile) -> Result<()> {
        debug!(attribute = %profile.attribute_key, "upserting profile");
        self.profiles.insert(profile.attribute_key.clone(), profile);
        Ok(())
    }

    async fn list_current_profiles(&self) -> Result<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self
            .profiles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        profiles.sort_by(|a, b| a.attribute_key.cmp(&b.attribute_key));
        Ok(profiles)
    }

    async fn update_cluster_assignments(
        &self,
        assignments: &HashMap<AttributeKey, i64>,
    ) -> Result<()> {
        for (key, cluster_id) in assignments {
            match self.profiles.get_mut(key) {
                Some(mut profile) => profile.cluster_id = Some(*cluster_id),
                None => warn!(attribute = %key, "no stored profile for cluster assignment"),
            }
        }
        Ok(())
    }
}
