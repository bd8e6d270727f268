//! In-Memory Record Store
//!
//! DashMap-backed implementations of the record store ports. Each map entry
//! is written under its own shard lock, giving the single-record atomicity
//! the ports require. Used by tests and by standalone deployments that keep
//! volume state in process.

use crate::domain::ports::{TargetCounterRepository, VolumeRepository};
use crate::domain::volume::{TargetAllocationCounter, Volume};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;

// =============================================================================
// Volume Repository
// =============================================================================

/// In-memory volume record store
#[derive(Default)]
pub struct InMemoryVolumeRepository {
    records: DashMap<String, Volume>,
}

impl InMemoryVolumeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VolumeRepository for InMemoryVolumeRepository {
    async fn get(&self, volume_id: &str) -> Result<Volume> {
        self.records
            .get(volume_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::RecordNotFound {
                volume_id: volume_id.to_string(),
            })
    }

    async fn put(&self, volume: Volume) -> Result<()> {
        self.records.insert(volume.id.clone(), volume);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Volume>> {
        Ok(self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }
}

// =============================================================================
// Target Counter Repository
// =============================================================================

/// In-memory per-node target allocation counters
#[derive(Default)]
pub struct InMemoryTargetCounters {
    counters: DashMap<String, TargetAllocationCounter>,
}

impl InMemoryTargetCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TargetCounterRepository for InMemoryTargetCounters {
    async fn load(&self, node: &str) -> Result<Option<TargetAllocationCounter>> {
        Ok(self.counters.get(node).map(|entry| entry.clone()))
    }

    async fn store(&self, node: &str, counter: &TargetAllocationCounter) -> Result<()> {
        self.counters.insert(node.to_string(), counter.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::volume::VolumeState;

    #[tokio::test]
    async fn test_get_put_roundtrip() {
        let repository = InMemoryVolumeRepository::new();
        assert!(matches!(
            repository.get("vol-1").await,
            Err(Error::RecordNotFound { .. })
        ));

        repository
            .put(Volume::new("vol-1", "acct", "zone-a", 10, None))
            .await
            .unwrap();
        let volume = repository.get("vol-1").await.unwrap();
        assert_eq!(volume.state, VolumeState::Generating);
        assert_eq!(repository.len(), 1);
    }

    #[tokio::test]
    async fn test_put_replaces_last_writer_wins() {
        let repository = InMemoryVolumeRepository::new();
        let mut volume = Volume::new("vol-1", "acct", "zone-a", 10, None);
        repository.put(volume.clone()).await.unwrap();

        volume.set_state(VolumeState::Extant);
        repository.put(volume).await.unwrap();

        assert_eq!(
            repository.get("vol-1").await.unwrap().state,
            VolumeState::Extant
        );
        assert_eq!(repository.len(), 1);
    }

    #[tokio::test]
    async fn test_counter_roundtrip() {
        let counters = InMemoryTargetCounters::new();
        assert!(counters.load("sc-0").await.unwrap().is_none());

        let counter = TargetAllocationCounter::initial("iqn.2009-06.com.example:", "storage");
        counters.store("sc-0", &counter).await.unwrap();

        let loaded = counters.load("sc-0").await.unwrap().unwrap();
        assert_eq!(loaded.tid, 1);
        assert_eq!(loaded.store_user, "storage");
    }
}
