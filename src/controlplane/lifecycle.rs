//! Volume Lifecycle
//!
//! Create-volume and wait-until-ready operations consumed by the cloud-facing
//! API layer, plus owner-scoped accounting queries used upstream for quota
//! enforcement.

use crate::controlplane::state_machine;
use crate::domain::ports::{
    StorageBackendClient, StorageBackendClientRef, UsageEventSink, UsageEventSinkRef,
    VolumeRepository, VolumeRepositoryRef, VolumeUsageEvent,
};
use crate::domain::volume::{Volume, VolumeState};
use crate::domain::PartitionMap;
use crate::error::{Error, Result};
use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Prefix for generated volume ids
const VOLUME_ID_PREFIX: &str = "vol";

/// User-initiated volume operations
pub struct VolumeLifecycle {
    repository: VolumeRepositoryRef,
    backend: StorageBackendClientRef,
    partitions: PartitionMap,
    events: UsageEventSinkRef,
}

impl VolumeLifecycle {
    pub fn new(
        repository: VolumeRepositoryRef,
        backend: StorageBackendClientRef,
        partitions: PartitionMap,
        events: UsageEventSinkRef,
    ) -> Arc<Self> {
        Arc::new(Self {
            repository,
            backend,
            partitions,
            events,
        })
    }

    /// Create a new volume: persist a `Generating` record, then ask the
    /// partition's backend to allocate storage for it.
    ///
    /// A backend failure marks the record `Fail` and is surfaced to the
    /// caller; the record is kept, not deleted. On success a usage event is
    /// published fire-and-forget.
    pub async fn create(
        &self,
        partition: &str,
        owner: &str,
        snapshot_id: Option<String>,
        size_gib: u32,
    ) -> Result<Volume> {
        if size_gib == 0 {
            return Err(Error::InvalidSize { size_gib });
        }
        let endpoint = self.partitions.resolve(partition)?.to_string();

        let volume_id = generate_volume_id(owner);
        let mut volume =
            Volume::new(volume_id.clone(), owner, partition, size_gib, snapshot_id.clone());
        self.repository.put(volume.clone()).await?;

        debug!(volume_id = %volume_id, partition = %partition, size_gib, "creating volume");

        match self
            .backend
            .create_volume(&endpoint, &volume_id, size_gib, snapshot_id.as_deref())
            .await
        {
            Ok(()) => {
                info!(volume_id = %volume_id, partition = %partition, "volume created");
                self.events.publish(VolumeUsageEvent::Create {
                    volume_id: volume.id.clone(),
                    owner: volume.owner.clone(),
                    partition: volume.partition.clone(),
                    size_gib: volume.size_gib,
                });
                Ok(volume)
            }
            Err(err) => {
                error!(volume_id = %volume_id, "backend volume creation failed: {}", err);
                volume.set_state(VolumeState::Fail);
                if let Err(put_err) = self.repository.put(volume).await {
                    error!(
                        volume_id = %volume_id,
                        "could not mark failed volume: {}",
                        put_err
                    );
                }
                Err(err)
            }
        }
    }

    /// Single-shot readiness fallback: if the record is not yet ready, fetch
    /// its backend status once, fold it through the transition function,
    /// persist, and re-check. Not a poll loop; callers retry at a higher
    /// level on `Error::NotYetReady`.
    pub async fn wait_until_ready(&self, volume_id: &str) -> Result<Volume> {
        let mut volume = self.repository.get(volume_id).await?;
        if volume.is_ready() {
            return Ok(volume);
        }

        let endpoint = self.partitions.resolve(&volume.partition)?;
        let report = self.backend.describe_volume(endpoint, volume_id).await?;

        let age = volume.age(Utc::now());
        let next = state_machine::next(volume.state, report.as_ref(), false, age);
        if next != volume.state {
            debug!(
                volume_id = %volume_id,
                from = %volume.state,
                to = %next,
                "readiness check updated volume state"
            );
            volume.set_state(next);
            self.repository.put(volume.clone()).await?;
        }

        if volume.is_ready() {
            Ok(volume)
        } else {
            Err(Error::NotYetReady {
                volume_id: volume_id.to_string(),
            })
        }
    }

    /// Fetch one volume record
    pub async fn lookup(&self, volume_id: &str) -> Result<Volume> {
        self.repository.get(volume_id).await
    }

    /// Number of volume records an owner holds, terminal records included
    pub async fn count_volumes(&self, owner: &str) -> Result<usize> {
        Ok(self
            .repository
            .list()
            .await?
            .iter()
            .filter(|v| v.owner == owner)
            .count())
    }

    /// Total GiB recorded against an owner, terminal records included
    pub async fn measure_volumes(&self, owner: &str) -> Result<u64> {
        Ok(self
            .repository
            .list()
            .await?
            .iter()
            .filter(|v| v.owner == owner)
            .map(|v| u64::from(v.size_gib))
            .sum())
    }
}

/// Generate a globally unique volume id salted by owner
fn generate_volume_id(owner: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = DefaultHasher::new();
    owner.hash(&mut hasher);
    nanos.hash(&mut hasher);
    format!("{}-{:016x}", VOLUME_ID_PREFIX, hasher.finish())
}
