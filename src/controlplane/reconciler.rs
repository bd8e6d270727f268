//! Volume State Reconciler
//!
//! Per-sweep orchestrator: groups volume records by partition, fetches one
//! ground-truth report per partition, and folds each volume through the
//! state transition function. Per-partition and per-volume failures are
//! isolated so one bad backend or record never halts the sweep.

use crate::controlplane::state_machine;
use crate::domain::ports::{
    AttachmentSource, AttachmentSourceRef, StorageBackendClient, StorageBackendClientRef,
    VolumeRepository, VolumeRepositoryRef,
};
use crate::domain::volume::{BackendVolumeStatus, Volume};
use crate::domain::PartitionMap;
use crate::error::{Error, Result};
use chrono::Utc;
use futures::future::join_all;
use prometheus::{IntCounter, IntGauge};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, warn};

// =============================================================================
// Sweep Metrics
// =============================================================================

/// Prometheus instruments for the reconciliation sweep
#[derive(Clone)]
pub struct SweepMetrics {
    /// Completed sweeps
    pub sweeps_total: IntCounter,
    /// Volumes examined by the most recent sweep
    pub volumes_examined: IntGauge,
    /// Partition describe calls that failed and were skipped
    pub partition_failures_total: IntCounter,
}

impl SweepMetrics {
    /// Register the sweep instruments on the default registry
    pub fn register() -> Result<Self> {
        let sweeps_total = prometheus::register_int_counter!(
            "volume_sweeps_total",
            "Total number of reconciliation sweeps completed"
        )
        .map_err(|e| Error::Internal(format!("metrics registration failed: {}", e)))?;

        let volumes_examined = prometheus::register_int_gauge!(
            "volume_sweep_examined",
            "Volumes examined by the most recent sweep"
        )
        .map_err(|e| Error::Internal(format!("metrics registration failed: {}", e)))?;

        let partition_failures_total = prometheus::register_int_counter!(
            "volume_sweep_partition_failures_total",
            "Partition describe calls skipped due to backend failure"
        )
        .map_err(|e| Error::Internal(format!("metrics registration failed: {}", e)))?;

        Ok(Self {
            sweeps_total,
            volumes_examined,
            partition_failures_total,
        })
    }
}

// =============================================================================
// Volume Reconciler
// =============================================================================

/// Reconciles recorded volume state against backend ground truth, one sweep
/// at a time
pub struct VolumeReconciler {
    repository: VolumeRepositoryRef,
    backend: StorageBackendClientRef,
    attachments: AttachmentSourceRef,
    partitions: PartitionMap,
    metrics: Option<SweepMetrics>,
}

impl VolumeReconciler {
    /// Create a reconciler without metrics instruments
    pub fn new(
        repository: VolumeRepositoryRef,
        backend: StorageBackendClientRef,
        attachments: AttachmentSourceRef,
        partitions: PartitionMap,
    ) -> Arc<Self> {
        Self::with_metrics(repository, backend, attachments, partitions, None)
    }

    /// Create a reconciler with optional sweep metrics
    pub fn with_metrics(
        repository: VolumeRepositoryRef,
        backend: StorageBackendClientRef,
        attachments: AttachmentSourceRef,
        partitions: PartitionMap,
        metrics: Option<SweepMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            repository,
            backend,
            attachments,
            partitions,
            metrics,
        })
    }

    /// Run one full sweep across all partitions and volumes.
    ///
    /// Returns the number of volumes examined. Never fails: every
    /// per-partition and per-volume error is logged and skipped.
    pub async fn run_sweep(&self) -> usize {
        let volumes = match self.repository.list().await {
            Ok(volumes) => volumes,
            Err(err) => {
                error!("sweep aborted, could not list volume records: {}", err);
                return 0;
            }
        };

        let mut by_partition: BTreeMap<String, Vec<Volume>> = BTreeMap::new();
        for volume in volumes {
            by_partition
                .entry(volume.partition.clone())
                .or_default()
                .push(volume);
        }

        debug!(
            partitions = by_partition.len(),
            "starting reconciliation sweep"
        );

        let sweeps = by_partition
            .into_iter()
            .map(|(partition, volumes)| self.sweep_partition(partition, volumes));
        let examined: usize = join_all(sweeps).await.into_iter().sum();

        if let Some(metrics) = &self.metrics {
            metrics.sweeps_total.inc();
            metrics.volumes_examined.set(examined as i64);
        }

        debug!(examined, "reconciliation sweep complete");
        examined
    }

    /// Sweep one partition. A backend failure here skips the whole partition;
    /// its volumes keep their last recorded state until the next sweep.
    async fn sweep_partition(&self, partition: String, volumes: Vec<Volume>) -> usize {
        let reports = match self.fetch_partition_reports(&partition).await {
            Ok(reports) => reports,
            Err(err) => {
                warn!(
                    partition = %partition,
                    skipped = volumes.len(),
                    "partition sweep skipped: {}",
                    err
                );
                if let Some(metrics) = &self.metrics {
                    metrics.partition_failures_total.inc();
                }
                return 0;
            }
        };

        let mut examined = 0;
        for volume in volumes {
            match self
                .reconcile_volume(&volume.id, reports.get(&volume.id))
                .await
            {
                Ok(()) => examined += 1,
                Err(err) => {
                    warn!(
                        partition = %partition,
                        volume_id = %volume.id,
                        "volume update skipped: {}",
                        err
                    );
                }
            }
        }
        examined
    }

    /// One describe call per partition, keyed by volume id
    async fn fetch_partition_reports(
        &self,
        partition: &str,
    ) -> Result<HashMap<String, BackendVolumeStatus>> {
        let endpoint = self.partitions.resolve(partition)?;
        let reports = self.backend.describe_volumes(endpoint).await?;
        Ok(reports
            .into_iter()
            .map(|report| (report.volume_id.clone(), report))
            .collect())
    }

    /// Fold one volume through the transition function and write the result
    /// back. One record-transaction per volume: the record is re-read here so
    /// a stale snapshot from the grouping pass never masks a concurrent write.
    async fn reconcile_volume(
        &self,
        volume_id: &str,
        report: Option<&BackendVolumeStatus>,
    ) -> Result<()> {
        let mut volume = self.repository.get(volume_id).await?;
        let attached = self.attachments.lookup(volume_id).await?.is_some();
        let age = volume.age(Utc::now());

        let next = state_machine::next(volume.state, report, attached, age);

        let adopted_size = match report {
            Some(report) if volume.size_gib == 0 && report.size_gib > 0 => Some(report.size_gib),
            _ => None,
        };

        if next == volume.state && adopted_size.is_none() {
            return Ok(());
        }

        if let Some(size_gib) = adopted_size {
            volume.size_gib = size_gib;
        }
        if next != volume.state {
            debug!(
                volume_id = %volume.id,
                partition = %volume.partition,
                from = %volume.state,
                to = %next,
                status = report.map(|r| r.status.to_string()).as_deref().unwrap_or("absent"),
                attached,
                "volume state update"
            );
        }
        volume.set_state(next);
        self.repository.put(volume).await
    }
}
