//! Reconciliation Scheduler
//!
//! Leader-gated periodic trigger for the reconciliation sweep. A single
//! compare-and-set flag guarantees at most one sweep in flight process-wide;
//! ticks arriving while a sweep runs are dropped, never queued.

use crate::controlplane::reconciler::VolumeReconciler;
use crate::domain::ports::{LeaderElection, LeaderElectionRef};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Dispatches at most one concurrent reconciliation sweep on a periodic tick
pub struct ReconciliationScheduler {
    reconciler: Arc<VolumeReconciler>,
    leader: LeaderElectionRef,
    /// true while no sweep is in flight
    ready: Arc<AtomicBool>,
}

impl ReconciliationScheduler {
    pub fn new(reconciler: Arc<VolumeReconciler>, leader: LeaderElectionRef) -> Self {
        Self {
            reconciler,
            leader,
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle one clock tick. Returns true when a sweep was dispatched.
    ///
    /// Leadership is re-checked on every tick; losing leadership mid-sweep
    /// does not abort the in-flight sweep, the next tick simply fails the
    /// check. The ready flag is flipped with compare-and-set before dispatch
    /// and reset unconditionally when the sweep finishes.
    pub fn tick(&self) -> bool {
        if !self.leader.is_leader() {
            return false;
        }

        if self
            .ready
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sweep already in flight, tick dropped");
            return false;
        }

        let reconciler = self.reconciler.clone();
        let ready = self.ready.clone();
        tokio::spawn(async move {
            let _ = reconciler.run_sweep().await;
            ready.store(true, Ordering::Release);
        });
        true
    }

    /// Whether no sweep is currently in flight
    pub fn is_idle(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Drive ticks from a periodic clock until cancelled. Missed ticks are
    /// skipped so no backlog builds up behind a slow sweep.
    pub async fn run(&self, period: Duration, shutdown: CancellationToken) {
        info!(period_secs = period.as_secs(), "reconciliation scheduler started");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = shutdown.cancelled() => {
                    info!("reconciliation scheduler stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        StaticAttachments, StaticLeader, StorageBackendClient, VolumeRepository,
    };
    use crate::domain::volume::{BackendVolumeStatus, Volume};
    use crate::domain::PartitionMap;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Repository whose list call is artificially slow, counting invocations
    struct SlowRepository {
        lists: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl VolumeRepository for SlowRepository {
        async fn get(&self, volume_id: &str) -> Result<Volume> {
            Err(crate::error::Error::RecordNotFound {
                volume_id: volume_id.to_string(),
            })
        }

        async fn put(&self, _volume: Volume) -> Result<()> {
            Ok(())
        }

        async fn list(&self) -> Result<Vec<Volume>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }
    }

    struct NullBackend;

    #[async_trait]
    impl StorageBackendClient for NullBackend {
        async fn describe_volumes(&self, _endpoint: &str) -> Result<Vec<BackendVolumeStatus>> {
            Ok(Vec::new())
        }

        async fn describe_volume(
            &self,
            _endpoint: &str,
            _volume_id: &str,
        ) -> Result<Option<BackendVolumeStatus>> {
            Ok(None)
        }

        async fn create_volume(
            &self,
            _endpoint: &str,
            _volume_id: &str,
            _size_gib: u32,
            _snapshot_id: Option<&str>,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn slow_scheduler(
        lists: Arc<AtomicUsize>,
        delay: Duration,
        leading: bool,
    ) -> ReconciliationScheduler {
        let reconciler = VolumeReconciler::new(
            Arc::new(SlowRepository { lists, delay }),
            Arc::new(NullBackend),
            Arc::new(StaticAttachments::new()),
            PartitionMap::default(),
        );
        ReconciliationScheduler::new(reconciler, Arc::new(StaticLeader::new(leading)))
    }

    async fn wait_idle(scheduler: &ReconciliationScheduler) {
        for _ in 0..100 {
            if scheduler.is_idle() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scheduler never returned to idle");
    }

    #[tokio::test]
    async fn test_concurrent_ticks_run_one_sweep() {
        let lists = Arc::new(AtomicUsize::new(0));
        let scheduler = slow_scheduler(lists.clone(), Duration::from_millis(100), true);

        assert!(scheduler.tick());
        for _ in 0..4 {
            assert!(!scheduler.tick());
        }

        wait_idle(&scheduler).await;
        assert_eq!(lists.load(Ordering::SeqCst), 1);

        // once idle again, the next tick dispatches
        assert!(scheduler.tick());
        wait_idle(&scheduler).await;
        assert_eq!(lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_leader_never_dispatches() {
        let lists = Arc::new(AtomicUsize::new(0));
        let scheduler = slow_scheduler(lists.clone(), Duration::from_millis(1), false);

        for _ in 0..3 {
            assert!(!scheduler.tick());
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(lists.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_idle());
    }

    #[tokio::test]
    async fn test_run_loop_cancellation() {
        let lists = Arc::new(AtomicUsize::new(0));
        let scheduler = Arc::new(slow_scheduler(
            lists.clone(),
            Duration::from_millis(1),
            true,
        ));

        let shutdown = CancellationToken::new();
        let handle = {
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                scheduler.run(Duration::from_millis(10), shutdown).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(lists.load(Ordering::SeqCst) >= 1);
    }
}
