//! Target Allocator
//!
//! Hands out iSCSI target ids and store numbers for new exports. The target
//! id space is scarce and shared with whatever is already bound on the
//! daemon, so each candidate id is probed before it is committed. The whole
//! read-probe-commit sequence runs under one lock: two concurrent
//! allocations can never receive the same id.

use crate::domain::ports::{
    CommandRunner, CommandRunnerRef, TargetCounterRepository, TargetCounterRepositoryRef,
};
use crate::domain::volume::{ExportRecord, TargetAllocationCounter};
use crate::error::{Error, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// LUN assigned to every export; 0 is rejected by some initiators
pub const EXPORT_LUN: u32 = 1;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the target allocator
#[derive(Debug, Clone)]
pub struct TargetAllocatorConfig {
    /// Storage node this allocator serves; keys the counter record
    pub node_name: String,
    /// iSCSI qualified-name prefix used when seeding the counter
    pub store_prefix: String,
    /// CHAP account used when seeding the counter
    pub store_user: String,
    /// Upper bound of the target id space before wrap-around
    pub max_tid: u32,
}

impl Default for TargetAllocatorConfig {
    fn default() -> Self {
        Self {
            node_name: "storage-controller".to_string(),
            store_prefix: "iqn.2009-06.com.example:".to_string(),
            store_user: "storage".to_string(),
            max_tid: u32::MAX,
        }
    }
}

// =============================================================================
// Target Allocator
// =============================================================================

/// Allocates unique (target id, store number) pairs under mutual exclusion
pub struct TargetAllocator {
    config: TargetAllocatorConfig,
    counters: TargetCounterRepositoryRef,
    runner: CommandRunnerRef,
    /// Serializes the whole allocate-probe-commit sequence
    allocation_lock: Mutex<()>,
}

impl TargetAllocator {
    pub fn new(
        config: TargetAllocatorConfig,
        counters: TargetCounterRepositoryRef,
        runner: CommandRunnerRef,
    ) -> Self {
        Self {
            config,
            counters,
            runner,
            allocation_lock: Mutex::new(()),
        }
    }

    /// Seed the node's counter record if it does not exist yet
    pub async fn configure(&self) -> Result<()> {
        let _guard = self.allocation_lock.lock().await;
        if self.counters.load(&self.config.node_name).await?.is_none() {
            let counter = TargetAllocationCounter::initial(
                self.config.store_prefix.clone(),
                self.config.store_user.clone(),
            );
            self.counters
                .store(&self.config.node_name, &counter)
                .await?;
            info!(node = %self.config.node_name, "seeded target allocation counter");
        }
        Ok(())
    }

    /// Allocate the next free target id and store number.
    ///
    /// Starting from the counter's candidate id, every id is probed against
    /// the daemon; taken ids are skipped. The search is bounded by
    /// wrap-around of the id space, not a fixed retry count: it only gives
    /// up once it arrives back at the starting id.
    pub async fn allocate(&self) -> Result<ExportRecord> {
        let _guard = self.allocation_lock.lock().await;

        let mut counter = self
            .counters
            .load(&self.config.node_name)
            .await?
            .ok_or_else(|| Error::CounterNotFound {
                node: self.config.node_name.clone(),
            })?;

        let start = counter.tid;
        let mut candidate = start;
        let tid = loop {
            if !self.tid_in_use(candidate).await? {
                break candidate;
            }
            debug!(tid = candidate, "target id already bound, skipping");
            candidate = self.next_tid(candidate);
            if candidate == start {
                return Err(Error::AllocationExhausted {
                    node: self.config.node_name.clone(),
                });
            }
        };

        counter.store_number += 1;
        counter.tid = self.next_tid(tid);
        let record = ExportRecord {
            tid,
            lun: EXPORT_LUN,
            store_name: format!(
                "{}{}:store{}",
                counter.store_prefix, self.config.node_name, counter.store_number
            ),
            store_user: counter.store_user.clone(),
        };
        self.counters
            .store(&self.config.node_name, &counter)
            .await?;

        info!(tid = record.tid, store = %record.store_name, "allocated export target");
        Ok(record)
    }

    /// Probe the daemon for an existing target bound to this id
    async fn tid_in_use(&self, tid: u32) -> Result<bool> {
        let command: Vec<String> = [
            "tgtadm",
            "--lld",
            "iscsi",
            "--op",
            "show",
            "--mode",
            "target",
            "--tid",
            &tid.to_string(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        Ok(self.runner.run_and_get_code(&command).await? == 0)
    }

    fn next_tid(&self, tid: u32) -> u32 {
        if tid >= self.config.max_tid {
            1
        } else {
            tid + 1
        }
    }
}
