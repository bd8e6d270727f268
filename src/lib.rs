//! Block Storage Controller - Volume Control Plane
//!
//! Control plane owning the authoritative lifecycle of virtual block-storage
//! volumes across partitions (availability zones), and the iSCSI export
//! machinery that exposes a volume's block device to a compute host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        Volume Control Plane                          │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌─────────────────┐  │
//! │  │ Reconciliation   │──▶│     Volume       │──▶│  Volume State   │  │
//! │  │   Scheduler      │   │   Reconciler     │   │    Machine      │  │
//! │  │ (leader-gated)   │   │ (per-partition)  │   │    (pure)       │  │
//! │  └──────────────────┘   └────────┬─────────┘   └─────────────────┘  │
//! │                                  │                                   │
//! │  ┌──────────────────┐   ┌────────┴─────────┐   ┌─────────────────┐  │
//! │  │     Volume       │──▶│     Volume       │   │ Storage Backend │  │
//! │  │    Lifecycle     │   │   Repository     │   │  Client (HTTP)  │  │
//! │  └──────────────────┘   └──────────────────┘   └─────────────────┘  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                          Export Subsystem                            │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌─────────────────┐  │
//! │  │     Target       │──▶│     Export       │──▶│ Timed Command   │  │
//! │  │    Allocator     │   │    Manager       │   │    Runner       │  │
//! │  └──────────────────┘   └──────────────────┘   └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: reconciliation sweep, scheduler, lifecycle, backends
//! - [`export`]: iSCSI target allocation, export/teardown, command runner
//! - [`repository`]: record store adapters
//! - [`domain`]: core records and port definitions
//! - [`error`]: error types and handling

pub mod controlplane;
pub mod domain;
pub mod error;
pub mod export;
pub mod repository;

// Re-export commonly used types
pub use controlplane::{
    HttpBackendConfig, HttpStorageBackend, ReconciliationScheduler, SweepMetrics,
    VolumeLifecycle, VolumeReconciler,
};

pub use domain::{
    AttachmentInfo, AttachmentSource, BackendStatus, BackendVolumeStatus, CommandRunner,
    ExportRecord, Fault, FaultNotifier, LeaderElection, LogFaultNotifier, LogUsageEventSink,
    PartitionMap, StaticAttachments, StaticLeader, StorageBackendClient,
    TargetAllocationCounter, TargetCounterRepository, UsageEventSink, Volume, VolumeRepository,
    VolumeState, VolumeUsageEvent,
};

pub use error::{Error, ErrorAction, Result};

pub use export::{
    CommandRunnerConfig, ExportManager, TargetAllocator, TargetAllocatorConfig,
    TimedCommandRunner, EXPORT_LUN,
};

pub use repository::{InMemoryTargetCounters, InMemoryVolumeRepository};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
