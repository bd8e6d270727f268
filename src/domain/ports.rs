//! Domain Ports - Core trait definitions for the storage controller
//!
//! These traits define the boundaries between the control plane and its
//! external collaborators. Adapters implement these traits to provide
//! concrete functionality.

use crate::domain::volume::{BackendVolumeStatus, TargetAllocationCounter, Volume};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

// =============================================================================
// Storage Backend Port
// =============================================================================

/// Port for the remote storage-controller service owning ground-truth volume
/// status for a partition. Calls are synchronous in the RPC sense: they block
/// the caller until reply or transport timeout and are not independently
/// cancellable.
#[async_trait]
pub trait StorageBackendClient: Send + Sync {
    /// Describe every volume the backend at `endpoint` knows about
    async fn describe_volumes(&self, endpoint: &str) -> Result<Vec<BackendVolumeStatus>>;

    /// Describe a single volume; `None` when the backend has no record of it
    async fn describe_volume(
        &self,
        endpoint: &str,
        volume_id: &str,
    ) -> Result<Option<BackendVolumeStatus>>;

    /// Ask the backend to create storage for a new volume
    async fn create_volume(
        &self,
        endpoint: &str,
        volume_id: &str,
        size_gib: u32,
        snapshot_id: Option<&str>,
    ) -> Result<()>;
}

// =============================================================================
// Record Store Ports
// =============================================================================

/// Port for the persistent volume record store.
///
/// Each call is one single-record transaction; there is no cross-record
/// locking. Read-then-write races resolve last-writer-wins and re-converge on
/// the next sweep.
#[async_trait]
pub trait VolumeRepository: Send + Sync {
    /// Fetch one record; `Error::RecordNotFound` if absent
    async fn get(&self, volume_id: &str) -> Result<Volume>;

    /// Write one record, creating or replacing it
    async fn put(&self, volume: Volume) -> Result<()>;

    /// Snapshot of all records (read-only, no lock held beyond the read)
    async fn list(&self) -> Result<Vec<Volume>>;
}

/// Port for the per-node target allocation counter record
#[async_trait]
pub trait TargetCounterRepository: Send + Sync {
    /// Load the counter for a storage node, if one was configured
    async fn load(&self, node: &str) -> Result<Option<TargetAllocationCounter>>;

    /// Persist the counter for a storage node
    async fn store(&self, node: &str, counter: &TargetAllocationCounter) -> Result<()>;
}

// =============================================================================
// Attachment Port
// =============================================================================

/// An existing volume attachment, owned by the compute subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    /// Instance the volume is attached to
    pub instance_id: String,
}

/// Port for reading volume attachment state from the compute subsystem.
/// Reconciliation only reads whether an attachment currently exists.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    /// Current attachment for a volume, if any
    async fn lookup(&self, volume_id: &str) -> Result<Option<AttachmentInfo>>;
}

/// Attachment source fed explicitly by the embedding process.
///
/// The compute subsystem records attach/detach transitions here; the
/// reconciler only ever reads.
#[derive(Default)]
pub struct StaticAttachments {
    attachments: RwLock<HashMap<String, String>>,
}

impl StaticAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attachment
    pub fn attach(&self, volume_id: impl Into<String>, instance_id: impl Into<String>) {
        self.attachments
            .write()
            .insert(volume_id.into(), instance_id.into());
    }

    /// Clear an attachment
    pub fn detach(&self, volume_id: &str) {
        self.attachments.write().remove(volume_id);
    }
}

#[async_trait]
impl AttachmentSource for StaticAttachments {
    async fn lookup(&self, volume_id: &str) -> Result<Option<AttachmentInfo>> {
        Ok(self
            .attachments
            .read()
            .get(volume_id)
            .map(|instance_id| AttachmentInfo {
                instance_id: instance_id.clone(),
            }))
    }
}

// =============================================================================
// Leader Election Port
// =============================================================================

/// Port for cluster leader election. Any correct cluster-membership
/// implementation satisfies the contract; the scheduler re-checks every tick.
pub trait LeaderElection: Send + Sync {
    /// Whether this process is the elected coordinator of the fleet
    fn is_leader(&self) -> bool;
}

/// Fixed leadership flag, flippable at runtime (single-node deployments,
/// tests, or an external election loop driving the flag)
pub struct StaticLeader {
    leading: AtomicBool,
}

impl StaticLeader {
    pub fn new(leading: bool) -> Self {
        Self {
            leading: AtomicBool::new(leading),
        }
    }

    pub fn set_leader(&self, leading: bool) {
        self.leading.store(leading, Ordering::Release);
    }
}

impl LeaderElection for StaticLeader {
    fn is_leader(&self) -> bool {
        self.leading.load(Ordering::Acquire)
    }
}

// =============================================================================
// Fault Notification Port
// =============================================================================

/// Fault id raised when the target daemon stops responding to commands
pub const FAULT_TARGET_DAEMON_UNRESPONSIVE: u32 = 2000;

/// A fault report for the external alerting subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Stable fault id
    pub fault_id: u32,
    /// Component reporting the fault
    pub component: String,
    /// Operation that was in flight
    pub operation: String,
}

impl Fault {
    /// Fault fired when an external command exceeds its timeout
    pub fn target_daemon_unresponsive(operation: impl Into<String>) -> Self {
        Self {
            fault_id: FAULT_TARGET_DAEMON_UNRESPONSIVE,
            component: "storage-controller".to_string(),
            operation: operation.into(),
        }
    }
}

/// Port for the external fault/alerting subsystem
pub trait FaultNotifier: Send + Sync {
    /// Report a fault; must not block or fail the caller
    fn notify(&self, fault: Fault);
}

/// Notifier that records faults in the controller log only
#[derive(Default)]
pub struct LogFaultNotifier;

impl FaultNotifier for LogFaultNotifier {
    fn notify(&self, fault: Fault) {
        error!(
            fault_id = fault.fault_id,
            component = %fault.component,
            operation = %fault.operation,
            "fault raised"
        );
    }
}

// =============================================================================
// Usage Event Port
// =============================================================================

/// Usage event published after a billable volume action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeUsageEvent {
    Create {
        volume_id: String,
        owner: String,
        partition: String,
        size_gib: u32,
    },
}

/// Port for the usage-event publication subsystem. Publication is
/// fire-and-forget: failures are logged by the implementation, never
/// surfaced to the caller.
pub trait UsageEventSink: Send + Sync {
    fn publish(&self, event: VolumeUsageEvent);
}

/// Sink that records usage events in the controller log only
#[derive(Default)]
pub struct LogUsageEventSink;

impl UsageEventSink for LogUsageEventSink {
    fn publish(&self, event: VolumeUsageEvent) {
        match event {
            VolumeUsageEvent::Create {
                volume_id,
                owner,
                partition,
                size_gib,
            } => info!(
                volume_id = %volume_id,
                owner = %owner,
                partition = %partition,
                size_gib,
                "usage event: volume created"
            ),
        }
    }
}

// =============================================================================
// External Command Port
// =============================================================================

/// Port for executing privileged external commands with a bounded runtime.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command, enforcing the configured timeout. Fails on timeout, on
    /// non-zero exit, or on any stderr output (diagnostics are treated as an
    /// error signal even when the exit code is zero). Returns stdout.
    async fn run(&self, command: &[String]) -> Result<String>;

    /// Run a command and return its exit code without policing stderr.
    /// Used by best-effort paths that branch on the code themselves.
    async fn run_and_get_code(&self, command: &[String]) -> Result<i32>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type StorageBackendClientRef = Arc<dyn StorageBackendClient>;
pub type VolumeRepositoryRef = Arc<dyn VolumeRepository>;
pub type TargetCounterRepositoryRef = Arc<dyn TargetCounterRepository>;
pub type AttachmentSourceRef = Arc<dyn AttachmentSource>;
pub type LeaderElectionRef = Arc<dyn LeaderElection>;
pub type FaultNotifierRef = Arc<dyn FaultNotifier>;
pub type UsageEventSinkRef = Arc<dyn UsageEventSink>;
pub type CommandRunnerRef = Arc<dyn CommandRunner>;

/// Render a command argv for logs and error messages
pub fn render_command(command: &[String]) -> String {
    command.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_attachments() {
        let attachments = StaticAttachments::new();
        assert!(attachments.lookup("vol-1").await.unwrap().is_none());

        attachments.attach("vol-1", "i-0042");
        let info = attachments.lookup("vol-1").await.unwrap().unwrap();
        assert_eq!(info.instance_id, "i-0042");

        attachments.detach("vol-1");
        assert!(attachments.lookup("vol-1").await.unwrap().is_none());
    }

    #[test]
    fn test_static_leader() {
        let leader = StaticLeader::new(true);
        assert!(leader.is_leader());

        leader.set_leader(false);
        assert!(!leader.is_leader());
    }

    #[test]
    fn test_fault_shape() {
        let fault = Fault::target_daemon_unresponsive("tgtadm --op new");
        assert_eq!(fault.fault_id, FAULT_TARGET_DAEMON_UNRESPONSIVE);
        assert_eq!(fault.component, "storage-controller");
    }

    #[test]
    fn test_render_command() {
        let argv = vec!["tgtadm".to_string(), "--op".to_string(), "show".to_string()];
        assert_eq!(render_command(&argv), "tgtadm --op show");
    }
}
