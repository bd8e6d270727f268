//! Volume domain records
//!
//! The authoritative volume record, its lifecycle states, and the ephemeral
//! per-sweep status reported by a partition's storage backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Volume State
// =============================================================================

/// Lifecycle state of a volume record.
///
/// `Generating -> Extant -> Busy <-> Extant`; any non-terminal state can move
/// to `Fail` (timeout) or through `Annihilating` to `Annihilated`.
/// `Fail` and `Annihilated` are terminal; terminal records are retained, not
/// purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeState {
    Generating,
    Extant,
    Busy,
    Annihilating,
    Annihilated,
    Fail,
}

impl VolumeState {
    /// Terminal states never leave via the lifecycle graph
    pub fn is_terminal(&self) -> bool {
        matches!(self, VolumeState::Annihilated | VolumeState::Fail)
    }
}

impl std::fmt::Display for VolumeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeState::Generating => write!(f, "generating"),
            VolumeState::Extant => write!(f, "extant"),
            VolumeState::Busy => write!(f, "busy"),
            VolumeState::Annihilating => write!(f, "annihilating"),
            VolumeState::Annihilated => write!(f, "annihilated"),
            VolumeState::Fail => write!(f, "fail"),
        }
    }
}

// =============================================================================
// Volume Record
// =============================================================================

/// Authoritative volume record held in the record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    /// Volume id (immutable)
    pub id: String,
    /// Owning account
    pub owner: String,
    /// Partition (availability zone) serving this volume (immutable)
    pub partition: String,
    /// Size in GiB; authoritative once non-zero, never decreased
    pub size_gib: u32,
    /// Current lifecycle state
    pub state: VolumeState,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last state-change timestamp
    pub updated_at: DateTime<Utc>,
    /// Snapshot this volume was created from, if any
    pub snapshot_id: Option<String>,
}

impl Volume {
    /// Create a new record in `Generating` state
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        partition: impl Into<String>,
        size_gib: u32,
        snapshot_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner: owner.into(),
            partition: partition.into(),
            size_gib,
            state: VolumeState::Generating,
            created_at: now,
            updated_at: now,
            snapshot_id,
        }
    }

    /// A volume is ready once it has left `Generating` without failing
    pub fn is_ready(&self) -> bool {
        !matches!(self.state, VolumeState::Generating | VolumeState::Fail)
    }

    /// Time elapsed since the record was created
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    /// Record a state change and bump the update timestamp
    pub fn set_state(&mut self, state: VolumeState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Backend-Reported Status
// =============================================================================

/// Status tag reported by a partition's storage backend.
///
/// Absence of a report is represented by the volume missing from the sweep's
/// describe response, not by a variant here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendStatus {
    Creating,
    Available,
    InUse,
    Failed,
    /// Unrecognized tag; the transition table treats it like a deleted volume
    Other(String),
}

impl BackendStatus {
    /// Parse the wire status tag
    pub fn parse(tag: &str) -> Self {
        match tag {
            "creating" => BackendStatus::Creating,
            "available" => BackendStatus::Available,
            "in-use" => BackendStatus::InUse,
            "failed" => BackendStatus::Failed,
            other => BackendStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendStatus::Creating => write!(f, "creating"),
            BackendStatus::Available => write!(f, "available"),
            BackendStatus::InUse => write!(f, "in-use"),
            BackendStatus::Failed => write!(f, "failed"),
            BackendStatus::Other(tag) => write!(f, "{}", tag),
        }
    }
}

/// Ground-truth volume status fetched from a backend, consumed once per sweep
#[derive(Debug, Clone)]
pub struct BackendVolumeStatus {
    /// Backend's id for the volume (matches the record id)
    pub volume_id: String,
    /// Status tag
    pub status: BackendStatus,
    /// Size in GiB as seen by the backend
    pub size_gib: u32,
    /// Device node the backend attached, if any
    pub device_name: Option<String>,
    /// Snapshot the backend created the volume from
    pub snapshot_id: Option<String>,
    /// Backend-side creation time
    pub created_at: Option<DateTime<Utc>>,
}

impl BackendVolumeStatus {
    /// Whether the backend has attached a usable device node.
    ///
    /// The backend reports "invalid" or "unknown" while storage is allocated
    /// but no device node exists yet.
    pub fn device_known(&self) -> bool {
        match self.device_name.as_deref() {
            None | Some("") | Some("invalid") | Some("unknown") => false,
            Some(_) => true,
        }
    }
}

// =============================================================================
// Export Records
// =============================================================================

/// Per-node counter backing target-id and store-number allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAllocationCounter {
    /// iSCSI qualified-name prefix for store names
    pub store_prefix: String,
    /// Next store number to hand out
    pub store_number: u32,
    /// CHAP account bound to exported targets
    pub store_user: String,
    /// Next candidate target id
    pub tid: u32,
}

impl TargetAllocationCounter {
    /// Initial counter for a freshly configured node
    pub fn initial(store_prefix: impl Into<String>, store_user: impl Into<String>) -> Self {
        Self {
            store_prefix: store_prefix.into(),
            store_number: 0,
            store_user: store_user.into(),
            tid: 1,
        }
    }
}

/// A successfully allocated export; invalid once the target is torn down
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    /// Allocated iSCSI target id
    pub tid: u32,
    /// Logical unit number (never 0; some initiators reject it)
    pub lun: u32,
    /// iSCSI target name
    pub store_name: String,
    /// CHAP user bound to the target
    pub store_user: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_state_display_and_terminal() {
        assert_eq!(format!("{}", VolumeState::Generating), "generating");
        assert_eq!(format!("{}", VolumeState::Annihilated), "annihilated");
        assert!(VolumeState::Fail.is_terminal());
        assert!(VolumeState::Annihilated.is_terminal());
        assert!(!VolumeState::Busy.is_terminal());
    }

    #[test]
    fn test_backend_status_parse() {
        assert_eq!(BackendStatus::parse("creating"), BackendStatus::Creating);
        assert_eq!(BackendStatus::parse("available"), BackendStatus::Available);
        assert_eq!(BackendStatus::parse("in-use"), BackendStatus::InUse);
        assert_eq!(BackendStatus::parse("failed"), BackendStatus::Failed);
        assert_eq!(
            BackendStatus::parse("deleting"),
            BackendStatus::Other("deleting".into())
        );
    }

    #[test]
    fn test_device_known() {
        let mut status = BackendVolumeStatus {
            volume_id: "vol-1".into(),
            status: BackendStatus::Available,
            size_gib: 10,
            device_name: Some("/dev/vg0/vol-1".into()),
            snapshot_id: None,
            created_at: None,
        };
        assert!(status.device_known());

        for bad in [None, Some("".into()), Some("invalid".into()), Some("unknown".into())] {
            status.device_name = bad;
            assert!(!status.device_known());
        }
    }

    #[test]
    fn test_volume_readiness_and_age() {
        let mut vol = Volume::new("vol-1", "acct-1", "zone-a", 8, None);
        assert!(!vol.is_ready());

        vol.set_state(VolumeState::Extant);
        assert!(vol.is_ready());

        vol.set_state(VolumeState::Fail);
        assert!(!vol.is_ready());

        let now = vol.created_at + ChronoDuration::hours(3);
        assert!(vol.age(now) > std::time::Duration::from_secs(2 * 60 * 60));
    }

    #[test]
    fn test_initial_counter() {
        let counter = TargetAllocationCounter::initial("iqn.2009-06.com.example:", "storage");
        assert_eq!(counter.tid, 1);
        assert_eq!(counter.store_number, 0);
    }
}
