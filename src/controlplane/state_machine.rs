//! Volume state transition function
//!
//! Pure, side-effect-free folding of a backend-reported status into a
//! recorded volume state. The reconciler and the readiness fallback both go
//! through [`next`]; nothing else mutates volume state.

use crate::domain::volume::{BackendStatus, BackendVolumeStatus, VolumeState};
use std::time::Duration;

/// How long a `Generating` volume may stay unreported by its backend before
/// it is declared failed
pub const GENERATING_STATE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Core transition table: (recorded state, reported status) -> next state.
///
/// `Busy` is sticky until the attachment clears; `Annihilating` dominates
/// everything except a report the general rule maps to `Annihilated`.
fn transition(recorded: VolumeState, status: &BackendStatus) -> VolumeState {
    match recorded {
        VolumeState::Generating => match status {
            BackendStatus::Failed => VolumeState::Fail,
            BackendStatus::Available => VolumeState::Extant,
            _ => VolumeState::Generating,
        },
        VolumeState::Annihilating => match general_rule(status) {
            VolumeState::Annihilated => VolumeState::Annihilated,
            _ => VolumeState::Annihilating,
        },
        VolumeState::Busy => VolumeState::Busy,
        VolumeState::Extant | VolumeState::Annihilated | VolumeState::Fail => {
            general_rule(status)
        }
    }
}

/// The general status mapping applied outside the special-cased states
fn general_rule(status: &BackendStatus) -> VolumeState {
    match status {
        BackendStatus::Failed => VolumeState::Fail,
        BackendStatus::Creating => VolumeState::Generating,
        BackendStatus::Available => VolumeState::Extant,
        BackendStatus::InUse => VolumeState::Busy,
        BackendStatus::Other(_) => VolumeState::Annihilated,
    }
}

/// Fold one sweep's observation into the recorded state.
///
/// * `report` is the backend's status for this volume, or `None` when the
///   backend reported nothing for it this sweep.
/// * `attached` is whether the compute subsystem currently holds an
///   attachment to a running instance.
/// * `age` is the record's age since creation, used only for the
///   stale-`Generating` timeout.
pub fn next(
    recorded: VolumeState,
    report: Option<&BackendVolumeStatus>,
    attached: bool,
    age: Duration,
) -> VolumeState {
    // Attachment overlay: an attached volume reconciles as busy unless it is
    // already being annihilated.
    let effective = if attached
        && !matches!(
            recorded,
            VolumeState::Annihilating | VolumeState::Annihilated
        ) {
        VolumeState::Busy
    } else {
        recorded
    };

    match report {
        // Absence overlay. A missing report is only conclusive for volumes
        // being annihilated; a generating volume gets the staleness timeout
        // and everything else keeps its state for this sweep.
        None => {
            if recorded == VolumeState::Annihilating {
                VolumeState::Annihilated
            } else if recorded == VolumeState::Generating && age > GENERATING_STATE_TIMEOUT {
                VolumeState::Fail
            } else {
                effective
            }
        }
        Some(status) => {
            // Storage is allocated but no device node exists yet: hold in
            // Generating rather than advancing to Extant.
            if effective == VolumeState::Generating
                && status.status == BackendStatus::Available
                && !status.device_known()
            {
                VolumeState::Generating
            } else {
                transition(effective, &status.status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VolumeState::*;

    fn report(status: BackendStatus, device_name: Option<&str>) -> BackendVolumeStatus {
        BackendVolumeStatus {
            volume_id: "vol-1".into(),
            status,
            size_gib: 10,
            device_name: device_name.map(String::from),
            snapshot_id: None,
            created_at: None,
        }
    }

    fn fold(recorded: VolumeState, status: BackendStatus) -> VolumeState {
        next(
            recorded,
            Some(&report(status, Some("/dev/vg0/vol-1"))),
            false,
            Duration::ZERO,
        )
    }

    #[test]
    fn test_transition_table_exhaustive() {
        let other = || BackendStatus::Other("deleting".into());
        let cases: &[(VolumeState, BackendStatus, VolumeState)] = &[
            (Generating, BackendStatus::Failed, Fail),
            (Generating, BackendStatus::Available, Extant),
            (Generating, BackendStatus::Creating, Generating),
            (Generating, BackendStatus::InUse, Generating),
            (Generating, other(), Generating),
            (Extant, BackendStatus::Failed, Fail),
            (Extant, BackendStatus::Creating, Generating),
            (Extant, BackendStatus::Available, Extant),
            (Extant, BackendStatus::InUse, Busy),
            (Extant, other(), Annihilated),
            (Busy, BackendStatus::Failed, Busy),
            (Busy, BackendStatus::Creating, Busy),
            (Busy, BackendStatus::Available, Busy),
            (Busy, BackendStatus::InUse, Busy),
            (Busy, other(), Busy),
            (Annihilating, BackendStatus::Failed, Annihilating),
            (Annihilating, BackendStatus::Creating, Annihilating),
            (Annihilating, BackendStatus::Available, Annihilating),
            (Annihilating, BackendStatus::InUse, Annihilating),
            (Annihilating, other(), Annihilated),
            (Annihilated, BackendStatus::Failed, Fail),
            (Annihilated, BackendStatus::Creating, Generating),
            (Annihilated, BackendStatus::Available, Extant),
            (Annihilated, BackendStatus::InUse, Busy),
            (Annihilated, other(), Annihilated),
            (Fail, BackendStatus::Failed, Fail),
            (Fail, BackendStatus::Creating, Generating),
            (Fail, BackendStatus::Available, Extant),
            (Fail, BackendStatus::InUse, Busy),
            (Fail, other(), Annihilated),
        ];

        for (recorded, status, expected) in cases {
            let got = fold(*recorded, status.clone());
            assert_eq!(
                got, *expected,
                "({recorded:?}, {status:?}) expected {expected:?}, got {got:?}"
            );
        }
    }

    #[test]
    fn test_determinism() {
        for _ in 0..3 {
            assert_eq!(fold(Extant, BackendStatus::InUse), Busy);
        }
    }

    #[test]
    fn test_generating_without_device_stays_generating() {
        for device in [None, Some(""), Some("invalid"), Some("unknown")] {
            let got = next(
                Generating,
                Some(&report(BackendStatus::Available, device)),
                false,
                Duration::ZERO,
            );
            assert_eq!(got, Generating, "device {device:?}");
        }

        let got = next(
            Generating,
            Some(&report(BackendStatus::Available, Some("/dev/vg0/vol-1"))),
            false,
            Duration::ZERO,
        );
        assert_eq!(got, Extant);
    }

    #[test]
    fn test_attachment_overlay_forces_busy() {
        let got = next(
            Extant,
            Some(&report(BackendStatus::Available, Some("/dev/vg0/vol-1"))),
            true,
            Duration::ZERO,
        );
        assert_eq!(got, Busy);
    }

    #[test]
    fn test_attachment_overlay_skips_annihilating() {
        let got = next(
            Annihilating,
            Some(&report(BackendStatus::InUse, Some("/dev/vg0/vol-1"))),
            true,
            Duration::ZERO,
        );
        assert_eq!(got, Annihilating);
    }

    #[test]
    fn test_annihilating_dominates_failed_report() {
        let got = fold(Annihilating, BackendStatus::Failed);
        assert_eq!(got, Annihilating);

        // and a vanished report finishes the annihilation
        let got = next(Annihilating, None, false, Duration::ZERO);
        assert_eq!(got, Annihilated);
    }

    #[test]
    fn test_absent_generating_times_out() {
        let stale = GENERATING_STATE_TIMEOUT + Duration::from_secs(1);
        assert_eq!(next(Generating, None, false, stale), Fail);

        let fresh = GENERATING_STATE_TIMEOUT - Duration::from_secs(1);
        assert_eq!(next(Generating, None, false, fresh), Generating);
    }

    #[test]
    fn test_absent_otherwise_unchanged() {
        assert_eq!(next(Extant, None, false, Duration::ZERO), Extant);
        assert_eq!(next(Busy, None, false, Duration::ZERO), Busy);
        assert_eq!(next(Fail, None, false, Duration::ZERO), Fail);

        // attachment overlay still applies while the backend is silent
        assert_eq!(next(Extant, None, true, Duration::ZERO), Busy);
    }
}
