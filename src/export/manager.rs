//! Export Lifecycle Manager
//!
//! Creates and tears down iSCSI exports through the tgt daemon. Export
//! creation is all-or-nothing from the caller's view: the first failed
//! command aborts the sequence, and the caller must treat the export as
//! possibly partially applied. Teardown is best-effort with a bounded
//! delete-retry loop; a target the daemon refuses to release is logged and
//! orphaned rather than failing the caller.

use crate::domain::ports::{CommandRunner, CommandRunnerRef};
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Delete attempts before an undeletable target is abandoned
const DELETE_RETRY_LIMIT: u32 = 10;

/// Pause between delete attempts while the daemon converges
const DELETE_RETRY_PAUSE: Duration = Duration::from_millis(300);

/// Manages iSCSI target/LUN export lifecycle on the local node
pub struct ExportManager {
    runner: CommandRunnerRef,
}

impl ExportManager {
    pub fn new(runner: CommandRunnerRef) -> Self {
        Self { runner }
    }

    /// Verify tgt tooling is present and the daemon answers; attempts to
    /// start the daemon once if it does not.
    pub async fn check_preconditions(&self) -> Result<()> {
        let help = self
            .runner
            .run(&argv(&["tgtadm", "--help"]))
            .await
            .unwrap_or_default();
        if help.is_empty() {
            return Err(Error::ExportPrecondition(
                "tgtadm not found: is tgt installed?".into(),
            ));
        }

        if self
            .runner
            .run_and_get_code(&tgtadm(&["--op", "show", "--mode", "target"]))
            .await?
            != 0
        {
            warn!("unable to connect to tgt daemon, attempting to start tgtd");
            if self.runner.run_and_get_code(&argv(&["tgtd"])).await? != 0 {
                return Err(Error::ExportPrecondition(
                    "unable to start tgt daemon".into(),
                ));
            }
        }
        Ok(())
    }

    /// Export a volume's device: create the target, bind the logical unit,
    /// bind the CHAP account, and open the target to all initiators.
    ///
    /// Any failure aborts the sequence. The export may then be partially
    /// applied; callers retry teardown before re-exporting.
    pub async fn export_volume(
        &self,
        tid: u32,
        name: &str,
        lun: u32,
        path: &str,
        user: &str,
    ) -> Result<()> {
        let tid_str = tid.to_string();
        let lun_str = lun.to_string();

        self.runner
            .run(&tgtadm(&[
                "--op", "new", "--mode", "target", "--tid", &tid_str, "-T", name,
            ]))
            .await?;

        self.runner
            .run(&tgtadm(&[
                "--op", "new", "--mode", "logicalunit", "--tid", &tid_str, "--lun", &lun_str,
                "-b", path,
            ]))
            .await?;

        self.runner
            .run(&tgtadm(&[
                "--op", "bind", "--mode", "account", "--tid", &tid_str, "--user", user,
            ]))
            .await?;

        self.runner
            .run(&tgtadm(&[
                "--op", "bind", "--mode", "target", "--tid", &tid_str, "-I", "ALL",
            ]))
            .await?;

        info!(tid, name, path, "volume exported");
        Ok(())
    }

    /// Tear down an exported target: unbind, delete the LUN, then delete the
    /// target with a bounded retry loop. Best-effort: never fails the
    /// caller; a target that survives every attempt is logged and orphaned.
    pub async fn unexport_target(&self, tid: u32, lun: u32) {
        if let Err(err) = self.try_unexport(tid, lun).await {
            error!(tid, "unexport failed: {}", err);
        }
    }

    async fn try_unexport(&self, tid: u32, lun: u32) -> Result<()> {
        let tid_str = tid.to_string();

        if self
            .runner
            .run_and_get_code(&tgtadm(&[
                "--op", "unbind", "--mode", "target", "--tid", &tid_str, "-I", "ALL",
            ]))
            .await?
            != 0
        {
            error!(tid, "unable to unbind target");
            return Ok(());
        }

        if self
            .runner
            .run_and_get_code(&tgtadm(&[
                "--op", "delete", "--mode", "logicalunit", "--tid", &tid_str, "--lun",
                &lun.to_string(),
            ]))
            .await?
            != 0
        {
            error!(tid, lun, "unable to delete logical unit");
            return Ok(());
        }

        for attempt in 1..=DELETE_RETRY_LIMIT {
            if self
                .runner
                .run_and_get_code(&tgtadm(&["--op", "delete", "--mode", "target", "--tid", &tid_str]))
                .await?
                != 0
            {
                warn!(tid, attempt, "unable to delete target");
                sleep(DELETE_RETRY_PAUSE).await;
                continue;
            }

            // the daemon can ack the delete before its state converges
            if self.target_exists(tid).await? {
                warn!(tid, attempt, "target still present after delete");
                sleep(DELETE_RETRY_PAUSE).await;
                continue;
            }

            debug!(tid, "target deleted");
            return Ok(());
        }

        error!(
            tid,
            "gave up deleting target after {} attempts, leaving it orphaned", DELETE_RETRY_LIMIT
        );
        Ok(())
    }

    async fn target_exists(&self, tid: u32) -> Result<bool> {
        Ok(self
            .runner
            .run_and_get_code(&tgtadm(&[
                "--op",
                "show",
                "--mode",
                "target",
                "--tid",
                &tid.to_string(),
            ]))
            .await?
            == 0)
    }

    /// Create a CHAP account on the daemon
    pub async fn add_account(&self, user: &str, password: &str) -> Result<()> {
        self.runner
            .run(&tgtadm(&[
                "--op", "new", "--mode", "account", "--user", user, "--password", password,
            ]))
            .await?;
        Ok(())
    }

    /// Remove a CHAP account from the daemon
    pub async fn delete_account(&self, user: &str) -> Result<()> {
        self.runner
            .run(&tgtadm(&["--op", "delete", "--mode", "account", "--user", user]))
            .await?;
        Ok(())
    }

    /// Whether the daemon knows a CHAP account by this name
    pub async fn account_exists(&self, user: &str) -> Result<bool> {
        let listing = self
            .runner
            .run(&tgtadm(&["--op", "show", "--mode", "account"]))
            .await?;
        Ok(listing.lines().any(|line| line.trim() == user))
    }

    /// Create the CHAP account if the daemon does not have it yet
    pub async fn ensure_account(&self, user: &str, password: &str) -> Result<()> {
        if !self.account_exists(user).await? {
            self.add_account(user, password).await?;
            info!(user, "created CHAP account");
        }
        Ok(())
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn tgtadm(args: &[&str]) -> Vec<String> {
    let mut command = argv(&["tgtadm", "--lld", "iscsi"]);
    command.extend(args.iter().map(|s| s.to_string()));
    command
}
