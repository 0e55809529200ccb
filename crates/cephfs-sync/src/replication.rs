//! The snapshot → mirror → snapshot replication protocol.
//!
//! 1. Snapshot the source by creating `<source>/.snap/<tag>`.
//! 2. Mirror that frozen view with rsync to `<host>:<target>/<tag>`.
//! 3. If the mirrored directory is itself on CephFS with snapshots, snapshot
//!    it as `<target>/<tag>/.snap/<tag>` so the copy is crash-consistent.
//!
//! Phases run strictly in order with no rollback. Failure of phase 1 or 2
//! (or of the phase 3 `mkdir` once attempted) is a hard fault.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::context::RunContext;
use crate::error::{Result, SyncError};
use crate::probe::{snapshot_root, ProbeConfig, Probes};
use crate::report::{StatusFlag, INDENT};
use crate::supervisor::{CommandRunner, CommandSpec};
use crate::sync_point::SyncPointSpec;

/// rsync archive flags: hard links, ACLs, one filesystem, verbose.
/// Extended attributes (`-X`) are left out because CephFS rejects some of
/// them with `Operation not supported (95)`.
pub const RSYNC_ARCHIVE_FLAGS: &str = "-aHAxv";

/// Timestamp identifying one replication run of one sync point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotTag(String);

impl SnapshotTag {
    /// Tag for the current local time.
    pub fn now() -> Self {
        Self::from_datetime(Local::now())
    }

    /// Tag for a given instant, formatted `YYYYMMDD_HHMMSS_ffffff`.
    pub fn from_datetime<Tz>(at: DateTime<Tz>) -> Self
    where
        Tz: chrono::TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self(at.format("%Y%m%d_%H%M%S_%6f").to_string())
    }

    /// Tag text, e.g. `20261019_134005_000042`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Settings for the protocol commands.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// `mkdir` binary for snapshot creation, locally and over ssh.
    pub mkdir_bin: String,
    /// `rsync` binary for the mirror step.
    pub rsync_bin: String,
    /// rsync `--log-file` destination.
    pub transfer_log: PathBuf,
    /// Timeout for the mirror step.
    pub transfer_timeout: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            mkdir_bin: "mkdir".to_string(),
            rsync_bin: "/usr/bin/rsync".to_string(),
            transfer_log: PathBuf::from("/var/log/cephfs-sync-rsync.log"),
            transfer_timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// What a completed replication produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Tag shared by every artifact of this replication.
    pub tag: SnapshotTag,
    /// `<source>/.snap/<tag>`
    pub source_snapshot: String,
    /// `<host>:<target>/<tag>`
    pub mirror_target: String,
    /// `<target>/<tag>/.snap/<tag>` on the target host, if taken.
    pub target_snapshot: Option<String>,
}

/// `<dir>/.snap/<tag>`
pub fn snapshot_path(dir: &str, tag: &SnapshotTag) -> String {
    format!("{}/{}", snapshot_root(dir), tag)
}

/// `<target>/<tag>`
pub fn mirror_path(target_path: &str, tag: &SnapshotTag) -> String {
    format!("{}/{}", target_path.trim_end_matches('/'), tag)
}

/// Executes the three replication phases for validated sync points.
pub struct ReplicationProtocol<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    probe_config: &'a ProbeConfig,
    config: &'a ReplicationConfig,
}

impl<'a, R: CommandRunner + ?Sized> ReplicationProtocol<'a, R> {
    /// Bind the protocol to a runner and its settings.
    pub fn new(runner: &'a R, probe_config: &'a ProbeConfig, config: &'a ReplicationConfig) -> Self {
        Self {
            runner,
            probe_config,
            config,
        }
    }

    /// Run all three phases for `point` using `tag`.
    pub async fn replicate(
        &self,
        point: &SyncPointSpec,
        tag: &SnapshotTag,
        ctx: &mut RunContext,
    ) -> Result<ReplicationReport> {
        let host = point.target_host();
        let mirror_dir = mirror_path(point.target_path(), tag);
        let mirror_target = format!("{}:{}", host, mirror_dir);

        ctx.reporter().heading("Trying to sync: ");
        ctx.reporter().status(
            StatusFlag::Waiting,
            INDENT,
            &format!("{} -> {} ...", point.source_path, point.target),
        );

        let source_snapshot = self.snapshot_source(point, tag).await?;
        ctx.reporter().status(
            StatusFlag::Ok,
            INDENT * 2,
            &format!(
                "Snapshotting source directory: {} to: {} ...",
                point.source_path, source_snapshot
            ),
        );

        self.mirror(&source_snapshot, host, &mirror_dir).await?;
        ctx.reporter().status(
            StatusFlag::Ok,
            INDENT * 2,
            &format!("RSyncing source directory: {} to: {} ...", source_snapshot, mirror_target),
        );

        let target_snapshot = self.snapshot_target(host, &mirror_dir, tag, ctx).await?;

        Ok(ReplicationReport {
            tag: tag.clone(),
            source_snapshot,
            mirror_target,
            target_snapshot,
        })
    }

    async fn snapshot_source(&self, point: &SyncPointSpec, tag: &SnapshotTag) -> Result<String> {
        let path = snapshot_path(&point.source_path, tag);
        let spec = CommandSpec::new(&self.config.mkdir_bin)
            .arg(path.as_str())
            .timeout(self.probe_config.command_timeout);
        let outcome = self.runner.run(&spec).await?;
        if !outcome.success() {
            return Err(SyncError::SnapshotFailed {
                path,
                exit_code: outcome.exit_code,
                stderr: outcome.stderr.trim().to_string(),
            });
        }
        tracing::info!("Created source snapshot {}", path);
        Ok(path)
    }

    async fn mirror(&self, source_snapshot: &str, host: &str, mirror_dir: &str) -> Result<()> {
        let destination = format!("{}:{}", self.probe_config.login(host), mirror_dir);
        let spec = CommandSpec::new(&self.config.rsync_bin)
            .args([
                RSYNC_ARCHIVE_FLAGS,
                "--numeric-ids",
                "--delete",
                "--progress",
            ])
            .arg(format!("--log-file={}", self.config.transfer_log.display()))
            .arg(format!("{}/", source_snapshot))
            .arg(destination)
            .timeout(self.config.transfer_timeout);
        let outcome = self.runner.run(&spec).await?;
        if !outcome.success() {
            return Err(SyncError::MirrorFailed {
                source_dir: source_snapshot.to_string(),
                target: format!("{}:{}", host, mirror_dir),
                exit_code: outcome.exit_code,
                stderr: outcome.stderr.trim().to_string(),
            });
        }
        tracing::info!("Mirrored {} to {}:{}", source_snapshot, host, mirror_dir);
        Ok(())
    }

    async fn snapshot_target(
        &self,
        host: &str,
        mirror_dir: &str,
        tag: &SnapshotTag,
        ctx: &mut RunContext,
    ) -> Result<Option<String>> {
        let probes = Probes::new(self.runner, self.probe_config);
        if !probes.is_cephfs_snapshot_enabled(mirror_dir, Some(host)).await {
            ctx.reporter().status(
                StatusFlag::Ok,
                INDENT * 2,
                &format!("Target directory [{}] does not support *Snapshotting* ... ", mirror_dir),
            );
            return Ok(None);
        }

        let path = snapshot_path(mirror_dir, tag);
        let spec = self
            .probe_config
            .remote_command(host, [self.config.mkdir_bin.as_str(), path.as_str()]);
        let outcome = self.runner.run(&spec).await?;
        if !outcome.success() {
            return Err(SyncError::SnapshotFailed {
                path: format!("{}:{}", host, path),
                exit_code: outcome.exit_code,
                stderr: outcome.stderr.trim().to_string(),
            });
        }
        ctx.reporter().status(
            StatusFlag::Ok,
            INDENT * 2,
            &format!(
                "Snapshotting target directory: {}:{} to: {} ...",
                host, mirror_dir, path
            ),
        );
        Ok(Some(path))
    }
}
