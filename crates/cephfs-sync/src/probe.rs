//! Endpoint probes.
//!
//! Each probe answers a yes/no question about a local path or a remote
//! host by running a command through a [`CommandRunner`]. Probes never fail:
//! launch errors, non-zero exits and force-killed commands all count as "no".

use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::supervisor::{CommandOutcome, CommandRunner, CommandSpec, DEFAULT_TIMEOUT_SECS};

/// Substring of `stat -f` output identifying a CephFS mount.
pub const CEPHFS_TYPE_MARKER: &str = "Type: ceph";

/// Reserved CephFS snapshot directory name.
pub const SNAPSHOT_DIR_NAME: &str = ".snap";

/// `stat -f` error text meaning the snapshot directory is not available.
pub const STATFS_UNREADABLE_MARKER: &str = "cannot read file system information";

/// Contents of the marker file copied by the access probe.
pub const ACCESS_MARKER_CONTENT: &[u8] = b"Testing CephFS_Sync";

/// Prefix of the marker file left in probed target directories.
pub const ACCESS_MARKER_PREFIX: &str = "cephfs_sync_";

fn ping_reply_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+ bytes from").expect("static regex is valid"))
}

/// Tool locations and remote login settings shared by all probes.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// `stat` binary used for filesystem-type probes.
    pub stat_bin: String,
    /// `ping` binary.
    pub ping_bin: String,
    /// `ssh` binary for remote commands.
    pub ssh_bin: String,
    /// `scp` binary for the access probe.
    pub scp_bin: String,
    /// User for remote logins.
    pub remote_user: String,
    /// ICMP echo requests sent by the reachability probe.
    pub ping_count: u32,
    /// Timeout for every probe command.
    pub command_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            stat_bin: "stat".to_string(),
            ping_bin: "/usr/bin/ping".to_string(),
            ssh_bin: "ssh".to_string(),
            scp_bin: "scp".to_string(),
            remote_user: "root".to_string(),
            ping_count: 2,
            command_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ProbeConfig {
    /// `user@host` for remote logins.
    pub fn login(&self, host: &str) -> String {
        format!("{}@{}", self.remote_user, host)
    }

    /// Build an ssh invocation that runs `remote_args` on `host` without
    /// any interactive prompt.
    ///
    /// ssh joins its arguments into one line for the remote shell, so each
    /// remote argument is quoted with [`shell_quote`].
    pub fn remote_command<I, S>(&self, host: &str, remote_args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        CommandSpec::new(&self.ssh_bin)
            .args(["-o", "BatchMode=yes"])
            .arg(self.login(host))
            .args(remote_args.into_iter().map(|arg| shell_quote(arg.as_ref())))
            .timeout(self.command_timeout)
    }
}

/// Probe runner bound to a command runner and a configuration.
pub struct Probes<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    config: &'a ProbeConfig,
}

impl<'a, R: CommandRunner + ?Sized> Probes<'a, R> {
    /// Bind probes to `runner` and `config`.
    pub fn new(runner: &'a R, config: &'a ProbeConfig) -> Self {
        Self { runner, config }
    }

    /// Settings the probes run with.
    pub fn config(&self) -> &ProbeConfig {
        self.config
    }

    async fn run_quietly(&self, spec: CommandSpec) -> Option<CommandOutcome> {
        match self.runner.run(&spec).await {
            Ok(outcome) if outcome.force_killed() => {
                tracing::warn!("Probe '{}' timed out and was killed", spec);
                None
            }
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!("Probe '{}' could not run: {}", spec, e);
                None
            }
        }
    }

    fn statfs_command(&self, path: &str, host: Option<&str>) -> CommandSpec {
        match host {
            Some(host) => {
                self.config
                    .remote_command(host, [self.config.stat_bin.as_str(), "-f", path])
            }
            None => CommandSpec::new(&self.config.stat_bin)
                .args(["-f", path])
                .timeout(self.config.command_timeout),
        }
    }

    /// Is `path` (locally, or on `host`) on a CephFS filesystem?
    pub async fn is_cephfs(&self, path: &str, host: Option<&str>) -> bool {
        let Some(outcome) = self.run_quietly(self.statfs_command(path, host)).await else {
            return false;
        };
        if !outcome.success() {
            tracing::debug!(
                "stat -f {} exited with {}: {}",
                path,
                outcome.exit_code,
                outcome.stderr.trim()
            );
            return false;
        }
        outcome.stdout.contains(CEPHFS_TYPE_MARKER)
    }

    /// Does `path` (locally, or on `host`) expose the `.snap` directory?
    pub async fn is_snapshot_enabled(&self, path: &str, host: Option<&str>) -> bool {
        let snap_dir = snapshot_root(path);
        match host {
            None => Path::new(&snap_dir).is_dir(),
            Some(host) => {
                let Some(outcome) = self.run_quietly(self.statfs_command(&snap_dir, Some(host))).await
                else {
                    return false;
                };
                !outcome.combined_output().contains(STATFS_UNREADABLE_MARKER)
            }
        }
    }

    /// Both [`is_cephfs`](Self::is_cephfs) and
    /// [`is_snapshot_enabled`](Self::is_snapshot_enabled).
    pub async fn is_cephfs_snapshot_enabled(&self, path: &str, host: Option<&str>) -> bool {
        self.is_cephfs(path, host).await && self.is_snapshot_enabled(path, host).await
    }

    /// Does `host` answer at least one ICMP echo request?
    pub async fn ping_host(&self, host: &str) -> bool {
        if host.is_empty() {
            return false;
        }
        let spec = CommandSpec::new(&self.config.ping_bin)
            .args(["-c".to_string(), self.config.ping_count.to_string(), host.to_string()]);
        let Some(outcome) = self.run_quietly(spec).await else {
            return false;
        };
        outcome
            .stdout
            .lines()
            .any(|line| ping_reply_pattern().is_match(line))
    }

    /// Can a file be copied to `directory` on `host` without a password?
    ///
    /// Leaves a `cephfs_sync_<timestamp>` marker file behind on success.
    pub async fn has_passwordless_access(&self, host: &str, directory: &str) -> bool {
        if host.is_empty() || directory.is_empty() {
            return false;
        }
        let marker = match write_marker_file() {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Could not create local marker file: {}", e);
                return false;
            }
        };
        let remote_file = format!(
            "{}:{}/{}{}",
            self.config.login(host),
            directory.trim_end_matches('/'),
            ACCESS_MARKER_PREFIX,
            crate::replication::SnapshotTag::now()
        );
        let spec = CommandSpec::new(&self.config.scp_bin)
            .args(["-q", "-o", "BatchMode=yes"])
            .arg(marker.path().to_string_lossy())
            .arg(remote_file)
            .timeout(self.config.command_timeout);
        match self.run_quietly(spec).await {
            Some(outcome) if outcome.success() => true,
            Some(outcome) => {
                tracing::debug!("scp to {} failed: {}", host, outcome.stderr.trim());
                false
            }
            None => false,
        }
    }
}

/// Quote `arg` for a POSIX shell.
///
/// Words made only of characters the shell never interprets pass through
/// unchanged; anything else is wrapped in single quotes, with embedded
/// single quotes written as `'\''`.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// `<path>/.snap`
pub fn snapshot_root(path: &str) -> String {
    format!("{}/{}", path.trim_end_matches('/'), SNAPSHOT_DIR_NAME)
}

fn write_marker_file() -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(ACCESS_MARKER_CONTENT)?;
    file.flush()?;
    Ok(file)
}
