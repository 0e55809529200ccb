//! Command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::CONFIG_FILE_ENV;
use crate::context::{RunOptions, SummaryPolicy};
use crate::probe::ProbeConfig;
use crate::replication::ReplicationConfig;

/// Parsed command line.
#[derive(Parser, Debug)]
#[command(name = "cephfs-sync")]
#[command(about = "Snapshot CephFS directories and mirror them to remote hosts", long_about = None)]
pub struct Cli {
    /// YAML file listing the sync points.
    #[arg(short, long, env = CONFIG_FILE_ENV)]
    pub conf_file: PathBuf,

    /// Log verbosity.
    #[arg(short, long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log file, opened in append mode.
    #[arg(long, default_value = "/var/log/cephfs-sync.log")]
    pub log_file: PathBuf,

    /// Run every check but never snapshot or copy anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the full report and continue past failed checks.
    #[arg(long)]
    pub verbose: bool,

    /// Log file handed to rsync.
    #[arg(long, default_value = "/var/log/cephfs-sync-rsync.log")]
    pub transfer_log_file: PathBuf,

    /// Timeout in seconds for probe and snapshot commands.
    #[arg(long, default_value = "30")]
    pub command_timeout: u64,

    /// Timeout in seconds for the mirror copy.
    #[arg(long, default_value = "86400")]
    pub transfer_timeout: u64,

    /// User for ssh and scp logins on target hosts.
    #[arg(long, default_value = "root")]
    pub remote_user: String,

    /// Exit status when accumulated checks failed.
    #[arg(long, value_enum, default_value_t = SummaryPolicy::Lenient)]
    pub summary_policy: SummaryPolicy,
}

/// Log verbosity. `Silent` disables logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Progress, status lines, and errors.
    Info,
    /// Errors only.
    Error,
    /// Everything, including each launched command.
    Debug,
    /// No log file at all.
    Silent,
}

impl LogLevel {
    /// `EnvFilter` directive, `None` when silent.
    pub fn directive(self) -> Option<&'static str> {
        match self {
            LogLevel::Info => Some("info"),
            LogLevel::Error => Some("error"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Silent => None,
        }
    }
}

impl Cli {
    /// Run-mode flags for the [`RunContext`](crate::context::RunContext).
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            verbose: self.verbose,
            summary_policy: self.summary_policy,
        }
    }

    /// Probe settings with the CLI overrides applied.
    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            remote_user: self.remote_user.clone(),
            command_timeout: Duration::from_secs(self.command_timeout),
            ..ProbeConfig::default()
        }
    }

    /// Protocol settings with the CLI overrides applied.
    pub fn replication_config(&self) -> ReplicationConfig {
        ReplicationConfig {
            transfer_log: self.transfer_log_file.clone(),
            transfer_timeout: Duration::from_secs(self.transfer_timeout),
            ..ReplicationConfig::default()
        }
    }
}
