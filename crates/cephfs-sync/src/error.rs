//! Error types for cephfs-sync.
//!
//! Two taxonomies meet here. Soft validation errors are tallied by the
//! [`RunContext`](crate::context::RunContext) and only become a [`SyncError`]
//! when the failure policy says the run must stop. Hard faults are always
//! returned as a [`SyncError`] and always terminate the run.

use std::path::PathBuf;
use thiserror::Error;

use crate::preflight::PreflightError;

/// Process exit statuses reported by the `cephfs-sync` binary.
pub mod exit_status {
    /// Every sync point was validated (and replicated unless simulating).
    pub const SUCCESS: u8 = 0;
    /// A soft validation error stopped the run, or the summary reported errors.
    pub const VALIDATION_FAILED: u8 = 1;
    /// A hard fault aborted the run.
    pub const HARD_FAULT: u8 = 2;
    /// Root privileges or a required tool were missing.
    pub const PREFLIGHT_FAILED: u8 = 3;
    /// Logging or configuration could not be set up.
    pub const STARTUP_FAILED: u8 = 4;
}

/// Errors raised while launching or supervising an external command.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The command had no program to run.
    #[error("refusing to launch an empty command")]
    EmptyCommand,

    /// The process could not be started.
    #[error("failed to launch '{command}': {source}")]
    Spawn {
        /// The command line that failed to start.
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Waiting on or signalling the process failed.
    #[error("I/O error while supervising '{command}': {source}")]
    Io {
        /// The command line being supervised.
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
}

/// Errors raised while reading the sync point configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for the expected schema.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A target location is not of the form `<host>:/<absolute-path>`.
    #[error("malformed target location '{location}': expected <host>:/<absolute-path>")]
    MalformedTarget {
        /// The offending target location string.
        location: String,
    },
}

/// Run-level errors. Every variant terminates the run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration could not be loaded or contains a malformed target.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Preflight checks failed.
    #[error(transparent)]
    Preflight(#[from] PreflightError),

    /// A soft validation error under the abort-immediately policy.
    #[error("validation failed for {source_dir}: {reason}")]
    ValidationAborted {
        /// Source location of the sync point being validated.
        source_dir: String,
        /// Status line describing the failing check.
        reason: String,
    },

    /// The run finished with a non-zero error tally and the summary policy
    /// treats that as a failure.
    #[error("{errors} error(s) found while validating sync points")]
    ValidationErrors {
        /// Final value of the error tally.
        errors: u64,
    },

    /// Creating a snapshot directory failed.
    #[error("failed to create snapshot directory {path} (exit code {exit_code}): {stderr}")]
    SnapshotFailed {
        /// Snapshot directory that could not be created.
        path: String,
        /// Exit code of the directory-creation command.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The mirror copy failed.
    #[error("failed to mirror {source_dir} to {target} (exit code {exit_code}): {stderr}")]
    MirrorFailed {
        /// Source snapshot directory.
        source_dir: String,
        /// Remote target directory.
        target: String,
        /// Exit code of the remote-copy command.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// A protocol command could not be launched or supervised.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl SyncError {
    /// Returns true for errors that abort the run in every run mode and are
    /// never added to the error tally.
    pub fn is_hard_fault(&self) -> bool {
        matches!(
            self,
            SyncError::Config(ConfigError::MalformedTarget { .. })
                | SyncError::SnapshotFailed { .. }
                | SyncError::MirrorFailed { .. }
                | SyncError::Supervisor(_)
        )
    }

    /// The process exit status this error maps to.
    pub fn exit_code(&self) -> u8 {
        if self.is_hard_fault() {
            return exit_status::HARD_FAULT;
        }
        match self {
            SyncError::Config(_) => exit_status::STARTUP_FAILED,
            SyncError::Preflight(_) => exit_status::PREFLIGHT_FAILED,
            _ => exit_status::VALIDATION_FAILED,
        }
    }
}

/// Result alias for run-level operations.
pub type Result<T> = std::result::Result<T, SyncError>;
