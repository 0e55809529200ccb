#![warn(missing_docs)]

//! cephfs-sync: snapshot CephFS directory trees and mirror them to remote
//! backup hosts.
//!
//! Each configured sync point is validated (local CephFS source with
//! snapshots, reachable target with passwordless access), then replicated in
//! three phases: source snapshot, rsync mirror of the snapshot, and an
//! optional snapshot on the target.

pub mod cli;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod preflight;
pub mod probe;
pub mod replication;
pub mod report;
pub mod supervisor;
pub mod sync_point;
pub mod validator;

#[cfg(test)]
mod testing;

pub use config::{load_plan, SyncConfig, SyncEntry};
pub use context::{FailurePolicy, RunContext, RunOptions, SummaryPolicy};
pub use coordinator::{RunCoordinator, RunSummary};
pub use error::{ConfigError, Result, SupervisorError, SyncError};
pub use probe::{ProbeConfig, Probes};
pub use replication::{ReplicationConfig, ReplicationProtocol, ReplicationReport, SnapshotTag};
pub use supervisor::{CommandOutcome, CommandRunner, CommandSpec, Supervisor};
pub use sync_point::{SyncPlan, SyncPointSpec, TargetLocation};
pub use validator::{SyncPointValidator, ValidationOutcome};
