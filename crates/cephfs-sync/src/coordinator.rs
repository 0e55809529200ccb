//! Run coordinator: validates every sync point, replicates the ones that
//! pass, and turns the error tally into the final summary.

use crate::context::{FailurePolicy, RunContext, SummaryPolicy};
use crate::error::{Result, SyncError};
use crate::probe::ProbeConfig;
use crate::replication::{ReplicationConfig, ReplicationProtocol, ReplicationReport, SnapshotTag};
use crate::report::{StatusFlag, INDENT};
use crate::supervisor::CommandRunner;
use crate::sync_point::SyncPlan;
use crate::validator::SyncPointValidator;

/// What a completed run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Sync points validated.
    pub evaluated: usize,
    /// Sync points that passed every check.
    pub passed: usize,
    /// One entry per replicated sync point, in plan order.
    pub replicated: Vec<ReplicationReport>,
    /// Error tally at the end of the run.
    pub error_tally: u64,
}

/// Drives validation and replication over a [`SyncPlan`].
pub struct RunCoordinator<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    probe_config: &'a ProbeConfig,
    replication_config: &'a ReplicationConfig,
}

impl<'a, R: CommandRunner + ?Sized> RunCoordinator<'a, R> {
    /// Bind the coordinator to a runner and its settings.
    pub fn new(
        runner: &'a R,
        probe_config: &'a ProbeConfig,
        replication_config: &'a ReplicationConfig,
    ) -> Self {
        Self {
            runner,
            probe_config,
            replication_config,
        }
    }

    /// Process every sync point in plan order, one at a time.
    ///
    /// Errors are either a fail-fast validation abort, a hard fault from the
    /// replication protocol, or a non-zero tally rejected by the summary
    /// policy. The summary block is reported before returning in the last
    /// two cases; callers report it themselves for the others.
    pub async fn run(&self, plan: &SyncPlan, ctx: &mut RunContext) -> Result<RunSummary> {
        let validator = SyncPointValidator::new(self.runner, self.probe_config);
        let protocol =
            ReplicationProtocol::new(self.runner, self.probe_config, self.replication_config);
        let mut summary = RunSummary::default();

        for point in plan {
            summary.evaluated += 1;
            let outcome = validator.validate(point, ctx).await?;
            if !outcome.passed() {
                tracing::debug!("Not replicating {}: validation failed", point.source_path);
                continue;
            }
            summary.passed += 1;
            if ctx.is_dry_run() {
                tracing::debug!("Dry run: not replicating {}", point.source_path);
                continue;
            }
            let report = protocol.replicate(point, &SnapshotTag::now(), ctx).await?;
            summary.replicated.push(report);
        }

        summary.error_tally = ctx.error_tally();
        summarize(ctx)?;
        Ok(summary)
    }
}

/// Report the summary block and apply the summary policy to the tally.
pub fn summarize(ctx: &mut RunContext) -> Result<()> {
    let errors = ctx.error_tally();
    ctx.reporter().heading("Summary:");
    if errors > 0 {
        ctx.reporter().status(
            StatusFlag::Fail,
            INDENT,
            &format!(
                " There were {}+ errors found! Please check the configuration and targets.",
                errors
            ),
        );
    } else {
        ctx.reporter().status(
            StatusFlag::Ok,
            INDENT,
            " No errors found! CephFS_Sync seems to be able to work.",
        );
    }

    match (errors, ctx.failure_policy(), ctx.summary_policy()) {
        (0, _, _) => Ok(()),
        (_, FailurePolicy::AccumulateAndContinue, SummaryPolicy::Lenient) => Ok(()),
        (errors, _, _) => Err(SyncError::ValidationErrors { errors }),
    }
}

/// Report a run-ending error followed by the summary block, and return the
/// exit status it maps to.
///
/// Hard faults get their own `[FAIL]` line since nothing else reported
/// them. The exit status is decided by `err` alone.
pub fn report_failure(ctx: &mut RunContext, err: &SyncError) -> u8 {
    tracing::error!("{}", err);
    if err.is_hard_fault() {
        ctx.reporter().status(StatusFlag::Fail, INDENT, &err.to_string());
    }
    if let Err(summary_err) = summarize(ctx) {
        tracing::debug!("Summary after failure: {}", summary_err);
    }
    err.exit_code()
}
