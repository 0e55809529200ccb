#![warn(missing_docs)]

//! `cephfs-sync` binary: preflight, configuration, then the replication run.

use std::process::ExitCode;

use clap::Parser;
use cephfs_sync::cli::Cli;
use cephfs_sync::coordinator::{self, RunCoordinator};
use cephfs_sync::error::exit_status;
use cephfs_sync::preflight::{self, REQUIRED_TOOLS};
use cephfs_sync::{load_plan, RunContext, Supervisor, SyncError};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = cephfs_sync::logging::init(cli.log_level, &cli.log_file) {
        eprintln!("cephfs-sync: {:#}", e);
        return ExitCode::from(exit_status::STARTUP_FAILED);
    }
    tracing::info!("cephfs-sync starting with {}", cli.conf_file.display());

    let mut ctx = RunContext::new(cli.run_options());

    if let Err(e) = preflight::run_preflight(&mut ctx, preflight::current_euid(), REQUIRED_TOOLS) {
        return fail(&mut ctx, SyncError::from(e));
    }

    let plan = match load_plan(&cli.conf_file) {
        Ok(plan) => plan,
        Err(e) => return fail(&mut ctx, SyncError::from(e)),
    };
    tracing::info!("Loaded {} sync point(s)", plan.len());

    let supervisor = Supervisor::default();
    let probe_config = cli.probe_config();
    let replication_config = cli.replication_config();
    let coordinator = RunCoordinator::new(&supervisor, &probe_config, &replication_config);

    match coordinator.run(&plan, &mut ctx).await {
        Ok(summary) => {
            tracing::info!(
                "Finished: {} evaluated, {} passed, {} replicated, {} error(s)",
                summary.evaluated,
                summary.passed,
                summary.replicated.len(),
                summary.error_tally
            );
            ExitCode::from(exit_status::SUCCESS)
        }
        // Summary already reported.
        Err(e @ SyncError::ValidationErrors { .. }) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
        Err(e) => fail(&mut ctx, e),
    }
}

/// Report a run-ending error and the summary block, then exit with its status.
fn fail(ctx: &mut RunContext, err: SyncError) -> ExitCode {
    if !ctx.is_dry_run() && !ctx.is_verbose() {
        eprintln!("cephfs-sync: {}", err);
    }
    ExitCode::from(coordinator::report_failure(ctx, &err))
}
