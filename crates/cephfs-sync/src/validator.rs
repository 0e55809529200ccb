//! Sync point validation.
//!
//! Checks run in a fixed order for each sync point:
//!
//! 1. source location is local (no `:`)
//! 2. source directory exists
//! 3. source is on CephFS
//! 4. source has the `.snap` snapshot directory
//! 5. target location parsed (done when the plan is built)
//! 6. target host answers ping
//! 7. target directory accepts a passwordless copy
//!
//! A failing check bumps the error tally once and, under
//! [`FailurePolicy::AbortImmediately`](crate::context::FailurePolicy), ends
//! the run. Checks whose prerequisite failed are skipped without counting.

use std::path::Path;

use crate::context::RunContext;
use crate::error::Result;
use crate::probe::{ProbeConfig, Probes};
use crate::report::{StatusFlag, INDENT};
use crate::supervisor::CommandRunner;
use crate::sync_point::SyncPointSpec;

/// Result of validating one sync point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Every check passed; the sync point may be replicated.
    Passed,
    /// At least one check failed (only returned when accumulating).
    Failed {
        /// Number of failing checks for this sync point.
        failures: u32,
    },
}

impl ValidationOutcome {
    /// True for [`ValidationOutcome::Passed`].
    pub fn passed(&self) -> bool {
        matches!(self, ValidationOutcome::Passed)
    }
}

/// Runs the validation checks for sync points.
pub struct SyncPointValidator<'a, R: CommandRunner + ?Sized> {
    probes: Probes<'a, R>,
}

struct Checks<'c> {
    ctx: &'c mut RunContext,
    source: String,
    failures: u32,
}

impl Checks<'_> {
    fn pass(&mut self, indent: usize, message: &str) {
        self.ctx.reporter().status(StatusFlag::Ok, indent, message);
    }

    fn fail(&mut self, indent: usize, message: &str) -> Result<()> {
        self.failures += 1;
        self.ctx.record_failure(&self.source, indent, message)
    }

    fn skip(&mut self, indent: usize, message: &str) {
        self.ctx.reporter().status(StatusFlag::Skipped, indent, message);
    }
}

impl<'a, R: CommandRunner + ?Sized> SyncPointValidator<'a, R> {
    /// Validator running probes through `runner`.
    pub fn new(runner: &'a R, config: &'a ProbeConfig) -> Self {
        Self {
            probes: Probes::new(runner, config),
        }
    }

    /// Validate `point`, reporting every check through `ctx`.
    ///
    /// Returns `Err` only when the failure policy aborts the run.
    pub async fn validate(
        &self,
        point: &SyncPointSpec,
        ctx: &mut RunContext,
    ) -> Result<ValidationOutcome> {
        let source = point.source_path.as_str();
        let mut checks = Checks {
            ctx,
            source: source.to_string(),
            failures: 0,
        };

        checks
            .ctx
            .reporter()
            .heading(&format!("Checking source directory: {} ...", source));
        self.check_source(source, &mut checks).await?;

        checks.ctx.reporter().heading(&format!(
            "Checking target host/directory: {} ...",
            point.target
        ));
        self.check_target(point, &mut checks).await?;

        Ok(match checks.failures {
            0 => ValidationOutcome::Passed,
            failures => ValidationOutcome::Failed { failures },
        })
    }

    async fn check_source(&self, source: &str, checks: &mut Checks<'_>) -> Result<()> {
        if source.contains(':') {
            checks.fail(
                INDENT,
                &format!("Source directory: {} *must be local* !", source),
            )?;
            checks.skip(INDENT, &format!("Skipping local checks for {}", source));
            return Ok(());
        }

        if !Path::new(source).is_dir() {
            checks.fail(
                INDENT,
                &format!("Source directory: {} does not exist!", source),
            )?;
            checks.skip(
                INDENT,
                &format!("Skipping CephFS and snapshot checks for {}", source),
            );
            return Ok(());
        }
        checks.pass(INDENT, &format!("Source directory: {} does exist!", source));

        if !self.probes.is_cephfs(source, None).await {
            checks.fail(
                INDENT,
                &format!("Source point: {} is not a *CephFS*!", source),
            )?;
            checks.skip(INDENT, &format!("Skipping snapshot check for {}", source));
            return Ok(());
        }
        checks.pass(INDENT, &format!("Source point: {} is *CephFS*!", source));

        if !self.probes.is_snapshot_enabled(source, None).await {
            checks.fail(
                INDENT,
                &format!(
                    "Source point: {} does not have *Snapshot* feature enabled!",
                    source
                ),
            )?;
            return Ok(());
        }
        checks.pass(
            INDENT,
            &format!("Source point: {} has *Snapshot* feature enabled!", source),
        );
        Ok(())
    }

    async fn check_target(&self, point: &SyncPointSpec, checks: &mut Checks<'_>) -> Result<()> {
        let host = point.target_host();
        let path = point.target_path();

        checks.ctx.reporter().status(
            StatusFlag::Waiting,
            INDENT,
            &format!("Trying to ping target host: {} ...", host),
        );
        if !self.probes.ping_host(host).await {
            checks.fail(
                INDENT * 2,
                &format!("Host {} has not replied to ping! ", host),
            )?;
            checks.skip(
                INDENT,
                &format!("Skipping access check for {}:{}", host, path),
            );
            return Ok(());
        }
        checks.pass(INDENT * 2, &format!("Host {} has replied to ping! ", host));

        checks.ctx.reporter().status(
            StatusFlag::Waiting,
            INDENT,
            &format!(
                "Trying to access target host/directory [{}] ...",
                self.probes.config().login(&format!("{}:{}", host, path))
            ),
        );
        if !self.probes.has_passwordless_access(host, path).await {
            checks.fail(
                INDENT * 2,
                &format!("Could not SSH access to host [{}] !", host),
            )?;
            return Ok(());
        }
        checks.pass(
            INDENT * 2,
            &format!("SSH access to host [{}] worked! ", host),
        );
        Ok(())
    }
}
