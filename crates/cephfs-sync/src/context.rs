//! Per-invocation run state: mode flags, policies, and the error tally.

use clap::ValueEnum;

use crate::error::{Result, SyncError};
use crate::report::{Reporter, StatusFlag};

/// What happens when a soft validation check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Terminate the whole run on the first failing check.
    AbortImmediately,
    /// Report and tally the failure, keep evaluating.
    AccumulateAndContinue,
}

impl FailurePolicy {
    /// Simulate-only and verbose runs accumulate; default runs abort.
    pub fn from_flags(dry_run: bool, verbose: bool) -> Self {
        if dry_run || verbose {
            FailurePolicy::AccumulateAndContinue
        } else {
            FailurePolicy::AbortImmediately
        }
    }
}

/// How the final summary maps a non-zero tally to the exit status when
/// failures were accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SummaryPolicy {
    /// Report the errors but exit successfully.
    #[default]
    Lenient,
    /// Exit with the validation-failure status.
    Strict,
}

/// Run-mode flags chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    /// Perform all checks but never replicate.
    pub dry_run: bool,
    /// Print the full report and keep going after failures.
    pub verbose: bool,
    /// Exit status policy for the summary.
    pub summary_policy: SummaryPolicy,
}

/// State shared by the validator, the protocol, and the coordinator.
#[derive(Debug)]
pub struct RunContext {
    options: RunOptions,
    failure_policy: FailurePolicy,
    error_tally: u64,
    reporter: Reporter,
}

impl RunContext {
    /// Create a context whose reporter matches the run mode.
    pub fn new(options: RunOptions) -> Self {
        let reporter = Reporter::for_mode(options.dry_run, options.verbose);
        Self::with_reporter(options, reporter)
    }

    /// Create a context with an explicit reporter.
    pub fn with_reporter(options: RunOptions, reporter: Reporter) -> Self {
        Self {
            failure_policy: FailurePolicy::from_flags(options.dry_run, options.verbose),
            options,
            error_tally: 0,
            reporter,
        }
    }

    /// Simulate-only run.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Verbose run.
    pub fn is_verbose(&self) -> bool {
        self.options.verbose
    }

    /// Policy derived from the run-mode flags.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Exit status policy for the summary.
    pub fn summary_policy(&self) -> SummaryPolicy {
        self.options.summary_policy
    }

    /// Failures recorded so far.
    pub fn error_tally(&self) -> u64 {
        self.error_tally
    }

    /// Status line sink.
    pub fn reporter(&mut self) -> &mut Reporter {
        &mut self.reporter
    }

    /// Lines recorded by a capturing reporter.
    pub fn report_lines(&self) -> &[String] {
        self.reporter.lines()
    }

    /// Record a soft validation failure for `source_dir`.
    ///
    /// Always reports the line and bumps the tally. Under
    /// [`FailurePolicy::AbortImmediately`] the returned error stops the run.
    pub fn record_failure(&mut self, source_dir: &str, indent: usize, message: &str) -> Result<()> {
        self.error_tally += 1;
        self.reporter.status(StatusFlag::Fail, indent, message);
        match self.failure_policy {
            FailurePolicy::AbortImmediately => Err(SyncError::ValidationAborted {
                source_dir: source_dir.to_string(),
                reason: message.to_string(),
            }),
            FailurePolicy::AccumulateAndContinue => Ok(()),
        }
    }

    /// Bump the tally for a failure outside any sync point (preflight).
    pub fn count_error(&mut self) {
        self.error_tally += 1;
    }
}
