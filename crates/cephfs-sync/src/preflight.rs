//! Startup checks: root privileges and required local tools.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::context::RunContext;
use crate::report::{StatusFlag, INDENT};

/// Local tools the replication protocol depends on.
pub const REQUIRED_TOOLS: &[&str] = &["/usr/bin/rsync", "/usr/bin/ping"];

/// Errors from the preflight checks.
#[derive(Debug, Error)]
pub enum PreflightError {
    /// The process is not running as root.
    #[error("must be run as root (effective uid {euid})")]
    NotRoot {
        /// Effective uid of the process.
        euid: u32,
    },

    /// A required tool is not installed.
    #[error("required tool {} is missing", .tool.display())]
    MissingTool {
        /// Path that was checked.
        tool: PathBuf,
    },
}

/// Effective user id of this process.
pub fn current_euid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

/// Succeeds only for uid 0.
pub fn check_root_privileges(euid: u32) -> Result<(), PreflightError> {
    if euid == 0 {
        Ok(())
    } else {
        Err(PreflightError::NotRoot { euid })
    }
}

/// First tool in `tools` that does not exist.
pub fn check_required_tools<P: AsRef<Path>>(tools: &[P]) -> Result<(), PreflightError> {
    match tools.iter().map(AsRef::as_ref).find(|tool| !tool.exists()) {
        Some(tool) => Err(PreflightError::MissingTool {
            tool: tool.to_path_buf(),
        }),
        None => Ok(()),
    }
}

/// Run both checks, reporting each one.
///
/// Preflight failures always end the run regardless of the failure policy.
pub fn run_preflight<P: AsRef<Path>>(
    ctx: &mut RunContext,
    euid: u32,
    tools: &[P],
) -> Result<(), PreflightError> {
    ctx.reporter().heading("CephFS_Sync Remote Sync Tool CLI.");

    ctx.reporter()
        .status(StatusFlag::Waiting, INDENT, "Checking for root privileges ...");
    if let Err(e) = check_root_privileges(euid) {
        ctx.count_error();
        ctx.reporter().status(
            StatusFlag::Fail,
            INDENT * 2,
            "CephFS_Sync needs to be run as *root*!",
        );
        return Err(e);
    }
    ctx.reporter()
        .status(StatusFlag::Ok, INDENT * 2, "Running with root privileges.");

    ctx.reporter()
        .status(StatusFlag::Waiting, INDENT, "Checking for needed tools ...");
    if let Err(e) = check_required_tools(tools) {
        ctx.count_error();
        ctx.reporter()
            .status(StatusFlag::Fail, INDENT * 2, &e.to_string());
        return Err(e);
    }
    ctx.reporter()
        .status(StatusFlag::Ok, INDENT * 2, "All needed tools are available.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunOptions;
    use crate::report::Reporter;

    fn ctx() -> RunContext {
        RunContext::with_reporter(RunOptions::default(), Reporter::capturing())
    }

    #[test]
    fn test_root_check() {
        assert!(check_root_privileges(0).is_ok());
        assert!(matches!(
            check_root_privileges(1000),
            Err(PreflightError::NotRoot { euid: 1000 })
        ));
    }

    #[test]
    fn test_missing_tool_named() {
        let present = tempfile::NamedTempFile::new().unwrap();
        let tools = [
            present.path().to_path_buf(),
            PathBuf::from("/nonexistent/bin/rsync"),
        ];
        match check_required_tools(&tools) {
            Err(PreflightError::MissingTool { tool }) => {
                assert_eq!(tool, PathBuf::from("/nonexistent/bin/rsync"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_preflight_passes() {
        let tool = tempfile::NamedTempFile::new().unwrap();
        let mut ctx = ctx();
        run_preflight(&mut ctx, 0, &[tool.path()]).unwrap();
        assert_eq!(ctx.error_tally(), 0);
        assert_eq!(ctx.report_lines()[0], "CephFS_Sync Remote Sync Tool CLI.");
    }

    #[test]
    fn test_non_root_stops_before_tool_check() {
        let mut ctx = ctx();
        let err = run_preflight(&mut ctx, 1000, &["/nonexistent/tool"]).unwrap_err();
        assert!(matches!(err, PreflightError::NotRoot { .. }));
        assert_eq!(ctx.error_tally(), 1);
        assert!(!ctx
            .report_lines()
            .iter()
            .any(|l| l.contains("Checking for needed tools")));
    }

    #[test]
    fn test_missing_tool_fails_preflight() {
        let mut ctx = ctx();
        let err = run_preflight(&mut ctx, 0, &["/nonexistent/tool"]).unwrap_err();
        assert!(matches!(err, PreflightError::MissingTool { .. }));
        assert_eq!(ctx.error_tally(), 1);
    }
}
