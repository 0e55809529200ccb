//! Human-readable status lines.
//!
//! Every check emits one line. In simulate-only or verbose runs the lines go
//! to stdout with a status marker so the operator sees the whole report; in
//! default runs they only go to the log.

use std::fmt;

/// Indentation step used for nested status lines.
pub const INDENT: usize = 2;

/// Marker printed in front of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFlag {
    /// Check passed.
    Ok,
    /// Check failed.
    Fail,
    /// Check in progress.
    Waiting,
    /// Check not attempted because a prerequisite failed.
    Skipped,
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self {
            StatusFlag::Ok => "[ OK ]",
            StatusFlag::Fail => "[FAIL]",
            StatusFlag::Waiting => "[ .. ]",
            StatusFlag::Skipped => "[SKIP]",
        };
        f.write_str(marker)
    }
}

/// Where status lines end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSink {
    /// Print to stdout (simulate-only and verbose runs).
    Console,
    /// Log only (default runs).
    LogOnly,
    /// Keep lines in memory.
    Memory(Vec<String>),
}

/// Emits status lines for checks and protocol phases.
#[derive(Debug, Clone)]
pub struct Reporter {
    sink: ReportSink,
}

impl Reporter {
    /// Console reporter for simulate-only and verbose runs.
    pub fn console() -> Self {
        Self {
            sink: ReportSink::Console,
        }
    }

    /// Log-only reporter for default runs.
    pub fn log_only() -> Self {
        Self {
            sink: ReportSink::LogOnly,
        }
    }

    /// Reporter that records lines for later inspection.
    pub fn capturing() -> Self {
        Self {
            sink: ReportSink::Memory(Vec::new()),
        }
    }

    /// Pick the console for simulate/verbose runs, the log otherwise.
    pub fn for_mode(dry_run: bool, verbose: bool) -> Self {
        if dry_run || verbose {
            Self::console()
        } else {
            Self::log_only()
        }
    }

    /// Lines recorded by a capturing reporter. Empty for other sinks.
    pub fn lines(&self) -> &[String] {
        match &self.sink {
            ReportSink::Memory(lines) => lines,
            _ => &[],
        }
    }

    /// Section heading without a status marker.
    pub fn heading(&mut self, message: &str) {
        tracing::info!("{}", message);
        self.emit(message.to_string());
    }

    /// Status line with a marker, indented by `indent` spaces.
    pub fn status(&mut self, flag: StatusFlag, indent: usize, message: &str) {
        match flag {
            StatusFlag::Fail => tracing::error!("{}", message),
            StatusFlag::Skipped => tracing::warn!("{}", message),
            StatusFlag::Ok | StatusFlag::Waiting => tracing::info!("{}", message),
        }
        self.emit(format!("{:indent$}{} {}", "", flag, message, indent = indent));
    }

    fn emit(&mut self, line: String) {
        match &mut self.sink {
            ReportSink::Console => println!("{}", line),
            ReportSink::LogOnly => {}
            ReportSink::Memory(lines) => lines.push(line),
        }
    }
}
