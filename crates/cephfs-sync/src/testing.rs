//! Test doubles shared by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SupervisorError;
use crate::supervisor::{CommandOutcome, CommandRunner, CommandSpec};

/// `stat -f` output for a CephFS mount.
pub const CEPH_STAT: &str =
    "  File: \"/mnt/cephfs\"\n    ID: 9892f072c60473e3 Namelen: 255     Type: ceph\n";

/// `stat -f` output for a non-CephFS mount.
pub const BTRFS_STAT: &str =
    "  File: \"/home\"\n    ID: b333aa8538b776cf Namelen: 255     Type: btrfs\n";

/// Runner that answers from a script instead of launching processes.
///
/// The first rule whose key is a substring of the command line wins; other
/// commands get the fallback outcome. Every command line is recorded.
pub struct ScriptedRunner {
    rules: Vec<(String, CommandOutcome)>,
    fallback: CommandOutcome,
    seen: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new(fallback: CommandOutcome) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Fallback exit 0 with empty output.
    pub fn succeeding() -> Self {
        Self::new(CommandOutcome::new(0, "", ""))
    }

    /// Fallback exit 1 with empty output.
    pub fn failing() -> Self {
        Self::new(CommandOutcome::new(1, "", "unscripted"))
    }

    pub fn on(mut self, key: &str, outcome: CommandOutcome) -> Self {
        self.rules.push((key.to_string(), outcome));
        self
    }

    /// Recorded command lines.
    pub fn seen(&self) -> Vec<String> {
        self.specs().iter().map(|s| s.to_string()).collect()
    }

    /// Recorded commands.
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome, SupervisorError> {
        self.seen.lock().unwrap().push(spec.clone());
        let line = spec.to_string();
        Ok(self
            .rules
            .iter()
            .find(|(key, _)| line.contains(key.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or_else(|| self.fallback.clone()))
    }
}
