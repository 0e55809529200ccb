//! Common fixtures for integration tests: a simulated set of endpoints and
//! helpers for building sync-point trees and configuration files.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use cephfs_sync::report::Reporter;
use cephfs_sync::{
    CommandOutcome, CommandRunner, CommandSpec, RunContext, RunOptions, SummaryPolicy,
    SupervisorError,
};
use tempfile::TempDir;

const CEPH_STAT: &str = "    ID: 9892f072c60473e3 Namelen: 255     Type: ceph\n";
const XFS_STAT: &str = "    ID: fd0100000000 Namelen: 255     Type: xfs\n";
const PING_REPLY: &str = "64 bytes from backup: icmp_seq=1 ttl=64 time=0.2 ms\n";

/// Simulated endpoints answering the commands the tool launches.
///
/// Local paths are CephFS unless listed in `non_ceph`; remote hosts answer
/// ping when `reachable`, accept copies when `accessible`, and report
/// CephFS with snapshots for mirrors when `ceph_targets` contains them.
#[derive(Default)]
pub struct FakeEndpoints {
    pub non_ceph: HashSet<String>,
    pub reachable: HashSet<String>,
    pub accessible: HashSet<String>,
    pub ceph_targets: HashSet<String>,
    pub failing_rsync: bool,
    pub failing_mkdir: bool,
    pub failing_remote_mkdir: bool,
    log: Mutex<Vec<CommandSpec>>,
}

impl FakeEndpoints {
    /// Every host in `hosts` reachable and accessible.
    pub fn healthy(hosts: &[&str]) -> Self {
        let set: HashSet<String> = hosts.iter().map(|h| h.to_string()).collect();
        Self {
            reachable: set.clone(),
            accessible: set,
            ..Self::default()
        }
    }

    /// Command lines in launch order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|s| s.to_string()).collect()
    }

    /// Commands whose program ends with `name`.
    pub fn commands_of(&self, name: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.program.ends_with(name))
            .map(|s| s.to_string())
            .collect()
    }

    fn local_stat(&self, path: &str) -> CommandOutcome {
        if self.non_ceph.iter().any(|p| path.starts_with(p.as_str())) {
            CommandOutcome::new(0, XFS_STAT, "")
        } else {
            CommandOutcome::new(0, CEPH_STAT, "")
        }
    }

    fn remote(&self, login: &str, args: &[String]) -> CommandOutcome {
        let host = login.rsplit('@').next().unwrap_or(login);
        let path = args.last().map(String::as_str).unwrap_or("");
        let qualifies = self.ceph_targets.iter().any(|t| match t.split_once(':') {
            Some((h, dir)) => h == host && path.starts_with(dir),
            None => false,
        });
        match args.first().map(String::as_str) {
            Some("stat") if qualifies => CommandOutcome::new(0, CEPH_STAT, ""),
            Some("stat") => CommandOutcome::new(
                1,
                "",
                "stat: cannot read file system information for path",
            ),
            Some("mkdir") if self.failing_remote_mkdir => {
                CommandOutcome::new(1, "", "mkdir: permission denied")
            }
            Some("mkdir") => CommandOutcome::new(0, "", ""),
            _ => CommandOutcome::new(127, "", "unknown remote command"),
        }
    }

    fn answer(&self, spec: &CommandSpec) -> CommandOutcome {
        let program = spec.program.rsplit('/').next().unwrap_or(&spec.program);
        match program {
            "stat" => self.local_stat(spec.args.last().map(String::as_str).unwrap_or("")),
            "ping" => {
                let host = spec.args.last().map(String::as_str).unwrap_or("");
                if self.reachable.contains(host) {
                    CommandOutcome::new(0, PING_REPLY.repeat(2), "")
                } else {
                    CommandOutcome::new(1, "", "")
                }
            }
            "scp" => {
                let dest = spec.args.last().map(String::as_str).unwrap_or("");
                let host = dest
                    .split(':')
                    .next()
                    .and_then(|login| login.rsplit('@').next())
                    .unwrap_or("");
                if self.accessible.contains(host) {
                    CommandOutcome::new(0, "", "")
                } else {
                    CommandOutcome::new(1, "", "Permission denied (publickey)")
                }
            }
            "ssh" => {
                // ssh -o BatchMode=yes user@host <remote args...>
                let login = spec.args.get(2).cloned().unwrap_or_default();
                self.remote(&login, &spec.args[3.min(spec.args.len())..])
            }
            "mkdir" if self.failing_mkdir => CommandOutcome::new(1, "", "mkdir: cannot create"),
            "mkdir" => CommandOutcome::new(0, "", ""),
            "rsync" if self.failing_rsync => CommandOutcome::new(12, "", "protocol stream error"),
            "rsync" => CommandOutcome::new(0, "sent 1024 bytes", ""),
            _ => CommandOutcome::new(127, "", "command not found"),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeEndpoints {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome, SupervisorError> {
        self.log.lock().unwrap().push(spec.clone());
        Ok(self.answer(spec))
    }
}

/// A local source tree, optionally with the `.snap` directory.
pub struct SourceTree {
    dir: TempDir,
}

impl SourceTree {
    pub fn new(with_snap: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), b"payload").unwrap();
        if with_snap {
            std::fs::create_dir(dir.path().join(".snap")).unwrap();
        }
        Self { dir }
    }

    pub fn path(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }
}

/// Write a configuration file listing `(source, target)` pairs.
pub fn write_config(dir: &Path, pairs: &[(&str, &str)]) -> PathBuf {
    let mut yaml = String::from("cephfs_synchronization:\n");
    for (i, (source, target)) in pairs.iter().enumerate() {
        yaml.push_str(&format!(
            "  - sync_description: pair {}\n    source_location: \"{}\"\n    target_location: \"{}\"\n",
            i, source, target
        ));
    }
    let path = dir.join("cephfs-sync.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

/// Run context with a capturing reporter.
pub fn context(dry_run: bool, verbose: bool, summary_policy: SummaryPolicy) -> RunContext {
    RunContext::with_reporter(
        RunOptions {
            dry_run,
            verbose,
            summary_policy,
        },
        Reporter::capturing(),
    )
}
