//! Sync points: configured (source directory, target host + directory) pairs.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Separator between host and absolute path in a target location.
const HOST_PATH_SEPARATOR: &str = ":/";

/// A parsed `<host>:<absolute-path>` target location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLocation {
    /// Bare hostname or IP address.
    pub host: String,
    /// Absolute directory on the target host.
    pub path: String,
}

impl TargetLocation {
    /// Parse a target location string.
    ///
    /// The host is everything before the first `":/"`; the path starts at
    /// that `/`. Strings without the separator, or with an empty host, are
    /// rejected.
    pub fn parse(location: &str) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedTarget {
            location: location.to_string(),
        };
        let idx = location.find(HOST_PATH_SEPARATOR).ok_or_else(malformed)?;
        let host = &location[..idx];
        if host.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            host: host.to_string(),
            path: location[idx + 1..].to_string(),
        })
    }
}

impl FromStr for TargetLocation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.path)
    }
}

/// One configured replication pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPointSpec {
    /// Free-form description from the configuration.
    pub description: String,
    /// Source location as configured. Expected to be a local path.
    pub source_path: String,
    /// Parsed target location.
    pub target: TargetLocation,
}

impl SyncPointSpec {
    /// Target host name.
    pub fn target_host(&self) -> &str {
        &self.target.host
    }

    /// Absolute target directory.
    pub fn target_path(&self) -> &str {
        &self.target.path
    }
}

/// Ordered set of sync points keyed by source location.
///
/// Inserting a source that is already present replaces the earlier entry
/// in place: the last definition wins but the pair keeps its original
/// position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    points: Vec<SyncPointSpec>,
}

impl SyncPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sync point, returning the entry it replaced, if any.
    pub fn insert(&mut self, point: SyncPointSpec) -> Option<SyncPointSpec> {
        match self
            .points
            .iter_mut()
            .find(|p| p.source_path == point.source_path)
        {
            Some(existing) => Some(std::mem::replace(existing, point)),
            None => {
                self.points.push(point);
                None
            }
        }
    }

    /// Look up the sync point for a source location.
    pub fn get(&self, source_path: &str) -> Option<&SyncPointSpec> {
        self.points.iter().find(|p| p.source_path == source_path)
    }

    /// Iterate sync points in configuration order.
    pub fn iter(&self) -> std::slice::Iter<'_, SyncPointSpec> {
        self.points.iter()
    }

    /// Number of distinct sources.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if no sync points are configured.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl<'a> IntoIterator for &'a SyncPlan {
    type Item = &'a SyncPointSpec;
    type IntoIter = std::slice::Iter<'a, SyncPointSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn point(source: &str, target: &str) -> SyncPointSpec {
        SyncPointSpec {
            description: String::new(),
            source_path: source.to_string(),
            target: TargetLocation::parse(target).unwrap(),
        }
    }

    #[test]
    fn test_parse_host_and_path() {
        let t = TargetLocation::parse("backup01:/data/a").unwrap();
        assert_eq!(t.host, "backup01");
        assert_eq!(t.path, "/data/a");
        assert_eq!(t.to_string(), "backup01:/data/a");
    }

    #[test]
    fn test_parse_root_path() {
        let t: TargetLocation = "10.0.0.5:/".parse().unwrap();
        assert_eq!(t.host, "10.0.0.5");
        assert_eq!(t.path, "/");
    }

    #[test]
    fn test_parse_uses_first_separator() {
        let t = TargetLocation::parse("host:/data:/nested").unwrap();
        assert_eq!(t.host, "host");
        assert_eq!(t.path, "/data:/nested");
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        for bad in ["backup01data/a", "backup01:data/a", "/data/a", ""] {
            let err = TargetLocation::parse(bad).unwrap_err();
            assert!(matches!(err, ConfigError::MalformedTarget { .. }), "{}", bad);
        }
    }

    #[test]
    fn test_parse_rejects_empty_host() {
        assert!(TargetLocation::parse(":/data/a").is_err());
    }

    #[test]
    fn test_plan_last_write_wins_keeps_position() {
        let mut plan = SyncPlan::new();
        assert!(plan.insert(point("/mnt/cephfs/a", "h1:/a")).is_none());
        assert!(plan.insert(point("/mnt/cephfs/b", "h1:/b")).is_none());
        let replaced = plan.insert(point("/mnt/cephfs/a", "h2:/a2")).unwrap();
        assert_eq!(replaced.target_host(), "h1");

        assert_eq!(plan.len(), 2);
        let sources: Vec<_> = plan.iter().map(|p| p.source_path.as_str()).collect();
        assert_eq!(sources, vec!["/mnt/cephfs/a", "/mnt/cephfs/b"]);
        let a = plan.get("/mnt/cephfs/a").unwrap();
        assert_eq!(a.target_host(), "h2");
        assert_eq!(a.target_path(), "/a2");
    }

    #[test]
    fn test_empty_plan() {
        let plan = SyncPlan::new();
        assert!(plan.is_empty());
        assert!(plan.get("/x").is_none());
    }

    proptest! {
        #[test]
        fn prop_parse_splits_at_first_separator(
            host in "[a-z0-9.-]{1,20}",
            path in "(/[a-z0-9_]{0,8}){1,4}",
        ) {
            let location = format!("{}:{}", host, path);
            let parsed = TargetLocation::parse(&location).unwrap();
            prop_assert_eq!(parsed.host, host);
            prop_assert_eq!(parsed.path, path);
        }

        #[test]
        fn prop_without_separator_is_malformed(s in "[^:]{0,40}") {
            prop_assert!(TargetLocation::parse(&s).is_err());
        }
    }
}
