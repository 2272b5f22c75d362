use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::task::TaskStatus;

pub const ACTIVE: &str = "active";
pub const FAILED: &str = "failed";
pub const PENDING: &str = "pending";

/// Point-in-time copy of the aggregate task counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatSnapshot(BTreeMap<String, u32>);

impl StatSnapshot {
    pub fn new(active: u32, failed: u32, pending: u32) -> Self {
        Self(BTreeMap::from([
            (ACTIVE.to_string(), active),
            (FAILED.to_string(), failed),
            (PENDING.to_string(), pending),
        ]))
    }

    /// Counts every status once.
    pub fn from_statuses(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        let (mut active, mut failed, mut pending) = (0, 0, 0);
        for status in statuses {
            match status {
                TaskStatus::Connecting => pending += 1,
                TaskStatus::Active => active += 1,
                TaskStatus::Error => failed += 1,
            }
        }
        Self::new(active, failed, pending)
    }

    /// Value of the named counter, zero when absent.
    pub fn get(&self, counter: &str) -> u32 {
        self.0.get(counter).copied().unwrap_or_default()
    }

    pub fn active(&self) -> u32 {
        self.get(ACTIVE)
    }

    pub fn failed(&self) -> u32 {
        self.get(FAILED)
    }

    pub fn pending(&self) -> u32 {
        self.get(PENDING)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(name, count)| (name.as_str(), *count))
    }
}

/// Renders as `active:1,failed:0,pending:2`.
impl fmt::Display for StatSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, count)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}:{count}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed statistics entry: {0:?}")]
pub struct ParseStatError(String);

impl FromStr for StatSnapshot {
    type Err = ParseStatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut counters = BTreeMap::new();
        for entry in s.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (name, count) = entry
                .split_once(':')
                .ok_or_else(|| ParseStatError(entry.to_string()))?;
            let count = count
                .trim()
                .parse()
                .map_err(|_| ParseStatError(entry.to_string()))?;
            counters.insert(name.trim().to_string(), count);
        }
        Ok(Self(counters))
    }
}

/// Holder of the latest [`StatSnapshot`].
///
/// The supervisor is the only writer; readers always get their own copy.
#[derive(Debug)]
pub struct Statistics {
    current: Mutex<StatSnapshot>,
}

impl Statistics {
    /// Starts with every counter at zero.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(StatSnapshot::new(0, 0, 0)),
        }
    }

    /// Replaces the whole snapshot.
    pub fn set(&self, snapshot: StatSnapshot) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn get(&self) -> StatSnapshot {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}
