use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Opaque identifier of a task, unique within one scheduler.
///
/// Ids are allocated from a per-scheduler monotonic counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(raw: u64) -> Self {
        TaskId(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Quality-of-service band of a task. Higher bands are always dispatched
/// before lower ones; within a band tasks run in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Background,
    Default,
    UserInitiated,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Default
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "background" => Ok(Priority::Background),
            "default" => Ok(Priority::Default),
            "user_initiated" => Ok(Priority::UserInitiated),
            "critical" => Ok(Priority::Critical),
            other => Err(format!(
                "invalid priority: {other} (expected \"background\", \"default\", \"user_initiated\" or \"critical\")"
            )),
        }
    }
}

/// What happens to a task when one of its dependencies is cancelled.
///
/// - `Cancel`: the dependent (and everything downstream of it) is cancelled
///   too. This is the default.
/// - `Satisfy`: a cancelled dependency counts as finished and no longer blocks
///   its dependents.
///
/// A *failed* dependency always cancels its dependents, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelledDependency {
    Cancel,
    Satisfy,
}

impl Default for CancelledDependency {
    fn default() -> Self {
        CancelledDependency::Cancel
    }
}

impl FromStr for CancelledDependency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cancel" => Ok(CancelledDependency::Cancel),
            "satisfy" => Ok(CancelledDependency::Satisfy),
            other => Err(format!(
                "invalid cancelled_dependency: {other} (expected \"cancel\" or \"satisfy\")"
            )),
        }
    }
}
