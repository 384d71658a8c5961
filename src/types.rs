// src/types.rs

//! Identifier newtypes and small enums shared across the crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a task, unique within one [`TaskGraph`](crate::dag::TaskGraph).
///
/// Members of a task family carry a parameter after a colon, e.g.
/// `compress:vocals`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Build the id of a task family member: `name:param`.
    pub fn with_param(name: &str, param: &str) -> Self {
        Self(format!("{name}:{param}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Family name, i.e. the part before the first `:`.
    pub fn name(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(name, _)| name)
    }

    pub fn param(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, param)| param)
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of one submitted job (one song in the karaoke pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What the event bus does when a subscriber's buffer is full.
///
/// - `DropOldest`: discard that subscriber's oldest buffered event and count
///   it as dropped (default).
/// - `Disconnect`: detach the subscriber; it sees end-of-stream after
///   draining what it already has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    Disconnect,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop_oldest" | "drop-oldest" => Ok(OverflowPolicy::DropOldest),
            "disconnect" => Ok(OverflowPolicy::Disconnect),
            other => Err(format!(
                "invalid overflow policy: {other} (expected \"drop_oldest\" or \"disconnect\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_member_ids_split_into_name_and_param() {
        let id = TaskId::with_param("compress", "vocals");
        assert_eq!(id.as_str(), "compress:vocals");
        assert_eq!(id.name(), "compress");
        assert_eq!(id.param(), Some("vocals"));

        let plain = TaskId::from("separate_audio");
        assert_eq!(plain.name(), "separate_audio");
        assert_eq!(plain.param(), None);
    }

    #[test]
    fn overflow_policy_parses_both_spellings() {
        assert_eq!("drop-oldest".parse(), Ok(OverflowPolicy::DropOldest));
        assert_eq!(" Disconnect ".parse(), Ok(OverflowPolicy::Disconnect));
        assert!("block".parse::<OverflowPolicy>().is_err());
    }
}
