//! Change notifications fanned out to listeners

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Kind of change observed on the entries collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Replace,
    Delete,
    /// The recent-links snapshot differs from the previous poll
    BatchChanged,
    /// UI-driven language selection change
    LanguageChanged,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Replace => "replace",
            ChangeKind::Delete => "delete",
            ChangeKind::BatchChanged => "batch_changed",
            ChangeKind::LanguageChanged => "language_changed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(ChangeKind::Insert),
            "update" => Ok(ChangeKind::Update),
            "replace" => Ok(ChangeKind::Replace),
            "delete" => Ok(ChangeKind::Delete),
            "batch_changed" => Ok(ChangeKind::BatchChanged),
            "language_changed" => Ok(ChangeKind::LanguageChanged),
            other => Err(CoreError::UnknownChangeKind(other.to_string())),
        }
    }
}

/// Where a change notification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Live change feed of the store
    Tailing,
    /// Snapshot diff in fallback mode
    Polling,
    /// Published directly by the application
    Synthetic,
}

/// A single `(kind, link)` notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub origin: ChangeOrigin,
}

impl ChangeEvent {
    pub fn tailing(kind: ChangeKind, link: impl Into<String>) -> Self {
        Self {
            kind,
            link: Some(link.into()),
            origin: ChangeOrigin::Tailing,
        }
    }

    pub fn batch_changed() -> Self {
        Self {
            kind: ChangeKind::BatchChanged,
            link: None,
            origin: ChangeOrigin::Polling,
        }
    }

    pub fn synthetic(kind: ChangeKind, key: Option<String>) -> Self {
        Self {
            kind,
            link: key,
            origin: ChangeOrigin::Synthetic,
        }
    }
}
