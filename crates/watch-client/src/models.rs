//! Watch wire format
//!
//! A watch response body is newline-delimited JSON, one event per line:
//! `{"type": "ADDED", "object": {...}}`.
//!
//! See <https://kubernetes.io/docs/reference/using-api/api-concepts/#efficient-detection-of-changes>

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// HTTP status carried by an `ERROR` event when the requested resource version was compacted away
pub const STATUS_GONE: u64 = 410;

/// Phase of a watch event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchPhase {
    /// Resource was added
    Added,
    /// Resource was modified
    Modified,
    /// Resource was deleted
    Deleted,
    /// Resource version checkpoint with no object change
    Bookmark,
    /// Server-side error, object is a `Status`
    Error,
}

impl WatchPhase {
    /// Wire representation of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchPhase::Added => "ADDED",
            WatchPhase::Modified => "MODIFIED",
            WatchPhase::Deleted => "DELETED",
            WatchPhase::Bookmark => "BOOKMARK",
            WatchPhase::Error => "ERROR",
        }
    }
}

impl fmt::Display for WatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single undecoded watch line
///
/// The object is kept as raw JSON until the phase has been inspected, so
/// bookmarks and error statuses never have to fit the caller's object type.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWatchEvent {
    /// Event phase
    #[serde(rename = "type")]
    pub phase: WatchPhase,

    /// Event payload
    #[serde(default)]
    pub object: Value,
}

impl RawWatchEvent {
    /// `object.metadata.resourceVersion`, if present
    pub fn resource_version(&self) -> Option<&str> {
        self.object
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
    }

    /// True for an `ERROR` event whose status code is 410 (Gone)
    pub fn is_stale_cursor(&self) -> bool {
        self.phase == WatchPhase::Error
            && self.object.get("code").and_then(Value::as_u64) == Some(STATUS_GONE)
    }
}
