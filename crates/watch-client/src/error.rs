//! Watch client errors

use thiserror::Error;

/// Errors that can occur while building or running a watch
#[derive(Debug, Error)]
pub enum WatchError {
    /// The resource model has no kind
    #[error("Kind not specified for {0}")]
    InvalidModel(String),

    /// The resource model has no API version
    #[error("Version not specified for {0}")]
    MissingVersion(String),

    /// Invalid configuration (bad server URL, zero resync interval, etc.)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The watch was closed by the caller
    #[error("Watch aborted")]
    Aborted,

    /// The server reported the resource version as too old (410 Gone)
    #[error("Resource version too old: {}", previous.as_deref().unwrap_or("<none>"))]
    StaleCursor {
        /// Resource version that was purged
        previous: Option<String>,
    },

    /// The periodic resync timer expired
    #[error("Resync triggered by resyncIntervalSec ({0}s)")]
    ResyncTriggered(u64),

    /// The server ended the response body
    #[error("Watch stream closed by server")]
    StreamClosed,

    /// The Kubernetes client failed to build or to send a request
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubernetes API returned a non-success status
    #[error("watch connect failed: {status} {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Status text or response body
        message: String,
    },

    /// A watch line could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A watch line was longer than the framing limit and was skipped
    #[error("Watch line exceeds {0} bytes")]
    LineTooLong(usize),

    /// The caller's callback returned an error
    #[error("Callback failed: {0:#}")]
    Callback(anyhow::Error),

    /// Reading the response body failed
    #[error("Transport error: {0}")]
    Transport(String),
}

impl WatchError {
    /// True for errors raised while validating a model or filter set
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WatchError::InvalidModel(_) | WatchError::MissingVersion(_) | WatchError::InvalidConfig(_)
        )
    }
}
