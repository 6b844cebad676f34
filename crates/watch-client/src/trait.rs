//! WatchTransport trait for mocking
//!
//! This trait abstracts the HTTP layer of a watch so the session can be
//! driven by a scripted transport in unit tests. `KubeTransport` is the
//! concrete implementation.

use crate::error::WatchError;
use futures::stream::BoxStream;
use reqwest::Url;

/// Lines of a watch response body, one JSON event per item
pub type LineStream = BoxStream<'static, Result<String, WatchError>>;

/// Trait for opening streaming watch requests
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait WatchTransport: Send + Sync {
    /// Base URL of the API server
    fn server_url(&self) -> &str;

    /// Issue a GET for `url` and return the response body split into lines.
    ///
    /// Non-success statuses are returned as `WatchError::Api`. Dropping the
    /// returned stream releases the connection.
    async fn open(&self, url: Url) -> Result<LineStream, WatchError>;
}
