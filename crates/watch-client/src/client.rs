//! Kubernetes watch transport
//!
//! Implements `WatchTransport` on top of a `kube::Client`. Credentials and TLS
//! come from whatever `kube::Config::infer` resolves: a kubeconfig file, the
//! in-cluster service account, exec plugins or client certificates.
//!
//! The response body is framed into lines by [`frame_lines`]. A line longer
//! than the limit is reported as [`WatchError::LineTooLong`] and skipped; the
//! stream keeps going with the next line.

use crate::error::WatchError;
use crate::transport_trait::{LineStream, WatchTransport};
use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::{Client, Config};
use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;
use tracing::debug;

/// Longest watch line accepted; longer lines are skipped
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// `kube` backed watch transport
#[derive(Clone)]
pub struct KubeTransport {
    client: Client,
    server_url: String,
}

impl fmt::Debug for KubeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeTransport")
            .field("server_url", &self.server_url)
            .finish_non_exhaustive()
    }
}

impl KubeTransport {
    /// Connect with the inferred configuration (kubeconfig, then in-cluster)
    pub async fn try_default() -> Result<Self, WatchError> {
        let config = Config::infer()
            .await
            .map_err(|e| WatchError::InvalidConfig(format!("failed to infer cluster config: {}", e)))?;
        Self::from_config(config)
    }

    /// Connect with an explicit configuration
    pub fn from_config(config: Config) -> Result<Self, WatchError> {
        let server_url = config.cluster_url.to_string();
        let client = Client::try_from(config)?;
        Ok(Self::new(client, server_url))
    }

    /// Wrap an existing client. `server_url` is only used to build request URLs;
    /// the client decides where requests actually go.
    pub fn new(client: Client, server_url: impl Into<String>) -> Self {
        Self {
            client,
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl WatchTransport for KubeTransport {
    fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn open(&self, url: Url) -> Result<LineStream, WatchError> {
        debug!("GET {}", url);

        // The client carries the cluster address; only path and query go on the wire
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        let request = Request::get(target)
            .body(Body::from(Vec::new()))
            .map_err(|e| WatchError::InvalidConfig(format!("invalid request {}: {}", url, e)))?;

        let response = self.client.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    debug!("Failed to read error body: {}", e);
                    bytes::Bytes::new()
                }
            };
            return Err(api_error(status, &body));
        }

        Ok(frame_lines(response.into_body().into_data_stream(), MAX_LINE_LENGTH))
    }
}

/// `Status` object returned by the API server on failure
#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

/// Map a non-success response to `WatchError::Api`.
///
/// The message is taken from a `Status` body when there is one, then from the
/// raw body text, then from the status code's reason phrase.
pub(crate) fn api_error(status: StatusCode, body: &[u8]) -> WatchError {
    let text = String::from_utf8_lossy(body);
    let message = match serde_json::from_slice::<ApiStatus>(body) {
        Ok(api_status) if !api_status.message.is_empty() => api_status.message,
        _ if !text.trim().is_empty() => text.trim().to_string(),
        _ => status.canonical_reason().unwrap_or_default().to_string(),
    };
    WatchError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Split a response body into lines.
///
/// Lines end in `\n` or `\r\n`; a final line without a terminator is still
/// returned. A line over `max_length` bytes yields `WatchError::LineTooLong`
/// and reading resumes after its terminator. Body errors end the stream with
/// `WatchError::Transport`.
pub fn frame_lines<S, B, E>(body: S, max_length: usize) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: Buf + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let reader = StreamReader::new(body.map_err(std::io::Error::other));
    FramedRead::new(reader, WatchLines::new(max_length))
        .map(|item| match item {
            Ok(line) => line,
            Err(e) => Err(WatchError::Transport(e.to_string())),
        })
        .boxed()
}

/// `LinesCodec` that reports oversized lines as items instead of failing the frame
#[derive(Debug)]
struct WatchLines {
    inner: LinesCodec,
    max_length: usize,
}

impl WatchLines {
    fn new(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }

    fn recover(
        &self,
        decoded: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Result<String, WatchError>>, LinesCodecError> {
        match decoded {
            Ok(line) => Ok(line.map(Ok)),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                Ok(Some(Err(WatchError::LineTooLong(self.max_length))))
            }
            Err(e) => Err(e),
        }
    }
}

impl Decoder for WatchLines {
    type Item = Result<String, WatchError>;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let decoded = self.inner.decode(buf);
        self.recover(decoded)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let decoded = self.inner.decode_eof(buf);
        self.recover(decoded)
    }
}
