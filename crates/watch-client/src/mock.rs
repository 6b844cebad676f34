//! Mock WatchTransport for unit testing
//!
//! This module provides a scripted implementation of `WatchTransport` that can
//! be used in unit tests without an API server. Each call to `open` consumes
//! the next queued [`MockResponse`]; once the queue is empty requests hang.

use crate::error::WatchError;
use crate::transport_trait::{LineStream, WatchTransport};
use futures::StreamExt;
use futures::stream;
use reqwest::Url;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Scripted outcome of one watch request
#[derive(Debug)]
pub enum MockResponse {
    /// Success; the body yields these lines, then ends
    Lines(Vec<String>),
    /// Success; the body yields these lines, then stays open without data
    LinesThenHang(Vec<String>),
    /// Success; the body yields these items, errors included, then stays open
    Frames(Vec<Result<String, WatchError>>),
    /// Non-success HTTP status
    Status(u16),
    /// The request never completes
    Hang,
}

impl MockResponse {
    /// Lines response from anything string-like
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MockResponse::Lines(lines.into_iter().map(Into::into).collect())
    }

    /// Lines-then-hang response from anything string-like
    pub fn lines_then_hang<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MockResponse::LinesThenHang(lines.into_iter().map(Into::into).collect())
    }
}

/// Mock transport for testing
///
/// Clones share the response queue and the recorded requests.
#[derive(Debug, Clone)]
pub struct MockWatchTransport {
    pub(crate) server_url: String,
    pub(crate) responses: Arc<Mutex<VecDeque<MockResponse>>>,
    pub(crate) requests: Arc<Mutex<Vec<Url>>>,
    pub(crate) open_streams: Arc<AtomicUsize>,
    pub(crate) max_open_streams: Arc<AtomicUsize>,
}

impl MockWatchTransport {
    /// Create a mock transport with an empty response queue
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            open_streams: Arc::new(AtomicUsize::new(0)),
            max_open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue responses, served in order
    #[must_use]
    pub fn with_responses(self, responses: impl IntoIterator<Item = MockResponse>) -> Self {
        for response in responses {
            self.push_response(response);
        }
        self
    }

    /// Queue one response
    pub fn push_response(&self, response: MockResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// Every URL requested so far, in order
    pub fn requests(&self) -> Vec<Url> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests issued so far
    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Response bodies currently held open by a caller
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open response bodies
    pub fn max_open_streams(&self) -> usize {
        self.max_open_streams.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(MockResponse::Hang)
    }

    fn body(&self, items: Vec<Result<String, WatchError>>, hang: bool) -> LineStream {
        let guard = OpenStreamGuard::new(
            Arc::clone(&self.open_streams),
            &self.max_open_streams,
        );
        let lines = stream::iter(items);
        let body: LineStream = if hang {
            lines.chain(stream::pending()).boxed()
        } else {
            lines.boxed()
        };
        body.map(move |line| {
            let _held = &guard;
            line
        })
        .boxed()
    }
}

#[async_trait::async_trait]
impl WatchTransport for MockWatchTransport {
    fn server_url(&self) -> &str {
        &self.server_url
    }

    async fn open(&self, url: Url) -> Result<LineStream, WatchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url);

        match self.next_response() {
            MockResponse::Lines(lines) => Ok(self.body(lines.into_iter().map(Ok).collect(), false)),
            MockResponse::LinesThenHang(lines) => {
                Ok(self.body(lines.into_iter().map(Ok).collect(), true))
            }
            MockResponse::Frames(items) => Ok(self.body(items, true)),
            MockResponse::Status(status) => Err(WatchError::Api {
                status,
                message: "mock response".to_string(),
            }),
            MockResponse::Hang => std::future::pending().await,
        }
    }
}

/// Counts a response body as open until the stream is dropped
#[derive(Debug)]
struct OpenStreamGuard {
    open: Arc<AtomicUsize>,
}

impl OpenStreamGuard {
    fn new(open: Arc<AtomicUsize>, max: &AtomicUsize) -> Self {
        let now = open.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { open }
    }
}

impl Drop for OpenStreamGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
