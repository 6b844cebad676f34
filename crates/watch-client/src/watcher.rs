//! Watch session
//!
//! A `Watcher` turns a Kubernetes watch request into a durable subscription:
//! it keeps one stream open at a time, feeds every decoded event to the
//! caller's callback, advances the resource version only after the callback
//! succeeded, restarts idle streams when the resync interval elapses, relists
//! when the server reports the cursor as too old, and reconnects after faults
//! with a fixed delay until the retry limit is reached.
//!
//! All state is owned by the task driving [`Watcher::run`]. The only thing
//! shared with other threads is the cancellation token behind
//! [`CloseHandle`] and the subscriber list of the [`EventBus`].
//!
//! ```text
//! Idle -> Connecting -> Streaming <-> Reconnecting -> Closed
//!              ^                          |
//!              +--------------------------+
//! ```

use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::events::{EventBus, WatchEvent};
use crate::models::{RawWatchEvent, WatchPhase};
use crate::path::{self, Filters};
use crate::retry::FixedRetry;
use crate::transport_trait::{LineStream, WatchTransport};
use futures::StreamExt;
use kinds::ResourceModel;
use serde::de::DeserializeOwned;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a watch session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, not started
    Idle,
    /// Waiting for the watch response
    Connecting,
    /// Reading events from an open stream
    Streaming,
    /// Waiting out the retry delay after a fault
    Reconnecting,
    /// Terminal: closed by the caller or retries exhausted
    Closed,
}

/// Per-event callback of a watch session
///
/// Invoked at most once per non-bookmark event, never concurrently. An error
/// is reported as a `DataError` event and keeps the resource version where it
/// was; the stream continues with the next event.
#[async_trait::async_trait]
pub trait WatchCallback<K>: Send {
    /// Handle one object
    async fn on_event(&mut self, object: K, phase: WatchPhase) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
impl<K, F> WatchCallback<K> for F
where
    K: Send + 'static,
    F: FnMut(K, WatchPhase) -> anyhow::Result<()> + Send,
{
    async fn on_event(&mut self, object: K, phase: WatchPhase) -> anyhow::Result<()> {
        self(object, phase)
    }
}

/// Thread-safe handle closing a watch session
///
/// Closing is idempotent. It only flips the session's cancellation token; the
/// session tears down its stream on its own task.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    token: CancellationToken,
}

impl CloseHandle {
    /// Request the session to close
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Whether close was requested (or the session gave up)
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Why a stream stopped
enum Fault {
    Abort,
    StaleCursor,
    Resync,
    Network(WatchError),
}

/// Result of handling one watch line
enum LineOutcome {
    /// Not a watch event at all
    Malformed,
    /// A well-formed event, delivered or reported as a data error
    Processed,
    /// `ERROR` with code 410
    StaleCursor,
}

/// A resumable watch on one resource collection
pub struct Watcher<K, C> {
    transport: Arc<dyn WatchTransport>,
    model: ResourceModel,
    filters: Filters,
    callback: C,
    config: WatchConfig,
    events: EventBus<K>,
    cancel: CancellationToken,
    retry: FixedRetry,
    state: SessionState,
    pending_reconnect: bool,
    cache_id: String,
}

impl<K, C> fmt::Debug for Watcher<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("model", &self.model)
            .field("filters", &self.filters)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("retry", &self.retry)
            .field("pending_reconnect", &self.pending_reconnect)
            .field("cache_id", &self.cache_id)
            .finish_non_exhaustive()
    }
}

impl<K, C> Watcher<K, C>
where
    K: DeserializeOwned + Send + 'static,
    C: WatchCallback<K>,
{
    /// Create a session.
    ///
    /// The model, filters, server URL and configuration are validated here,
    /// so every error that is not a runtime fault surfaces before `run`.
    pub fn new(
        transport: Arc<dyn WatchTransport>,
        model: ResourceModel,
        filters: Filters,
        callback: C,
        config: WatchConfig,
    ) -> Result<Self, WatchError> {
        config.validate()?;
        path::build_watch_url(transport.server_url(), &model, &filters, None, false)?;
        let cache_id = path::cache_id(&model, &filters)?;
        let retry = FixedRetry::new(config.retry_max, config.retry_delay());

        Ok(Self {
            transport,
            model,
            filters,
            callback,
            config,
            events: EventBus::new(),
            cancel: CancellationToken::new(),
            retry,
            state: SessionState::Idle,
            pending_reconnect: false,
            cache_id,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Reconnect attempts since the last healthy stream
    pub fn retry_count(&self) -> u32 {
        self.retry.attempts()
    }

    /// Last successfully processed resource version
    pub fn resource_version(&self) -> Option<&str> {
        self.config.resource_version.as_deref()
    }

    /// Override the resume cursor (e.g. from a persisted checkpoint)
    pub fn set_resource_version(&mut self, resource_version: Option<String>) {
        self.config.resource_version = resource_version;
    }

    /// Stable ID of this watch, see [`path::cache_id`]
    pub fn cache_id(&self) -> &str {
        &self.cache_id
    }

    /// Lifecycle events of this session
    pub fn events(&self) -> &EventBus<K> {
        &self.events
    }

    /// Handle that closes this session from any thread
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            token: self.cancel.clone(),
        }
    }

    /// Close the session. Safe to call repeatedly.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Drive the session until it is closed or gives up.
    ///
    /// Faults never escape: they are reported as events and handled by the
    /// retry policy. A session runs once; later calls return immediately.
    pub async fn run(&mut self) {
        if self.state != SessionState::Idle {
            warn!("[{}] Watch session already used ({:?})", self.cache_id, self.state);
            return;
        }

        info!("[{}] Starting {} watch", self.cache_id, self.model);

        loop {
            let fault = self.stream_once().await;
            if self.handle_fault(fault).await.is_break() {
                break;
            }
        }

        info!("[{}] Watch session closed", self.cache_id);
    }

    /// Spawn the session on the Tokio runtime
    pub fn start(mut self) -> WatchHandle<K, C>
    where
        C: 'static,
    {
        let close = self.close_handle();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            self.run().await;
            self
        });

        WatchHandle {
            close,
            events,
            task,
        }
    }

    /// Open one stream and consume it until something stops it
    async fn stream_once(&mut self) -> Fault {
        self.state = SessionState::Connecting;

        let url = match path::build_watch_url(
            self.transport.server_url(),
            &self.model,
            &self.filters,
            self.config.resource_version.as_deref(),
            self.config.allow_watch_bookmarks,
        ) {
            Ok(url) => url,
            Err(e) => return Fault::Network(e),
        };
        debug!("[{}] Connecting: {}", self.cache_id, url);

        let cancel = self.cancel.clone();
        let transport = Arc::clone(&self.transport);
        let request = transport.open(url);
        tokio::pin!(request);
        let mut resync_at = Instant::now() + self.config.resync_interval();

        let lines: LineStream = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Fault::Abort,
                response = &mut request => {
                    self.pending_reconnect = false;
                    match response {
                        Ok(lines) => break lines,
                        Err(e) => return Fault::Network(e),
                    }
                }
                _ = sleep_until(resync_at) => {
                    if !self.pending_reconnect {
                        return Fault::Resync;
                    }
                    // The in-flight attempt keeps its connection; no second stream
                    warn!("[{}] Resync fired while a reconnect is pending", self.cache_id);
                    let error = Arc::new(self.resync_error());
                    self.events.emit(&WatchEvent::Resync(error));
                    self.events.emit(&WatchEvent::ReconnectPending);
                    resync_at = Instant::now() + self.config.resync_interval();
                }
            }
        };

        self.consume(lines, &cancel).await
    }

    async fn consume(&mut self, mut lines: LineStream, cancel: &CancellationToken) -> Fault {
        self.state = SessionState::Streaming;
        info!("[{}] Watch connected", self.cache_id);
        self.events.emit(&WatchEvent::Connect);

        let mut resync_at = Instant::now() + self.config.resync_interval();
        let mut healthy = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Fault::Abort,
                _ = sleep_until(resync_at) => {
                    // Open for a whole interval is a working connection, even if silent
                    self.retry.reset();
                    return Fault::Resync;
                }
                line = lines.next() => {
                    let line = match line {
                        Some(Ok(line)) => line,
                        Some(Err(e @ WatchError::LineTooLong(_))) => {
                            self.data_error(e);
                            continue;
                        }
                        Some(Err(e)) => return Fault::Network(e),
                        None => return Fault::Network(WatchError::StreamClosed),
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    match self.process_line(&line).await {
                        LineOutcome::Malformed => {}
                        LineOutcome::Processed => {
                            resync_at = Instant::now() + self.config.resync_interval();
                            if !healthy {
                                healthy = true;
                                self.retry.reset();
                            }
                        }
                        LineOutcome::StaleCursor => return Fault::StaleCursor,
                    }
                }
            }
        }
    }

    async fn process_line(&mut self, line: &str) -> LineOutcome {
        let event: RawWatchEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                self.data_error(WatchError::Decode(e));
                return LineOutcome::Malformed;
            }
        };
        debug!("[{}] Received {} event", self.cache_id, event.phase);

        if event.is_stale_cursor() {
            return LineOutcome::StaleCursor;
        }

        let resource_version = event.resource_version().map(str::to_string);
        let phase = event.phase;

        if phase == WatchPhase::Bookmark {
            self.events.emit(&WatchEvent::Bookmark(event.object));
            self.advance(resource_version);
            return LineOutcome::Processed;
        }

        let object: K = match serde_json::from_value(event.object) {
            Ok(object) => object,
            Err(e) => {
                self.data_error(WatchError::Decode(e));
                return LineOutcome::Processed;
            }
        };

        let data = WatchEvent::Data { object, phase };
        self.events.emit(&data);
        let Some((object, phase)) = data.into_data() else {
            return LineOutcome::Processed;
        };

        match self.callback.on_event(object, phase).await {
            Ok(()) => self.advance(resource_version),
            Err(e) => self.data_error(WatchError::Callback(e)),
        }
        LineOutcome::Processed
    }

    fn advance(&mut self, resource_version: Option<String>) {
        match resource_version {
            Some(rv) => {
                self.config.resource_version = Some(rv.clone());
                self.events.emit(&WatchEvent::ResourceVersion(Some(rv)));
            }
            None => debug!("[{}] Event carried no resource version", self.cache_id),
        }
    }

    fn data_error(&self, error: WatchError) {
        error!("[{}] Data error: {}", self.cache_id, error);
        self.events.emit(&WatchEvent::DataError(Arc::new(error)));
    }

    fn resync_error(&self) -> WatchError {
        WatchError::ResyncTriggered(self.config.resync_interval_sec)
    }

    /// The single place where retry and give-up decisions are made
    async fn handle_fault(&mut self, fault: Fault) -> ControlFlow<()> {
        let error = match fault {
            Fault::Abort => {
                self.abort();
                return ControlFlow::Break(());
            }
            Fault::StaleCursor => {
                let previous = self.config.resource_version.take();
                warn!(
                    "[{}] Resource version {} is too old, relisting",
                    self.cache_id,
                    previous.as_deref().unwrap_or("<none>")
                );
                self.events.emit(&WatchEvent::ResourceVersion(None));
                self.events.emit(&WatchEvent::OldResourceVersion(previous.clone()));
                Arc::new(WatchError::StaleCursor { previous })
            }
            Fault::Resync => {
                info!("[{}] No events for {}s, resyncing", self.cache_id, self.config.resync_interval_sec);
                let error = Arc::new(self.resync_error());
                self.events.emit(&WatchEvent::Resync(Arc::clone(&error)));
                error
            }
            Fault::Network(e) => {
                warn!("[{}] Watch stream failed: {}", self.cache_id, e);
                let error = Arc::new(e);
                self.events.emit(&WatchEvent::NetworkError(Arc::clone(&error)));
                error
            }
        };

        self.reconnect(error).await
    }

    async fn reconnect(&mut self, error: Arc<WatchError>) -> ControlFlow<()> {
        self.state = SessionState::Reconnecting;

        if !self.retry.can_retry() {
            error!(
                "[{}] Giving up after {} reconnect attempts: {}",
                self.cache_id,
                self.retry.attempts(),
                error
            );
            self.events.emit(&WatchEvent::GiveUp(error));
            self.teardown();
            return ControlFlow::Break(());
        }

        let delay = self.retry.delay();
        debug!("[{}] Reconnecting in {:?}", self.cache_id, delay);

        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.abort();
                return ControlFlow::Break(());
            }
            _ = sleep(delay) => {}
        }

        let attempt = self.retry.record_attempt();
        info!("[{}] Reconnect attempt {}", self.cache_id, attempt);
        self.events.emit(&WatchEvent::Reconnect { error, attempt });

        // Cleared once the new request gets a response
        self.pending_reconnect = true;
        ControlFlow::Continue(())
    }

    fn abort(&mut self) {
        info!("[{}] Watch aborted", self.cache_id);
        self.teardown();
        self.events.emit(&WatchEvent::Abort(Arc::new(WatchError::Aborted)));
    }

    fn teardown(&mut self) {
        self.cancel.cancel();
        self.pending_reconnect = false;
        self.state = SessionState::Closed;
    }
}

/// A session running on its own task
pub struct WatchHandle<K, C> {
    close: CloseHandle,
    events: EventBus<K>,
    task: JoinHandle<Watcher<K, C>>,
}

impl<K, C> fmt::Debug for WatchHandle<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("closed", &self.close.is_closed())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl<K, C> WatchHandle<K, C> {
    /// Request the session to close
    pub fn close(&self) {
        self.close.close();
    }

    /// Cloneable close handle
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Lifecycle events of the session
    pub fn events(&self) -> &EventBus<K> {
        &self.events
    }

    /// Wait for the session to finish and take it back
    pub async fn join(self) -> Result<Watcher<K, C>, JoinError> {
        self.task.await
    }
}
