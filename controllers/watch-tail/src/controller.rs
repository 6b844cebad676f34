//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires one watch session
//! to stdout, the log and an optional checkpoint file, and runs it until
//! shutdown or until the session gives up.

use crate::checkpoint::Checkpoint;
use crate::error::ControllerError;
use kinds::ResourceModel;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};
use watch_client::{
    Filters, KubeTransport, WatchConfig, WatchEvent, WatchEventKind, WatchPhase, Watcher,
};

/// Callback printing one line per object
type Printer = fn(Value, WatchPhase) -> anyhow::Result<()>;

/// What to watch and where to keep the checkpoint
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Watched resource
    pub model: ResourceModel,
    /// Namespace, name and selectors
    pub filters: Filters,
    /// Checkpoint directory, no checkpointing when unset
    pub state_dir: Option<PathBuf>,
    /// Session configuration
    pub watch: WatchConfig,
}

impl TailOptions {
    /// Load options from environment variables
    ///
    /// * `WATCH_KIND` (required): kind or plural, e.g. `Pod` or `deployments`
    /// * `WATCH_NAMESPACE`, `WATCH_NAME`
    /// * `WATCH_LABELS`, `WATCH_FIELDS`: `key=value` terms separated by commas
    /// * `WATCH_STATE_DIR`: checkpoint directory
    /// * the `WATCH_*` session variables read by `WatchConfig`
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ControllerError> {
        let kind = lookup("WATCH_KIND").filter(|kind| !kind.is_empty()).ok_or_else(|| {
            ControllerError::InvalidConfig("WATCH_KIND environment variable is required".to_string())
        })?;
        let model = kinds::lookup(&kind)
            .ok_or_else(|| ControllerError::InvalidConfig(format!("Unknown kind: {}", kind)))?;

        let mut filters = Filters::new();
        if let Some(namespace) = lookup("WATCH_NAMESPACE") {
            filters = filters.namespace(namespace);
        }
        if let Some(name) = lookup("WATCH_NAME") {
            filters = filters.name(name);
        }
        for (key, value) in parse_selector(&lookup("WATCH_LABELS").unwrap_or_default())? {
            filters = filters.label(key, value);
        }
        for (key, value) in parse_selector(&lookup("WATCH_FIELDS").unwrap_or_default())? {
            filters = filters.field(key, value);
        }

        Ok(Self {
            model,
            filters,
            state_dir: lookup("WATCH_STATE_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            watch: WatchConfig::from_lookup(&lookup)?,
        })
    }
}

/// Parse `a=1,b=2` into selector terms
pub(crate) fn parse_selector(selector: &str) -> Result<Vec<(String, String)>, ControllerError> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| match term.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ControllerError::InvalidConfig(format!(
                "Invalid selector term '{}', expected key=value",
                term
            ))),
        })
        .collect()
}

/// Main controller for tailing one watch.
#[derive(Debug)]
pub struct Controller {
    watcher: Watcher<Value, Printer>,
    checkpoint: Option<Checkpoint>,
}

impl Controller {
    /// Creates a new controller instance.
    ///
    /// Resumes from the checkpoint unless a resource version was configured
    /// explicitly.
    pub async fn new(options: TailOptions, transport: KubeTransport) -> Result<Self, ControllerError> {
        info!("Initializing watch-tail");

        let resource = options.model.to_string();
        let mut watcher = Watcher::new(
            Arc::new(transport),
            options.model,
            options.filters,
            print_object as Printer,
            options.watch,
        )?;

        let checkpoint = options
            .state_dir
            .map(|dir| Checkpoint::new(&dir, watcher.cache_id(), resource));

        if let Some(checkpoint) = &checkpoint {
            if let Some(rv) = watcher.resource_version() {
                info!("Resource version {} set explicitly, not loading checkpoint", rv);
            } else if let Some(rv) = checkpoint.load().await? {
                info!("Resuming from {} ({})", rv, checkpoint.path().display());
                watcher.set_resource_version(Some(rv));
            }
        }

        info!("Watch {} ready", watcher.cache_id());
        Ok(Self { watcher, checkpoint })
    }

    /// Runs the watch until shutdown.
    ///
    /// Ctrl-C closes the session. Exhausted retries are an error.
    pub async fn run(self) -> Result<(), ControllerError> {
        let Self { watcher, checkpoint } = self;
        let cache_id = watcher.cache_id().to_string();
        let events = watcher.events().subscribe_channel();
        let handle = watcher.start();

        let close = handle.close_handle();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested");
                    close.close();
                }
                Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
            }
        });

        info!("watch-tail running");
        let last = follow(events, checkpoint.as_ref()).await;

        let watcher = handle
            .join()
            .await
            .map_err(|e| ControllerError::Task(e.to_string()))?;
        debug!(
            "Watch {} finished in {:?} at resource version {:?}",
            cache_id,
            watcher.state(),
            watcher.resource_version()
        );

        if last == Some(WatchEventKind::GiveUp) {
            return Err(ControllerError::GaveUp(cache_id));
        }
        Ok(())
    }
}

/// Log and checkpoint events until the session ends; returns the final event
async fn follow(
    mut events: UnboundedReceiver<WatchEvent<Value>>,
    checkpoint: Option<&Checkpoint>,
) -> Option<WatchEventKind> {
    while let Some(event) = events.recv().await {
        log_event(&event);

        if let (WatchEvent::ResourceVersion(rv), Some(checkpoint)) = (&event, checkpoint) {
            if let Err(e) = checkpoint.save(rv.as_deref()).await {
                warn!("Failed to write checkpoint: {}", e);
            }
        }

        let kind = event.kind();
        if matches!(kind, WatchEventKind::Abort | WatchEventKind::GiveUp) {
            return Some(kind);
        }
    }
    None
}

fn log_event(event: &WatchEvent<Value>) {
    let kind = event.kind();
    match event {
        WatchEvent::Connect | WatchEvent::Abort(_) => info!("[{}]", kind),
        WatchEvent::Data { object, phase } => debug!("[{}] {} {}", kind, phase, object_name(object)),
        WatchEvent::Bookmark(_) => debug!("[{}]", kind),
        WatchEvent::ResourceVersion(rv) | WatchEvent::OldResourceVersion(rv) => {
            debug!("[{}] {}", kind, rv.as_deref().unwrap_or("<none>"));
        }
        WatchEvent::DataError(e) | WatchEvent::GiveUp(e) => error!("[{}] {}", kind, e),
        WatchEvent::NetworkError(e) | WatchEvent::Resync(e) => warn!("[{}] {}", kind, e),
        WatchEvent::Reconnect { error, attempt } => info!("[{}] attempt {} after: {}", kind, attempt, error),
        WatchEvent::ReconnectPending => warn!("[{}]", kind),
    }
}

/// `namespace/name`, or `name` for cluster-scoped objects
pub(crate) fn object_name(object: &Value) -> String {
    let name = object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>");
    match object.pointer("/metadata/namespace").and_then(Value::as_str) {
        Some(namespace) => format!("{}/{}", namespace, name),
        None => name.to_string(),
    }
}

/// Print `PHASE  namespace/name  resourceVersion` to stdout
pub(crate) fn print_object(object: Value, phase: WatchPhase) -> anyhow::Result<()> {
    anyhow::ensure!(
        object.pointer("/metadata/name").is_some(),
        "{} event without metadata.name",
        phase
    );
    let rv = object
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .unwrap_or("-");
    println!("{}\t{}\t{}", phase, object_name(&object), rv);
    Ok(())
}
