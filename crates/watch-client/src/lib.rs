//! Kubernetes Watch Client
//!
//! A Rust client library for long-lived Kubernetes watches.
//! Keeps a watch stream open, resumes from the last processed resource version
//! and publishes lifecycle events for every step of the session.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use watch_client::{Filters, KubeTransport, WatchConfig, WatchPhase, Watcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Connect with the local kubeconfig or the in-cluster service account
//! let transport = KubeTransport::try_default().await?;
//!
//! // Watch pods labelled app=web in the default namespace
//! let filters = Filters::new().namespace("default").label("app", "web");
//! let mut watcher = Watcher::new(
//!     Arc::new(transport),
//!     kinds::well_known::pod(),
//!     filters,
//!     |pod: serde_json::Value, phase: WatchPhase| -> anyhow::Result<()> {
//!         println!("{} {}", phase, pod["metadata"]["name"]);
//!         Ok(())
//!     },
//!     WatchConfig::default(),
//! )?;
//!
//! // Observe the session
//! watcher.events().subscribe(|event: &watch_client::WatchEvent<serde_json::Value>| {
//!     println!("watch event: {}", event.kind());
//! });
//!
//! // Runs until closed or retries are exhausted
//! watcher.run().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Resumable**: Restarts from the last resource version the callback accepted
//! - **Resync**: Restarts streams that stay silent for too long
//! - **Fixed-Delay Retry**: Bounded or unlimited reconnects with a constant delay
//! - **Stale Cursor Recovery**: Relists when the server answers 410 Gone
//! - **Lifecycle Events**: Closure, trait or channel observers

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod path;
pub mod retry;
#[path = "trait.rs"]
pub mod transport_trait;
pub mod watcher;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;


pub use client::{KubeTransport, MAX_LINE_LENGTH, frame_lines};
pub use config::WatchConfig;
pub use error::WatchError;
pub use events::{EventBus, SubscriptionId, WatchEvent, WatchEventKind, WatchObserver};
pub use models::{RawWatchEvent, WatchPhase};
pub use path::{Filters, build_url, build_watch_url, cache_id};
pub use retry::FixedRetry;
pub use transport_trait::{LineStream, WatchTransport};
pub use watcher::{CloseHandle, SessionState, WatchCallback, WatchHandle, Watcher};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockResponse, MockWatchTransport};
