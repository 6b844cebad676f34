//! Integration tests for the watch client
//!
//! These tests require a reachable Kubernetes API server, found the same way
//! kubectl finds it (KUBECONFIG, ~/.kube/config or the in-cluster service
//! account).

use k8s_openapi::api::core::v1::Namespace;
use std::sync::Arc;
use std::time::Duration;
use watch_client::{
    Filters, KubeTransport, WatchConfig, WatchError, WatchEvent, WatchEventKind, WatchPhase,
    WatchTransport, Watcher,
};

async fn transport() -> Arc<KubeTransport> {
    let transport = KubeTransport::try_default()
        .await
        .expect("kubeconfig or in-cluster config must be available");
    Arc::new(transport)
}

#[tokio::test]
#[ignore] // Requires running API server
async fn test_watch_namespaces_lists_existing_objects() {
    let model = kinds::lookup("namespaces").expect("namespaces is a well-known kind");
    let mut watcher = Watcher::new(
        transport().await,
        model,
        Filters::new(),
        |ns: Namespace, phase: WatchPhase| -> anyhow::Result<()> {
            println!("{} {}", phase, ns.metadata.name.unwrap_or_default());
            Ok(())
        },
        WatchConfig {
            retry_max: Some(0),
            ..Default::default()
        },
    )
    .expect("Failed to create watcher");

    // A watch without a resource version starts with synthetic ADDED events
    let close = watcher.close_handle();
    watcher.events().subscribe(move |event: &WatchEvent<Namespace>| {
        if event.kind() == WatchEventKind::ResourceVersion {
            close.close();
        }
    });

    tokio::time::timeout(Duration::from_secs(30), watcher.run())
        .await
        .expect("Watch did not deliver an event in time");

    assert!(watcher.resource_version().is_some());
}

#[tokio::test]
#[ignore]
async fn test_expired_resource_version_is_purged() {
    let model = kinds::lookup("Namespace").expect("Namespace is a well-known kind");
    let mut watcher = Watcher::new(
        transport().await,
        model,
        Filters::new(),
        |_: Namespace, _: WatchPhase| -> anyhow::Result<()> { Ok(()) },
        WatchConfig {
            resource_version: Some("1".to_string()),
            retry_delay_sec: 1,
            retry_max: Some(1),
            ..Default::default()
        },
    )
    .expect("Failed to create watcher");

    let close = watcher.close_handle();
    watcher.events().subscribe(move |event: &WatchEvent<Namespace>| {
        if let WatchEvent::OldResourceVersion(previous) = event {
            assert_eq!(previous.as_deref(), Some("1"));
            close.close();
        }
    });

    tokio::time::timeout(Duration::from_secs(30), watcher.run())
        .await
        .expect("Server did not reject the expired resource version");

    assert_ne!(watcher.resource_version(), Some("1"));
}

#[tokio::test]
#[ignore]
async fn test_unknown_resource_reports_api_error() {
    let transport = transport().await;
    let model = kinds::ResourceModel::new("example.invalid", "v1", "Missing", "missings", false);
    let url = watch_client::build_watch_url(transport.server_url(), &model, &Filters::new(), None, false)
        .expect("Failed to build URL");

    match transport.open(url).await {
        Err(WatchError::Api { status, .. }) => assert_eq!(status, 404),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("watch on an unknown resource succeeded"),
    }
}
