//! Lifecycle integration tests.
//!
//! Drives the public `ConnectionManager` API through scripted clients.

use cachelink::client::{ClientEvent, Connector, MockBehavior, MockConnector};
use cachelink::config::ConnectionOptions;
use cachelink::connection::{ConnectionManager, ConnectionState};
use std::sync::Arc;
use std::time::Duration;

fn options() -> ConnectionOptions {
    ConnectionOptions::from_url("redis://cache.test:6379/0").unwrap()
}

fn manager(connector: &Arc<MockConnector>) -> ConnectionManager {
    ConnectionManager::with_connector(options(), Arc::clone(connector) as Arc<dyn Connector>)
}

#[tokio::test]
async fn test_connect_then_quit() {
    let connector = Arc::new(MockConnector::new(MockBehavior::Ready));
    let mut manager = manager(&connector);
    assert!(!manager.is_connected());

    manager.initialize().await.unwrap();
    assert!(manager.is_connected());

    manager.quit();
    assert!(!manager.is_connected());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_failed_connect_reports_connection_error() {
    let connector = Arc::new(MockConnector::new(MockBehavior::Fail(
        "Connection refused (os error 111)".to_string(),
    )));
    let mut manager = manager(&connector);

    let err = manager.initialize().await.unwrap_err();

    assert!(err.is_connection());
    assert_eq!(err.category(), "Connection Error");
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_destroy_from_every_state() {
    let scripts = vec![
        MockBehavior::Ready,
        MockBehavior::Fail("refused".to_string()),
        MockBehavior::Sequence(vec![ClientEvent::Ready, ClientEvent::End]),
    ];

    for script in scripts {
        let connector = Arc::new(MockConnector::new(script.clone()));
        let mut manager = manager(&connector);
        let _ = manager.initialize().await;

        manager.destroy();

        assert!(!manager.is_connected(), "still connected after {script:?}");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}

#[tokio::test]
async fn test_client_only_available_while_ready() {
    let connector = Arc::new(MockConnector::new(MockBehavior::Ready));
    let mut manager = manager(&connector);

    assert!(manager.get_client().err().unwrap().is_state());

    manager.initialize().await.unwrap();
    let client = manager.get_client().unwrap();
    assert_eq!(client.ping().await.unwrap(), "PONG");

    manager.destroy();
    assert!(manager.get_client().err().unwrap().is_state());
    // Handles obtained earlier see the closed link.
    assert!(client.ping().await.is_err());
}

#[tokio::test]
async fn test_caller_imposed_timeout_on_hanging_connect() {
    let connector = Arc::new(MockConnector::new(MockBehavior::Hang));
    let mut manager = manager(&connector);

    let attempt = tokio::time::timeout(Duration::from_millis(50), manager.initialize()).await;

    assert!(attempt.is_err());
    assert!(!manager.is_connected());

    manager.destroy();
    assert_eq!(connector.stats().disconnects(), 1);
}

#[tokio::test]
async fn test_graceful_close_round_trip() {
    let connector = Arc::new(MockConnector::new(MockBehavior::Ready));
    let mut manager = manager(&connector);

    for _ in 0..3 {
        manager.initialize().await.unwrap();
        assert!(manager.is_connected());
        manager.close().await.unwrap();
        assert!(!manager.is_connected());
    }

    let stats = connector.stats();
    assert_eq!(stats.created(), 3);
    assert_eq!(stats.quits(), 3);
}

#[tokio::test]
async fn test_options_are_kept_verbatim() {
    let connector = Arc::new(MockConnector::default());
    let manager = manager(&connector);

    pretty_assertions::assert_eq!(manager.options(), &options());
}
