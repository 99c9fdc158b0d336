//! Registry routing and open/close bookkeeping

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use tether_core::config::{ConnectionConfig, ConnectionProfile};
use tether_core::secrets::MemorySecretStore;
use tether_core::{AuthMethod, Credential, ErrorCode, SessionId, SessionState};
use tether_ssh::{AuthMethods, EngineError};

use common::{connection_id, password_config, refused, registry, MockConnector, Step};

#[tokio::test]
async fn test_open_registers_connected_session() {
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector.clone());

    let id = registry.open(connection_id(), password_config()).await.unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.ids(), vec![id]);
    assert_eq!(registry.state(id), SessionState::Connected);
    assert_eq!(registry.get(id).unwrap().config().username, "bob");
}

#[tokio::test]
async fn test_rejected_credentials_fail_open() {
    let connector = Arc::new(MockConnector::rejecting());
    let registry = registry(connector.clone());

    let err = registry
        .open(connection_id(), password_config())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::AuthFailed);
    assert!(registry.is_empty());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_unsupported_method_fails_auth() {
    let connector = Arc::new(MockConnector::accepting_methods(AuthMethods::PUBLIC_KEY));
    let registry = registry(connector);

    let err = registry
        .open(connection_id(), password_config())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::AuthFailed);
}

#[tokio::test]
async fn test_missing_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector);

    let config = ConnectionConfig::new(
        "10.0.0.5",
        22,
        "bob",
        Credential::PrivateKey {
            path: dir.path().join("id_ed25519"),
            passphrase: None,
        },
    );
    let err = registry.open(connection_id(), config).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::KeyNotFound);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_transport_failure_is_not_stored() {
    let connector = Arc::new(MockConnector::new().then(Step::Fail(refused())));
    let registry = registry(connector);

    let err = registry
        .open(connection_id(), password_config())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::ConnectionRefused);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_open_profile_resolves_password() {
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector);

    let profile = ConnectionProfile::new("web", "10.0.0.5", "bob");
    let secrets = MemorySecretStore::new();
    secrets.set_password(profile.id, "hunter2");

    let id = registry.open_profile(&profile, &secrets).await.unwrap();

    let session = registry.get(id).unwrap();
    assert_eq!(session.connection_id(), profile.id);
    assert_eq!(
        session.config().credential,
        Credential::Password("hunter2".to_string())
    );
}

#[tokio::test]
async fn test_open_profile_without_secret() {
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector.clone());
    let secrets = MemorySecretStore::new();

    let profile = ConnectionProfile::new("web", "10.0.0.5", "bob");
    let err = registry.open_profile(&profile, &secrets).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthFailed);
    assert_eq!(err.message, "No password stored for this connection");

    let mut profile = ConnectionProfile::new("db", "10.0.0.6", "bob");
    profile.auth_method = AuthMethod::PublicKey;
    let err = registry.open_profile(&profile, &secrets).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::KeyNotFound);

    assert_eq!(connector.attempts(), 0);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_open_profile_with_missing_key_file() {
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector);
    let secrets = MemorySecretStore::new();

    let mut profile = ConnectionProfile::new("db", "10.0.0.6", "bob");
    profile.auth_method = AuthMethod::PublicKey;
    profile.key_path = Some(PathBuf::from("/nonexistent/tether/id_ed25519"));

    let err = registry.open_profile(&profile, &secrets).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::KeyNotFound);
}

#[tokio::test]
async fn test_write_routes_in_order() {
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector.clone());
    let first = registry.open(connection_id(), password_config()).await.unwrap();
    let second = registry.open(connection_id(), password_config()).await.unwrap();

    registry.write(first, "echo ").await.unwrap();
    registry.write(second, "pwd\n").await.unwrap();
    registry.write(first, "hi\n").await.unwrap();

    assert_eq!(
        connector.channel(0).writes(),
        vec![Bytes::from("echo "), Bytes::from("hi\n")]
    );
    assert_eq!(connector.channel(1).writes(), vec![Bytes::from("pwd\n")]);
}

#[tokio::test]
async fn test_unknown_session_routing() {
    let registry = registry(Arc::new(MockConnector::new()));
    let unknown = SessionId::new();

    let err = registry.write(unknown, "ls\n").await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(id) if id == unknown));

    registry.resize(unknown, 100, 40).await.unwrap();
    registry.reconnect(unknown).await.unwrap();
    registry.close(unknown).await;

    assert_eq!(registry.state(unknown), SessionState::Disconnected);
    assert!(registry.output_stream(unknown).is_none());
    assert!(registry.subscribe(unknown).is_none());
}

#[tokio::test]
async fn test_resize_routing() {
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector.clone());
    let id = registry.open(connection_id(), password_config()).await.unwrap();

    registry.resize(id, 0, 24).await.unwrap();
    assert!(connector.last_channel().resizes().is_empty());

    registry.resize(id, 100, 40).await.unwrap();
    let resizes = connector.last_channel().resizes();
    assert_eq!(resizes.len(), 1);
    assert_eq!((resizes[0].cols, resizes[0].rows), (100, 40));
}

#[tokio::test]
async fn test_close_removes_session() {
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector.clone());
    let id = registry.open(connection_id(), password_config()).await.unwrap();
    let session = registry.get(id).unwrap();
    let mut output = registry.output_stream(id).unwrap();

    registry.close(id).await;

    assert!(registry.get(id).is_none());
    assert!(registry.is_empty());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(output.next_chunk().await, None);
    assert!(connector.last_channel().is_closed());

    registry.close(id).await;
}

#[tokio::test]
async fn test_close_all() {
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector.clone());
    for _ in 0..3 {
        registry.open(connection_id(), password_config()).await.unwrap();
    }

    registry.close_all().await;

    assert!(registry.is_empty());
    for n in 0..3 {
        assert!(connector.channel(n).is_closed());
    }
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_reconnect_failure() {
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector.clone());
    let id = registry.open(connection_id(), password_config()).await.unwrap();
    let mut states = registry.subscribe(id).unwrap();
    states.borrow_and_update();

    connector.push_step(Step::Fail(refused()));
    let err = registry.reconnect(id).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::ConnectionRefused);
    assert!(states.has_changed().unwrap());
    assert!(matches!(
        &*states.borrow_and_update(),
        SessionState::Failed(e) if e.code == ErrorCode::ConnectionRefused
    ));

    registry.reconnect(id).await.unwrap();
    assert_eq!(registry.state(id), SessionState::Connected);
}

#[tokio::test]
async fn test_remote_close_is_visible_through_registry() {
    let connector = Arc::new(MockConnector::new());
    let registry = registry(connector.clone());
    let id = registry.open(connection_id(), password_config()).await.unwrap();

    connector.last_sink().channel_inactive();

    assert_eq!(registry.state(id), SessionState::Disconnected);
    let err = registry.write(id, "ls\n").await.unwrap_err();
    assert!(matches!(err, EngineError::NotConnected));
}
