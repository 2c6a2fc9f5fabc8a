//! Session Store Tests: file persistence across connector instances
//!
//! These tests verify:
//! 1. Records round-trip exactly through the file store
//! 2. Writes are atomic (no temp file left, 0600 on unix)
//! 3. Corrupt files load as "no session"
//! 4. TONLINK_ROOT selects the storage root
//! 5. A connector persists to and restores from a file store

mod common;

use common::*;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tonlink::crypto::{self, KEY_LEN};
use tonlink::store::default_root;
use tonlink::{BridgeSession, ConnectionState, ConnectorConfig, FileSessionStore, SessionStore, WalletConnector};

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner())
}

fn sample_session() -> BridgeSession {
    let keypair = crypto::generate_keypair().expect("keypair");
    let mut session = BridgeSession::pending("https://bridge.test/bridge", &keypair);
    session.wallet_public_key = Some([8u8; KEY_LEN]);
    session.last_event_id = Some("1712345678901".into());
    session.last_wallet_event_id = Some(3);
    session.next_request_id = 7;
    session
}

/// Test: save → load reproduces the same session
#[tokio::test]
async fn file_store_roundtrip() {
    let dir = TempDir::new().expect("tempdir");
    let store = FileSessionStore::in_dir(dir.path(), "chat-1");
    assert_eq!(store.load().await.expect("load"), None);

    let session = sample_session();
    store.save(&session).await.expect("save");
    assert_eq!(store.load().await.expect("load"), Some(session.clone()));

    // Overwrite replaces the record
    let mut updated = session;
    updated.last_event_id = Some("1712345678999".into());
    store.save(&updated).await.expect("save");
    assert_eq!(store.load().await.expect("load"), Some(updated));

    store.clear().await.expect("clear");
    assert_eq!(store.load().await.expect("load"), None);
    // Clearing twice is fine
    store.clear().await.expect("clear again");
}

/// Test: no temp file survives a save; record is owner-only
#[tokio::test]
async fn file_store_atomic_write() {
    let dir = TempDir::new().expect("tempdir");
    let store = FileSessionStore::in_dir(dir.path().join("nested"), "chat-2");
    store.save(&sample_session()).await.expect("save");

    let names: Vec<String> = std::fs::read_dir(dir.path().join("nested"))
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["connection-chat-2.json".to_string()]);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(store.path()).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

/// Test: a truncated record loads as no session
#[tokio::test]
async fn file_store_corrupt_record() {
    let dir = TempDir::new().expect("tempdir");
    let store = FileSessionStore::in_dir(dir.path(), "chat-3");
    store.save(&sample_session()).await.expect("save");

    let raw = std::fs::read(store.path()).expect("read");
    std::fs::write(store.path(), &raw[..raw.len() / 2]).expect("truncate");
    assert_eq!(store.load().await.expect("load"), None);
}

/// Test: TONLINK_ROOT selects the storage root
#[test]
fn storage_root_from_env() {
    let _guard = lock_env();
    let dir = TempDir::new().expect("tempdir");
    std::env::set_var("TONLINK_ROOT", dir.path());

    assert_eq!(default_root(), dir.path());
    let store = FileSessionStore::for_connector("42");
    assert_eq!(store.path(), dir.path().join("sessions").join("connection-42.json"));

    std::env::remove_var("TONLINK_ROOT");
}

/// Test: connector state survives a restart through the file store
#[tokio::test]
async fn connector_restores_from_file() {
    let dir = TempDir::new().expect("tempdir");
    let bridge = MemoryBridge::new();
    let store = FileSessionStore::in_dir(dir.path(), "user-7");
    let wallet = SimulatedWallet::new(bridge.clone());

    let connector = WalletConnector::new(
        ConnectorConfig::new(MANIFEST_URL),
        Arc::new(store.clone()),
        bridge.clone(),
    );
    let link = connector.connect(&test_wallet_manifest()).await.expect("connect");
    wallet.approve(&link).await;
    connector.wait_for_connection().await.expect("connected");
    for _ in 0..500 {
        if store.load().await.expect("load").is_some_and(|s| s.is_paired()) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    drop(connector);

    let restored = WalletConnector::new(
        ConnectorConfig::new(MANIFEST_URL),
        Arc::new(FileSessionStore::in_dir(dir.path(), "user-7")),
        bridge.clone(),
    );
    assert!(restored.restore().await.expect("restore"));
    assert_eq!(restored.state(), ConnectionState::Connected);
    assert_eq!(restored.account().expect("account").address, WALLET_ADDRESS);
}
