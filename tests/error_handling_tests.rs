//! Precondition failures: nothing is spawned and nothing is left behind

#![cfg(unix)]

mod common;

use airpanel::{
    NetworkRecord, SessionError, SessionKind, SessionManager, SystemLauncher, TargetKind, TargetSelection,
};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_scan_requires_monitor_mode() {
    let fixture = Fixture::new();
    let launcher = Arc::new(CountingLauncher::default());
    let manager = SessionManager::with_components(
        fixture.config(fixture.writing_scanner()),
        launcher.clone(),
        Arc::new(NeverReady),
    )
    .unwrap();

    let rx = manager.start_scan(Duration::from_millis(100)).await.unwrap();
    let outcome = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();

    match outcome {
        Err(e @ SessionError::ModeNotReady(_)) => assert!(e.is_precondition()),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(launcher.count(), 0);
    assert!(fixture.work_files().is_empty());
}

#[tokio::test]
async fn test_recon_rejects_incomplete_target() {
    let fixture = Fixture::new();
    let launcher = Arc::new(CountingLauncher::default());
    let manager = SessionManager::with_components(
        fixture.config(fixture.silent_scanner()),
        launcher.clone(),
        Arc::new(AlwaysReady),
    )
    .unwrap();

    let no_channel = TargetSelection::new(TargetKind::Recon, None, Some(TARGET_BSSID.to_string()), None);
    let target = manager.select(no_channel).await.unwrap();
    assert!(matches!(
        manager.start_recon(&target).await,
        Err(SessionError::InvalidTarget(_))
    ));

    let flood_target = TargetSelection::new(TargetKind::BeaconFlood, Some("HomeRouter".to_string()), None, None);
    assert!(matches!(
        manager.start_recon(&flood_target).await,
        Err(SessionError::InvalidTarget(_))
    ));

    assert_eq!(launcher.count(), 0);
    assert_eq!(manager.active_session().await, None);
}

#[tokio::test]
async fn test_flood_rejects_hidden_network() {
    let fixture = Fixture::new();
    let launcher = Arc::new(CountingLauncher::default());
    let manager = SessionManager::with_components(
        fixture.config(fixture.silent_scanner()),
        launcher.clone(),
        Arc::new(AlwaysReady),
    )
    .unwrap();

    let hidden = NetworkRecord {
        ssid: String::new(),
        bssid: TARGET_BSSID.to_string(),
        channel: 3,
        signal_dbm: -75,
    };
    let target = manager.select_target(TargetKind::BeaconFlood, &hidden).await.unwrap();

    assert!(matches!(
        manager.start_flood(&target).await,
        Err(SessionError::InvalidTarget(_))
    ));
    assert_eq!(launcher.count(), 0);

    manager.shutdown().await;
    assert!(fixture.work_files().is_empty());
}

#[tokio::test]
async fn test_missing_tool_fails_to_spawn() {
    let fixture = Fixture::new();
    let missing = vec!["/nonexistent/airodump-ng".to_string()];
    let manager = SessionManager::with_components(
        fixture.config(missing),
        Arc::new(SystemLauncher),
        Arc::new(AlwaysReady),
    )
    .unwrap();

    let rx = manager.start_scan(Duration::from_millis(100)).await.unwrap();
    let outcome = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    assert!(matches!(outcome, Err(SessionError::SpawnFailed(_))));
    assert!(fixture.work_files().is_empty());
    assert_eq!(manager.active_session().await, None);
}

#[tokio::test]
async fn test_stop_before_start_is_noop() {
    let fixture = Fixture::new();
    let manager = SessionManager::with_components(
        fixture.config(fixture.silent_scanner()),
        Arc::new(SystemLauncher),
        Arc::new(AlwaysReady),
    )
    .unwrap();

    manager.stop(SessionKind::Scan).await;
    manager.stop(SessionKind::Recon).await;
    manager.stop(SessionKind::Flood).await;
    assert_eq!(manager.active_session().await, None);
}

#[test]
fn test_invalid_config_is_rejected() {
    let fixture = Fixture::new();
    let config = fixture.config(Vec::new());
    assert!(matches!(
        SessionManager::with_components(config, Arc::new(SystemLauncher), Arc::new(AlwaysReady)),
        Err(SessionError::ConfigError(_))
    ));
}
