use crate::support::{allow_all, attach_builtin, shell_runner};
use hostwarden::agent::RecordingTransport;
use hostwarden::auth::CallerContext;
use hostwarden::property::PropertyValue;
use std::time::Duration;
use tempfile::TempDir;

const HOST: &str = "org.hostwarden.Host";

fn sequences(transport: &RecordingTransport) -> Vec<u32> {
    transport
        .events()
        .iter()
        .filter_map(|e| e.heartbeat_sequence())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn heartbeat_sequence_survives_failures_and_interval_changes() {
    let temp = TempDir::new().unwrap();
    let (dispatcher, transport) =
        attach_builtin("host", shell_runner(temp.path(), "echo x"), allow_all());
    dispatcher.start().await.unwrap();

    // Fires at t=0, 5 and 10 on the default interval.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(sequences(&transport), vec![0, 1, 2]);

    let caller = CallerContext::new(":1.3");
    dispatcher
        .handle_set(HOST, "update_interval", PropertyValue::UInt(2), &caller)
        .await
        .unwrap();
    assert_eq!(
        transport.property_changes(),
        vec![(HOST.to_string(), vec!["update_interval".to_string()])]
    );
    let err = dispatcher
        .handle_set(HOST, "update_interval", PropertyValue::UInt(0), &caller)
        .await
        .unwrap_err();
    assert_eq!(err.code(), hostwarden::error::ResultCode::InvalidArgs);

    // The pending 5s timer still fires at t=15 (and fails), then every 2s.
    transport.fail_next_emits(1);
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(sequences(&transport), vec![0, 1, 2, 4, 5]);
    assert_eq!(
        dispatcher.handle_get(HOST, "sequence", &caller).await.unwrap(),
        PropertyValue::UInt(6)
    );

    dispatcher.shutdown().await;
    let emitted = transport.events().len();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.events().len(), emitted);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_carries_identity() {
    let temp = TempDir::new().unwrap();
    let (dispatcher, transport) =
        attach_builtin("host", shell_runner(temp.path(), "echo x"), allow_all());
    dispatcher.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let events = transport.events_named("heartbeat");
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].args[0], PropertyValue::Int64(ns) if ns > 0));
    assert_eq!(events[0].args[2].as_str(), Some("itest-host"));
    assert_eq!(
        events[0].args[3].as_str(),
        Some("5f0c9a3e-1111-4a2b-9c3d-000000000001")
    );
    dispatcher.shutdown().await;
}
