//! Device client against a live ingestion server.

use std::time::Duration;

use faralite_core::{BrokerEvent, OverflowPolicy, SendStatus};
use faralite_device::{
    ClientStatus, DeviceClient, DeviceClientConfig, EventFactory, ReconnectPolicy,
};
use faralite_server::{IngestionServer, ServerConfig};
use tokio::sync::broadcast;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

fn client_config(url: String, auth_token: Option<String>) -> DeviceClientConfig {
    DeviceClientConfig {
        server_url: url,
        auth_token,
        queue_capacity: 16,
        overflow_policy: OverflowPolicy::DropOldest,
        reconnect: ReconnectPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(100),
        },
    }
}

async fn wait_for(
    status: &mut broadcast::Receiver<ClientStatus>,
    want: fn(&ClientStatus) -> bool,
) -> ClientStatus {
    timeout(TIMEOUT, async {
        loop {
            match status.recv().await {
                Ok(s) if want(&s) => return s,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("status channel closed"),
            }
        }
    })
    .await
    .expect("status timeout")
}

async fn next_access(rx: &mut broadcast::Receiver<BrokerEvent>) -> faralite_core::AccessEvent {
    timeout(TIMEOUT, async {
        loop {
            if let BrokerEvent::Access(ev) = rx.recv().await.unwrap() {
                return ev;
            }
        }
    })
    .await
    .expect("event timeout")
}

#[tokio::test]
async fn simulated_device_reaches_broker() {
    let server = IngestionServer::new(ServerConfig::default());
    let (addr, _handle) = server.listen().await.unwrap();
    let mut events = server.subscribe();

    let client = DeviceClient::spawn(client_config(format!("ws://{addr}"), None));
    let mut status = client.subscribe_status();
    if !client.is_connected() {
        let _ = wait_for(&mut status, |s| matches!(s, ClientStatus::Connected)).await;
    }

    let mut factory = EventFactory::seeded("SIM1", "7", 3);
    let event = factory.event_for_card("4242").unwrap();
    assert_eq!(client.send_event(&event), SendStatus::Queued);

    let received = next_access(&mut events).await;
    assert_eq!(received.device_serial, "SIM1");
    assert_eq!(received.card_number, "4242");
    assert_eq!(received.extra("site_code"), Some(&serde_json::json!("7")));
    assert!(server.online_devices().iter().any(|d| d.as_str() == "SIM1"));

    client.shutdown().await;
    let _ = server.shutdown(TIMEOUT).await;
}

#[tokio::test]
async fn client_reports_disconnect_when_broker_stops() {
    let server = IngestionServer::new(ServerConfig::default());
    let (addr, _handle) = server.listen().await.unwrap();

    let client = DeviceClient::spawn(client_config(format!("ws://{addr}"), None));
    let mut status = client.subscribe_status();
    if !client.is_connected() {
        let _ = wait_for(&mut status, |s| matches!(s, ClientStatus::Connected)).await;
    }

    assert!(server.shutdown(TIMEOUT).await);
    let _ = wait_for(&mut status, |s| matches!(s, ClientStatus::Disconnected { .. })).await;
    let gave_up = wait_for(&mut status, |s| matches!(s, ClientStatus::GaveUp { .. })).await;
    assert_eq!(gave_up, ClientStatus::GaveUp { attempts: 3 });
}

#[tokio::test]
async fn token_is_sent_as_bearer() {
    let server = IngestionServer::new(ServerConfig {
        auth_token: Some("s3cret".into()),
        ..ServerConfig::default()
    });
    let (addr, _handle) = server.listen().await.unwrap();

    let client = DeviceClient::spawn(client_config(
        format!("ws://{addr}/ws"),
        Some("s3cret".into()),
    ));
    let mut status = client.subscribe_status();
    if !client.is_connected() {
        let _ = wait_for(&mut status, |s| matches!(s, ClientStatus::Connected)).await;
    }
    client.shutdown().await;
}
