//! Integration tests for the facade: configuration flows into the
//! transports and a configured nickname reaches the peer.

use std::time::Duration;

use bluetalk::memory::{MemoryEther, MemoryP2pNetwork, MemoryRadio};
use bluetalk::prelude::*;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

async fn next_message(events: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) -> ChatLine {
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out")
            .expect("observer dropped");
        if let SessionEvent::Message(line) = event {
            return line;
        }
    }
}

#[tokio::test]
async fn test_configured_service_and_nickname_are_used() {
    let service = Uuid::from_u128(0x1234);
    let config = Config::from_toml_str(&format!(
        "nickname = \"alice\"\n[bluetooth]\nservice_uuid = \"{service}\"\n"
    ))
    .unwrap();

    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let (alice_observer, _alice_events) = ChannelObserver::new();
    let (bob_observer, mut bob_events) = ChannelObserver::new();

    let alice = bluetalk::session_manager(
        &config,
        MemoryRadio::new(&ether, Endpoint::new("A")),
        network.join(Endpoint::new("A")),
        alice_observer,
    );
    let bob = bluetalk::session_manager(
        &config,
        MemoryRadio::new(&ether, Endpoint::new("B")),
        network.join(Endpoint::new("B")),
        bob_observer,
    );

    alice.start_listening(TransportKind::Bluetooth).await;
    while !ether.is_listening("A", service) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bob.connect(TransportKind::Bluetooth, Endpoint::new("A")).await;
    let mut state = alice.subscribe_state();
    state
        .wait_for(|s| *s == SessionState::Connected)
        .await
        .unwrap();

    alice.send_as(&config, "hello bob").await;

    let line = next_message(&mut bob_events).await;
    assert_eq!(line.sender_nick.as_deref(), Some("alice"));
    assert_eq!(line.text, "hello bob");
    assert_eq!(line.direction, Direction::Inbound);
}
