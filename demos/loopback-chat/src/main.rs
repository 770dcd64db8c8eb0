//! Two BlueTalk peers, "alice" and "bob", chatting inside one process.
//!
//! The first round goes over the in-process Bluetooth radio, the second
//! over a simulated Wi-Fi Direct group with real loopback TCP. Every
//! observer event is printed to stdout as one JSON object per line.
//!
//! ```text
//! RUST_LOG=debug cargo run -p loopback-chat
//! ```

use std::time::Duration;

use bluetalk::memory::{MemoryEther, MemoryP2pNetwork, MemoryRadio};
use bluetalk::prelude::*;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

const ALICE: &str = "00:1a:7d:da:71:01";
const BOB: &str = "00:1a:7d:da:71:02";

#[tokio::main]
async fn main() -> Result<(), BluetalkError> {
    let config = Config::load()?;
    bluetalk::logging::init(&config.log_filter);

    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();

    let (alice_observer, alice_events) = ChannelObserver::new();
    let (bob_observer, bob_events) = ChannelObserver::new();
    let alice = bluetalk::session_manager(
        &config,
        MemoryRadio::new(&ether, Endpoint::new(ALICE).with_label("alice")),
        network.join(Endpoint::new(ALICE).with_label("alice")),
        alice_observer,
    );
    let bob = bluetalk::session_manager(
        &config,
        MemoryRadio::new(&ether, Endpoint::new(BOB).with_label("bob")),
        network.join(Endpoint::new(BOB).with_label("bob")),
        bob_observer,
    );
    let printers = [
        tokio::spawn(print_events("alice", alice_events)),
        tokio::spawn(print_events("bob", bob_events)),
    ];

    // Round one: Bluetooth. Alice waits, Bob picks her from his paired list.
    bob.bluetooth()
        .radio()
        .pair(Endpoint::new(ALICE).with_label("alice"));
    alice.start_listening(TransportKind::Bluetooth).await;
    settle().await;

    let target = bob
        .paired_devices()
        .await?
        .into_iter()
        .next()
        .unwrap_or_else(|| Endpoint::new(ALICE));
    bob.connect(TransportKind::Bluetooth, target).await;
    wait_connected(&alice).await;
    wait_connected(&bob).await;

    bob.send_text("bob", "hi alice, over Bluetooth").await;
    alice.send_text("alice", "hi bob!").await;
    settle().await;

    // Round two: Wi-Fi Direct. Starting a new session closes the old one.
    alice.start_listening(TransportKind::DirectWifi).await;
    bob.discover_peers().await;
    settle().await;

    bob.connect(TransportKind::DirectWifi, Endpoint::new(ALICE)).await;
    wait_connected(&alice).await;
    wait_connected(&bob).await;

    bob.send_text("bob", "same chat, now over Wi-Fi Direct").await;
    alice.send_text("alice", "loud and clear").await;
    settle().await;

    network.dissolve_group();
    settle().await;

    alice.stop().await;
    bob.stop().await;
    drop((alice, bob));
    for printer in printers {
        let _ = printer.await;
    }
    Ok(())
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(250)).await;
}

async fn wait_connected<R, P>(session: &SessionManager<R, P>)
where
    R: bluetalk::Radio,
    P: bluetalk::P2pPlatform,
{
    let mut state = session.subscribe_state();
    if state
        .wait_for(|s| *s == SessionState::Connected)
        .await
        .is_err()
    {
        tracing::warn!("session manager went away before connecting");
    }
}

async fn print_events(device: &'static str, mut events: UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        let line = match event {
            SessionEvent::Status(status) => json!({
                "device": device,
                "status": status.to_string(),
            }),
            SessionEvent::Message(message) => json!({
                "device": device,
                "message": message,
            }),
            SessionEvent::Peers(peers) => json!({
                "device": device,
                "peers": peers,
            }),
        };
        println!("{line}");
    }
}
