//! End-to-end session tests: two managers talking over the in-process
//! radio (Bluetooth) or over loopback TCP inside a simulated group
//! (Direct-Wi-Fi).

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bluetalk_protocol::{ChatLine, Direction};
use bluetalk_session::{
    ChannelObserver, SessionError, SessionEvent, SessionManager, SessionState,
    Status,
};
use bluetalk_transport::memory::{MemoryEther, MemoryP2p, MemoryP2pNetwork, MemoryRadio};
use bluetalk_transport::{
    BluetoothConfig, BluetoothTransport, Endpoint, GroupRole, Radio,
    RadioListener, TransportError, TransportKind, WifiDirectConfig,
    WifiDirectState, WifiDirectTransport, SERVICE_UUID,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::UnboundedReceiver;

const ALICE: &str = "aa:00:00:00:00:01";
const BOB: &str = "bb:00:00:00:00:02";
const WAIT: Duration = Duration::from_secs(5);

type Manager = SessionManager<MemoryRadio, MemoryP2p>;

struct Device {
    manager: Manager,
    events: UnboundedReceiver<SessionEvent>,
}

fn device(ether: &MemoryEther, network: &MemoryP2pNetwork, address: &str, port: u16) -> Device {
    let bluetooth = BluetoothTransport::new(
        MemoryRadio::new(ether, Endpoint::new(address)),
        BluetoothConfig::default(),
    );
    let wifi = WifiDirectTransport::new(
        network.join(Endpoint::new(address)),
        WifiDirectConfig { port },
    );
    let (observer, events) = ChannelObserver::new();
    Device {
        manager: SessionManager::new(bluetooth, wifi, observer),
        events,
    }
}

impl Device {
    async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("observer channel closed")
    }

    /// Skips events until a status matching `pred` arrives.
    async fn wait_for_status(&mut self, pred: impl Fn(&Status) -> bool) -> Status {
        loop {
            if let SessionEvent::Status(status) = self.next_event().await {
                if pred(&status) {
                    return status;
                }
            }
        }
    }

    /// Skips statuses until the next chat line arrives.
    async fn next_message(&mut self) -> ChatLine {
        loop {
            if let SessionEvent::Message(line) = self.next_event().await {
                return line;
            }
        }
    }

    async fn wait_connected(&mut self) {
        self.wait_for_status(|s| matches!(s, Status::Connected { .. }))
            .await;
    }
}

/// Statuses already delivered, without waiting for more.
fn drain_statuses(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<Status> {
    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Status(status) = event {
            statuses.push(status);
        }
    }
    statuses
}

fn is_disconnected(status: &Status) -> bool {
    matches!(status, Status::Disconnected { .. })
}

/// Alice listens on Bluetooth, Bob connects; both see `Connected`.
async fn bluetooth_pair() -> (Device, Device) {
    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let mut alice = device(&ether, &network, ALICE, 0);
    let mut bob = device(&ether, &network, BOB, 0);

    alice.manager.start_listening(TransportKind::Bluetooth).await;
    while !ether.is_listening(ALICE, SERVICE_UUID) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bob.manager
        .connect(TransportKind::Bluetooth, Endpoint::new(ALICE))
        .await;

    alice.wait_connected().await;
    bob.wait_connected().await;
    (alice, bob)
}

#[tokio::test]
async fn test_send_text_without_link_reports_not_connected() {
    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let mut alice = device(&ether, &network, ALICE, 0);

    alice.manager.send_text("alice", "hello?").await;

    let status = alice.wait_for_status(|_| true).await;
    assert_eq!(status, Status::Failed(SessionError::NotConnected));
    assert_eq!(alice.manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_inbound_lines_arrive_in_order() {
    let (mut alice, bob) = bluetooth_pair().await;

    for text in ["A", "B", "C"] {
        bob.manager.send_text("bob", text).await;
    }

    for expected in ["A", "B", "C"] {
        let line = alice.next_message().await;
        assert_eq!(line.text, expected);
        assert_eq!(line.sender_nick.as_deref(), Some("bob"));
        assert_eq!(line.direction, Direction::Inbound);
    }
}

#[tokio::test]
async fn test_send_text_echoes_outbound_line() {
    let (_alice, mut bob) = bluetooth_pair().await;

    bob.manager.send_text("bob", "hi there").await;

    let echo = bob.next_message().await;
    assert_eq!(echo.direction, Direction::Outbound);
    assert_eq!(echo.text, "hi there");
    assert_eq!(echo.sender_nick.as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_send_as_uses_credential_store_nickname() {
    let (mut alice, bob) = bluetooth_pair().await;

    bob.manager.send_as("bobby", "from the store").await;

    let line = alice.next_message().await;
    assert_eq!(line.sender_nick.as_deref(), Some("bobby"));
    assert_eq!(line.text, "from the store");
}

#[tokio::test]
async fn test_send_text_with_invalid_nick_reports_invalid_message() {
    let (_alice, mut bob) = bluetooth_pair().await;

    bob.manager.send_text("b::ob", "hi").await;

    let status = bob
        .wait_for_status(|s| matches!(s, Status::Failed(_)))
        .await;
    assert!(matches!(
        status,
        Status::Failed(SessionError::InvalidMessage(_))
    ));
    assert_eq!(bob.manager.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_remote_close_reports_exactly_one_disconnect() {
    let (mut alice, bob) = bluetooth_pair().await;

    bob.manager.stop().await;

    alice.wait_for_status(is_disconnected).await;
    let mut state = alice.manager.subscribe_state();
    state.wait_for(|s| *s == SessionState::Idle).await.unwrap();

    let again = tokio::time::timeout(
        Duration::from_millis(200),
        alice.wait_for_status(is_disconnected),
    )
    .await;
    assert!(again.is_err(), "disconnect must be reported once");
    assert!(alice.events.try_recv().is_err(), "no events after disconnect");
}

#[tokio::test]
async fn test_replacing_session_closes_old_link_first() {
    let (mut alice, mut bob) = bluetooth_pair().await;

    alice.manager.start_listening(TransportKind::Bluetooth).await;

    // Old session is reported closed before the new one starts.
    let first = alice
        .wait_for_status(|s| is_disconnected(s) || matches!(s, Status::Listening { .. }))
        .await;
    assert!(is_disconnected(&first));
    alice
        .wait_for_status(|s| matches!(s, Status::Listening { .. }))
        .await;
    assert_eq!(alice.manager.state(), SessionState::Listening);

    // The peer sees its link drop.
    bob.wait_for_status(is_disconnected).await;
}

#[tokio::test]
async fn test_listen_without_adapter_reports_unavailable() {
    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let mut alice = device(&ether, &network, ALICE, 0);
    alice.manager.bluetooth().radio().set_present(false);

    alice.manager.start_listening(TransportKind::Bluetooth).await;

    let status = alice
        .wait_for_status(|s| matches!(s, Status::Failed(_)))
        .await;
    assert!(matches!(
        status,
        Status::Failed(SessionError::TransportUnavailable(_))
    ));
    let mut state = alice.manager.subscribe_state();
    state.wait_for(|s| *s == SessionState::Idle).await.unwrap();
}

#[tokio::test]
async fn test_stop_on_idle_manager_reports_nothing() {
    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let mut alice = device(&ether, &network, ALICE, 0);

    alice.manager.stop().await;
    alice.manager.stop().await;

    assert!(alice.events.try_recv().is_err());
    assert_eq!(alice.manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_stop_cancels_pending_listen() {
    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let mut alice = device(&ether, &network, ALICE, 0);

    alice.manager.start_listening(TransportKind::Bluetooth).await;
    while !ether.is_listening(ALICE, SERVICE_UUID) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    alice.manager.stop().await;

    assert!(!ether.is_listening(ALICE, SERVICE_UUID));
    alice.wait_for_status(|s| *s == Status::Stopped).await;
    assert_eq!(alice.manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_paired_devices_come_from_radio() {
    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let alice = device(&ether, &network, ALICE, 0);
    alice
        .manager
        .bluetooth()
        .radio()
        .pair(Endpoint::new(BOB).with_label("Bob's phone"));

    let devices = alice.manager.paired_devices().await.unwrap();
    assert_eq!(devices, vec![Endpoint::new(BOB).with_label("Bob's phone")]);
}

#[tokio::test]
async fn test_discover_peers_with_nobody_around_reports_no_peers() {
    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let mut alice = device(&ether, &network, ALICE, 0);

    alice.manager.discover_peers().await;

    match alice.next_event().await {
        SessionEvent::Peers(peers) => assert!(peers.is_empty()),
        other => panic!("expected a peer snapshot, got {other:?}"),
    }
    alice.wait_for_status(|s| *s == Status::NoPeers).await;
}

#[tokio::test]
async fn test_wifi_direct_session_assigns_roles_and_chats() {
    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let mut alice = device(&ether, &network, ALICE, 19891);
    let mut bob = device(&ether, &network, BOB, 19891);

    alice.manager.start_listening(TransportKind::DirectWifi).await;
    let mut wifi_state = alice.manager.wifi_direct().subscribe_state();
    wifi_state
        .wait_for(|s| *s == WifiDirectState::Negotiating)
        .await
        .unwrap();

    bob.manager
        .connect(TransportKind::DirectWifi, Endpoint::new(ALICE))
        .await;

    // ALICE sorts first, so the platform makes her the group host.
    alice
        .wait_for_status(|s| *s == Status::RoleAssigned { role: GroupRole::Host })
        .await;
    bob.wait_for_status(|s| *s == Status::RoleAssigned { role: GroupRole::Client })
        .await;
    alice.wait_connected().await;
    bob.wait_connected().await;

    bob.manager.send_text("bob", "over wifi").await;
    let line = alice.next_message().await;
    assert_eq!(line.text, "over wifi");

    network.dissolve_group();
    alice.wait_for_status(is_disconnected).await;
    bob.wait_for_status(is_disconnected).await;
}

// ---------------------------------------------------------------------------
// A radio whose link never reads and refuses every write
// ---------------------------------------------------------------------------

struct DeadStream;

impl AsyncRead for DeadStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for DeadStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "radio link dropped",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct DeadRadio;

struct DeadListener;

impl RadioListener for DeadListener {
    type Stream = DeadStream;

    async fn accept(&mut self) -> Result<(DeadStream, Endpoint), TransportError> {
        Ok((DeadStream, Endpoint::new(BOB)))
    }
}

impl Radio for DeadRadio {
    type Stream = DeadStream;
    type Listener = DeadListener;

    async fn is_present(&self) -> bool {
        true
    }

    async fn is_authorized(&self) -> bool {
        true
    }

    async fn paired_devices(&self) -> Result<Vec<Endpoint>, TransportError> {
        Ok(Vec::new())
    }

    async fn cancel_discovery(&self) {}

    async fn listen(&self, _config: &BluetoothConfig) -> Result<DeadListener, TransportError> {
        Ok(DeadListener)
    }

    async fn connect(
        &self,
        _target: &Endpoint,
        _config: &BluetoothConfig,
    ) -> Result<DeadStream, TransportError> {
        Ok(DeadStream)
    }
}

#[tokio::test]
async fn test_send_failure_reports_single_disconnect_with_reason() {
    let network = MemoryP2pNetwork::new();
    let (observer, mut events) = ChannelObserver::new();
    let manager = SessionManager::new(
        BluetoothTransport::new(DeadRadio, BluetoothConfig::default()),
        WifiDirectTransport::new(
            network.join(Endpoint::new(ALICE)),
            WifiDirectConfig { port: 0 },
        ),
        observer,
    );

    manager
        .connect(TransportKind::Bluetooth, Endpoint::new(BOB))
        .await;
    let mut state = manager.subscribe_state();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == SessionState::Connected))
        .await
        .expect("never connected")
        .unwrap();

    manager.send_text("alice", "anyone there?").await;
    assert_eq!(manager.state(), SessionState::Idle);

    let after_connect: Vec<Status> = drain_statuses(&mut events)
        .into_iter()
        .skip_while(|s| !matches!(s, Status::Connected { .. }))
        .skip(1)
        .collect();
    assert_eq!(after_connect.len(), 1, "got {after_connect:?}");
    assert!(matches!(
        &after_connect[0],
        Status::Disconnected {
            kind: TransportKind::Bluetooth,
            reason: Some(_)
        }
    ));
}

#[tokio::test]
async fn test_send_text_whitespace_only_is_ignored_and_text_is_trimmed() {
    let (mut alice, mut bob) = bluetooth_pair().await;

    bob.manager.send_text("bob", "   \t ").await;
    bob.manager.send_text("bob", "  hi  ").await;

    let line = alice.next_message().await;
    assert_eq!(line.text, "hi");
    let echo = bob.next_message().await;
    assert_eq!(echo.text, "hi");
    assert_eq!(bob.manager.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_stop_with_bluetooth_session_also_ends_wifi_discovery() {
    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let mut alice = device(&ether, &network, ALICE, 0);
    let _bob = device(&ether, &network, BOB, 0);

    alice.manager.discover_peers().await;
    let mut wifi_state = alice.manager.wifi_direct().subscribe_state();
    tokio::time::timeout(
        WAIT,
        wifi_state.wait_for(|s| *s == WifiDirectState::PeerFound),
    )
    .await
    .expect("peer never found")
    .unwrap();

    alice.manager.start_listening(TransportKind::Bluetooth).await;
    alice.manager.stop().await;

    assert_eq!(alice.manager.wifi_direct().state(), WifiDirectState::Idle);
    assert!(!ether.is_listening(ALICE, SERVICE_UUID));
    alice.wait_for_status(|s| *s == Status::Stopped).await;
    assert_eq!(alice.manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_discover_peers_without_permission_reports_permission_denied() {
    let ether = MemoryEther::new();
    let network = MemoryP2pNetwork::new();
    let mut alice = device(&ether, &network, ALICE, 0);
    let _bob = device(&ether, &network, BOB, 0);
    alice.manager.wifi_direct().platform().set_authorized(false);

    alice.manager.discover_peers().await;

    let status = alice.wait_for_status(|_| true).await;
    assert!(matches!(status, Status::Failed(SessionError::PermissionDenied(_))));
    assert_eq!(alice.manager.state(), SessionState::Idle);
    assert_eq!(alice.manager.wifi_direct().state(), WifiDirectState::Idle);

    // Not fatal: once access is granted, discovery works.
    alice.manager.wifi_direct().platform().set_authorized(true);
    alice.manager.discover_peers().await;
    match alice.next_event().await {
        SessionEvent::Peers(peers) => assert_eq!(peers, vec![Endpoint::new(BOB)]),
        other => panic!("expected a peer snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stop_during_wifi_negotiation_returns_to_idle() {
    let ether = MemoryEther::new();
    // Bob sorts second, so he is the client and hears about the group late.
    let network = MemoryP2pNetwork::new().with_client_notify_delay(Duration::from_secs(30));
    let _alice = device(&ether, &network, ALICE, 19893);
    let mut bob = device(&ether, &network, BOB, 19893);

    bob.manager
        .connect(TransportKind::DirectWifi, Endpoint::new(ALICE))
        .await;
    assert_eq!(bob.manager.state(), SessionState::Negotiating);
    let mut wifi_state = bob.manager.wifi_direct().subscribe_state();
    tokio::time::timeout(
        WAIT,
        wifi_state.wait_for(|s| *s == WifiDirectState::Negotiating),
    )
    .await
    .expect("negotiation never started")
    .unwrap();

    bob.manager.stop().await;

    assert_eq!(bob.manager.state(), SessionState::Idle);
    assert_eq!(bob.manager.wifi_direct().state(), WifiDirectState::Idle);
    let statuses = drain_statuses(&mut bob.events);
    assert_eq!(statuses.last(), Some(&Status::Stopped));
    assert!(
        !statuses.iter().any(|s| matches!(s, Status::Connected { .. } | Status::Disconnected { .. })),
        "got {statuses:?}"
    );
}
