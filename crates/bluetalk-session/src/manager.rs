//! The session manager: owns the one active link, if any.
//!
//! Every lifecycle transition goes through a single slot guarded by an
//! async mutex. Starting a session tears the previous one down inside the
//! same critical section, so there is never more than one link open and
//! the old link is closed before the new one's read loop can start.
//!
//! # Tasks
//!
//! Each session runs on one spawned task: it waits on the transport's
//! `listen`/`connect`, then reads lines until the link ends. Tearing a
//! session down closes the link and aborts that task; dropping the
//! pending transport future is what cancels an in-flight accept or dial.
//!
//! ```text
//! start_listening / connect ──→ [task] establish ──→ read loop ──┐
//!        ▲                                                       │
//!        └──── teardown (close link, abort task, stop transport) ┘
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use bluetalk_protocol::{encode, ChatLine};
use bluetalk_transport::{
    BluetoothTransport, Endpoint, GroupRole, Link, P2pPlatform, Radio,
    Transport, TransportError, TransportKind, WifiDirectState,
    WifiDirectTransport,
};
use futures_util::StreamExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::{CredentialStore, SessionError, SessionObserver, SessionState, Status};

/// How a session gets its link.
#[derive(Debug, Clone)]
enum Mode {
    Listen,
    Connect(Endpoint),
}

/// The single active session, if any.
#[derive(Default)]
struct Slot {
    /// Bumped for every new session; tasks of older sessions see a
    /// mismatch and leave the slot alone.
    generation: u64,
    /// `Some` while a session is active.
    kind: Option<TransportKind>,
    link: Option<Arc<Link>>,
    task: Option<JoinHandle<()>>,
}

struct Inner<R: Radio, P: P2pPlatform> {
    bluetooth: BluetoothTransport<R>,
    wifi: WifiDirectTransport<P>,
    observer: Arc<dyn SessionObserver>,
    slot: Mutex<Slot>,
    state: watch::Sender<SessionState>,
    discovery: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Runs at most one chat session over either transport.
///
/// Cloning is cheap and every clone drives the same session.
///
/// Failures never surface as `Err`: each one becomes exactly one
/// [`Status::Failed`] (or [`Status::Disconnected`]) on the observer, and
/// the manager returns to [`SessionState::Idle`]. Nothing is retried.
pub struct SessionManager<R: Radio, P: P2pPlatform> {
    inner: Arc<Inner<R, P>>,
}

impl<R: Radio, P: P2pPlatform> Clone for SessionManager<R, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Radio, P: P2pPlatform> SessionManager<R, P> {
    /// Creates an idle manager over the two transports.
    pub fn new<O: SessionObserver>(
        bluetooth: BluetoothTransport<R>,
        wifi: WifiDirectTransport<P>,
        observer: O,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                bluetooth,
                wifi,
                observer: Arc::new(observer),
                slot: Mutex::new(Slot::default()),
                state: watch::Sender::new(SessionState::Idle),
                discovery: std::sync::Mutex::new(None),
            }),
        }
    }

    /// The current session state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The Bluetooth transport.
    pub fn bluetooth(&self) -> &BluetoothTransport<R> {
        &self.inner.bluetooth
    }

    /// The Direct-Wi-Fi transport.
    pub fn wifi_direct(&self) -> &WifiDirectTransport<P> {
        &self.inner.wifi
    }

    /// Waits for one peer on `kind`, replacing any current session.
    pub async fn start_listening(&self, kind: TransportKind) {
        self.start(kind, Mode::Listen).await;
    }

    /// Connects to `target` on `kind`, replacing any current session.
    ///
    /// For Direct-Wi-Fi this asks the platform to form a group; the side
    /// the platform names Host then listens and the other side dials.
    pub async fn connect(&self, kind: TransportKind, target: Endpoint) {
        self.start(kind, Mode::Connect(target)).await;
    }

    /// Frames `text` under `nick` and writes it to the active link.
    ///
    /// Surrounding whitespace is trimmed and blank text is ignored. Without
    /// a link this reports [`SessionError::NotConnected`] and changes
    /// nothing. A write failure tears the session down and is reported as
    /// its one [`Status::Disconnected`]. On success the sent line is echoed
    /// back to the observer as an outbound [`ChatLine`].
    pub async fn send_text(&self, nick: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let (generation, link) = {
            let slot = self.inner.slot.lock().await;
            (slot.generation, slot.link.clone())
        };
        let Some(link) = link else {
            tracing::debug!("send without an active link");
            self.inner.report(SessionError::NotConnected.into());
            return;
        };

        let bytes = match encode(nick, text) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.inner.report(SessionError::from(e).into());
                return;
            }
        };

        match link.send(&bytes).await {
            Ok(()) => {
                tracing::debug!(link_id = %link.id(), bytes = bytes.len(), "line sent");
                self.inner.observer.on_message(&ChatLine::outbound(nick, text));
            }
            Err(e) => {
                tracing::warn!(link_id = %link.id(), error = %e, "send failed");
                let mut slot = self.inner.slot.lock().await;
                if slot.generation == generation {
                    self.inner.teardown(&mut slot, Some(e.to_string())).await;
                }
            }
        }
    }

    /// Sends `text` under the nickname `store` supplies, or bare when it
    /// has none.
    pub async fn send_as<C: CredentialStore + ?Sized>(&self, store: &C, text: &str) {
        let nick = store.nickname().unwrap_or_default();
        self.send_text(&nick, text).await;
    }

    /// Closes the active link (if any) and abandons any pending accept,
    /// dial, negotiation or discovery. Idempotent.
    pub async fn stop(&self) {
        let discovery = self
            .inner
            .discovery
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        let was_discovering = discovery.is_some();
        if let Some(task) = discovery {
            task.abort();
        }

        let (was_active, wifi_stopped) = {
            let mut slot = self.inner.slot.lock().await;
            let wifi_stopped = slot.kind == Some(TransportKind::DirectWifi);
            let was_active = self.inner.teardown(&mut slot, None).await;
            slot.generation += 1;
            (was_active, wifi_stopped)
        };

        if was_discovering && !wifi_stopped {
            self.inner.wifi.stop().await;
        }
        if was_discovering || was_active {
            tracing::info!("session stopped");
            self.inner.observer.on_status(&Status::Stopped);
        }
    }

    /// Starts Direct-Wi-Fi peer discovery.
    ///
    /// Every snapshot goes to [`SessionObserver::on_peers`]; an empty one
    /// also reports [`Status::NoPeers`]. A previous discovery is replaced.
    pub async fn discover_peers(&self) {
        let mut snapshots = match self.inner.wifi.discover_peers().await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                self.inner.report(SessionError::from(e).into());
                return;
            }
        };

        let observer = Arc::clone(&self.inner.observer);
        let task = tokio::spawn(async move {
            while let Some(peers) = snapshots.next().await {
                tracing::debug!(count = peers.len(), "peer snapshot");
                observer.on_peers(&peers);
                if peers.is_empty() {
                    observer.on_status(&Status::NoPeers);
                }
            }
        });

        let previous = self
            .inner
            .discovery
            .lock()
            .ok()
            .and_then(|mut slot| slot.replace(task));
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Lists paired Bluetooth devices, for a device picker.
    pub async fn paired_devices(&self) -> Result<Vec<Endpoint>, SessionError> {
        self.inner
            .bluetooth
            .paired_devices()
            .await
            .map_err(SessionError::from)
    }

    async fn start(&self, kind: TransportKind, mode: Mode) {
        let mut slot = self.inner.slot.lock().await;
        self.inner.teardown(&mut slot, None).await;

        slot.generation += 1;
        let generation = slot.generation;
        slot.kind = Some(kind);

        let (state, status) = match (&mode, kind) {
            (Mode::Listen, _) => (SessionState::Listening, Status::Listening { kind }),
            (Mode::Connect(target), TransportKind::Bluetooth) => (
                SessionState::Connecting,
                Status::Connecting {
                    kind,
                    target: target.clone(),
                },
            ),
            (Mode::Connect(target), TransportKind::DirectWifi) => (
                SessionState::Negotiating,
                Status::Negotiating {
                    target: target.clone(),
                },
            ),
        };
        self.inner.set_state(state);
        tracing::info!(%kind, generation, "session starting");
        self.inner.observer.on_status(&status);

        let inner = Arc::clone(&self.inner);
        slot.task = Some(tokio::spawn(inner.run(generation, kind, mode)));
    }
}

impl<R: Radio, P: P2pPlatform> Inner<R, P> {
    fn set_state(&self, state: SessionState) {
        tracing::debug!(%state, "session state");
        self.state.send_replace(state);
    }

    fn report(&self, status: Status) {
        tracing::info!(status = %status, "session status");
        self.observer.on_status(&status);
    }

    async fn stop_transport(&self, kind: TransportKind) {
        match kind {
            TransportKind::Bluetooth => self.bluetooth.stop().await,
            TransportKind::DirectWifi => self.wifi.stop().await,
        }
    }

    /// Ends the active session, if any. Returns `true` if there was one.
    /// `reason` goes into the `Disconnected` status when a link was open.
    ///
    /// The link is closed before the task is aborted so a blocked read
    /// ends promptly, and the task is awaited so no callback for this
    /// session can fire after this returns.
    async fn teardown(&self, slot: &mut Slot, reason: Option<String>) -> bool {
        let Some(kind) = slot.kind.take() else {
            return false;
        };
        self.set_state(SessionState::Closing);

        let link = slot.link.take();
        if let Some(link) = &link {
            link.close().await;
        }
        if let Some(task) = slot.task.take() {
            task.abort();
            let _ = task.await;
        }
        self.stop_transport(kind).await;

        if let Some(link) = link {
            tracing::info!(link_id = %link.id(), %kind, "session closed");
            self.observer.on_status(&Status::Disconnected { kind, reason });
        }
        self.set_state(SessionState::Idle);
        true
    }

    /// Clears the slot from inside a session task and reports `status`.
    /// Does nothing if the session was already replaced or torn down.
    async fn finish(&self, generation: u64, status: Status) {
        let mut slot = self.slot.lock().await;
        if slot.generation != generation || slot.kind.is_none() {
            return;
        }
        slot.kind = None;
        slot.link = None;
        // This is our own handle; dropping it detaches rather than aborts.
        slot.task = None;
        self.set_state(SessionState::Idle);
        self.report(status);
    }

    async fn run(self: Arc<Self>, generation: u64, kind: TransportKind, mode: Mode) {
        let result = match kind {
            TransportKind::Bluetooth => establish(&self.bluetooth, &mode).await,
            TransportKind::DirectWifi => {
                let mut states = self.wifi.subscribe_state();
                let mut reported = None;
                let result = tokio::select! {
                    result = establish(&self.wifi, &mode) => result,
                    never = report_roles(&mut states, self.observer.as_ref(), &mut reported) => match never {},
                };
                // The role can be assigned and used within a single poll.
                if let (Ok(_), None, Some(group)) = (&result, reported, self.wifi.group()) {
                    self.observer.on_status(&Status::RoleAssigned { role: group.role });
                }
                result
            }
        };

        let link = match result {
            Ok(link) => Arc::new(link),
            Err(e) => {
                tracing::warn!(%kind, error = %e, "session failed");
                self.finish(generation, SessionError::from(e).into()).await;
                return;
            }
        };
        let Some(mut lines) = link.lines() else {
            let e = TransportError::ConnectionClosed("line stream already taken".into());
            self.finish(generation, SessionError::from(e).into()).await;
            return;
        };

        {
            let mut slot = self.slot.lock().await;
            if slot.generation != generation {
                drop(slot);
                link.close().await;
                return;
            }
            slot.link = Some(Arc::clone(&link));
            self.set_state(SessionState::Connected);
            tracing::info!(link_id = %link.id(), %kind, peer = %link.peer(), "session connected");
            self.observer.on_status(&Status::Connected {
                kind,
                peer: link.peer().clone(),
            });
        }

        let reason = loop {
            match lines.next().await {
                Some(Ok(raw)) => self.observer.on_message(&ChatLine::inbound(&raw)),
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            }
        };
        link.close().await;
        tracing::info!(link_id = %link.id(), %kind, reason = ?reason, "link ended");

        self.finish(generation, Status::Disconnected { kind, reason }).await;
    }
}

async fn establish<T: Transport>(transport: &T, mode: &Mode) -> Result<Link, TransportError> {
    match mode {
        Mode::Listen => transport.listen().await,
        Mode::Connect(target) => transport.connect(target).await,
    }
}

/// Reports Direct-Wi-Fi role assignments until cancelled, recording the
/// last one reported in `reported`.
async fn report_roles(
    states: &mut watch::Receiver<WifiDirectState>,
    observer: &dyn SessionObserver,
    reported: &mut Option<GroupRole>,
) -> Infallible {
    loop {
        if states.changed().await.is_err() {
            return std::future::pending().await;
        }
        let role = match *states.borrow_and_update() {
            WifiDirectState::Host => GroupRole::Host,
            WifiDirectState::Client => GroupRole::Client,
            _ => continue,
        };
        if *reported != Some(role) {
            *reported = Some(role);
            observer.on_status(&Status::RoleAssigned { role });
        }
    }
}
