//! Direct-Wi-Fi transport: a two-device peer-to-peer group plus one TCP
//! connection inside it.
//!
//! Forming the group is the platform's job ([`P2pPlatform`]): it finds
//! peers, negotiates the pair, and decides which side is the group
//! [`Host`](GroupRole::Host) and which is the [`Client`](GroupRole::Client).
//! This module turns the platform's decision into a [`Link`]:
//!
//! - the Host binds the fixed port and accepts exactly one connection;
//! - the Client dials the Host's address on that port, once.
//!
//! The Host is assumed to be listening before the Client dials. A platform
//! is expected to tell the Host first; if the Client still gets there
//! early, its dial fails with [`TransportError::ConnectFailed`] and is not
//! retried.
//!
//! # State machine
//!
//! ```text
//! Idle → Discovering → PeerFound → Negotiating → Host ─┐
//!          │                          ▲     │            ├→ Connected → Idle
//!          └──────────────────────────┘     └→ Client ──┘
//! ```
//!
//! Any state may fall back to `Idle` (stop, failure, or group loss).

mod preformed;

pub use preformed::PreformedGroup;

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{
    Endpoint, Link, Transport, TransportError, TransportKind, WifiDirectConfig,
};

/// A stream of visible-peer snapshots. Each item is the complete current
/// set, not a delta.
pub type PeerSnapshots = BoxStream<'static, Vec<Endpoint>>;

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The side of the group this device ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupRole {
    /// Group owner: opens the listening socket.
    Host,
    /// Dials the host.
    Client,
}

/// What the platform reports once a group has formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// This device's role.
    pub role: GroupRole,
    /// The Host's address inside the group.
    pub host_addr: IpAddr,
}

/// Asynchronous notifications from the peer-to-peer platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The visible-peer set changed; carries the full new set.
    PeersChanged(Vec<Endpoint>),
    /// A group formed with this device in it.
    GroupFormed(GroupInfo),
    /// The group this device was in went away.
    GroupLost,
}

/// The operating system's peer-to-peer Wi-Fi service.
///
/// Methods that start something (`discover_peers`, `request_group`) only
/// start it; results arrive later as [`PlatformEvent`]s on every receiver
/// returned by [`subscribe`](Self::subscribe).
pub trait P2pPlatform: Send + Sync + 'static {
    /// Returns `true` if this process may use peer-to-peer Wi-Fi
    /// (location / nearby-device access).
    fn is_authorized(&self) -> impl Future<Output = bool> + Send;

    /// Returns a receiver for platform events emitted from now on.
    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent>;

    /// Starts peer discovery.
    fn discover_peers(
        &self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Asks the platform to form a two-device group with `peer`.
    fn request_group(
        &self,
        peer: &Endpoint,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// The group this device is currently in, if any.
    fn current_group(&self) -> impl Future<Output = Option<GroupInfo>> + Send;

    /// Abandons discovery and any pending group request.
    fn cancel(&self) -> impl Future<Output = ()> + Send;
}

// ---------------------------------------------------------------------------
// WifiDirectState
// ---------------------------------------------------------------------------

/// Where the Direct-Wi-Fi transport is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WifiDirectState {
    Idle,
    Discovering,
    PeerFound,
    Negotiating,
    Host,
    Client,
    Connected,
}

impl WifiDirectState {
    /// Returns `true` if moving from `self` to `target` is allowed.
    ///
    /// Falling back to `Idle` is always allowed. `PeerFound → PeerFound`
    /// is allowed so every fresh snapshot counts as a transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        use WifiDirectState::*;
        matches!(
            (self, target),
            (_, Idle)
                | (Idle, Discovering)
                | (Idle, Negotiating)
                | (Discovering, PeerFound)
                | (Discovering, Negotiating)
                | (PeerFound, PeerFound)
                | (PeerFound, Discovering)
                | (PeerFound, Negotiating)
                | (Negotiating, Host)
                | (Negotiating, Client)
                | (Host, Connected)
                | (Client, Connected)
        )
    }
}

impl std::fmt::Display for WifiDirectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Discovering => write!(f, "Discovering"),
            Self::PeerFound => write!(f, "PeerFound"),
            Self::Negotiating => write!(f, "Negotiating"),
            Self::Host => write!(f, "Host"),
            Self::Client => write!(f, "Client"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Applies `target` if the state machine allows it. Returns whether it did.
fn transition(state: &watch::Sender<WifiDirectState>, target: WifiDirectState) -> bool {
    state.send_if_modified(|current| {
        if current.can_transition_to(target) {
            tracing::trace!(from = %current, to = %target, "wifi direct state");
            *current = target;
            true
        } else {
            false
        }
    })
}

// ---------------------------------------------------------------------------
// WifiDirectTransport
// ---------------------------------------------------------------------------

/// A [`Transport`] over a peer-to-peer Wi-Fi group.
///
/// [`listen`](Transport::listen) waits for a group to form (typically
/// because the other device asked for one) and [`connect`](Transport::connect)
/// asks the platform to form one with a given peer. Either way the role
/// the platform assigns decides who accepts and who dials.
pub struct WifiDirectTransport<P: P2pPlatform> {
    platform: P,
    config: WifiDirectConfig,
    state: Arc<watch::Sender<WifiDirectState>>,
    /// The group the current link lives in.
    group: Arc<Mutex<Option<GroupInfo>>>,
    /// Watches the platform for group loss while a link is up.
    watcher: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by every listen/connect attempt and every reset. A watcher
    /// only resets shared state while its own attempt is still current.
    epoch: Arc<AtomicU64>,
}

impl<P: P2pPlatform> WifiDirectTransport<P> {
    /// Creates an idle transport.
    pub fn new(platform: P, config: WifiDirectConfig) -> Self {
        Self {
            platform,
            config,
            state: Arc::new(watch::Sender::new(WifiDirectState::Idle)),
            group: Arc::default(),
            watcher: Mutex::new(None),
            epoch: Arc::default(),
        }
    }

    /// The underlying platform.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// The current state.
    pub fn state(&self) -> WifiDirectState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<WifiDirectState> {
        self.state.subscribe()
    }

    /// The group this device joined for the current link, if any.
    pub fn group(&self) -> Option<GroupInfo> {
        self.group.lock().ok().and_then(|group| *group)
    }

    /// Starts discovery and returns the stream of visible-peer snapshots.
    ///
    /// The stream ends when the platform goes away. Dropping it does not
    /// stop platform discovery; call [`Transport::stop`] for that.
    pub async fn discover_peers(&self) -> Result<PeerSnapshots, TransportError> {
        self.ensure_authorized().await?;

        // Subscribe before starting so the first snapshot is not missed.
        let events = self.platform.subscribe();
        transition(&self.state, WifiDirectState::Discovering);

        if let Err(e) = self.platform.discover_peers().await {
            self.state.send_if_modified(|s| {
                let was_discovering = *s == WifiDirectState::Discovering;
                if was_discovering {
                    *s = WifiDirectState::Idle;
                }
                was_discovering
            });
            return Err(e);
        }
        tracing::debug!("Wi-Fi Direct: discovery started");

        let state = Arc::clone(&self.state);
        let snapshots = stream::unfold((events, state), |(mut events, state)| async move {
            loop {
                match events.recv().await {
                    Ok(PlatformEvent::PeersChanged(peers)) => {
                        if !peers.is_empty() {
                            transition(&state, WifiDirectState::PeerFound);
                        }
                        return Some((peers, (events, state)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Wi-Fi Direct: peer events lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(snapshots.boxed())
    }

    async fn ensure_authorized(&self) -> Result<(), TransportError> {
        if self.platform.is_authorized().await {
            Ok(())
        } else {
            Err(TransportError::PermissionDenied(
                "Wi-Fi Direct: missing permission".into(),
            ))
        }
    }

    /// Clears the group and returns to `Idle`. Returns the new epoch.
    fn reset(&self) -> u64 {
        let mut group = self.group.lock().unwrap_or_else(PoisonError::into_inner);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *group = None;
        self.state.send_replace(WifiDirectState::Idle);
        epoch
    }

    /// Retires the previous link's watcher and starts a new attempt.
    fn begin(&self) -> u64 {
        let watcher = self.watcher.lock().ok().and_then(|mut slot| slot.take());
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        // Keep discovery progress; anything past it belongs to an old link.
        if matches!(
            self.state(),
            WifiDirectState::Idle | WifiDirectState::Discovering | WifiDirectState::PeerFound
        ) {
            let _guard = self.group.lock().unwrap_or_else(PoisonError::into_inner);
            self.epoch.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.reset()
        }
    }

    async fn listen_inner(&self) -> Result<Link, TransportError> {
        self.ensure_authorized().await?;
        let epoch = self.begin();
        let mut events = self.platform.subscribe();
        transition(&self.state, WifiDirectState::Negotiating);
        tracing::info!("Wi-Fi Direct: waiting for a group");

        let group = match self.platform.current_group().await {
            Some(group) => group,
            None => wait_for_group(&mut events).await?,
        };
        self.establish(group, events, epoch).await
    }

    async fn connect_inner(&self, peer: &Endpoint) -> Result<Link, TransportError> {
        self.ensure_authorized().await?;
        let epoch = self.begin();
        let mut events = self.platform.subscribe();
        transition(&self.state, WifiDirectState::Negotiating);
        tracing::info!(peer = %peer, "Wi-Fi Direct: connection requested");

        self.platform.request_group(peer).await?;
        let group = wait_for_group(&mut events).await?;
        self.establish(group, events, epoch).await
    }

    /// Opens the TCP side of a formed group and starts watching for loss.
    async fn establish(
        &self,
        group: GroupInfo,
        mut events: broadcast::Receiver<PlatformEvent>,
        attempt: u64,
    ) -> Result<Link, TransportError> {
        set_group(&self.group, Some(group));
        let link = tokio::select! {
            result = self.open(group) => result?,
            lost = wait_for_loss(&mut events) => return Err(lost),
        };
        transition(&self.state, WifiDirectState::Connected);

        let closer = link.closer();
        let state = Arc::clone(&self.state);
        let current_group = Arc::clone(&self.group);
        let epoch = Arc::clone(&self.epoch);
        let link_id = link.id();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_loss(&mut events) => {
                    tracing::info!(%link_id, "Wi-Fi Direct: disconnected");
                    closer.close();
                }
                _ = closer.closed() => {}
            }
            let mut group = current_group.lock().unwrap_or_else(PoisonError::into_inner);
            if epoch.load(Ordering::SeqCst) == attempt {
                *group = None;
                state.send_replace(WifiDirectState::Idle);
            } else {
                tracing::debug!(%link_id, "Wi-Fi Direct: newer attempt active; state kept");
            }
        });

        let previous = self
            .watcher
            .lock()
            .ok()
            .and_then(|mut slot| slot.replace(watcher));
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(link)
    }

    async fn open(&self, group: GroupInfo) -> Result<Link, TransportError> {
        let port = self.config.port;
        match group.role {
            GroupRole::Host => {
                let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
                    .await
                    .map_err(TransportError::AcceptFailed)?;
                transition(&self.state, WifiDirectState::Host);
                tracing::info!(port, "Wi-Fi Direct: connected as Group Owner; listening");

                let (stream, addr) = listener
                    .accept()
                    .await
                    .map_err(TransportError::AcceptFailed)?;
                // Single accept: stop listening once a client is in.
                drop(listener);

                let link = Link::new(
                    TransportKind::DirectWifi,
                    Endpoint::new(addr.ip().to_string()),
                    stream,
                );
                tracing::info!(link_id = %link.id(), peer = %addr, "Wi-Fi Direct: client connected");
                Ok(link)
            }
            GroupRole::Client => {
                transition(&self.state, WifiDirectState::Client);
                tracing::info!(host = %group.host_addr, port, "Wi-Fi Direct: connected as Client; dialling");

                let stream = TcpStream::connect((group.host_addr, port))
                    .await
                    .map_err(TransportError::ConnectFailed)?;

                let link = Link::new(
                    TransportKind::DirectWifi,
                    Endpoint::new(group.host_addr.to_string()),
                    stream,
                );
                tracing::info!(link_id = %link.id(), host = %group.host_addr, "Wi-Fi Direct: connected to host");
                Ok(link)
            }
        }
    }
}

impl<P: P2pPlatform> Transport for WifiDirectTransport<P> {
    fn kind(&self) -> TransportKind {
        TransportKind::DirectWifi
    }

    async fn listen(&self) -> Result<Link, TransportError> {
        let result = self.listen_inner().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Wi-Fi Direct: listen failed");
            self.reset();
        }
        result
    }

    async fn connect(&self, target: &Endpoint) -> Result<Link, TransportError> {
        let result = self.connect_inner(target).await;
        if let Err(e) = &result {
            tracing::warn!(peer = %target, error = %e, "Wi-Fi Direct: connect failed");
            self.reset();
        }
        result
    }

    async fn stop(&self) {
        let watcher = self.watcher.lock().ok().and_then(|mut slot| slot.take());
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        self.platform.cancel().await;
        self.reset();
    }
}

fn set_group(slot: &Mutex<Option<GroupInfo>>, group: Option<GroupInfo>) {
    if let Ok(mut slot) = slot.lock() {
        *slot = group;
    }
}

/// Waits until the platform reports a formed group.
async fn wait_for_group(
    events: &mut broadcast::Receiver<PlatformEvent>,
) -> Result<GroupInfo, TransportError> {
    loop {
        match events.recv().await {
            Ok(PlatformEvent::GroupFormed(group)) => {
                tracing::debug!(role = ?group.role, host = %group.host_addr, "Wi-Fi Direct: group formed");
                return Ok(group);
            }
            Ok(PlatformEvent::GroupLost) => {
                return Err(TransportError::NegotiationFailed(
                    "group lost during negotiation".into(),
                ));
            }
            Ok(PlatformEvent::PeersChanged(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Wi-Fi Direct: platform events lagged");
            }
            Err(RecvError::Closed) => {
                return Err(TransportError::NegotiationFailed(
                    "platform stopped reporting".into(),
                ));
            }
        }
    }
}

/// Resolves with an error once the platform reports the group gone.
async fn wait_for_loss(events: &mut broadcast::Receiver<PlatformEvent>) -> TransportError {
    loop {
        match events.recv().await {
            Ok(PlatformEvent::GroupLost) | Err(RecvError::Closed) => {
                return TransportError::NegotiationFailed("group connection lost".into());
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    }
}
