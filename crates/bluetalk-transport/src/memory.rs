//! In-process radios and peer-to-peer platforms.
//!
//! Two devices in the same process can reach each other through:
//!
//! - [`MemoryEther`] / [`MemoryRadio`]: a shared "airspace" where radios
//!   register services and connect over `tokio::io::duplex` pipes.
//! - [`MemoryP2pNetwork`] / [`MemoryP2p`]: a shared peer-to-peer Wi-Fi
//!   arbiter that forms two-device groups and tells each side its role.
//!   Links formed through it are real loopback TCP sockets.
//!
//! The integration tests and the loopback demo are built on these.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::DuplexStream;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::{
    BluetoothConfig, Endpoint, GroupInfo, GroupRole, P2pPlatform,
    PlatformEvent, Radio, RadioListener, TransportError,
};

/// Per-direction buffer size of an in-process serial pipe.
const PIPE_BUFFER: usize = 16 * 1024;

/// Capacity of each device's platform event channel.
const EVENT_CAPACITY: usize = 64;

/// Locks a mutex, recovering the data if a panicking thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =========================================================================
// Bluetooth
// =========================================================================

type PendingConnection = (DuplexStream, Endpoint);
type ServiceKey = (String, Uuid);

/// The shared medium in-process radios talk through.
///
/// Cloning is cheap; every clone sees the same registered services.
#[derive(Debug, Clone, Default)]
pub struct MemoryEther {
    services: Arc<Mutex<HashMap<ServiceKey, mpsc::Sender<PendingConnection>>>>,
}

impl MemoryEther {
    /// Creates an empty ether.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `address` currently has `service` registered.
    pub fn is_listening(&self, address: &str, service: Uuid) -> bool {
        lock(&self.services).contains_key(&(address.to_string(), service))
    }
}

/// An in-process [`Radio`].
#[derive(Debug)]
pub struct MemoryRadio {
    ether: MemoryEther,
    local: Endpoint,
    present: AtomicBool,
    authorized: AtomicBool,
    paired: Mutex<Vec<Endpoint>>,
    discovery_cancellations: AtomicUsize,
}

impl MemoryRadio {
    /// Creates a radio with address `local.address`, present and
    /// authorized.
    pub fn new(ether: &MemoryEther, local: Endpoint) -> Self {
        Self {
            ether: ether.clone(),
            local,
            present: AtomicBool::new(true),
            authorized: AtomicBool::new(true),
            paired: Mutex::new(Vec::new()),
            discovery_cancellations: AtomicUsize::new(0),
        }
    }

    /// This radio's own endpoint.
    pub fn local(&self) -> &Endpoint {
        &self.local
    }

    /// Simulates the adapter being removed (or re-inserted).
    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    /// Simulates the user revoking (or granting) radio access.
    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    /// Adds a device to the paired list.
    pub fn pair(&self, device: Endpoint) {
        lock(&self.paired).push(device);
    }

    /// How many times discovery has been cancelled.
    pub fn discovery_cancellations(&self) -> usize {
        self.discovery_cancellations.load(Ordering::SeqCst)
    }
}

impl Radio for MemoryRadio {
    type Stream = DuplexStream;
    type Listener = MemoryListener;

    async fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    async fn paired_devices(&self) -> Result<Vec<Endpoint>, TransportError> {
        Ok(lock(&self.paired).clone())
    }

    async fn cancel_discovery(&self) {
        self.discovery_cancellations.fetch_add(1, Ordering::SeqCst);
    }

    async fn listen(
        &self,
        config: &BluetoothConfig,
    ) -> Result<MemoryListener, TransportError> {
        let key = (self.local.address.clone(), config.service_uuid);
        let (tx, rx) = mpsc::channel(1);

        let mut services = lock(&self.ether.services);
        if services.contains_key(&key) {
            return Err(TransportError::AcceptFailed(io::Error::new(
                io::ErrorKind::AddrInUse,
                "service already registered",
            )));
        }
        services.insert(key.clone(), tx);

        Ok(MemoryListener {
            ether: self.ether.clone(),
            key,
            incoming: rx,
        })
    }

    async fn connect(
        &self,
        target: &Endpoint,
        config: &BluetoothConfig,
    ) -> Result<DuplexStream, TransportError> {
        let refused = || {
            TransportError::ConnectFailed(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "service not found on remote device",
            ))
        };

        let key = (target.address.clone(), config.service_uuid);
        let listener = lock(&self.ether.services)
            .get(&key)
            .cloned()
            .ok_or_else(refused)?;

        let (ours, theirs) = tokio::io::duplex(PIPE_BUFFER);
        listener
            .send((theirs, self.local.clone()))
            .await
            .map_err(|_| refused())?;
        Ok(ours)
    }
}

/// A service registered on a [`MemoryRadio`]. Unregisters on drop.
#[derive(Debug)]
pub struct MemoryListener {
    ether: MemoryEther,
    key: ServiceKey,
    incoming: mpsc::Receiver<PendingConnection>,
}

impl RadioListener for MemoryListener {
    type Stream = DuplexStream;

    async fn accept(
        &mut self,
    ) -> Result<(DuplexStream, Endpoint), TransportError> {
        self.incoming.recv().await.ok_or_else(|| {
            TransportError::AcceptFailed(io::Error::other("listener closed"))
        })
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        lock(&self.ether.services).remove(&self.key);
    }
}

// =========================================================================
// Direct Wi-Fi
// =========================================================================

#[derive(Debug)]
struct Device {
    endpoint: Endpoint,
    events: broadcast::Sender<PlatformEvent>,
    discovering: bool,
    group: Option<GroupInfo>,
}

#[derive(Debug, Default)]
struct NetworkState {
    devices: HashMap<String, Device>,
    /// `(host, client)` addresses of the formed group, if any.
    group: Option<(String, String)>,
}

impl NetworkState {
    fn snapshot_for(&self, address: &str) -> Vec<Endpoint> {
        let mut peers: Vec<Endpoint> = self
            .devices
            .values()
            .filter(|d| d.endpoint.address != address)
            .map(|d| d.endpoint.clone())
            .collect();
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        peers
    }

    fn notify(&self, address: &str, event: PlatformEvent) {
        if let Some(device) = self.devices.get(address) {
            // No subscribers is fine: nobody is waiting on this device.
            let _ = device.events.send(event);
        }
    }
}

/// An in-process peer-to-peer Wi-Fi arbiter.
///
/// Role arbitration is deterministic: the device with the lexicographically
/// smaller address becomes the group host. The host is notified of the
/// formed group immediately, the client after
/// [`client_notify_delay`](Self::with_client_notify_delay), so the host's
/// listener is normally up before the client dials.
#[derive(Debug, Clone)]
pub struct MemoryP2pNetwork {
    state: Arc<Mutex<NetworkState>>,
    host_addr: IpAddr,
    client_notify_delay: Duration,
}

impl Default for MemoryP2pNetwork {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            host_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            client_notify_delay: Duration::from_millis(100),
        }
    }
}

impl MemoryP2pNetwork {
    /// Creates an empty network whose hosts are reachable on loopback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long the client waits before learning the group formed.
    pub fn with_client_notify_delay(mut self, delay: Duration) -> Self {
        self.client_notify_delay = delay;
        self
    }

    /// Adds a device to the network and returns its platform handle.
    ///
    /// Devices currently discovering receive a fresh peer snapshot.
    pub fn join(&self, endpoint: Endpoint) -> MemoryP2p {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut state = lock(&self.state);
        state.devices.insert(
            endpoint.address.clone(),
            Device {
                endpoint: endpoint.clone(),
                events: events.clone(),
                discovering: false,
                group: None,
            },
        );

        let watchers: Vec<String> = state
            .devices
            .values()
            .filter(|d| d.discovering)
            .map(|d| d.endpoint.address.clone())
            .collect();
        for address in watchers {
            let snapshot = state.snapshot_for(&address);
            state.notify(&address, PlatformEvent::PeersChanged(snapshot));
        }

        MemoryP2p {
            network: self.clone(),
            local: endpoint,
            events,
            authorized: AtomicBool::new(true),
        }
    }

    /// Tears down the current group, telling both members.
    pub fn dissolve_group(&self) {
        let mut state = lock(&self.state);
        let Some((host, client)) = state.group.take() else {
            return;
        };
        for address in [host, client] {
            if let Some(device) = state.devices.get_mut(&address) {
                device.group = None;
            }
            state.notify(&address, PlatformEvent::GroupLost);
        }
        tracing::debug!("memory p2p: group dissolved");
    }

    /// Returns the formed group as `(host, client)` addresses.
    pub fn group(&self) -> Option<(String, String)> {
        lock(&self.state).group.clone()
    }
}

/// One device's view of a [`MemoryP2pNetwork`].
#[derive(Debug)]
pub struct MemoryP2p {
    network: MemoryP2pNetwork,
    local: Endpoint,
    events: broadcast::Sender<PlatformEvent>,
    authorized: AtomicBool,
}

impl MemoryP2p {
    /// This device's own endpoint.
    pub fn local(&self) -> &Endpoint {
        &self.local
    }

    /// Simulates the user revoking (or granting) location/nearby-device
    /// access.
    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }
}

impl P2pPlatform for MemoryP2p {
    async fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }

    async fn discover_peers(&self) -> Result<(), TransportError> {
        let mut state = lock(&self.network.state);
        if let Some(device) = state.devices.get_mut(&self.local.address) {
            device.discovering = true;
        }
        let snapshot = state.snapshot_for(&self.local.address);
        state.notify(&self.local.address, PlatformEvent::PeersChanged(snapshot));
        Ok(())
    }

    async fn request_group(&self, peer: &Endpoint) -> Result<(), TransportError> {
        let (host, client) = {
            let mut state = lock(&self.network.state);
            if !state.devices.contains_key(&peer.address) {
                return Err(TransportError::NegotiationFailed(format!(
                    "peer {peer} not found"
                )));
            }

            let local = self.local.address.clone();
            let (host, client) = if local < peer.address {
                (local, peer.address.clone())
            } else {
                (peer.address.clone(), local)
            };
            // The same pair asking again re-announces its group.
            if state
                .group
                .as_ref()
                .is_some_and(|pair| *pair != (host.clone(), client.clone()))
            {
                return Err(TransportError::NegotiationFailed(
                    "a group already exists".into(),
                ));
            }

            let host_addr = self.network.host_addr;
            for (address, role) in
                [(&host, GroupRole::Host), (&client, GroupRole::Client)]
            {
                if let Some(device) = state.devices.get_mut(address) {
                    device.discovering = false;
                    device.group = Some(GroupInfo { role, host_addr });
                }
            }
            state.group = Some((host.clone(), client.clone()));
            (host, client)
        };

        let host_addr = self.network.host_addr;
        lock(&self.network.state).notify(
            &host,
            PlatformEvent::GroupFormed(GroupInfo {
                role: GroupRole::Host,
                host_addr,
            }),
        );

        let network = self.network.clone();
        tokio::spawn(async move {
            tokio::time::sleep(network.client_notify_delay).await;
            let state = lock(&network.state);
            // The group may have been dissolved while we slept.
            if state.group.as_ref().is_some_and(|(_, c)| *c == client) {
                state.notify(
                    &client,
                    PlatformEvent::GroupFormed(GroupInfo {
                        role: GroupRole::Client,
                        host_addr,
                    }),
                );
            }
        });
        Ok(())
    }

    async fn current_group(&self) -> Option<GroupInfo> {
        lock(&self.network.state)
            .devices
            .get(&self.local.address)
            .and_then(|d| d.group)
    }

    async fn cancel(&self) {
        if let Some(device) =
            lock(&self.network.state).devices.get_mut(&self.local.address)
        {
            device.discovering = false;
        }
    }
}
