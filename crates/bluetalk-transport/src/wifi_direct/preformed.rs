use std::net::IpAddr;

use tokio::sync::broadcast;

use super::{GroupInfo, GroupRole, P2pPlatform, PlatformEvent};
use crate::{Endpoint, TransportError};

/// A [`P2pPlatform`] for a group that already exists.
///
/// Use this when the peer-to-peer group was formed outside the process
/// (for example by the OS network manager, or by hand on a LAN) and all
/// that is left is the TCP handshake. The role and host address are fixed
/// at construction; `request_group` simply reports them.
#[derive(Debug)]
pub struct PreformedGroup {
    group: GroupInfo,
    peers: Vec<Endpoint>,
    events: broadcast::Sender<PlatformEvent>,
}

impl PreformedGroup {
    /// Creates a platform that reports this device as `role` in a group
    /// whose Host is reachable at `host_addr`.
    pub fn new(role: GroupRole, host_addr: IpAddr) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            group: GroupInfo { role, host_addr },
            peers: Vec::new(),
            events,
        }
    }

    /// Sets the peers reported by discovery.
    pub fn with_peers(mut self, peers: Vec<Endpoint>) -> Self {
        self.peers = peers;
        self
    }

    /// Tells every subscriber the group is gone.
    pub fn drop_group(&self) {
        let _ = self.events.send(PlatformEvent::GroupLost);
    }
}

impl P2pPlatform for PreformedGroup {
    async fn is_authorized(&self) -> bool {
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }

    async fn discover_peers(&self) -> Result<(), TransportError> {
        let _ = self
            .events
            .send(PlatformEvent::PeersChanged(self.peers.clone()));
        Ok(())
    }

    async fn request_group(&self, _peer: &Endpoint) -> Result<(), TransportError> {
        let _ = self.events.send(PlatformEvent::GroupFormed(self.group));
        Ok(())
    }

    async fn current_group(&self) -> Option<GroupInfo> {
        Some(self.group)
    }

    async fn cancel(&self) {}
}
