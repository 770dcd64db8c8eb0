//! The hooks a session reports through.
//!
//! The session manager never owns a UI. Everything it has to say goes
//! through a [`SessionObserver`] injected at construction:
//!
//! - [`on_status`](SessionObserver::on_status): one line per state change
//!   or failure
//! - [`on_message`](SessionObserver::on_message): every chat line, in the
//!   order it crossed the link
//! - [`on_peers`](SessionObserver::on_peers): Direct-Wi-Fi discovery
//!   snapshots
//!
//! Callbacks run on the session's background tasks. A slow observer
//! stalls the read loop, so hand the work off (as [`ChannelObserver`]
//! does) rather than blocking.

use bluetalk_protocol::ChatLine;
use bluetalk_transport::Endpoint;
use tokio::sync::mpsc;

use crate::Status;

/// Receives session events.
///
/// # Trait bounds
///
/// - `Send + Sync` → called from whichever task the event happened on.
/// - `'static` → the observer outlives every task the manager spawns.
pub trait SessionObserver: Send + Sync + 'static {
    /// A status change or failure.
    fn on_status(&self, status: &Status);

    /// An inbound line from the peer, or the echo of a line just sent.
    fn on_message(&self, line: &ChatLine);

    /// A fresh visible-peer snapshot. Ignored by default.
    fn on_peers(&self, _peers: &[Endpoint]) {}
}

/// An observer event, as delivered by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Status(Status),
    Message(ChatLine),
    Peers(Vec<Endpoint>),
}

/// Forwards every event into an unbounded channel.
///
/// The receiving side sees events in the order the session produced them.
/// Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    /// Creates an observer and the receiver its events arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionObserver for ChannelObserver {
    fn on_status(&self, status: &Status) {
        let _ = self.tx.send(SessionEvent::Status(status.clone()));
    }

    fn on_message(&self, line: &ChatLine) {
        let _ = self.tx.send(SessionEvent::Message(line.clone()));
    }

    fn on_peers(&self, peers: &[Endpoint]) {
        let _ = self.tx.send(SessionEvent::Peers(peers.to_vec()));
    }
}
