//! What the session is doing, and what it tells the observer.

use std::fmt;

use bluetalk_transport::{Endpoint, GroupRole, TransportKind};
use serde::{Deserialize, Serialize};

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The lifecycle of the (single) session.
///
/// ```text
///          ┌→ Listening ───────────────┐
/// Idle ────┼→ Connecting ──────────────┼→ Connected → Closing → Idle
///          └→ Negotiating (Wi-Fi) ─────┘
/// ```
///
/// Failures drop straight back to `Idle`. Starting a new session from any
/// non-idle state passes through `Closing` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Listening,
    Connecting,
    Negotiating,
    Connected,
    Closing,
}

impl SessionState {
    /// Returns `true` when a link is up or being established.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Listening => write!(f, "Listening"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Negotiating => write!(f, "Negotiating"),
            Self::Connected => write!(f, "Connected"),
            Self::Closing => write!(f, "Closing"),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// One status report for the observer.
///
/// Every variant renders (via `Display`) as a single human-readable line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Waiting for a peer to connect.
    Listening { kind: TransportKind },
    /// Dialling a chosen peer.
    Connecting {
        kind: TransportKind,
        target: Endpoint,
    },
    /// Asked the platform to form a Direct-Wi-Fi group with `target`.
    Negotiating { target: Endpoint },
    /// The platform decided this device's group role.
    RoleAssigned { role: GroupRole },
    /// A link is up.
    Connected {
        kind: TransportKind,
        peer: Endpoint,
    },
    /// The link went away. `reason` is set when it failed rather than
    /// ending cleanly.
    Disconnected {
        kind: TransportKind,
        reason: Option<String>,
    },
    /// A discovery snapshot came back empty.
    NoPeers,
    /// The session was stopped on request.
    Stopped,
    /// An operation failed.
    Failed(SessionError),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening { kind } => write!(f, "{kind}: waiting for connection…"),
            Self::Connecting { kind, target } => {
                write!(f, "{kind}: connecting to {target}…")
            }
            Self::Negotiating { target } => {
                write!(f, "{}: connection requested with {target}…", TransportKind::DirectWifi)
            }
            Self::RoleAssigned { role: GroupRole::Host } => {
                write!(f, "{}: connected as group host", TransportKind::DirectWifi)
            }
            Self::RoleAssigned { role: GroupRole::Client } => {
                write!(f, "{}: connected as client", TransportKind::DirectWifi)
            }
            Self::Connected { kind, peer } => write!(f, "{kind}: connected to {peer}"),
            Self::Disconnected { kind, reason: None } => write!(f, "{kind}: disconnected"),
            Self::Disconnected {
                kind,
                reason: Some(reason),
            } => write!(f, "{kind}: disconnected ({reason})"),
            Self::NoPeers => write!(f, "{}: no peers found", TransportKind::DirectWifi),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed(err) => write!(f, "{err}"),
        }
    }
}

impl From<SessionError> for Status {
    fn from(err: SessionError) -> Self {
        Self::Failed(err)
    }
}
