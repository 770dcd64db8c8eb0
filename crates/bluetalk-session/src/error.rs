//! Error types for the session layer.

use bluetalk_protocol::ProtocolError;
use bluetalk_transport::{ErrorKind, TransportError};

/// Why a session operation did not happen.
///
/// Every variant is one user-visible failure class. The `Display` text is
/// the status line shown to the user, so it is phrased for people rather
/// than for logs. `Clone` lets the same error travel in a [`Status`]
/// event and be returned to the caller.
///
/// [`Status`]: crate::Status
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No radio/adapter is present. The session stays idle.
    #[error("{0}")]
    TransportUnavailable(String),

    /// The user has not granted access to the radio.
    #[error("{0}")]
    PermissionDenied(String),

    /// A socket or stream failed; the session was torn down.
    #[error("I/O error: {0}")]
    Io(String),

    /// A message was sent with no link up. Nothing changed.
    #[error("not connected: message not sent")]
    NotConnected,

    /// Direct-Wi-Fi group negotiation failed.
    #[error("{0}")]
    PeerNegotiationFailed(String),

    /// The outgoing message could not be framed.
    #[error("message not sent: {0}")]
    InvalidMessage(#[from] ProtocolError),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::TransportUnavailable => Self::TransportUnavailable(message),
            ErrorKind::PermissionDenied => Self::PermissionDenied(message),
            ErrorKind::Io => Self::Io(message),
            ErrorKind::NotConnected => Self::NotConnected,
            ErrorKind::PeerNegotiationFailed => Self::PeerNegotiationFailed(message),
        }
    }
}
