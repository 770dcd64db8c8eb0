use std::fmt;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No radio or adapter is present (or it is powered off).
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The caller lacks authorization to use the radio.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Opening an outbound connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The link was already closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Direct-Wi-Fi group negotiation failed or the group went away
    /// before a link was established.
    #[error("peer negotiation failed: {0}")]
    NegotiationFailed(String),

    /// The transport was shut down while an operation was pending.
    #[error("transport shut down")]
    Shutdown,
}

/// The coarse failure classes a transport error falls into.
///
/// Sessions report these to the user; the finer-grained
/// [`TransportError`] variant only matters in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No radio/adapter.
    TransportUnavailable,
    /// Authorization missing.
    PermissionDenied,
    /// Socket or stream failure.
    Io,
    /// Nothing to send on.
    NotConnected,
    /// Direct-Wi-Fi role negotiation failed.
    PeerNegotiationFailed,
}

impl TransportError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::TransportUnavailable,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::ConnectFailed(_)
            | Self::AcceptFailed(_)
            | Self::SendFailed(_)
            | Self::ReceiveFailed(_)
            | Self::Shutdown => ErrorKind::Io,
            Self::ConnectionClosed(_) => ErrorKind::NotConnected,
            Self::NegotiationFailed(_) => ErrorKind::PeerNegotiationFailed,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportUnavailable => write!(f, "TransportUnavailable"),
            Self::PermissionDenied => write!(f, "PermissionDenied"),
            Self::Io => write!(f, "IoError"),
            Self::NotConnected => write!(f, "NotConnected"),
            Self::PeerNegotiationFailed => write!(f, "PeerNegotiationFailed"),
        }
    }
}
