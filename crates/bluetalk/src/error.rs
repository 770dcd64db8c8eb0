//! Unified error type for BlueTalk.

use bluetalk_protocol::ProtocolError;
use bluetalk_session::SessionError;
use bluetalk_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `bluetalk` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert them automatically.
#[derive(Debug, thiserror::Error)]
pub enum BluetalkError {
    /// A transport-level error (radio, socket, negotiation).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A framing error (bad nickname).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error, as reported to the user.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let bluetalk_err: BluetalkError = err.into();
        assert!(matches!(bluetalk_err, BluetalkError::Transport(_)));
        assert!(bluetalk_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidNick("a::b".into());
        let bluetalk_err: BluetalkError = err.into();
        assert!(matches!(bluetalk_err, BluetalkError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let bluetalk_err: BluetalkError = SessionError::NotConnected.into();
        assert!(matches!(bluetalk_err, BluetalkError::Session(_)));
        assert_eq!(bluetalk_err.to_string(), "not connected: message not sent");
    }

    #[test]
    fn test_from_config_error() {
        let err = ConfigError::InvalidEnv {
            name: "BLUETALK_WIFI_PORT",
            value: "x".into(),
        };
        let bluetalk_err: BluetalkError = err.into();
        assert!(matches!(bluetalk_err, BluetalkError::Config(_)));
    }
}
