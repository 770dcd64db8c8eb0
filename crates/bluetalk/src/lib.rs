//! # BlueTalk
//!
//! Peer-to-peer text chat between two nearby devices, over either a
//! Bluetooth serial link or a TCP socket inside a Wi-Fi Direct group.
//!
//! The pieces live in their own crates and are re-exported here:
//!
//! - `bluetalk-protocol`: `nick::text\n` line framing and [`ChatLine`]
//! - `bluetalk-transport`: [`Link`], the Bluetooth and Wi-Fi Direct
//!   transports, and the [`memory`] fakes
//! - `bluetalk-session`: the single-session [`SessionManager`]
//!
//! This crate adds [`Config`] loading, [`logging`] setup and the unified
//! [`BluetalkError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bluetalk::prelude::*;
//! use bluetalk::memory::{MemoryEther, MemoryP2pNetwork, MemoryRadio};
//!
//! # async fn run() -> Result<(), BluetalkError> {
//! let config = Config::load()?;
//! bluetalk::logging::init(&config.log_filter);
//!
//! let ether = MemoryEther::new();
//! let network = MemoryP2pNetwork::new();
//! let (observer, mut events) = ChannelObserver::new();
//! let session = bluetalk::session_manager(
//!     &config,
//!     MemoryRadio::new(&ether, Endpoint::new("00:00:00:00:00:01")),
//!     network.join(Endpoint::new("00:00:00:00:00:01")),
//!     observer,
//! );
//!
//! session.start_listening(TransportKind::Bluetooth).await;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod logging;

pub use bluetalk_protocol::{decode, encode, ChatLine, DecodedLine, Direction, ProtocolError};
pub use bluetalk_session::{
    ChannelObserver, CredentialStore, SessionError, SessionEvent, SessionManager,
    SessionObserver, SessionState, Status,
};
pub use bluetalk_transport::memory;
pub use bluetalk_transport::{
    BluetoothConfig, BluetoothTransport, Endpoint, GroupInfo, GroupRole, Link,
    P2pPlatform, PreformedGroup, Radio, Transport, TransportError,
    TransportKind, WifiDirectConfig, WifiDirectState, WifiDirectTransport,
};
#[cfg(feature = "bluez")]
pub use bluetalk_transport::BluezRadio;
pub use config::{Config, ConfigError, CONFIG_ENV};
pub use error::BluetalkError;

/// Builds a [`SessionManager`] over `radio` and `platform` using the
/// transport settings in `config`.
pub fn session_manager<R, P, O>(
    config: &Config,
    radio: R,
    platform: P,
    observer: O,
) -> SessionManager<R, P>
where
    R: Radio,
    P: P2pPlatform,
    O: SessionObserver,
{
    tracing::debug!(
        service = %config.bluetooth.service_uuid,
        port = config.wifi_direct.port,
        "building session manager"
    );
    SessionManager::new(
        BluetoothTransport::new(radio, config.bluetooth.clone()),
        WifiDirectTransport::new(platform, config.wifi_direct.clone()),
        observer,
    )
}

/// Common imports for applications.
pub mod prelude {
    pub use crate::{
        BluetalkError, ChannelObserver, ChatLine, Config, CredentialStore,
        Direction, Endpoint, SessionEvent, SessionManager, SessionObserver,
        SessionState, Status, TransportKind,
    };
}
