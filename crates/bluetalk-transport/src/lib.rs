//! Transport abstraction layer for BlueTalk.
//!
//! Provides the [`Link`] type (one established byte stream to a peer) and
//! the [`Transport`] trait that produces links, plus two implementations:
//!
//! - [`BluetoothTransport`]: serial-over-radio, generic over a [`Radio`]
//! - [`WifiDirectTransport`]: peer-to-peer Wi-Fi group + TCP, generic over
//!   a [`P2pPlatform`]
//!
//! The [`memory`] module provides in-process radios and platforms.
//!
//! # Feature Flags
//!
//! - `bluez`: [`BluezRadio`], a Linux [`Radio`] backed by BlueZ via `bluer`

#![allow(async_fn_in_trait)]

mod bluetooth;
mod config;
mod error;
mod link;
pub mod memory;
mod wifi_direct;

#[cfg(feature = "bluez")]
pub use bluetooth::bluez::{BluezListener, BluezRadio};
pub use bluetooth::{BluetoothTransport, Radio, RadioListener};
pub use config::{
    BluetoothConfig, WifiDirectConfig, DIRECT_WIFI_PORT, SERVICE_NAME,
    SERVICE_UUID,
};
pub use error::{ErrorKind, TransportError};
pub use link::{LineStream, Link, LinkCloser};
pub use wifi_direct::{
    GroupInfo, GroupRole, P2pPlatform, PeerSnapshots, PlatformEvent,
    PreformedGroup, WifiDirectState, WifiDirectTransport,
};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counter for generating unique link IDs.
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

impl LinkId {
    /// Creates a new `LinkId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique `LinkId`.
    pub fn next() -> Self {
        Self(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Which transport handles a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Point-to-point serial link over the Bluetooth radio.
    Bluetooth,
    /// TCP inside a two-device peer-to-peer Wi-Fi group.
    DirectWifi,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bluetooth => write!(f, "Bluetooth"),
            Self::DirectWifi => write!(f, "Wi-Fi Direct"),
        }
    }
}

/// Names a remote device: a Bluetooth hardware address or an IP address,
/// plus an optional human-readable label.
///
/// Endpoints come out of discovery (or a paired-device list) and are not
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// The address used to reach the device.
    pub address: String,
    /// A display name, when the platform knows one.
    pub label: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint with no label.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: None,
        }
    }

    /// Attaches a display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Shows the label when there is one, the address otherwise.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label}"),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Produces [`Link`]s either by waiting for a peer or by reaching out to
/// one.
///
/// `listen` and `connect` are mutually exclusive per session. Both are
/// cancelled by dropping the returned future: every implementation owns
/// its listening/connecting handle inside that future, so dropping it
/// closes the handle.
pub trait Transport: Send + Sync + 'static {
    /// Which kind of transport this is.
    fn kind(&self) -> TransportKind;

    /// Waits for exactly one peer and returns the link to it.
    fn listen(
        &self,
    ) -> impl Future<Output = Result<Link, TransportError>> + Send;

    /// Opens a link to `target`.
    fn connect(
        &self,
        target: &Endpoint,
    ) -> impl Future<Output = Result<Link, TransportError>> + Send;

    /// Abandons any in-progress discovery or negotiation and returns the
    /// transport to its idle state. Idempotent.
    fn stop(&self) -> impl Future<Output = ()> + Send;
}
