//! Bluetooth transport: one serial-over-radio link per listen/connect.
//!
//! The radio itself sits behind the [`Radio`] trait so the transport logic
//! (readiness checks, single-accept, discovery cancellation) is the same
//! whether the radio is BlueZ, an in-process fake, or something else.

#[cfg(feature = "bluez")]
pub(crate) mod bluez;

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    BluetoothConfig, Endpoint, Link, Transport, TransportError, TransportKind,
};

/// A Bluetooth adapter able to register a service and open serial streams.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → the radio is shared by the session's
///   background tasks.
/// - Every returned future is `Send` so the session can drive it from a
///   spawned task.
pub trait Radio: Send + Sync + 'static {
    /// The connected serial stream type.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;
    /// A registered, listening service endpoint.
    type Listener: RadioListener<Stream = Self::Stream>;

    /// Returns `true` if an adapter exists and is usable.
    fn is_present(&self) -> impl Future<Output = bool> + Send;

    /// Returns `true` if this process may use the adapter.
    fn is_authorized(&self) -> impl Future<Output = bool> + Send;

    /// Lists devices already paired (bonded) with this adapter.
    fn paired_devices(
        &self,
    ) -> impl Future<Output = Result<Vec<Endpoint>, TransportError>> + Send;

    /// Stops any device discovery in progress. Connecting while the radio
    /// is scanning is slow and unreliable on most stacks.
    fn cancel_discovery(&self) -> impl Future<Output = ()> + Send;

    /// Registers the service described by `config` and starts listening.
    ///
    /// Dropping the returned listener unregisters the service.
    fn listen(
        &self,
        config: &BluetoothConfig,
    ) -> impl Future<Output = Result<Self::Listener, TransportError>> + Send;

    /// Opens a stream to the service described by `config` on `target`.
    fn connect(
        &self,
        target: &Endpoint,
        config: &BluetoothConfig,
    ) -> impl Future<Output = Result<Self::Stream, TransportError>> + Send;
}

/// A listening service endpoint.
pub trait RadioListener: Send + 'static {
    /// The connected serial stream type.
    type Stream;

    /// Waits for the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<(Self::Stream, Endpoint), TransportError>>
    + Send;
}

/// A [`Transport`] over a Bluetooth [`Radio`].
pub struct BluetoothTransport<R: Radio> {
    radio: R,
    config: BluetoothConfig,
}

impl<R: Radio> BluetoothTransport<R> {
    /// Creates a transport using `radio` and the given service settings.
    pub fn new(radio: R, config: BluetoothConfig) -> Self {
        Self { radio, config }
    }

    /// The underlying radio.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// The service settings in use.
    pub fn config(&self) -> &BluetoothConfig {
        &self.config
    }

    /// Lists paired devices a user could pick as a connect target.
    pub async fn paired_devices(&self) -> Result<Vec<Endpoint>, TransportError> {
        self.ensure_ready().await?;
        self.radio.paired_devices().await
    }

    async fn ensure_ready(&self) -> Result<(), TransportError> {
        if !self.radio.is_present().await {
            return Err(TransportError::Unavailable(
                "no Bluetooth adapter".into(),
            ));
        }
        if !self.radio.is_authorized().await {
            return Err(TransportError::PermissionDenied(
                "Bluetooth access not granted".into(),
            ));
        }
        Ok(())
    }
}

impl<R: Radio> Transport for BluetoothTransport<R> {
    fn kind(&self) -> TransportKind {
        TransportKind::Bluetooth
    }

    async fn listen(&self) -> Result<Link, TransportError> {
        self.ensure_ready().await?;

        let mut listener = self.radio.listen(&self.config).await?;
        tracing::info!(
            service = %self.config.service_uuid,
            "Bluetooth: waiting for connection"
        );

        let (stream, peer) = listener.accept().await?;
        // Single accept: the service record goes away with the listener.
        drop(listener);

        let link = Link::new(TransportKind::Bluetooth, peer, stream);
        tracing::info!(
            link_id = %link.id(),
            peer = %link.peer(),
            "Bluetooth: accepted connection"
        );
        Ok(link)
    }

    async fn connect(&self, target: &Endpoint) -> Result<Link, TransportError> {
        self.ensure_ready().await?;
        self.radio.cancel_discovery().await;

        tracing::info!(peer = %target, "Bluetooth: connecting");
        let stream = self.radio.connect(target, &self.config).await?;

        let link = Link::new(TransportKind::Bluetooth, target.clone(), stream);
        tracing::info!(link_id = %link.id(), peer = %target, "Bluetooth: connected");
        Ok(link)
    }

    async fn stop(&self) {
        self.radio.cancel_discovery().await;
    }
}
