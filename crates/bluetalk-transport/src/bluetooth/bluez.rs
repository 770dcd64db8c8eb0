//! [`Radio`] backed by the Linux BlueZ daemon, over RFCOMM.

use std::io;

use bluer::rfcomm::{Profile, ProfileHandle, Role, Stream};
use bluer::{Adapter, Address, Session};
use futures_util::StreamExt;

use super::{Radio, RadioListener};
use crate::{BluetoothConfig, Endpoint, TransportError};

fn map_err(err: bluer::Error) -> TransportError {
    match err.kind {
        bluer::ErrorKind::NotAuthorized => {
            TransportError::PermissionDenied(err.message)
        }
        bluer::ErrorKind::NotReady | bluer::ErrorKind::NotAvailable => {
            TransportError::Unavailable(err.message)
        }
        _ => TransportError::ConnectFailed(io::Error::other(err)),
    }
}

fn profile(config: &BluetoothConfig, role: Role) -> Profile {
    Profile {
        uuid: config.service_uuid,
        name: Some(config.service_name.clone()),
        role: Some(role),
        require_authentication: Some(false),
        require_authorization: Some(false),
        ..Default::default()
    }
}

/// The default BlueZ adapter.
pub struct BluezRadio {
    session: Session,
    adapter: Adapter,
}

impl BluezRadio {
    /// Connects to `bluetoothd` and opens the default adapter.
    pub async fn new() -> Result<Self, TransportError> {
        let session = Session::new().await.map_err(map_err)?;
        let adapter = session.default_adapter().await.map_err(map_err)?;
        tracing::debug!(adapter = %adapter.name(), "BlueZ adapter opened");
        Ok(Self { session, adapter })
    }
}

impl Radio for BluezRadio {
    type Stream = Stream;
    type Listener = BluezListener;

    async fn is_present(&self) -> bool {
        self.adapter.is_powered().await.unwrap_or(false)
    }

    async fn is_authorized(&self) -> bool {
        // D-Bus policy decides; a refusal surfaces as NotAuthorized later.
        true
    }

    async fn paired_devices(&self) -> Result<Vec<Endpoint>, TransportError> {
        let mut devices = Vec::new();
        for address in self.adapter.device_addresses().await.map_err(map_err)? {
            let device = self.adapter.device(address).map_err(map_err)?;
            if !device.is_paired().await.unwrap_or(false) {
                continue;
            }
            let mut endpoint = Endpoint::new(address.to_string());
            if let Ok(alias) = device.alias().await {
                endpoint = endpoint.with_label(alias);
            }
            devices.push(endpoint);
        }
        Ok(devices)
    }

    async fn cancel_discovery(&self) {
        // bluer scopes discovery to the stream returned by
        // `discover_devices`; this radio never holds one.
        tracing::trace!("BlueZ: no discovery session to cancel");
    }

    async fn listen(
        &self,
        config: &BluetoothConfig,
    ) -> Result<BluezListener, TransportError> {
        let handle = self
            .session
            .register_profile(profile(config, Role::Server))
            .await
            .map_err(map_err)?;
        Ok(BluezListener { handle })
    }

    async fn connect(
        &self,
        target: &Endpoint,
        config: &BluetoothConfig,
    ) -> Result<Stream, TransportError> {
        let address: Address = target.address.parse().map_err(|_| {
            TransportError::ConnectFailed(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a Bluetooth address: {}", target.address),
            ))
        })?;
        let device = self.adapter.device(address).map_err(map_err)?;

        let mut handle = self
            .session
            .register_profile(profile(config, Role::Client))
            .await
            .map_err(map_err)?;

        let accept = async {
            let request = handle.next().await.ok_or_else(|| {
                TransportError::ConnectFailed(io::Error::other(
                    "profile closed before connecting",
                ))
            })?;
            request.accept().map_err(map_err)
        };
        let ((), stream) = tokio::try_join!(
            async {
                device
                    .connect_profile(&config.service_uuid)
                    .await
                    .map_err(map_err)
            },
            accept,
        )?;
        Ok(stream)
    }
}

/// A registered RFCOMM server profile. Unregistered on drop.
pub struct BluezListener {
    handle: ProfileHandle,
}

impl RadioListener for BluezListener {
    type Stream = Stream;

    async fn accept(&mut self) -> Result<(Stream, Endpoint), TransportError> {
        let request = self.handle.next().await.ok_or_else(|| {
            TransportError::AcceptFailed(io::Error::other("profile unregistered"))
        })?;
        let peer = Endpoint::new(request.device().to_string());
        let stream = request
            .accept()
            .map_err(|e| TransportError::AcceptFailed(io::Error::other(e)))?;
        Ok((stream, peer))
    }
}
