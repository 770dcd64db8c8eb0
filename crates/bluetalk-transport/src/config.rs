//! Transport settings shared by both peers.
//!
//! Two installations only interoperate when they agree on these values.
//! There is no negotiation or versioning on the wire, so the defaults are
//! baked in and changing them breaks compatibility with older installs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The service identifier both peers register/connect under.
pub const SERVICE_UUID: Uuid =
    Uuid::from_u128(0x6f6a0b2c_5c7a_4d21_9c7f_0f2a4a4c1a10);

/// The human-readable service record name.
pub const SERVICE_NAME: &str = "BlueTalk";

/// The TCP port the Direct-Wi-Fi group host listens on.
pub const DIRECT_WIFI_PORT: u16 = 8988;

/// Bluetooth transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Service UUID registered by the listener and dialled by the
    /// initiator.
    pub service_uuid: Uuid,
    /// Name attached to the service record.
    pub service_name: String,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            service_uuid: SERVICE_UUID,
            service_name: SERVICE_NAME.to_string(),
        }
    }
}

/// Direct-Wi-Fi transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiDirectConfig {
    /// TCP port opened by the group host.
    pub port: u16,
}

impl Default for WifiDirectConfig {
    fn default() -> Self {
        Self {
            port: DIRECT_WIFI_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bluetooth_config_default_uses_shared_uuid() {
        let config = BluetoothConfig::default();
        assert_eq!(
            config.service_uuid.to_string(),
            "6f6a0b2c-5c7a-4d21-9c7f-0f2a4a4c1a10"
        );
        assert_eq!(config.service_name, "BlueTalk");
    }

    #[test]
    fn test_wifi_direct_config_default_port() {
        assert_eq!(WifiDirectConfig::default().port, 8988);
    }
}
