// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Individual sections of the configuration file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::DEFAULT_DISCOVERY_PREFIX;
use crate::error::ConfigError;
use crate::gpio::DEFAULT_SYSFS_PATH;

/// Client id used when the file does not set one.
pub const DEFAULT_CLIENT_ID: &str = "rpi-heating-controller";

/// Default MQTT port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker address: `host`, `host:port`, `mqtt://host:port` or `tcp://host:port`.
    pub addr: String,
    /// Username, empty for anonymous access.
    #[serde(default)]
    pub username: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// MQTT client id.
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

/// A parsed broker address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    /// Host name or IP.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl MqttConfig {
    /// Parses [`addr`](Self::addr) into host and port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an empty host or a bad port.
    pub fn broker_address(&self) -> Result<BrokerAddress, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            field: "mqtt.addr".to_string(),
            message,
        };

        let url = self
            .addr
            .strip_prefix("mqtt://")
            .or_else(|| self.addr.strip_prefix("tcp://"))
            .unwrap_or(&self.addr);

        let (host, port) = if let Some((h, p)) = url.rsplit_once(':') {
            let port = p
                .parse()
                .map_err(|_| invalid(format!("invalid port: {p}")))?;
            (h, port)
        } else {
            (url, DEFAULT_MQTT_PORT)
        };

        if host.is_empty() {
            return Err(invalid("missing host".to_string()));
        }

        Ok(BrokerAddress {
            host: host.to_string(),
            port,
        })
    }

    /// Returns `Some((username, password))` when credentials are configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        (!self.username.is_empty()).then_some((self.username.as_str(), self.password.as_str()))
    }
}

/// Kernel interface used to drive the GPIO lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    /// `/dev/gpiochipN`, with kernel edge detection, debounce and bias.
    #[default]
    Cdev,
    /// `/sys/class/gpio`, polled; cannot configure pull-ups.
    Sysfs,
}

/// GPIO chip settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioConfig {
    /// Which kernel interface to use.
    #[serde(default)]
    pub backend: GpioBackend,
    /// Chip name, e.g. `gpiochip0`.
    #[serde(default = "default_chip")]
    pub chip: String,
    /// Consumer label attached to requested lines.
    #[serde(default = "default_consumer")]
    pub consumer: String,
    /// Root of the sysfs GPIO class, used by the sysfs backend.
    #[serde(default = "default_sysfs_path")]
    pub sysfs_path: String,
}

fn default_chip() -> String {
    "gpiochip0".to_string()
}

fn default_consumer() -> String {
    "heating-bridge".to_string()
}

fn default_sysfs_path() -> String {
    DEFAULT_SYSFS_PATH.to_string()
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            backend: GpioBackend::default(),
            chip: default_chip(),
            consumer: default_consumer(),
            sysfs_path: default_sysfs_path(),
        }
    }
}

/// A heating pump driven by an output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpConfig {
    /// Pump identifier.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Output pin driving the relay.
    pub gpio_state_pin: u32,
}

/// A DS18B20 probe on the 1-Wire bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempSensorConfig {
    /// 1-Wire device id, e.g. `28-0000075565fe`.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A push button on an input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonConfig {
    /// Button identifier.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Input pin.
    pub gpio_input_pin: u32,
    /// Whether to request the internal pull-up.
    #[serde(default)]
    pub enable_pull_up: bool,
}

/// Discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Topic prefix Home Assistant listens on.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    DEFAULT_DISCOVERY_PREFIX.to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

/// Timeouts, pacing and polling intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Bound on each discovery config publish.
    pub config_publish_timeout_ms: u64,
    /// Bound on availability and state publishes, subscribes and unsubscribes.
    pub publish_timeout_ms: u64,
    /// Delay between successive discovery config publishes.
    pub publish_pacing_ms: u64,
    /// Temperature polling period.
    pub temperature_poll_interval_secs: u64,
    /// Button debounce period.
    pub button_debounce_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            config_publish_timeout_ms: 10_000,
            publish_timeout_ms: 2_000,
            publish_pacing_ms: 100,
            temperature_poll_interval_secs: 30,
            button_debounce_ms: 20,
        }
    }
}

impl TimingConfig {
    /// Bound on each discovery config publish.
    #[must_use]
    pub fn config_publish_timeout(&self) -> Duration {
        Duration::from_millis(self.config_publish_timeout_ms)
    }

    /// Bound on every other transport operation.
    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// Delay between successive discovery config publishes.
    #[must_use]
    pub fn publish_pacing(&self) -> Duration {
        Duration::from_millis(self.publish_pacing_ms)
    }

    /// Temperature polling period.
    #[must_use]
    pub fn temperature_poll_interval(&self) -> Duration {
        Duration::from_secs(self.temperature_poll_interval_secs)
    }

    /// Button debounce period.
    #[must_use]
    pub fn button_debounce(&self) -> Duration {
        Duration::from_millis(self.button_debounce_ms)
    }
}
