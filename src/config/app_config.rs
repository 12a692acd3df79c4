// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The configuration file as a whole.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::discovery::Device;
use crate::error::ConfigError;
use crate::sensor::DEFAULT_W1_DEVICES_PATH;

use super::{
    ButtonConfig, DiscoveryConfig, GpioConfig, MqttConfig, PumpConfig, TempSensorConfig,
    TimingConfig,
};

/// Default location of the configuration file on the Pi.
pub const DEFAULT_CONFIG_PATH: &str = "/home/pi/config.json";

/// Static configuration of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// GPIO chip.
    #[serde(default, alias = "gpiod")]
    pub gpio: GpioConfig,
    /// Device record shared by every entity.
    pub home_assistant_device: Device,
    /// Heating pumps.
    #[serde(default)]
    pub pumps: Vec<PumpConfig>,
    /// 1-Wire temperature probes.
    #[serde(default)]
    pub temperature_sensors: Vec<TempSensorConfig>,
    /// Push buttons.
    #[serde(default)]
    pub buttons: Vec<ButtonConfig>,
    /// Discovery topic settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Timeouts and intervals.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Root of the 1-Wire device tree.
    #[serde(default = "default_w1_devices_path")]
    pub w1_devices_path: PathBuf,
}

fn default_w1_devices_path() -> PathBuf {
    PathBuf::from(DEFAULT_W1_DEVICES_PATH)
}

impl AppConfig {
    /// Reads, parses and validates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or any error
    /// from [`from_json_str`](Self::from_json_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&raw)?;
        tracing::debug!(
            path = %path.display(),
            pumps = config.pumps.len(),
            buttons = config.buttons.len(),
            sensors = config.temperature_sensors.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed JSON and any error from
    /// [`validate`](Self::validate).
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field consistency.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::DuplicateId`] if two pumps, buttons or sensors share an id
    /// - [`ConfigError::DuplicatePin`] if a pin is used twice
    /// - [`ConfigError::InvalidValue`] for empty names, an empty discovery
    ///   prefix, zero intervals, sensor ids with topic or path separators,
    ///   or an unparsable broker address
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mqtt.broker_address()?;

        if self.discovery.prefix.is_empty() {
            return Err(invalid("discovery.prefix", "must not be empty"));
        }
        if self.timing.temperature_poll_interval_secs == 0 {
            return Err(invalid(
                "timing.temperature_poll_interval_secs",
                "must be greater than zero",
            ));
        }

        unique_ids("pump", self.pumps.iter().map(|p| p.id.to_string()))?;
        unique_ids("button", self.buttons.iter().map(|b| b.id.to_string()))?;
        unique_ids(
            "temperature sensor",
            self.temperature_sensors.iter().map(|s| s.id.clone()),
        )?;

        let mut pins = HashSet::new();
        let used = self
            .pumps
            .iter()
            .map(|p| p.gpio_state_pin)
            .chain(self.buttons.iter().map(|b| b.gpio_input_pin));
        for pin in used {
            if !pins.insert(pin) {
                return Err(ConfigError::DuplicatePin(pin));
            }
        }

        for (index, pump) in self.pumps.iter().enumerate() {
            non_empty(&format!("pumps[{index}].name"), &pump.name)?;
        }
        for (index, button) in self.buttons.iter().enumerate() {
            non_empty(&format!("buttons[{index}].name"), &button.name)?;
        }
        for (index, sensor) in self.temperature_sensors.iter().enumerate() {
            let field = format!("temperature_sensors[{index}].id");
            non_empty(&field, &sensor.id)?;
            path_and_topic_safe(&field, &sensor.id)?;
            non_empty(&format!("temperature_sensors[{index}].name"), &sensor.name)?;
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

/// Sensor ids become an MQTT topic level and a directory name.
fn path_and_topic_safe(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.contains(['/', '+', '#', '\0']) || value.contains("..") {
        return Err(invalid(field, "must not contain '/', '+', '#', NUL or '..'"));
    }
    Ok(())
}

fn unique_ids(
    kind: &'static str,
    ids: impl IntoIterator<Item = String>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.clone()) {
            return Err(ConfigError::DuplicateId { kind, id });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const DEPLOYED: &str = r#"{
        "mqtt": {"addr": "192.168.1.10:1883", "username": "pi", "password": "pw"},
        "gpiod": {"chip": "gpiochip0", "consumer": "heating"},
        "home_assistant_device": {
            "identifiers": ["rpi-heating"],
            "manufacturer": "Raspberry Pi",
            "model": "4B",
            "name": "Heating",
            "sw_version": "1.0",
            "suggested_area": "Basement"
        },
        "pumps": [
            {"id": 1, "name": "Floor", "gpio_state_pin": 17},
            {"id": 2, "name": "Radiators", "gpio_state_pin": 27}
        ],
        "temperature_sensors": [{"id": "28-0000075565fe", "name": "Flow"}],
        "buttons": [{"id": 1, "name": "Boost", "gpio_input_pin": 22, "enable_pull_up": true}]
    }"#;

    #[test]
    fn parses_deployed_layout_with_defaults() {
        let config = AppConfig::from_json_str(DEPLOYED).unwrap();

        assert_eq!(config.mqtt.client_id, "rpi-heating-controller");
        assert_eq!(config.gpio.consumer, "heating");
        assert_eq!(config.gpio.sysfs_path, "/sys/class/gpio");
        assert_eq!(config.pumps.len(), 2);
        assert_eq!(config.buttons[0].gpio_input_pin, 22);
        assert!(config.buttons[0].enable_pull_up);
        assert_eq!(config.discovery.prefix, "homeassistant");
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.w1_devices_path, PathBuf::from("/sys/bus/w1/devices"));
    }

    #[test]
    fn optional_sections_may_be_omitted() {
        let raw = r#"{
            "mqtt": {"addr": "broker"},
            "home_assistant_device": {"name": "Heating"}
        }"#;
        let config = AppConfig::from_json_str(raw).unwrap();
        assert!(config.pumps.is_empty());
        assert!(config.buttons.is_empty());
        assert!(config.temperature_sensors.is_empty());
        assert_eq!(config.gpio, GpioConfig::default());
    }

    #[test]
    fn rejects_duplicate_pump_ids() {
        let mut config = AppConfig::from_json_str(DEPLOYED).unwrap();
        config.pumps[1].id = 1;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateId { kind: "pump", ref id } if id == "1"));
    }

    #[test]
    fn rejects_sensor_ids_that_escape_topic_or_path() {
        for id in ["28-1/extra", "28-+", "#", "../28-1"] {
            let mut config = AppConfig::from_json_str(DEPLOYED).unwrap();
            config.temperature_sensors[0].id = id.to_string();

            let err = config.validate().unwrap_err();
            let ConfigError::InvalidValue { ref field, .. } = err else {
                panic!("{id}: unexpected error {err}");
            };
            assert_eq!(field, "temperature_sensors[0].id", "{id}");
        }
    }

    #[test]
    fn rejects_duplicate_sensor_ids() {
        let mut config = AppConfig::from_json_str(DEPLOYED).unwrap();
        let sensor = config.temperature_sensors[0].clone();
        config.temperature_sensors.push(sensor);

        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateId {
                kind: "temperature sensor",
                ..
            })
        ));
    }

    #[test]
    fn rejects_pin_shared_by_pump_and_button() {
        let mut config = AppConfig::from_json_str(DEPLOYED).unwrap();
        config.buttons[0].gpio_input_pin = 17;

        assert!(matches!(config.validate(), Err(ConfigError::DuplicatePin(17))));
    }

    #[test]
    fn rejects_empty_names() {
        let mut config = AppConfig::from_json_str(DEPLOYED).unwrap();
        config.buttons[0].name = "  ".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("buttons[0].name"));
    }

    #[test]
    fn rejects_bad_broker_address() {
        let raw = DEPLOYED.replace("192.168.1.10:1883", "192.168.1.10:port");
        assert!(matches!(
            AppConfig::from_json_str(&raw),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "mqtt.addr"
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            AppConfig::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DEPLOYED.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.home_assistant_device.name.as_deref(), Some("Heating"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AppConfig::load("/nonexistent/heating/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path.contains("nonexistent")));
    }
}
