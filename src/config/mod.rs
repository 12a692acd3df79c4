// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static configuration loaded from a JSON file at startup.

mod app_config;
mod sections;

pub use app_config::{AppConfig, DEFAULT_CONFIG_PATH};
pub use sections::{
    BrokerAddress, ButtonConfig, DEFAULT_CLIENT_ID, DEFAULT_MQTT_PORT, DiscoveryConfig,
    GpioBackend, GpioConfig, MqttConfig, PumpConfig, TempSensorConfig, TimingConfig,
};
