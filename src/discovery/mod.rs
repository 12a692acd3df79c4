// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Home Assistant MQTT discovery: topic naming and payloads.
//!
//! Everything here is a pure function of static configuration. Controllers
//! build one [`Entity`] per configured pump, button or sensor and publish
//! its [`DiscoveryPayload`] retained on the config topic.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use heating_bridge::discovery::{Device, Entity, EntityKind, DEFAULT_DISCOVERY_PREFIX};
//!
//! let device = Arc::new(Device::new("rpi-heating", "Heating"));
//! let sensor = Entity::new(
//!     DEFAULT_DISCOVERY_PREFIX,
//!     EntityKind::TemperatureSensor,
//!     "28-0000075565fe",
//!     "Flow temperature",
//!     device,
//! );
//!
//! assert_eq!(sensor.topics().state(), "homeassistant/sensor/temp_28-0000075565fe/state");
//! let json = sensor.discovery_json().unwrap();
//! assert!(json.contains(r#""unit_of_measurement":"°C""#));
//! ```

mod device;
mod entity;
mod topics;

pub use device::Device;
pub use entity::{DiscoveryPayload, Entity, EntityIdentity, EntityTable};
pub use topics::{DEFAULT_DISCOVERY_PREFIX, EntityKind, TopicSet};
