// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity controllers.
//!
//! One controller per entity family drives the discovery lifecycle for all
//! entities of that family:
//!
//! - [`SwitchController`]: heating pumps, with inbound commands
//! - [`BinarySensorController`]: push buttons, fed by the edge-event bus
//! - [`TemperatureSensorController`]: 1-Wire probes, fed by a poller
//!
//! Each publishes the retained discovery configs, announces `online`,
//! reports state and only then enters [`LifecycleState::Running`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use heating_bridge::config::PumpConfig;
//! use heating_bridge::controller::{ControllerSettings, SwitchController};
//! use heating_bridge::discovery::Device;
//! use heating_bridge::event::EventBus;
//! use heating_bridge::gpio::{EdgeBus, SimulatedChip};
//! use heating_bridge::protocol::LoopbackTransport;
//! use heating_bridge::pump::PumpActuator;
//!
//! # async fn example() -> heating_bridge::Result<()> {
//! let pumps = vec![PumpConfig { id: 1, name: "Floor".into(), gpio_state_pin: 17 }];
//! let chip = SimulatedChip::new(EdgeBus::new());
//! let actuator = Arc::new(PumpActuator::new(&chip, &pumps)?);
//!
//! let settings = ControllerSettings::new(Device::new("rpi-heating", "Heating"));
//! let switches = SwitchController::start(
//!     LoopbackTransport::new(),
//!     &settings,
//!     EventBus::new(),
//!     actuator,
//!     &pumps,
//! )
//! .await?;
//!
//! switches.close().await?;
//! # Ok(())
//! # }
//! ```

mod binary_sensor;
mod core;
mod lifecycle;
mod publisher;
mod switch;
mod temperature;

use std::sync::Arc;

use crate::config::{AppConfig, TimingConfig};
use crate::discovery::{DEFAULT_DISCOVERY_PREFIX, Device};

pub use binary_sensor::{BinarySensorController, edge_state};
pub use lifecycle::{ControllerKind, LifecycleState};
pub use publisher::{OFFLINE, ONLINE};
pub use switch::SwitchController;
pub use temperature::TemperatureSensorController;

/// Settings shared by every controller.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Discovery topic prefix.
    pub prefix: String,
    /// Device every entity is grouped under.
    pub device: Arc<Device>,
    /// Timeouts, pacing and polling period.
    pub timing: TimingConfig,
}

impl ControllerSettings {
    /// Creates settings with the default prefix and timing.
    #[must_use]
    pub fn new(device: Device) -> Self {
        Self {
            prefix: DEFAULT_DISCOVERY_PREFIX.to_string(),
            device: Arc::new(device),
            timing: TimingConfig::default(),
        }
    }

    /// Takes the prefix, device and timing from the configuration file.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            prefix: config.discovery.prefix.clone(),
            device: Arc::new(config.home_assistant_device.clone()),
            timing: config.timing.clone(),
        }
    }
}
