// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Temperature sources.
//!
//! [`TemperatureSource`] is the narrow interface the temperature controller
//! polls. [`W1TemperatureSource`] reads DS18B20 probes through the kernel's
//! 1-Wire sysfs tree; [`SimulatedTemperatures`] serves fixed values for bench
//! runs and tests.

mod simulated;
mod w1;

use std::future::Future;

use crate::error::SensorError;

pub use simulated::SimulatedTemperatures;
pub use w1::{DEFAULT_W1_DEVICES_PATH, W1TemperatureSource, parse_w1_slave};

/// Reads the current temperature of a sensor in degrees Celsius.
pub trait TemperatureSource: Send + Sync + 'static {
    /// Reads sensor `sensor_id`.
    fn read_celsius(&self, sensor_id: &str)
    -> impl Future<Output = Result<f64, SensorError>> + Send;
}

/// Formats a reading the way it is published: two fraction digits.
///
/// ```
/// assert_eq!(heating_bridge::sensor::format_temperature(21.5), "21.50");
/// assert_eq!(heating_bridge::sensor::format_temperature(-3.0), "-3.00");
/// ```
#[must_use]
pub fn format_temperature(celsius: f64) -> String {
    format!("{celsius:.2}")
}
