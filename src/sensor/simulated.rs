// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory temperature source.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SensorError;

use super::TemperatureSource;

#[derive(Debug, Clone, Copy)]
enum Reading {
    Celsius(f64),
    Failing,
}

/// Temperature source backed by a map of fixed readings.
///
/// Unknown sensors fail with [`SensorError::UnknownSensor`]. Clones share
/// the same readings.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTemperatures {
    readings: Arc<RwLock<HashMap<String, Reading>>>,
}

impl SimulatedTemperatures {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value returned for `sensor_id`.
    pub fn set(&self, sensor_id: impl Into<String>, celsius: f64) {
        self.readings
            .write()
            .insert(sensor_id.into(), Reading::Celsius(celsius));
    }

    /// Makes reads of `sensor_id` fail as if the CRC check failed.
    pub fn fail(&self, sensor_id: impl Into<String>) {
        self.readings.write().insert(sensor_id.into(), Reading::Failing);
    }
}

impl TemperatureSource for SimulatedTemperatures {
    async fn read_celsius(&self, sensor_id: &str) -> Result<f64, SensorError> {
        let reading = self.readings.read().get(sensor_id).copied();
        match reading {
            Some(Reading::Celsius(celsius)) => Ok(celsius),
            Some(Reading::Failing) => Err(SensorError::CrcMismatch(sensor_id.to_string())),
            None => Err(SensorError::UnknownSensor(sensor_id.to_string())),
        }
    }
}
