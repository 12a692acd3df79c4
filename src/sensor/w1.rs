// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DS18B20 probes via `/sys/bus/w1/devices/<id>/w1_slave`.
//!
//! The kernel driver exposes two lines per read:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line must end in `YES` (CRC ok); the value after the last `t=`
//! is the temperature in milli-degrees Celsius.

use std::path::PathBuf;

use crate::error::SensorError;

use super::TemperatureSource;

/// Default root of the kernel's 1-Wire device tree.
pub const DEFAULT_W1_DEVICES_PATH: &str = "/sys/bus/w1/devices";

/// Reads DS18B20 probes from the 1-Wire sysfs tree.
#[derive(Debug, Clone)]
pub struct W1TemperatureSource {
    base: PathBuf,
}

impl W1TemperatureSource {
    /// Creates a source rooted at `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn slave_path(&self, sensor_id: &str) -> PathBuf {
        self.base.join(sensor_id).join("w1_slave")
    }
}

impl Default for W1TemperatureSource {
    fn default() -> Self {
        Self::new(DEFAULT_W1_DEVICES_PATH)
    }
}

impl TemperatureSource for W1TemperatureSource {
    async fn read_celsius(&self, sensor_id: &str) -> Result<f64, SensorError> {
        let path = self.slave_path(sensor_id);
        tracing::debug!(sensor = %sensor_id, path = %path.display(), "Reading sensor");

        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| SensorError::Io {
                id: sensor_id.to_string(),
                path: path.display().to_string(),
                source,
            })?;

        parse_w1_slave(sensor_id, &raw)
    }
}

/// Parses the contents of a `w1_slave` file into degrees Celsius.
///
/// # Errors
///
/// - [`SensorError::CrcMismatch`] if the CRC line does not say `YES`
/// - [`SensorError::MissingValue`] if there is no `t=` field
/// - [`SensorError::InvalidValue`] if the value is not a number
pub fn parse_w1_slave(sensor_id: &str, raw: &str) -> Result<f64, SensorError> {
    if !raw.contains(" YES") {
        return Err(SensorError::CrcMismatch(sensor_id.to_string()));
    }

    let (_, value) = raw
        .rsplit_once("t=")
        .ok_or_else(|| SensorError::MissingValue(sensor_id.to_string()))?;
    let value = value.trim();

    let millis: f64 = value.parse().map_err(|_| SensorError::InvalidValue {
        id: sensor_id.to_string(),
        raw: value.to_string(),
    })?;

    Ok(millis / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n\
                        72 01 4b 46 7f ff 0e 10 57 t=23125\n";

    #[test]
    fn parses_valid_reading() {
        let celsius = parse_w1_slave("28-1", GOOD).unwrap();
        assert!((celsius - 23.125).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_negative_reading() {
        let raw = "ff ff : crc=aa YES\nff ff t=-1250\n";
        let celsius = parse_w1_slave("28-1", raw).unwrap();
        assert!((celsius + 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_bad_crc() {
        let raw = GOOD.replace("YES", "NO");
        assert!(matches!(
            parse_w1_slave("28-1", &raw),
            Err(SensorError::CrcMismatch(id)) if id == "28-1"
        ));
    }

    #[test]
    fn rejects_missing_value() {
        let raw = "72 01 : crc=57 YES\n72 01\n";
        assert!(matches!(
            parse_w1_slave("28-1", raw),
            Err(SensorError::MissingValue(_))
        ));
    }

    #[test]
    fn rejects_garbage_value() {
        let raw = "72 01 : crc=57 YES\n72 01 t=abc\n";
        assert!(matches!(
            parse_w1_slave("28-1", raw),
            Err(SensorError::InvalidValue { raw, .. }) if raw == "abc"
        ));
    }

    #[tokio::test]
    async fn reads_from_device_tree() {
        let dir = tempfile::tempdir().unwrap();
        let device = dir.path().join("28-0000075565fe");
        std::fs::create_dir(&device).unwrap();
        std::fs::write(device.join("w1_slave"), GOOD).unwrap();

        let source = W1TemperatureSource::new(dir.path());
        let celsius = source.read_celsius("28-0000075565fe").await.unwrap();
        assert!((celsius - 23.125).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn missing_device_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = W1TemperatureSource::new(dir.path());

        let err = source.read_celsius("28-missing").await.unwrap_err();
        assert!(matches!(err, SensorError::Io { ref id, .. } if id == "28-missing"));
    }
}
