// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GPIO lines through the Linux sysfs interface.
//!
//! Outputs are plain reads and writes of `gpioN/value`. Inputs are sampled
//! by a watcher thread every debounce period; a level that holds for two
//! consecutive samples becomes an edge on the [`EdgeBus`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::HardwareError;
use crate::types::LineLevel;

use super::line::{InputLine, InputOptions, LineSource, OutputLine};
use super::{EdgeBus, EdgeEvent, EdgeKind};

/// Default location of the sysfs GPIO class.
pub const DEFAULT_SYSFS_PATH: &str = "/sys/class/gpio";

/// Lower bound for the sampling period of input watchers.
const MIN_SAMPLE_PERIOD: Duration = Duration::from_millis(1);

/// A GPIO chip backed by `/sys/class/gpio`.
#[derive(Debug, Clone)]
pub struct SysfsChip {
    base: PathBuf,
    bus: EdgeBus,
}

impl SysfsChip {
    /// Creates a chip rooted at `base` that dispatches input edges to `bus`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>, bus: EdgeBus) -> Self {
        Self {
            base: base.into(),
            bus,
        }
    }

    /// Exports `pin` if needed, sets its direction and returns the value path.
    fn prepare(&self, pin: u32, direction: &str) -> Result<PathBuf, HardwareError> {
        let dir = self.base.join(format!("gpio{pin}"));
        if !dir.exists() {
            fs::write(self.base.join("export"), pin.to_string()).map_err(|e| {
                HardwareError::RequestFailed {
                    pin,
                    message: format!("export failed: {e}"),
                }
            })?;
        }
        fs::write(dir.join("direction"), direction).map_err(|e| HardwareError::RequestFailed {
            pin,
            message: format!("setting direction {direction} failed: {e}"),
        })?;
        Ok(dir.join("value"))
    }
}

impl LineSource for SysfsChip {
    fn request_output(
        &self,
        pin: u32,
        initial: LineLevel,
    ) -> Result<Box<dyn OutputLine>, HardwareError> {
        let value_path = self.prepare(pin, "out")?;
        write_level(pin, &value_path, initial)?;
        tracing::debug!(pin, level = %initial, "Requested sysfs output line");

        Ok(Box::new(SysfsOutputLine {
            pin,
            value_path,
            closed: AtomicBool::new(false),
        }))
    }

    fn request_input(
        &self,
        pin: u32,
        options: InputOptions,
    ) -> Result<Box<dyn InputLine>, HardwareError> {
        let value_path = self.prepare(pin, "in")?;
        if options.pull_up {
            tracing::warn!(pin, "sysfs cannot configure bias; enable the pull-up in the device tree");
        }

        let stop = Arc::new(AtomicBool::new(false));
        let watcher = EdgeWatcher {
            pin,
            value_path: value_path.clone(),
            bus: self.bus.clone(),
            period: options.debounce.max(MIN_SAMPLE_PERIOD),
            stop: Arc::clone(&stop),
        };
        thread::Builder::new()
            .name(format!("gpio{pin}-edges"))
            .spawn(move || watcher.run())
            .map_err(|e| HardwareError::RequestFailed {
                pin,
                message: format!("failed to start edge watcher: {e}"),
            })?;
        tracing::debug!(pin, debounce_ms = options.debounce.as_millis(), "Requested sysfs input line");

        Ok(Box::new(SysfsInputLine {
            pin,
            value_path,
            stop,
        }))
    }
}

fn read_level(pin: u32, path: &Path) -> Result<LineLevel, HardwareError> {
    let raw = fs::read_to_string(path).map_err(|source| HardwareError::Io { pin, source })?;
    match raw.trim() {
        "0" => Ok(LineLevel::Low),
        "1" => Ok(LineLevel::High),
        other => Err(HardwareError::InvalidValue {
            pin,
            value: other.to_string(),
        }),
    }
}

fn write_level(pin: u32, path: &Path, level: LineLevel) -> Result<(), HardwareError> {
    fs::write(path, level.to_string()).map_err(|source| HardwareError::Io { pin, source })
}

#[derive(Debug)]
struct SysfsOutputLine {
    pin: u32,
    value_path: PathBuf,
    closed: AtomicBool,
}

impl SysfsOutputLine {
    fn ensure_open(&self) -> Result<(), HardwareError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HardwareError::Closed(self.pin));
        }
        Ok(())
    }
}

impl OutputLine for SysfsOutputLine {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn set_value(&self, level: LineLevel) -> Result<(), HardwareError> {
        self.ensure_open()?;
        write_level(self.pin, &self.value_path, level)
    }

    fn value(&self) -> Result<LineLevel, HardwareError> {
        self.ensure_open()?;
        read_level(self.pin, &self.value_path)
    }

    fn close(&self) -> Result<(), HardwareError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[derive(Debug)]
struct SysfsInputLine {
    pin: u32,
    value_path: PathBuf,
    stop: Arc<AtomicBool>,
}

impl InputLine for SysfsInputLine {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn value(&self) -> Result<LineLevel, HardwareError> {
        if self.stop.load(Ordering::Acquire) {
            return Err(HardwareError::Closed(self.pin));
        }
        read_level(self.pin, &self.value_path)
    }

    fn close(&self) -> Result<(), HardwareError> {
        self.stop.store(true, Ordering::Release);
        Ok(())
    }
}

impl Drop for SysfsInputLine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

struct EdgeWatcher {
    pin: u32,
    value_path: PathBuf,
    bus: EdgeBus,
    period: Duration,
    stop: Arc<AtomicBool>,
}

impl EdgeWatcher {
    fn run(self) {
        let mut stable = match read_level(self.pin, &self.value_path) {
            Ok(level) => level,
            Err(e) => {
                tracing::warn!(pin = self.pin, error = %e, "Initial read failed, assuming low");
                LineLevel::Low
            }
        };
        let mut previous = stable;

        while !self.stop.load(Ordering::Acquire) {
            thread::sleep(self.period);
            let level = match read_level(self.pin, &self.value_path) {
                Ok(level) => level,
                Err(e) => {
                    tracing::warn!(pin = self.pin, error = %e, "Failed to sample input line");
                    continue;
                }
            };

            if level == previous && level != stable && !self.stop.load(Ordering::Acquire) {
                stable = level;
                let kind = match level {
                    LineLevel::High => EdgeKind::Rising,
                    LineLevel::Low => EdgeKind::Falling,
                };
                self.bus.dispatch_blocking(&EdgeEvent::now(self.pin, kind));
            }
            previous = level;
        }
        tracing::debug!(pin = self.pin, "Edge watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(pins: &[(u32, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (pin, value) in pins {
            let line = dir.path().join(format!("gpio{pin}"));
            fs::create_dir(&line).unwrap();
            fs::write(line.join("direction"), "in").unwrap();
            fs::write(line.join("value"), value).unwrap();
        }
        dir
    }

    #[test]
    fn output_line_writes_value_file() {
        let dir = fake_sysfs(&[(17, "1\n")]);
        let chip = SysfsChip::new(dir.path(), EdgeBus::new());

        let line = chip.request_output(17, LineLevel::Low).unwrap();
        let gpio = dir.path().join("gpio17");
        assert_eq!(fs::read_to_string(gpio.join("direction")).unwrap(), "out");
        assert_eq!(line.value().unwrap(), LineLevel::Low);

        line.set_value(LineLevel::High).unwrap();
        assert_eq!(fs::read_to_string(gpio.join("value")).unwrap(), "1");
        assert_eq!(line.value().unwrap(), LineLevel::High);
    }

    #[test]
    fn missing_line_is_exported() {
        let dir = fake_sysfs(&[]);
        let chip = SysfsChip::new(dir.path(), EdgeBus::new());

        // The export file is written even though no kernel creates gpio5/.
        let err = chip.request_output(5, LineLevel::Low).unwrap_err();
        assert!(matches!(err, HardwareError::RequestFailed { pin: 5, .. }));
        assert_eq!(fs::read_to_string(dir.path().join("export")).unwrap(), "5");
    }

    #[test]
    fn garbage_value_is_rejected() {
        let dir = fake_sysfs(&[(17, "0")]);
        let chip = SysfsChip::new(dir.path(), EdgeBus::new());
        let line = chip.request_output(17, LineLevel::Low).unwrap();

        fs::write(dir.path().join("gpio17/value"), "x").unwrap();
        assert!(matches!(
            line.value(),
            Err(HardwareError::InvalidValue { pin: 17, .. })
        ));
    }

    #[test]
    fn closed_output_rejects_writes() {
        let dir = fake_sysfs(&[(17, "0")]);
        let chip = SysfsChip::new(dir.path(), EdgeBus::new());
        let line = chip.request_output(17, LineLevel::Low).unwrap();
        line.close().unwrap();

        assert!(matches!(
            line.set_value(LineLevel::High),
            Err(HardwareError::Closed(17))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn input_level_change_becomes_edge() {
        let dir = fake_sysfs(&[(4, "1")]);
        let bus = EdgeBus::new();
        let chip = SysfsChip::new(dir.path(), bus.clone());
        let mut sub = bus.subscribe(4, "1").unwrap();

        let options = InputOptions {
            pull_up: true,
            debounce: Duration::from_millis(5),
        };
        let line = chip.request_input(4, options).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        fs::write(dir.path().join("gpio4/value"), "0").unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.line, 4);
        assert_eq!(event.kind, EdgeKind::Falling);

        line.close().unwrap();
    }
}
