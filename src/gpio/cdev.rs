// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GPIO lines through the Linux character device (`/dev/gpiochipN`).
//!
//! Unlike sysfs, the kernel does the edge detection, the debouncing and the
//! pull-up bias. A reader thread per input line waits for kernel edge events
//! and dispatches them on the [`EdgeBus`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use gpiocdev::Request;
use gpiocdev::line::{Bias, EdgeDetection, Value};
use parking_lot::Mutex;

use crate::error::HardwareError;
use crate::types::LineLevel;

use super::line::{InputLine, InputOptions, LineSource, OutputLine};
use super::{EdgeBus, EdgeEvent, EdgeKind};

/// How long a reader waits for an edge before rechecking its stop flag.
const EDGE_WAIT: Duration = Duration::from_millis(100);

/// A GPIO chip opened through its character device.
#[derive(Debug, Clone)]
pub struct CdevChip {
    path: PathBuf,
    consumer: String,
    bus: EdgeBus,
}

impl CdevChip {
    /// Creates a chip for `chip` (a name such as `gpiochip0` or a device
    /// path) that labels its lines with `consumer`.
    #[must_use]
    pub fn new(chip: &str, consumer: impl Into<String>, bus: EdgeBus) -> Self {
        Self {
            path: chip_path(chip),
            consumer: consumer.into(),
            bus,
        }
    }

    /// Returns the character device path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn request_failed(&self, pin: u32, error: &gpiocdev::Error) -> HardwareError {
        HardwareError::RequestFailed {
            pin,
            message: format!("{}: {error}", self.path.display()),
        }
    }
}

/// Resolves a bare chip name to its device node.
fn chip_path(chip: &str) -> PathBuf {
    if chip.contains('/') {
        PathBuf::from(chip)
    } else {
        PathBuf::from("/dev").join(chip)
    }
}

fn to_value(level: LineLevel) -> Value {
    match level {
        LineLevel::High => Value::Active,
        LineLevel::Low => Value::Inactive,
    }
}

fn to_level(value: Value) -> LineLevel {
    match value {
        Value::Active => LineLevel::High,
        Value::Inactive => LineLevel::Low,
    }
}

fn line_io(pin: u32, error: &gpiocdev::Error) -> HardwareError {
    HardwareError::Io {
        pin,
        source: std::io::Error::other(error.to_string()),
    }
}

impl LineSource for CdevChip {
    fn request_output(
        &self,
        pin: u32,
        initial: LineLevel,
    ) -> Result<Box<dyn OutputLine>, HardwareError> {
        let request = Request::builder()
            .on_chip(self.path.clone())
            .with_consumer(self.consumer.as_str())
            .with_line(pin)
            .as_output(to_value(initial))
            .request()
            .map_err(|e| self.request_failed(pin, &e))?;
        tracing::debug!(pin, level = %initial, chip = %self.path.display(), "Requested output line");

        Ok(Box::new(CdevOutputLine {
            pin,
            request: Mutex::new(Some(request)),
        }))
    }

    fn request_input(
        &self,
        pin: u32,
        options: InputOptions,
    ) -> Result<Box<dyn InputLine>, HardwareError> {
        let mut builder = Request::builder();
        builder
            .on_chip(self.path.clone())
            .with_consumer(self.consumer.as_str())
            .with_line(pin)
            .as_input()
            .with_edge_detection(EdgeDetection::BothEdges)
            .with_debounce_period(options.debounce);
        if options.pull_up {
            builder.with_bias(Bias::PullUp);
        }
        let request = Arc::new(Mutex::new(
            builder.request().map_err(|e| self.request_failed(pin, &e))?,
        ));

        let stop = Arc::new(AtomicBool::new(false));
        let reader = EdgeReader {
            pin,
            request: Arc::clone(&request),
            bus: self.bus.clone(),
            stop: Arc::clone(&stop),
        };
        thread::Builder::new()
            .name(format!("gpio{pin}-edges"))
            .spawn(move || reader.run())
            .map_err(|e| HardwareError::RequestFailed {
                pin,
                message: format!("failed to start edge reader: {e}"),
            })?;
        tracing::debug!(
            pin,
            pull_up = options.pull_up,
            debounce_ms = options.debounce.as_millis(),
            "Requested input line"
        );

        Ok(Box::new(CdevInputLine { pin, request, stop }))
    }
}

/// The request is dropped on close, which releases the line.
struct CdevOutputLine {
    pin: u32,
    request: Mutex<Option<Request>>,
}

impl fmt::Debug for CdevOutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdevOutputLine")
            .field("pin", &self.pin)
            .field("open", &self.request.lock().is_some())
            .finish()
    }
}

impl OutputLine for CdevOutputLine {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn set_value(&self, level: LineLevel) -> Result<(), HardwareError> {
        let guard = self.request.lock();
        let request = guard.as_ref().ok_or(HardwareError::Closed(self.pin))?;
        request
            .set_value(self.pin, to_value(level))
            .map_err(|e| line_io(self.pin, &e))?;
        Ok(())
    }

    fn value(&self) -> Result<LineLevel, HardwareError> {
        let guard = self.request.lock();
        let request = guard.as_ref().ok_or(HardwareError::Closed(self.pin))?;
        request
            .value(self.pin)
            .map(to_level)
            .map_err(|e| line_io(self.pin, &e))
    }

    fn close(&self) -> Result<(), HardwareError> {
        self.request.lock().take();
        Ok(())
    }
}

struct CdevInputLine {
    pin: u32,
    request: Arc<Mutex<Request>>,
    stop: Arc<AtomicBool>,
}

impl fmt::Debug for CdevInputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdevInputLine")
            .field("pin", &self.pin)
            .field("stopped", &self.stop.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl InputLine for CdevInputLine {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn value(&self) -> Result<LineLevel, HardwareError> {
        if self.stop.load(Ordering::Acquire) {
            return Err(HardwareError::Closed(self.pin));
        }
        self.request
            .lock()
            .value(self.pin)
            .map(to_level)
            .map_err(|e| line_io(self.pin, &e))
    }

    fn close(&self) -> Result<(), HardwareError> {
        self.stop.store(true, Ordering::Release);
        Ok(())
    }
}

impl Drop for CdevInputLine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Owns a clone of the request; the line is released once both the reader
/// and the [`CdevInputLine`] are gone.
struct EdgeReader {
    pin: u32,
    request: Arc<Mutex<Request>>,
    bus: EdgeBus,
    stop: Arc<AtomicBool>,
}

impl EdgeReader {
    fn run(self) {
        while !self.stop.load(Ordering::Acquire) {
            let event = {
                let request = self.request.lock();
                match request.wait_edge_event(EDGE_WAIT) {
                    Ok(true) => request.read_edge_event(),
                    Ok(false) => continue,
                    Err(e) => Err(e),
                }
            };
            match event {
                Ok(event) if !self.stop.load(Ordering::Acquire) => {
                    let kind = match event.kind {
                        gpiocdev::line::EdgeKind::Rising => EdgeKind::Rising,
                        gpiocdev::line::EdgeKind::Falling => EdgeKind::Falling,
                    };
                    self.bus.dispatch_blocking(&EdgeEvent::now(self.pin, kind));
                }
                Ok(_) => break,
                Err(e) => {
                    tracing::warn!(pin = self.pin, error = %e, "Failed to read edge event");
                    thread::sleep(EDGE_WAIT);
                }
            }
        }
        tracing::debug!(pin = self.pin, "Edge reader stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_chip_name_resolves_under_dev() {
        let chip = CdevChip::new("gpiochip0", "heating", EdgeBus::new());
        assert_eq!(chip.path(), Path::new("/dev/gpiochip0"));
    }

    #[test]
    fn chip_path_is_kept() {
        let chip = CdevChip::new("/dev/gpiochip4", "heating", EdgeBus::new());
        assert_eq!(chip.path(), Path::new("/dev/gpiochip4"));
    }

    #[test]
    fn levels_map_to_line_values() {
        assert_eq!(to_value(LineLevel::High), Value::Active);
        assert_eq!(to_level(to_value(LineLevel::Low)), LineLevel::Low);
    }

    #[test]
    fn missing_chip_fails_request_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gpiochip9");
        let chip = CdevChip::new(missing.to_str().unwrap(), "heating", EdgeBus::new());

        let err = chip.request_output(17, LineLevel::Low).unwrap_err();
        assert!(matches!(
            err,
            HardwareError::RequestFailed { pin: 17, ref message } if message.contains("gpiochip9")
        ));

        let options = InputOptions {
            pull_up: true,
            ..InputOptions::default()
        };
        let err = chip.request_input(22, options).unwrap_err();
        assert!(matches!(err, HardwareError::RequestFailed { pin: 22, .. }));
    }
}
