// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Narrow interfaces over GPIO chips and lines.

use std::fmt;
use std::time::Duration;

use crate::error::HardwareError;
use crate::types::LineLevel;

/// Default debounce period for edge-capable inputs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(20);

/// A line requested as output.
pub trait OutputLine: Send + Sync + fmt::Debug {
    /// Returns the pin offset.
    fn pin(&self) -> u32;

    /// Drives the line.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] if the line cannot be written or is closed.
    fn set_value(&self, level: LineLevel) -> Result<(), HardwareError>;

    /// Reads the current level back from the hardware.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] if the line cannot be read or is closed.
    fn value(&self) -> Result<LineLevel, HardwareError>;

    /// Releases the line.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] if the release fails.
    fn close(&self) -> Result<(), HardwareError>;
}

/// An edge-capable line requested as input.
///
/// Edges are delivered to the [`EdgeBus`](super::EdgeBus) the chip was
/// created with.
pub trait InputLine: Send + Sync + fmt::Debug {
    /// Returns the pin offset.
    fn pin(&self) -> u32;

    /// Reads the current level.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] if the line cannot be read or is closed.
    fn value(&self) -> Result<LineLevel, HardwareError>;

    /// Stops edge detection and releases the line.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] if the release fails.
    fn close(&self) -> Result<(), HardwareError>;
}

/// Options for an edge-capable input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputOptions {
    /// Enable the internal pull-up resistor.
    pub pull_up: bool,
    /// Transitions shorter than this are ignored.
    pub debounce: Duration,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self {
            pull_up: false,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// A GPIO chip that hands out lines.
pub trait LineSource: Send + Sync {
    /// Requests `pin` as an output driven to `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::RequestFailed`] if the line is unavailable.
    fn request_output(
        &self,
        pin: u32,
        initial: LineLevel,
    ) -> Result<Box<dyn OutputLine>, HardwareError>;

    /// Requests `pin` as an input reporting both edges.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::RequestFailed`] if the line is unavailable.
    fn request_input(
        &self,
        pin: u32,
        options: InputOptions,
    ) -> Result<Box<dyn InputLine>, HardwareError>;
}
