// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Input lines for the configured push buttons.

use std::time::Duration;

use crate::config::ButtonConfig;
use crate::error::HardwareError;

use super::line::{InputLine, InputOptions, LineSource};

/// Owns the edge-capable input line of every configured button.
///
/// Edges detected on these lines reach the [`EdgeBus`](super::EdgeBus) the
/// line source was built with.
#[derive(Debug)]
pub struct ButtonInputs {
    lines: Vec<Box<dyn InputLine>>,
}

impl ButtonInputs {
    /// Requests one input per button, both edges, with `debounce`.
    ///
    /// # Errors
    ///
    /// Returns the first [`HardwareError`]; lines requested before the
    /// failure are released.
    pub fn request(
        source: &dyn LineSource,
        buttons: &[ButtonConfig],
        debounce: Duration,
    ) -> Result<Self, HardwareError> {
        let mut inputs = Self {
            lines: Vec::with_capacity(buttons.len()),
        };
        for button in buttons {
            let options = InputOptions {
                pull_up: button.enable_pull_up,
                debounce,
            };
            match source.request_input(button.gpio_input_pin, options) {
                Ok(line) => inputs.lines.push(line),
                Err(e) => {
                    tracing::error!(button = %button.name, pin = button.gpio_input_pin, error = %e, "Failed to request button line");
                    inputs.close();
                    return Err(e);
                }
            }
        }
        Ok(inputs)
    }

    /// Returns the number of requested lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if no button is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Releases every line, logging failures.
    pub fn close(&mut self) {
        for line in self.lines.drain(..) {
            if let Err(e) = line.close() {
                tracing::error!(pin = line.pin(), error = %e, "Failed to close button line");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::{DEFAULT_DEBOUNCE, EdgeBus, SimulatedChip};
    use crate::types::LineLevel;

    fn button(id: u32, pin: u32, pull_up: bool) -> ButtonConfig {
        ButtonConfig {
            id,
            name: format!("Button{id}"),
            gpio_input_pin: pin,
            enable_pull_up: pull_up,
        }
    }

    #[test]
    fn requests_every_button() {
        let chip = SimulatedChip::new(EdgeBus::new());
        let buttons = [button(1, 4, true), button(2, 5, false)];

        let inputs = ButtonInputs::request(&chip, &buttons, DEFAULT_DEBOUNCE).unwrap();

        assert_eq!(inputs.len(), 2);
        assert!(chip.has_pull_up(4));
        assert!(!chip.has_pull_up(5));
    }

    #[test]
    fn failure_releases_earlier_lines() {
        let chip = SimulatedChip::new(EdgeBus::new());
        let _busy = chip.request_output(5, LineLevel::Low).unwrap();
        let buttons = [button(1, 4, false), button(2, 5, false)];

        let err = ButtonInputs::request(&chip, &buttons, DEFAULT_DEBOUNCE).unwrap_err();

        assert!(matches!(err, HardwareError::RequestFailed { pin: 5, .. }));
        assert!(chip.is_closed(4));
    }

    #[test]
    fn close_releases_lines() {
        let chip = SimulatedChip::new(EdgeBus::new());
        let mut inputs =
            ButtonInputs::request(&chip, &[button(1, 4, false)], DEFAULT_DEBOUNCE).unwrap();

        inputs.close();

        assert!(inputs.is_empty());
        assert!(chip.is_closed(4));
    }
}
