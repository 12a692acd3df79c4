// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ON/OFF state shared by switches and binary sensors.

use std::fmt;

use super::LineLevel;

/// Logical ON/OFF state of a switch or binary sensor.
///
/// The string form is what Home Assistant expects on state topics and sends
/// on command topics.
///
/// # Examples
///
/// ```
/// use heating_bridge::types::SwitchState;
///
/// assert_eq!(SwitchState::On.as_str(), "ON");
/// assert_eq!(SwitchState::from_command("ON"), SwitchState::On);
/// assert_eq!(SwitchState::from_command("whatever"), SwitchState::Off);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SwitchState {
    /// Switched off.
    #[default]
    Off,
    /// Switched on.
    On,
}

impl SwitchState {
    /// Returns the payload string used on state topics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    /// Parses a command payload.
    ///
    /// Only the exact payload `ON` switches on; anything else, including an
    /// empty or malformed payload, means off.
    #[must_use]
    pub fn from_command(payload: &str) -> Self {
        if payload == "ON" { Self::On } else { Self::Off }
    }

    /// Returns the output line level that drives this state.
    #[must_use]
    pub const fn level(&self) -> LineLevel {
        match self {
            Self::Off => LineLevel::Low,
            Self::On => LineLevel::High,
        }
    }
}

impl From<LineLevel> for SwitchState {
    fn from(level: LineLevel) -> Self {
        match level {
            LineLevel::Low => Self::Off,
            LineLevel::High => Self::On,
        }
    }
}

impl From<bool> for SwitchState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
