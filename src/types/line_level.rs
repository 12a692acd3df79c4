// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Digital line level.

use std::fmt;

/// Logical level of a digital GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LineLevel {
    /// Logical 0.
    #[default]
    Low,
    /// Logical 1.
    High,
}

impl LineLevel {
    /// Returns the numeric value (0 or 1).
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }

    /// Converts a raw value; anything non-zero is high.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        if value == 0 { Self::Low } else { Self::High }
    }
}

impl From<bool> for LineLevel {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

impl fmt::Display for LineLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}
