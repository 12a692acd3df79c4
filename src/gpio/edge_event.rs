// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Edge events detected on GPIO input lines.

use std::fmt;

use chrono::{DateTime, Utc};

/// Direction of a detected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Low to high.
    Rising,
    /// High to low.
    Falling,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rising => f.write_str("rising"),
            Self::Falling => f.write_str("falling"),
        }
    }
}

/// A transition detected on a digital input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeEvent {
    /// GPIO pin offset the edge was detected on.
    pub line: u32,
    /// Rising or falling.
    pub kind: EdgeKind,
    /// When the edge was detected.
    pub timestamp: DateTime<Utc>,
}

impl EdgeEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn now(line: u32, kind: EdgeKind) -> Self {
        Self {
            line,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Returns `true` for a falling edge.
    #[must_use]
    pub fn is_falling(&self) -> bool {
        self.kind == EdgeKind::Falling
    }
}
