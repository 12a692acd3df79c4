// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GPIO edge events and line sources.
//!
//! The [`EdgeBus`] is the only shared mutable structure between hardware
//! drivers and controllers: drivers dispatch [`EdgeEvent`]s into it, the
//! binary-sensor controller subscribes per button line.
//!
//! ```text
//! input line edge ──▶ LineSource watcher ──▶ EdgeBus::dispatch
//!                                               │ (matching line only)
//!                                               ▼
//!                                   EdgeSubscription::recv
//! ```
//!
//! Line sources:
//!
//! - `CdevChip`: real hardware through the character device (feature `cdev`)
//! - [`SysfsChip`]: real hardware through `/sys/class/gpio`
//! - [`SimulatedChip`]: in-memory lines for bench runs

mod buttons;
#[cfg(feature = "cdev")]
mod cdev;
mod edge_bus;
mod edge_event;
mod line;
mod simulated;
mod sysfs;

pub use buttons::ButtonInputs;
#[cfg(feature = "cdev")]
pub use cdev::CdevChip;
pub use edge_bus::{EdgeBus, EdgeSubscription, SubscriptionId};
pub use edge_event::{EdgeEvent, EdgeKind};
pub use line::{DEFAULT_DEBOUNCE, InputLine, InputOptions, LineSource, OutputLine};
pub use simulated::SimulatedChip;
pub use sysfs::{DEFAULT_SYSFS_PATH, SysfsChip};
