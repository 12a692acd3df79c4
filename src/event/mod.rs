// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event system for controller activity.
//!
//! Controllers publish [`ControllerEvent`]s on a shared [`EventBus`]: lifecycle
//! transitions, state reports and runtime failures that are handled without
//! stopping the controller.
//!
//! # Examples
//!
//! ```
//! use heating_bridge::event::{ControllerEvent, EventBus};
//!
//! let bus = EventBus::new();
//!
//! // Subscribe to events
//! let mut rx = bus.subscribe();
//!
//! // Publish an event
//! bus.publish(ControllerEvent::state_reported("button_1", "ON"));
//! ```

mod controller_event;
mod event_bus;

pub use controller_event::ControllerEvent;
pub use event_bus::{EventBus, FailureWatch};
