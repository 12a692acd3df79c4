// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared across the bridge.
//!
//! - [`SwitchState`] - ON/OFF as published on state topics
//! - [`LineLevel`] - Low/High level of a GPIO line
//! - [`PumpId`] - Identifier of a configured heating pump

mod line_level;
mod pump_id;
mod switch_state;

pub use line_level::LineLevel;
pub use pump_id::PumpId;
pub use switch_state::SwitchState;
