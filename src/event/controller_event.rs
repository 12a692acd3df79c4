// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller event types.

use crate::controller::{ControllerKind, LifecycleState};

/// Events emitted by the entity controllers.
///
/// Runtime failures that do not stop a controller (a bad command, a sensor
/// that cannot be read) surface here as well as in the logs.
///
/// # Examples
///
/// ```
/// use heating_bridge::event::ControllerEvent;
///
/// let event = ControllerEvent::state_reported("heating_pump_1", "ON");
/// assert_eq!(event.entity(), Some("heating_pump_1"));
/// assert!(!event.is_failure());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// A controller moved to a new lifecycle state.
    LifecycleChanged {
        /// The controller family.
        controller: ControllerKind,
        /// Previous state.
        from: LifecycleState,
        /// New state.
        to: LifecycleState,
    },

    /// A state payload was published for an entity.
    StateReported {
        /// Unique id of the entity.
        entity: String,
        /// Published payload (`ON`, `OFF` or a temperature).
        payload: String,
    },

    /// An inbound command could not be carried out.
    CommandFailed {
        /// Unique id of the entity.
        entity: String,
        /// The command payload.
        payload: String,
        /// Why it failed.
        error: String,
    },

    /// A temperature sensor could not be read or its value published.
    SensorReadFailed {
        /// Unique id of the entity.
        entity: String,
        /// Why it failed.
        error: String,
    },

    /// An entity was marked `offline`.
    EntityUnavailable {
        /// Unique id of the entity.
        entity: String,
        /// Why it was marked unavailable.
        reason: String,
    },

    /// An entity that was unavailable is `online` again.
    EntityAvailable {
        /// Unique id of the entity.
        entity: String,
    },
}

impl ControllerEvent {
    /// Returns the entity the event is about, if any.
    #[must_use]
    pub fn entity(&self) -> Option<&str> {
        match self {
            Self::LifecycleChanged { .. } => None,
            Self::StateReported { entity, .. }
            | Self::CommandFailed { entity, .. }
            | Self::SensorReadFailed { entity, .. }
            | Self::EntityUnavailable { entity, .. }
            | Self::EntityAvailable { entity } => Some(entity),
        }
    }

    /// Returns `true` for lifecycle transitions.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::LifecycleChanged { .. })
    }

    /// Returns `true` for events reporting a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. } | Self::SensorReadFailed { .. } | Self::EntityUnavailable { .. }
        )
    }

    /// Creates a state reported event.
    #[must_use]
    pub fn state_reported(entity: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::StateReported {
            entity: entity.into(),
            payload: payload.into(),
        }
    }
}
