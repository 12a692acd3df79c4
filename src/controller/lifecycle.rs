// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller lifecycle.
//!
//! ```text
//! Constructing → ConfigsBuilt → ConfigsPublished → Available → Running
//!                                                                 ↓
//!                                                  Closed ← Closing
//! ```
//!
//! Every step before `Running` happens inside a controller's `start`; a
//! failure there aborts the controller. `Closing` can be entered from any
//! state a constructed controller can be in, exactly once.

use std::fmt;

use parking_lot::Mutex;

use crate::discovery::EntityKind;
use crate::error::Error;
use crate::event::{ControllerEvent, EventBus};

/// The entity family a controller manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerKind {
    /// Push buttons published as binary sensors.
    BinarySensor,
    /// Heating pumps published as switches.
    Switch,
    /// 1-Wire probes published as temperature sensors.
    TemperatureSensor,
}

impl ControllerKind {
    /// Returns the name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BinarySensor => "binary_sensor",
            Self::Switch => "switch",
            Self::TemperatureSensor => "temperature_sensor",
        }
    }

    /// Returns the kind of entity this controller publishes.
    #[must_use]
    pub const fn entity_kind(&self) -> EntityKind {
        match self {
            Self::BinarySensor => EntityKind::BinarySensor,
            Self::Switch => EntityKind::Switch,
            Self::TemperatureSensor => EntityKind::TemperatureSensor,
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Reading static configuration.
    Constructing,
    /// Identities and topics derived for every entity.
    ConfigsBuilt,
    /// Discovery payloads published.
    ConfigsPublished,
    /// `online` published for every entity.
    Available,
    /// Reporting state and handling input.
    Running,
    /// Shutting down.
    Closing,
    /// Shut down.
    Closed,
}

impl LifecycleState {
    /// Returns the name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Constructing => "constructing",
            Self::ConfigsBuilt => "configs_built",
            Self::ConfigsPublished => "configs_published",
            Self::Available => "available",
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and announces a controller's state.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    kind: ControllerKind,
    state: Mutex<LifecycleState>,
    events: EventBus,
}

impl Lifecycle {
    pub(crate) fn new(kind: ControllerKind, events: EventBus) -> Self {
        tracing::debug!(controller = %kind, "Constructing controller");
        Self {
            kind,
            state: Mutex::new(LifecycleState::Constructing),
            events,
        }
    }

    pub(crate) fn kind(&self) -> ControllerKind {
        self.kind
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Moves to `to`.
    pub(crate) fn advance(&self, to: LifecycleState) {
        let from = std::mem::replace(&mut *self.state.lock(), to);
        self.announce(from, to);
    }

    /// Enters `Closing`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] if closing already started.
    pub(crate) fn begin_close(&self) -> Result<(), Error> {
        let from = {
            let mut state = self.state.lock();
            if *state >= LifecycleState::Closing {
                return Err(Error::AlreadyClosed);
            }
            std::mem::replace(&mut *state, LifecycleState::Closing)
        };
        self.announce(from, LifecycleState::Closing);
        Ok(())
    }

    fn announce(&self, from: LifecycleState, to: LifecycleState) {
        tracing::info!(controller = %self.kind, %from, %to, "Controller state changed");
        self.events.publish(ControllerEvent::LifecycleChanged {
            controller: self.kind,
            from,
            to,
        });
    }
}
