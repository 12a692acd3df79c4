// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wiring of the three controllers into one running bridge.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::AppConfig;
use crate::controller::{
    BinarySensorController, ControllerSettings, SwitchController, TemperatureSensorController,
};
use crate::error::Error;
use crate::event::EventBus;
use crate::gpio::{ButtonInputs, EdgeBus, LineSource};
use crate::protocol::Transport;
use crate::pump::PumpActuator;
use crate::sensor::TemperatureSource;

/// The running bridge: buttons, pumps and temperature probes.
///
/// Controllers start in that order and shut down in reverse. The hardware
/// (button inputs and pump outputs) is released last.
#[derive(Debug)]
pub struct HeatingBridge<T, S> {
    events: EventBus,
    edges: EdgeBus,
    buttons: BinarySensorController<T>,
    switches: SwitchController<T>,
    temperatures: TemperatureSensorController<T, S>,
    button_inputs: Mutex<ButtonInputs>,
    pumps: Arc<PumpActuator>,
}

impl<T: Transport, S: TemperatureSource> HeatingBridge<T, S> {
    /// Requests the lines and starts every controller.
    ///
    /// `lines` must dispatch input edges to `edges`.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Whatever was started before it is closed
    /// again and its lines released.
    pub async fn start(
        transport: T,
        lines: &dyn LineSource,
        edges: EdgeBus,
        temperatures: S,
        events: EventBus,
        config: &AppConfig,
    ) -> Result<Self, Error> {
        let settings = ControllerSettings::from_config(config);

        let mut button_inputs =
            ButtonInputs::request(lines, &config.buttons, settings.timing.button_debounce())?;
        let buttons = match BinarySensorController::start(
            transport.clone(),
            &settings,
            events.clone(),
            edges.clone(),
            &config.buttons,
        )
        .await
        {
            Ok(buttons) => buttons,
            Err(e) => {
                button_inputs.close();
                return Err(e);
            }
        };
        tracing::info!(count = config.buttons.len(), "Buttons ready");

        let pumps = match PumpActuator::new(lines, &config.pumps) {
            Ok(pumps) => Arc::new(pumps),
            Err(e) => {
                close_quietly("binary sensor", buttons.close().await);
                button_inputs.close();
                return Err(e);
            }
        };
        let switches = match SwitchController::start(
            transport.clone(),
            &settings,
            events.clone(),
            Arc::clone(&pumps),
            &config.pumps,
        )
        .await
        {
            Ok(switches) => switches,
            Err(e) => {
                close_quietly("binary sensor", buttons.close().await);
                close_quietly("pump lines", pumps.close().map_err(Error::from));
                button_inputs.close();
                return Err(e);
            }
        };
        tracing::info!(count = config.pumps.len(), "Pumps ready");

        let temperatures = match TemperatureSensorController::start(
            transport,
            &settings,
            events.clone(),
            temperatures,
            &config.temperature_sensors,
        )
        .await
        {
            Ok(temperatures) => temperatures,
            Err(e) => {
                close_quietly("switch", switches.close().await);
                close_quietly("binary sensor", buttons.close().await);
                close_quietly("pump lines", pumps.close().map_err(Error::from));
                button_inputs.close();
                return Err(e);
            }
        };
        tracing::info!(count = config.temperature_sensors.len(), "Temperature sensors ready");

        Ok(Self {
            events,
            edges,
            buttons,
            switches,
            temperatures,
            button_inputs: Mutex::new(button_inputs),
            pumps,
        })
    }

    /// Returns the bus carrying controller events.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns the bus carrying button edges.
    #[must_use]
    pub fn edges(&self) -> &EdgeBus {
        &self.edges
    }

    /// Returns the pump switches.
    #[must_use]
    pub fn switches(&self) -> &SwitchController<T> {
        &self.switches
    }

    /// Returns the button binary sensors.
    #[must_use]
    pub fn buttons(&self) -> &BinarySensorController<T> {
        &self.buttons
    }

    /// Returns the temperature sensors.
    #[must_use]
    pub fn temperatures(&self) -> &TemperatureSensorController<T, S> {
        &self.temperatures
    }

    /// Closes the controllers in reverse start order, then releases the
    /// button inputs and pump lines.
    ///
    /// Every step runs even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure, including [`Error::AlreadyClosed`] when
    /// called twice.
    pub async fn shutdown(&self) -> Result<(), Error> {
        tracing::info!("Shutting down");
        let mut first = None;

        if let Err(e) = self.temperatures.close().await {
            first.get_or_insert(e);
        }
        if let Err(e) = self.switches.close().await {
            first.get_or_insert(e);
        }
        if let Err(e) = self.buttons.close().await {
            first.get_or_insert(e);
        }

        self.button_inputs.lock().close();
        if let Err(e) = self.pumps.close() {
            first.get_or_insert(e.into());
        }

        match first {
            None => {
                tracing::info!("Shutdown complete");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }
}

fn close_quietly(what: &str, result: Result<(), Error>) {
    if let Err(e) = result {
        tracing::warn!(component = what, error = %e, "Cleanup after failed start also failed");
    }
}
