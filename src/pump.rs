// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heating pump relays.
//!
//! The [`PumpActuator`] owns the output line of every configured pump. No
//! other component touches those lines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::PumpConfig;
use crate::error::{ConfigError, Error, HardwareError};
use crate::gpio::{LineSource, OutputLine};
use crate::types::{LineLevel, PumpId, SwitchState};

#[derive(Debug)]
struct Pump {
    name: String,
    line: Box<dyn OutputLine>,
}

/// Drives and reads the pump relays.
///
/// Each pump has its own line, so calls for different pumps never contend.
/// Reads always go to the hardware; nothing is cached.
///
/// # Examples
///
/// ```
/// use heating_bridge::config::PumpConfig;
/// use heating_bridge::gpio::{EdgeBus, SimulatedChip};
/// use heating_bridge::pump::PumpActuator;
/// use heating_bridge::types::{PumpId, SwitchState};
///
/// # fn main() -> heating_bridge::Result<()> {
/// let chip = SimulatedChip::new(EdgeBus::new());
/// let pumps = [PumpConfig { id: 1, name: "Floor".into(), gpio_state_pin: 17 }];
/// let actuator = PumpActuator::new(&chip, &pumps)?;
///
/// actuator.set_state(PumpId::new(1), SwitchState::On)?;
/// assert_eq!(actuator.get_state(PumpId::new(1))?, SwitchState::On);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PumpActuator {
    pumps: HashMap<PumpId, Pump>,
    closed: AtomicBool,
}

impl PumpActuator {
    /// Requests one output line per pump, driven low (off).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateId`] for repeated pump ids and
    /// [`HardwareError`] if a line cannot be requested. Lines requested
    /// before a failure are released.
    pub fn new(source: &dyn LineSource, pumps: &[PumpConfig]) -> Result<Self, Error> {
        let mut actuator = Self {
            pumps: HashMap::with_capacity(pumps.len()),
            closed: AtomicBool::new(false),
        };

        for config in pumps {
            let id = PumpId::new(config.id);
            if actuator.pumps.contains_key(&id) {
                actuator.release_all();
                return Err(ConfigError::DuplicateId {
                    kind: "pump",
                    id: id.to_string(),
                }
                .into());
            }

            let line = match source.request_output(config.gpio_state_pin, LineLevel::Low) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(
                        pump = %config.name,
                        pin = config.gpio_state_pin,
                        error = %e,
                        "Failed to request pump line"
                    );
                    actuator.release_all();
                    return Err(e.into());
                }
            };

            actuator.pumps.insert(
                id,
                Pump {
                    name: config.name.clone(),
                    line,
                },
            );
        }

        Ok(actuator)
    }

    /// Switches pump `id` on or off.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::UnknownPump`] if `id` is not configured, or
    /// the line's write error.
    pub fn set_state(&self, id: PumpId, state: SwitchState) -> Result<(), HardwareError> {
        let pump = self.pump(id)?;
        tracing::debug!(pump = %id, name = %pump.name, state = %state, "Setting pump state");
        pump.line.set_value(state.level())
    }

    /// Reads the current state of pump `id` from the hardware.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::UnknownPump`] if `id` is not configured, or
    /// the line's read error.
    pub fn get_state(&self, id: PumpId) -> Result<SwitchState, HardwareError> {
        let pump = self.pump(id)?;
        pump.line.value().map(SwitchState::from)
    }

    /// Returns `true` if pump `id` is configured.
    #[must_use]
    pub fn contains(&self, id: PumpId) -> bool {
        self.pumps.contains_key(&id)
    }

    /// Number of configured pumps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pumps.len()
    }

    /// Returns `true` if no pump is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pumps.is_empty()
    }

    /// Releases every line.
    ///
    /// All lines are closed even if some fail; the first failure is
    /// returned. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns the first [`HardwareError`] raised while closing.
    pub fn close(&self) -> Result<(), HardwareError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut first = None;
        for (id, pump) in &self.pumps {
            if let Err(e) = pump.line.close() {
                tracing::error!(pump = %id, error = %e, "Failed to close pump line");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn pump(&self, id: PumpId) -> Result<&Pump, HardwareError> {
        self.pumps
            .get(&id)
            .ok_or(HardwareError::UnknownPump(id.value()))
    }

    fn release_all(&mut self) {
        for (_, pump) in self.pumps.drain() {
            let _ = pump.line.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::gpio::{EdgeBus, SimulatedChip};

    fn pump(id: u32, pin: u32) -> PumpConfig {
        PumpConfig {
            id,
            name: format!("Pump{id}"),
            gpio_state_pin: pin,
        }
    }

    fn setup(pumps: &[PumpConfig]) -> (SimulatedChip, PumpActuator) {
        let chip = SimulatedChip::new(EdgeBus::new());
        let actuator = PumpActuator::new(&chip, pumps).unwrap();
        (chip, actuator)
    }

    #[test]
    fn pumps_start_off() {
        let (chip, actuator) = setup(&[pump(1, 17), pump(2, 27)]);
        assert_eq!(actuator.get_state(PumpId::new(1)).unwrap(), SwitchState::Off);
        assert_eq!(chip.level(27), Some(LineLevel::Low));
        assert_eq!(actuator.len(), 2);
    }

    #[test]
    fn set_then_get() {
        let (chip, actuator) = setup(&[pump(1, 17)]);

        actuator.set_state(PumpId::new(1), SwitchState::On).unwrap();
        assert_eq!(chip.level(17), Some(LineLevel::High));
        assert_eq!(actuator.get_state(PumpId::new(1)).unwrap(), SwitchState::On);

        actuator.set_state(PumpId::new(1), SwitchState::Off).unwrap();
        assert_eq!(actuator.get_state(PumpId::new(1)).unwrap(), SwitchState::Off);
    }

    #[test]
    fn reads_reflect_hardware_not_last_write() {
        let (chip, actuator) = setup(&[pump(1, 17)]);
        actuator.set_state(PumpId::new(1), SwitchState::On).unwrap();

        chip.force_level(17, LineLevel::Low);
        assert_eq!(actuator.get_state(PumpId::new(1)).unwrap(), SwitchState::Off);
    }

    #[test]
    fn unknown_pump() {
        let (_chip, actuator) = setup(&[pump(1, 17)]);

        assert!(matches!(
            actuator.set_state(PumpId::new(9), SwitchState::On),
            Err(HardwareError::UnknownPump(9))
        ));
        assert!(matches!(
            actuator.get_state(PumpId::new(9)),
            Err(HardwareError::UnknownPump(9))
        ));
    }

    #[test]
    fn duplicate_ids_release_lines() {
        let chip = SimulatedChip::new(EdgeBus::new());
        let err = PumpActuator::new(&chip, &[pump(1, 17), pump(1, 27)]).unwrap_err();

        assert!(matches!(err, Error::Config(ConfigError::DuplicateId { .. })));
        assert!(chip.is_closed(17));
    }

    #[test]
    fn busy_pin_fails_and_releases_earlier_lines() {
        let chip = SimulatedChip::new(EdgeBus::new());
        let _held = chip.request_output(27, LineLevel::Low).unwrap();

        let err = PumpActuator::new(&chip, &[pump(1, 17), pump(2, 27)]).unwrap_err();
        assert!(matches!(err, Error::Hardware(HardwareError::RequestFailed { pin: 27, .. })));
        assert!(chip.is_closed(17));
    }

    #[test]
    fn write_failure_surfaces() {
        let (chip, actuator) = setup(&[pump(1, 17)]);
        chip.set_failing(17, true);

        assert!(matches!(
            actuator.set_state(PumpId::new(1), SwitchState::On),
            Err(HardwareError::Io { pin: 17, .. })
        ));
    }

    #[test]
    fn close_releases_lines_once() {
        let (chip, actuator) = setup(&[pump(1, 17), pump(2, 27)]);

        actuator.close().unwrap();
        assert!(chip.is_closed(17));
        assert!(chip.is_closed(27));
        assert!(matches!(
            actuator.set_state(PumpId::new(1), SwitchState::On),
            Err(HardwareError::Closed(17))
        ));
        actuator.close().unwrap();
    }

    #[test]
    fn concurrent_calls_on_different_pumps() {
        let (_chip, actuator) = setup(&[pump(1, 17), pump(2, 27)]);
        let actuator = Arc::new(actuator);

        let handles: Vec<_> = [1, 2]
            .into_iter()
            .map(|id| {
                let actuator = Arc::clone(&actuator);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let state = SwitchState::from(i % 2 == 0);
                        actuator.set_state(PumpId::new(id), state).unwrap();
                        assert_eq!(actuator.get_state(PumpId::new(id)).unwrap(), state);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
