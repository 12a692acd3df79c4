// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory GPIO chip for bench runs without hardware.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::HardwareError;
use crate::types::LineLevel;

use super::line::{InputLine, InputOptions, LineSource, OutputLine};
use super::{EdgeBus, EdgeEvent, EdgeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}

#[derive(Debug)]
struct LineSlot {
    direction: Direction,
    level: LineLevel,
    pull_up: bool,
    closed: bool,
    failing: bool,
}

#[derive(Debug)]
struct ChipInner {
    bus: EdgeBus,
    lines: Mutex<HashMap<u32, LineSlot>>,
}

/// A GPIO chip whose lines live in memory.
///
/// Output lines remember the last written level. Input edges are injected
/// with [`emit_edge`](Self::emit_edge) and go through the [`EdgeBus`] like
/// real hardware edges.
///
/// # Examples
///
/// ```
/// use heating_bridge::gpio::{EdgeBus, LineSource, SimulatedChip};
/// use heating_bridge::types::LineLevel;
///
/// let chip = SimulatedChip::new(EdgeBus::new());
/// let line = chip.request_output(17, LineLevel::Low).unwrap();
/// line.set_value(LineLevel::High).unwrap();
/// assert_eq!(chip.level(17), Some(LineLevel::High));
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedChip {
    inner: Arc<ChipInner>,
}

impl SimulatedChip {
    /// Creates a chip dispatching input edges to `bus`.
    #[must_use]
    pub fn new(bus: EdgeBus) -> Self {
        Self {
            inner: Arc::new(ChipInner {
                bus,
                lines: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the current level of a requested line.
    #[must_use]
    pub fn level(&self, pin: u32) -> Option<LineLevel> {
        self.inner.lines.lock().get(&pin).map(|slot| slot.level)
    }

    /// Returns whether the input on `pin` was requested with a pull-up.
    #[must_use]
    pub fn has_pull_up(&self, pin: u32) -> bool {
        self.inner
            .lines
            .lock()
            .get(&pin)
            .is_some_and(|slot| slot.pull_up)
    }

    /// Returns whether a requested line has been closed.
    #[must_use]
    pub fn is_closed(&self, pin: u32) -> bool {
        self.inner
            .lines
            .lock()
            .get(&pin)
            .is_some_and(|slot| slot.closed)
    }

    /// Makes every read and write on `pin` fail until cleared.
    pub fn set_failing(&self, pin: u32, failing: bool) {
        if let Some(slot) = self.inner.lines.lock().get_mut(&pin) {
            slot.failing = failing;
        }
    }

    /// Changes an output's level behind the bridge's back, as a manual
    /// override on the relay board would.
    pub fn force_level(&self, pin: u32, level: LineLevel) {
        if let Some(slot) = self.inner.lines.lock().get_mut(&pin) {
            slot.level = level;
        }
    }

    /// Simulates an edge on an input line and dispatches it.
    ///
    /// Returns the number of subscribers the edge was delivered to.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::RequestFailed`] if `pin` is not a requested
    /// input and [`HardwareError::Closed`] if it was released.
    pub async fn emit_edge(&self, pin: u32, kind: EdgeKind) -> Result<usize, HardwareError> {
        {
            let mut lines = self.inner.lines.lock();
            let slot = match lines.get_mut(&pin) {
                Some(slot) if slot.direction == Direction::Input => slot,
                _ => {
                    return Err(HardwareError::RequestFailed {
                        pin,
                        message: "not requested as input".to_string(),
                    });
                }
            };
            if slot.closed {
                return Err(HardwareError::Closed(pin));
            }
            slot.level = match kind {
                EdgeKind::Rising => LineLevel::High,
                EdgeKind::Falling => LineLevel::Low,
            };
        }
        Ok(self.inner.bus.dispatch(EdgeEvent::now(pin, kind)).await)
    }

    fn request(
        &self,
        pin: u32,
        direction: Direction,
        level: LineLevel,
        pull_up: bool,
    ) -> Result<SimulatedLine, HardwareError> {
        let mut lines = self.inner.lines.lock();
        if lines.get(&pin).is_some_and(|slot| !slot.closed) {
            return Err(HardwareError::RequestFailed {
                pin,
                message: "line busy".to_string(),
            });
        }
        lines.insert(
            pin,
            LineSlot {
                direction,
                level,
                pull_up,
                closed: false,
                failing: false,
            },
        );
        Ok(SimulatedLine {
            pin,
            chip: Arc::clone(&self.inner),
        })
    }
}

impl LineSource for SimulatedChip {
    fn request_output(
        &self,
        pin: u32,
        initial: LineLevel,
    ) -> Result<Box<dyn OutputLine>, HardwareError> {
        let line = self.request(pin, Direction::Output, initial, false)?;
        tracing::debug!(pin, level = %initial, "Requested simulated output line");
        Ok(Box::new(line))
    }

    fn request_input(
        &self,
        pin: u32,
        options: InputOptions,
    ) -> Result<Box<dyn InputLine>, HardwareError> {
        // An idle pulled-up input reads high.
        let idle = LineLevel::from(options.pull_up);
        let line = self.request(pin, Direction::Input, idle, options.pull_up)?;
        tracing::debug!(pin, pull_up = options.pull_up, "Requested simulated input line");
        Ok(Box::new(line))
    }
}

#[derive(Debug)]
struct SimulatedLine {
    pin: u32,
    chip: Arc<ChipInner>,
}

impl SimulatedLine {
    fn with_slot<T>(
        &self,
        f: impl FnOnce(&mut LineSlot) -> T,
    ) -> Result<T, HardwareError> {
        let mut lines = self.chip.lines.lock();
        let slot = lines
            .get_mut(&self.pin)
            .ok_or(HardwareError::Closed(self.pin))?;
        if slot.closed {
            return Err(HardwareError::Closed(self.pin));
        }
        if slot.failing {
            return Err(HardwareError::Io {
                pin: self.pin,
                source: io::Error::other("injected failure"),
            });
        }
        Ok(f(slot))
    }

    fn read(&self) -> Result<LineLevel, HardwareError> {
        self.with_slot(|slot| slot.level)
    }

    fn release(&self) -> Result<(), HardwareError> {
        if let Some(slot) = self.chip.lines.lock().get_mut(&self.pin) {
            slot.closed = true;
        }
        Ok(())
    }
}

impl OutputLine for SimulatedLine {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn set_value(&self, level: LineLevel) -> Result<(), HardwareError> {
        self.with_slot(|slot| slot.level = level)
    }

    fn value(&self) -> Result<LineLevel, HardwareError> {
        self.read()
    }

    fn close(&self) -> Result<(), HardwareError> {
        self.release()
    }
}

impl InputLine for SimulatedLine {
    fn pin(&self) -> u32 {
        self.pin
    }

    fn value(&self) -> Result<LineLevel, HardwareError> {
        self.read()
    }

    fn close(&self) -> Result<(), HardwareError> {
        self.release()
    }
}
