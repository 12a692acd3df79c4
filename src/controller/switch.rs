// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heating pumps as Home Assistant switches.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::PumpConfig;
use crate::discovery::Entity;
use crate::error::Error;
use crate::event::{ControllerEvent, EventBus};
use crate::protocol::{InboundMessage, Transport};
use crate::pump::PumpActuator;
use crate::types::{PumpId, SwitchState};

use super::core::ControllerCore;
use super::lifecycle::{ControllerKind, LifecycleState};
use super::publisher::Publisher;
use super::ControllerSettings;

/// Publishes one switch per pump and carries out commands from Home
/// Assistant.
///
/// A command sets the pump, reads the line back and reports what the
/// hardware says. A failing command is logged, emitted as
/// [`ControllerEvent::CommandFailed`] and marks the switch `offline` until
/// its next successful report; the controller keeps running.
#[derive(Debug)]
pub struct SwitchController<T> {
    core: ControllerCore<T, PumpId>,
    pumps: Arc<PumpActuator>,
}

impl<T: Transport> SwitchController<T> {
    /// Publishes discovery and availability, reports every pump's state,
    /// subscribes to the command topics and starts handling commands.
    ///
    /// # Errors
    ///
    /// Any failure before the controller is running aborts it: duplicate
    /// ids, a pump missing from `pumps`, a transport timeout or a line that
    /// cannot be read.
    pub async fn start(
        transport: T,
        settings: &ControllerSettings,
        events: EventBus,
        pumps: Arc<PumpActuator>,
        configs: &[PumpConfig],
    ) -> Result<Self, Error> {
        let core = ControllerCore::build(
            ControllerKind::Switch,
            transport,
            settings,
            events,
            configs
                .iter()
                .map(|pump| (PumpId::new(pump.id), pump.name.clone())),
        )?;

        for (id, entity) in core.entities().iter() {
            if !pumps.contains(*id) {
                let missing = Error::UnknownEntity(format!("pump {id}"));
                return Err(core.abort(entity, "build", missing));
            }
        }

        core.publish_configs().await?;
        core.announce_online().await?;

        for (id, entity) in core.entities().iter() {
            let state = pumps
                .get_state(*id)
                .map_err(|e| core.abort(entity, "read pump state", e))?;
            core.publisher()
                .report_state(entity, state.as_str())
                .await
                .map_err(|e| core.abort(entity, "report state", e))?;
        }

        let mut receivers = Vec::with_capacity(core.entities().len());
        for (id, entity) in core.entities().iter() {
            let rx = core
                .publisher()
                .subscribe_commands(entity)
                .await
                .map_err(|e| core.abort(entity, "subscribe to commands", e))?;
            receivers.push((*id, entity.clone(), rx));
        }

        for (id, entity, rx) in receivers {
            tracing::info!(pump = %id, entity = %entity.unique_id(), "Listening for commands");
            core.spawn(handle_commands(
                core.publisher().clone(),
                Arc::clone(&pumps),
                id,
                entity,
                rx,
                core.cancellation(),
            ));
        }

        core.mark_running();
        Ok(Self { core, pumps })
    }

    /// Sets a pump and reports the state read back from the line.
    ///
    /// This is the path inbound commands take.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEntity`] for an unconfigured pump, a
    /// [`HardwareError`](crate::error::HardwareError) or a transport error.
    pub async fn set_state(&self, id: PumpId, state: SwitchState) -> Result<SwitchState, Error> {
        let entity = self.entity(id)?;
        apply_command(self.core.publisher(), &self.pumps, id, entity, state).await
    }

    /// Reads a pump and reports its state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEntity`] for an unconfigured pump, a
    /// [`HardwareError`](crate::error::HardwareError) or a transport error.
    pub async fn report_state(&self, id: PumpId) -> Result<SwitchState, Error> {
        let entity = self.entity(id)?;
        let state = self.pumps.get_state(id)?;
        self.core.publisher().report_state(entity, state.as_str()).await?;
        Ok(state)
    }

    /// Returns the entity published for a pump.
    #[must_use]
    pub fn entity_for(&self, id: PumpId) -> Option<&Entity> {
        self.core.entities().get(&id)
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.core.state()
    }

    /// Publishes `offline`, unsubscribes from the command topics and stops
    /// command handling. Pump lines stay with the [`PumpActuator`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] on a second call, or the first
    /// unsubscribe failure; the controller is closed either way.
    pub async fn close(&self) -> Result<(), Error> {
        self.core.begin_close()?;
        self.core.announce_offline().await;

        let mut first = None;
        for entity in self.core.entities().entities() {
            let Some(topic) = entity.topics().command() else {
                continue;
            };
            if let Err(e) = self.core.publisher().unsubscribe(topic).await {
                first.get_or_insert(self.core.close_failure(topic, e));
            }
        }

        let finished = self.core.finish_close().await;
        first.map_or(finished, Err)
    }

    fn entity(&self, id: PumpId) -> Result<&Entity, Error> {
        self.core
            .entities()
            .get(&id)
            .ok_or_else(|| Error::UnknownEntity(format!("pump {id}")))
    }
}

async fn handle_commands<T: Transport>(
    publisher: Publisher<T>,
    pumps: Arc<PumpActuator>,
    id: PumpId,
    entity: Entity,
    mut commands: mpsc::Receiver<InboundMessage>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            message = commands.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        tracing::debug!(topic = %message.topic, payload = %message.payload, "Command received");
        let requested = SwitchState::from_command(&message.payload);

        if let Err(e) = apply_command(&publisher, &pumps, id, &entity, requested).await {
            tracing::error!(
                entity = %entity.unique_id(),
                payload = %message.payload,
                error = %e,
                "Failed to carry out command"
            );
            publisher.events().publish(ControllerEvent::CommandFailed {
                entity: entity.unique_id().to_string(),
                payload: message.payload.clone(),
                error: e.to_string(),
            });
            publisher.mark_unavailable(&entity, &e.to_string()).await;
        }
    }
    tracing::debug!(entity = %entity.unique_id(), "Command handling stopped");
}

async fn apply_command<T: Transport>(
    publisher: &Publisher<T>,
    pumps: &PumpActuator,
    id: PumpId,
    entity: &Entity,
    requested: SwitchState,
) -> Result<SwitchState, Error> {
    pumps.set_state(id, requested)?;
    let observed = pumps.get_state(id)?;
    if observed != requested {
        tracing::warn!(pump = %id, %requested, %observed, "Pump state differs from request");
    }
    publisher.report_state(entity, observed.as_str()).await?;
    Ok(observed)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::discovery::Device;
    use crate::gpio::{EdgeBus, SimulatedChip};
    use crate::protocol::{LoopbackTransport, QoS, TransportOp};
    use crate::types::LineLevel;

    const WAIT: Duration = Duration::from_secs(2);
    const SET: &str = "homeassistant/switch/heating_pump_1/set";
    const STATE: &str = "homeassistant/switch/heating_pump_1/state";
    const STATUS: &str = "homeassistant/switch/heating_pump_1/status";

    struct Fixture {
        transport: LoopbackTransport,
        chip: SimulatedChip,
        events: EventBus,
        pumps: Arc<PumpActuator>,
        settings: ControllerSettings,
        configs: Vec<PumpConfig>,
    }

    fn fixture(ids: &[u32]) -> Fixture {
        let chip = SimulatedChip::new(EdgeBus::new());
        let configs: Vec<_> = ids
            .iter()
            .map(|&id| PumpConfig {
                id,
                name: format!("Pump{id}"),
                gpio_state_pin: 16 + id,
            })
            .collect();
        let pumps = Arc::new(PumpActuator::new(&chip, &configs).unwrap());
        let mut settings = ControllerSettings::new(Device::new("rpi", "Heating"));
        settings.timing.publish_pacing_ms = 0;
        Fixture {
            transport: LoopbackTransport::new(),
            chip,
            events: EventBus::new(),
            pumps,
            settings,
            configs,
        }
    }

    async fn start(f: &Fixture) -> SwitchController<LoopbackTransport> {
        SwitchController::start(
            f.transport.clone(),
            &f.settings,
            f.events.clone(),
            Arc::clone(&f.pumps),
            &f.configs,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn startup_order() {
        let f = fixture(&[1]);
        let controller = start(&f).await;

        let ops = f.transport.operations();
        assert_eq!(ops.len(), 4);
        assert!(matches!(&ops[0], TransportOp::Publish { topic, payload, retain: true, .. }
            if topic == "homeassistant/switch/heating_pump_1/config"
                && payload.contains(r#""unique_id":"heating_pump_1""#)));
        assert!(matches!(&ops[1], TransportOp::Publish { topic, payload, .. }
            if topic == STATUS && payload == "online"));
        assert!(matches!(&ops[2], TransportOp::Publish { topic, payload, .. }
            if topic == STATE && payload == "OFF"));
        assert_eq!(
            ops[3],
            TransportOp::Subscribe {
                topic: SET.to_string(),
                qos: QoS::AtLeastOnce
            }
        );
        assert_eq!(controller.state(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn command_drives_pump_and_reports_read_back() {
        let f = fixture(&[1, 2]);
        let _controller = start(&f).await;

        assert!(f.transport.inject(SET, "ON"));
        assert!(f.transport.wait_for_payload(STATE, "ON", WAIT).await);
        assert_eq!(f.chip.level(17), Some(LineLevel::High));
        assert_eq!(f.chip.level(18), Some(LineLevel::Low));

        f.transport.inject(SET, "garbage");
        assert!(f.transport.wait_for_publishes(STATE, 3, WAIT).await);
        assert_eq!(f.transport.last_payload(STATE).as_deref(), Some("OFF"));
    }

    #[tokio::test]
    async fn failed_command_marks_switch_offline_and_keeps_running() {
        let f = fixture(&[1]);
        let controller = start(&f).await;
        let mut events = f.events.subscribe();

        f.chip.set_failing(17, true);
        f.transport.inject(SET, "ON");
        assert!(f.transport.wait_for_payload(STATUS, "offline", WAIT).await);

        let failed = loop {
            let event = events.recv().await.unwrap();
            if let ControllerEvent::CommandFailed { payload, .. } = event {
                break payload;
            }
        };
        assert_eq!(failed, "ON");
        assert_eq!(controller.state(), LifecycleState::Running);

        f.chip.set_failing(17, false);
        f.transport.inject(SET, "ON");
        assert!(f.transport.wait_for_payload(STATE, "ON", WAIT).await);
        assert!(
            f.transport
                .wait_until(WAIT, |t| t.published(STATUS) == ["online", "offline", "online"])
                .await
        );
    }

    #[tokio::test]
    async fn direct_set_state() {
        let f = fixture(&[1]);
        let controller = start(&f).await;

        let observed = controller.set_state(PumpId::new(1), SwitchState::On).await.unwrap();
        assert_eq!(observed, SwitchState::On);
        assert_eq!(f.transport.last_payload(STATE).as_deref(), Some("ON"));

        assert!(matches!(
            controller.set_state(PumpId::new(5), SwitchState::On).await,
            Err(Error::UnknownEntity(_))
        ));
    }

    #[tokio::test]
    async fn report_state_reads_hardware() {
        let f = fixture(&[1]);
        let controller = start(&f).await;

        f.chip.force_level(17, LineLevel::High);
        assert_eq!(controller.report_state(PumpId::new(1)).await.unwrap(), SwitchState::On);
        assert_eq!(f.transport.last_payload(STATE).as_deref(), Some("ON"));
    }

    #[tokio::test]
    async fn pump_missing_from_actuator_aborts_start() {
        let mut f = fixture(&[1]);
        f.configs.push(PumpConfig {
            id: 9,
            name: "Ghost".to_string(),
            gpio_state_pin: 30,
        });

        let result = SwitchController::start(
            f.transport.clone(),
            &f.settings,
            f.events.clone(),
            Arc::clone(&f.pumps),
            &f.configs,
        )
        .await;
        assert!(matches!(result, Err(Error::UnknownEntity(_))));
        assert!(f.transport.operations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn availability_timeout_aborts_start() {
        let f = fixture(&[1]);
        f.transport.stall_topic(STATUS);

        let result = SwitchController::start(
            f.transport.clone(),
            &f.settings,
            f.events.clone(),
            Arc::clone(&f.pumps),
            &f.configs,
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::Protocol(crate::error::ProtocolError::Timeout { after_ms: 2_000, .. }))
        ));
        assert!(!f.transport.is_subscribed(SET));
    }

    #[tokio::test]
    async fn close_publishes_offline_and_unsubscribes() {
        let f = fixture(&[1]);
        let controller = start(&f).await;

        controller.close().await.unwrap();
        assert_eq!(controller.state(), LifecycleState::Closed);
        assert_eq!(f.transport.last_payload(STATUS).as_deref(), Some("offline"));
        assert!(!f.transport.is_subscribed(SET));
        assert!(!f.transport.inject(SET, "ON"));
        assert!(matches!(controller.close().await, Err(Error::AlreadyClosed)));
        assert!(!f.chip.is_closed(17));
    }
}
