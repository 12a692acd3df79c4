// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Temperature probes as Home Assistant sensors, refreshed by a poller.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::TempSensorConfig;
use crate::discovery::{Entity, EntityTable};
use crate::error::{ConfigError, Error, ProtocolError};
use crate::event::{ControllerEvent, EventBus};
use crate::protocol::Transport;
use crate::sensor::{TemperatureSource, format_temperature};

use super::core::ControllerCore;
use super::lifecycle::{ControllerKind, LifecycleState};
use super::publisher::Publisher;
use super::ControllerSettings;

/// Publishes one sensor per probe and republishes readings periodically.
///
/// A probe that cannot be read is logged and emitted as
/// [`ControllerEvent::SensorReadFailed`]; the other probes in the cycle are
/// still reported.
#[derive(Debug)]
pub struct TemperatureSensorController<T, S> {
    core: ControllerCore<T, String>,
    source: Arc<S>,
}

impl<T: Transport, S: TemperatureSource> TemperatureSensorController<T, S> {
    /// Publishes discovery and availability, reports every probe once and
    /// starts the poller.
    ///
    /// # Errors
    ///
    /// A zero poll interval is rejected with [`ConfigError::InvalidValue`]
    /// before anything is published. Duplicate ids and transport failures
    /// abort the start. Probes that cannot be read during the first report
    /// do not.
    pub async fn start(
        transport: T,
        settings: &ControllerSettings,
        events: EventBus,
        source: S,
        sensors: &[TempSensorConfig],
    ) -> Result<Self, Error> {
        let period = settings.timing.temperature_poll_interval();
        if period.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timing.temperature_poll_interval_secs".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        let core = ControllerCore::build(
            ControllerKind::TemperatureSensor,
            transport,
            settings,
            events,
            sensors
                .iter()
                .map(|sensor| (sensor.id.clone(), sensor.name.clone())),
        )?;

        core.publish_configs().await?;
        core.announce_online().await?;

        let source = Arc::new(source);
        for (id, entity) in core.entities().iter() {
            report_reading(core.publisher(), source.as_ref(), id, entity)
                .await
                .map_err(|e| core.abort(entity, "report temperature", e))?;
        }

        tracing::info!(sensors = core.entities().len(), period_secs = period.as_secs(), "Starting temperature poller");
        core.spawn(poll(
            core.publisher().clone(),
            Arc::clone(&source),
            Arc::clone(core.entities()),
            period,
            core.cancellation(),
        ));

        core.mark_running();
        Ok(Self { core, source })
    }

    /// Runs one poll cycle immediately.
    ///
    /// # Errors
    ///
    /// Returns the first transport failure; the affected sensors are marked
    /// unavailable and the cycle still covers every sensor.
    pub async fn poll_now(&self) -> Result<(), Error> {
        run_cycle(self.core.publisher(), self.source.as_ref(), self.core.entities())
            .await
            .map_err(Error::from)
    }

    /// Returns the entity published for a probe.
    #[must_use]
    pub fn entity_for(&self, sensor_id: &str) -> Option<&Entity> {
        self.core.entities().get(&sensor_id.to_string())
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.core.state()
    }

    /// Publishes `offline` and stops the poller, waiting for an in-flight
    /// cycle to be abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] on a second call.
    pub async fn close(&self) -> Result<(), Error> {
        self.core.begin_close()?;
        self.core.announce_offline().await;
        self.core.finish_close().await
    }
}

async fn poll<T: Transport, S: TemperatureSource>(
    publisher: Publisher<T>,
    source: Arc<S>,
    entities: Arc<EntityTable<String>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            result = run_cycle(&publisher, source.as_ref(), &entities) => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Temperature poll cycle had publish failures");
                }
            }
        }
    }
    tracing::debug!("Temperature poller stopped");
}

/// Reports every sensor; publish failures mark the sensor unavailable.
async fn run_cycle<T: Transport, S: TemperatureSource>(
    publisher: &Publisher<T>,
    source: &S,
    entities: &EntityTable<String>,
) -> Result<(), ProtocolError> {
    let mut first = None;
    for (id, entity) in entities.iter() {
        if let Err(e) = report_reading(publisher, source, id, entity).await {
            tracing::error!(sensor = %id, error = %e, "Failed to report temperature");
            publisher.mark_unavailable(entity, &e.to_string()).await;
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

/// Reads one probe and reports it. A read failure is logged, emitted and
/// swallowed; only the publish can fail.
async fn report_reading<T: Transport, S: TemperatureSource>(
    publisher: &Publisher<T>,
    source: &S,
    sensor_id: &str,
    entity: &Entity,
) -> Result<(), ProtocolError> {
    let celsius = match source.read_celsius(sensor_id).await {
        Ok(celsius) => celsius,
        Err(e) => {
            tracing::error!(sensor = %sensor_id, error = %e, "Failed to read temperature");
            publisher.events().publish(ControllerEvent::SensorReadFailed {
                entity: entity.unique_id().to_string(),
                error: e.to_string(),
            });
            return Ok(());
        }
    };
    publisher
        .report_state(entity, &format_temperature(celsius))
        .await
}
