// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded, paced publishing on behalf of one controller.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::TimingConfig;
use crate::discovery::Entity;
use crate::error::ProtocolError;
use crate::event::{ControllerEvent, EventBus};
use crate::protocol::{InboundMessage, QoS, Transport};

/// Payload announcing an entity is reachable.
pub const ONLINE: &str = "online";
/// Payload announcing an entity is not reachable.
pub const OFFLINE: &str = "offline";

/// Wraps a transport with the timeouts, pacing and availability
/// bookkeeping every controller shares.
#[derive(Debug, Clone)]
pub(crate) struct Publisher<T> {
    transport: T,
    timing: TimingConfig,
    events: EventBus,
    unavailable: Arc<Mutex<HashSet<String>>>,
}

impl<T: Transport> Publisher<T> {
    pub(crate) fn new(transport: T, timing: TimingConfig, events: EventBus) -> Self {
        Self {
            transport,
            timing,
            events,
            unavailable: Arc::default(),
        }
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    /// Publishes every discovery payload, pausing between publishes.
    ///
    /// Returns the entity whose publish failed alongside the error.
    pub(crate) async fn publish_configs<'a>(
        &self,
        entities: impl IntoIterator<Item = &'a Entity>,
    ) -> Result<(), (&'a Entity, ProtocolError)> {
        let pacing = self.timing.publish_pacing();
        for (index, entity) in entities.into_iter().enumerate() {
            if index > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            self.publish_config(entity).await.map_err(|e| (entity, e))?;
        }
        Ok(())
    }

    async fn publish_config(&self, entity: &Entity) -> Result<(), ProtocolError> {
        let payload = entity.discovery_json()?;
        let topic = entity.topics().config();
        tracing::debug!(entity = %entity.unique_id(), topic = %topic, "Publishing discovery config");
        self.bounded(
            "publish",
            topic,
            self.timing.config_publish_timeout(),
            self.transport.publish(topic, QoS::AtMostOnce, true, payload),
        )
        .await
    }

    /// Publishes `online` or `offline` on the entity's availability topic.
    pub(crate) async fn announce(&self, entity: &Entity, online: bool) -> Result<(), ProtocolError> {
        let topic = entity.topics().availability();
        let payload = if online { ONLINE } else { OFFLINE };
        tracing::debug!(entity = %entity.unique_id(), topic = %topic, payload, "Announcing availability");
        self.bounded(
            "publish",
            topic,
            self.timing.publish_timeout(),
            self.transport
                .publish(topic, QoS::AtMostOnce, true, payload.to_string()),
        )
        .await
    }

    /// Publishes a state payload.
    ///
    /// An entity previously marked unavailable is announced `online` again
    /// after a successful report.
    pub(crate) async fn report_state(
        &self,
        entity: &Entity,
        payload: &str,
    ) -> Result<(), ProtocolError> {
        let topic = entity.topics().state();
        self.bounded(
            "publish",
            topic,
            self.timing.publish_timeout(),
            self.transport
                .publish(topic, QoS::AtMostOnce, true, payload.to_string()),
        )
        .await?;

        tracing::debug!(entity = %entity.unique_id(), topic = %topic, payload, "State reported");
        self.events
            .publish(ControllerEvent::state_reported(entity.unique_id(), payload));

        let recovered = self.unavailable.lock().remove(entity.unique_id());
        if recovered {
            if let Err(e) = self.announce(entity, true).await {
                self.unavailable
                    .lock()
                    .insert(entity.unique_id().to_string());
                return Err(e);
            }
            tracing::info!(entity = %entity.unique_id(), "Entity available again");
            self.events.publish(ControllerEvent::EntityAvailable {
                entity: entity.unique_id().to_string(),
            });
        }
        Ok(())
    }

    /// Marks an entity `offline` after a runtime failure.
    ///
    /// Best effort: a failing availability publish is only logged.
    pub(crate) async fn mark_unavailable(&self, entity: &Entity, reason: &str) {
        self.unavailable
            .lock()
            .insert(entity.unique_id().to_string());
        self.events.publish(ControllerEvent::EntityUnavailable {
            entity: entity.unique_id().to_string(),
            reason: reason.to_string(),
        });
        tracing::warn!(entity = %entity.unique_id(), reason, "Marking entity unavailable");

        if let Err(e) = self.announce(entity, false).await {
            tracing::error!(entity = %entity.unique_id(), error = %e, "Failed to publish offline");
        }
    }

    /// Returns `true` if the entity is currently marked unavailable.
    #[cfg(test)]
    pub(crate) fn is_unavailable(&self, entity: &Entity) -> bool {
        self.unavailable.lock().contains(entity.unique_id())
    }

    /// Subscribes to the entity's command topic.
    pub(crate) async fn subscribe_commands(
        &self,
        entity: &Entity,
    ) -> Result<mpsc::Receiver<InboundMessage>, ProtocolError> {
        let Some(topic) = entity.topics().command() else {
            return Err(ProtocolError::ChannelClosed(format!(
                "{} has no command topic",
                entity.unique_id()
            )));
        };
        tracing::debug!(entity = %entity.unique_id(), topic = %topic, "Subscribing to commands");
        self.bounded(
            "subscribe",
            topic,
            self.timing.publish_timeout(),
            self.transport.subscribe(topic, QoS::AtLeastOnce),
        )
        .await
    }

    /// Unsubscribes from `topic`.
    pub(crate) async fn unsubscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.bounded(
            "unsubscribe",
            topic,
            self.timing.publish_timeout(),
            self.transport.unsubscribe(topic),
        )
        .await
    }

    async fn bounded<R>(
        &self,
        operation: &'static str,
        topic: &str,
        bound: Duration,
        op: impl Future<Output = Result<R, ProtocolError>>,
    ) -> Result<R, ProtocolError> {
        tokio::time::timeout(bound, op)
            .await
            .map_err(|_| ProtocolError::Timeout {
                operation,
                topic: topic.to_string(),
                after_ms: u64::try_from(bound.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}
