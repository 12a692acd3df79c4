// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Push buttons as Home Assistant binary sensors.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ButtonConfig;
use crate::discovery::Entity;
use crate::error::Error;
use crate::event::EventBus;
use crate::gpio::{EdgeBus, EdgeEvent, EdgeSubscription, SubscriptionId};
use crate::protocol::Transport;
use crate::types::SwitchState;

use super::core::ControllerCore;
use super::lifecycle::{ControllerKind, LifecycleState};
use super::publisher::Publisher;
use super::ControllerSettings;

/// Translates an edge into the published state.
///
/// Buttons are wired active-low: pressing pulls the line down. A falling
/// edge is `ON`, any other edge `OFF`.
#[must_use]
pub fn edge_state(event: &EdgeEvent) -> SwitchState {
    SwitchState::from(event.is_falling())
}

/// Publishes one binary sensor per button and forwards its edges.
///
/// Each button gets its own [`EdgeBus`] subscription, tagged with the
/// button id, and its own forwarding task.
#[derive(Debug)]
pub struct BinarySensorController<T> {
    core: ControllerCore<T, u32>,
    bus: EdgeBus,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl<T: Transport> BinarySensorController<T> {
    /// Publishes discovery and availability, subscribes to every button's
    /// edges and starts forwarding them.
    ///
    /// # Errors
    ///
    /// Any failure before the controller is running aborts it: duplicate
    /// ids, a duplicate edge subscription or a transport timeout.
    /// Subscriptions made before the failure are removed.
    pub async fn start(
        transport: T,
        settings: &ControllerSettings,
        events: EventBus,
        bus: EdgeBus,
        buttons: &[ButtonConfig],
    ) -> Result<Self, Error> {
        let core = ControllerCore::build(
            ControllerKind::BinarySensor,
            transport,
            settings,
            events,
            buttons.iter().map(|button| (button.id, button.name.clone())),
        )?;

        core.publish_configs().await?;
        core.announce_online().await?;

        let controller = Self {
            core,
            bus,
            subscriptions: Mutex::new(Vec::with_capacity(buttons.len())),
        };

        let mut forwarders = Vec::with_capacity(buttons.len());
        for button in buttons {
            let Some(entity) = controller.core.entities().get(&button.id) else {
                continue;
            };
            match controller
                .bus
                .subscribe(button.gpio_input_pin, &button.id.to_string())
            {
                Ok(subscription) => {
                    controller.subscriptions.lock().push(subscription.id().clone());
                    tracing::info!(button = %button.name, pin = button.gpio_input_pin, "Listening for button events");
                    forwarders.push((entity.clone(), subscription));
                }
                Err(e) => {
                    let error = controller.core.abort(entity, "subscribe to edges", e);
                    // Failures are logged inside; the abort reason wins.
                    let _ = controller.release_subscriptions();
                    return Err(error);
                }
            }
        }

        for (entity, subscription) in forwarders {
            controller.core.spawn(forward_edges(
                controller.core.publisher().clone(),
                entity,
                subscription,
                controller.core.cancellation(),
            ));
        }

        controller.core.mark_running();
        Ok(controller)
    }

    /// Returns the entity published for a button.
    #[must_use]
    pub fn entity_for(&self, button_id: u32) -> Option<&Entity> {
        self.core.entities().get(&button_id)
    }

    /// Returns the ids of the live edge subscriptions.
    #[must_use]
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.subscriptions.lock().clone()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.core.state()
    }

    /// Publishes `offline`, removes the edge subscriptions and stops
    /// forwarding. Input lines stay with their owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] on a second call, or the first
    /// unsubscribe failure; the controller is closed either way.
    pub async fn close(&self) -> Result<(), Error> {
        self.core.begin_close()?;
        self.core.announce_offline().await;
        let result = self.release_subscriptions();
        let finished = self.core.finish_close().await;
        result.and(finished)
    }

    fn release_subscriptions(&self) -> Result<(), Error> {
        let ids = std::mem::take(&mut *self.subscriptions.lock());
        let mut first = None;
        for id in ids {
            if let Err(e) = self.bus.unsubscribe(&id) {
                tracing::error!(subscription = %id, error = %e, "Failed to remove edge subscription");
                first.get_or_insert(Error::from(e));
            }
        }
        first.map_or(Ok(()), Err)
    }
}

async fn forward_edges<T: Transport>(
    publisher: Publisher<T>,
    entity: Entity,
    mut subscription: EdgeSubscription,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = subscription.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let state = edge_state(&event);
        tracing::debug!(entity = %entity.unique_id(), line = event.line, edge = %event.kind, %state, "Button edge");

        if let Err(e) = publisher.report_state(&entity, state.as_str()).await {
            tracing::error!(entity = %entity.unique_id(), error = %e, "Failed to report button state");
            publisher.mark_unavailable(&entity, &e.to_string()).await;
        }
    }
    tracing::debug!(subscription = %subscription.id(), "Edge forwarding stopped");
}
