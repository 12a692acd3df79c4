// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast channel for controller events.

use tokio::sync::broadcast;

use super::ControllerEvent;

/// Events buffered per subscriber before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 256;

/// Fans controller events out to any number of observers.
///
/// Controllers never wait on observers: with nobody listening an event is
/// dropped, and a subscriber that falls more than the capacity behind
/// loses the oldest events (`RecvError::Lagged`).
///
/// # Examples
///
/// ```
/// use heating_bridge::event::{ControllerEvent, EventBus};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.publish(ControllerEvent::state_reported("heating_pump_1", "ON"));
/// assert_eq!(rx.try_recv().unwrap().entity(), Some("heating_pump_1"));
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ControllerEvent>,
}

impl EventBus {
    /// Creates a bus buffering 256 events per subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus buffering `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receives every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.sender.subscribe()
    }

    /// Receives only failure events published from now on.
    #[must_use]
    pub fn failures(&self) -> FailureWatch {
        FailureWatch {
            rx: self.sender.subscribe(),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes `event`. Without subscribers the event is dropped.
    pub fn publish(&self, event: ControllerEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Controller event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription that skips everything but
/// [failures](ControllerEvent::is_failure).
#[derive(Debug)]
pub struct FailureWatch {
    rx: broadcast::Receiver<ControllerEvent>,
}

impl FailureWatch {
    /// Waits for the next failure.
    ///
    /// Returns `None` once every [`EventBus`] clone is gone. Lagging is
    /// logged and skipped.
    pub async fn next(&mut self) -> Option<ControllerEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.is_failure() => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Failure watch lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reported(entity: &str) -> ControllerEvent {
        ControllerEvent::state_reported(entity, "ON")
    }

    fn sensor_failed(entity: &str) -> ControllerEvent {
        ControllerEvent::SensorReadFailed {
            entity: entity.to_string(),
            error: "CRC check failed".to_string(),
        }
    }

    #[test]
    fn subscriber_count_follows_receivers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        let rx = bus.subscribe();
        let _failures = bus.failures();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(reported("heating_pump_1"));
    }

    #[tokio::test]
    async fn clones_share_one_channel() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.clone().publish(reported("button_1"));

        assert_eq!(first.recv().await.unwrap().entity(), Some("button_1"));
        assert_eq!(second.recv().await.unwrap().entity(), Some("button_1"));
    }

    #[tokio::test]
    async fn slow_subscriber_lags() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe();

        for i in 0..4 {
            bus.publish(reported(&format!("temp_{i}")));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().entity(), Some("temp_2"));
    }

    #[tokio::test]
    async fn failure_watch_skips_reports() {
        let bus = EventBus::new();
        let mut failures = bus.failures();

        bus.publish(reported("temp_1"));
        bus.publish(sensor_failed("temp_2"));

        assert_eq!(failures.next().await, Some(sensor_failed("temp_2")));
    }

    #[tokio::test]
    async fn failure_watch_ends_with_the_bus() {
        let bus = EventBus::new();
        let mut failures = bus.failures();
        drop(bus);

        assert_eq!(failures.next().await, None);
    }
}
