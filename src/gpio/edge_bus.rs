// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registry fanning GPIO edge events out to per-line subscribers.
//!
//! # Backpressure
//!
//! Every subscription owns a single-slot channel and [`EdgeBus::dispatch`]
//! waits until the event is accepted. A consumer that stops receiving
//! therefore stalls delivery of later hardware events for every line. This
//! is intentional: button presses are low-frequency human input, and
//! dropping an edge would leave Home Assistant showing the wrong state.
//!
//! # Locking
//!
//! Subscribe, unsubscribe and dispatch all go through the same mutex. The
//! lock is only held to mutate the map or to snapshot the matching senders,
//! never while waiting for a consumer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::SubscriptionError;

use super::EdgeEvent;

/// Capacity of each subscription channel.
const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 1;

/// Identifier of an edge-event subscription.
///
/// Derived from the observer tag and the line, so the same observer cannot
/// subscribe twice to one line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Derives the subscription id for an observer on a line.
    #[must_use]
    pub fn derive(observer: &str, line: u32) -> Self {
        Self(format!("btn-{observer}-{line}"))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live subscription to edges on one line.
///
/// The receiving side is closed once the subscription is removed from the
/// bus; [`recv`](Self::recv) then returns `None`.
#[derive(Debug)]
pub struct EdgeSubscription {
    id: SubscriptionId,
    line: u32,
    receiver: mpsc::Receiver<EdgeEvent>,
}

impl EdgeSubscription {
    /// Returns the subscription id.
    #[must_use]
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Returns the GPIO line this subscription listens on.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Waits for the next edge. Returns `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<EdgeEvent> {
        self.receiver.recv().await
    }

    /// Returns a pending edge without waiting.
    ///
    /// # Errors
    ///
    /// Returns `TryRecvError::Empty` if nothing is queued and
    /// `TryRecvError::Disconnected` once unsubscribed.
    pub fn try_recv(&mut self) -> Result<EdgeEvent, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

struct Registration {
    line: u32,
    sender: mpsc::Sender<EdgeEvent>,
}

/// Subscription registry for GPIO edge events.
///
/// Cheap to clone; clones share the same registry. Hardware drivers call
/// [`dispatch`](Self::dispatch) (or [`dispatch_blocking`](Self::dispatch_blocking)
/// from a plain thread) for every detected edge.
#[derive(Clone, Default)]
pub struct EdgeBus {
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, Registration>>>,
}

impl EdgeBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `observer` to edges on `line`.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::DuplicateSubscription`] if the observer
    /// already listens on this line. The registry is left unchanged.
    pub fn subscribe(
        &self,
        line: u32,
        observer: &str,
    ) -> Result<EdgeSubscription, SubscriptionError> {
        let id = SubscriptionId::derive(observer, line);
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(&id) {
            return Err(SubscriptionError::DuplicateSubscription(id.to_string()));
        }

        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        subscriptions.insert(id.clone(), Registration { line, sender });
        drop(subscriptions);

        tracing::info!(subscription = %id, line, "Subscribed to edge events");
        Ok(EdgeSubscription { id, line, receiver })
    }

    /// Removes a subscription and closes its channel.
    ///
    /// The entry leaves the map before its sender is dropped, so no new
    /// dispatch can pick it up once this returns. A dispatch that had already
    /// taken its snapshot may still hand over one last event.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotFound`] if the id is not registered.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), SubscriptionError> {
        let removed = self.subscriptions.lock().remove(id);
        let Some(registration) = removed else {
            return Err(SubscriptionError::NotFound(id.to_string()));
        };
        drop(registration.sender);

        tracing::info!(subscription = %id, line = registration.line, "Unsubscribed from edge events");
        Ok(())
    }

    /// Returns whether a subscription with this id exists.
    #[must_use]
    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.subscriptions.lock().contains_key(id)
    }

    /// Returns the number of registered subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Delivers an edge to every subscription on the event's line.
    ///
    /// Waits for each matching consumer to accept the event. Returns the
    /// number of subscriptions it was delivered to.
    pub async fn dispatch(&self, event: EdgeEvent) -> usize {
        let targets = self.matching(event.line);
        tracing::debug!(line = event.line, edge = %event.kind, targets = targets.len(), "Dispatching edge");

        let mut delivered = 0;
        for (id, sender) in targets {
            if sender.send(event.clone()).await.is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(subscription = %id, "Edge consumer is gone");
            }
        }
        delivered
    }

    /// Same as [`dispatch`](Self::dispatch), for driver threads outside the
    /// async runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context.
    pub fn dispatch_blocking(&self, event: &EdgeEvent) -> usize {
        let targets = self.matching(event.line);
        tracing::debug!(line = event.line, edge = %event.kind, targets = targets.len(), "Dispatching edge");

        let mut delivered = 0;
        for (id, sender) in targets {
            if sender.blocking_send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(subscription = %id, "Edge consumer is gone");
            }
        }
        delivered
    }

    fn matching(&self, line: u32) -> Vec<(SubscriptionId, mpsc::Sender<EdgeEvent>)> {
        self.subscriptions
            .lock()
            .iter()
            .filter(|(_, registration)| registration.line == line)
            .map(|(id, registration)| (id.clone(), registration.sender.clone()))
            .collect()
    }
}

impl fmt::Debug for EdgeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeBus")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gpio::EdgeKind;

    #[test]
    fn subscription_id_combines_observer_and_line() {
        assert_eq!(SubscriptionId::derive("3", 17).as_str(), "btn-3-17");
    }

    #[test]
    fn duplicate_subscription_is_rejected() {
        let bus = EdgeBus::new();
        let _sub = bus.subscribe(17, "1").unwrap();

        let err = bus.subscribe(17, "1").unwrap_err();
        assert_eq!(
            err,
            SubscriptionError::DuplicateSubscription("btn-1-17".to_string())
        );
        assert_eq!(bus.subscription_count(), 1);
    }

    #[test]
    fn same_observer_may_watch_different_lines() {
        let bus = EdgeBus::new();
        let _a = bus.subscribe(17, "1").unwrap();
        let _b = bus.subscribe(27, "1").unwrap();
        assert_eq!(bus.subscription_count(), 2);
    }

    #[test]
    fn unsubscribe_unknown_returns_not_found() {
        let bus = EdgeBus::new();
        let err = bus
            .unsubscribe(&SubscriptionId::derive("9", 4))
            .unwrap_err();
        assert_eq!(err, SubscriptionError::NotFound("btn-9-4".to_string()));
    }

    #[tokio::test]
    async fn unsubscribe_closes_channel() {
        let bus = EdgeBus::new();
        let mut sub = bus.subscribe(17, "1").unwrap();
        let id = sub.id().clone();

        bus.unsubscribe(&id).unwrap();

        assert!(!bus.contains(&id));
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn dispatch_reaches_only_matching_line() {
        let bus = EdgeBus::new();
        let mut on_17 = bus.subscribe(17, "1").unwrap();
        let mut on_27 = bus.subscribe(27, "2").unwrap();

        let delivered = bus.dispatch(EdgeEvent::now(17, EdgeKind::Falling)).await;
        assert_eq!(delivered, 1);

        let event = on_17.recv().await.unwrap();
        assert_eq!(event.line, 17);
        assert_eq!(event.kind, EdgeKind::Falling);
        assert!(matches!(
            on_27.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn dispatch_fans_out_to_all_observers_of_a_line() {
        let bus = EdgeBus::new();
        let mut first = bus.subscribe(5, "a").unwrap();
        let mut second = bus.subscribe(5, "b").unwrap();

        assert_eq!(bus.dispatch(EdgeEvent::now(5, EdgeKind::Rising)).await, 2);
        assert_eq!(first.recv().await.unwrap().kind, EdgeKind::Rising);
        assert_eq!(second.recv().await.unwrap().kind, EdgeKind::Rising);
    }

    #[tokio::test]
    async fn dispatch_without_subscribers_delivers_nothing() {
        let bus = EdgeBus::new();
        assert_eq!(bus.dispatch(EdgeEvent::now(5, EdgeKind::Rising)).await, 0);
    }

    #[tokio::test]
    async fn dispatch_waits_for_slow_consumer() {
        let bus = EdgeBus::new();
        let mut sub = bus.subscribe(17, "1").unwrap();

        // The first event fills the slot.
        bus.dispatch(EdgeEvent::now(17, EdgeKind::Falling)).await;

        let second = tokio::spawn({
            let bus = bus.clone();
            async move { bus.dispatch(EdgeEvent::now(17, EdgeKind::Rising)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());

        assert_eq!(sub.recv().await.unwrap().kind, EdgeKind::Falling);
        assert_eq!(second.await.unwrap(), 1);
        assert_eq!(sub.recv().await.unwrap().kind, EdgeKind::Rising);
    }

    #[test]
    fn dispatch_blocking_from_driver_thread() {
        let bus = EdgeBus::new();
        let mut sub = bus.subscribe(22, "1").unwrap();

        let driver = std::thread::spawn({
            let bus = bus.clone();
            move || bus.dispatch_blocking(&EdgeEvent::now(22, EdgeKind::Falling))
        });

        assert_eq!(driver.join().unwrap(), 1);
        assert!(sub.try_recv().unwrap().is_falling());
    }

    #[tokio::test]
    async fn dropped_consumer_is_not_counted() {
        let bus = EdgeBus::new();
        let sub = bus.subscribe(17, "1").unwrap();
        drop(sub);

        assert_eq!(bus.dispatch(EdgeEvent::now(17, EdgeKind::Falling)).await, 0);
    }
}
