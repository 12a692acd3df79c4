// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inbound message routing.
//!
//! The [`TopicRouter`] maps exact topics to the channel of whoever
//! subscribed to them. Both transports use it to hand inbound messages to
//! the controllers.
//!
//! ```text
//! inbound: homeassistant/switch/heating_pump_1/set → ON
//!                     ↓
//!             TopicRouter.route()
//!                     ↓
//!   lookup "homeassistant/switch/heating_pump_1/set"
//!                     ↓
//!        mpsc::Sender<InboundMessage>.try_send()
//!                     ↓
//!            switch command task
//! ```

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::InboundMessage;

/// Capacity of each subscriber channel.
pub const SUBSCRIBER_CAPACITY: usize = 16;

/// Routes inbound messages to per-topic subscriber channels.
#[derive(Debug, Default)]
pub struct TopicRouter {
    routes: RwLock<HashMap<String, mpsc::Sender<InboundMessage>>>,
}

impl TopicRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `topic` and returns the receiving end of its channel.
    ///
    /// A previous registration for the same topic is replaced; its receiver
    /// sees the channel close.
    pub fn register(&self, topic: impl Into<String>) -> mpsc::Receiver<InboundMessage> {
        let topic = topic.into();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        tracing::debug!(topic = %topic, "Registering topic route");
        self.routes.write().insert(topic, tx);
        rx
    }

    /// Removes the route for `topic`.
    ///
    /// Returns `true` if the topic was registered.
    pub fn unregister(&self, topic: &str) -> bool {
        tracing::debug!(topic = %topic, "Unregistering topic route");
        self.routes.write().remove(topic).is_some()
    }

    /// Returns `true` if `topic` has a route.
    #[must_use]
    pub fn is_registered(&self, topic: &str) -> bool {
        self.routes.read().contains_key(topic)
    }

    /// Number of registered topics.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Drops every route, closing all subscriber channels.
    pub fn clear(&self) {
        self.routes.write().clear();
    }

    /// Delivers a message to the subscriber of its topic.
    ///
    /// Never blocks: the transport's event loop calls this. A full channel
    /// drops the message with a warning; a closed one removes the route.
    /// Returns `true` if the message was queued.
    pub fn route(&self, message: InboundMessage) -> bool {
        let sender = self.routes.read().get(&message.topic).cloned();
        let Some(sender) = sender else {
            tracing::trace!(topic = %message.topic, "No route for topic");
            return false;
        };

        let topic = message.topic.clone();
        match sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(topic = %topic, "Subscriber not keeping up, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(topic = %topic, "Subscriber gone, removing route");
                let mut routes = self.routes.write();
                if routes.get(&topic).is_some_and(mpsc::Sender::is_closed) {
                    routes.remove(&topic);
                }
                false
            }
        }
    }
}
