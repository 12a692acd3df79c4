// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pub/sub transports.
//!
//! Controllers talk to Home Assistant through the narrow [`Transport`]
//! interface: publish, subscribe, unsubscribe. Two implementations exist:
//!
//! - [`MqttBroker`]: a real broker connection on `rumqttc` (feature `mqtt`)
//! - [`LoopbackTransport`]: in-process, records publishes and lets callers
//!   inject inbound messages
//!
//! Transports do not bound how long an operation may take; the controllers
//! wrap every call in a timeout.

mod loopback;
#[cfg(feature = "mqtt")]
mod mqtt_broker;
mod topic_router;

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;

use crate::error::ProtocolError;

pub use loopback::{LoopbackTransport, TransportOp};
#[cfg(feature = "mqtt")]
pub use mqtt_broker::{MqttBroker, MqttBrokerBuilder};
pub use topic_router::{SUBSCRIBER_CAPACITY, TopicRouter};

/// Delivery guarantee of a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Acknowledged delivery, possibly duplicated.
    AtLeastOnce,
    /// Exactly-once handshake.
    ExactlyOnce,
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        };
        write!(f, "{level}")
    }
}

#[cfg(feature = "mqtt")]
impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::AtMostOnce,
            QoS::AtLeastOnce => Self::AtLeastOnce,
            QoS::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// UTF-8 payload.
    pub payload: String,
}

/// The pub/sub operations controllers need.
///
/// Implementations are cheap to clone and share one connection between
/// clones.
pub trait Transport: Clone + Send + Sync + 'static {
    /// Publishes `payload` on `topic`.
    fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: String,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Subscribes to `topic` and returns the channel inbound messages
    /// arrive on.
    fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
    ) -> impl Future<Output = Result<mpsc::Receiver<InboundMessage>, ProtocolError>> + Send;

    /// Unsubscribes from `topic`, closing its channel.
    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), ProtocolError>> + Send;
}
