// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process transport.
//!
//! [`LoopbackTransport`] keeps an ordered log of every accepted operation,
//! routes publishes to local subscribers and lets callers inject inbound
//! messages as if Home Assistant had sent them. Faults can be injected per
//! topic to exercise timeout and error paths.
//!
//! # Examples
//!
//! ```
//! use heating_bridge::protocol::{LoopbackTransport, QoS, Transport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), heating_bridge::error::ProtocolError> {
//! let transport = LoopbackTransport::new();
//! let mut commands = transport.subscribe("ha/switch/heating_pump_1/set", QoS::AtLeastOnce).await?;
//!
//! transport.inject("ha/switch/heating_pump_1/set", "ON");
//! assert_eq!(commands.recv().await.unwrap().payload, "ON");
//!
//! transport.publish("ha/switch/heating_pump_1/state", QoS::AtMostOnce, true, "ON".into()).await?;
//! assert_eq!(transport.last_payload("ha/switch/heating_pump_1/state").as_deref(), Some("ON"));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use crate::error::ProtocolError;

use super::{InboundMessage, QoS, TopicRouter, Transport};

/// One operation accepted by the loopback transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOp {
    /// A publish.
    Publish {
        /// Topic.
        topic: String,
        /// Payload.
        payload: String,
        /// Delivery guarantee.
        qos: QoS,
        /// Retain flag.
        retain: bool,
    },
    /// A subscription.
    Subscribe {
        /// Topic.
        topic: String,
        /// Delivery guarantee.
        qos: QoS,
    },
    /// An unsubscription.
    Unsubscribe {
        /// Topic.
        topic: String,
    },
}

impl TransportOp {
    /// Topic the operation targeted.
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::Publish { topic, .. }
            | Self::Subscribe { topic, .. }
            | Self::Unsubscribe { topic } => topic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Fail,
    Stall,
}

#[derive(Debug, Default)]
struct LoopbackInner {
    router: TopicRouter,
    operations: Mutex<Vec<TransportOp>>,
    faults: Mutex<HashMap<String, Fault>>,
    changed: Notify,
}

/// In-process [`Transport`]. Clones share the same log and routes.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<LoopbackInner>,
}

impl LoopbackTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation on `topic` fail with
    /// [`ProtocolError::ConnectionFailed`].
    pub fn fail_topic(&self, topic: impl Into<String>) {
        self.inner.faults.lock().insert(topic.into(), Fault::Fail);
    }

    /// Makes every operation on `topic` hang forever.
    pub fn stall_topic(&self, topic: impl Into<String>) {
        self.inner.faults.lock().insert(topic.into(), Fault::Stall);
    }

    /// Removes any fault on `topic`.
    pub fn heal_topic(&self, topic: &str) {
        self.inner.faults.lock().remove(topic);
    }

    /// Delivers `payload` to the subscriber of `topic`.
    ///
    /// Returns `true` if someone was subscribed and the message was queued.
    pub fn inject(&self, topic: impl Into<String>, payload: impl Into<String>) -> bool {
        self.inner.router.route(InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
        })
    }

    /// Snapshot of every accepted operation, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<TransportOp> {
        self.inner.operations.lock().clone()
    }

    /// Clears the operation log.
    pub fn clear_operations(&self) {
        self.inner.operations.lock().clear();
    }

    /// Payloads published on `topic`, in order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<String> {
        self.inner
            .operations
            .lock()
            .iter()
            .filter_map(|op| match op {
                TransportOp::Publish { topic: t, payload, .. } if t == topic => {
                    Some(payload.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Last payload published on `topic`.
    #[must_use]
    pub fn last_payload(&self, topic: &str) -> Option<String> {
        self.published(topic).pop()
    }

    /// Returns `true` if `topic` currently has a subscriber.
    #[must_use]
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner.router.is_registered(topic)
    }

    /// Waits until `payload` has been published on `topic`.
    ///
    /// Returns `false` if that did not happen within `within`.
    pub async fn wait_for_payload(&self, topic: &str, payload: &str, within: Duration) -> bool {
        self.wait_until(within, |transport| {
            transport.published(topic).iter().any(|p| p == payload)
        })
        .await
    }

    /// Waits until at least `count` payloads have been published on `topic`.
    pub async fn wait_for_publishes(&self, topic: &str, count: usize, within: Duration) -> bool {
        self.wait_until(within, |transport| transport.published(topic).len() >= count)
            .await
    }

    /// Waits until `condition` holds, re-checking after every operation.
    pub async fn wait_until(&self, within: Duration, condition: impl Fn(&Self) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let changed = self.inner.changed.notified();
            if condition(self) {
                return true;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return condition(self);
            }
        }
    }

    async fn check_fault(&self, operation: &'static str, topic: &str) -> Result<(), ProtocolError> {
        let fault = self.inner.faults.lock().get(topic).copied();
        match fault {
            None => Ok(()),
            Some(Fault::Fail) => {
                tracing::debug!(topic = %topic, operation, "Injected transport failure");
                Err(ProtocolError::ConnectionFailed(format!(
                    "{operation} on {topic} rejected"
                )))
            }
            Some(Fault::Stall) => {
                tracing::debug!(topic = %topic, operation, "Injected transport stall");
                std::future::pending().await
            }
        }
    }

    fn record(&self, op: TransportOp) {
        self.inner.operations.lock().push(op);
        self.inner.changed.notify_waiters();
    }
}

impl Transport for LoopbackTransport {
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: String,
    ) -> Result<(), ProtocolError> {
        self.check_fault("publish", topic).await?;
        tracing::trace!(topic = %topic, payload = %payload, retain, "Loopback publish");

        self.inner.router.route(InboundMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        self.record(TransportOp::Publish {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
    ) -> Result<mpsc::Receiver<InboundMessage>, ProtocolError> {
        self.check_fault("subscribe", topic).await?;
        let rx = self.inner.router.register(topic);
        self.record(TransportOp::Subscribe {
            topic: topic.to_string(),
            qos,
        });
        Ok(rx)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.check_fault("unsubscribe", topic).await?;
        self.inner.router.unregister(topic);
        self.record(TransportOp::Unsubscribe {
            topic: topic.to_string(),
        });
        Ok(())
    }
}
