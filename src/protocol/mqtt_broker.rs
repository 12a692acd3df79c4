// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT broker connection.
//!
//! One persistent connection carries every entity's traffic. Inbound
//! messages are routed per exact topic to the channel returned by
//! [`subscribe`](crate::protocol::Transport::subscribe).
//!
//! # Examples
//!
//! ```no_run
//! use heating_bridge::protocol::{MqttBroker, QoS, Transport};
//!
//! # async fn example() -> Result<(), heating_bridge::error::ProtocolError> {
//! let broker = MqttBroker::builder()
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("user", "password")
//!     .client_id("rpi-heating-controller")
//!     .build()
//!     .await?;
//!
//! broker
//!     .publish("homeassistant/switch/heating_pump_1/status", QoS::AtMostOnce, true, "online".into())
//!     .await?;
//!
//! broker.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::{DEFAULT_CLIENT_ID, DEFAULT_MQTT_PORT, MqttConfig};
use crate::error::{ConfigError, ProtocolError};

use super::{InboundMessage, QoS, TopicRouter, Transport};

/// Configuration for an MQTT broker connection.
#[derive(Debug, Clone)]
struct MqttBrokerConfig {
    host: String,
    port: u16,
    client_id: String,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
}

impl Default for MqttBrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_MQTT_PORT,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            credentials: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

/// A connection to an MQTT broker.
///
/// `MqttBroker` is cheaply cloneable (via `Arc`); clones share the
/// connection and the inbound routes.
#[derive(Clone)]
pub struct MqttBroker {
    inner: Arc<MqttBrokerInner>,
}

struct MqttBrokerInner {
    client: AsyncClient,
    router: TopicRouter,
    config: MqttBrokerConfig,
    connected: AtomicBool,
    /// Set by [`MqttBroker::disconnect`] so the event loop ending is not
    /// reported as a lost connection.
    closing: AtomicBool,
    lost: watch::Sender<bool>,
}

impl MqttBroker {
    /// Creates a new builder for configuring an MQTT broker connection.
    #[must_use]
    pub fn builder() -> MqttBrokerBuilder {
        MqttBrokerBuilder::default()
    }

    /// Returns whether the broker is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Returns the host address of the broker.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    /// Returns the port of the broker.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    /// Returns the client id used for the connection.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.config.client_id
    }

    /// Watches for an unexpected loss of the connection.
    ///
    /// The value flips to `true` once when the event loop stops without
    /// [`disconnect`](Self::disconnect) having been called. There is no
    /// reconnection.
    #[must_use]
    pub fn connection_lost(&self) -> watch::Receiver<bool> {
        self.inner.lost.subscribe()
    }

    /// Number of topics with an inbound route.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.router.route_count()
    }

    /// Disconnects from the broker.
    ///
    /// This closes the connection and every subscriber channel.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request cannot be queued.
    pub async fn disconnect(&self) -> Result<(), ProtocolError> {
        tracing::info!(
            host = %self.inner.config.host,
            port = %self.inner.config.port,
            "Disconnecting from MQTT broker"
        );

        self.inner.closing.store(true, Ordering::Release);
        self.inner.router.clear();

        self.inner
            .client
            .disconnect()
            .await
            .map_err(ProtocolError::Mqtt)?;

        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn route_message(&self, topic: String, payload: String) {
        tracing::debug!(topic = %topic, payload = %payload, "MQTT message received");
        self.inner.router.route(InboundMessage { topic, payload });
    }

    fn mark_lost(&self) {
        self.inner.connected.store(false, Ordering::Release);
        if !self.inner.closing.load(Ordering::Acquire) {
            self.inner.lost.send_replace(true);
        }
    }
}

impl Transport for MqttBroker {
    async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: String,
    ) -> Result<(), ProtocolError> {
        tracing::debug!(topic = %topic, payload = %payload, %qos, retain, "Publishing");
        self.inner
            .client
            .publish(topic, qos.into(), retain, payload)
            .await
            .map_err(ProtocolError::Mqtt)
    }

    async fn subscribe(
        &self,
        topic: &str,
        qos: QoS,
    ) -> Result<mpsc::Receiver<InboundMessage>, ProtocolError> {
        // Route first so nothing delivered right after SUBACK is lost.
        let rx = self.inner.router.register(topic);
        if let Err(e) = self.inner.client.subscribe(topic, qos.into()).await {
            self.inner.router.unregister(topic);
            return Err(ProtocolError::Mqtt(e));
        }
        tracing::debug!(topic = %topic, %qos, "Subscribed");
        Ok(rx)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.inner.router.unregister(topic);
        self.inner
            .client
            .unsubscribe(topic)
            .await
            .map_err(ProtocolError::Mqtt)?;
        tracing::debug!(topic = %topic, "Unsubscribed");
        Ok(())
    }
}

impl std::fmt::Debug for MqttBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBroker")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("client_id", &self.inner.config.client_id)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Builder for creating an MQTT broker connection.
///
/// # Examples
///
/// ```no_run
/// use heating_bridge::protocol::MqttBroker;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), heating_bridge::error::ProtocolError> {
/// let broker = MqttBroker::builder()
///     .host("192.168.1.50")
///     .port(1883)
///     .keep_alive(Duration::from_secs(60))
///     .connection_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MqttBrokerBuilder {
    config: MqttBrokerConfig,
}

impl MqttBrokerBuilder {
    /// Creates a builder from the `mqtt` section of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the address cannot be parsed.
    pub fn from_config(config: &MqttConfig) -> Result<Self, ConfigError> {
        let address = config.broker_address()?;
        let mut builder = Self::default()
            .host(address.host)
            .port(address.port)
            .client_id(config.client_id.clone());
        if let Some((username, password)) = config.credentials() {
            builder = builder.credentials(username, password);
        }
        Ok(builder)
    }

    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the client id (default: `rpi-heating-controller`).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Builds and connects to the MQTT broker.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Host is not set
    /// - Connection fails
    /// - Connection times out
    pub async fn build(self) -> Result<MqttBroker, ProtocolError> {
        if self.config.host.is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }

        let mut mqtt_options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        mqtt_options.set_keep_alive(self.config.keep_alive);
        mqtt_options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.config.credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let (lost, _) = watch::channel(false);

        let broker = MqttBroker {
            inner: Arc::new(MqttBrokerInner {
                client,
                router: TopicRouter::new(),
                config: self.config.clone(),
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                lost,
            }),
        };

        let broker_clone = broker.clone();
        let (connack_tx, connack_rx) = oneshot::channel();

        tokio::spawn(async move {
            handle_broker_events(event_loop, broker_clone, Some(connack_tx)).await;
        });

        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {
                broker.inner.connected.store(true, Ordering::Release);
                tracing::info!(
                    host = %self.config.host,
                    port = %self.config.port,
                    client_id = %self.config.client_id,
                    "Connected to MQTT broker"
                );
            }
            Ok(Err(_)) => {
                broker.inner.closing.store(true, Ordering::Release);
                return Err(ProtocolError::ConnectionFailed(
                    "MQTT event loop terminated unexpectedly".to_string(),
                ));
            }
            Err(_) => {
                broker.inner.closing.store(true, Ordering::Release);
                let _ = broker.inner.client.try_disconnect();
                return Err(ProtocolError::ConnectionFailed(format!(
                    "MQTT connection timeout after {}s",
                    timeout.as_secs()
                )));
            }
        }

        Ok(broker)
    }
}

/// Drives the connection until it ends.
async fn handle_broker_events(
    mut event_loop: EventLoop,
    broker: MqttBroker,
    connack_tx: Option<oneshot::Sender<()>>,
) {
    use rumqttc::{Event, Packet};

    let mut connack_tx = connack_tx;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                broker.inner.connected.store(true, Ordering::Release);
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match String::from_utf8(publish.payload.to_vec()) {
                    Ok(payload) => broker.route_message(publish.topic, payload),
                    Err(_) => {
                        tracing::warn!(topic = %publish.topic, "Ignoring non UTF-8 payload");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                broker.mark_lost();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if broker.inner.closing.load(Ordering::Acquire) {
                    tracing::debug!(error = %e, "MQTT event loop stopped");
                } else {
                    tracing::error!(error = %e, "MQTT broker event loop error");
                }
                broker.mark_lost();
                break;
            }
        }
    }
}
