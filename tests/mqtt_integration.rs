// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the MQTT transport using mockforge-mqtt.

#![cfg(feature = "mqtt")]

use std::time::Duration;

use heating_bridge::config::{AppConfig, MqttConfig as BridgeMqttConfig};
use heating_bridge::event::EventBus;
use heating_bridge::gpio::{EdgeBus, SimulatedChip};
use heating_bridge::protocol::{MqttBroker, MqttBrokerBuilder, QoS, Transport};
use heating_bridge::runtime::HeatingBridge;
use heating_bridge::sensor::SimulatedTemperatures;
use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use tokio::time::sleep;

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18850);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to bind before clients connect
    sleep(Duration::from_millis(500)).await;
}

async fn connect(port: u16) -> MqttBroker {
    MqttBroker::builder()
        .host("127.0.0.1")
        .port(port)
        .client_id(format!("heating-bridge-test-{port}"))
        .connection_timeout(Duration::from_secs(5))
        .build()
        .await
        .expect("failed to connect to mock broker")
}

// ============================================================================
// Connection
// ============================================================================

mod connection {
    use super::*;

    #[tokio::test]
    async fn connect_to_broker() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = connect(port).await;

        assert!(broker.is_connected());
        assert_eq!(broker.port(), port);
        assert!(!*broker.connection_lost().borrow());
    }

    #[tokio::test]
    async fn connect_from_config_section() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let section = BridgeMqttConfig {
            addr: format!("tcp://127.0.0.1:{port}"),
            username: String::new(),
            password: String::new(),
            client_id: "rpi-heating-controller".to_string(),
        };
        let broker = MqttBrokerBuilder::from_config(&section)
            .unwrap()
            .build()
            .await;

        assert!(broker.is_ok(), "Failed to connect: {:?}", broker.err());
        assert_eq!(broker.unwrap().client_id(), "rpi-heating-controller");
    }

    #[tokio::test]
    async fn connect_without_broker_fails() {
        let port = get_test_port();

        let result = MqttBroker::builder()
            .host("127.0.0.1")
            .port(port)
            .connection_timeout(Duration::from_secs(1))
            .build()
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_host_is_rejected() {
        let result = MqttBroker::builder().port(1883).build().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn disconnect_is_not_a_lost_connection() {
        let port = get_test_port();
        start_mock_broker(port).await;
        let broker = connect(port).await;

        broker.disconnect().await.unwrap();
        sleep(Duration::from_millis(200)).await;

        assert!(!*broker.connection_lost().borrow());
    }
}

// ============================================================================
// Transport operations
// ============================================================================

mod transport {
    use super::*;

    #[tokio::test]
    async fn publish_subscribe_unsubscribe() {
        let port = get_test_port();
        start_mock_broker(port).await;
        let broker = connect(port).await;

        broker
            .publish(
                "homeassistant/switch/heating_pump_1/availability",
                QoS::AtMostOnce,
                true,
                "online".to_string(),
            )
            .await
            .unwrap();

        let _rx = broker
            .subscribe("homeassistant/switch/heating_pump_1/set", QoS::AtLeastOnce)
            .await
            .unwrap();
        assert_eq!(broker.subscription_count(), 1);

        broker
            .unsubscribe("homeassistant/switch/heating_pump_1/set")
            .await
            .unwrap();
        assert_eq!(broker.subscription_count(), 0);
    }
}

// ============================================================================
// Bridge over a broker
// ============================================================================

mod bridge {
    use super::*;

    #[tokio::test]
    async fn start_and_shutdown_over_mqtt() {
        let port = get_test_port();
        start_mock_broker(port).await;
        let broker = connect(port).await;

        let config = AppConfig::from_json_str(&format!(
            r#"{{
                "mqtt": {{"addr": "127.0.0.1:{port}"}},
                "home_assistant_device": {{"identifiers": ["rpi"], "name": "Heating"}},
                "pumps": [{{"id": 1, "name": "Floor", "gpio_state_pin": 17}}],
                "temperature_sensors": [{{"id": "28-1", "name": "Flow"}}],
                "buttons": [{{"id": 1, "name": "Boost", "gpio_input_pin": 22, "enable_pull_up": true}}],
                "timing": {{"publish_pacing_ms": 10}}
            }}"#
        ))
        .unwrap();

        let edges = EdgeBus::new();
        let chip = SimulatedChip::new(edges.clone());
        let temperatures = SimulatedTemperatures::new();
        temperatures.set("28-1", 21.5);

        let bridge = HeatingBridge::start(
            broker.clone(),
            &chip,
            edges,
            temperatures,
            EventBus::new(),
            &config,
        )
        .await
        .unwrap();
        assert_eq!(broker.subscription_count(), 1);

        bridge.shutdown().await.unwrap();
        assert_eq!(broker.subscription_count(), 0);
        broker.disconnect().await.unwrap();
    }
}
