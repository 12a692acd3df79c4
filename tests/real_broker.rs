// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests against a real MQTT broker.
//!
//! These tests need a broker on the network and are ignored by default.
//! The GPIO side is simulated.
//! Run with: `cargo test --test real_broker -- --ignored --test-threads=1`
//!
//! # Environment Variables
//!
//! - `MQTT_BROKER_IP` - Broker IP address
//! - `MQTT_BROKER_PORT` - Broker port (default: 1883)
//! - `MQTT_USER` - MQTT username (optional)
//! - `MQTT_PASSWORD` - MQTT password (optional)
//!
//! # Example
//!
//! ```bash
//! export MQTT_BROKER_IP=192.168.1.100
//! export MQTT_USER=mqtt
//! export MQTT_PASSWORD=secret
//! cargo test --test real_broker -- --ignored --test-threads=1
//! ```

#![cfg(feature = "mqtt")]

use std::env;
use std::time::Duration;

use heating_bridge::config::AppConfig;
use heating_bridge::event::EventBus;
use heating_bridge::gpio::{EdgeBus, EdgeKind, SimulatedChip};
use heating_bridge::protocol::{MqttBroker, MqttBrokerBuilder, QoS, Transport};
use heating_bridge::runtime::HeatingBridge;
use heating_bridge::sensor::SimulatedTemperatures;
use heating_bridge::types::LineLevel;

/// Discovery prefix kept apart from a live Home Assistant.
const PREFIX: &str = "heating_bridge_test";

fn config() -> AppConfig {
    let ip = env::var("MQTT_BROKER_IP").expect("MQTT_BROKER_IP not set");
    let port = env::var("MQTT_BROKER_PORT").unwrap_or_else(|_| "1883".to_string());
    let user = env::var("MQTT_USER").unwrap_or_default();
    let password = env::var("MQTT_PASSWORD").unwrap_or_default();

    AppConfig::from_json_str(&format!(
        r#"{{
            "mqtt": {{"addr": "{ip}:{port}", "username": "{user}", "password": "{password}",
                      "client_id": "heating-bridge-real-test"}},
            "home_assistant_device": {{"identifiers": ["heating-bridge-test"], "name": "Heating test"}},
            "pumps": [{{"id": 1, "name": "Test pump", "gpio_state_pin": 17}}],
            "buttons": [{{"id": 1, "name": "Test button", "gpio_input_pin": 22, "enable_pull_up": true}}],
            "temperature_sensors": [{{"id": "28-test", "name": "Test probe"}}],
            "discovery": {{"prefix": "{PREFIX}"}}
        }}"#
    ))
    .expect("invalid test configuration")
}

/// A second client watching what the bridge publishes.
async fn observer(config: &AppConfig) -> MqttBroker {
    let mut section = config.mqtt.clone();
    section.client_id = "heating-bridge-real-observer".to_string();
    MqttBrokerBuilder::from_config(&section)
        .unwrap()
        .build()
        .await
        .expect("observer failed to connect")
}

async fn expect_payload(
    rx: &mut tokio::sync::mpsc::Receiver<heating_bridge::protocol::InboundMessage>,
    expected: &str,
) {
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(message) = rx.recv().await {
            if message.payload == expected {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    assert!(found, "never saw {expected:?}");
}

#[tokio::test]
#[ignore = "requires a real MQTT broker"]
async fn command_round_trip() {
    let config = config();
    let broker = MqttBrokerBuilder::from_config(&config.mqtt)
        .unwrap()
        .build()
        .await
        .expect("bridge failed to connect");
    let watcher = observer(&config).await;

    let state_topic = format!("{PREFIX}/switch/heating_pump_1/state");
    let mut states = watcher
        .subscribe(&state_topic, QoS::AtLeastOnce)
        .await
        .unwrap();

    let edges = EdgeBus::new();
    let chip = SimulatedChip::new(edges.clone());
    let temperatures = SimulatedTemperatures::new();
    temperatures.set("28-test", 21.5);
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

    watcher
        .publish(
            &format!("{PREFIX}/switch/heating_pump_1/set"),
            QoS::AtLeastOnce,
            false,
            "ON".to_string(),
        )
        .await
        .unwrap();
    expect_payload(&mut states, "ON").await;
    assert_eq!(chip.level(17), Some(LineLevel::High));

    bridge.shutdown().await.unwrap();
    broker.disconnect().await.unwrap();
    watcher.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a real MQTT broker"]
async fn button_and_temperature_reach_the_broker() {
    let config = config();
    let broker = MqttBrokerBuilder::from_config(&config.mqtt)
        .unwrap()
        .build()
        .await
        .expect("bridge failed to connect");
    let watcher = observer(&config).await;

    let mut buttons = watcher
        .subscribe(
            &format!("{PREFIX}/binary_sensor/button_1/state"),
            QoS::AtLeastOnce,
        )
        .await
        .unwrap();
    let mut temperatures_rx = watcher
        .subscribe(&format!("{PREFIX}/sensor/temp_28-test/state"), QoS::AtLeastOnce)
        .await
        .unwrap();

    let edges = EdgeBus::new();
    let chip = SimulatedChip::new(edges.clone());
    let temperatures = SimulatedTemperatures::new();
    temperatures.set("28-test", 21.5);
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

    expect_payload(&mut temperatures_rx, "21.50").await;

    chip.emit_edge(22, EdgeKind::Falling).await.unwrap();
    expect_payload(&mut buttons, "ON").await;

    bridge.shutdown().await.unwrap();
    broker.disconnect().await.unwrap();
    watcher.disconnect().await.unwrap();
}
