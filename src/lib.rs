// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heating Bridge - expose heating hardware on a Raspberry Pi to Home
//! Assistant through MQTT discovery.
//!
//! The bridge publishes three entity families:
//!
//! - **Switches** for heating pumps driven by GPIO outputs. Commands from
//!   Home Assistant set the pump and the state read back is reported.
//! - **Binary sensors** for push buttons on GPIO inputs. Edges are fanned
//!   out through the [`EdgeBus`](gpio::EdgeBus) and reported as `ON`/`OFF`.
//! - **Temperature sensors** for 1-Wire probes, polled periodically.
//!
//! Each family is driven by a controller that publishes retained discovery
//! configs, announces availability, reports state and, on shutdown,
//! announces `offline`.
//!
//! # Quick Start
//!
//! ```no_run
//! use heating_bridge::config::AppConfig;
//! use heating_bridge::event::EventBus;
//! use heating_bridge::gpio::{EdgeBus, SysfsChip};
//! use heating_bridge::protocol::MqttBrokerBuilder;
//! use heating_bridge::runtime::HeatingBridge;
//! use heating_bridge::sensor::W1TemperatureSource;
//!
//! #[tokio::main]
//! async fn main() -> heating_bridge::Result<()> {
//!     let config = AppConfig::load("/home/pi/config.json")?;
//!     let broker = MqttBrokerBuilder::from_config(&config.mqtt)?.build().await?;
//!
//!     let edges = EdgeBus::new();
//!     let chip = SysfsChip::new(&config.gpio.sysfs_path, edges.clone());
//!     let bridge = HeatingBridge::start(
//!         broker.clone(),
//!         &chip,
//!         edges,
//!         W1TemperatureSource::new(&config.w1_devices_path),
//!         EventBus::new(),
//!         &config,
//!     )
//!     .await?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     bridge.shutdown().await?;
//!     broker.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `mqtt` (default): the `rumqttc` transport and the `heating-bridge`
//!   binary. Without it only the in-process
//!   [`LoopbackTransport`](protocol::LoopbackTransport) is available.

pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod event;
pub mod gpio;
pub mod protocol;
pub mod pump;
pub mod runtime;
pub mod sensor;
pub mod types;

pub use error::{Error, Result};
