// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `heating-bridge` - runs the bridge until interrupted or the broker
//! connection is lost.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use heating_bridge::config::{AppConfig, DEFAULT_CONFIG_PATH, GpioBackend, GpioConfig};
use heating_bridge::event::EventBus;
#[cfg(feature = "cdev")]
use heating_bridge::gpio::CdevChip;
use heating_bridge::gpio::{EdgeBus, LineSource, SimulatedChip, SysfsChip};
use heating_bridge::protocol::{LoopbackTransport, MqttBrokerBuilder, Transport};
use heating_bridge::runtime::HeatingBridge;
use heating_bridge::sensor::{SimulatedTemperatures, TemperatureSource, W1TemperatureSource};

/// Temperature reported by every probe in simulation mode.
const SIMULATED_CELSIUS: f64 = 20.0;

/// Bridge heating pumps, buttons and 1-Wire probes to Home Assistant.
#[derive(Debug, Parser)]
#[command(name = "heating-bridge", version, about)]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "HEATING_BRIDGE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Use an in-memory GPIO chip, fixed temperatures and a loopback
    /// transport instead of the hardware and the broker.
    #[arg(long)]
    simulate: bool,
}

/// Why the bridge stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Interrupted,
    ConnectionLost,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli).await {
        Ok(Stop::Interrupted) => ExitCode::SUCCESS,
        Ok(Stop::ConnectionLost) => {
            tracing::error!("Lost connection to the MQTT broker");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Heating bridge failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> heating_bridge::Result<Stop> {
    let config = AppConfig::load(&cli.config)?;
    tracing::info!(config = %cli.config.display(), simulate = cli.simulate, "Starting heating bridge");

    let edges = EdgeBus::new();

    if cli.simulate {
        let chip = SimulatedChip::new(edges.clone());
        let temperatures = SimulatedTemperatures::new();
        for sensor in &config.temperature_sensors {
            temperatures.set(sensor.id.clone(), SIMULATED_CELSIUS);
        }
        let (_alive, lost) = watch::channel(false);
        return serve(LoopbackTransport::new(), &chip, edges, temperatures, &config, lost).await;
    }

    let broker = MqttBrokerBuilder::from_config(&config.mqtt)?.build().await?;
    let chip = hardware_chip(&config.gpio, &edges);
    let temperatures = W1TemperatureSource::new(&config.w1_devices_path);

    let stop = serve(
        broker.clone(),
        chip.as_ref(),
        edges,
        temperatures,
        &config,
        broker.connection_lost(),
    )
    .await;

    if let Err(e) = broker.disconnect().await {
        tracing::warn!(error = %e, "Failed to disconnect from the MQTT broker");
    }
    stop
}

fn hardware_chip(gpio: &GpioConfig, edges: &EdgeBus) -> Box<dyn LineSource> {
    match gpio.backend {
        #[cfg(feature = "cdev")]
        GpioBackend::Cdev => Box::new(CdevChip::new(
            &gpio.chip,
            gpio.consumer.as_str(),
            edges.clone(),
        )),
        #[cfg(not(feature = "cdev"))]
        GpioBackend::Cdev => {
            tracing::warn!("Built without the cdev feature, falling back to sysfs");
            Box::new(SysfsChip::new(&gpio.sysfs_path, edges.clone()))
        }
        GpioBackend::Sysfs => Box::new(SysfsChip::new(&gpio.sysfs_path, edges.clone())),
    }
}

async fn serve<T: Transport, S: TemperatureSource>(
    transport: T,
    lines: &dyn LineSource,
    edges: EdgeBus,
    temperatures: S,
    config: &AppConfig,
    mut lost: watch::Receiver<bool>,
) -> heating_bridge::Result<Stop> {
    let events = EventBus::new();
    let mut failures = events.failures();
    let failure_count = tokio::spawn(async move {
        let mut count = 0_usize;
        while failures.next().await.is_some() {
            count += 1;
        }
        count
    });

    let bridge =
        HeatingBridge::start(transport, lines, edges, temperatures, events, config).await?;
    tracing::info!("Heating bridge running");

    let stop = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            Stop::Interrupted
        }
        _ = lost.wait_for(|lost| *lost) => Stop::ConnectionLost,
    };

    if let Err(e) = bridge.shutdown().await {
        tracing::warn!(error = %e, "Shutdown did not complete cleanly");
    }
    drop(bridge);
    let failures = failure_count.await.unwrap_or_default();
    tracing::info!(failures, "Runtime failures handled while running");
    Ok(stop)
}
