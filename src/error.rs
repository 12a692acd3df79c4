// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the heating bridge.
//!
//! The top-level [`Error`] wraps one focused enum per failure origin:
//! configuration, transport, GPIO hardware, temperature sensors and the
//! edge-event subscription registry.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Static configuration is malformed or inconsistent.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Publishing, subscribing or unsubscribing failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A GPIO line could not be requested, read or written.
    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),

    /// A temperature sensor could not be read.
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// The edge-event subscription registry rejected an operation.
    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    /// An operation referenced a pump, button or sensor that is not configured.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// The controller was already closed.
    #[error("controller already closed")]
    AlreadyClosed,

    /// A background task of a controller panicked or was aborted.
    #[error("{controller} task failed: {message}")]
    TaskFailed {
        /// The controller that owned the task.
        controller: String,
        /// The join error.
        message: String,
    },
}

/// Errors related to static configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected schema.
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    /// Two entities of the same kind share an identifier.
    #[error("duplicate {kind} id: {id}")]
    DuplicateId {
        /// Entity kind (pump, button, temperature sensor).
        kind: &'static str,
        /// The colliding identifier.
        id: String,
    },

    /// Two lines are configured on the same GPIO pin.
    #[error("GPIO pin {0} is configured more than once")]
    DuplicatePin(u32),

    /// A field has a value the bridge cannot work with.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        message: String,
    },
}

/// Errors related to the pub/sub transport.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed or was lost.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A publish, subscribe or unsubscribe was not acknowledged in time.
    #[error("{operation} on {topic} timed out after {after_ms} ms")]
    Timeout {
        /// The transport operation (publish, subscribe, unsubscribe).
        operation: &'static str,
        /// The topic involved.
        topic: String,
        /// The bound that was exceeded.
        after_ms: u64,
    },

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// A discovery payload could not be serialized.
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors related to GPIO lines.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// The line could not be requested from the chip.
    #[error("failed to request GPIO line {pin}: {message}")]
    RequestFailed {
        /// GPIO pin offset.
        pin: u32,
        /// Description of the failure.
        message: String,
    },

    /// Reading or writing the line failed.
    #[error("GPIO line {pin} I/O failed: {source}")]
    Io {
        /// GPIO pin offset.
        pin: u32,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The line returned something other than 0 or 1.
    #[error("GPIO line {pin} returned invalid value {value:?}")]
    InvalidValue {
        /// GPIO pin offset.
        pin: u32,
        /// The raw value read.
        value: String,
    },

    /// The line was already released.
    #[error("GPIO line {0} is closed")]
    Closed(u32),

    /// No pump with this identifier is configured.
    #[error("pump {0} does not exist")]
    UnknownPump(u32),
}

/// Errors related to temperature sensors.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The sensor file could not be read.
    #[error("failed to read sensor {id} at {path}: {source}")]
    Io {
        /// Sensor identifier.
        id: String,
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The sensor reported a bad CRC.
    #[error("CRC check failed for sensor {0}")]
    CrcMismatch(String),

    /// The sensor output did not contain a temperature.
    #[error("temperature value missing for sensor {0}")]
    MissingValue(String),

    /// The temperature value could not be parsed.
    #[error("failed to parse temperature {raw:?} for sensor {id}")]
    InvalidValue {
        /// Sensor identifier.
        id: String,
        /// The raw text.
        raw: String,
    },

    /// No sensor with this identifier is known to the source.
    #[error("unknown sensor {0}")]
    UnknownSensor(String),
}

/// Errors related to the edge-event subscription registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// A subscription with the derived id already exists.
    #[error("observer with id {0} already exists")]
    DuplicateSubscription(String),

    /// No subscription with this id exists.
    #[error("observer with id {0} does not exist")]
    NotFound(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
