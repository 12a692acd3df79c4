// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic naming for Home Assistant MQTT discovery.
//!
//! ```text
//! <prefix>/switch/heating_pump_<id>/{config,state,status,set}
//! <prefix>/binary_sensor/button_<id>/{config,state,availability}
//! <prefix>/sensor/temp_<id>/{config,state,status}
//! ```

use std::fmt;

/// Default discovery prefix Home Assistant listens on.
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// The entity families the bridge exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A heating pump relay.
    Switch,
    /// A push button.
    BinarySensor,
    /// A 1-Wire temperature probe.
    TemperatureSensor,
}

impl EntityKind {
    /// Home Assistant component name used in topics.
    #[must_use]
    pub const fn component(&self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::BinarySensor => "binary_sensor",
            Self::TemperatureSensor => "sensor",
        }
    }

    /// Prefix of the unique id.
    #[must_use]
    pub const fn uid_prefix(&self) -> &'static str {
        match self {
            Self::Switch => "heating_pump",
            Self::BinarySensor => "button",
            Self::TemperatureSensor => "temp",
        }
    }

    /// Last topic level of the availability topic.
    #[must_use]
    pub const fn availability_suffix(&self) -> &'static str {
        match self {
            Self::Switch | Self::TemperatureSensor => "status",
            Self::BinarySensor => "availability",
        }
    }

    /// Whether Home Assistant can send commands to this kind.
    #[must_use]
    pub const fn accepts_commands(&self) -> bool {
        matches!(self, Self::Switch)
    }

    /// Unit of measurement advertised in the discovery payload.
    #[must_use]
    pub const fn unit_of_measurement(&self) -> Option<&'static str> {
        match self {
            Self::TemperatureSensor => Some("°C"),
            Self::Switch | Self::BinarySensor => None,
        }
    }

    /// Derives the stable unique id for a configured identifier.
    #[must_use]
    pub fn unique_id(&self, configured_id: impl fmt::Display) -> String {
        format!("{}_{configured_id}", self.uid_prefix())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.component())
    }
}

/// Every topic an entity publishes or listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicSet {
    config: String,
    state: String,
    availability: String,
    command: Option<String>,
}

impl TopicSet {
    /// Derives the topics of entity `uid` of `kind` under `prefix`.
    #[must_use]
    pub fn derive(prefix: &str, kind: EntityKind, uid: &str) -> Self {
        let base = format!("{prefix}/{}/{uid}", kind.component());
        Self {
            config: format!("{base}/config"),
            state: format!("{base}/state"),
            availability: format!("{base}/{}", kind.availability_suffix()),
            command: kind.accepts_commands().then(|| format!("{base}/set")),
        }
    }

    /// Retained discovery configuration topic.
    #[must_use]
    pub fn config(&self) -> &str {
        &self.config
    }

    /// State topic.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Availability topic.
    #[must_use]
    pub fn availability(&self) -> &str {
        &self.availability
    }

    /// Command topic, switches only.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_topics() {
        let topics = TopicSet::derive("homeassistant", EntityKind::Switch, "heating_pump_1");
        assert_eq!(topics.config(), "homeassistant/switch/heating_pump_1/config");
        assert_eq!(topics.state(), "homeassistant/switch/heating_pump_1/state");
        assert_eq!(topics.availability(), "homeassistant/switch/heating_pump_1/status");
        assert_eq!(topics.command(), Some("homeassistant/switch/heating_pump_1/set"));
    }

    #[test]
    fn binary_sensor_topics() {
        let topics = TopicSet::derive("homeassistant", EntityKind::BinarySensor, "button_2");
        assert_eq!(topics.config(), "homeassistant/binary_sensor/button_2/config");
        assert_eq!(topics.state(), "homeassistant/binary_sensor/button_2/state");
        assert_eq!(
            topics.availability(),
            "homeassistant/binary_sensor/button_2/availability"
        );
        assert_eq!(topics.command(), None);
    }

    #[test]
    fn temperature_sensor_topics() {
        let topics = TopicSet::derive("ha", EntityKind::TemperatureSensor, "temp_28-01");
        assert_eq!(topics.config(), "ha/sensor/temp_28-01/config");
        assert_eq!(topics.state(), "ha/sensor/temp_28-01/state");
        assert_eq!(topics.availability(), "ha/sensor/temp_28-01/status");
        assert_eq!(topics.command(), None);
    }

    #[test]
    fn unique_ids_are_kind_scoped() {
        assert_eq!(EntityKind::Switch.unique_id(1), "heating_pump_1");
        assert_eq!(EntityKind::BinarySensor.unique_id(1), "button_1");
        assert_eq!(EntityKind::TemperatureSensor.unique_id("1"), "temp_1");
    }

    #[test]
    fn distinct_ids_never_share_topics() {
        let kinds = [
            EntityKind::Switch,
            EntityKind::BinarySensor,
            EntityKind::TemperatureSensor,
        ];
        let mut seen = std::collections::HashSet::new();
        for kind in kinds {
            for id in 0..50 {
                let uid = kind.unique_id(id);
                let topics = TopicSet::derive(DEFAULT_DISCOVERY_PREFIX, kind, &uid);
                assert!(seen.insert(uid), "duplicate unique id");
                assert!(seen.insert(topics.state().to_string()), "duplicate state topic");
            }
        }
    }
}
