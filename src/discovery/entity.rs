// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity identity and the discovery payload built from it.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ConfigError;

use super::{Device, EntityKind, TopicSet};

/// Who an entity is: stable unique id, display name and owning device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityIdentity {
    unique_id: String,
    name: String,
    device: Arc<Device>,
}

impl EntityIdentity {
    /// Stable unique id, e.g. `heating_pump_1`.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning device.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// A discoverable entity: kind, identity and derived topics.
///
/// Built once at controller start and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    kind: EntityKind,
    identity: EntityIdentity,
    topics: TopicSet,
}

/// JSON document published retained on the config topic.
#[derive(Debug, Serialize)]
pub struct DiscoveryPayload<'a> {
    schema: &'static str,
    unique_id: &'a str,
    name: &'a str,
    device: &'a Device,
    state_topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    command_topic: Option<&'a str>,
    availability_topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'static str>,
}

impl Entity {
    /// Derives identity and topics for a configured entity.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use heating_bridge::discovery::{Device, Entity, EntityKind};
    ///
    /// let device = Arc::new(Device::new("rpi-heating", "Heating"));
    /// let pump = Entity::new("homeassistant", EntityKind::Switch, 1, "Pump1", device);
    ///
    /// assert_eq!(pump.unique_id(), "heating_pump_1");
    /// assert_eq!(pump.topics().command(), Some("homeassistant/switch/heating_pump_1/set"));
    /// ```
    #[must_use]
    pub fn new(
        prefix: &str,
        kind: EntityKind,
        configured_id: impl fmt::Display,
        name: impl Into<String>,
        device: Arc<Device>,
    ) -> Self {
        let unique_id = kind.unique_id(configured_id);
        let topics = TopicSet::derive(prefix, kind, &unique_id);
        Self {
            kind,
            identity: EntityIdentity {
                unique_id,
                name: name.into(),
                device,
            },
            topics,
        }
    }

    /// Entity kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Identity.
    #[must_use]
    pub fn identity(&self) -> &EntityIdentity {
        &self.identity
    }

    /// Shortcut for the unique id.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.identity.unique_id
    }

    /// Derived topics.
    #[must_use]
    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// Builds the discovery payload.
    #[must_use]
    pub fn discovery_payload(&self) -> DiscoveryPayload<'_> {
        DiscoveryPayload {
            schema: "json",
            unique_id: &self.identity.unique_id,
            name: &self.identity.name,
            device: &self.identity.device,
            state_topic: self.topics.state(),
            command_topic: self.topics.command(),
            availability_topic: self.topics.availability(),
            unit_of_measurement: self.kind.unit_of_measurement(),
        }
    }

    /// Serializes the discovery payload.
    ///
    /// # Errors
    ///
    /// Returns a serialization error; with the fixed schema this only
    /// happens if the serializer itself fails.
    pub fn discovery_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.discovery_payload())
    }
}

/// Entities of one controller, in configuration order, keyed by their
/// configured identifier.
#[derive(Debug, Clone)]
pub struct EntityTable<K> {
    entries: Vec<(K, Entity)>,
}

impl<K> EntityTable<K>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    /// Builds the table, rejecting colliding identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateId`] if two entries share a key or a
    /// unique id.
    pub fn build(
        kind: &'static str,
        entries: impl IntoIterator<Item = (K, Entity)>,
    ) -> Result<Self, ConfigError> {
        let mut keys = HashSet::new();
        let mut unique_ids = HashSet::new();
        let mut table = Vec::new();

        for (key, entity) in entries {
            if !keys.insert(key.clone()) {
                return Err(ConfigError::DuplicateId {
                    kind,
                    id: key.to_string(),
                });
            }
            if !unique_ids.insert(entity.unique_id().to_string()) {
                return Err(ConfigError::DuplicateId {
                    kind,
                    id: entity.unique_id().to_string(),
                });
            }
            table.push((key, entity));
        }
        Ok(Self { entries: table })
    }

    /// Looks up an entity by its configured identifier.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&Entity> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, entity)| entity)
    }

    /// Iterates in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Entity)> {
        self.entries.iter().map(|(k, entity)| (k, entity))
    }

    /// Iterates over the entities only.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entries.iter().map(|(_, entity)| entity)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
