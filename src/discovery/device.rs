// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Physical device record embedded in every discovery payload.

use serde::{Deserialize, Serialize};

/// The physical unit all entities belong to.
///
/// Home Assistant groups entities by `identifiers`. The record is shared by
/// reference (`Arc<Device>`) across every entity of the unit and is never
/// mutated after startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Identifiers Home Assistant uses to group entities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
    /// Manufacturer shown in the device registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Model shown in the device registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Device name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Software version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    /// Area suggested when the device is first added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_area: Option<String>,
}

impl Device {
    /// Creates a device with a single identifier and a name.
    #[must_use]
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifiers: vec![identifier.into()],
            name: Some(name.into()),
            ..Self::default()
        }
    }
}
