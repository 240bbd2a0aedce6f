// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Capability descriptions of gateway circuits.
//!
//! Every gateway firmware describes its circuits with a per-family schema:
//! which data keys exist below a circuit address, what kind of value each one
//! holds, which data key carries the setpoint of each operation mode and how
//! vendor mode names translate to the names an application shows.
//!
//! The description is supplied by the caller (usually loaded from a bundled
//! JSON file per firmware) and parsed once into a [`CircuitSchema`]. Anything
//! missing or dangling is reported as a [`SchemaError`] when the circuit is
//! built, never later during a read.
//!
//! # Examples
//!
//! ```
//! use thermogw_lib::CircuitSchema;
//!
//! let schema = CircuitSchema::from_json(r#"{
//!     "refs": [
//!         { "key": "operationMode", "id": "operationMode", "type": "operationMode" },
//!         { "key": "temp", "id": "roomtemperature" },
//!         { "key": "manualRoomSetpoint", "id": "manualRoomSetpoint" }
//!     ],
//!     "mode_to_setpoint": {
//!         "manual": { "type": "manual", "key": "manualRoomSetpoint" },
//!         "clock": { "type": "program" }
//!     },
//!     "ha_states": [
//!         { "ha_name": "auto", "bosch_names": ["clock"] },
//!         { "ha_name": "heat", "bosch_names": ["manual"] }
//!     ],
//!     "defaults": { "min": 5.0, "max": 30.0 }
//! }"#).unwrap();
//!
//! assert_eq!(schema.refs.len(), 3);
//! assert!(schema.binding("manual").unwrap().is_manual());
//! ```

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::error::SchemaError;

/// Logical keys with a fixed meaning across all gateway firmwares.
pub mod keys {
    /// Current measured temperature.
    pub const CURRENT_TEMP: &str = "temp";
    /// Identifier of the active switch program or preset.
    pub const ACTIVE_PROGRAM: &str = "activeSwitchProgram";
    /// List of switch programs known to the circuit.
    pub const SWITCH_PROGRAMS: &str = "switchPrograms";
    /// Circuit status enumeration.
    pub const STATUS: &str = "status";
    /// Live display name (zones).
    pub const NAME: &str = "name";
}

/// Default `strftime` format of gateway timestamps.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Default vendor name of the "off" operation mode.
pub const DEFAULT_OFF_MODE: &str = "off";

/// Device family of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitFamily {
    /// A heating circuit (HC).
    HeatingCircuit,
    /// A domestic-hot-water circuit (DHW).
    DomesticHotWater,
    /// A controller-managed zone with presets and battery reporting.
    Zone,
}

impl CircuitFamily {
    /// Returns `true` for the zone family.
    #[must_use]
    pub const fn is_zone(self) -> bool {
        matches!(self, Self::Zone)
    }
}

impl std::fmt::Display for CircuitFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::HeatingCircuit => "hc",
            Self::DomesticHotWater => "dhw",
            Self::Zone => "zone",
        };
        f.write_str(name)
    }
}

/// Declared kind of the value behind a data key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    /// A plain value record (`value`, `unitOfMeasure`, ...).
    #[default]
    Regular,
    /// An operation-mode record (`value`, `allowedValues`).
    OperationMode,
    /// Any kind this library does not interpret.
    #[serde(other)]
    Other,
}

/// One declared data key of a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataRef {
    /// Logical key used by the resolution engine.
    pub key: String,
    /// Address suffix below the circuit address.
    pub id: String,
    /// Declared value kind.
    #[serde(default, rename = "type")]
    pub kind: ValueKind,
}

/// Where the setpoint of an operation mode lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SetpointBinding {
    /// The mode is governed by a single directly writable value.
    Manual {
        /// Data key holding the setpoint.
        key: String,
        /// Data key to read the effective setpoint from, when it differs.
        #[serde(default)]
        read_key: Option<String>,
    },
    /// The mode follows a switch program.
    Program {
        /// Data key of a temporary override, if the firmware has one.
        #[serde(default)]
        key: Option<String>,
        /// Data key to read the effective setpoint from.
        #[serde(default)]
        read_key: Option<String>,
    },
}

impl SetpointBinding {
    /// Returns `true` when the mode is governed by a single writable value.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual { .. })
    }

    /// Returns the writable setpoint key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Manual { key, .. } => Some(key),
            Self::Program { key, .. } => key.as_deref(),
        }
    }

    /// Returns the key the effective setpoint is read from.
    ///
    /// Falls back to the writable key when no separate read key is declared.
    #[must_use]
    pub fn read_key(&self) -> Option<&str> {
        match self {
            Self::Manual { key, read_key } => read_key.as_deref().or(Some(key)),
            Self::Program { key, read_key } => read_key.as_deref().or(key.as_deref()),
        }
    }
}

/// One entry of the vendor ↔ application mode table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HaState {
    /// Name shown by the application (e.g. `auto`, `heat`).
    pub ha_name: String,
    /// Vendor modes that map to this name, in order of preference.
    pub bosch_names: Vec<String>,
}

/// Numeric defaults substituted when a device omits a bound.
///
/// These come from the firmware description and are never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TemperatureDefaults {
    /// Default minimum temperature.
    pub min: f64,
    /// Default maximum temperature.
    pub max: f64,
}

/// Data keys holding the minimum and maximum accepted setpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimitRefs {
    /// Key whose `minValue` is the minimum.
    pub min_key: String,
    /// Key whose `maxValue` is the maximum.
    pub max_key: String,
}

/// Typed capability description of one circuit family.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CircuitSchema {
    /// Declared data keys, in refresh order.
    pub refs: Vec<DataRef>,
    /// Operation mode → setpoint binding.
    #[serde(default)]
    pub mode_to_setpoint: HashMap<String, SetpointBinding>,
    /// Active program identifier → data key carrying its setpoint.
    #[serde(default)]
    pub program_setpoints: HashMap<String, String>,
    /// Vendor ↔ application mode names.
    #[serde(default)]
    pub ha_states: Vec<HaState>,
    /// Vendor name of the "off" mode.
    #[serde(default = "default_off_mode")]
    pub off_mode: String,
    /// Family numeric defaults.
    pub defaults: TemperatureDefaults,
    /// Keys skipped during a refresh pass.
    #[serde(default)]
    pub omit_updates: Vec<String>,
    /// Keys bounding accepted setpoints.
    #[serde(default)]
    pub limits: Option<LimitRefs>,
    /// Key whose value encodes the HVAC action (zones).
    #[serde(default)]
    pub hvac_action: Option<String>,
    /// Address template of a switch program; `{circuit}` and `{program}`
    /// are substituted.
    #[serde(default)]
    pub switch_program: Option<String>,
    /// Gateway address of the current date.
    #[serde(default)]
    pub date_address: Option<String>,
    /// `strftime` format of gateway timestamps.
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

fn default_off_mode() -> String {
    DEFAULT_OFF_MODE.to_string()
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

impl CircuitSchema {
    /// Parses and validates a capability description from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Malformed`] if the JSON does not match the
    /// description format, or any validation error from [`Self::validate`].
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: Self =
            serde_json::from_str(json).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Parses and validates a capability description from a JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_json`].
    pub fn from_value(value: serde_json::Value) -> Result<Self, SchemaError> {
        let schema: Self =
            serde_json::from_value(value).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Checks that every table only refers to declared data keys.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.refs.is_empty() {
            return Err(SchemaError::NoDataKeys);
        }

        let mut declared = HashSet::with_capacity(self.refs.len());
        for data_ref in &self.refs {
            if !declared.insert(data_ref.key.as_str()) {
                return Err(SchemaError::DuplicateKey(data_ref.key.clone()));
            }
        }

        let check = |table: &'static str, key: &str| {
            if declared.contains(key) {
                Ok(())
            } else {
                Err(SchemaError::UndeclaredKey {
                    table,
                    key: key.to_string(),
                })
            }
        };

        for binding in self.mode_to_setpoint.values() {
            if let Some(key) = binding.key() {
                check("mode_to_setpoint", key)?;
            }
            if let Some(key) = binding.read_key() {
                check("mode_to_setpoint", key)?;
            }
        }
        for key in self.program_setpoints.values() {
            check("program_setpoints", key)?;
        }
        for key in &self.omit_updates {
            check("omit_updates", key)?;
        }
        if let Some(limits) = &self.limits {
            check("limits", &limits.min_key)?;
            check("limits", &limits.max_key)?;
        }
        if let Some(key) = &self.hvac_action {
            check("hvac_action", key)?;
        }

        if self.defaults.min > self.defaults.max {
            return Err(SchemaError::InvalidDefaults {
                min: self.defaults.min,
                max: self.defaults.max,
            });
        }

        Ok(())
    }

    /// Returns the setpoint binding of a mode.
    #[must_use]
    pub fn binding(&self, mode: &str) -> Option<&SetpointBinding> {
        self.mode_to_setpoint.get(mode)
    }

    /// Returns `true` if the key is skipped during a refresh pass.
    #[must_use]
    pub fn is_omitted(&self, key: &str) -> bool {
        self.omit_updates.iter().any(|k| k == key)
    }

    /// Returns `true` if the description declares the key.
    #[must_use]
    pub fn declares(&self, key: &str) -> bool {
        self.refs.iter().any(|r| r.key == key)
    }
}
