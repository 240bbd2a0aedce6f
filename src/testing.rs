// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory gateway used by unit tests.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::capabilities::CircuitSchema;
use crate::error::ProtocolError;
use crate::protocol::{Payload, Transport};

/// Scripted transport: answers `get` from a path table and records traffic.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, Payload>>,
    gets: Mutex<Vec<String>>,
    puts: Mutex<Vec<(String, Value)>>,
    fail_puts: bool,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serves `body` for `path`. Unrouted paths fail like an unreachable resource.
    pub(crate) fn with(self, path: &str, body: Value) -> Self {
        self.route(path, body);
        self
    }

    pub(crate) fn failing_puts(mut self) -> Self {
        self.fail_puts = true;
        self
    }

    pub(crate) fn route(&self, path: &str, body: Value) {
        let Value::Object(map) = body else {
            panic!("mock bodies must be JSON objects");
        };
        self.routes.lock().insert(path.to_string(), map);
    }

    pub(crate) fn unroute(&self, path: &str) {
        self.routes.lock().remove(path);
    }

    pub(crate) fn gets(&self) -> Vec<String> {
        self.gets.lock().clone()
    }

    pub(crate) fn puts(&self) -> Vec<(String, Value)> {
        self.puts.lock().clone()
    }
}

impl Transport for MockTransport {
    async fn get(&self, path: &str) -> Result<Payload, ProtocolError> {
        self.gets.lock().push(path.to_string());
        self.routes
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| ProtocolError::ConnectionFailed(format!("HTTP 404 - {path}")))
    }

    async fn put(&self, path: &str, value: Value) -> Result<(), ProtocolError> {
        if self.fail_puts {
            return Err(ProtocolError::Timeout(10_000));
        }
        self.puts.lock().push((path.to_string(), value));
        Ok(())
    }
}

/// Operation-mode record as sent by the gateway.
pub(crate) fn mode_payload(value: &str, allowed: &[&str]) -> Payload {
    let body = json!({
        "id": "/heatingCircuits/hc1/operationMode",
        "type": "stringValue",
        "value": value,
        "allowedValues": allowed,
    });
    match body {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Capability description of a schedule-capable heating circuit.
pub(crate) fn hc_schema() -> CircuitSchema {
    CircuitSchema::from_value(json!({
        "refs": [
            { "key": "operationMode", "id": "operationMode", "type": "operationMode" },
            { "key": "temp", "id": "roomtemperature" },
            { "key": "manualRoomSetpoint", "id": "manualRoomSetpoint" },
            { "key": "temporaryRoomSetpoint", "id": "temporaryRoomSetpoint" },
            { "key": "comfortSetpoint", "id": "comfortSetpoint" },
            { "key": "switchPrograms", "id": "switchPrograms", "type": "switchProgram" },
            { "key": "activeSwitchProgram", "id": "activeSwitchProgram" },
            { "key": "status", "id": "status" }
        ],
        "mode_to_setpoint": {
            "manual": { "type": "manual", "key": "manualRoomSetpoint" },
            "clock": { "type": "program", "key": "temporaryRoomSetpoint" }
        },
        "program_setpoints": { "A": "comfortSetpoint" },
        "ha_states": [
            { "ha_name": "auto", "bosch_names": ["clock"] },
            { "ha_name": "heat", "bosch_names": ["manual"] }
        ],
        "defaults": { "min": 5.0, "max": 30.0 },
        "switch_program": "/heatingCircuits/{circuit}/switchPrograms/{program}"
    }))
    .expect("valid heating circuit schema")
}

/// Capability description of a controller zone.
pub(crate) fn zone_schema() -> CircuitSchema {
    CircuitSchema::from_value(json!({
        "refs": [
            { "key": "operationMode", "id": "userMode", "type": "operationMode" },
            { "key": "temp", "id": "actualTemp" },
            { "key": "name", "id": "name" },
            { "key": "status", "id": "status" },
            { "key": "manualTemperatureHeating", "id": "manualTemperatureHeating" },
            { "key": "currentRoomSetpoint", "id": "currentRoomSetpoint" },
            { "key": "activeSwitchProgram", "id": "activeSwitchProgram" }
        ],
        "mode_to_setpoint": {
            "manual": {
                "type": "manual",
                "key": "manualTemperatureHeating",
                "read_key": "currentRoomSetpoint"
            },
            "clock": { "type": "program", "read_key": "currentRoomSetpoint" }
        },
        "ha_states": [
            { "ha_name": "auto", "bosch_names": ["clock"] },
            { "ha_name": "heat", "bosch_names": ["manual"] },
            { "ha_name": "off", "bosch_names": ["off"] }
        ],
        "defaults": { "min": 5.0, "max": 30.0 },
        "omit_updates": ["name"],
        "hvac_action": "status"
    }))
    .expect("valid zone schema")
}
