// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operation mode tracking and classification.
//!
//! The resolver learns the current and allowed modes from the first
//! operation-mode record fetched for a circuit. From then on it answers two
//! questions for the rest of the engine: is the circuit off, manual or
//! following a program, and which data key carries the setpoint of the
//! current mode.
//!
//! Mode writes are optimistic. The gateway does not echo the new mode, so
//! `current` is updated locally right after the write is acknowledged; the
//! next refresh pass reconciles it with what the device reports.

use std::collections::HashMap;

use serde_json::Value;

use crate::capabilities::SetpointBinding;
use crate::circuit::data_cache::VALUE;
use crate::protocol::{Payload, Transport};

/// Field listing the modes a device accepts.
pub const ALLOWED_VALUES: &str = "allowedValues";

/// Coarse classification of the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// The circuit is switched off.
    Off,
    /// A single directly writable setpoint governs the circuit.
    Manual,
    /// A switch program governs the circuit.
    Auto,
}

/// Result of a mode write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeChange {
    /// The mode was written and is now current.
    Changed(String),
    /// The requested mode was already current; nothing was written.
    Unchanged,
    /// The device does not offer the requested mode; nothing was written.
    Rejected,
    /// The gateway did not acknowledge the write; the mode is unchanged.
    WriteFailed,
}

impl ModeChange {
    /// Returns `true` if the mode actually changed.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

/// Tracks the operation mode of one circuit.
#[derive(Debug, Clone)]
pub struct OperationModeResolver {
    circuit: String,
    current: Option<String>,
    available: Vec<String>,
    address: Option<String>,
    bindings: HashMap<String, SetpointBinding>,
    off_mode: String,
}

impl OperationModeResolver {
    /// Creates an uninitialized resolver.
    ///
    /// # Arguments
    ///
    /// * `circuit` - Circuit id, used for logging
    /// * `bindings` - Mode → setpoint binding table
    /// * `off_mode` - Vendor name of the "off" mode
    #[must_use]
    pub fn new(
        circuit: impl Into<String>,
        bindings: HashMap<String, SetpointBinding>,
        off_mode: impl Into<String>,
    ) -> Self {
        Self {
            circuit: circuit.into(),
            current: None,
            available: Vec::new(),
            address: None,
            bindings,
            off_mode: off_mode.into(),
        }
    }

    /// Returns `true` once an operation-mode record has been accepted.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.address.is_some()
    }

    /// Initializes the resolver from an operation-mode record.
    ///
    /// The record must carry a string `value` and an `allowedValues` list;
    /// otherwise the resolver stays uninitialized and the next refresh pass
    /// tries again. Returns whether initialization succeeded.
    pub fn initialize(&mut self, payload: &Payload, address: &str) -> bool {
        let Some(available) = allowed_values(payload) else {
            tracing::debug!(circuit = %self.circuit, "Operation mode record lacks allowedValues");
            return false;
        };
        let Some(current) = payload.get(VALUE).and_then(Value::as_str) else {
            tracing::debug!(circuit = %self.circuit, "Operation mode record lacks a value");
            return false;
        };
        if current != self.off_mode && !available.iter().any(|m| m == current) {
            tracing::warn!(
                circuit = %self.circuit,
                mode = %current,
                "Device reports a mode outside its allowed values"
            );
            return false;
        }

        self.available = available;
        self.current = Some(current.to_string());
        self.address = Some(address.to_string());
        tracing::debug!(
            circuit = %self.circuit,
            mode = %current,
            available = ?self.available,
            "Operation mode initialized"
        );
        true
    }

    /// Updates the resolver from a freshly fetched operation-mode record.
    ///
    /// Initializes on first use; afterwards only `current` (and the allowed
    /// list, when the record carries one) move.
    pub fn apply(&mut self, payload: &Payload, address: &str) {
        if !self.is_initialized() {
            self.initialize(payload, address);
            return;
        }

        if let Some(available) = allowed_values(payload) {
            self.available = available;
        }
        match payload.get(VALUE).and_then(Value::as_str) {
            Some(mode) if self.is_valid(mode) => {
                if self.current.as_deref() != Some(mode) {
                    tracing::debug!(circuit = %self.circuit, mode = %mode, "Operation mode changed on device");
                }
                self.current = Some(mode.to_string());
            }
            Some(mode) => tracing::warn!(
                circuit = %self.circuit,
                mode = %mode,
                "Ignoring mode outside allowed values"
            ),
            None => tracing::debug!(circuit = %self.circuit, "Operation mode record lacks a value"),
        }
    }

    fn is_valid(&self, mode: &str) -> bool {
        mode == self.off_mode || self.available.iter().any(|m| m == mode)
    }

    /// Returns the last known mode.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Returns the modes the device accepts.
    #[must_use]
    pub fn available(&self) -> &[String] {
        &self.available
    }

    /// Returns the address modes are written to.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Returns the vendor name of the "off" mode.
    #[must_use]
    pub fn off_mode(&self) -> &str {
        &self.off_mode
    }

    /// Writes a new mode to the device.
    ///
    /// Exactly one write is issued when `new_mode` is allowed and differs
    /// from the current mode; `current` then moves to `new_mode` without
    /// re-reading the device.
    pub async fn set_mode<T: Transport>(&mut self, transport: &T, new_mode: &str) -> ModeChange {
        if self.current.as_deref() == Some(new_mode) {
            tracing::warn!(circuit = %self.circuit, mode = %new_mode, "Mode already set");
            return ModeChange::Unchanged;
        }
        let address = match &self.address {
            Some(address) if self.available.iter().any(|m| m == new_mode) => address.clone(),
            _ => {
                tracing::warn!(
                    circuit = %self.circuit,
                    mode = %new_mode,
                    available = ?self.available,
                    "Mode is not allowed"
                );
                return ModeChange::Rejected;
            }
        };

        if let Err(err) = transport.put(&address, Value::from(new_mode)).await {
            tracing::warn!(circuit = %self.circuit, mode = %new_mode, error = %err, "Mode write failed");
            return ModeChange::WriteFailed;
        }

        tracing::info!(circuit = %self.circuit, mode = %new_mode, "Operation mode set");
        self.current = Some(new_mode.to_string());
        ModeChange::Changed(new_mode.to_string())
    }

    /// Classifies the current mode.
    ///
    /// An unknown mode, or one without a manual binding, counts as
    /// program-governed.
    #[must_use]
    pub fn classify(&self) -> OperationClass {
        match self.current.as_deref() {
            Some(mode) if mode == self.off_mode => OperationClass::Off,
            Some(mode) if self.bindings.get(mode).is_some_and(SetpointBinding::is_manual) => {
                OperationClass::Manual
            }
            _ => OperationClass::Auto,
        }
    }

    /// Returns `true` if the circuit is off.
    #[must_use]
    pub fn is_off(&self) -> bool {
        self.classify() == OperationClass::Off
    }

    /// Returns `true` if the circuit runs on a manual setpoint.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.classify() == OperationClass::Manual
    }

    /// Returns `true` if the circuit follows a program.
    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.classify() == OperationClass::Auto
    }

    /// Returns the binding of a mode.
    #[must_use]
    pub fn binding(&self, mode: &str) -> Option<&SetpointBinding> {
        self.bindings.get(mode)
    }

    /// Returns the writable setpoint key of the current mode.
    #[must_use]
    pub fn setpoint_key(&self) -> Option<&str> {
        self.current
            .as_deref()
            .and_then(|mode| self.bindings.get(mode))
            .and_then(SetpointBinding::key)
    }

    /// Returns the key the current mode's effective setpoint is read from.
    #[must_use]
    pub fn read_setpoint_key(&self) -> Option<&str> {
        self.current
            .as_deref()
            .and_then(|mode| self.bindings.get(mode))
            .and_then(SetpointBinding::read_key)
    }

    /// Returns the first candidate the device accepts.
    #[must_use]
    pub fn find_in_available<'a>(&self, candidates: &'a [String]) -> Option<&'a str> {
        candidates
            .iter()
            .find(|c| self.available.iter().any(|m| m == *c))
            .map(String::as_str)
    }
}

fn allowed_values(payload: &Payload) -> Option<Vec<String>> {
    payload.get(ALLOWED_VALUES)?.as_array().map(|values| {
        values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, mode_payload};
    use serde_json::json;

    const ADDRESS: &str = "/heatingCircuits/hc1/operationMode";

    fn resolver() -> OperationModeResolver {
        let bindings = HashMap::from([
            (
                "manual".to_string(),
                SetpointBinding::Manual {
                    key: "manualRoomSetpoint".to_string(),
                    read_key: None,
                },
            ),
            (
                "clock".to_string(),
                SetpointBinding::Program {
                    key: Some("temporaryRoomSetpoint".to_string()),
                    read_key: None,
                },
            ),
        ]);
        OperationModeResolver::new("hc1", bindings, "off")
    }

    fn initialized(current: &str) -> OperationModeResolver {
        let mut op = resolver();
        assert!(op.initialize(&mode_payload(current, &["clock", "manual"]), ADDRESS));
        op
    }

    #[test]
    fn stays_uninitialized_without_allowed_values() {
        let mut op = resolver();
        let payload = json!({ "value": "clock" }).as_object().cloned().unwrap();
        assert!(!op.initialize(&payload, ADDRESS));
        assert!(!op.is_initialized());
        assert_eq!(op.current(), None);
    }

    #[test]
    fn rejects_initial_mode_outside_allowed_values() {
        let mut op = resolver();
        assert!(!op.initialize(&mode_payload("eco", &["clock", "manual"]), ADDRESS));
        assert!(!op.is_initialized());
    }

    #[test]
    fn off_sentinel_is_valid_even_if_not_listed() {
        let mut op = resolver();
        assert!(op.initialize(&mode_payload("off", &["clock", "manual"]), ADDRESS));
        assert_eq!(op.classify(), OperationClass::Off);
    }

    #[test]
    fn apply_initializes_then_updates() {
        let mut op = resolver();
        op.apply(&mode_payload("clock", &["clock", "manual"]), ADDRESS);
        assert_eq!(op.current(), Some("clock"));

        let update = json!({ "value": "manual" }).as_object().cloned().unwrap();
        op.apply(&update, ADDRESS);
        assert_eq!(op.current(), Some("manual"));
        assert_eq!(op.available(), ["clock", "manual"]);
    }

    #[test]
    fn apply_ignores_unknown_mode() {
        let mut op = initialized("clock");
        let update = json!({ "value": "holiday" }).as_object().cloned().unwrap();
        op.apply(&update, ADDRESS);
        assert_eq!(op.current(), Some("clock"));
    }

    #[test]
    fn classify_follows_bindings() {
        assert_eq!(initialized("manual").classify(), OperationClass::Manual);
        assert_eq!(initialized("clock").classify(), OperationClass::Auto);
        assert_eq!(resolver().classify(), OperationClass::Auto);
    }

    #[test]
    fn setpoint_key_tracks_current_mode() {
        assert_eq!(resolver().setpoint_key(), None);
        assert_eq!(
            initialized("manual").setpoint_key(),
            Some("manualRoomSetpoint")
        );
        assert_eq!(
            initialized("clock").setpoint_key(),
            Some("temporaryRoomSetpoint")
        );
    }

    #[test]
    fn find_in_available_takes_first_match() {
        let op = initialized("clock");
        let candidates = vec!["eco".to_string(), "manual".to_string(), "clock".to_string()];
        assert_eq!(op.find_in_available(&candidates), Some("manual"));
        assert_eq!(op.find_in_available(&["eco".to_string()]), None);
    }

    #[tokio::test]
    async fn set_same_mode_is_unchanged_without_write() {
        let transport = MockTransport::new();
        let mut op = initialized("clock");
        assert_eq!(op.set_mode(&transport, "clock").await, ModeChange::Unchanged);
        assert!(transport.puts().is_empty());
    }

    #[tokio::test]
    async fn set_unavailable_mode_is_rejected_without_write() {
        let transport = MockTransport::new();
        let mut op = initialized("clock");
        assert_eq!(op.set_mode(&transport, "eco").await, ModeChange::Rejected);
        assert!(transport.puts().is_empty());
        assert_eq!(op.current(), Some("clock"));
    }

    #[tokio::test]
    async fn set_available_mode_writes_once() {
        let transport = MockTransport::new();
        let mut op = initialized("clock");
        let change = op.set_mode(&transport, "manual").await;
        assert_eq!(change, ModeChange::Changed("manual".to_string()));
        assert_eq!(transport.puts(), vec![(ADDRESS.to_string(), json!("manual"))]);
        assert_eq!(op.current(), Some("manual"));
    }

    #[tokio::test]
    async fn failed_write_keeps_current_mode() {
        let transport = MockTransport::new().failing_puts();
        let mut op = initialized("clock");
        assert_eq!(op.set_mode(&transport, "manual").await, ModeChange::WriteFailed);
        assert_eq!(op.current(), Some("clock"));
    }

    #[tokio::test]
    async fn uninitialized_resolver_rejects_writes() {
        let transport = MockTransport::new();
        let mut op = resolver();
        assert_eq!(op.set_mode(&transport, "manual").await, ModeChange::Rejected);
        assert!(transport.puts().is_empty());
    }
}
