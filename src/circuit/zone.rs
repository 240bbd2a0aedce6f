// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller zones.
//!
//! Zones have no local schedule. Their effective setpoint is published by the
//! controller under the mode's read-setpoint key, and programs are chosen
//! from a preset list shared by all zones of a controller.

use std::sync::Arc;

use serde_json::Value;

use crate::capabilities::{CircuitFamily, CircuitSchema, keys};
use crate::circuit::{
    CircuitCore, HA_OFF, HvacAction, RefreshReport, ScheduleEngine, TemperatureBound, Thermostat,
    ZoneProgram,
};
use crate::error::{Result, SchemaError, ValueError};
use crate::protocol::{Payload, Transport};

const IDLE: &str = "idle";
const LOW_BATTERY: &str = "low battery";

/// A controller zone.
#[derive(Debug)]
pub struct ZoneCircuit<T: Transport> {
    core: CircuitCore<T>,
    program: Arc<ZoneProgram<T>>,
}

impl<T: Transport> ZoneCircuit<T> {
    /// Creates a zone sharing `program` with its sibling zones.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the description is invalid.
    pub fn new(
        transport: Arc<T>,
        address: &str,
        schema: Arc<CircuitSchema>,
        program: Arc<ZoneProgram<T>>,
    ) -> std::result::Result<Self, SchemaError> {
        let core = CircuitCore::new(transport, address, CircuitFamily::Zone, schema)?;
        Ok(Self { core, program })
    }

    /// Returns the shared program list.
    #[must_use]
    pub fn program(&self) -> &Arc<ZoneProgram<T>> {
        &self.program
    }

    /// Returns `true` if the zone reports a low battery.
    #[must_use]
    pub fn battery_low(&self) -> bool {
        self.core.cache().string(keys::STATUS) == Some(LOW_BATTERY)
    }

    fn bound(&self, bound: TemperatureBound) -> f64 {
        if self.core.op_mode().is_off() {
            return self.core.default_bound(bound);
        }
        self.core.limit(bound).unwrap_or_else(|| {
            self.core
                .bound_of(self.core.op_mode().read_setpoint_key(), bound)
        })
    }
}

impl<T: Transport> Thermostat for ZoneCircuit<T> {
    type Transport = T;

    fn core(&self) -> &CircuitCore<T> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CircuitCore<T> {
        &mut self.core
    }

    fn name(&self) -> &str {
        self.core
            .cache()
            .string(keys::NAME)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.core.id())
    }

    fn target_temperature(&self) -> Option<f64> {
        let op = self.core.op_mode();
        if op.is_off() {
            return Some(0.0);
        }
        op.read_setpoint_key()
            .and_then(|key| self.core.cache().number(key))
            .filter(|v| *v > 0.0)
    }

    fn setpoint(&self) -> Option<String> {
        let op = self.core.op_mode();
        if op.is_off() {
            return Some(HA_OFF.to_string());
        }
        if op.is_manual() {
            return op.current().map(str::to_string);
        }
        self.preset_mode()
    }

    fn schedule(&self) -> Option<&ScheduleEngine> {
        None
    }

    fn min_temp(&self) -> f64 {
        self.bound(TemperatureBound::Min)
    }

    fn max_temp(&self) -> f64 {
        self.bound(TemperatureBound::Max)
    }

    fn support_presets(&self) -> bool {
        self.core.op_mode().is_auto() && !self.program.preset_names().is_empty()
    }

    fn preset_modes(&self) -> Vec<String> {
        self.program.preset_names()
    }

    fn preset_mode(&self) -> Option<String> {
        let id = self.core.cache().value(keys::ACTIVE_PROGRAM)?;
        self.program.preset_name(id)
    }

    fn hvac_action(&self) -> Option<HvacAction> {
        let key = self.core.schema().hvac_action.as_deref()?;
        match self.core.cache().string(key)? {
            IDLE => Some(HvacAction::Off),
            LOW_BATTERY => None,
            _ => Some(HvacAction::Heating),
        }
    }

    fn extra_state_attributes(&self) -> Payload {
        let mut attributes = Payload::new();
        attributes.insert("low_battery".to_string(), Value::Bool(self.battery_low()));
        attributes
    }

    async fn initialize(&mut self) {
        self.core.try_update_key(keys::STATUS).await;
        self.core.try_update_key(keys::NAME).await;
    }

    async fn update(&mut self) -> RefreshReport {
        if let Err(err) = self.program.update().await {
            tracing::debug!(zone = %self.core.id(), error = %err, "Failed to refresh zone programs");
        }
        self.core.update().await
    }

    async fn set_temperature(&mut self, temperature: f64) -> Result<()> {
        if self.core.op_mode().is_off() {
            return Err(ValueError::CircuitOff.into());
        }
        let (min, max) = (self.min_temp(), self.max_temp());
        if !(min..=max).contains(&temperature) {
            return Err(ValueError::TemperatureOutOfRange {
                min,
                max,
                actual: temperature,
            }
            .into());
        }
        if self
            .target_temperature()
            .is_some_and(|current| (current - temperature).abs() < f64::EPSILON)
        {
            tracing::debug!(zone = %self.core.id(), temperature, "Temperature already set");
            return Ok(());
        }

        let op = self.core.op_mode();
        let Some((key, address)) = op.setpoint_key().and_then(|key| {
            self.core
                .cache()
                .address(key)
                .map(|address| (key.to_string(), address.to_string()))
        }) else {
            return Err(ValueError::NoWritableSetpoint(op.current().map(str::to_string)).into());
        };
        let read_key = op.read_setpoint_key().map(str::to_string);

        self.core
            .transport()
            .put(&address, Value::from(temperature))
            .await?;
        tracing::info!(zone = %self.core.id(), temperature, "Temperature set");

        let cache = self.core.cache_mut();
        cache.set_value(&key, Value::from(temperature));
        if let Some(read_key) = read_key.filter(|read_key| *read_key != key) {
            cache.set_value(&read_key, Value::from(temperature));
        }
        Ok(())
    }

    async fn set_preset_mode(&mut self, preset: &str) -> Result<()> {
        let id = self
            .program
            .preset_id(preset)
            .ok_or_else(|| ValueError::UnknownPreset(preset.to_string()))?;
        let address = self
            .core
            .cache()
            .address(keys::ACTIVE_PROGRAM)
            .ok_or_else(|| crate::error::Error::UnknownKey(keys::ACTIVE_PROGRAM.to_string()))?
            .to_string();

        self.core.transport().put(&address, id).await?;
        tracing::info!(zone = %self.core.id(), preset = %preset, "Preset selected");
        self.core.try_update_key(keys::ACTIVE_PROGRAM).await;
        Ok(())
    }
}
