// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heating and domestic-hot-water circuits.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde_json::Value;

use crate::capabilities::{CircuitFamily, CircuitSchema, keys};
use crate::circuit::schedule::{ScheduleEngine, ScheduleTarget, ScheduleValue};
use crate::circuit::{CircuitCore, HA_OFF, RefreshReport, TemperatureBound, Thermostat};
use crate::error::{Result, SchemaError, ValueError};
use crate::protocol::Transport;

/// A schedule-capable circuit.
#[derive(Debug)]
pub struct GenericCircuit<T: Transport> {
    core: CircuitCore<T>,
    schedule: ScheduleEngine,
}

/// Where a temperature write goes.
enum WriteTarget {
    Key(String),
    Level(String),
}

impl<T: Transport> GenericCircuit<T> {
    /// Creates a heating or domestic-hot-water circuit.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the description is invalid or `family` is
    /// the zone family.
    pub fn new(
        transport: Arc<T>,
        address: &str,
        family: CircuitFamily,
        schema: Arc<CircuitSchema>,
    ) -> std::result::Result<Self, SchemaError> {
        if family.is_zone() {
            return Err(SchemaError::Malformed(
                "zones are not schedule-driven circuits".to_string(),
            ));
        }
        let core = CircuitCore::new(transport, address, family, schema)?;
        let schema = core.schema();
        let schedule = ScheduleEngine::new(
            core.id(),
            schema.switch_program.clone(),
            schema.date_format.clone(),
        );
        Ok(Self { core, schedule })
    }

    /// Returns the data key of the active program's setpoint.
    #[must_use]
    pub fn active_program_setpoint(&self) -> Option<&str> {
        let program = self.schedule.active_program()?;
        self.core
            .schema()
            .program_setpoints
            .get(program)
            .map(String::as_str)
    }

    fn active_program_bound(&self, bound: TemperatureBound) -> f64 {
        self.core.bound_of(self.active_program_setpoint(), bound)
    }

    fn scheduled(&self) -> Option<ScheduleValue<'_>> {
        let op = self.core.op_mode();
        self.schedule.temperature_for_current_mode(
            op.current().unwrap_or_default(),
            op.classify(),
            self.schedule.now(),
        )
    }

    fn bound(&self, bound: TemperatureBound) -> f64 {
        let op = self.core.op_mode();
        if op.is_off() {
            return self.core.default_bound(bound);
        }
        if let Some(limit) = self.core.limit(bound) {
            return limit;
        }
        if let Some(value) = op
            .setpoint_key()
            .and_then(|key| self.core.cache().field_number(key, bound.field()))
        {
            return value;
        }
        match self.scheduled() {
            Some(ScheduleValue::Level(level)) => {
                let field = match bound {
                    TemperatureBound::Value => level.value,
                    TemperatureBound::Min => level.min,
                    TemperatureBound::Max => level.max,
                };
                field.unwrap_or_else(|| self.core.default_bound(bound))
            }
            Some(ScheduleValue::ActiveProgram) => self.active_program_bound(bound),
            None => self.core.default_bound(bound),
        }
    }

    /// Reads the gateway clock, falling back to local time when the date is
    /// unavailable or does not match the configured format.
    async fn gateway_now(&self) -> NaiveDateTime {
        let parsed = self.core.gateway_date().await.and_then(|raw| {
            self.schedule
                .parse_time(&raw)
                .inspect_err(|err| tracing::debug!(circuit = %self.core.id(), error = %err, "Unparsable gateway date"))
                .ok()
        });
        parsed.unwrap_or_else(|| Local::now().naive_local())
    }

    fn write_target(&self) -> Option<WriteTarget> {
        let op = self.core.op_mode();
        if let Some(key) = op.setpoint_key() {
            return Some(WriteTarget::Key(key.to_string()));
        }
        match self.scheduled()? {
            ScheduleValue::Level(level) => Some(WriteTarget::Level(level.name.clone())),
            ScheduleValue::ActiveProgram => self
                .active_program_setpoint()
                .map(|key| WriteTarget::Key(key.to_string())),
        }
    }
}

impl<T: Transport> Thermostat for GenericCircuit<T> {
    type Transport = T;

    fn core(&self) -> &CircuitCore<T> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CircuitCore<T> {
        &mut self.core
    }

    fn target_temperature(&self) -> Option<f64> {
        if self.core.op_mode().is_off() {
            return Some(0.0);
        }
        if let Some(value) = self.core.setpoint_value().filter(|v| *v > 0.0) {
            return Some(value);
        }
        match self.scheduled()? {
            ScheduleValue::Level(level) => level.value.filter(|v| *v >= 0.0),
            ScheduleValue::ActiveProgram => {
                Some(self.active_program_bound(TemperatureBound::Value))
            }
        }
    }

    fn setpoint(&self) -> Option<String> {
        let op = self.core.op_mode();
        if op.is_off() {
            return Some(HA_OFF.to_string());
        }
        let mode = op.current().unwrap_or_default();
        if op.is_manual() {
            return Some(mode.to_string());
        }
        match self
            .schedule
            .setpoint_for_current_mode(mode, op.classify(), self.schedule.now())?
        {
            ScheduleTarget::Level(name) => Some(name),
            ScheduleTarget::ActiveProgram => self.schedule.active_program().map(str::to_string),
        }
    }

    fn schedule(&self) -> Option<&ScheduleEngine> {
        Some(&self.schedule)
    }

    fn min_temp(&self) -> f64 {
        self.bound(TemperatureBound::Min)
    }

    fn max_temp(&self) -> f64 {
        self.bound(TemperatureBound::Max)
    }

    fn support_charge(&self) -> bool {
        true
    }

    async fn initialize(&mut self) {
        self.core.try_update_key(keys::STATUS).await;
    }

    async fn update(&mut self) -> RefreshReport {
        let report = self.core.update().await;

        let cache = self.core.cache();
        let program_list = cache
            .property(keys::SWITCH_PROGRAMS)
            .filter(|record| !record.is_empty());
        let active = cache.text(keys::ACTIVE_PROGRAM);
        let Some(program) =
            ScheduleEngine::resolve_active_program(active.as_deref(), program_list)
        else {
            tracing::debug!(circuit = %self.core.id(), "No active switch program");
            return report;
        };

        let now = self.gateway_now().await;
        self.schedule
            .update(self.core.transport(), &program, now)
            .await;
        report
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
            tracing::debug!(circuit = %self.core.id(), temperature, "Temperature already set");
            return Ok(());
        }

        let mode = self.core.op_mode().current().map(str::to_string);
        let (address, target) = match self.write_target() {
            Some(WriteTarget::Key(key)) => match self.core.cache().address(&key) {
                Some(address) => (address.to_string(), WriteTarget::Key(key)),
                None => return Err(ValueError::NoWritableSetpoint(mode).into()),
            },
            Some(WriteTarget::Level(name)) => match self.schedule.level(&name) {
                Some(level) => (level.address.clone(), WriteTarget::Level(name)),
                None => return Err(ValueError::NoWritableSetpoint(mode).into()),
            },
            None => return Err(ValueError::NoWritableSetpoint(mode).into()),
        };

        self.core
            .transport()
            .put(&address, Value::from(temperature))
            .await?;
        tracing::info!(circuit = %self.core.id(), temperature, address = %address, "Temperature set");

        match target {
            WriteTarget::Key(key) => self.core.cache_mut().set_value(&key, Value::from(temperature)),
            WriteTarget::Level(name) => self.schedule.set_level_value(&name, temperature),
        }
        Ok(())
    }
}
