// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Circuits and their resolution engine.
//!
//! A circuit is a heating circuit, a domestic-hot-water circuit or a
//! controller zone. Every family shares the same building blocks:
//!
//! - [`DataCache`]: declared data keys and their last fetched records
//! - [`OperationModeResolver`]: current and allowed operation modes
//! - [`ScheduleEngine`]: switch-program windows (generic circuits only)
//!
//! [`CircuitCore`] orchestrates fetching and caching. The family variants
//! [`GenericCircuit`] and [`ZoneCircuit`] add their own resolution policy and
//! are unified behind the [`Thermostat`] trait and the [`Circuit`] enum.
//!
//! # Target temperature
//!
//! Every read resolves the target temperature afresh from the cache:
//!
//! 1. An off circuit reads `0`.
//! 2. A positive value cached under the current mode's setpoint key wins.
//! 3. Otherwise the schedule decides, either with a literal level or by
//!    delegating to the active program's setpoint.
//!
//! Zones read the current mode's read-setpoint key only.

mod base;
pub mod data_cache;
mod generic;
pub mod operation_mode;
pub mod schedule;
mod zone;
mod zone_program;

use std::sync::Arc;

use serde_json::Value;

pub use base::CircuitCore;
pub use data_cache::{DataCache, DataPoint, RefreshReport};
pub use generic::GenericCircuit;
pub use operation_mode::{ModeChange, OperationClass, OperationModeResolver};
pub use schedule::{ScheduleEngine, ScheduleTarget, ScheduleValue, SetpointLevel, SwitchPoint};
pub use zone::ZoneCircuit;
pub use zone_program::{Preset, ZoneProgram};

use crate::capabilities::{CircuitFamily, CircuitSchema};
use crate::error::{Result, SchemaError};
use crate::protocol::{Payload, Transport};

/// Application-facing name of the "off" mode.
pub const HA_OFF: &str = "off";

/// Which field of a setpoint record a lookup reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureBound {
    /// The setpoint itself.
    Value,
    /// Its lower bound.
    Min,
    /// Its upper bound.
    Max,
}

/// What the heating of a zone is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HvacAction {
    /// Idle.
    Off,
    /// Actively heating.
    Heating,
}

impl std::fmt::Display for HvacAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Heating => "heating",
        })
    }
}

/// Polymorphic contract of every circuit family.
///
/// The resolution methods [`target_temperature`](Self::target_temperature),
/// [`setpoint`](Self::setpoint) and [`schedule`](Self::schedule) have no
/// default; each family states its own policy.
#[allow(async_fn_in_trait)]
pub trait Thermostat {
    /// Transport the circuit talks through.
    type Transport: Transport;

    /// Returns the shared circuit state.
    fn core(&self) -> &CircuitCore<Self::Transport>;

    /// Returns the shared circuit state mutably.
    fn core_mut(&mut self) -> &mut CircuitCore<Self::Transport>;

    /// Returns the stable id.
    fn id(&self) -> &str {
        self.core().id()
    }

    /// Returns the display name.
    fn name(&self) -> &str {
        self.core().id()
    }

    /// Returns the device family.
    fn family(&self) -> CircuitFamily {
        self.core().family()
    }

    /// Returns `true` once a full refresh pass completed.
    fn is_refreshed(&self) -> bool {
        self.core().is_refreshed()
    }

    /// Returns the current temperature.
    fn current_temp(&self) -> Option<f64> {
        self.core().current_temp()
    }

    /// Returns the unit of the current temperature.
    fn temp_units(&self) -> Option<&str> {
        self.core().temp_units()
    }

    /// Returns the current mode in application terms.
    fn ha_mode(&self) -> &str {
        self.core().ha_mode()
    }

    /// Returns every application mode name.
    fn ha_modes(&self) -> Vec<&str> {
        self.core().ha_modes()
    }

    /// Returns the effective target temperature.
    ///
    /// `Some(0.0)` when off, `None` when nothing resolves.
    fn target_temperature(&self) -> Option<f64>;

    /// Returns the name of the setpoint currently in effect.
    fn setpoint(&self) -> Option<String>;

    /// Returns the schedule, for families that follow one.
    fn schedule(&self) -> Option<&ScheduleEngine>;

    /// Returns the lowest settable target temperature.
    fn min_temp(&self) -> f64;

    /// Returns the highest settable target temperature.
    fn max_temp(&self) -> f64;

    /// Returns `true` if the circuit supports a one-off charge.
    fn support_charge(&self) -> bool {
        false
    }

    /// Returns `true` if presets can be selected right now.
    fn support_presets(&self) -> bool {
        false
    }

    /// Returns the selectable preset names.
    fn preset_modes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Returns the active preset.
    fn preset_mode(&self) -> Option<String> {
        None
    }

    /// Returns what the heating is doing, when the family reports it.
    fn hvac_action(&self) -> Option<HvacAction> {
        None
    }

    /// Returns family-specific attributes.
    fn extra_state_attributes(&self) -> Payload {
        Payload::new()
    }

    /// Fetches the keys needed before the first update.
    async fn initialize(&mut self);

    /// Runs one refresh pass.
    async fn update(&mut self) -> RefreshReport;

    /// Writes a new target temperature.
    ///
    /// # Errors
    ///
    /// Returns a value error if the circuit is off, the temperature is out
    /// of range or no setpoint is writable, or the communication error of
    /// the write.
    async fn set_temperature(&mut self, temperature: f64) -> Result<()>;

    /// Switches to an application mode. Returns `true` if the mode changed.
    async fn set_ha_mode(&mut self, ha_mode: &str) -> bool {
        self.core_mut().set_ha_mode(ha_mode).await
    }

    /// Writes a vendor operation mode.
    async fn set_operation_mode(&mut self, mode: &str) -> ModeChange {
        self.core_mut().set_operation_mode(mode).await
    }

    /// Selects a preset.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::UnknownPreset`](crate::error::ValueError::UnknownPreset)
    /// for families without presets.
    async fn set_preset_mode(&mut self, preset: &str) -> Result<()> {
        Err(crate::error::ValueError::UnknownPreset(preset.to_string()).into())
    }
}

/// A circuit of any family.
#[derive(Debug)]
pub enum Circuit<T: Transport> {
    /// Heating or domestic-hot-water circuit.
    Generic(GenericCircuit<T>),
    /// Controller zone.
    Zone(ZoneCircuit<T>),
}

macro_rules! dispatch {
    ($self:expr, $circuit:ident => $body:expr) => {
        match $self {
            Circuit::Generic($circuit) => $body,
            Circuit::Zone($circuit) => $body,
        }
    };
}

impl<T: Transport> Circuit<T> {
    /// Creates a heating or domestic-hot-water circuit.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the description is invalid or `family` is
    /// the zone family.
    pub fn generic(
        transport: Arc<T>,
        address: &str,
        family: CircuitFamily,
        schema: Arc<CircuitSchema>,
    ) -> std::result::Result<Self, SchemaError> {
        GenericCircuit::new(transport, address, family, schema).map(Self::Generic)
    }

    /// Creates a zone sharing `program` with its sibling zones.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the description is invalid.
    pub fn zone(
        transport: Arc<T>,
        address: &str,
        schema: Arc<CircuitSchema>,
        program: Arc<ZoneProgram<T>>,
    ) -> std::result::Result<Self, SchemaError> {
        ZoneCircuit::new(transport, address, schema, program).map(Self::Zone)
    }

    /// Returns the zone, if this is one.
    #[must_use]
    pub fn as_zone(&self) -> Option<&ZoneCircuit<T>> {
        match self {
            Self::Zone(zone) => Some(zone),
            Self::Generic(_) => None,
        }
    }

    /// Writes a raw value below the circuit address.
    ///
    /// # Errors
    ///
    /// Returns the communication error of the write.
    pub async fn set_service_call(&self, suffix: &str, value: Value) -> Result<()> {
        Ok(self.core().set_service_call(suffix, value).await?)
    }
}

impl<T: Transport> Thermostat for Circuit<T> {
    type Transport = T;

    fn core(&self) -> &CircuitCore<T> {
        dispatch!(self, c => c.core())
    }

    fn core_mut(&mut self) -> &mut CircuitCore<T> {
        dispatch!(self, c => c.core_mut())
    }

    fn name(&self) -> &str {
        dispatch!(self, c => c.name())
    }

    fn target_temperature(&self) -> Option<f64> {
        dispatch!(self, c => c.target_temperature())
    }

    fn setpoint(&self) -> Option<String> {
        dispatch!(self, c => c.setpoint())
    }

    fn schedule(&self) -> Option<&ScheduleEngine> {
        dispatch!(self, c => c.schedule())
    }

    fn min_temp(&self) -> f64 {
        dispatch!(self, c => c.min_temp())
    }

    fn max_temp(&self) -> f64 {
        dispatch!(self, c => c.max_temp())
    }

    fn support_charge(&self) -> bool {
        dispatch!(self, c => c.support_charge())
    }

    fn support_presets(&self) -> bool {
        dispatch!(self, c => c.support_presets())
    }

    fn preset_modes(&self) -> Vec<String> {
        dispatch!(self, c => c.preset_modes())
    }

    fn preset_mode(&self) -> Option<String> {
        dispatch!(self, c => c.preset_mode())
    }

    fn hvac_action(&self) -> Option<HvacAction> {
        dispatch!(self, c => c.hvac_action())
    }

    fn extra_state_attributes(&self) -> Payload {
        dispatch!(self, c => c.extra_state_attributes())
    }

    async fn initialize(&mut self) {
        dispatch!(self, c => c.initialize().await);
    }

    async fn update(&mut self) -> RefreshReport {
        dispatch!(self, c => c.update().await)
    }

    async fn set_temperature(&mut self, temperature: f64) -> Result<()> {
        dispatch!(self, c => c.set_temperature(temperature).await)
    }

    async fn set_preset_mode(&mut self, preset: &str) -> Result<()> {
        dispatch!(self, c => c.set_preset_mode(preset).await)
    }
}
