// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State shared by every circuit family.

use std::sync::Arc;

use serde_json::Value;

use crate::capabilities::{CircuitFamily, CircuitSchema, ValueKind, keys};
use crate::circuit::data_cache::{DataCache, MAX_VALUE, MIN_VALUE, RefreshReport, UNIT};
use crate::circuit::operation_mode::{ModeChange, OperationModeResolver};
use crate::circuit::{HA_OFF, TemperatureBound};
use crate::error::{Error, ProtocolError, SchemaError};
use crate::protocol::Transport;

/// Readings outside this open interval are sensor faults.
const PLAUSIBLE_TEMP: (f64, f64) = (0.0, 120.0);

/// Fetch orchestration and cached state of one circuit.
///
/// Owns the data cache and the operation mode resolver; family variants
/// layer their resolution policy on top.
#[derive(Debug)]
pub struct CircuitCore<T: Transport> {
    transport: Arc<T>,
    address: String,
    id: String,
    family: CircuitFamily,
    schema: Arc<CircuitSchema>,
    cache: DataCache,
    op_mode: OperationModeResolver,
    refreshed: bool,
}

impl<T: Transport> CircuitCore<T> {
    /// Creates the core of the circuit at `address`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the description is inconsistent or the
    /// address has no id segment.
    pub fn new(
        transport: Arc<T>,
        address: &str,
        family: CircuitFamily,
        schema: Arc<CircuitSchema>,
    ) -> Result<Self, SchemaError> {
        schema.validate()?;
        let address = address.trim_end_matches('/').to_string();
        let id = address
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SchemaError::InvalidAddress(address.clone()))?
            .to_string();

        let cache = DataCache::from_refs(&address, &schema.refs);
        let op_mode = OperationModeResolver::new(
            id.clone(),
            schema.mode_to_setpoint.clone(),
            schema.off_mode.clone(),
        );

        Ok(Self {
            transport,
            address,
            id,
            family,
            schema,
            cache,
            op_mode,
            refreshed: false,
        })
    }

    /// Returns the stable id (last address segment).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the circuit address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the device family.
    #[must_use]
    pub fn family(&self) -> CircuitFamily {
        self.family
    }

    /// Returns the capability description.
    #[must_use]
    pub fn schema(&self) -> &CircuitSchema {
        &self.schema
    }

    /// Returns the shared transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Returns the data cache.
    #[must_use]
    pub fn cache(&self) -> &DataCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut DataCache {
        &mut self.cache
    }

    /// Returns the operation mode resolver.
    #[must_use]
    pub fn op_mode(&self) -> &OperationModeResolver {
        &self.op_mode
    }

    /// Returns `true` once the last declared key of the current pass has
    /// been processed.
    #[must_use]
    pub fn is_refreshed(&self) -> bool {
        self.refreshed
    }

    /// Fetches `keys` one after another, in the given order.
    ///
    /// Successful records replace the cached ones; failures are logged and
    /// leave the cache untouched. Completion is flagged after the last key,
    /// whatever its outcome.
    pub async fn refresh(&mut self, keys: &[String]) -> RefreshReport {
        tracing::debug!(circuit = %self.id, keys = keys.len(), "Refreshing circuit");
        self.refreshed = false;
        let mut report = RefreshReport::default();

        for key in keys {
            let Some(point) = self.cache.get(key) else {
                tracing::warn!(circuit = %self.id, key = %key, "Skipping undeclared key");
                continue;
            };
            let address = point.address().to_string();
            let kind = point.kind();

            match self.transport.get(&address).await {
                Ok(payload) if payload.is_empty() => {
                    tracing::debug!(circuit = %self.id, key = %key, "Empty record, keeping cached value");
                    report.record(key, false);
                }
                Ok(payload) => {
                    if kind == ValueKind::OperationMode {
                        self.op_mode.apply(&payload, &address);
                    }
                    self.cache.merge(key, payload);
                    report.record(key, true);
                }
                Err(err) => {
                    tracing::debug!(circuit = %self.id, key = %key, error = %err, "Fetch failed, keeping cached value");
                    report.record(key, false);
                }
            }
        }

        self.refreshed = true;
        if !report.is_complete() {
            tracing::info!(
                circuit = %self.id,
                failed = ?report.failed(),
                "Refresh pass completed with failures"
            );
        }
        report
    }

    /// Runs one refresh pass over every declared key not omitted by the
    /// family.
    pub async fn update(&mut self) -> RefreshReport {
        let keys: Vec<String> = self
            .cache
            .keys()
            .iter()
            .filter(|key| !self.schema.is_omitted(key))
            .cloned()
            .collect();
        self.refresh(&keys).await
    }

    /// Fetches a single declared key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownKey`] if the key is not declared, or the
    /// communication error of the fetch. An empty record is rejected and
    /// leaves the cache untouched.
    pub async fn update_key(&mut self, key: &str) -> Result<(), Error> {
        let point = self
            .cache
            .get(key)
            .ok_or_else(|| Error::UnknownKey(key.to_string()))?;
        let address = point.address().to_string();
        let kind = point.kind();

        let payload = self.transport.get(&address).await?;
        if payload.is_empty() {
            return Err(ProtocolError::UnexpectedResponse {
                path: address,
                message: "empty record".to_string(),
            }
            .into());
        }
        if kind == ValueKind::OperationMode {
            self.op_mode.apply(&payload, &address);
        }
        self.cache.merge(key, payload);
        Ok(())
    }

    /// Fetches `key` if declared, logging instead of failing.
    pub(crate) async fn try_update_key(&mut self, key: &str) {
        if !self.schema.declares(key) {
            return;
        }
        if let Err(err) = self.update_key(key).await {
            tracing::debug!(circuit = %self.id, key = %key, error = %err, "Fetch failed");
        }
    }

    /// Returns the current temperature, if plausible.
    #[must_use]
    pub fn current_temp(&self) -> Option<f64> {
        let temp = self.cache.number(keys::CURRENT_TEMP)?;
        tracing::trace!(circuit = %self.id, temp, "Current temperature");
        (temp > PLAUSIBLE_TEMP.0 && temp < PLAUSIBLE_TEMP.1).then_some(temp)
    }

    /// Returns the unit of the current temperature.
    #[must_use]
    pub fn temp_units(&self) -> Option<&str> {
        self.cache
            .property(keys::CURRENT_TEMP)?
            .get(UNIT)?
            .as_str()
    }

    /// Returns the cached value of the current mode's setpoint key.
    #[must_use]
    pub fn setpoint_value(&self) -> Option<f64> {
        self.op_mode
            .setpoint_key()
            .and_then(|key| self.cache.number(key))
    }

    /// Returns the family default of a bound.
    ///
    /// The value bound falls back to the default minimum.
    #[must_use]
    pub fn default_bound(&self, bound: TemperatureBound) -> f64 {
        match bound {
            TemperatureBound::Max => self.schema.defaults.max,
            TemperatureBound::Value | TemperatureBound::Min => self.schema.defaults.min,
        }
    }

    /// Reads a bound from a record, with the family default.
    #[must_use]
    pub fn bound_of(&self, key: Option<&str>, bound: TemperatureBound) -> f64 {
        key.and_then(|key| self.cache.field_number(key, bound.field()))
            .unwrap_or_else(|| self.default_bound(bound))
    }

    /// Reads a bound from the firmware's limit keys, when declared.
    #[must_use]
    pub fn limit(&self, bound: TemperatureBound) -> Option<f64> {
        let limits = self.schema.limits.as_ref()?;
        Some(match bound {
            TemperatureBound::Min => self.bound_of(Some(&limits.min_key), bound),
            TemperatureBound::Max => self.bound_of(Some(&limits.max_key), bound),
            TemperatureBound::Value => return None,
        })
    }

    /// Returns the current mode in application terms.
    ///
    /// Vendor modes without a mapping read as [`HA_OFF`].
    #[must_use]
    pub fn ha_mode(&self) -> &str {
        let Some(current) = self.op_mode.current() else {
            return HA_OFF;
        };
        self.schema
            .ha_states
            .iter()
            .find(|state| state.bosch_names.iter().any(|name| name == current))
            .map_or(HA_OFF, |state| state.ha_name.as_str())
    }

    /// Returns every application mode name.
    #[must_use]
    pub fn ha_modes(&self) -> Vec<&str> {
        self.schema
            .ha_states
            .iter()
            .map(|state| state.ha_name.as_str())
            .collect()
    }

    /// Writes a vendor operation mode.
    pub async fn set_operation_mode(&mut self, mode: &str) -> ModeChange {
        self.op_mode.set_mode(&self.transport, mode).await
    }

    /// Switches to an application mode.
    ///
    /// Resolves the vendor mode through the schema table, writes it, and
    /// when the circuit just became manual without a cached setpoint, fetches
    /// the new setpoint key. Returns `true` if the mode changed.
    pub async fn set_ha_mode(&mut self, ha_mode: &str) -> bool {
        let old_setpoint = self.op_mode.setpoint_key().map(str::to_string);

        let Some(candidates) = self
            .schema
            .ha_states
            .iter()
            .find(|state| state.ha_name == ha_mode)
            .map(|state| state.bosch_names.clone())
        else {
            tracing::warn!(circuit = %self.id, ha_mode = %ha_mode, "Unknown application mode");
            return false;
        };
        let Some(vendor_mode) = self.op_mode.find_in_available(&candidates).map(str::to_string)
        else {
            tracing::warn!(
                circuit = %self.id,
                ha_mode = %ha_mode,
                available = ?self.op_mode.available(),
                "No allowed vendor mode for application mode"
            );
            return false;
        };

        if !self.set_operation_mode(&vendor_mode).await.is_changed() {
            return false;
        }

        let new_setpoint = self.op_mode.setpoint_key().map(str::to_string);
        if let Some(key) = new_setpoint {
            let needs_fetch = self.op_mode.is_manual()
                && old_setpoint.as_deref() != Some(key.as_str())
                && self.cache.number(&key).is_none_or(|v| v.abs() < f64::EPSILON);
            if needs_fetch {
                self.try_update_key(&key).await;
            }
        }
        true
    }

    /// Writes a raw value below the circuit address.
    ///
    /// The value is not validated.
    ///
    /// # Errors
    ///
    /// Returns the communication error of the write.
    pub async fn set_service_call(&self, suffix: &str, value: Value) -> Result<(), ProtocolError> {
        let address = format!("{}/{}", self.address, suffix.trim_start_matches('/'));
        tracing::info!(circuit = %self.id, address = %address, value = %value, "Sending service call");
        self.transport.put(&address, value).await
    }

    /// Reads the gateway's date text from the configured date address.
    ///
    /// Returns `None` when no address is configured or the gateway does not
    /// answer.
    pub async fn gateway_date(&self) -> Option<String> {
        let address = self.schema.date_address.as_deref()?;
        match self.transport.get(address).await {
            Ok(payload) => payload
                .get(crate::circuit::data_cache::VALUE)
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(err) => {
                tracing::debug!(circuit = %self.id, error = %err, "Gateway date unavailable");
                None
            }
        }
    }
}

impl TemperatureBound {
    /// Returns the record field carrying the bound.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Value => crate::circuit::data_cache::VALUE,
            Self::Min => MIN_VALUE,
            Self::Max => MAX_VALUE,
        }
    }
}
