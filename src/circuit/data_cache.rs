// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-circuit cache of fetched data points.

use std::collections::HashMap;

use serde_json::Value;

use crate::capabilities::{DataRef, ValueKind};
use crate::protocol::Payload;

/// Field holding the scalar value of a record.
pub const VALUE: &str = "value";
/// Field holding the lower bound of a record.
pub const MIN_VALUE: &str = "minValue";
/// Field holding the upper bound of a record.
pub const MAX_VALUE: &str = "maxValue";
/// Field holding the unit of a record.
pub const UNIT: &str = "unitOfMeasure";

/// One declared data key and its last successfully fetched record.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    address: String,
    kind: ValueKind,
    result: Payload,
}

impl DataPoint {
    /// Creates an empty data point.
    #[must_use]
    pub fn new(address: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            address: address.into(),
            kind,
            result: Payload::new(),
        }
    }

    /// Returns the remote address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the declared value kind.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Returns the last fetched record, empty until the first success.
    #[must_use]
    pub fn result(&self) -> &Payload {
        &self.result
    }

    /// Returns the `value` field of the record.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.result.get(VALUE)
    }

    /// Returns `true` until the first successful fetch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }
}

/// Ordered mapping from logical key to [`DataPoint`].
///
/// The key order is the declaration order of the capability description and
/// never changes after construction. Only results mutate.
#[derive(Debug, Clone, Default)]
pub struct DataCache {
    order: Vec<String>,
    points: HashMap<String, DataPoint>,
}

impl DataCache {
    /// Builds the cache for the circuit at `prefix` from declared refs.
    #[must_use]
    pub fn from_refs(prefix: &str, refs: &[DataRef]) -> Self {
        let mut cache = Self::default();
        for data_ref in refs {
            let address = format!("{}/{}", prefix.trim_end_matches('/'), data_ref.id);
            cache.order.push(data_ref.key.clone());
            cache
                .points
                .insert(data_ref.key.clone(), DataPoint::new(address, data_ref.kind));
        }
        cache
    }

    /// Returns the declared keys in order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    /// Returns the number of declared keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the data point of a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&DataPoint> {
        self.points.get(key)
    }

    /// Returns the remote address of a key.
    #[must_use]
    pub fn address(&self, key: &str) -> Option<&str> {
        self.points.get(key).map(DataPoint::address)
    }

    /// Replaces the record of a key.
    ///
    /// Returns `false` if the key is not declared.
    pub fn merge(&mut self, key: &str, result: Payload) -> bool {
        match self.points.get_mut(key) {
            Some(point) => {
                point.result = result;
                true
            }
            None => false,
        }
    }

    /// Overwrites the `value` field of a record after a successful write.
    pub fn set_value(&mut self, key: &str, value: Value) {
        if let Some(point) = self.points.get_mut(key) {
            point.result.insert(VALUE.to_string(), value);
        }
    }

    /// Returns the record of a key.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Payload> {
        self.points.get(key).map(DataPoint::result)
    }

    /// Returns the `value` field of a key.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.points.get(key).and_then(DataPoint::value)
    }

    /// Returns the `value` field of a key as a string.
    #[must_use]
    pub fn string(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(Value::as_str)
    }

    /// Returns the `value` field of a key as text.
    ///
    /// Numbers are accepted in their textual form, so `1` reads as `"1"`.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        match self.value(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Returns the `value` field of a key as a number.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.field_number(key, VALUE)
    }

    /// Returns any numeric field of a key.
    ///
    /// Firmwares send some numbers as strings; both are accepted.
    #[must_use]
    pub fn field_number(&self, key: &str, field: &str) -> Option<f64> {
        self.property(key)
            .and_then(|record| record.get(field))
            .and_then(as_number)
    }
}

/// Reads a JSON number, or a string holding one.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Outcome of one refresh pass.
///
/// Failures are only reported here and in the logs; they never abort a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    attempted: Vec<String>,
    failed: Vec<String>,
}

impl RefreshReport {
    pub(crate) fn record(&mut self, key: &str, ok: bool) {
        self.attempted.push(key.to_string());
        if !ok {
            self.failed.push(key.to_string());
        }
    }

    /// Keys fetched in this pass, in order.
    #[must_use]
    pub fn attempted(&self) -> &[String] {
        &self.attempted
    }

    /// Keys whose fetch failed.
    #[must_use]
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    /// Returns `true` if every attempted fetch succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
