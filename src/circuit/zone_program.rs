// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Preset programs shared by the zones of one controller.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;

use crate::circuit::data_cache::VALUE;
use crate::error::{ParseError, ProtocolError};
use crate::protocol::Transport;

/// A selectable zone program.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Preset {
    /// Identifier written to a zone's active-program key.
    pub id: Value,
    /// Display name.
    pub name: String,
}

/// Program list of a controller, shared between its zones.
///
/// Zones hold it behind an `Arc`; the list is refreshed through a shared
/// reference and read without awaiting.
#[derive(Debug)]
pub struct ZoneProgram<T: Transport> {
    transport: Arc<T>,
    address: String,
    presets: RwLock<Vec<Preset>>,
}

impl<T: Transport> ZoneProgram<T> {
    /// Creates an empty program list read from `address`.
    #[must_use]
    pub fn new(transport: Arc<T>, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            presets: RwLock::new(Vec::new()),
        }
    }

    /// Returns the address of the program list.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Fetches the program list.
    ///
    /// # Errors
    ///
    /// Returns the communication error of the fetch, or a parse error if the
    /// record holds no program list. The previous list is kept on error.
    pub async fn update(&self) -> Result<(), ProtocolError> {
        let payload = self.transport.get(&self.address).await?;
        let list = payload
            .get(VALUE)
            .cloned()
            .ok_or_else(|| ParseError::MissingField(VALUE.to_string()))?;
        let presets: Vec<Preset> = serde_json::from_value(list).map_err(ParseError::from)?;
        tracing::debug!(address = %self.address, presets = presets.len(), "Zone programs updated");
        self.set_presets(presets);
        Ok(())
    }

    /// Replaces the program list.
    pub fn set_presets(&self, presets: Vec<Preset>) {
        *self.presets.write() = presets;
    }

    /// Returns the program names.
    #[must_use]
    pub fn preset_names(&self) -> Vec<String> {
        self.presets.read().iter().map(|p| p.name.clone()).collect()
    }

    /// Returns the name of the program with `id`.
    ///
    /// Ids compare by their textual form, so `1` matches `"1"`.
    #[must_use]
    pub fn preset_name(&self, id: &Value) -> Option<String> {
        let wanted = id_text(id);
        self.presets
            .read()
            .iter()
            .find(|p| id_text(&p.id) == wanted)
            .map(|p| p.name.clone())
    }

    /// Returns the id of the program named `name`.
    #[must_use]
    pub fn preset_id(&self, name: &str) -> Option<Value> {
        self.presets
            .read()
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.id.clone())
    }
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use serde_json::json;

    const LIST: &str = "/programs/list";

    fn program(transport: MockTransport) -> ZoneProgram<MockTransport> {
        ZoneProgram::new(Arc::new(transport), LIST)
    }

    #[tokio::test]
    async fn update_reads_program_list() {
        let programs = program(MockTransport::new().with(
            LIST,
            json!({ "value": [{ "id": 1, "name": "Weekday" }, { "id": 2, "name": "Weekend" }] }),
        ));
        programs.update().await.unwrap();

        assert_eq!(programs.preset_names(), ["Weekday", "Weekend"]);
        assert_eq!(programs.preset_name(&json!("2")).as_deref(), Some("Weekend"));
        assert_eq!(programs.preset_id("Weekday"), Some(json!(1)));
        assert_eq!(programs.preset_id("Holiday"), None);
    }

    #[tokio::test]
    async fn failed_update_keeps_previous_list() {
        let programs = program(MockTransport::new());
        programs.set_presets(vec![Preset {
            id: json!(1),
            name: "Weekday".to_string(),
        }]);

        assert!(programs.update().await.is_err());
        assert_eq!(programs.preset_names(), ["Weekday"]);
    }

    #[tokio::test]
    async fn malformed_list_is_a_parse_error() {
        let programs = program(MockTransport::new().with(LIST, json!({ "value": "nope" })));
        let err = programs.update().await.unwrap_err();
        assert!(matches!(err, ProtocolError::Parse(_)));
    }
}
