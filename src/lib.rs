// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `ThermoGW` Lib - A Rust library to read and drive heating gateway circuits.
//!
//! Heating gateways expose their heating circuits, domestic-hot-water
//! circuits and controller zones as a tree of JSON records. This library
//! fetches those records, caches them per circuit and resolves the values an
//! application actually needs from partial, possibly stale state:
//!
//! - **Current temperature**: filtered for sensor faults
//! - **Target temperature**: manual override, cached setpoint, schedule level
//!   or active program, in that order
//! - **Operation mode**: vendor modes translated to application modes
//! - **Schedule**: the switch-program window in effect right now
//! - **Zone presets**: program selection, battery and heating state
//!
//! # Supported Families
//!
//! - Heating circuits and domestic-hot-water circuits ([`GenericCircuit`])
//! - Controller zones ([`ZoneCircuit`])
//!
//! Both are described by a [`CircuitSchema`] and share the [`Thermostat`]
//! contract.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use thermogw_lib::{Circuit, CircuitFamily, CircuitSchema, Thermostat};
//! use thermogw_lib::protocol::HttpConfig;
//!
//! #[tokio::main]
//! async fn main() -> thermogw_lib::Result<()> {
//!     let key = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
//!     let transport = Arc::new(HttpConfig::new("192.168.1.100", key).into_transport()?);
//!     let schema = Arc::new(CircuitSchema::from_json(
//!         &std::fs::read_to_string("hc.json").unwrap(),
//!     )?);
//!
//!     let mut circuit = Circuit::generic(
//!         transport,
//!         "/heatingCircuits/hc1",
//!         CircuitFamily::HeatingCircuit,
//!         schema,
//!     )?;
//!     circuit.initialize().await;
//!     circuit.update().await;
//!
//!     println!("{}: {:?} -> {:?}", circuit.name(), circuit.current_temp(), circuit.target_temperature());
//!
//!     if circuit.ha_mode() != "heat" {
//!         circuit.set_ha_mode("heat").await;
//!     }
//!     circuit.set_temperature(21.5).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Custom Transports
//!
//! Circuits are generic over [`protocol::Transport`], so any connector that
//! can read and write gateway records can drive them. The HTTP transport is
//! behind the default `http` feature.

pub mod capabilities;
pub mod circuit;
pub mod error;
pub mod protocol;
#[cfg(test)]
mod testing;

pub use capabilities::{CircuitFamily, CircuitSchema, SetpointBinding, ValueKind};
pub use circuit::{
    Circuit, CircuitCore, GenericCircuit, HvacAction, ModeChange, OperationClass, RefreshReport,
    Thermostat, ZoneCircuit, ZoneProgram,
};
pub use error::{CryptoError, Error, ParseError, ProtocolError, Result, SchemaError, ValueError};
#[cfg(feature = "http")]
pub use protocol::{HttpConfig, HttpTransport};
pub use protocol::{Payload, Transport};
