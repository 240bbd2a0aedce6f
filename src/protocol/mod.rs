// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport implementations for talking to heating gateways.
//!
//! The resolution engine only needs two operations from a gateway: read the
//! record behind an address and write a value to an address. The
//! [`Transport`] trait captures exactly that, so circuits can be driven by
//! the bundled [`HttpTransport`] or by any other connector (XMPP relays,
//! recorded fixtures, test doubles).
//!
//! # Transports
//!
//! - [`HttpTransport`]: local HTTP API with AES-encrypted payloads
//!
//! # Serialization
//!
//! Gateways are embedded devices that cope badly with concurrent requests.
//! A transport is expected to keep at most one request in flight and to fail a
//! single request with [`ProtocolError::Timeout`] rather than block forever.

mod encryption;
#[cfg(feature = "http")]
mod http;

pub use encryption::{BLOCK_SIZE, Encryption};
#[cfg(feature = "http")]
pub use http::{HttpConfig, HttpTransport};

use crate::error::ProtocolError;

/// A decoded gateway record: the JSON object returned for an address.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Trait for connectors that can read and write gateway resources.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Reads the record stored at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Absolute resource path, e.g. `/heatingCircuits/hc1/operationMode`
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the gateway cannot be reached, refuses the
    /// request, or answers with something that does not decode to an object.
    async fn get(&self, path: &str) -> Result<Payload, ProtocolError>;

    /// Writes `value` to the resource at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the write is not acknowledged.
    async fn put(&self, path: &str, value: serde_json::Value) -> Result<(), ProtocolError>;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    async fn get(&self, path: &str) -> Result<Payload, ProtocolError> {
        (**self).get(path).await
    }

    async fn put(&self, path: &str, value: serde_json::Value) -> Result<(), ProtocolError> {
        (**self).put(path, value).await
    }
}
