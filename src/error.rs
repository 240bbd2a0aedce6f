// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `ThermoGW` library.
//!
//! This module provides the error hierarchy used across the library: gateway
//! communication, payload encryption, response parsing, capability
//! description validation and value constraints.
//!
//! Most of the resolution engine never fails: communication errors raised
//! during a refresh pass are logged and swallowed per key, and mode writes
//! report their outcome as a [`ModeChange`](crate::circuit::ModeChange).
//! These types surface where a caller genuinely has to react, such as
//! circuit construction or raw gateway queries.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred while talking to the gateway.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a response.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The capability description is unusable.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The requested data key is not declared by the circuit.
    #[error("unknown data key: {0}")]
    UnknownKey(String),
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    /// A temperature is outside the range the circuit accepts.
    #[error("temperature {actual} is out of range [{min}, {max}]")]
    TemperatureOutOfRange {
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
        /// The actual value that was provided.
        actual: f64,
    },

    /// The circuit is switched off and does not accept a setpoint.
    #[error("circuit is switched off")]
    CircuitOff,

    /// No writable setpoint is known for the current mode.
    #[error("no writable setpoint for mode {0:?}")]
    NoWritableSetpoint(Option<String>),

    /// The requested preset is not offered by the zone program.
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
}

/// Errors related to gateway communication.
///
/// Every failure of a `get` or `put` is one of these. The resolution engine
/// does not distinguish between variants; they only matter for logging.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request failed.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Connection to the gateway failed or returned an unexpected status.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The gateway refused the credentials.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The gateway answered with something that is not an encrypted JSON body.
    #[error("unexpected response from {path}: {message}")]
    UnexpectedResponse {
        /// The resource that was queried.
        path: String,
        /// What was wrong with the response.
        message: String,
    },

    /// The payload could not be encrypted or decrypted.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The decrypted payload is not the expected JSON.
    #[error("malformed payload: {0}")]
    Parse(#[from] ParseError),
}

/// Errors raised by payload encryption.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The key is not valid hex.
    #[error("invalid key encoding: {0}")]
    InvalidKey(String),

    /// The key does not have the length AES-256 requires.
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The ciphertext is not valid base64.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    /// The decrypted bytes are not UTF-8.
    #[error("unable to decrypt: {0}")]
    Decrypt(String),
}

/// Errors related to parsing gateway responses.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the response.
    #[error("missing field in response: {0}")]
    MissingField(String),

    /// Unexpected response format.
    #[error("unexpected response format: {0}")]
    UnexpectedFormat(String),

    /// Failed to parse a gateway timestamp.
    #[error("failed to parse date {input:?} with format {format:?}")]
    InvalidDate {
        /// The raw value sent by the gateway.
        input: String,
        /// The configured `strftime` format.
        format: String,
    },
}

/// Errors raised while validating a capability description.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    /// The description declares no data keys at all.
    #[error("circuit declares no data keys")]
    NoDataKeys,

    /// The same logical key is declared twice.
    #[error("data key {0:?} is declared more than once")]
    DuplicateKey(String),

    /// A table refers to a data key that is not declared.
    #[error("{table} refers to undeclared data key {key:?}")]
    UndeclaredKey {
        /// The table holding the dangling reference.
        table: &'static str,
        /// The missing key.
        key: String,
    },

    /// Family defaults are inconsistent.
    #[error("default minimum {min} is above default maximum {max}")]
    InvalidDefaults {
        /// Configured minimum.
        min: f64,
        /// Configured maximum.
        max: f64,
    },

    /// The circuit address has no usable last segment.
    #[error("invalid circuit address: {0:?}")]
    InvalidAddress(String),

    /// The description could not be deserialized.
    #[error("malformed capability description: {0}")]
    Malformed(String),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
