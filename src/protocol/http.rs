// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP transport for the gateway's local REST API.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use tokio::sync::Mutex;

use crate::error::{ParseError, ProtocolError};
use crate::protocol::{Encryption, Payload, Transport};

/// User agent the gateway firmware expects.
const GATEWAY_USER_AGENT: &str = "TeleHeater/2.2.3";
const APP_JSON: &str = "application/json";

// ============================================================================
// HttpConfig - Connection parameters
// ============================================================================

/// Configuration for an HTTP gateway connection.
///
/// # Examples
///
/// ```
/// use thermogw_lib::protocol::HttpConfig;
/// use std::time::Duration;
///
/// let key = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
///
/// // Simple configuration
/// let config = HttpConfig::new("192.168.1.100", key);
///
/// // With all options
/// let config = HttpConfig::new("192.168.1.100", key)
///     .with_port(8080)
///     .with_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    host: String,
    port: u16,
    access_key: String,
    timeout: Duration,
}

impl HttpConfig {
    /// Default HTTP port.
    pub const DEFAULT_PORT: u16 = 80;
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration for the gateway at `host`.
    ///
    /// # Arguments
    ///
    /// * `host` - The hostname or IP address of the gateway
    /// * `access_key` - The hex encoded payload key
    #[must_use]
    pub fn new(host: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Self::DEFAULT_PORT,
            access_key: access_key.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets a custom port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the base URL from this configuration.
    #[must_use]
    pub fn base_url(&self) -> String {
        let host = self
            .host
            .strip_prefix("http://")
            .unwrap_or(&self.host)
            .trim_end_matches('/');
        if self.port == Self::DEFAULT_PORT {
            format!("http://{host}")
        } else {
            format!("http://{host}:{}", self.port)
        }
    }

    /// Creates an `HttpTransport` from this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the access key is invalid or the HTTP client cannot
    /// be created.
    pub fn into_transport(self) -> Result<HttpTransport, ProtocolError> {
        let encryption = Encryption::from_hex_key(&self.access_key)?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(GATEWAY_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(APP_JSON));

        let client = Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(ProtocolError::Http)?;

        Ok(HttpTransport {
            base_url: self.base_url(),
            client,
            encryption,
            timeout: self.timeout,
            lock: Mutex::new(()),
        })
    }
}

// ============================================================================
// HttpTransport
// ============================================================================

/// HTTP transport to a gateway.
///
/// Requests are serialized: a single lock guards the connection so at most
/// one request is in flight, whichever circuit issued it.
///
/// # Examples
///
/// ```no_run
/// use thermogw_lib::protocol::{HttpConfig, Transport};
///
/// # async fn example() -> thermogw_lib::Result<()> {
/// let transport = HttpConfig::new("192.168.1.100", "00".repeat(32)).into_transport()?;
/// let uuid = transport.get("/gateway/uuid").await?;
/// println!("{:?}", uuid.get("value"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
    encryption: Encryption,
    timeout: Duration,
    lock: Mutex<()>,
}

impl HttpTransport {
    /// Returns the base URL of the gateway.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the payload cipher.
    #[must_use]
    pub fn encryption(&self) -> &Encryption {
        &self.encryption
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> ProtocolError {
        if err.is_timeout() {
            // Saturating: timeouts never come near u64::MAX milliseconds.
            #[allow(clippy::cast_possible_truncation)]
            let millis = self.timeout.as_millis() as u64;
            ProtocolError::Timeout(millis)
        } else if err.is_connect() {
            ProtocolError::ConnectionFailed(err.to_string())
        } else {
            ProtocolError::Http(err)
        }
    }

    fn check_status(response: &reqwest::Response) -> Result<(), ProtocolError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProtocolError::AuthenticationFailed);
        }
        if !status.is_success() {
            return Err(ProtocolError::ConnectionFailed(format!(
                "HTTP {} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        Ok(())
    }
}

impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Payload, ProtocolError> {
        let _guard = self.lock.lock().await;
        let url = self.build_url(path);

        tracing::debug!(url = %url, "Sending GET request");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        Self::check_status(&response)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with(APP_JSON) {
            return Err(ProtocolError::UnexpectedResponse {
                path: path.to_string(),
                message: format!("wrong content type {content_type:?}"),
            });
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let plain = self.encryption.decrypt(&body)?;

        tracing::debug!(path = %path, body = %plain, "Received GET response");

        match serde_json::from_str(&plain).map_err(ParseError::from)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(ProtocolError::UnexpectedResponse {
                path: path.to_string(),
                message: format!("expected a JSON object, got {other}"),
            }),
        }
    }

    async fn put(&self, path: &str, value: serde_json::Value) -> Result<(), ProtocolError> {
        let _guard = self.lock.lock().await;
        let url = self.build_url(path);
        let body = serde_json::json!({ "value": value }).to_string();

        tracing::debug!(url = %url, body = %body, "Sending PUT request");

        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, APP_JSON)
            .body(self.encryption.encrypt(&body))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        Self::check_status(&response)?;

        tracing::debug!(path = %path, status = response.status().as_u16(), "PUT acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

    #[test]
    fn http_config_default_values() {
        let config = HttpConfig::new("192.168.1.100", KEY);
        assert_eq!(config.host(), "192.168.1.100");
        assert_eq!(config.port(), 80);
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn http_config_base_url() {
        let config = HttpConfig::new("192.168.1.100", KEY);
        assert_eq!(config.base_url(), "http://192.168.1.100");
    }

    #[test]
    fn http_config_base_url_custom_port() {
        let config = HttpConfig::new("http://192.168.1.100/", KEY).with_port(8080);
        assert_eq!(config.base_url(), "http://192.168.1.100:8080");
    }

    #[test]
    fn http_config_with_timeout() {
        let config = HttpConfig::new("gw", KEY).with_timeout(Duration::from_secs(3));
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn into_transport_rejects_bad_key() {
        let err = HttpConfig::new("gw", "abc").into_transport().unwrap_err();
        assert!(matches!(err, ProtocolError::Crypto(_)));
    }

    #[test]
    fn build_url_joins_paths() {
        let transport = HttpConfig::new("gw", KEY).into_transport().unwrap();
        assert_eq!(
            transport.build_url("/heatingCircuits/hc1"),
            "http://gw/heatingCircuits/hc1"
        );
        assert_eq!(transport.build_url("gateway/uuid"), "http://gw/gateway/uuid");
    }
}
