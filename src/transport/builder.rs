//! Builder pattern for transport configuration.
//!
//! # Example
//!
//! ```no_run
//! use tether::RealtimeTransport;
//!
//! # fn example() -> tether::Result<()> {
//! let transport = RealtimeTransport::builder()
//!     .url("wss://push.example.com/ws")
//!     .max_reconnect_attempts(5)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::client::RealtimeTransport;
use super::connector::{Connector, WsConnector};
use super::options::TransportOptions;

// ============================================================================
// TransportBuilder
// ============================================================================

/// Builder for configuring a [`RealtimeTransport`] instance.
///
/// Use [`RealtimeTransport::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct TransportBuilder {
    /// Base endpoint address.
    url: Option<String>,
    /// Reconnect and timeout settings.
    options: TransportOptions,
    /// Link factory; defaults to [`WsConnector`].
    connector: Option<Arc<dyn Connector>>,
}

impl std::fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .finish()
    }
}

// ============================================================================
// TransportBuilder Implementation
// ============================================================================

impl TransportBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base endpoint (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the reconnect attempt cap.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.options.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the first reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.options.reconnect_base_delay = delay;
        self
    }

    /// Sets the per-attempt connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Uses a custom link factory instead of WebSocket.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Builds the transport with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing or options are invalid
    /// - [`Error::Url`] if the URL cannot be parsed
    pub fn build(self) -> Result<RealtimeTransport> {
        let endpoint = self.validate_url()?;
        self.options.validate().map_err(Error::config)?;

        let connector = self.connector.unwrap_or_else(|| Arc::new(WsConnector));

        Ok(RealtimeTransport::new(endpoint, self.options, connector))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl TransportBuilder {
    /// Validates the endpoint configuration.
    fn validate_url(&self) -> Result<Url> {
        let raw = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "Endpoint URL is required. Use .url() to set it.\n\
                 Example: RealtimeTransport::builder().url(\"wss://host/ws\")",
            )
        })?;

        let url = Url::parse(raw)?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Unsupported scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_url() {
        let err = TransportBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_builder_rejects_http_scheme() {
        let err = TransportBuilder::new()
            .url("https://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_builder_rejects_unparsable_url() {
        let err = TransportBuilder::new().url("::::").build().unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn test_builder_rejects_invalid_options() {
        let err = TransportBuilder::new()
            .url("ws://localhost:9000")
            .connect_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_builder_success() {
        let transport = TransportBuilder::new()
            .url("wss://push.example.com/ws")
            .max_reconnect_attempts(3)
            .reconnect_base_delay(Duration::from_millis(10))
            .build()
            .expect("valid config");

        assert_eq!(transport.endpoint().as_str(), "wss://push.example.com/ws");
        assert_eq!(transport.options().max_reconnect_attempts, 3);
    }
}
