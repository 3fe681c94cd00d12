//! Transport configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tether::TransportOptions;
//!
//! let options = TransportOptions::new()
//!     .with_max_reconnect_attempts(8)
//!     .with_reconnect_base_delay(Duration::from_millis(500))
//!     .with_token_param("access_token");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use super::backoff::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, ReconnectPolicy};

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed for one connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default query parameter carrying the bearer credential.
pub const DEFAULT_TOKEN_PARAM: &str = "token";

// ============================================================================
// TransportOptions
// ============================================================================

/// Reconnection and connection-attempt settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Automatic reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// Delay before the first automatic reconnect; doubles per attempt.
    pub reconnect_base_delay: Duration,

    /// Time allowed for one connection attempt.
    pub connect_timeout: Duration,

    /// Query parameter name used to pass the credential.
    pub token_param: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl TransportOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            reconnect_base_delay: DEFAULT_BASE_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            token_param: DEFAULT_TOKEN_PARAM.to_string(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TransportOptions {
    /// Sets the reconnect attempt cap.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the first reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Sets the per-attempt connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the credential query parameter name.
    #[inline]
    #[must_use]
    pub fn with_token_param(mut self, name: impl Into<String>) -> Self {
        self.token_param = name.into();
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl TransportOptions {
    /// Builds a fresh reconnect policy from these options.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.max_reconnect_attempts, self.reconnect_base_delay)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than zero".to_string());
        }

        if self.token_param.trim().is_empty() {
            return Err("Token parameter name must not be empty".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TransportOptions::default();
        assert_eq!(options.max_reconnect_attempts, 5);
        assert_eq!(options.reconnect_base_delay, Duration::from_secs(1));
        assert_eq!(options.token_param, "token");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let options = TransportOptions::new()
            .with_max_reconnect_attempts(3)
            .with_reconnect_base_delay(Duration::from_millis(250))
            .with_connect_timeout(Duration::from_secs(2))
            .with_token_param("auth");

        assert_eq!(options.max_reconnect_attempts, 3);
        assert_eq!(options.policy().delay_for(3), Duration::from_millis(1000));
        assert_eq!(options.token_param, "auth");
    }

    #[test]
    fn test_validate_zero_timeout() {
        let options = TransportOptions::new().with_connect_timeout(Duration::ZERO);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_empty_token_param() {
        let options = TransportOptions::new().with_token_param(" ");
        assert!(options.validate().is_err());
    }
}
