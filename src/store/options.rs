//! Local store configuration.
//!
//! # Example
//!
//! ```ignore
//! use tether::StoreOptions;
//!
//! let options = StoreOptions::at("/var/lib/app/offline.db")
//!     .with_pending_warn_threshold(10_000);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default time a statement waits on a locked database file.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// StoreOptions
// ============================================================================

/// Where the local store lives and how it reports backlog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,

    /// Log a warning when the pending queue grows beyond this many items.
    pub pending_warn_threshold: Option<usize>,

    /// Time a statement waits on a locked database file.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::in_memory()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl StoreOptions {
    /// Creates in-memory options with default settings.
    #[inline]
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            pending_warn_threshold: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Creates options for a database file at `path`.
    #[inline]
    #[must_use]
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self::in_memory().with_path(path)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl StoreOptions {
    /// Sets the database file.
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables the pending backlog warning.
    #[inline]
    #[must_use]
    pub fn with_pending_warn_threshold(mut self, threshold: usize) -> Self {
        self.pending_warn_threshold = Some(threshold);
        self
    }

    /// Sets the busy timeout.
    #[inline]
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(path) = &self.path
            && path.as_os_str().is_empty()
        {
            return Err("Store path must not be empty".to_string());
        }

        if self.pending_warn_threshold == Some(0) {
            return Err("Pending warn threshold must be greater than zero".to_string());
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
        let options = StoreOptions::default();
        assert!(options.path.is_none());
        assert!(options.pending_warn_threshold.is_none());
        assert_eq!(options.busy_timeout, DEFAULT_BUSY_TIMEOUT);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = StoreOptions::at("/tmp/offline.db")
            .with_pending_warn_threshold(100)
            .with_busy_timeout(Duration::from_millis(250));

        assert_eq!(options.path.as_deref(), Some(Path::new("/tmp/offline.db")));
        assert_eq!(options.pending_warn_threshold, Some(100));
        assert_eq!(options.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(StoreOptions::at("").validate().is_err());
        assert!(StoreOptions::in_memory().with_pending_warn_threshold(0).validate().is_err());
    }
}
