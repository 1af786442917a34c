//! Configuration for a synchronizer and its stores.

use crate::schedule::{DEFAULT_SLICE_TIMEOUT, MIN_SLICE_TIMEOUT};
use crate::storage::DEFAULT_PAGE_SIZE;
use std::env;
use std::time::Duration;

/// Settings shared by a [`HybridStorage`](crate::HybridStorage) and the
/// pieces it is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Namespace for physical keys on both sides, and the commit queue name
    pub instance_name: String,
    /// Objects per remote listing page
    pub page_size: usize,
    /// Start a background push after every local change
    pub auto_push: bool,
    /// Deadline for the background scheduler to grant a slice
    pub slice_timeout: Duration,
}

impl SyncConfig {
    /// Defaults for the given instance.
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            page_size: DEFAULT_PAGE_SIZE,
            auto_push: true,
            slice_timeout: DEFAULT_SLICE_TIMEOUT,
        }
    }

    /// Set the remote listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Enable or disable pushing after every local change.
    pub fn with_auto_push(mut self, auto_push: bool) -> Self {
        self.auto_push = auto_push;
        self
    }

    /// Set the scheduler slice deadline, raised to at least
    /// [`MIN_SLICE_TIMEOUT`].
    pub fn with_slice_timeout(mut self, slice_timeout: Duration) -> Self {
        self.slice_timeout = slice_timeout.max(MIN_SLICE_TIMEOUT);
        self
    }

    /// Load configuration from environment variables.
    ///
    /// `HYBRID_INSTANCE_NAME` is required. `HYBRID_PAGE_SIZE`,
    /// `HYBRID_AUTO_PUSH` and `HYBRID_SLICE_TIMEOUT_MS` override defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let instance_name = lookup("HYBRID_INSTANCE_NAME")
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::MissingInstanceName)?;
        if instance_name.starts_with(crate::storage::RESERVED_PREFIX) || instance_name.contains('/') {
            return Err(ConfigError::InvalidInstanceName(instance_name));
        }
        let mut config = Self::new(instance_name);

        if let Some(raw) = lookup("HYBRID_PAGE_SIZE") {
            config.page_size = raw
                .parse()
                .ok()
                .filter(|size| (1..=DEFAULT_PAGE_SIZE).contains(size))
                .ok_or(ConfigError::InvalidPageSize(raw))?;
        }

        if let Some(raw) = lookup("HYBRID_AUTO_PUSH") {
            config.auto_push = match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::InvalidAutoPush(raw)),
            };
        }

        if let Some(raw) = lookup("HYBRID_SLICE_TIMEOUT_MS") {
            let millis: u64 = raw
                .parse()
                .ok()
                .filter(|millis| *millis > 0)
                .ok_or(ConfigError::InvalidSliceTimeout(raw))?;
            config.slice_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("HYBRID_INSTANCE_NAME environment variable is required")]
    MissingInstanceName,

    #[error("invalid instance name {0:?}: must not start with '@' or contain '/'")]
    InvalidInstanceName(String),

    #[error("invalid HYBRID_PAGE_SIZE value {0:?}: expected 1..=1000")]
    InvalidPageSize(String),

    #[error("invalid HYBRID_AUTO_PUSH value {0:?}")]
    InvalidAutoPush(String),

    #[error("invalid HYBRID_SLICE_TIMEOUT_MS value {0:?}: expected a positive number of milliseconds")]
    InvalidSliceTimeout(String),
}
