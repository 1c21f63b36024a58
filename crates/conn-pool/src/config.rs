//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Configuration for a connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections created eagerly when the pool is built.
    pub min_connections: u32,

    /// Pool capacity: the most connections the pool will ever hold.
    pub max_connections: u32,

    /// Default wait bound for [`Pool::acquire`](crate::Pool::acquire).
    ///
    /// `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,

    /// Run [`ConnectionFactory::reset`](crate::ConnectionFactory::reset)
    /// when a connection is checked in.
    pub reset_on_release: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: None,
            reset_on_release: false,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for a pool whose every connection is created up front.
    #[must_use]
    pub fn fixed(capacity: u32) -> Self {
        Self {
            min_connections: capacity,
            max_connections: capacity,
            ..Self::default()
        }
    }

    /// Set the number of eagerly-created connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.min_connections = count;
        self
    }

    /// Set the pool capacity.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the default acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Enable or disable the reset hook on check-in.
    ///
    /// A connection whose reset fails is destroyed and its slot refilled on
    /// demand. With the hook enabled, `max_connections` therefore bounds the
    /// connections alive at once, not the number ever created.
    #[must_use]
    pub fn reset_on_release(mut self, enabled: bool) -> Self {
        self.reset_on_release = enabled;
        self
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Configuration(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.acquire_timeout == Some(Duration::ZERO) {
            return Err(PoolError::Configuration(
                "acquire_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PoolConfig::default();
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.max_connections, 10);
        assert!(config.acquire_timeout.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_fixed_config() {
        let config = PoolConfig::fixed(4);
        assert_eq!(config.min_connections, 4);
        assert_eq!(config.max_connections, 4);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = PoolConfig::fixed(0).validate().unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
    }

    #[test]
    fn test_min_above_max_rejected() {
        let err = PoolConfig::new()
            .min_connections(8)
            .max_connections(4)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("min_connections (8)"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = PoolConfig::new().acquire_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
