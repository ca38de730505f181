//! Configuration types.

use crate::error::ConfigError;

/// Users per bulk message lookup when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 2;

/// Concurrent classifier calls when nothing else is configured.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 5;

/// Spam pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Users per bulk message lookup (B).
    pub batch_size: usize,
    /// Maximum classifier calls in flight at once (K).
    pub max_in_flight_classifications: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight_classifications: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl PipelineConfig {
    /// Build config from environment variables.
    ///
    /// Missing or unparseable values fall back to the defaults; call
    /// [`validate`](Self::validate) before using the result.
    pub fn from_env() -> Self {
        let batch_size = std::env::var("SPAM_SIEVE_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BATCH_SIZE);

        let max_in_flight_classifications = std::env::var("SPAM_SIEVE_MAX_IN_FLIGHT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_IN_FLIGHT);

        Self {
            batch_size,
            max_in_flight_classifications,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight_classifications = max;
        self
    }

    /// Reject values that would stall the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.max_in_flight_classifications == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_in_flight_classifications".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.max_in_flight_classifications, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = PipelineConfig::default()
            .with_batch_size(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "batch_size"));
    }

    #[test]
    fn zero_in_flight_rejected() {
        let err = PipelineConfig::default()
            .with_max_in_flight(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max_in_flight_classifications"));
    }

    #[test]
    fn builders_override_fields() {
        let config = PipelineConfig::default()
            .with_batch_size(3)
            .with_max_in_flight(1);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.max_in_flight_classifications, 1);
    }

    // Only test that touches these variables; steps run in sequence.
    #[test]
    fn from_env_parses_or_falls_back() {
        unsafe {
            std::env::set_var("SPAM_SIEVE_BATCH_SIZE", "7");
            std::env::set_var("SPAM_SIEVE_MAX_IN_FLIGHT", "3");
        }
        let config = PipelineConfig::from_env();
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.max_in_flight_classifications, 3);

        unsafe {
            std::env::set_var("SPAM_SIEVE_BATCH_SIZE", "seven");
            std::env::set_var("SPAM_SIEVE_MAX_IN_FLIGHT", "-1");
        }
        assert_eq!(PipelineConfig::from_env(), PipelineConfig::default());

        unsafe {
            std::env::set_var("SPAM_SIEVE_BATCH_SIZE", "0");
            std::env::remove_var("SPAM_SIEVE_MAX_IN_FLIGHT");
        }
        let config = PipelineConfig::from_env();
        assert_eq!(config.batch_size, 0);
        assert_eq!(config.max_in_flight_classifications, DEFAULT_MAX_IN_FLIGHT);
        assert!(config.validate().is_err());

        unsafe { std::env::remove_var("SPAM_SIEVE_BATCH_SIZE") };
        assert_eq!(PipelineConfig::from_env(), PipelineConfig::default());
    }
}
