use core_config::{env_parse_or, ConfigError, FromEnv};

/// Delivery queue tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryQueueConfig {
    max_attempts: u32,
    event_capacity: usize,
}

impl Default for DeliveryQueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            event_capacity: 256,
        }
    }
}

impl DeliveryQueueConfig {
    /// Attempts per item before it is marked failed (at least 1)
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Buffer of the broadcast channel returned by `subscribe`
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl FromEnv for DeliveryQueueConfig {
    /// Reads `EMAIL_QUEUE_MAX_ATTEMPTS` (default 3) and `EMAIL_QUEUE_EVENT_CAPACITY` (default 256)
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self::default()
            .with_max_attempts(env_parse_or("EMAIL_QUEUE_MAX_ATTEMPTS", defaults.max_attempts)?)
            .with_event_capacity(env_parse_or(
                "EMAIL_QUEUE_EVENT_CAPACITY",
                defaults.event_capacity,
            )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        temp_env::with_vars_unset(["EMAIL_QUEUE_MAX_ATTEMPTS", "EMAIL_QUEUE_EVENT_CAPACITY"], || {
            assert_eq!(DeliveryQueueConfig::from_env().unwrap(), DeliveryQueueConfig::default());
        });
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        temp_env::with_var("EMAIL_QUEUE_MAX_ATTEMPTS", Some("0"), || {
            assert_eq!(DeliveryQueueConfig::from_env().unwrap().max_attempts(), 1);
        });
    }

    #[test]
    fn test_builder_clamps_to_one() {
        let config = DeliveryQueueConfig::default()
            .with_max_attempts(0)
            .with_event_capacity(0);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.event_capacity(), 1);
    }

    #[test]
    fn test_invalid_value() {
        temp_env::with_var("EMAIL_QUEUE_EVENT_CAPACITY", Some("lots"), || {
            let err = DeliveryQueueConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("EMAIL_QUEUE_EVENT_CAPACITY"));
        });
    }
}
