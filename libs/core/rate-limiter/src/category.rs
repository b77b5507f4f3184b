use core_config::RateLimitConfig;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Request classes with independently configured limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RateLimitCategory {
    Api,
    Upload,
    Generation,
    Archive,
    Email,
}

impl RateLimitCategory {
    /// Limit for this category under `config`.
    pub fn limit(&self, config: &RateLimitConfig) -> u32 {
        match self {
            Self::Api => config.api,
            Self::Upload => config.upload,
            Self::Generation => config.generation,
            Self::Archive => config.archive,
            Self::Email => config.email,
        }
    }

    /// Bucket key for `subject` (client address, user id, ...) in this category.
    pub fn key(&self, subject: &str) -> String {
        format!("{}:{}", self.as_ref(), subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_category_limits_follow_config() {
        let config = RateLimitConfig {
            api: 1,
            upload: 2,
            generation: 3,
            archive: 4,
            email: 5,
            ..Default::default()
        };

        let limits: Vec<u32> = RateLimitCategory::iter().map(|c| c.limit(&config)).collect();
        assert_eq!(limits, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_category_key_is_namespaced() {
        assert_eq!(RateLimitCategory::Upload.key("10.0.0.1"), "upload:10.0.0.1");
        assert_eq!(RateLimitCategory::Email.to_string(), "email");
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!(
            RateLimitCategory::from_str("generation").unwrap(),
            RateLimitCategory::Generation
        );
        assert!(RateLimitCategory::from_str("unknown").is_err());
    }
}
