//! Bulk mailer configuration

use core_config::{ConfigError, Environment, FromEnv, env_parse_or, env_required};
use std::path::PathBuf;
use std::time::Duration;
use strum::{Display, EnumString};

/// Which provider delivers the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    SendGrid,
    Smtp,
    Mock,
}

impl ProviderKind {
    /// SendGrid in production, SMTP (Mailpit) everywhere else
    pub fn default_for(environment: &Environment) -> Self {
        if environment.is_production() {
            Self::SendGrid
        } else {
            Self::Smtp
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkMailerConfig {
    /// JSON array of deliveries
    pub manifest_path: PathBuf,
    pub session_id: String,
    /// Explicit provider choice; `None` picks by environment
    pub provider: Option<ProviderKind>,
    pub poll_interval: Duration,
}

impl BulkMailerConfig {
    pub fn provider_kind(&self, environment: &Environment) -> ProviderKind {
        self.provider
            .unwrap_or_else(|| ProviderKind::default_for(environment))
    }
}

impl FromEnv for BulkMailerConfig {
    /// Reads `BULK_MAIL_MANIFEST` (required), `BULK_MAIL_SESSION`,
    /// `EMAIL_PROVIDER` and `BULK_MAIL_POLL_INTERVAL_MS` (1000).
    fn from_env() -> Result<Self, ConfigError> {
        let provider = match std::env::var("EMAIL_PROVIDER") {
            Ok(raw) => Some(raw.trim().parse().map_err(|e: strum::ParseError| {
                ConfigError::ParseError {
                    key: "EMAIL_PROVIDER".to_string(),
                    details: format!("{e}: expected sendgrid, smtp or mock"),
                }
            })?),
            Err(_) => None,
        };

        let session_id = std::env::var("BULK_MAIL_SESSION")
            .unwrap_or_else(|_| format!("bulk-{}", uuid::Uuid::now_v7()));

        Ok(Self {
            manifest_path: PathBuf::from(env_required("BULK_MAIL_MANIFEST")?),
            session_id,
            provider,
            poll_interval: Duration::from_millis(env_parse_or("BULK_MAIL_POLL_INTERVAL_MS", 1000)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("sendgrid".parse::<ProviderKind>().unwrap(), ProviderKind::SendGrid);
        assert_eq!("SMTP".parse::<ProviderKind>().unwrap(), ProviderKind::Smtp);
        assert_eq!("mock".parse::<ProviderKind>().unwrap(), ProviderKind::Mock);
        assert!("pigeon".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::SendGrid.to_string(), "sendgrid");
    }

    #[test]
    fn test_default_provider_follows_environment() {
        assert_eq!(
            ProviderKind::default_for(&Environment::Production),
            ProviderKind::SendGrid
        );
        assert_eq!(
            ProviderKind::default_for(&Environment::Development),
            ProviderKind::Smtp
        );
    }

    #[test]
    fn test_from_env_defaults() {
        temp_env::with_vars(
            [
                ("BULK_MAIL_MANIFEST", Some("/tmp/manifest.json")),
                ("BULK_MAIL_SESSION", None),
                ("EMAIL_PROVIDER", None),
                ("BULK_MAIL_POLL_INTERVAL_MS", None),
            ],
            || {
                let config = BulkMailerConfig::from_env().unwrap();
                assert_eq!(config.manifest_path, PathBuf::from("/tmp/manifest.json"));
                assert!(config.session_id.starts_with("bulk-"));
                assert_eq!(config.provider, None);
                assert_eq!(config.poll_interval, Duration::from_secs(1));
                assert_eq!(
                    config.provider_kind(&Environment::Production),
                    ProviderKind::SendGrid
                );
            },
        );
    }

    #[test]
    fn test_from_env_explicit_values() {
        temp_env::with_vars(
            [
                ("BULK_MAIL_MANIFEST", Some("deliveries.json")),
                ("BULK_MAIL_SESSION", Some("newsletter-7")),
                ("EMAIL_PROVIDER", Some("mock")),
                ("BULK_MAIL_POLL_INTERVAL_MS", Some("250")),
            ],
            || {
                let config = BulkMailerConfig::from_env().unwrap();
                assert_eq!(config.session_id, "newsletter-7");
                assert_eq!(config.provider_kind(&Environment::Production), ProviderKind::Mock);
                assert_eq!(config.poll_interval, Duration::from_millis(250));
            },
        );
    }

    #[test]
    fn test_manifest_is_required() {
        temp_env::with_var_unset("BULK_MAIL_MANIFEST", || {
            let err = BulkMailerConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "BULK_MAIL_MANIFEST"));
        });
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        temp_env::with_vars(
            [
                ("BULK_MAIL_MANIFEST", Some("deliveries.json")),
                ("EMAIL_PROVIDER", Some("pigeon")),
            ],
            || {
                let err = BulkMailerConfig::from_env().unwrap_err();
                assert!(matches!(err, ConfigError::ParseError { key, .. } if key == "EMAIL_PROVIDER"));
            },
        );
    }
}
