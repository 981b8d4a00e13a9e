//! Configuration for Lizzy clients.
//!
//! [`LizzyConfig`] holds everything a client needs for its lifetime: where the API
//! lives, the bearer token, the version it reports itself as, TLS settings and the
//! deployment poll settings. It can be built in code or deserialized from any serde
//! format.

use crate::client::{PollPolicy, DEFAULT_MAX_POLL_FAILURES, DEFAULT_POLL_INTERVAL_SECS};
use crate::version::CLIENT_VERSION;
use crate::Error;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Configuration for a Lizzy client instance.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LizzyConfig {
    /// Lizzy base URL (the `/api` suffix is optional)
    #[validate(url)]
    pub base_url: String,

    /// OAuth access token sent as a bearer token
    pub access_token: SecretString,

    /// Version this client reports; compared with `X-Lizzy-Version`
    #[validate(length(min = 1))]
    #[serde(default = "default_client_version")]
    pub client_version: String,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to custom CA certificate
    #[serde(default)]
    pub tls_ca_cert: Option<PathBuf>,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause between deployment status fetches, in seconds
    #[validate(range(max = 3600))]
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Consecutive failed fetches tolerated while waiting for a deployment
    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,
}

fn default_client_version() -> String {
    CLIENT_VERSION.to_string()
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

const fn default_max_poll_failures() -> u32 {
    DEFAULT_MAX_POLL_FAILURES
}

impl LizzyConfig {
    /// Create a new client configuration with required parameters.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The Lizzy URL (e.g., "https://lizzy.example.com")
    /// * `access_token` - OAuth token used for every request
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or validation fails.
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, Error> {
        let config = Self {
            base_url: base_url.into(),
            access_token: SecretString::from(access_token.into()),
            client_version: default_client_version(),
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_failures: default_max_poll_failures(),
        };

        config.check()?;
        Ok(config)
    }

    /// Validate the configuration, e.g. after deserializing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first offending fields.
    pub fn check(&self) -> Result<(), Error> {
        self.validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))
    }

    /// Override the version this client reports.
    #[must_use]
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set custom CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set the pause between deployment status fetches in seconds.
    #[must_use]
    pub const fn with_poll_interval(mut self, seconds: u64) -> Self {
        self.poll_interval_secs = seconds;
        self
    }

    /// Set the number of consecutive failed fetches tolerated while polling.
    #[must_use]
    pub const fn with_max_poll_failures(mut self, failures: u32) -> Self {
        self.max_poll_failures = failures;
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Poll policy derived from the poll settings.
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new()
            .with_interval(Duration::from_secs(self.poll_interval_secs))
            .with_max_consecutive_failures(self.max_poll_failures)
    }

    /// Parse the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn parse_base_url(&self) -> Result<Url, Error> {
        Url::parse(&self.base_url)
            .map_err(|e| Error::ConfigError(format!("Invalid Lizzy URL: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_lizzy_config_new() {
        let config = LizzyConfig::new("https://lizzy.example.com", "token").unwrap();
        assert_eq!(config.base_url, "https://lizzy.example.com");
        assert_eq!(config.access_token.expose_secret(), "token");
        assert_eq!(config.client_version, CLIENT_VERSION);
        assert!(config.tls_verify);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.max_poll_failures, 3);
    }

    #[test]
    fn test_lizzy_config_invalid_url() {
        assert_err!(LizzyConfig::new("not-a-url", "token"));
    }

    #[test]
    fn test_lizzy_config_builder() {
        let config = LizzyConfig::new("https://lizzy.example.com", "token")
            .unwrap()
            .with_client_version("2.1.0")
            .with_tls_verify(false)
            .with_timeout(60)
            .with_poll_interval(1)
            .with_max_poll_failures(5);

        assert_eq!(config.client_version, "2.1.0");
        assert!(!config.tls_verify);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(
            config.poll_policy(),
            PollPolicy::new()
                .with_interval(Duration::from_secs(1))
                .with_max_consecutive_failures(5)
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = LizzyConfig::new("https://lizzy.example.com", "s3cr3t-token").unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cr3t-token"));
    }

    #[test]
    fn test_config_deserialization_defaults() {
        let config: LizzyConfig = serde_json::from_str(
            r#"{"base_url": "https://lizzy.example.com/api", "access_token": "abc"}"#,
        )
        .unwrap();

        assert_ok!(config.check());
        assert_eq!(config.access_token.expose_secret(), "abc");
        assert_eq!(config.client_version, CLIENT_VERSION);
        assert_eq!(config.poll_policy(), PollPolicy::default());
        assert!(config.tls_ca_cert.is_none());
    }

    #[test]
    fn test_config_validation_ranges() {
        let mut config = LizzyConfig::new("https://lizzy.example.com", "token").unwrap();
        config.request_timeout_secs = 0;
        assert_err!(config.check());

        config.request_timeout_secs = 30;
        config.max_poll_failures = 0;
        assert_err!(config.check());

        config.max_poll_failures = 3;
        config.client_version = String::new();
        assert_err!(config.check());

        config.client_version = "1.0.0".to_string();
        assert_ok!(config.check());
    }

    #[test]
    fn test_parse_base_url() {
        let config = LizzyConfig::new("https://lizzy.example.com:8443", "token").unwrap();
        let url = config.parse_base_url().unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("lizzy.example.com"));
        assert_eq!(url.port(), Some(8443));
    }
}
