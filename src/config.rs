//! Queue configuration.
//!
//! `QueueConfig` carries the scheduling, retry and retention settings and
//! can be read from `FORWARDR_*` environment variables. `TargetsFile` is the
//! YAML list of publishing targets from which the dispatch registry and the
//! media-kind eligibility routes are built at startup.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::{MediaKind, MediaKindEligibility};
use crate::dispatch::{DispatchRegistry, Dispatcher, LogDispatcher, WebhookDispatcher};
use crate::scheduler::fanout::{DEFAULT_INTERVAL, DEFAULT_START_DELAY};
use crate::scheduler::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::scheduler::sweeper::DEFAULT_RETENTION_DAYS;
use crate::scheduler::{ProcessorConfig, RetryPolicy, Stagger};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// A target names a dispatcher kind that does not exist.
    #[error("Unknown dispatcher kind '{kind}' for target '{target}'")]
    UnknownDispatcher { target: String, kind: String },

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The targets file is not valid YAML.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for the job queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    // Storage
    /// Path of the SQLite database file.
    pub database_path: String,

    // Processing
    /// Sleep between processor cycles.
    pub check_interval: Duration,
    /// Dispatch attempts before a job is failed.
    pub max_attempts: u32,
    /// Delay before a failed job is retried.
    pub retry_delay: Duration,
    /// How long `stop` waits for the running cycle.
    pub shutdown_timeout: Duration,

    // Fan-out
    /// Delay before the first job of a batch.
    pub start_delay: Duration,
    /// Spacing between consecutive jobs of a batch.
    pub interval: Duration,

    // Retention
    /// Days completed jobs are kept.
    pub retention_days: u32,
    /// Default number of jobs returned by `list`.
    pub list_limit: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_path: "./forwardr.db".to_string(),

            check_interval: Duration::from_secs(60),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            shutdown_timeout: Duration::from_secs(10),

            start_delay: DEFAULT_START_DELAY,
            interval: DEFAULT_INTERVAL,

            retention_days: DEFAULT_RETENTION_DAYS,
            list_limit: 100,
        }
    }
}

impl QueueConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FORWARDR_DB_PATH`: SQLite database path (default: ./forwardr.db)
    /// - `FORWARDR_CHECK_INTERVAL_SECS`: Seconds between cycles (default: 60)
    /// - `FORWARDR_MAX_ATTEMPTS`: Attempts before failing a job (default: 3)
    /// - `FORWARDR_RETRY_DELAY_MINUTES`: Minutes before a retry (default: 10)
    /// - `FORWARDR_START_DELAY_MINUTES`: Minutes before the first job (default: 0)
    /// - `FORWARDR_INTERVAL_MINUTES`: Minutes between jobs of a batch (default: 60)
    /// - `FORWARDR_RETENTION_DAYS`: Days completed jobs are kept (default: 7)
    /// - `FORWARDR_SHUTDOWN_TIMEOUT_SECS`: Seconds `stop` waits (default: 10)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(val) = lookup("FORWARDR_DB_PATH") {
            config.database_path = val;
        }

        if let Some(val) = lookup("FORWARDR_CHECK_INTERVAL_SECS") {
            let secs: u64 = parse_env_value(&val, "FORWARDR_CHECK_INTERVAL_SECS")?;
            config.check_interval = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("FORWARDR_MAX_ATTEMPTS") {
            config.max_attempts = parse_env_value(&val, "FORWARDR_MAX_ATTEMPTS")?;
        }
        if let Some(val) = lookup("FORWARDR_RETRY_DELAY_MINUTES") {
            let minutes: u64 = parse_env_value(&val, "FORWARDR_RETRY_DELAY_MINUTES")?;
            config.retry_delay = minutes_to_duration(minutes);
        }
        if let Some(val) = lookup("FORWARDR_SHUTDOWN_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FORWARDR_SHUTDOWN_TIMEOUT_SECS")?;
            config.shutdown_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("FORWARDR_START_DELAY_MINUTES") {
            let minutes: u64 = parse_env_value(&val, "FORWARDR_START_DELAY_MINUTES")?;
            config.start_delay = minutes_to_duration(minutes);
        }
        if let Some(val) = lookup("FORWARDR_INTERVAL_MINUTES") {
            let minutes: u64 = parse_env_value(&val, "FORWARDR_INTERVAL_MINUTES")?;
            config.interval = minutes_to_duration(minutes);
        }

        if let Some(val) = lookup("FORWARDR_RETENTION_DAYS") {
            config.retention_days = parse_env_value(&val, "FORWARDR_RETENTION_DAYS")?;
        }

        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_path must not be empty".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.check_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "check_interval must be greater than 0".to_string(),
            ));
        }
        if self.retention_days == 0 {
            return Err(ConfigError::ValidationFailed(
                "retention_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry policy built from `max_attempts` and `retry_delay`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_delay)
    }

    /// Default stagger for fan-out.
    pub fn stagger(&self) -> Stagger {
        Stagger::new(self.start_delay, self.interval)
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig::default()
            .with_check_interval(self.check_interval)
            .with_shutdown_timeout(self.shutdown_timeout)
            .with_retry(self.retry_policy())
    }

    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_list_limit(mut self, limit: u32) -> Self {
        self.list_limit = limit;
        self
    }
}

fn minutes_to_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// One publishing target in the targets file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    /// Dispatcher kind: `webhook` or `log`.
    pub kind: String,
    /// Endpoint for `webhook` targets.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key, read at startup.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Accepted media kinds. Empty accepts everything.
    #[serde(default)]
    pub media: Vec<MediaKind>,
}

impl TargetConfig {
    fn resolve_api_key(&self) -> Result<Option<String>, ConfigError> {
        match (&self.api_key, &self.api_key_env) {
            (Some(key), _) => Ok(Some(key.clone())),
            (None, Some(var)) => std::env::var(var)
                .map(Some)
                .map_err(|_| ConfigError::MissingEnvVar(var.clone())),
            (None, None) => Ok(None),
        }
    }

    fn build_dispatcher(&self) -> Result<Arc<dyn Dispatcher>, ConfigError> {
        match self.kind.as_str() {
            "log" => Ok(Arc::new(LogDispatcher::new())),
            "webhook" => {
                let url = self.url.clone().ok_or_else(|| {
                    ConfigError::ValidationFailed(format!(
                        "webhook target '{}' has no url",
                        self.name
                    ))
                })?;
                let dispatcher = WebhookDispatcher::new(url, self.resolve_api_key()?).map_err(
                    |e| ConfigError::InvalidValue {
                        key: self.name.clone(),
                        message: e.to_string(),
                    },
                )?;
                Ok(Arc::new(dispatcher))
            }
            other => Err(ConfigError::UnknownDispatcher {
                target: self.name.clone(),
                kind: other.to_string(),
            }),
        }
    }
}

/// Ordered list of publishing targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetsFile {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl TargetsFile {
    /// Reads and validates a YAML targets file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parses and validates YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let file: Self = serde_yaml::from_str(text)?;
        file.validate()?;
        Ok(file)
    }

    /// Checks names are present and unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "target name must not be empty".to_string(),
                ));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
        }
        Ok(())
    }

    /// Builds the static dispatch registry.
    ///
    /// # Errors
    ///
    /// Fails on an unknown kind, a webhook without url or an unset
    /// `api_key_env` variable.
    pub fn build_registry(&self) -> Result<DispatchRegistry, ConfigError> {
        let mut registry = DispatchRegistry::new();
        for target in &self.targets {
            registry.register(target.name.clone(), target.build_dispatcher()?);
        }
        Ok(registry)
    }

    /// Media-kind routes in file order.
    pub fn eligibility(&self) -> MediaKindEligibility {
        self.targets
            .iter()
            .fold(MediaKindEligibility::new(), |routes, target| {
                routes.with_target(target.name.clone(), target.media.iter().copied())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentItem, Eligibility};
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.database_path, "./forwardr.db");
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(600));
        assert_eq!(config.start_delay, Duration::ZERO);
        assert_eq!(config.interval, Duration::from_secs(3600));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.list_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = QueueConfig::from_lookup(lookup(&[
            ("FORWARDR_DB_PATH", "/var/lib/forwardr/jobs.db"),
            ("FORWARDR_CHECK_INTERVAL_SECS", "15"),
            ("FORWARDR_MAX_ATTEMPTS", "5"),
            ("FORWARDR_RETRY_DELAY_MINUTES", "2"),
            ("FORWARDR_INTERVAL_MINUTES", "30"),
            ("FORWARDR_RETENTION_DAYS", "14"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, "/var/lib/forwardr/jobs.db");
        assert_eq!(config.check_interval, Duration::from_secs(15));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(120));
        assert_eq!(config.interval, Duration::from_secs(1800));
        assert_eq!(config.retention_days, 14);
        assert_eq!(config.start_delay, Duration::ZERO);
    }

    #[test]
    fn test_from_lookup_invalid_value() {
        let err = QueueConfig::from_lookup(lookup(&[("FORWARDR_MAX_ATTEMPTS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("FORWARDR_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_config_builder_and_derived_settings() {
        let config = QueueConfig::new()
            .with_max_attempts(4)
            .with_retry_delay(Duration::from_secs(30))
            .with_start_delay(Duration::from_secs(60))
            .with_interval(Duration::from_secs(120))
            .with_check_interval(Duration::from_secs(5))
            .with_shutdown_timeout(Duration::from_secs(2));

        assert_eq!(config.retry_policy(), RetryPolicy::new(4, Duration::from_secs(30)));
        assert_eq!(
            config.stagger(),
            Stagger::new(Duration::from_secs(60), Duration::from_secs(120))
        );
        let processor = config.processor_config();
        assert_eq!(processor.check_interval, Duration::from_secs(5));
        assert_eq!(processor.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(processor.retry.max_attempts, 4);
    }

    #[test]
    fn test_validation_failures() {
        for (config, field) in [
            (QueueConfig::default().with_max_attempts(0), "max_attempts"),
            (
                QueueConfig::default().with_check_interval(Duration::ZERO),
                "check_interval",
            ),
            (QueueConfig::default().with_retention_days(0), "retention_days"),
            (QueueConfig::default().with_database_path(" "), "database_path"),
        ] {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(field), "{}", err);
        }
    }

    const TARGETS_YAML: &str = r#"
targets:
  - name: website
    kind: webhook
    url: http://localhost:8080/posts
    api_key: secret
  - name: instagram
    kind: log
    media: [photo, video]
  - name: youtube
    kind: log
    media: [video]
"#;

    #[test]
    fn test_targets_file_builds_registry_and_routes() {
        let file = TargetsFile::from_yaml(TARGETS_YAML).unwrap();
        assert_eq!(file.targets.len(), 3);

        let registry = file.build_registry().unwrap();
        assert_eq!(registry.targets(), vec!["instagram", "website", "youtube"]);
        assert_eq!(registry.get("website").unwrap().kind(), "webhook");

        let routes = file.eligibility();
        let video = ContentItem::new(MediaKind::Video);
        assert_eq!(
            routes.eligible_targets(&video),
            vec!["website", "instagram", "youtube"]
        );
        assert_eq!(
            routes.eligible_targets(&ContentItem::text("hi")),
            vec!["website"]
        );
    }

    #[test]
    fn test_targets_file_rejects_duplicates() {
        let yaml = "targets:\n  - {name: a, kind: log}\n  - {name: a, kind: log}\n";
        let err = TargetsFile::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_unknown_kind_and_missing_url() {
        let file = TargetsFile::from_yaml("targets:\n  - {name: fax, kind: carrier-pigeon}\n")
            .unwrap();
        assert!(matches!(
            file.build_registry(),
            Err(ConfigError::UnknownDispatcher { .. })
        ));

        let file = TargetsFile::from_yaml("targets:\n  - {name: site, kind: webhook}\n").unwrap();
        let err = file.build_registry().unwrap_err();
        assert!(err.to_string().contains("no url"));
    }

    #[test]
    fn test_unknown_media_kind_is_yaml_error() {
        let yaml = "targets:\n  - {name: a, kind: log, media: [hologram]}\n";
        assert!(matches!(
            TargetsFile::from_yaml(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TargetsFile::load(dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
