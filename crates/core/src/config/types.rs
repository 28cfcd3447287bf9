use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::kitchen::KitchenConfig;
use crate::retry::RetryPolicy;

/// Root configuration. Every section has defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub kitchen: KitchenConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    3000
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// How long a writer waits on a locked database.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("pizzeria.db")
}

fn default_busy_timeout() -> u64 {
    5_000
}

/// Message log backend.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrokerBackend {
    /// Tables in the shared database file.
    #[default]
    Sqlite,
    /// In-process only; every role must run in the same process.
    Memory,
}

/// Broker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub backend: BrokerBackend,
    /// How often subscriptions poll for new messages.
    #[serde(default = "default_broker_poll")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,
    /// Messages fetched per subscription read.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Consumed messages older than this are pruned from the log.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: BrokerBackend::default(),
            poll_interval_ms: default_broker_poll(),
            publish_timeout_ms: default_publish_timeout(),
            batch_size: default_batch_size(),
            retry: RetryPolicy::default(),
            retention_secs: default_retention(),
        }
    }
}

impl BrokerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

fn default_broker_poll() -> u64 {
    250
}

fn default_publish_timeout() -> u64 {
    2_000
}

fn default_batch_size() -> usize {
    32
}

fn default_retention() -> u64 {
    3_600
}

/// Worker liveness configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LivenessConfig {
    /// A worker silent for longer than this is presumed dead.
    #[serde(default = "default_liveness_window")]
    pub window_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            window_ms: default_liveness_window(),
        }
    }
}

impl LivenessConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

fn default_liveness_window() -> u64 {
    30_000
}

/// Liveness reaper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reaper_interval")]
    pub interval_ms: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_reaper_interval(),
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_reaper_interval() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

/// Notification subscriber configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// POST notifications here instead of logging them.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
    /// Deliveries of one message before it is dead-lettered.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
    /// How long an unconfirmed send blocks redeliveries of the same
    /// notification. Must exceed the webhook timeout.
    #[serde(default = "default_receipt_lease")]
    pub receipt_lease_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout(),
            max_delivery_attempts: default_max_delivery_attempts(),
            receipt_lease_secs: default_receipt_lease(),
        }
    }
}

impl NotifierConfig {
    pub fn receipt_lease(&self) -> Duration {
        Duration::from_secs(self.receipt_lease_secs)
    }
}

fn default_receipt_lease() -> u64 {
    30
}

fn default_webhook_timeout() -> u64 {
    10
}

fn default_max_delivery_attempts() -> u32 {
    5
}

/// Order intake configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IntakeConfig {
    /// Fixed priority for orders that do not carry one. When unset the
    /// priority is derived from the order total.
    #[serde(default)]
    pub default_priority: Option<i32>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Which services a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    Api,
    Kitchen,
    Notifier,
    All,
}

impl ServiceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRole::Api => "api",
            ServiceRole::Kitchen => "kitchen",
            ServiceRole::Notifier => "notifier",
            ServiceRole::All => "all",
        }
    }

    pub fn runs_api(&self) -> bool {
        matches!(self, ServiceRole::Api | ServiceRole::All)
    }

    pub fn runs_kitchen(&self) -> bool {
        matches!(self, ServiceRole::Kitchen | ServiceRole::All)
    }

    pub fn runs_notifier(&self) -> bool {
        matches!(self, ServiceRole::Notifier | ServiceRole::All)
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub liveness: LivenessConfig,
    pub reaper: ReaperConfig,
    pub kitchen: KitchenConfig,
    pub notifier: SanitizedNotifierConfig,
    pub intake: IntakeConfig,
    pub logging: LoggingConfig,
}

/// Notifier config with the webhook URL hidden.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifierConfig {
    pub enabled: bool,
    pub webhook_configured: bool,
    pub webhook_timeout_secs: u64,
    pub max_delivery_attempts: u32,
    pub receipt_lease_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            broker: config.broker.clone(),
            liveness: config.liveness.clone(),
            reaper: config.reaper.clone(),
            kitchen: config.kitchen.clone(),
            notifier: SanitizedNotifierConfig {
                enabled: config.notifier.enabled,
                webhook_configured: config.notifier.webhook_url.is_some(),
                webhook_timeout_secs: config.notifier.webhook_timeout_secs,
                max_delivery_attempts: config.notifier.max_delivery_attempts,
                receipt_lease_secs: config.notifier.receipt_lease_secs,
            },
            intake: config.intake.clone(),
            logging: config.logging.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.path, PathBuf::from("pizzeria.db"));
        assert_eq!(config.broker.backend, BrokerBackend::Sqlite);
        assert_eq!(config.liveness.window(), Duration::from_secs(30));
        assert!(config.reaper.enabled);
        assert!(config.notifier.webhook_url.is_none());
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_deserialize_sections() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[broker]
backend = "memory"
poll_interval_ms = 50
retention_secs = 600

[broker.retry]
max_attempts = 5

[liveness]
window_ms = 10000

[logging]
format = "json"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.broker.backend, BrokerBackend::Memory);
        assert_eq!(config.broker.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.broker.retry.max_attempts, 5);
        assert_eq!(config.broker.retention(), Duration::from_secs(600));
        assert_eq!(config.liveness.window_ms, 10_000);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_sanitized_config_hides_webhook() {
        let mut config = Config::default();
        config.notifier.webhook_url = Some("https://hooks.example.com/secret-token".to_string());

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.notifier.webhook_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-token"));
    }

    #[test]
    fn test_role_capabilities() {
        assert!(ServiceRole::All.runs_api());
        assert!(ServiceRole::All.runs_kitchen());
        assert!(!ServiceRole::Kitchen.runs_api());
        assert!(ServiceRole::Notifier.runs_notifier());
    }
}
