use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// When set, event intake routes require a matching `X-API-Key` header
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_redis_key")]
    pub redis_key: String,
    /// Bound of the in-memory queue
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    /// Number of concurrent consumer loops
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    /// Task-level re-invocations on infrastructure failure
    #[serde(default = "default_task_max_retries")]
    pub task_max_retries: u32,
    #[serde(default = "default_task_retry_initial_delay")]
    pub task_retry_initial_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    pub email_api_endpoint: Option<String>,
    pub email_api_key: Option<String>,
    #[serde(default = "default_email_from")]
    pub email_from: String,
    pub push_api_endpoint: Option<String>,
    pub push_api_key: Option<String>,
    #[serde(default = "default_transport_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_push_ttl")]
    pub push_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed offset between a failed attempt and its next retry
    #[serde(default = "default_retry_backoff_minutes")]
    pub retry_backoff_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_seconds: u64,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_seconds: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    #[serde(default = "default_dispatch_batch_size")]
    pub dispatch_batch_size: usize,
    #[serde(default = "default_retry_batch_size")]
    pub retry_batch_size: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Deliveries processed concurrently within one sweep
    #[serde(default = "default_sweep_concurrency")]
    pub concurrency: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_true() -> bool {
    true
}

fn default_database_url() -> String {
    "postgres://localhost:5432/notifications".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    300 // 5 minutes
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_key() -> String {
    "notifications:deliveries".to_string()
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_workers() -> usize {
    4
}

fn default_poll_timeout() -> u64 {
    1
}

fn default_task_max_retries() -> u32 {
    3
}

fn default_task_retry_initial_delay() -> u64 {
    1000
}

fn default_email_from() -> String {
    "notifications@localhost".to_string()
}

fn default_transport_timeout() -> u64 {
    10
}

fn default_push_ttl() -> u64 {
    86_400 // 24 hours
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_minutes() -> i64 {
    5
}

fn default_dispatch_interval() -> u64 {
    60
}

fn default_retry_interval() -> u64 {
    300 // 5 minutes
}

fn default_cleanup_interval() -> u64 {
    86_400 // daily
}

fn default_dispatch_batch_size() -> usize {
    100
}

fn default_retry_batch_size() -> usize {
    50
}

fn default_retention_days() -> i64 {
    30
}

fn default_sweep_concurrency() -> usize {
    10
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .set_default("store.backend", "memory")?
            .set_default("queue.backend", "memory")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // NOTIFIER__SERVER__PORT, NOTIFIER__TRANSPORT__EMAIL_API_KEY, etc.
            .add_source(
                Environment::with_prefix("NOTIFIER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl QueueConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds.max(1))
    }

    pub fn task_retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.task_retry_initial_delay_ms)
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl DeliveryConfig {
    pub fn retry_backoff(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.retry_backoff_minutes)
    }
}

impl SchedulerConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
            run_migrations: true,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            redis_url: default_redis_url(),
            redis_key: default_redis_key(),
            capacity: default_queue_capacity(),
            workers: default_workers(),
            poll_timeout_seconds: default_poll_timeout(),
            task_max_retries: default_task_max_retries(),
            task_retry_initial_delay_ms: default_task_retry_initial_delay(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            email_api_endpoint: None,
            email_api_key: None,
            email_from: default_email_from(),
            push_api_endpoint: None,
            push_api_key: None,
            timeout_seconds: default_transport_timeout(),
            push_ttl_seconds: default_push_ttl(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_minutes: default_retry_backoff_minutes(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dispatch_interval_seconds: default_dispatch_interval(),
            retry_interval_seconds: default_retry_interval(),
            cleanup_interval_seconds: default_cleanup_interval(),
            dispatch_batch_size: default_dispatch_batch_size(),
            retry_batch_size: default_retry_batch_size(),
            retention_days: default_retention_days(),
            concurrency: default_sweep_concurrency(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api: ApiConfig::default(),
            store: StoreConfig::default(),
            database: DatabaseConfig::default(),
            queue: QueueConfig::default(),
            transport: TransportConfig::default(),
            delivery: DeliveryConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8082);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.queue.backend, QueueBackend::Memory);
        assert_eq!(settings.delivery.max_retries, 3);
        assert_eq!(settings.delivery.retry_backoff(), chrono::Duration::minutes(5));
        assert_eq!(settings.scheduler.dispatch_batch_size, 100);
        assert_eq!(settings.scheduler.retry_batch_size, 50);
        assert_eq!(settings.scheduler.retention(), chrono::Duration::days(30));
        assert_eq!(settings.transport.timeout(), Duration::from_secs(10));
        assert!(settings.transport.email_api_endpoint.is_none());
    }

    #[test]
    fn test_backend_names_deserialize() {
        let cfg: StoreConfig = serde_json::from_str(r#"{"backend":"postgres"}"#).unwrap();
        assert_eq!(cfg.backend, StoreBackend::Postgres);

        let cfg: QueueConfig = serde_json::from_str(r#"{"backend":"redis","workers":8}"#).unwrap();
        assert_eq!(cfg.backend, QueueBackend::Redis);
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.redis_key, "notifications:deliveries");
    }

    #[test]
    fn test_poll_timeout_never_zero() {
        let cfg = QueueConfig {
            poll_timeout_seconds: 0,
            ..Default::default()
        };
        assert_eq!(cfg.poll_timeout(), Duration::from_secs(1));
    }
}
