use serde::Deserialize;
use std::env;
use tourbook_booking::PaymentsConfig;
use tourbook_catalog::DEFAULT_DEPOSIT_RATIO_BPS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub sessions: SessionsConfig,
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub events: EventsConfig,
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub payments: PaymentsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_deposit_ratio_bps")]
    pub deposit_ratio_bps: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    #[serde(default = "default_session_lock_seconds")]
    pub session_lock_seconds: u64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            deposit_ratio_bps: default_deposit_ratio_bps(),
            currency: default_currency(),
            session_ttl_seconds: default_session_ttl_seconds(),
            session_lock_seconds: default_session_lock_seconds(),
        }
    }
}

fn default_deposit_ratio_bps() -> u32 { DEFAULT_DEPOSIT_RATIO_BPS }
fn default_currency() -> String { "EUR".to_string() }
fn default_session_ttl_seconds() -> u64 { 86_400 }
fn default_session_lock_seconds() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// JSON list of tours seeding the in-memory catalog
    pub tours_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionsConfig {
    #[serde(default)]
    pub backend: SessionBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventsBackend {
    #[default]
    Log,
    Kafka,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EventsConfig {
    #[serde(default)]
    pub backend: EventsBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `TOURBOOK__PAYMENTS__SANDBOX=true` sets `payments.sandbox`
            .add_source(config::Environment::with_prefix("TOURBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Checks that every selected backend has its connection settings.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.storage.backend == StorageBackend::Postgres && self.database.is_none() {
            return Err(config::ConfigError::Message(
                "storage.backend = postgres requires database.url".to_string(),
            ));
        }
        if self.sessions.backend == SessionBackend::Redis && self.redis.is_none() {
            return Err(config::ConfigError::Message(
                "sessions.backend = redis requires redis.url".to_string(),
            ));
        }
        if self.events.backend == EventsBackend::Kafka && self.kafka.is_none() {
            return Err(config::ConfigError::Message(
                "events.backend = kafka requires kafka.brokers".to_string(),
            ));
        }
        Ok(())
    }
}
