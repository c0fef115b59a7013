use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection string. Absent → the in-memory store is used,
    /// which is what development and the test suites run against.
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Flat per-booking fee, minor currency units.
    #[serde(default)]
    pub service_fee: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Capacity of the record-changed broadcast feed.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_currency() -> String {
    "NPR".to_string()
}

fn default_feed_capacity() -> usize {
    256
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment-specific file, optional ("config/production", ...).
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Machine-local overrides, never checked in.
            .add_source(config::File::with_name("config/local").required(false))
            // TRANSITA__SERVER__PORT=8080 style environment overrides.
            .add_source(config::Environment::with_prefix("TRANSITA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
