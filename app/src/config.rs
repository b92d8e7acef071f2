use serde::Deserialize;
use std::collections::HashMap;

fn default_max_workers() -> usize {
    8
}

fn default_curseforge_chunk_size() -> usize {
    1000
}

fn default_modrinth_chunk_size() -> usize {
    100
}

fn default_delay_ms() -> u64 {
    500
}

fn default_curseforge_api() -> String {
    "https://api.curseforge.com".to_string()
}

fn default_modrinth_api() -> String {
    "https://api.modrinth.com".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_redis_database() -> i64 {
    0
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub host: String,
    #[serde(default = "default_mongo_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
}

fn default_mongo_port() -> u16 {
    27017
}

impl MongoConfig {
    pub fn uri(&self) -> String {
        match (self.auth, &self.user, &self.password) {
            (true, Some(user), Some(password)) => {
                format!("mongodb://{user}:{password}@{}:{}", self.host, self.port)
            }
            _ => format!("mongodb://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    pub password: Option<String>,
    #[serde(default = "default_redis_database")]
    pub database: i64,
}

fn default_redis_port() -> u16 {
    6379
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{password}@{}:{}/{}", self.host, self.port, self.database),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(rename = "botApi")]
    pub bot_api: String,
    #[serde(rename = "botToken")]
    pub bot_token: String,
    #[serde(rename = "chatId")]
    pub chat_id: String,
}

/// Top-level process configuration, loaded once from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    pub mongodb: MongoConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    #[serde(rename = "jobConfig")]
    pub job_config: HashMap<String, bool>,
    #[serde(default)]
    pub interval: HashMap<String, u64>,
    #[serde(default)]
    #[serde(rename = "cronTrigger")]
    pub cron_trigger: HashMap<String, String>,
    #[serde(default)]
    #[serde(rename = "useCron")]
    pub use_cron: bool,
    #[serde(default = "default_max_workers")]
    #[serde(rename = "maxWorkers")]
    pub max_workers: usize,
    #[serde(default = "default_curseforge_chunk_size")]
    #[serde(rename = "curseforgeChunkSize")]
    pub curseforge_chunk_size: usize,
    #[serde(default = "default_modrinth_chunk_size")]
    #[serde(rename = "modrinthChunkSize")]
    pub modrinth_chunk_size: usize,
    #[serde(default = "default_delay_ms")]
    #[serde(rename = "curseforgeDelay")]
    pub curseforge_delay_ms: u64,
    #[serde(default = "default_delay_ms")]
    #[serde(rename = "modrinthDelay")]
    pub modrinth_delay_ms: u64,
    #[serde(rename = "curseforgeApiKey")]
    pub curseforge_api_key: String,
    #[serde(default = "default_curseforge_api")]
    #[serde(rename = "curseforgeApi")]
    pub curseforge_api: String,
    #[serde(default = "default_modrinth_api")]
    #[serde(rename = "modrinthApi")]
    pub modrinth_api: String,
    #[serde(default)]
    #[serde(rename = "telegramBot")]
    pub telegram_bot: Option<TelegramConfig>,
    #[serde(default)]
    #[serde(rename = "domainRateLimits")]
    pub domain_rate_limits: HashMap<String, ratelimit::HostLimit>,
    #[serde(default = "default_log_level")]
    #[serde(rename = "logLevel")]
    pub log_level: String,
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Config, error::SyncError> {
        let raw = std::fs::read_to_string(path).map_err(|e| error::SyncError::Config(format!("reading {path:?}: {e}")))?;
        toml::from_str(&raw).map_err(|e| error::SyncError::Config(format!("parsing {path:?}: {e}")))
    }

    pub fn job_enabled(&self, job: &str) -> bool {
        self.job_config.get(job).copied().unwrap_or(true)
    }

    pub fn interval_seconds(&self, job: &str) -> u64 {
        self.interval
            .get(job)
            .copied()
            .unwrap_or_else(|| pipeline::default_interval_seconds(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml_with_defaults() {
        let toml = r#"
            [mongodb]
            host = "localhost"
            database = "mcim"

            [redis]
            host = "localhost"

            curseforgeApiKey = "key"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.curseforge_chunk_size, 1000);
        assert!(config.job_enabled("cf.refresh"));
    }
}
