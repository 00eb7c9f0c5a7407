use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite database file path
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Sustained requests per second per client
    #[serde(default = "default_rate")]
    pub per_second: f64,
    /// Burst capacity per client
    #[serde(default = "default_burst")]
    pub burst: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5081
}

fn default_db_path() -> String {
    "logs.db".to_string()
}

fn default_rate() -> f64 {
    100.0
}

fn default_burst() -> f64 {
    100.0
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: default_rate(),
            burst: default_burst(),
        }
    }
}

impl DatabaseConfig {
    /// sqlx connection URL for the configured file.
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Load configuration from an optional file plus environment overrides.
///
/// Environment variables use the `LOG_GATEWAY` prefix with `__` separators,
/// e.g. `LOG_GATEWAY__SERVER__PORT=8080`.
pub fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let mut builder = config::Config::builder();

    builder = match path {
        Some(path) => builder.add_source(config::File::with_name(path)),
        None => builder.add_source(config::File::with_name("config").required(false)),
    };

    builder = builder.add_source(config::Environment::with_prefix("LOG_GATEWAY").separator("__"));

    let cfg: Config = builder.build()?.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.server.host.parse::<std::net::IpAddr>().is_err() {
        anyhow::bail!("server.host must be an IP address, got: {}", cfg.server.host);
    }

    if cfg.database.path.trim().is_empty() {
        anyhow::bail!("database.path cannot be empty");
    }

    if cfg.rate_limit.per_second <= 0.0 {
        anyhow::bail!("rate_limit.per_second must be positive");
    }

    if cfg.rate_limit.burst < 1.0 {
        anyhow::bail!("rate_limit.burst must be at least 1");
    }

    Ok(())
}
