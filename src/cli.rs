use clap::Parser;

/// Structured log ingestion, query, and live-streaming service
#[derive(Debug, Parser)]
#[command(name = "log-gateway", version)]
pub struct Cli {
    /// Path to a configuration file (defaults to ./config.* if present)
    #[arg(long, env = "LOG_GATEWAY_CONFIG")]
    pub config: Option<String>,

    /// SQLite database file, overrides the configured path
    #[arg(long)]
    pub db: Option<String>,

    /// Listen address as host:port, overrides the configured address
    #[arg(long)]
    pub listen: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_no_args() {
        let cli = Cli::parse_from(["log-gateway"]);
        assert!(cli.config.is_none());
        assert!(cli.db.is_none());
        assert!(cli.listen.is_none());
    }

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::parse_from([
            "log-gateway",
            "--db",
            "/tmp/logs.db",
            "--listen",
            "127.0.0.1:8080",
        ]);
        assert_eq!(cli.db.as_deref(), Some("/tmp/logs.db"));
        assert_eq!(cli.listen.as_deref(), Some("127.0.0.1:8080"));
    }
}
