use anyhow::Result;
use clap::Parser;

use log_gateway::cli::Cli;
use log_gateway::config::load_config;
use log_gateway::{init_tracing, server};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing();

    let mut config = load_config(args.config.as_deref())?;

    if let Some(db) = args.db {
        config.database.path = db;
    }
    if let Some(listen) = args.listen {
        let addr: std::net::SocketAddr = listen
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid --listen address '{}': {}", listen, e))?;
        config.server.host = addr.ip().to_string();
        config.server.port = addr.port();
    }

    server::start_server(config).await
}
