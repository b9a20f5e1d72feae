//! sandboxd - local multi-language code-execution sandbox, exposed over
//! an MCP stdio JSON-RPC transport.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rmcp::transport::io::stdio;
use rmcp::ServiceExt;
use tracing::{error, info, warn};

use sandboxd::config::Configuration;
use sandboxd::language::Language;
use sandboxd::mcp::SandboxMcpServer;
use sandboxd::server::Server;

#[derive(Parser)]
#[command(name = "sandboxd")]
#[command(about = "Local multi-language code-execution sandbox, served over MCP stdio")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, default_value = "sandbox.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ping the engine and check warm-up languages meet minIdle, then exit.
    Diagnostics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sandboxd={log_level}").into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("starting sandboxd v{}", env!("CARGO_PKG_VERSION"));

    let config = Configuration::load(&cli.config)?;
    let warm_up_languages: Vec<Language> = config
        .pool
        .warm_up_languages
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();
    let min_idle = config.pool.min_idle_per_language;

    let server = std::sync::Arc::new(Server::new(&config)?);

    match cli.command {
        Some(Commands::Diagnostics) => {
            let ok = server.selftest(&warm_up_languages, min_idle).await;
            if ok {
                println!("sandboxd diagnostics: ok");
                Ok(())
            } else {
                println!("sandboxd diagnostics: failed");
                std::process::exit(1);
            }
        }
        None => run(server).await,
    }
}

async fn run(server: std::sync::Arc<Server>) -> Result<()> {
    server.spawn_background_tasks();

    let handler = SandboxMcpServer::new(server.clone());
    let service = handler.serve(stdio()).await?;

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received shutdown signal, draining pool and sessions");
            shutdown_server.shutdown().await;
        }
    });

    if let Err(e) = service.waiting().await {
        error!(error = %e, "mcp service ended with an error");
        std::process::exit(1);
    }

    info!("sandboxd stopped");
    Ok(())
}
