use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_langbase_evals::{
    cli::{execute_command, InspectCommands},
    config::{Config, LogFormat},
    provider::build_provider,
    server::{AppState, McpServer},
    storage::SqliteStorage,
};

/// MCP server for versioned LLM output evaluations.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server over stdio (default)
    Serve,

    /// Inspect stored evaluations
    #[command(flatten)]
    Inspect(InspectCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let provider = build_provider(&config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, storage, provider).await,
        Commands::Inspect(command) => {
            let state = AppState::new(config, storage, provider);
            let result = execute_command(command, &state).await;
            if result.exit_code == 0 {
                println!("{}", result.message);
            } else {
                eprintln!("{}", result.message);
            }
            std::process::exit(result.exit_code);
        }
    }
}

async fn serve(
    config: Config,
    storage: SqliteStorage,
    provider: Arc<dyn mcp_langbase_evals::provider::LlmProvider>,
) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        provider = provider.name(),
        "MCP Langbase Evals Server starting..."
    );

    // Make sure the provider's remote resources exist before taking requests
    if let Err(e) = provider.prepare().await {
        error!(error = %e, "Failed to prepare LLM provider");
        return Err(e.into());
    }

    let state = Arc::new(AppState::new(config, storage, provider));
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging; stdout is reserved for JSON-RPC
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
