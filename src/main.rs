//! anki-mcp - MCP server for Anki
//!
//! This binary provides an MCP server that exposes Anki cards and decks
//! (via the AnkiConnect add-on) to AI assistants like Claude Desktop.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use anki_mcp::config::{DEFAULT_ANKI_CONNECT_URL, DEFAULT_DECK_CONFIG_ID, DEFAULT_DECK_PREFIX};
use anki_mcp::{Config, McpServer};

/// MCP server for Anki flashcards.
#[derive(Parser, Debug)]
#[command(name = "anki-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root deck for new cards; cards go to PREFIX::YYYY::MM::DD.
    #[arg(long, env = "ANKI_MCP_DECK_PREFIX", default_value = DEFAULT_DECK_PREFIX)]
    deck_prefix: String,

    /// AnkiConnect endpoint.
    #[arg(long, env = "ANKI_CONNECT_URL", default_value = DEFAULT_ANKI_CONNECT_URL)]
    anki_connect_url: String,

    /// Options group cloned for newly created decks.
    #[arg(long, env = "ANKI_MCP_DECK_CONFIG_ID", default_value_t = DEFAULT_DECK_CONFIG_ID)]
    deck_config_id: i64,

    /// Leave new decks on Anki's default options group.
    #[arg(long)]
    no_deck_config: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> anyhow::Result<Config> {
        if self.deck_prefix.trim().is_empty() {
            anyhow::bail!("deck prefix must not be empty");
        }

        let source = (!self.no_deck_config).then_some(self.deck_config_id);
        Ok(Config::default()
            .with_deck_prefix(self.deck_prefix.trim())
            .with_anki_connect_url(self.anki_connect_url.clone())
            .with_deck_config_source(source))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Set up logging
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Log to stderr (not stdout, which is used for MCP protocol)
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        "Starting {} v{}",
        anki_mcp::server::SERVER_NAME,
        anki_mcp::server::SERVER_VERSION
    );

    let config = match args.config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "Filing new cards under '{}::YYYY::MM::DD' via {}",
        config.deck_prefix,
        config.anki_connect_url
    );

    let server = McpServer::connect(config);

    // Anki may be started later; requests retry the connection on their own.
    server.probe_backend().await;

    match server.run_stdio().await {
        Ok(()) => {
            tracing::info!("Server exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
