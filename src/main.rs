//! # Refdesk — RAG answer service over PDF manuals and FAQs
//!
//! Answers operator questions in two passes: a TOC-guided pass that
//! pins down the relevant manual pages, then a vector search over
//! everything that pass did not cover. Answers stream to clients over
//! WebSocket.
//!
//! Usage:
//!   refdesk                              # Start with defaults + env
//!   refdesk --config refdesk.toml        # Load a config file
//!   refdesk --port 8080 --migrate        # Custom port, apply schema

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use refdesk_core::RefdeskConfig;
use refdesk_gateway::AppState;
use refdesk_providers::AzureOpenAi;
use refdesk_retrieval::{SearchEngine, SearchOptions};
use refdesk_store::VectorStore;

#[derive(Parser)]
#[command(
    name = "refdesk",
    version,
    about = "Two-stage RAG answer service over PDF manuals and FAQs"
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Listen port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Apply the fixture schema before serving
    #[arg(long)]
    migrate: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "refdesk=debug,tower_http=debug,sqlx=info"
    } else {
        "refdesk=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => RefdeskConfig::load_from(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => RefdeskConfig::from_env(),
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }

    let store = VectorStore::connect(&config.database, &config.search)
        .await
        .context("failed to connect to the document store")?;
    if cli.migrate {
        store.migrate().await.context("migration failed")?;
        tracing::info!("schema migrations applied");
    }

    let provider = Arc::new(AzureOpenAi::new(&config.azure_openai)?);
    let engine = SearchEngine::new(
        Arc::new(store),
        refdesk_core::CategoryMap::new(&config.categories),
        SearchOptions::from(&config.search),
    );

    let state = AppState {
        engine: Arc::new(engine),
        embedder: provider.clone(),
        generator: provider,
        gateway_config: config.gateway.clone(),
        pdf_config: config.pdf.clone(),
        start_time: std::time::Instant::now(),
    };

    tracing::info!(
        host = %state.gateway_config.host,
        port = state.gateway_config.port,
        "starting refdesk gateway"
    );
    refdesk_gateway::run(state).await?;
    Ok(())
}
