use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use aether_core::AgentProvider;
use aether_engine::RunOrchestrator;
use aether_llm::{MockProvider, OllamaProvider, RelayProvider};
use aether_server::ServerConfig;
use aether_store::Database;
use aether_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProviderKind {
    /// Deterministic canned replies, no network.
    Mock,
    /// Local Ollama chat endpoint.
    Ollama,
    /// Webhook relay (n8n-style automation endpoint).
    Relay,
}

/// Multi-agent run orchestrator for Aether Control Room.
#[derive(Debug, Parser)]
#[command(name = "aether", version)]
struct Cli {
    /// Port to listen on. Falls back to PORT, then 4005.
    #[arg(long)]
    port: Option<u16>,

    /// Database file. Defaults to ~/.aether/database/aether.db.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Generation backend for agent replies.
    #[arg(long, value_enum, default_value_t = ProviderKind::Mock)]
    provider: ProviderKind,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry = Arc::new(init_telemetry(TelemetryConfig::default()));

    tracing::info!("Starting Aether server");

    let db_path = cli
        .db_path
        .unwrap_or_else(|| dirs_home().join(".aether").join("database").join("aether.db"));
    let db = Database::open(&db_path).context("failed to open database")?;
    tracing::info!(path = %db_path.display(), "Database opened");

    let provider = build_provider(cli.provider)?;
    let orchestrator = Arc::new(RunOrchestrator::new(provider, db.clone()));

    let port = match cli.port {
        Some(port) => port,
        None => std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(|| ServerConfig::default().port),
    };
    let config = ServerConfig {
        port,
        ..Default::default()
    };
    let _handle = aether_server::start_with_telemetry(config, db, orchestrator, telemetry)
        .await
        .context("failed to start server")?;

    tracing::info!(port = port, "Aether server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    Ok(())
}

fn build_provider(kind: ProviderKind) -> anyhow::Result<Arc<dyn AgentProvider>> {
    Ok(match kind {
        ProviderKind::Mock => Arc::new(MockProvider::new()),
        ProviderKind::Ollama => {
            let base_url = std::env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string());
            let model = std::env::var("OLLAMA_MODEL").ok();
            Arc::new(OllamaProvider::new(&base_url, model.as_deref()))
        }
        ProviderKind::Relay => {
            let webhook_url = std::env::var("RELAY_WEBHOOK_URL")
                .context("RELAY_WEBHOOK_URL is required for the relay provider")?;
            Arc::new(RelayProvider::new(&webhook_url))
        }
    })
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
