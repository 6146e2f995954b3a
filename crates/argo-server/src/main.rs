//! Argo query server binary
//!
//! - `serve`: run the HTTP service
//! - `load`: bulk-load a CSV export into the SQLite store
//! - `ask`: send a question to a running server

use anyhow::Context;
use argo_server::{client, config::Config, logging, AppState, OpenRouterModel};
use argo_store::ArgoStore;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "argo-server", version, about = "Natural-language queries over ARGO float data")]
struct Cli {
    /// Path to config.yaml (optional; defaults apply when absent)
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve,
    /// Replace the measurement table with the contents of a CSV export
    Load {
        csv: PathBuf,
        /// Database file to write (defaults to the configured path)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// POST a question to a running server and print the reply
    Ask {
        question: String,
        #[arg(long, default_value = client::DEFAULT_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init(&config.logging);

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Load { csv, db } => {
            let db_path = match db {
                Some(path) => path,
                None => config.database.prepare_path()?,
            };
            let summary = tokio::task::spawn_blocking(move || argo_store::load_csv(&csv, &db_path))
                .await?
                .context("bulk load failed")?;
            info!(rows = summary.rows, "Load complete");
            Ok(())
        }
        Command::Ask { question, url } => {
            let (status, body) = client::ask(&url, &question)
                .await
                .with_context(|| format!("request to {} failed", url))?;
            println!("HTTP {}", status);
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let api_key = Config::get_api_key()?;
    info!(model = %config.llm.model, api_base = %config.llm.api_base, "Using language model");
    let model = OpenRouterModel::new(api_key, &config.llm);

    let db_path = config.database.prepare_path()?;
    let store = ArgoStore::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;

    let state = AppState::new(Arc::new(model), Arc::new(store))
        .map_err(|e| anyhow::anyhow!("creating metrics registry: {}", e))?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    argo_server::api::serve(listener, state).await?;
    Ok(())
}
