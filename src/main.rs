use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use devportal_client::config::ClientConfig;
use devportal_client::utils::logging;
use devportal_client::{DevPortalApi, HttpTransport, SessionStore, SessionedClient};

#[derive(Parser)]
#[command(name = "devportal", version, about = "DevPortal credential dashboard client")]
struct AppCli {
    /// Config file path (JSON). Without it, settings come from DEVPORTAL_* variables.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the logged-in identity
    Whoami,
    /// List environments with their projects
    Envs,
    /// Search credential keys across all projects
    Search {
        query: String,
        /// Maximum number of hits
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");

    let args = AppCli::parse();
    let config = match &args.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::from_env()?,
    };

    let transport = HttpTransport::new(config.base_url.clone(), config.request_timeout())?;
    let client = SessionedClient::new(Arc::new(transport), SessionStore::new()).with_renewal_policy(config.renewal);

    let identity = client
        .login(&config.credentials()?)
        .await
        .context("login failed")?;
    info!(email = %identity.email, role = ?identity.role, "logged in");

    let mut api = DevPortalApi::new(client.clone())
        .with_fanout_limit(config.fanout_limit)
        .with_max_search_hits(config.max_search_hits);

    let outcome = match args.command {
        Commands::Whoami => print_json(&identity),
        Commands::Envs => match api.load_dashboard().await {
            Ok(dashboard) => print_json(&dashboard),
            Err(err) => Err(err.into()),
        },
        Commands::Search { query, limit } => {
            if let Some(limit) = limit {
                api = api.with_max_search_hits(limit);
            }
            match api.search_credentials(&query).await {
                Ok(hits) => {
                    info!(hits = hits.len(), max = api.max_search_hits(), "search complete");
                    print_json(&hits)
                }
                Err(err) => Err(err.into()),
            }
        }
    };

    if let Err(err) = client.logout().await {
        warn!(error = %err, "server-side logout failed; local session cleared");
    }

    outcome
}
