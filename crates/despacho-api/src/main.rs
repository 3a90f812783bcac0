use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use despacho_api::{open_store, Server};
use despacho_core::{ConfigManager, DefaultContentSeeder, LifecycleManager, Settings};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "despacho-api", version, about = "Despacho B2B notes and dispatch service")]
struct Cli {
    /// Directory holding default.toml, {env}.toml and local.toml
    #[arg(long, env = "DESPACHO_CONFIG_DIR", global = true)]
    config_dir: Option<PathBuf>,
    /// Configuration environment (defaults to APP_ENV or "development")
    #[arg(long, global = true)]
    env: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Link the default catalog to an existing user
    Reseed { usuario_id: Uuid },
    /// Delete every template carrying the reserved "avance" label
    PurgarAvance,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigManager::load(cli.config_dir, cli.env)?;
    init_tracing(config.settings());
    info!(
        env = %config.settings().env,
        config_dir = ?config.config_dir(),
        "Configuration loaded"
    );
    let settings = config.into_settings();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => Server::new(settings).await?.run().await,
        Commands::Reseed { usuario_id } => {
            let store = open_store(&settings).await?;
            let report = DefaultContentSeeder::new(store)
                .seed_user_defaults(usuario_id)
                .await
                .with_context(|| format!("reseeding user {usuario_id}"))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::PurgarAvance => {
            let store = open_store(&settings).await?;
            let report = LifecycleManager::new(store)
                .purge_reserved_label()
                .await
                .context("purging reserved-label templates")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn init_tracing(settings: &Settings) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
