use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use batch_translate::config::Config;
use batch_translate::metrics::MetricsRegistry;
use batch_translate::server::{self, ServerState};
use batch_translate::translate::service::provider_from_config;
use batch_translate::translate::{GatewayClient, Language};

#[derive(Parser)]
#[command(name = "batch-translate", version, about = "Batched UI string translation")]
struct Cli {
    /// JSON config file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP translation endpoint.
    Serve {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Translate the given texts once and print one line per result.
    Translate {
        #[arg(long)]
        to: Language,
        #[arg(long, default_value = "EN")]
        from: Language,
        #[arg(required = true)]
        texts: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    batch_translate::init_tracing(&config.logging);

    let provider = provider_from_config(&config).context("configuring translation provider")?;
    let metrics = Arc::new(MetricsRegistry::new());
    let gateway = Arc::new(GatewayClient::new(
        provider,
        config.gateway.clone(),
        Arc::clone(&metrics),
    ));

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address {bind}"))?;

            let state = Arc::new(ServerState::new(gateway, metrics, &config.server));
            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown requested");
                    signal.cancel();
                }
            });

            server::serve(addr, state, shutdown)
                .await
                .context("translation server failed")?;
        }
        Command::Translate { to, from, texts } => {
            let translations = gateway
                .translate_batch(&texts, from, to)
                .await
                .context("translation failed")?;
            for line in translations {
                println!("{line}");
            }
        }
    }
    Ok(())
}
