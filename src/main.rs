//! indexerd - bridge event indexer daemon
//!
//! Polls the hub and every configured spoke chain, keeping the in-memory
//! bridge state current. The hub is always updated before any spoke so
//! dependent token/fee resolution never sees stale hub data.

use anyhow::{Context, Result};
use clap::Parser;
use relayscope::cache::MemoryCache;
use relayscope::config::{load_config, IndexerConfig};
use relayscope::hub::HubClient;
use relayscope::rpc::RpcChainSource;
use relayscope::source::{HubSources, SpokeSources};
use relayscope::spoke::SpokeClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Bridge event indexer
#[derive(Parser)]
#[command(name = "indexerd")]
#[command(about = "Index hub and spoke bridge events into queryable state")]
struct Args {
    /// Path to the deployment config file (JSON)
    #[arg(short, long, default_value = "indexer.json")]
    config: PathBuf,

    /// Seconds between update cycles
    #[arg(short, long, default_value_t = 12)]
    poll_interval: u64,

    /// Run a single update cycle and exit
    #[arg(long)]
    once: bool,
}

struct Indexer {
    hub: HubClient,
    spokes: Vec<SpokeClient>,
}

impl Indexer {
    fn from_config(config: &IndexerConfig) -> Self {
        let hub_source = Arc::new(RpcChainSource::new(
            config.hub.rpc_url.clone(),
            config.hub.address,
        ));
        let hub = HubClient::new(
            config.hub.chain_id,
            config.hub.address,
            config.hub.deployment_block,
            HubSources {
                logs: hub_source.clone(),
                head: hub_source.clone(),
                block_time: hub_source.clone(),
                utilization: hub_source,
            },
            config.hub.lookback(),
        )
        .with_cache(Arc::new(MemoryCache::new()));

        let spokes = config
            .spokes
            .iter()
            .map(|spoke| {
                let source = Arc::new(RpcChainSource::new(spoke.rpc_url.clone(), spoke.address));
                SpokeClient::new(
                    spoke.chain_id,
                    spoke.address,
                    spoke.deployment_block,
                    spoke.start_block,
                    SpokeSources {
                        logs: source.clone(),
                        head: source.clone(),
                        deposit_counter: source,
                    },
                    spoke.lookback(),
                )
                .with_cache(Arc::new(MemoryCache::new()))
            })
            .collect();

        Self { hub, spokes }
    }

    /// One full update cycle: hub strictly before every spoke.
    async fn run_cycle(&mut self) -> Result<()> {
        self.hub
            .update(None)
            .await
            .context("Hub update failed")?;

        for spoke in &mut self.spokes {
            spoke
                .update(Some(&self.hub), None, None)
                .await
                .with_context(|| format!("Spoke {} update failed", spoke.chain_id()))?;
            info!(
                chain = spoke.chain_id(),
                deposits = spoke.get_deposits().len(),
                searched_to = spoke.latest_height_searched(),
                "spoke state"
            );
        }
        Ok(())
    }

    /// Poll until interrupted. A failed cycle leaves prior state intact, so
    /// it is logged and retried on the next tick.
    async fn run(&mut self, poll_interval: Duration) -> Result<()> {
        loop {
            if let Err(e) = self.run_cycle().await {
                warn!("Update cycle failed: {:#}", e);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    info!("Starting bridge event indexer");
    info!("Config: {:?}", args.config);

    let config = load_config(&args.config).context("Failed to load config")?;
    info!(
        hub_chain = config.hub.chain_id,
        hub_contract = %config.hub.address,
        spokes = config.spokes.len(),
        "Loaded deployment config"
    );

    let mut indexer = Indexer::from_config(&config);

    if args.once {
        indexer.run_cycle().await?;
        info!("Single cycle complete");
        return Ok(());
    }

    tokio::select! {
        result = indexer.run(Duration::from_secs(args.poll_interval)) => {
            result.context("Indexer error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    info!("Indexer stopped");
    Ok(())
}
