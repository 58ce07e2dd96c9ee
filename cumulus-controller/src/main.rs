//! cumulus-controller: reconciles virtual network objects against a cloud
//! provider.
//!
//! Objects live in an in-memory store seeded from the config file; the
//! provider is simulated in memory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cumulus_controller::workflow::{Network, network_reconciler};
use cumulus_controller::{Controller, ControllerConfig, FakeNetworkClient};
use cumulus_engine::observe::Observers;
use cumulus_engine::{
    MemoryStore, ObjectKey, ObjectStore, ReconcileCounters, ReconcileObserver, Resource,
    TracingObserver,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// cumulus controller
#[derive(Parser, Debug)]
#[command(name = "cumulus-controller", version, about)]
struct Args {
    /// JSON config file
    #[arg(long, env = "CUMULUS_CONFIG")]
    config: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(long, env = "CUMULUS_WORKERS")]
    workers: Option<usize>,

    /// Short backoff tier in seconds (rate limits, conflicts)
    #[arg(long, env = "CUMULUS_SHORT_DELAY_SECS")]
    short_delay_secs: Option<u64>,

    /// Long backoff tier in seconds (credentials, unknown errors)
    #[arg(long, env = "CUMULUS_LONG_DELAY_SECS")]
    long_delay_secs: Option<u64>,

    /// Per-invocation timeout in seconds
    #[arg(long, env = "CUMULUS_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::load(path)?,
            None => ControllerConfig::default(),
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(secs) = self.short_delay_secs {
            config.backoff.short = Duration::from_secs(secs);
        }
        if let Some(secs) = self.long_delay_secs {
            config.backoff.long = Duration::from_secs(secs);
        }
        if self.timeout_secs.is_some() {
            config.timeout_secs = self.timeout_secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cumulus_controller=info,cumulus_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Args::parse().into_config()?;
    info!(
        "Starting cumulus-controller: {} workers, backoff {:?}/{:?}",
        config.workers, config.backoff.short, config.backoff.long
    );

    let store: Arc<MemoryStore<Network>> = Arc::new(MemoryStore::new());
    let client = Arc::new(FakeNetworkClient::instant());
    let counters = Arc::new(ReconcileCounters::new());
    let sinks: Vec<Arc<dyn ReconcileObserver>> = vec![Arc::new(TracingObserver), counters.clone()];
    let observer = Arc::new(Observers(sinks));

    let events = store.subscribe();
    let mut initial: Vec<ObjectKey> = Vec::new();
    for seed in &config.networks {
        let obj = store
            .create(seed.to_object())
            .await
            .with_context(|| format!("Failed to seed network {}", seed.name))?;
        info!("Seeded network {}", obj.key());
        initial.push(obj.key());
    }

    let reconciler = network_reconciler(
        store.clone(),
        client,
        Arc::new(config.backoff.clone()),
        observer,
        config.timeout(),
    );
    let controller = Controller::new(Arc::new(reconciler), config.workers);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(controller.run(events, initial, cancel.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    cancel.cancel();
    handle.await.context("Controller task failed")?;

    for network in store.list().await {
        info!(
            "Network {}: state {:?}, id {:?}",
            network.key(),
            network.status.state,
            network.status.ext.network_id
        );
    }
    info!("Reconcile results: {:?}", counters.snapshot());
    Ok(())
}
