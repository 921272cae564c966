use anyhow::{Context, Result};
use clap::Parser;
use scanner_app::RefreshOrchestrator;
use scanner_candles::{IngestionJob, TradeAggregator};
use scanner_config::ConfigManager;
use scanner_core::feed::{parse_raw_batch, RawTrade};
use scanner_core::storage::InMemoryStore;
use scanner_core::MarketSnapshot;
use scanner_setup::SetupAnalyzer;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; defaults plus environment when omitted
    #[arg(short, long, env = "SETUP_SCANNER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// JSON array of raw trades to ingest before scanning
    #[arg(long)]
    trades: Option<PathBuf>,

    /// JSON array of market snapshots
    #[arg(long)]
    snapshots: Option<PathBuf>,

    /// Run a single refresh cycle and print the ranked batch
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.debug, args.json_logs);

    info!("Starting Setup Scanner");

    let manager = match &args.config {
        Some(path) => ConfigManager::from_file(path)?,
        None => ConfigManager::from_env()?,
    };
    manager.validate()?;
    let config = manager.get_config().clone();

    let store = Arc::new(InMemoryStore::new());

    if let Some(path) = &args.snapshots {
        load_snapshots(&store, path).await?;
    }
    if let Some(path) = &args.trades {
        ingest_trades(&store, path).await?;
    }

    let orchestrator = RefreshOrchestrator::new(
        store.clone(),
        store.clone(),
        SetupAnalyzer::new(config.analysis.clone()),
        config.instruments.clone(),
        config.refresh.clone(),
    );

    if args.once {
        let batch = orchestrator.run_cycle().await;
        println!("{}", serde_json::to_string_pretty(batch.as_ref())?);
        return Ok(());
    }

    orchestrator.run(shutdown_signal()).await;

    info!("Setup Scanner stopped");
    Ok(())
}

fn init_logging(debug: bool, json: bool) {
    let level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn load_snapshots(store: &InMemoryStore, path: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading snapshots from {}", path.display()))?;
    let snapshots: Vec<MarketSnapshot> = serde_json::from_str(&raw)?;

    let count = snapshots.len();
    for snapshot in snapshots {
        store.put_snapshot(snapshot);
    }

    info!("Loaded {} market snapshots", count);
    Ok(())
}

async fn ingest_trades(store: &Arc<InMemoryStore>, path: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading trades from {}", path.display()))?;
    let records = parse_raw_batch(&raw)
        .with_context(|| format!("parsing trades from {}", path.display()))?;

    let mut by_instrument: BTreeMap<String, Vec<RawTrade>> = BTreeMap::new();
    let mut untagged = 0usize;
    for record in records {
        match record.instrument_id.clone() {
            Some(instrument) => by_instrument.entry(instrument).or_default().push(record),
            None => untagged += 1,
        }
    }
    if untagged > 0 {
        warn!("Ignoring {} trades without an instrument id", untagged);
    }

    let job = IngestionJob::new(store.clone(), TradeAggregator::new(store.clone()));
    for (instrument, batch) in by_instrument {
        if let Err(e) = job.ingest_raw(&instrument, batch).await {
            error!("Failed to ingest trades for {}: {}", instrument, e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        }
    }
}
