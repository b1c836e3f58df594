//! Ethereum address observer binary
//!
//! Follows the chain head and logs every native transaction and ERC20
//! transfer touching a watched address as it gains confirmations.

use anyhow::{Context, Result};
use clap::Parser;
use eth_address_observer::{
    load_watchlist, Notification, Observer, ObserverConfig, ObserverEvent, RpcClient,
    SubscriptionKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Ethereum address observer
#[derive(Parser)]
#[command(name = "observer")]
#[command(about = "Track confirmations of transactions and token transfers for watched addresses")]
struct Args {
    /// RPC endpoint URL (e.g., https://eth.llamarpc.com)
    #[arg(short, long, default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Path to watchlist file (one address per line)
    #[arg(short, long, default_value = "watchlist.txt")]
    watchlist: PathBuf,

    /// Path to JSON config file (optional, defaults apply otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn log_event(event: &ObserverEvent) {
    let kind = event.kind();
    match event {
        ObserverEvent::Transaction(n) => match n {
            Notification::Confirmation {
                item,
                confirmations,
            } => info!("[{}] {:?} ({} confirmations)", kind, item.hash, confirmations),
            _ => info!("[{}] {:?}", kind, n.item().hash),
        },
        ObserverEvent::Transfer(n) => {
            let t = n.item();
            match n {
                Notification::Confirmation { confirmations, .. } => info!(
                    "[{}] {:?}#{} token={:?} {:?} -> {:?} value={} ({} confirmations)",
                    kind, t.tx_hash, t.log_index, t.token, t.from, t.to, t.value, confirmations
                ),
                _ => info!(
                    "[{}] {:?}#{} token={:?} {:?} -> {:?} value={}",
                    kind, t.tx_hash, t.log_index, t.token, t.from, t.to, t.value
                ),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting Ethereum address observer");
    info!("RPC URL: {}", args.rpc_url);
    info!("Watchlist: {:?}", args.watchlist);

    let config = match &args.config {
        Some(path) => ObserverConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ObserverConfig::default(),
    };
    info!(
        "Confirmations required: {} (eth), {} (erc20)",
        config.confirmations_required, config.erc20.confirmations_required
    );

    let addresses = load_watchlist(&args.watchlist).context("Failed to load watchlist")?;
    info!("Loaded {} addresses to watch", addresses.len());

    let rpc = Arc::new(RpcClient::new(args.rpc_url));
    let mut observer = Observer::new(rpc, config);
    observer.watchlist().extend(addresses);

    for kind in SubscriptionKind::ALL {
        observer.subscribe(kind, log_event);
    }

    if let Some(mut errors) = observer.errors() {
        tokio::spawn(async move {
            while let Some(err) = errors.recv().await {
                error!("{}", err);
            }
        });
    }

    // Handle Ctrl+C gracefully
    tokio::select! {
        _ = observer.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    info!("Observer stopped");
    Ok(())
}
