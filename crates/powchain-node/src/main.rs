mod constants;
mod routes;
mod transport;

use clap::Parser;
use constants::{DEFAULT_PORT, PEER_REQUEST_TIMEOUT_SECS};
use powchain_core::constants::{
    BLOCKCHAIN_PORT_RANGE_END, BLOCKCHAIN_PORT_RANGE_START, MAX_MINING_DIFFICULTY,
    MINING_DIFFICULTY, MINING_TIMER_SECS, NEIGHBOR_IP_RANGE_END, NEIGHBOR_IP_RANGE_START,
    NEIGHBOR_SYNC_SECS,
};
use powchain_core::{Ledger, LedgerConfig, NeighborConfig, Wallet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use routes::SharedLedger;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use transport::HttpTransport;

#[derive(Parser, Debug)]
#[command(version, about = "Proof-of-work ledger node")]
struct Args {
    /// Port to serve on. Also identifies this node when scanning for neighbors.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    listen: IpAddr,

    /// Base host for neighbor discovery; its last octet is offset by the ip range
    #[arg(long, default_value = "127.0.0.1")]
    neighbor_host: Ipv4Addr,

    #[arg(long, default_value_t = NEIGHBOR_IP_RANGE_START)]
    ip_range_start: u8,

    #[arg(long, default_value_t = NEIGHBOR_IP_RANGE_END)]
    ip_range_end: u8,

    #[arg(long, default_value_t = BLOCKCHAIN_PORT_RANGE_START)]
    port_range_start: u16,

    #[arg(long, default_value_t = BLOCKCHAIN_PORT_RANGE_END)]
    port_range_end: u16,

    /// Leading zero hex digits required of a block
    #[arg(
        long,
        default_value_t = MINING_DIFFICULTY,
        value_parser = clap::value_parser!(u32).range(0..=MAX_MINING_DIFFICULTY as i64)
    )]
    difficulty: u32,

    #[arg(long, default_value_t = MINING_TIMER_SECS)]
    mining_interval_secs: u64,

    #[arg(long, default_value_t = NEIGHBOR_SYNC_SECS)]
    sync_interval_secs: u64,

    /// Hex private key of the wallet receiving rewards. A fresh one is generated if absent.
    #[arg(long, env = "POWCHAIN_MINER_KEY")]
    miner_private_key: Option<String>,

    /// Serve and sync, but do not start the mining loop
    #[arg(long)]
    no_mine: bool,

    /// Search nonces on a single thread
    #[arg(long)]
    sequential: bool,
}

impl Args {
    fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            difficulty: self.difficulty,
            mining_interval: Duration::from_secs(self.mining_interval_secs),
            parallel_mining: !self.sequential,
            neighbors: NeighborConfig {
                host: self.neighbor_host,
                ip_range: self.ip_range_start..=self.ip_range_end,
                port_range: self.port_range_start..=self.port_range_end,
                sync_interval: Duration::from_secs(self.sync_interval_secs),
                ..NeighborConfig::default()
            },
            ..LedgerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let wallet = match &args.miner_private_key {
        Some(key) => Wallet::from_private_key_hex(key)?,
        None => {
            warn!("no miner key given; rewards go to a throwaway wallet");
            Wallet::generate()
        }
    };
    info!(address = wallet.address(), public_key = %wallet.public_key_hex(), "miner wallet");

    let transport = HttpTransport::new(Duration::from_secs(PEER_REQUEST_TIMEOUT_SECS))?;
    let ledger = Arc::new(Ledger::new(
        wallet.address(),
        args.port,
        args.ledger_config(),
        transport,
    ));

    let addr = SocketAddr::new(args.listen, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("powchain-node listening on http://{addr}");

    // Neighbors may be waiting on our own routes, so serve while booting.
    let boot = spawn_boot(ledger.clone(), !args.no_mine);
    axum::serve(listener, routes::router(ledger.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    boot.abort();
    let _ = boot.await;
    ledger.shutdown().await;
    info!("powchain-node stopped");
    Ok(())
}

/// Initial neighbor sync and reconciliation, then the recurring tasks.
fn spawn_boot(ledger: SharedLedger, mine: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        if mine {
            ledger.run().await;
        } else {
            ledger.sync_neighbors().await;
            ledger.resolve_conflicts().await;
            ledger.start_sync().await;
        }
        info!(mining = mine, "boot complete");
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
}
