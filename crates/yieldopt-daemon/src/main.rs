//! yieldopt-daemon: serves one auto-compounding vault deployment.
//!
//! Single OS process running a Tokio async runtime. Clients talk to the
//! daemon via JSON-RPC over a Unix socket; an optional keeper task calls
//! `compound` on a fixed interval.

mod commands;
mod config;
mod events;
mod keeper;
mod rpc;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use yieldopt_staking::{Clock, FixedRateEmission, SystemClock};
use yieldopt_types::AccountId;
use yieldopt_vault::YieldOptimizer;

use crate::config::DaemonConfig;
use crate::events::{Event, EventBus};
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Configuration.
    pub config: DaemonConfig,
    /// The vault deployment.
    pub optimizer: YieldOptimizer,
    /// Deployer account; funds the faucet.
    pub deployer: AccountId,
    /// Account the keeper task compounds as.
    pub keeper: AccountId,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    /// Deploy a fresh vault from `config`.
    pub fn new(config: DaemonConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let params = config.bootstrap_params()?;
        let mut emission = FixedRateEmission::new(u128::from(config.staking.reward_per_second));
        if let Some(ends_at) = config.staking.emission_ends_at {
            emission = emission.until(ends_at);
        }
        let deployer = config.deployer();
        let optimizer = yieldopt_vault::bootstrap(deployer, &params, Box::new(emission), clock)?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            deployer,
            keeper: config.keeper(),
            event_bus: EventBus::new(config.advanced.event_buffer),
            optimizer,
            config,
            shutdown_tx,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing
    let directive = format!("yieldopt={}", config.advanced.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    info!("yieldopt daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 3. Deploy the vault
    let state = Arc::new(DaemonState::new(config, Arc::new(SystemClock))?);
    info!(
        vault = %state.optimizer.vault_identity()?,
        deployer = %state.deployer,
        "vault deployed"
    );

    // 4. Log events at debug level
    let mut events = state.event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(event_type = %event.event_type, payload = %event.payload, "event");
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event log subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // 5. Start keeper
    let interval = state.config.keeper.compound_interval_secs;
    if interval > 0 {
        tokio::spawn(keeper::run(state.clone(), Duration::from_secs(interval)));
    }

    // 6. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!("Starting JSON-RPC server on {:?}", socket_path);

    state.event_bus.emit(Event::now(
        "DaemonStarted",
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        }),
    ));

    // 7. Run the RPC server until shutdown
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!(events = state.event_bus.sequence(), "Daemon stopped");
    Ok(())
}
