//! SFC devnet node
//!
//! Owns the ledger and the driver token. Every `epoch_interval_secs` it
//! seals the open epoch with synthetic metrics (full uptime for the open
//! set, `gas_per_second` of gas) and fixes the next set from the validators
//! still active. The ledger is persisted after every commit.

use crate::config::NodeConfig;
use crate::genesis::GenesisFile;
use crate::metrics::{LedgerMetrics, MetricsServer};

use anyhow::Context;
use parking_lot::RwLock;
use sfc_core::{decimal, Timestamp, ValidatorId};
use sfc_staking::{
    DriverSignal, DriverToken, NodeDriverAuth, SealPhase, SealReport, Sfc, SfcConfig,
    ValidatorMetrics,
};
use sfc_storage::LedgerStore;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

/// Node state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Node is starting up
    Starting,
    /// Node is sealing epochs
    Running,
    /// Node is shutting down
    Stopping,
    /// Node has stopped
    Stopped,
}

/// Current Unix time in seconds
pub fn unix_now() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// SFC devnet node
pub struct SfcNode {
    config: NodeConfig,
    data_dir: PathBuf,
    state: Arc<RwLock<NodeState>>,
    sfc: Sfc,
    token: DriverToken,
    store: LedgerStore,
    metrics: LedgerMetrics,
    /// Consensus weights as last signalled by the ledger
    weights: BTreeMap<ValidatorId, u128>,
    min_gas_price: u128,
}

impl SfcNode {
    /// Open the ledger under the configured data directory, creating it
    /// from `genesis` when nothing is stored yet
    pub fn open(config: NodeConfig, genesis: Option<&GenesisFile>) -> anyhow::Result<Self> {
        let data_dir = PathBuf::from(&config.node.data_dir);
        let store = LedgerStore::open(data_dir.join("ledger"))?;

        let (sfc, token) = match store.load()? {
            Some(stored) => {
                let token = store
                    .load_driver_token()?
                    .context("ledger found but the driver key is missing")?;
                let authority = NodeDriverAuth::for_token(&token);
                let sfc = Sfc::restore(stored.state, stored.snapshots, Box::new(authority))?;
                tracing::info!(
                    sealed_epoch = sfc.current_sealed_epoch(),
                    "Resuming stored ledger"
                );
                (sfc, token)
            }
            None => {
                let genesis = genesis.context("no stored ledger; a genesis file is required")?;
                let (authority, token) = NodeDriverAuth::issue();
                let sfc_config = SfcConfig {
                    owner: genesis.owner()?,
                    accrual: config.node.accrual,
                    constants: config.economics.constants()?,
                    genesis_time: genesis.genesis_time,
                };
                let mut sfc = Sfc::new(sfc_config, Box::new(authority));
                let active = genesis.apply(&mut sfc, &token)?;
                sfc.seal_epoch_validators(&token, &active, genesis.genesis_time)?;
                store.save_driver_token(&token)?;
                tracing::info!(
                    accrual = ?config.node.accrual,
                    validators = active.len(),
                    "Created ledger from genesis"
                );
                (sfc, token)
            }
        };

        let weights = sfc
            .state()
            .ledger
            .validators
            .values()
            .map(|v| (v.id, v.weight()))
            .filter(|(_, w)| *w != 0)
            .collect();
        let min_gas_price = sfc.min_gas_price();

        let mut node = Self {
            config,
            data_dir,
            state: Arc::new(RwLock::new(NodeState::Starting)),
            sfc,
            token,
            store,
            metrics: LedgerMetrics::new()?,
            weights,
            min_gas_price,
        };

        // a crash between the two seal steps leaves the next set unfixed
        if node.sfc.phase() == SealPhase::AwaitingValidators {
            tracing::warn!("Ledger awaiting validator set; fixing it now");
            let next = node.active_validator_ids();
            let now = node.sfc.snapshots().latest().end_time;
            node.sfc.seal_epoch_validators(&node.token, &next, now)?;
        }
        node.commit()?;
        Ok(node)
    }

    /// Get current state
    pub fn state(&self) -> NodeState {
        self.state.read().clone()
    }

    pub fn ledger(&self) -> &Sfc {
        &self.sfc
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Weights of validators the consensus layer should include
    pub fn validator_weights(&self) -> &BTreeMap<ValidatorId, u128> {
        &self.weights
    }

    pub fn min_gas_price(&self) -> u128 {
        self.min_gas_price
    }

    fn active_validator_ids(&self) -> Vec<ValidatorId> {
        self.sfc
            .state()
            .ledger
            .validators
            .values()
            .filter(|v| v.is_active())
            .map(|v| v.id)
            .collect()
    }

    /// Apply drained signals, persist and refresh metrics
    fn commit(&mut self) -> anyhow::Result<()> {
        for signal in self.sfc.drain_signals() {
            match signal {
                DriverSignal::ValidatorWeight {
                    validator_id,
                    weight,
                } => {
                    tracing::debug!(validator_id, weight = %decimal::format_tokens(weight), "weight update");
                    if weight == 0 {
                        self.weights.remove(&validator_id);
                    } else {
                        self.weights.insert(validator_id, weight);
                    }
                }
                DriverSignal::MinGasPrice(price) => {
                    tracing::debug!(price, "min gas price update");
                    self.min_gas_price = price;
                }
            }
        }
        self.store.save(&self.sfc)?;
        self.metrics.observe(&self.sfc);
        Ok(())
    }

    /// Seal the open epoch at `now` and open the next one
    pub fn seal_at(&mut self, now: Timestamp) -> anyhow::Result<SealReport> {
        let previous_end = self.sfc.snapshots().latest().end_time;
        let now = now.max(previous_end);
        let duration = now - previous_end;

        let metrics: Vec<ValidatorMetrics> = self
            .sfc
            .open_epoch()
            .validator_ids
            .iter()
            .map(|&id| ValidatorMetrics {
                originated_fee: self.config.devnet.fee_per_validator,
                ..ValidatorMetrics::online(id, duration)
            })
            .collect();
        let gas_used = self.config.devnet.gas_per_second.saturating_mul(duration);

        let report = self.sfc.seal_epoch(&self.token, &metrics, gas_used, now)?;
        let next = self.active_validator_ids();
        self.sfc.seal_epoch_validators(&self.token, &next, now)?;
        self.commit()?;

        tracing::info!(
            epoch = report.epoch,
            duration = report.duration,
            reward = %decimal::format_tokens(report.total_reward),
            min_gas_price = report.min_gas_price,
            next_validators = next.len(),
            "Epoch sealed"
        );
        Ok(report)
    }

    /// Run the node until Ctrl+C
    pub async fn run(&mut self) -> anyhow::Result<()> {
        tracing::info!("Starting SFC node {}", self.config.node.name);

        let metrics_handle = if self.config.metrics.enabled {
            let server = MetricsServer::new(&self.config.metrics, &self.metrics)?;
            Some(tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    tracing::error!("Metrics server error: {}", e);
                }
            }))
        } else {
            None
        };

        *self.state.write() = NodeState::Running;
        self.print_startup_banner();

        let mut ticker = tokio::time::interval(self.config.devnet.epoch_interval());
        // first tick completes immediately
        ticker.tick().await;

        let shutdown = wait_for_shutdown();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.seal_at(unix_now()) {
                        tracing::error!("Seal failed: {:#}", e);
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        *self.state.write() = NodeState::Stopping;
        tracing::info!("Shutting down...");

        if let Some(handle) = metrics_handle {
            handle.abort();
        }
        self.store.save(&self.sfc)?;

        *self.state.write() = NodeState::Stopped;
        tracing::info!("Node stopped");
        Ok(())
    }

    fn print_startup_banner(&self) {
        tracing::info!("Data dir: {}", self.data_dir.display());
        tracing::info!("Accrual: {:?}", self.sfc.accrual_version());
        tracing::info!("Sealed epoch: {}", self.sfc.current_sealed_epoch());
        tracing::info!("Active validators: {}", self.weights.len());
        tracing::info!(
            "Epoch interval: {}s",
            self.config.devnet.epoch_interval().as_secs()
        );
        if self.config.metrics.enabled {
            tracing::info!("Metrics: http://{}/metrics", self.config.metrics.address);
        }
        tracing::info!("Press Ctrl+C to stop the node");
    }
}

/// Wait for shutdown signal
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
