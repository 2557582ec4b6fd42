//! Prometheus metrics server

use crate::config::MetricsConfig;
use prometheus::{Encoder, Gauge, IntGauge, Registry, TextEncoder};
use sfc_core::UNIT;
use sfc_staking::Sfc;
use std::io::Write;
use std::net::SocketAddr;

fn tokens(amount: u128) -> f64 {
    amount as f64 / UNIT as f64
}

/// Ledger gauges, refreshed after every commit
#[derive(Clone)]
pub struct LedgerMetrics {
    registry: Registry,
    sealed_epoch: IntGauge,
    min_gas_price: Gauge,
    active_validators: IntGauge,
    total_stake: Gauge,
    total_active_stake: Gauge,
    rewards_paid: Gauge,
    burnt: Gauge,
    treasury: Gauge,
}

impl LedgerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let sealed_epoch = IntGauge::new("sfc_sealed_epoch", "Last sealed epoch")?;
        let min_gas_price = Gauge::new("sfc_min_gas_price_wei", "Minimum gas price")?;
        let active_validators =
            IntGauge::new("sfc_active_validators", "Validators with OK status")?;
        let total_stake = Gauge::new("sfc_total_stake_tokens", "Stake on every validator")?;
        let total_active_stake =
            Gauge::new("sfc_total_active_stake_tokens", "Stake on active validators")?;
        let rewards_paid = Gauge::new("sfc_rewards_paid_tokens", "Rewards claimed or restaked")?;
        let burnt = Gauge::new("sfc_burnt_tokens", "Penalties and burnt fees")?;
        let treasury = Gauge::new("sfc_treasury_tokens", "Treasury share of fees")?;

        registry.register(Box::new(sealed_epoch.clone()))?;
        registry.register(Box::new(min_gas_price.clone()))?;
        registry.register(Box::new(active_validators.clone()))?;
        registry.register(Box::new(total_stake.clone()))?;
        registry.register(Box::new(total_active_stake.clone()))?;
        registry.register(Box::new(rewards_paid.clone()))?;
        registry.register(Box::new(burnt.clone()))?;
        registry.register(Box::new(treasury.clone()))?;

        Ok(Self {
            registry,
            sealed_epoch,
            min_gas_price,
            active_validators,
            total_stake,
            total_active_stake,
            rewards_paid,
            burnt,
            treasury,
        })
    }

    /// Refresh every gauge from the ledger
    pub fn observe(&self, sfc: &Sfc) {
        let accounting = sfc.accounting();
        let active = sfc
            .state()
            .ledger
            .validators
            .values()
            .filter(|v| v.is_active())
            .count();

        self.sealed_epoch.set(sfc.current_sealed_epoch() as i64);
        self.min_gas_price.set(sfc.min_gas_price() as f64);
        self.active_validators.set(active as i64);
        self.total_stake.set(tokens(accounting.total_stake));
        self.total_active_stake.set(tokens(accounting.total_active_stake));
        self.rewards_paid.set(tokens(accounting.total_rewards_paid));
        self.burnt.set(tokens(accounting.total_burnt));
        self.treasury.set(tokens(accounting.treasury));
    }

    /// Text exposition of the registry
    pub fn render(&self) -> anyhow::Result<String> {
        encode(&self.registry)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn encode(registry: &Registry) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// HTTP response for a raw request
fn respond(request: &str, registry: &Registry) -> String {
    if request.starts_with("GET /metrics") {
        match encode(registry) {
            Ok(body) => format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            ),
            Err(e) => {
                tracing::error!("Metrics encoding failed: {}", e);
                "HTTP/1.1 500 Internal Server Error\r\n\r\n".to_string()
            }
        }
    } else if request.starts_with("GET /health") {
        let body = "{\"status\":\"healthy\"}";
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    } else {
        "HTTP/1.1 404 Not Found\r\n\r\n".to_string()
    }
}

/// Metrics server
pub struct MetricsServer {
    addr: SocketAddr,
    registry: Registry,
}

impl MetricsServer {
    pub fn new(config: &MetricsConfig, metrics: &LedgerMetrics) -> anyhow::Result<Self> {
        Ok(Self {
            addr: config.address.parse()?,
            registry: metrics.registry().clone(),
        })
    }

    /// Run the metrics server
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!("Starting metrics server on {}", self.addr);

        let listener = std::net::TcpListener::bind(self.addr)?;
        listener.set_nonblocking(true)?;

        loop {
            match listener.accept() {
                Ok((mut stream, _)) => {
                    let registry = self.registry.clone();

                    tokio::task::spawn_blocking(move || {
                        // accepted sockets inherit nonblocking mode on some platforms
                        let _ = stream.set_nonblocking(false);
                        let mut buf = [0u8; 1024];
                        if let Ok(n) = std::io::Read::read(&mut stream, &mut buf) {
                            let request = String::from_utf8_lossy(&buf[..n]);
                            let response = respond(&request, &registry);
                            let _ = stream.write_all(response.as_bytes());
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }
}
