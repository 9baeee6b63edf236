use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::DEFAULT_RETRY_BUDGET;
use crate::error::{TpccError, TpccResult};
use crate::kind::TransactionKind;

/// Largest node-partitioning factor the driver accepts.
pub const MAX_NODE_COUNT: u32 = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sla: SlaConfig,
    #[serde(default)]
    pub mix: MixConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> TpccResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Reject option combinations the run cannot honour.
    pub fn validate(&self) -> TpccResult<()> {
        let run = &self.run;
        if run.warehouses == 0 {
            return Err(TpccError::invalid_config("warehouses must be at least 1"));
        }
        if run.connections == 0 {
            return Err(TpccError::invalid_config("connections must be at least 1"));
        }
        if run.retry_budget == 0 {
            return Err(TpccError::invalid_config("retry_budget must be at least 1"));
        }
        if run.report_interval_ms == 0 {
            return Err(TpccError::invalid_config("report_interval_ms must be positive"));
        }
        if run.measure_ms < run.report_interval_ms {
            return Err(TpccError::invalid_config(format!(
                "measure_ms ({}) is shorter than one report interval ({})",
                run.measure_ms, run.report_interval_ms
            )));
        }
        if run.node_count > MAX_NODE_COUNT {
            return Err(TpccError::invalid_config(format!(
                "node_count must not exceed {MAX_NODE_COUNT}"
            )));
        }
        if run.node_count > 0 {
            if run.warehouses % run.node_count != 0 {
                return Err(TpccError::invalid_config(
                    "warehouses must be divisible by node_count",
                ));
            }
            if run.connections % run.node_count != 0 {
                return Err(TpccError::invalid_config(
                    "connections must be divisible by node_count",
                ));
            }
        }
        if self.mix.weights().iter().all(|w| *w == 0) {
            return Err(TpccError::invalid_config(
                "transaction mix needs at least one positive weight",
            ));
        }
        for kind in TransactionKind::ALL {
            if self.sla.limit_ms(kind) == 0 {
                return Err(TpccError::invalid_config(format!(
                    "response time limit for {kind} must be positive"
                )));
            }
        }
        Ok(())
    }

    /// Number of checkpoint intervals that make up the measured window.
    pub fn measured_intervals(&self) -> u64 {
        self.run.measure_ms / self.run.report_interval_ms.max(1)
    }

    /// Length of the measured window actually covered by checkpoints.
    pub fn measured_duration(&self) -> Duration {
        Duration::from_millis(self.measured_intervals() * self.run.report_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub warehouses: u32,
    /// One worker (and one store session) per connection.
    pub connections: u32,
    pub rampup_ms: u64,
    pub measure_ms: u64,
    pub report_interval_ms: u64,
    /// Dispatch cycles each worker runs before it stops on its own.
    pub transactions_per_worker: u64,
    /// Node-partitioning factor; 0 disables warehouse partitioning.
    pub node_count: u32,
    /// Attempts allowed per logical transaction.
    pub retry_budget: u32,
    /// Seed for the run; drawn from entropy when absent.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            warehouses: 1,
            connections: 10,
            rampup_ms: 5_000,
            measure_ms: 20_000,
            report_interval_ms: 5_000,
            transactions_per_worker: 10_000,
            node_count: 0,
            retry_budget: DEFAULT_RETRY_BUDGET,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file holding a loaded TPC-C schema.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub wal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 1_000,
            wal: true,
        }
    }
}

/// Response time limits in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaConfig {
    pub new_order_ms: u64,
    pub payment_ms: u64,
    pub order_status_ms: u64,
    pub delivery_ms: u64,
    pub stock_level_ms: u64,
}

impl SlaConfig {
    pub fn limit_ms(&self, kind: TransactionKind) -> u64 {
        match kind {
            TransactionKind::NewOrder => self.new_order_ms,
            TransactionKind::Payment => self.payment_ms,
            TransactionKind::OrderStatus => self.order_status_ms,
            TransactionKind::Delivery => self.delivery_ms,
            TransactionKind::StockLevel => self.stock_level_ms,
        }
    }

    pub fn set_limit_ms(&mut self, kind: TransactionKind, limit_ms: u64) {
        let slot = match kind {
            TransactionKind::NewOrder => &mut self.new_order_ms,
            TransactionKind::Payment => &mut self.payment_ms,
            TransactionKind::OrderStatus => &mut self.order_status_ms,
            TransactionKind::Delivery => &mut self.delivery_ms,
            TransactionKind::StockLevel => &mut self.stock_level_ms,
        };
        *slot = limit_ms;
    }

    pub fn uniform(limit_ms: u64) -> Self {
        Self {
            new_order_ms: limit_ms,
            payment_ms: limit_ms,
            order_status_ms: limit_ms,
            delivery_ms: limit_ms,
            stock_level_ms: limit_ms,
        }
    }
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            new_order_ms: TransactionKind::NewOrder.default_sla_ms(),
            payment_ms: TransactionKind::Payment.default_sla_ms(),
            order_status_ms: TransactionKind::OrderStatus.default_sla_ms(),
            delivery_ms: TransactionKind::Delivery.default_sla_ms(),
            stock_level_ms: TransactionKind::StockLevel.default_sla_ms(),
        }
    }
}

/// Relative weights of the transaction mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub new_order: u32,
    pub payment: u32,
    pub order_status: u32,
    pub delivery: u32,
    pub stock_level: u32,
}

impl MixConfig {
    pub fn weights(&self) -> [u32; TransactionKind::COUNT] {
        [
            self.new_order,
            self.payment,
            self.order_status,
            self.delivery,
            self.stock_level,
        ]
    }

    pub fn from_weights(weights: [u32; TransactionKind::COUNT]) -> Self {
        Self {
            new_order: weights[0],
            payment: weights[1],
            order_status: weights[2],
            delivery: weights[3],
            stock_level: weights[4],
        }
    }

    /// Parse a `a:b:c:d:e` ratio string.
    pub fn parse_ratio(s: &str) -> TpccResult<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != TransactionKind::COUNT {
            return Err(TpccError::invalid_config(format!(
                "mix ratio needs {} fields, got {s:?}",
                TransactionKind::COUNT
            )));
        }
        let mut weights = [0u32; TransactionKind::COUNT];
        for (slot, part) in weights.iter_mut().zip(parts) {
            *slot = part.trim().parse().map_err(|_| {
                TpccError::invalid_config(format!("mix weight {part:?} is not a non-negative integer"))
            })?;
        }
        Ok(Self::from_weights(weights))
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self::from_weights(TransactionKind::ALL.map(TransactionKind::default_weight))
    }
}
