use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TpccError;

/// The five TPC-C transaction types. The discriminant is the array index used
/// by every per-kind table in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    NewOrder = 0,
    Payment = 1,
    OrderStatus = 2,
    Delivery = 3,
    StockLevel = 4,
}

impl TransactionKind {
    pub const COUNT: usize = 5;

    pub const ALL: [TransactionKind; Self::COUNT] = [
        TransactionKind::NewOrder,
        TransactionKind::Payment,
        TransactionKind::OrderStatus,
        TransactionKind::Delivery,
        TransactionKind::StockLevel,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            TransactionKind::NewOrder => "New-Order",
            TransactionKind::Payment => "Payment",
            TransactionKind::OrderStatus => "Order-Status",
            TransactionKind::Delivery => "Delivery",
            TransactionKind::StockLevel => "Stock-Level",
        }
    }

    /// Response time limit in milliseconds used when no override is configured.
    pub const fn default_sla_ms(self) -> u64 {
        match self {
            TransactionKind::NewOrder => 5,
            TransactionKind::Payment => 5,
            TransactionKind::OrderStatus => 5,
            TransactionKind::Delivery => 80,
            TransactionKind::StockLevel => 20,
        }
    }

    pub const fn default_weight(self) -> u32 {
        match self {
            TransactionKind::NewOrder | TransactionKind::Payment => 10,
            _ => 1,
        }
    }

    /// Minimum share of completed transactions (percent) required by TPC-C.
    /// New-Order has no lower bound of its own.
    pub const fn minimum_mix_pct(self) -> Option<f64> {
        match self {
            TransactionKind::NewOrder => None,
            TransactionKind::Payment => Some(43.0),
            TransactionKind::OrderStatus
            | TransactionKind::Delivery
            | TransactionKind::StockLevel => Some(4.0),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransactionKind {
    type Err = TpccError;

    /// Accepts the snake_case name, the display name or the ordinal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "0" | "new_order" | "neword" => TransactionKind::NewOrder,
            "1" | "payment" => TransactionKind::Payment,
            "2" | "order_status" | "ordstat" => TransactionKind::OrderStatus,
            "3" | "delivery" => TransactionKind::Delivery,
            "4" | "stock_level" | "slev" => TransactionKind::StockLevel,
            _ => {
                return Err(TpccError::InvalidConfig(format!(
                    "unknown transaction kind: {s}"
                )))
            }
        };
        Ok(kind)
    }
}
