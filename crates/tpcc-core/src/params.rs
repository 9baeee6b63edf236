//! Input parameter synthesis for the five transaction kinds.

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::kind::TransactionKind;
use crate::random::{lastname, TpccRng};

pub const DISTRICTS_PER_WAREHOUSE: u32 = 10;
pub const CUSTOMERS_PER_DISTRICT: u32 = 3_000;
pub const MAX_ITEMS: u32 = 100_000;
pub const MIN_ORDER_LINES: u32 = 5;
pub const MAX_ORDER_LINES: u32 = 15;
/// Item id outside the loaded range, used to force a New-Order rollback.
pub const UNUSED_ITEM_ID: u32 = MAX_ITEMS + 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerSelector {
    ById(u32),
    ByLastName(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineInput {
    pub item_id: u32,
    pub supply_warehouse_id: u32,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderParams {
    pub warehouse_id: u32,
    pub district_id: u32,
    pub customer_id: u32,
    pub lines: Vec<OrderLineInput>,
    pub all_local: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentParams {
    pub warehouse_id: u32,
    pub district_id: u32,
    pub customer_warehouse_id: u32,
    pub customer_district_id: u32,
    pub customer: CustomerSelector,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusParams {
    pub warehouse_id: u32,
    pub district_id: u32,
    pub customer: CustomerSelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryParams {
    pub warehouse_id: u32,
    pub carrier_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevelParams {
    pub warehouse_id: u32,
    pub district_id: u32,
    pub threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionParams {
    NewOrder(NewOrderParams),
    Payment(PaymentParams),
    OrderStatus(OrderStatusParams),
    Delivery(DeliveryParams),
    StockLevel(StockLevelParams),
}

impl TransactionParams {
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionParams::NewOrder(_) => TransactionKind::NewOrder,
            TransactionParams::Payment(_) => TransactionKind::Payment,
            TransactionParams::OrderStatus(_) => TransactionKind::OrderStatus,
            TransactionParams::Delivery(_) => TransactionKind::Delivery,
            TransactionParams::StockLevel(_) => TransactionKind::StockLevel,
        }
    }
}

/// Draws TPC-C inputs for a given worker.
#[derive(Debug, Clone, Copy)]
pub struct ParamGenerator {
    warehouses: u32,
    connections: u32,
    node_count: u32,
}

impl ParamGenerator {
    pub fn new(warehouses: u32, connections: u32, node_count: u32) -> Self {
        Self {
            warehouses: warehouses.max(1),
            connections: connections.max(1),
            node_count,
        }
    }

    pub fn from_config(run: &RunConfig) -> Self {
        Self::new(run.warehouses, run.connections, run.node_count)
    }

    /// Home warehouse of `worker`. With node partitioning each worker only
    /// draws from the warehouse slice of the node it is assigned to.
    pub fn home_warehouse(&self, worker: usize, rng: &mut TpccRng) -> u32 {
        if self.node_count == 0 {
            return rng.uniform(1, self.warehouses);
        }
        let node = (u64::from(self.node_count) * worker as u64 / u64::from(self.connections)) as u32;
        let low = 1 + self.warehouses * node / self.node_count;
        let high = self.warehouses * (node + 1) / self.node_count;
        rng.uniform(low, high)
    }

    /// A warehouse other than `home`; `home` itself only when it is the only one.
    pub fn other_warehouse(&self, home: u32, rng: &mut TpccRng) -> u32 {
        if self.warehouses == 1 {
            return home;
        }
        loop {
            let candidate = rng.uniform(1, self.warehouses);
            if candidate != home {
                return candidate;
            }
        }
    }

    /// Supplying warehouse of one order line: home 99% of the time.
    pub fn supplying_warehouse(&self, home: u32, rng: &mut TpccRng) -> u32 {
        if rng.uniform(1, 100) != 1 {
            home
        } else {
            self.other_warehouse(home, rng)
        }
    }

    pub fn synthesize(
        &self,
        kind: TransactionKind,
        worker: usize,
        rng: &mut TpccRng,
    ) -> TransactionParams {
        match kind {
            TransactionKind::NewOrder => TransactionParams::NewOrder(self.new_order(worker, rng)),
            TransactionKind::Payment => TransactionParams::Payment(self.payment(worker, rng)),
            TransactionKind::OrderStatus => {
                TransactionParams::OrderStatus(self.order_status(worker, rng))
            }
            TransactionKind::Delivery => TransactionParams::Delivery(self.delivery(worker, rng)),
            TransactionKind::StockLevel => {
                TransactionParams::StockLevel(self.stock_level(worker, rng))
            }
        }
    }

    fn new_order(&self, worker: usize, rng: &mut TpccRng) -> NewOrderParams {
        let warehouse_id = self.home_warehouse(worker, rng);
        let district_id = rng.uniform(1, DISTRICTS_PER_WAREHOUSE);
        let customer_id = rng.nurand(1023, 1, CUSTOMERS_PER_DISTRICT);
        let line_count = rng.uniform(MIN_ORDER_LINES, MAX_ORDER_LINES);
        let rollback = rng.uniform(1, 100) == 1;

        let mut all_local = true;
        let lines = (0..line_count)
            .map(|i| {
                let mut item_id = rng.nurand(8191, 1, MAX_ITEMS);
                if rollback && i == line_count - 1 {
                    item_id = UNUSED_ITEM_ID;
                }
                let supply_warehouse_id = self.supplying_warehouse(warehouse_id, rng);
                if supply_warehouse_id != warehouse_id {
                    all_local = false;
                }
                OrderLineInput {
                    item_id,
                    supply_warehouse_id,
                    quantity: rng.uniform(1, 10),
                }
            })
            .collect();

        NewOrderParams {
            warehouse_id,
            district_id,
            customer_id,
            lines,
            all_local,
        }
    }

    fn customer_selector(&self, rng: &mut TpccRng) -> CustomerSelector {
        let customer_id = rng.nurand(1023, 1, CUSTOMERS_PER_DISTRICT);
        let last = lastname(rng.nurand(255, 0, 999));
        if rng.uniform(1, 100) <= 60 {
            CustomerSelector::ByLastName(last)
        } else {
            CustomerSelector::ById(customer_id)
        }
    }

    fn payment(&self, worker: usize, rng: &mut TpccRng) -> PaymentParams {
        let warehouse_id = self.home_warehouse(worker, rng);
        let district_id = rng.uniform(1, DISTRICTS_PER_WAREHOUSE);
        let customer = self.customer_selector(rng);
        let amount = rng.uniform(1, 5_000);
        let (customer_warehouse_id, customer_district_id) = if rng.uniform(1, 100) <= 85 {
            (warehouse_id, district_id)
        } else {
            (
                self.other_warehouse(warehouse_id, rng),
                rng.uniform(1, DISTRICTS_PER_WAREHOUSE),
            )
        };

        PaymentParams {
            warehouse_id,
            district_id,
            customer_warehouse_id,
            customer_district_id,
            customer,
            amount,
        }
    }

    fn order_status(&self, worker: usize, rng: &mut TpccRng) -> OrderStatusParams {
        let warehouse_id = self.home_warehouse(worker, rng);
        let district_id = rng.uniform(1, DISTRICTS_PER_WAREHOUSE);
        OrderStatusParams {
            warehouse_id,
            district_id,
            customer: self.customer_selector(rng),
        }
    }

    fn delivery(&self, worker: usize, rng: &mut TpccRng) -> DeliveryParams {
        DeliveryParams {
            warehouse_id: self.home_warehouse(worker, rng),
            carrier_id: rng.uniform(1, 10),
        }
    }

    fn stock_level(&self, worker: usize, rng: &mut TpccRng) -> StockLevelParams {
        let warehouse_id = self.home_warehouse(worker, rng);
        StockLevelParams {
            warehouse_id,
            district_id: rng.uniform(1, DISTRICTS_PER_WAREHOUSE),
            threshold: rng.uniform(10, 20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::NurandConstants;

    fn rng(seed: u64) -> TpccRng {
        TpccRng::new(
            seed,
            NurandConstants {
                c_last: 123,
                c_id: 456,
                ol_i_id: 789,
            },
        )
    }

    #[test]
    fn test_supplying_warehouse_locality() {
        let gen = ParamGenerator::new(10, 10, 0);
        let mut rng = rng(1);
        let draws = 200_000;
        let mut remote = 0u32;
        for _ in 0..draws {
            let home = rng.uniform(1, 10);
            if gen.supplying_warehouse(home, &mut rng) != home {
                remote += 1;
            }
        }
        let pct = 100.0 * f64::from(remote) / f64::from(draws);
        assert!((0.8..=1.2).contains(&pct), "remote share = {pct}%");
    }

    #[test]
    fn test_other_warehouse_never_home() {
        let gen = ParamGenerator::new(3, 1, 0);
        let mut rng = rng(2);
        for _ in 0..10_000 {
            let home = rng.uniform(1, 3);
            let other = gen.other_warehouse(home, &mut rng);
            assert_ne!(other, home);
            assert!((1..=3).contains(&other));
        }
    }

    #[test]
    fn test_single_warehouse_stays_local() {
        let gen = ParamGenerator::new(1, 4, 0);
        let mut rng = rng(3);
        for _ in 0..2_000 {
            match gen.synthesize(TransactionKind::NewOrder, 0, &mut rng) {
                TransactionParams::NewOrder(p) => {
                    assert!(p.all_local);
                    assert!(p.lines.iter().all(|l| l.supply_warehouse_id == 1));
                }
                other => panic!("unexpected params {other:?}"),
            }
        }
    }

    #[test]
    fn test_partitioned_home_warehouse() {
        // 8 warehouses, 4 connections, 2 nodes: workers 0-1 -> 1..=4, 2-3 -> 5..=8
        let gen = ParamGenerator::new(8, 4, 2);
        let mut rng = rng(4);
        for _ in 0..1_000 {
            assert!((1..=4).contains(&gen.home_warehouse(1, &mut rng)));
            assert!((5..=8).contains(&gen.home_warehouse(2, &mut rng)));
        }
    }

    #[test]
    fn test_new_order_shape() {
        let gen = ParamGenerator::new(5, 1, 0);
        let mut rng = rng(5);
        let mut rollbacks = 0;
        for _ in 0..5_000 {
            let TransactionParams::NewOrder(p) = gen.synthesize(TransactionKind::NewOrder, 0, &mut rng)
            else {
                panic!("wrong kind");
            };
            assert!((MIN_ORDER_LINES as usize..=MAX_ORDER_LINES as usize).contains(&p.lines.len()));
            assert!((1..=DISTRICTS_PER_WAREHOUSE).contains(&p.district_id));
            assert!((1..=CUSTOMERS_PER_DISTRICT).contains(&p.customer_id));
            let remote = p.lines.iter().any(|l| l.supply_warehouse_id != p.warehouse_id);
            assert_eq!(p.all_local, !remote);
            for (i, line) in p.lines.iter().enumerate() {
                assert!((1..=10).contains(&line.quantity));
                if line.item_id == UNUSED_ITEM_ID {
                    assert_eq!(i, p.lines.len() - 1);
                    rollbacks += 1;
                }
            }
        }
        assert!(rollbacks > 0);
    }

    #[test]
    fn test_synthesize_matches_kind() {
        let gen = ParamGenerator::new(2, 2, 0);
        let mut rng = rng(6);
        for kind in TransactionKind::ALL {
            assert_eq!(gen.synthesize(kind, 1, &mut rng).kind(), kind);
        }
    }

    #[test]
    fn test_payment_remote_customer_share() {
        let gen = ParamGenerator::new(4, 1, 0);
        let mut rng = rng(7);
        let mut remote = 0;
        let mut by_name = 0;
        for _ in 0..20_000 {
            let TransactionParams::Payment(p) = gen.synthesize(TransactionKind::Payment, 0, &mut rng)
            else {
                panic!("wrong kind");
            };
            assert!((1..=5_000).contains(&p.amount));
            if p.customer_warehouse_id != p.warehouse_id {
                remote += 1;
            }
            if matches!(p.customer, CustomerSelector::ByLastName(_)) {
                by_name += 1;
            }
        }
        assert!((2_500..=3_500).contains(&remote), "remote = {remote}");
        assert!((11_400..=12_600).contains(&by_name), "by_name = {by_name}");
    }
}
