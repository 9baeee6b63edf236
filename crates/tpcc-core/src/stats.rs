use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use crate::kind::TransactionKind;

/// Outcome counters for one transaction kind.
///
/// `retry` counts failed attempts. When a logical transaction exhausts its
/// budget, one retry is taken back and a failure is recorded instead, so a
/// failed transaction with budget `N` contributes `N - 1` retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSet {
    pub success: i64,
    pub late: i64,
    pub retry: i64,
    pub failure: i64,
}

impl CounterSet {
    /// Committed transactions, on time or not.
    pub fn completed(&self) -> i64 {
        self.success + self.late
    }

    /// Logical transactions that reached a final outcome.
    pub fn finished(&self) -> i64 {
        self.success + self.late + self.failure
    }

    /// Share of committed transactions that met the response time limit.
    pub fn on_time_pct(&self) -> Option<f64> {
        let completed = self.completed();
        if completed == 0 {
            return None;
        }
        Some(100.0 * self.success as f64 / completed as f64)
    }

    pub fn merge(&mut self, other: &CounterSet) {
        self.success += other.success;
        self.late += other.late;
        self.retry += other.retry;
        self.failure += other.failure;
    }

    pub fn delta(&self, earlier: &CounterSet) -> CounterSet {
        CounterSet {
            success: self.success - earlier.success,
            late: self.late - earlier.late,
            retry: self.retry - earlier.retry,
            failure: self.failure - earlier.failure,
        }
    }
}

/// One [`CounterSet`] per transaction kind, indexed by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatTable([CounterSet; TransactionKind::COUNT]);

impl StatTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TransactionKind, &CounterSet)> {
        TransactionKind::ALL.into_iter().zip(self.0.iter())
    }

    pub fn total_completed(&self) -> i64 {
        self.0.iter().map(CounterSet::completed).sum()
    }

    pub fn merge(&mut self, other: &StatTable) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            mine.merge(theirs);
        }
    }

    pub fn delta(&self, earlier: &StatTable) -> StatTable {
        let mut out = StatTable::new();
        for kind in TransactionKind::ALL {
            out[kind] = self[kind].delta(&earlier[kind]);
        }
        out
    }

    pub fn sum<'a>(tables: impl IntoIterator<Item = &'a StatTable>) -> StatTable {
        let mut total = StatTable::new();
        for table in tables {
            total.merge(table);
        }
        total
    }
}

impl Index<TransactionKind> for StatTable {
    type Output = CounterSet;

    fn index(&self, kind: TransactionKind) -> &CounterSet {
        &self.0[kind.index()]
    }
}

impl IndexMut<TransactionKind> for StatTable {
    fn index_mut(&mut self, kind: TransactionKind) -> &mut CounterSet {
        &mut self.0[kind.index()]
    }
}

#[derive(Debug, Default)]
struct AtomicCounterSet {
    success: AtomicI64,
    late: AtomicI64,
    retry: AtomicI64,
    failure: AtomicI64,
}

impl AtomicCounterSet {
    fn load(&self) -> CounterSet {
        CounterSet {
            success: self.success.load(Ordering::Relaxed),
            late: self.late.load(Ordering::Relaxed),
            retry: self.retry.load(Ordering::Relaxed),
            failure: self.failure.load(Ordering::Relaxed),
        }
    }

    fn clear(&self) {
        self.success.store(0, Ordering::Relaxed);
        self.late.store(0, Ordering::Relaxed);
        self.retry.store(0, Ordering::Relaxed);
        self.failure.store(0, Ordering::Relaxed);
    }
}

/// Shared flag deciding whether outcomes are folded into the statistics.
/// Written by the run controller only; workers may observe a stale value.
#[derive(Debug, Default)]
pub struct MeasurementGate(AtomicBool);

impl MeasurementGate {
    pub fn open(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Global outcome counters plus the gate that enables them.
///
/// Every recording call updates the global counters and the calling worker's
/// private table identically, so the sum of all private tables after join
/// equals [`StatAggregator::snapshot`].
#[derive(Debug, Default)]
pub struct StatAggregator {
    global: [AtomicCounterSet; TransactionKind::COUNT],
    gate: MeasurementGate,
}

impl StatAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate(&self) -> &MeasurementGate {
        &self.gate
    }

    /// Count a committed transaction as on time or late.
    pub fn record_success(
        &self,
        local: &mut StatTable,
        kind: TransactionKind,
        latency_ms: f64,
        sla_ms: u64,
    ) {
        if !self.gate.is_open() {
            return;
        }
        let global = &self.global[kind.index()];
        if latency_ms < sla_ms as f64 {
            global.success.fetch_add(1, Ordering::Relaxed);
            local[kind].success += 1;
        } else {
            global.late.fetch_add(1, Ordering::Relaxed);
            local[kind].late += 1;
        }
    }

    pub fn record_retry(&self, local: &mut StatTable, kind: TransactionKind) {
        if !self.gate.is_open() {
            return;
        }
        self.global[kind.index()]
            .retry
            .fetch_add(1, Ordering::Relaxed);
        local[kind].retry += 1;
    }

    /// A logical transaction ran out of attempts: take back one retry and
    /// count a failure.
    pub fn record_exhausted(&self, local: &mut StatTable, kind: TransactionKind) {
        if !self.gate.is_open() {
            return;
        }
        let global = &self.global[kind.index()];
        global.retry.fetch_sub(1, Ordering::Relaxed);
        global.failure.fetch_add(1, Ordering::Relaxed);
        local[kind].retry -= 1;
        local[kind].failure += 1;
    }

    pub fn snapshot(&self) -> StatTable {
        let mut table = StatTable::new();
        for kind in TransactionKind::ALL {
            table[kind] = self.global[kind.index()].load();
        }
        table
    }

    pub fn clear(&self) {
        for counters in &self.global {
            counters.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_closed_gate_records_nothing() {
        let stats = StatAggregator::new();
        let mut local = StatTable::new();

        stats.record_success(&mut local, TransactionKind::Payment, 1.0, 5);
        stats.record_retry(&mut local, TransactionKind::Payment);
        stats.record_exhausted(&mut local, TransactionKind::Payment);

        assert_eq!(local, StatTable::new());
        assert_eq!(stats.snapshot(), StatTable::new());
    }

    #[test]
    fn test_success_versus_late() {
        let stats = StatAggregator::new();
        stats.gate().open();
        let mut local = StatTable::new();

        stats.record_success(&mut local, TransactionKind::NewOrder, 4.9, 5);
        stats.record_success(&mut local, TransactionKind::NewOrder, 5.0, 5);
        stats.record_success(&mut local, TransactionKind::NewOrder, 12.0, 5);

        let c = local[TransactionKind::NewOrder];
        assert_eq!(c.success, 1);
        assert_eq!(c.late, 2);
        assert_eq!(stats.snapshot(), local);
    }

    #[test]
    fn test_exhaustion_compensates_one_retry() {
        let stats = StatAggregator::new();
        stats.gate().open();
        let mut local = StatTable::new();

        let budget = 5;
        for _ in 0..budget {
            stats.record_retry(&mut local, TransactionKind::Delivery);
        }
        stats.record_exhausted(&mut local, TransactionKind::Delivery);

        let c = local[TransactionKind::Delivery];
        assert_eq!(c.retry, budget - 1);
        assert_eq!(c.failure, 1);
        assert_eq!(stats.snapshot()[TransactionKind::Delivery], c);
    }

    #[test]
    fn test_delta_and_merge() {
        let mut a = StatTable::new();
        a[TransactionKind::Payment].success = 10;
        a[TransactionKind::Payment].late = 2;
        let mut b = a;
        b[TransactionKind::Payment].success = 15;
        b[TransactionKind::StockLevel].failure = 1;

        let d = b.delta(&a);
        assert_eq!(d[TransactionKind::Payment].success, 5);
        assert_eq!(d[TransactionKind::Payment].late, 0);
        assert_eq!(d[TransactionKind::StockLevel].failure, 1);

        let total = StatTable::sum([&a, &d]);
        assert_eq!(total, b);
        assert_eq!(total.total_completed(), 17);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(StatAggregator::new());
        stats.gate().open();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    let mut local = StatTable::new();
                    let kind = TransactionKind::ALL[i % TransactionKind::COUNT];
                    for n in 0..10_000 {
                        stats.record_retry(&mut local, kind);
                        if n % 3 == 0 {
                            stats.record_exhausted(&mut local, kind);
                        } else {
                            stats.record_success(&mut local, kind, 1.0, 5);
                        }
                    }
                    local
                })
            })
            .collect();

        let locals: Vec<StatTable> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let summed = StatTable::sum(locals.iter());
        assert_eq!(summed, stats.snapshot());
        let finished: i64 = summed.iter().map(|(_, c)| c.finished()).sum();
        assert_eq!(finished, 80_000);
    }

    #[test]
    fn test_on_time_pct() {
        let c = CounterSet {
            success: 9,
            late: 1,
            ..Default::default()
        };
        assert_eq!(c.on_time_pct(), Some(90.0));
        assert_eq!(CounterSet::default().on_time_pct(), None);
    }
}
