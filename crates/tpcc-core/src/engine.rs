use std::sync::Arc;
use std::time::Instant;

use crate::kind::TransactionKind;
use crate::latency::LatencySampler;
use crate::params::{ParamGenerator, TransactionParams};
use crate::stats::StatAggregator;
use crate::worker::WorkerState;

/// Attempts allowed per logical transaction unless configured otherwise.
pub const DEFAULT_RETRY_BUDGET: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransactionOutcome {
    /// Committed; carries the latency in milliseconds measured from the
    /// start of the first attempt.
    Committed(f64),
    /// One attempt failed and may be retried.
    Conflict,
    /// The retry budget ran out without a commit.
    ExhaustedRetries,
}

impl TransactionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TransactionOutcome::Committed(_))
    }
}

/// Bounded retry loop for one transaction kind.
pub struct RetryEngine {
    kind: TransactionKind,
    sla_ms: u64,
    budget: u32,
    params: ParamGenerator,
    stats: Arc<StatAggregator>,
    latency: Arc<LatencySampler>,
}

impl RetryEngine {
    pub fn new(
        kind: TransactionKind,
        sla_ms: u64,
        budget: u32,
        params: ParamGenerator,
        stats: Arc<StatAggregator>,
        latency: Arc<LatencySampler>,
    ) -> Self {
        Self {
            kind,
            sla_ms,
            budget: budget.max(1),
            params,
            stats,
            latency,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn sla_ms(&self) -> u64 {
        self.sla_ms
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Draw fresh inputs for this kind and run them.
    pub fn execute(&self, worker: &mut WorkerState) -> TransactionOutcome {
        let params = self
            .params
            .synthesize(self.kind, worker.index(), &mut worker.rng);
        self.run(worker, &params)
    }

    /// Run one logical transaction, retrying failed attempts until it
    /// commits or `budget` attempts have been made.
    pub fn run(&self, worker: &mut WorkerState, params: &TransactionParams) -> TransactionOutcome {
        debug_assert_eq!(params.kind(), self.kind);

        let start = Instant::now();
        for _ in 0..self.budget {
            match self.attempt(worker, params, start) {
                TransactionOutcome::Conflict => {
                    self.stats.record_retry(&mut worker.stats, self.kind);
                }
                outcome => return outcome,
            }
        }

        self.stats.record_exhausted(&mut worker.stats, self.kind);
        TransactionOutcome::ExhaustedRetries
    }

    fn attempt(
        &self,
        worker: &mut WorkerState,
        params: &TransactionParams,
        start: Instant,
    ) -> TransactionOutcome {
        if !worker.session.execute(params) {
            return TransactionOutcome::Conflict;
        }
        let end = Instant::now();
        let latency_ms = end.saturating_duration_since(start).as_secs_f64() * 1000.0;
        self.stats
            .record_success(&mut worker.stats, self.kind, latency_ms, self.sla_ms);
        self.latency.record(self.kind, start, end);
        TransactionOutcome::Committed(latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Connector;
    use crate::mock::{MockActivity, MockBehavior, MockConnector};
    use crate::random::{NurandConstants, TpccRng};
    use std::time::Duration;

    fn engine(kind: TransactionKind, sla_ms: u64, budget: u32) -> (RetryEngine, Arc<StatAggregator>) {
        let stats = Arc::new(StatAggregator::new());
        stats.gate().open();
        let engine = RetryEngine::new(
            kind,
            sla_ms,
            budget,
            ParamGenerator::new(1, 1, 0),
            Arc::clone(&stats),
            Arc::new(LatencySampler::new()),
        );
        (engine, stats)
    }

    fn worker(connector: &MockConnector) -> WorkerState {
        let rng = TpccRng::new(
            1,
            NurandConstants {
                c_last: 0,
                c_id: 0,
                ol_i_id: 0,
            },
        );
        WorkerState::new(0, connector.connect(0).unwrap(), rng)
    }

    #[test]
    fn test_late_commit_on_third_attempt() {
        let connector = MockConnector::new(MockBehavior::CommitOnAttempt {
            attempt: 3,
            latency: Duration::from_millis(10),
        });
        let (engine, stats) = engine(TransactionKind::Payment, 5, DEFAULT_RETRY_BUDGET);
        let mut worker = worker(&connector);

        let outcome = engine.execute(&mut worker);
        match outcome {
            TransactionOutcome::Committed(ms) => assert!(ms >= 10.0, "latency {ms}"),
            other => panic!("unexpected outcome {other:?}"),
        }

        let c = worker.stats()[TransactionKind::Payment];
        assert_eq!(c.success, 0);
        assert_eq!(c.late, 1);
        assert_eq!(c.retry, 2);
        assert_eq!(c.failure, 0);
        assert_eq!(stats.snapshot(), *worker.stats());
    }

    #[test]
    fn test_budget_bounds_attempts() {
        let connector = MockConnector::new(MockBehavior::AlwaysConflict);
        let activity = connector.activity();
        let (engine, _stats) = engine(TransactionKind::Delivery, 80, 5);
        let mut worker = worker(&connector);

        for round in 1..=3u64 {
            let outcome = engine.execute(&mut worker);
            assert_eq!(outcome, TransactionOutcome::ExhaustedRetries);
            assert_eq!(MockActivity::get(&activity.attempts), 5 * round);
        }

        let c = worker.stats()[TransactionKind::Delivery];
        assert_eq!(c.failure, 3);
        assert_eq!(c.retry, 3 * 4);
    }

    #[test]
    fn test_first_attempt_commit_records_no_retry() {
        let connector = MockConnector::new(MockBehavior::AlwaysCommit {
            latency: Duration::ZERO,
        });
        let (engine, _stats) = engine(TransactionKind::StockLevel, 20, 3);
        let mut worker = worker(&connector);

        assert!(engine.execute(&mut worker).is_committed());
        let c = worker.stats()[TransactionKind::StockLevel];
        assert_eq!(c.retry, 0);
        assert_eq!(c.completed(), 1);
    }

    #[test]
    fn test_closed_gate_still_samples_latency() {
        let connector = MockConnector::new(MockBehavior::AlwaysCommit {
            latency: Duration::ZERO,
        });
        let stats = Arc::new(StatAggregator::new());
        let latency = Arc::new(LatencySampler::new());
        let engine = RetryEngine::new(
            TransactionKind::NewOrder,
            5,
            10,
            ParamGenerator::new(1, 1, 0),
            Arc::clone(&stats),
            Arc::clone(&latency),
        );
        let mut worker = worker(&connector);

        assert!(engine.execute(&mut worker).is_committed());
        assert_eq!(worker.stats()[TransactionKind::NewOrder].completed(), 0);
        assert_eq!(latency.summary(TransactionKind::NewOrder).samples, 1);
    }
}
