use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Connector, Session};
use crate::error::{TpccError, TpccResult};
use crate::params::{
    DeliveryParams, NewOrderParams, OrderStatusParams, PaymentParams, StockLevelParams,
};

/// How every mock session answers a transaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Every attempt commits after `latency`.
    AlwaysCommit { latency: Duration },
    /// Every attempt fails immediately.
    AlwaysConflict,
    /// Attempts fail until the `attempt`-th one (1-based), which commits
    /// after `latency`; the count restarts for the next transaction.
    CommitOnAttempt { attempt: u32, latency: Duration },
}

/// Counters shared by all sessions of one [`MockConnector`].
#[derive(Debug, Default)]
pub struct MockActivity {
    pub connects: AtomicU64,
    pub attempts: AtomicU64,
    pub commits: AtomicU64,
    pub units_begun: AtomicU64,
    pub units_ended: AtomicU64,
    pub sessions_closed: AtomicU64,
}

impl MockActivity {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Scripted backend for dry runs and tests; no store behind it.
pub struct MockConnector {
    behavior: MockBehavior,
    refused: BTreeSet<usize>,
    activity: Arc<MockActivity>,
}

impl MockConnector {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            refused: BTreeSet::new(),
            activity: Arc::new(MockActivity::default()),
        }
    }

    /// Make `connect` fail for the given worker.
    pub fn refusing(mut self, worker: usize) -> Self {
        self.refused.insert(worker);
        self
    }

    pub fn activity(&self) -> Arc<MockActivity> {
        Arc::clone(&self.activity)
    }
}

impl Connector for MockConnector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn connect(&self, worker: usize) -> TpccResult<Box<dyn Session>> {
        if self.refused.contains(&worker) {
            return Err(TpccError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("mock connection refused for worker {worker}"),
            )));
        }
        self.activity.connects.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockSession {
            behavior: self.behavior,
            failed_attempts: 0,
            activity: Arc::clone(&self.activity),
        }))
    }
}

struct MockSession {
    behavior: MockBehavior,
    failed_attempts: u32,
    activity: Arc<MockActivity>,
}

impl MockSession {
    fn attempt(&mut self) -> bool {
        self.activity.attempts.fetch_add(1, Ordering::Relaxed);
        let latency = match self.behavior {
            MockBehavior::AlwaysCommit { latency } => Some(latency),
            MockBehavior::AlwaysConflict => None,
            MockBehavior::CommitOnAttempt { attempt, latency } => {
                if self.failed_attempts + 1 >= attempt {
                    Some(latency)
                } else {
                    None
                }
            }
        };

        match latency {
            Some(latency) => {
                if !latency.is_zero() {
                    std::thread::sleep(latency);
                }
                self.failed_attempts = 0;
                self.activity.commits.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                self.failed_attempts += 1;
                false
            }
        }
    }
}

impl Session for MockSession {
    fn begin_unit(&mut self) -> TpccResult<()> {
        self.activity.units_begun.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn end_unit(&mut self) -> TpccResult<()> {
        self.activity.units_ended.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn new_order(&mut self, _params: &NewOrderParams) -> bool {
        self.attempt()
    }

    fn payment(&mut self, _params: &PaymentParams) -> bool {
        self.attempt()
    }

    fn order_status(&mut self, _params: &OrderStatusParams) -> bool {
        self.attempt()
    }

    fn delivery(&mut self, _params: &DeliveryParams) -> bool {
        self.attempt()
    }

    fn stock_level(&mut self, _params: &StockLevelParams) -> bool {
        self.attempt()
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.activity.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }
}
