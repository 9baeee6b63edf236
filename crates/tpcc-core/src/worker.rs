use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::Session;
use crate::context::RunContext;
use crate::random::TpccRng;
use crate::stats::StatTable;

/// Everything one worker owns exclusively while it runs.
pub struct WorkerState {
    index: usize,
    pub(crate) stats: StatTable,
    pub(crate) session: Box<dyn Session>,
    pub(crate) rng: TpccRng,
}

impl WorkerState {
    pub fn new(index: usize, session: Box<dyn Session>, rng: TpccRng) -> Self {
        Self {
            index,
            stats: StatTable::new(),
            session,
            rng,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn stats(&self) -> &StatTable {
        &self.stats
    }

    /// Release the session and hand back the private counters.
    pub fn close(self) -> StatTable {
        let WorkerState { stats, session, .. } = self;
        drop(session);
        stats
    }
}

/// What a worker hands back to the run controller when it terminates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerReport {
    pub index: usize,
    /// Dispatch cycles completed, unit of work closed included.
    pub cycles: u64,
    /// Cycles whose transaction committed within its retry budget.
    pub committed: u64,
    pub stats: StatTable,
    /// Set when the worker terminated early on a store error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of one worker: connect, run dispatch cycles until the cycle limit is
/// reached or a stop is requested, then release the session.
pub fn run_worker(ctx: Arc<RunContext>, index: usize) -> WorkerReport {
    let session = match ctx.connector().connect(index) {
        Ok(session) => session,
        Err(err) => {
            warn!(worker = index, error = %err, "worker could not open its session");
            return WorkerReport {
                index,
                error: Some(err.to_string()),
                ..Default::default()
            };
        }
    };
    debug!(worker = index, backend = ctx.connector().name(), "worker session opened");

    let mut state = WorkerState::new(index, session, ctx.worker_rng(index));
    let limit = ctx.config().run.transactions_per_worker;
    let mut cycles = 0u64;
    let mut committed = 0u64;
    let mut error = None;

    while cycles < limit && !ctx.stop_requested() {
        if let Err(err) = state.session.begin_unit() {
            error = Some(format!("begin unit of work: {err}"));
            break;
        }
        if ctx.dispatcher().dispatch(&mut state) {
            committed += 1;
        }
        if let Err(err) = state.session.end_unit() {
            error = Some(format!("end unit of work: {err}"));
            break;
        }
        cycles += 1;
    }

    let stats = state.close();
    match &error {
        Some(err) => warn!(worker = index, cycles, error = %err, "worker terminated early"),
        None => debug!(worker = index, cycles, committed, "worker finished"),
    }

    WorkerReport {
        index,
        cycles,
        committed,
        stats,
        error,
    }
}
