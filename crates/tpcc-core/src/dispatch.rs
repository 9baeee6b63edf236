use std::sync::Arc;

use crate::config::Config;
use crate::engine::RetryEngine;
use crate::kind::TransactionKind;
use crate::latency::LatencySampler;
use crate::params::ParamGenerator;
use crate::sequencer::MixSequencer;
use crate::stats::StatAggregator;
use crate::worker::WorkerState;

/// Routes each cycle to the retry engine of the kind the mix deals next.
pub struct Dispatcher {
    sequencer: Arc<MixSequencer>,
    engines: [RetryEngine; TransactionKind::COUNT],
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        sequencer: Arc<MixSequencer>,
        stats: Arc<StatAggregator>,
        latency: Arc<LatencySampler>,
    ) -> Self {
        let params = ParamGenerator::from_config(&config.run);
        let engines = TransactionKind::ALL.map(|kind| {
            RetryEngine::new(
                kind,
                config.sla.limit_ms(kind),
                config.run.retry_budget,
                params,
                Arc::clone(&stats),
                Arc::clone(&latency),
            )
        });
        Self { sequencer, engines }
    }

    pub fn engine(&self, kind: TransactionKind) -> &RetryEngine {
        &self.engines[kind.index()]
    }

    /// Run the next transaction of the mix; `true` if it committed.
    pub fn dispatch(&self, worker: &mut WorkerState) -> bool {
        let kind = self.sequencer.next();
        self.engine(kind).execute(worker).is_committed()
    }
}
