use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::Connector;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::TpccResult;
use crate::latency::LatencySampler;
use crate::random::{NurandConstants, TpccRng};
use crate::sequencer::MixSequencer;
use crate::stats::StatAggregator;

/// State shared by the run controller and every worker. Everything except
/// the gate, the stop flag and the statistics is fixed once built.
pub struct RunContext {
    config: Config,
    seed: u64,
    nurand: NurandConstants,
    stats: Arc<StatAggregator>,
    latency: Arc<LatencySampler>,
    dispatcher: Dispatcher,
    connector: Arc<dyn Connector>,
    stop: AtomicBool,
}

impl RunContext {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> TpccResult<Self> {
        config.validate()?;

        let seed = config.run.seed.unwrap_or_else(rand::random);
        let mut seeder = SmallRng::seed_from_u64(seed);
        let nurand = NurandConstants::generate(&mut seeder);
        let sequencer = Arc::new(MixSequencer::new(config.mix.weights(), seeder.gen())?);

        let stats = Arc::new(StatAggregator::new());
        let latency = Arc::new(LatencySampler::new());
        let dispatcher = Dispatcher::new(
            &config,
            sequencer,
            Arc::clone(&stats),
            Arc::clone(&latency),
        );

        Ok(Self {
            config,
            seed,
            nurand,
            stats,
            latency,
            dispatcher,
            connector,
            stop: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn nurand(&self) -> NurandConstants {
        self.nurand
    }

    pub fn stats(&self) -> &StatAggregator {
        &self.stats
    }

    pub fn latency(&self) -> &LatencySampler {
        &self.latency
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    /// Random stream of `worker`, derived from the run seed.
    pub fn worker_rng(&self, worker: usize) -> TpccRng {
        let stream = (worker as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        TpccRng::new(self.seed ^ stream, self.nurand)
    }

    /// Ask workers to stop after their current cycle.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}
