use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::Connector;
use crate::compliance;
use crate::config::Config;
use crate::context::RunContext;
use crate::error::TpccResult;
use crate::kind::TransactionKind;
use crate::report::{self, Checkpoint, KindCheckpoint, KindReport, RunReport};
use crate::stats::StatTable;
use crate::worker::{run_worker, WorkerReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initializing,
    RampUp,
    Measuring,
    Draining,
    Reporting,
    Terminated,
}

/// Drives one benchmark run: spawns the workers, opens the measurement gate
/// after ramp-up, prints a checkpoint every interval, then drains the workers
/// and builds the final report.
pub struct RunController {
    ctx: Arc<RunContext>,
    phase: RunPhase,
    previous: StatTable,
    quiet: bool,
}

impl RunController {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> TpccResult<Self> {
        let ctx = RunContext::new(config, connector)?;
        Ok(Self {
            ctx: Arc::new(ctx),
            phase: RunPhase::Initializing,
            previous: StatTable::new(),
            quiet: false,
        })
    }

    /// Keep checkpoint lines off stdout; they are still logged.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub async fn run(mut self) -> TpccResult<RunReport> {
        let ctx = Arc::clone(&self.ctx);
        let run = &ctx.config().run;
        let started = Instant::now();

        ctx.stats().gate().close();
        ctx.stats().clear();
        info!(
            warehouses = run.warehouses,
            connections = run.connections,
            backend = ctx.connector().name(),
            seed = ctx.seed(),
            "starting workers"
        );
        let handles: Vec<JoinHandle<WorkerReport>> = (0..run.connections as usize)
            .map(|index| {
                let ctx = Arc::clone(&ctx);
                tokio::task::spawn_blocking(move || run_worker(ctx, index))
            })
            .collect();

        self.transition(RunPhase::RampUp);
        self.banner(&format!("RAMP-UP TIME.({} sec.)", run.rampup_ms as f64 / 1000.0));
        tokio::time::sleep(Duration::from_millis(run.rampup_ms)).await;

        self.transition(RunPhase::Measuring);
        self.banner("MEASURING START.");
        ctx.latency().reset_window();
        self.previous = ctx.stats().snapshot();
        ctx.stats().gate().open();

        let interval = Duration::from_millis(run.report_interval_ms);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        let mut checkpoints = Vec::new();
        for n in 1..=ctx.config().measured_intervals() {
            ticker.tick().await;
            let checkpoint = self.checkpoint(n * run.report_interval_ms);
            info!(
                elapsed_ms = checkpoint.elapsed_ms,
                completed = checkpoint.completed(),
                p95_ms = checkpoint.p95_ms,
                p99_ms = checkpoint.p99_ms,
                "checkpoint"
            );
            if !self.quiet {
                println!("{checkpoint}");
            }
            checkpoints.push(checkpoint);
        }

        self.transition(RunPhase::Draining);
        ctx.stats().gate().close();
        ctx.request_stop();
        self.banner("STOPPING THREADS");
        let mut workers = Vec::with_capacity(handles.len());
        let mut workers_lost = 0;
        for handle in handles {
            match handle.await {
                Ok(report) => workers.push(report),
                Err(err) => {
                    warn!(error = %err, "worker task did not complete");
                    workers_lost += 1;
                }
            }
        }

        self.transition(RunPhase::Reporting);
        let report = self.build_report(workers, workers_lost, checkpoints, started.elapsed());
        if !report.counters_consistent {
            warn!("per-worker counters do not add up to the global counters");
        }
        info!(
            tpmc = report.tpmc,
            compliant = report.compliance.all_passed(),
            workers_failed = report.workers_failed(),
            "run finished"
        );

        self.transition(RunPhase::Terminated);
        Ok(report)
    }

    fn transition(&mut self, next: RunPhase) {
        info!(from = ?self.phase, to = ?next, "run phase");
        self.phase = next;
    }

    fn banner(&self, text: &str) {
        if !self.quiet {
            println!("\n{text}\n");
        }
    }

    /// Delta of the global counters since the previous checkpoint plus the
    /// windowed latency figures, which are reset afterwards.
    fn checkpoint(&mut self, elapsed_ms: u64) -> Checkpoint {
        let ctx = &self.ctx;
        let current = ctx.stats().snapshot();
        let delta = current.delta(&self.previous);
        self.previous = current;

        let latency = ctx.latency();
        let p95_ms = latency.percentile(95.0);
        let p99_ms = latency.percentile(99.0);
        latency.reset();

        let kinds = TransactionKind::ALL
            .iter()
            .map(|&kind| KindCheckpoint {
                kind,
                completed: delta[kind].completed(),
                late: delta[kind].late,
                p90_ms: latency.checkpoint(kind),
                max_ms: latency.take_checkpoint_max(kind),
            })
            .collect();

        Checkpoint {
            elapsed_ms,
            p95_ms,
            p99_ms,
            kinds,
        }
    }

    fn build_report(
        &self,
        workers: Vec<WorkerReport>,
        workers_lost: usize,
        checkpoints: Vec<Checkpoint>,
        elapsed: Duration,
    ) -> RunReport {
        let ctx = &self.ctx;
        let config = ctx.config();
        let global = ctx.stats().snapshot();
        let worker_totals = StatTable::sum(workers.iter().map(|w| &w.stats));
        let measured = config.measured_duration();

        let kinds = TransactionKind::ALL
            .iter()
            .map(|&kind| KindReport {
                kind,
                counters: global[kind],
                latency: ctx.latency().summary(kind),
                sla_ms: config.sla.limit_ms(kind),
            })
            .collect();

        RunReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            backend: ctx.connector().name().to_string(),
            seed: ctx.seed(),
            warehouses: config.run.warehouses,
            connections: config.run.connections,
            measured_secs: measured.as_secs_f64(),
            elapsed_secs: elapsed.as_secs_f64(),
            kinds,
            counters_consistent: global == worker_totals,
            tpmc: report::tpmc(&global, measured),
            compliance: compliance::check(&global),
            global,
            worker_totals,
            checkpoints,
            workers,
            workers_lost,
        }
    }
}
