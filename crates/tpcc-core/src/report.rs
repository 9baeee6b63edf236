use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compliance::ComplianceReport;
use crate::error::TpccResult;
use crate::kind::TransactionKind;
use crate::latency::LatencySummary;
use crate::stats::{CounterSet, StatTable};
use crate::worker::WorkerReport;

/// Per-kind slice of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KindCheckpoint {
    pub kind: TransactionKind,
    /// Committed since the previous checkpoint, late ones included.
    pub completed: i64,
    pub late: i64,
    pub p90_ms: f64,
    pub max_ms: f64,
}

/// One periodic snapshot of the measured window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub elapsed_ms: u64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub kinds: Vec<KindCheckpoint>,
}

impl Checkpoint {
    pub fn completed(&self) -> i64 {
        self.kinds.iter().map(|k| k.completed).sum()
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:6.1}, 95%: {:.3}, 99%: {:.3}",
            self.elapsed_ms as f64 / 1000.0,
            self.p95_ms,
            self.p99_ms
        )?;
        for k in &self.kinds {
            write!(
                f,
                ", {}({}):{:.3}|{:.3}",
                k.completed, k.late, k.p90_ms, k.max_ms
            )?;
        }
        Ok(())
    }
}

/// Whole-run figures of one transaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KindReport {
    pub kind: TransactionKind,
    pub counters: CounterSet,
    pub latency: LatencySummary,
    pub sla_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub backend: String,
    pub seed: u64,
    pub warehouses: u32,
    pub connections: u32,
    /// Length of the measured window covered by checkpoints.
    pub measured_secs: f64,
    /// Wall time from the first worker spawn to the last join.
    pub elapsed_secs: f64,
    pub kinds: Vec<KindReport>,
    /// Global counters.
    pub global: StatTable,
    /// Sum of the workers' private counters.
    pub worker_totals: StatTable,
    pub counters_consistent: bool,
    pub tpmc: f64,
    pub compliance: ComplianceReport,
    pub checkpoints: Vec<Checkpoint>,
    pub workers: Vec<WorkerReport>,
    /// Worker tasks that panicked and returned no report.
    pub workers_lost: usize,
}

impl RunReport {
    pub fn workers_failed(&self) -> usize {
        self.workers.iter().filter(|w| w.error.is_some()).count() + self.workers_lost
    }

    /// Write the report as pretty JSON under `dir`, named after its timestamp.
    pub fn save_json(&self, dir: impl AsRef<Path>) -> TpccResult<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let stamp: String = self
            .timestamp
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let path = dir.join(format!("tpcc_{stamp}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// New-Order transactions completed per minute of the measured window.
pub fn tpmc(stats: &StatTable, measured: Duration) -> f64 {
    let secs = measured.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    stats[TransactionKind::NewOrder].completed() as f64 * 60.0 / secs
}

fn write_raw(
    f: &mut fmt::Formatter<'_>,
    table: &StatTable,
    kinds: &[KindReport],
) -> fmt::Result {
    for k in kinds {
        let c = &table[k.kind];
        writeln!(
            f,
            "  [{}:{}] sc:{} lt:{}  rt:{}  fl:{} avg_rt: {:.1} ({})",
            k.kind.index(),
            k.kind,
            c.success,
            c.late,
            c.retry,
            c.failure,
            k.latency.avg_ms,
            k.sla_ms
        )?;
    }
    Ok(())
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<Raw Results>")?;
        write_raw(f, &self.global, &self.kinds)?;
        writeln!(f, " in {:.0} sec.", self.measured_secs)?;

        writeln!(f)?;
        writeln!(f, "<Raw Results2(sum from per-thread stats)>")?;
        write_raw(f, &self.worker_totals, &self.kinds)?;
        if !self.counters_consistent {
            writeln!(f, "  global and per-worker counters differ *")?;
        }

        writeln!(f)?;
        writeln!(f, "<Response Time (ms)>")?;
        for k in &self.kinds {
            writeln!(
                f,
                "  {:>13}: samples {} avg {:.3} 90%: {:.3} max {:.3}",
                k.kind.name(),
                k.latency.samples,
                k.latency.avg_ms,
                k.latency.p90_ms,
                k.latency.max_ms
            )?;
        }

        writeln!(f)?;
        write!(f, "{}", self.compliance)?;

        writeln!(f)?;
        writeln!(f, "<TpmC>")?;
        writeln!(f, "                 {:.3} TpmC", self.tpmc)?;

        writeln!(f)?;
        writeln!(f, "Time taken")?;
        writeln!(f, "                 {:.3} seconds", self.elapsed_secs)?;

        let failed = self.workers_failed();
        if failed > 0 {
            writeln!(f)?;
            writeln!(
                f,
                "{} of {} workers terminated early",
                failed, self.connections
            )?;
        }
        Ok(())
    }
}
