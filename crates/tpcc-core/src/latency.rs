use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::kind::TransactionKind;

/// Highest trackable latency: one hour, in microseconds.
const MAX_TRACKABLE_US: u64 = 3_600_000_000;
const SIGNIFICANT_FIGURES: u8 = 3;

fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, MAX_TRACKABLE_US, SIGNIFICANT_FIGURES)
        .expect("constant histogram bounds are valid")
}

fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub avg_ms: f64,
    pub p90_ms: f64,
    pub max_ms: f64,
}

struct KindLatency {
    /// Samples since the last `checkpoint(kind)`.
    window: Mutex<Histogram<u64>>,
    /// Samples over the whole run.
    total: Mutex<Histogram<u64>>,
    max_us: AtomicU64,
    checkpoint_max_us: AtomicU64,
    sum_us: AtomicU64,
    samples: AtomicU64,
}

impl KindLatency {
    fn new() -> Self {
        Self {
            window: Mutex::new(new_histogram()),
            total: Mutex::new(new_histogram()),
            max_us: AtomicU64::new(0),
            checkpoint_max_us: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }
}

/// Captures the latency of committed attempts.
///
/// Sampling is always on, whatever the measurement gate says; the run
/// controller resets the windowed parts when measurement starts and after
/// every checkpoint.
pub struct LatencySampler {
    /// Percentile estimator across all kinds, reset at every checkpoint.
    estimator: Mutex<Histogram<u64>>,
    kinds: [KindLatency; TransactionKind::COUNT],
}

impl LatencySampler {
    pub fn new() -> Self {
        Self {
            estimator: Mutex::new(new_histogram()),
            kinds: std::array::from_fn(|_| KindLatency::new()),
        }
    }

    /// Record one committed attempt and return its latency in milliseconds.
    pub fn record(&self, kind: TransactionKind, start: Instant, end: Instant) -> f64 {
        let elapsed = end.saturating_duration_since(start);
        self.sample(kind, elapsed);
        elapsed.as_secs_f64() * 1000.0
    }

    pub fn sample(&self, kind: TransactionKind, latency: Duration) {
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        let slot = &self.kinds[kind.index()];

        self.estimator.lock().saturating_record(us);
        slot.window.lock().saturating_record(us);
        slot.total.lock().saturating_record(us);
        slot.max_us.fetch_max(us, Ordering::Relaxed);
        slot.checkpoint_max_us.fetch_max(us, Ordering::Relaxed);
        slot.sum_us.fetch_add(us, Ordering::Relaxed);
        slot.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency at percentile `p` (0..=100) of the estimator window, in ms.
    pub fn percentile(&self, p: f64) -> f64 {
        let hist = self.estimator.lock();
        if hist.is_empty() {
            return 0.0;
        }
        us_to_ms(hist.value_at_percentile(p))
    }

    pub fn reset(&self) {
        self.estimator.lock().reset();
    }

    /// 90th percentile of `kind` since its previous checkpoint, in ms.
    /// Starts a new window for that kind.
    pub fn checkpoint(&self, kind: TransactionKind) -> f64 {
        let mut window = self.kinds[kind.index()].window.lock();
        let p90 = if window.is_empty() {
            0.0
        } else {
            us_to_ms(window.value_at_percentile(90.0))
        };
        window.reset();
        p90
    }

    /// Largest latency of `kind` since the previous call, in ms.
    pub fn take_checkpoint_max(&self, kind: TransactionKind) -> f64 {
        us_to_ms(
            self.kinds[kind.index()]
                .checkpoint_max_us
                .swap(0, Ordering::Relaxed),
        )
    }

    /// Forget everything sampled into the windowed views.
    pub fn reset_window(&self) {
        self.reset();
        for slot in &self.kinds {
            slot.window.lock().reset();
            slot.checkpoint_max_us.store(0, Ordering::Relaxed);
        }
    }

    /// Whole-run figures for `kind`.
    pub fn summary(&self, kind: TransactionKind) -> LatencySummary {
        let slot = &self.kinds[kind.index()];
        let samples = slot.samples.load(Ordering::Relaxed);
        let avg_ms = if samples == 0 {
            0.0
        } else {
            us_to_ms(slot.sum_us.load(Ordering::Relaxed)) / samples as f64
        };
        let total = slot.total.lock();
        let p90_ms = if total.is_empty() {
            0.0
        } else {
            us_to_ms(total.value_at_percentile(90.0))
        };
        LatencySummary {
            samples,
            avg_ms,
            p90_ms,
            max_ms: us_to_ms(slot.max_us.load(Ordering::Relaxed)),
        }
    }
}

impl Default for LatencySampler {
    fn default() -> Self {
        Self::new()
    }
}
