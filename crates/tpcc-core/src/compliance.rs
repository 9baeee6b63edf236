//! End-of-run TPC-C constraint checks. Advisory: a failing check annotates
//! the report and never aborts the run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::kind::TransactionKind;
use crate::stats::StatTable;

/// Share of committed transactions that must meet the response time limit.
pub const RESPONSE_TIME_PASS_PCT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixCheck {
    pub kind: TransactionKind,
    pub share_pct: f64,
    pub minimum_pct: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeCheck {
    pub kind: TransactionKind,
    pub on_time_pct: f64,
    pub minimum_pct: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub mix: Vec<MixCheck>,
    pub response_time: Vec<ResponseTimeCheck>,
}

impl ComplianceReport {
    pub fn all_passed(&self) -> bool {
        self.mix.iter().all(|c| c.passed) && self.response_time.iter().all(|c| c.passed)
    }
}

pub fn check(stats: &StatTable) -> ComplianceReport {
    let total = stats.total_completed();

    let mix = TransactionKind::ALL
        .iter()
        .filter_map(|&kind| {
            let minimum_pct = kind.minimum_mix_pct()?;
            let share_pct = if total > 0 {
                100.0 * stats[kind].completed() as f64 / total as f64
            } else {
                0.0
            };
            Some(MixCheck {
                kind,
                share_pct,
                minimum_pct,
                passed: total > 0 && share_pct >= minimum_pct,
            })
        })
        .collect();

    let response_time = TransactionKind::ALL
        .iter()
        .map(|&kind| {
            let on_time = stats[kind].on_time_pct();
            ResponseTimeCheck {
                kind,
                on_time_pct: on_time.unwrap_or(0.0),
                minimum_pct: RESPONSE_TIME_PASS_PCT,
                passed: on_time.is_some_and(|pct| pct >= RESPONSE_TIME_PASS_PCT),
            }
        })
        .collect();

    ComplianceReport { mix, response_time }
}

fn verdict(passed: bool) -> &'static str {
    if passed {
        " [OK]"
    } else {
        " [NG] *"
    }
}

impl fmt::Display for ComplianceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<Constraint Check> (all must be [OK])")?;
        writeln!(f, " [transaction percentage]")?;
        for c in &self.mix {
            writeln!(
                f,
                "        {}: {:3.2}% (>={:.1}%){}",
                c.kind,
                c.share_pct,
                c.minimum_pct,
                verdict(c.passed)
            )?;
        }
        writeln!(
            f,
            " [response time (at least {:.0}% passed)]",
            RESPONSE_TIME_PASS_PCT
        )?;
        for c in &self.response_time {
            writeln!(f, "      {}: {:3.2}% {}", c.kind, c.on_time_pct, verdict(c.passed))?;
        }
        Ok(())
    }
}
