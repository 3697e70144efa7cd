//! Anomaly detection over resolved slots.
//!
//! Two patterns are reported:
//! - Consecutive misses: a run of MISSED slots reaching the policy threshold.
//!   HIGH when the run is at least twice the threshold, MEDIUM otherwise.
//! - Low adherence: a trailing window of `window_days` whose local adherence
//!   rate is below `min_adherence_rate`. HIGH when below half the minimum,
//!   MEDIUM otherwise.
//!
//! Windows are consecutive, non-overlapping blocks of calendar days anchored
//! at the latest date holding a due slot and stepping backwards.

use crate::{Anomaly, AnomalyKind, Error, ResolvedSlot, Result, Severity, SlotStatus};
use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Thresholds for anomaly detection
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnomalyPolicy {
    #[serde(default = "default_consecutive_miss_threshold")]
    pub consecutive_miss_threshold: u32,

    #[serde(default = "default_window_days")]
    pub window_days: u32,

    #[serde(default = "default_min_adherence_rate")]
    pub min_adherence_rate: f64,
}

fn default_consecutive_miss_threshold() -> u32 {
    3
}

fn default_window_days() -> u32 {
    7
}

fn default_min_adherence_rate() -> f64 {
    0.5
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self {
            consecutive_miss_threshold: default_consecutive_miss_threshold(),
            window_days: default_window_days(),
            min_adherence_rate: default_min_adherence_rate(),
        }
    }
}

impl AnomalyPolicy {
    /// Build a validated policy
    pub fn new(
        consecutive_miss_threshold: u32,
        window_days: u32,
        min_adherence_rate: f64,
    ) -> Result<Self> {
        let policy = Self {
            consecutive_miss_threshold,
            window_days,
            min_adherence_rate,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.consecutive_miss_threshold == 0 {
            return Err(Error::Config(
                "anomaly.consecutive_miss_threshold must be at least 1".into(),
            ));
        }
        if self.window_days == 0 {
            return Err(Error::Config("anomaly.window_days must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.min_adherence_rate) {
            return Err(Error::Config(format!(
                "anomaly.min_adherence_rate must be within [0, 1] (got {})",
                self.min_adherence_rate
            )));
        }
        Ok(())
    }
}

/// Detect adherence anomalies, returned in chronological order of detection
pub fn detect_anomalies(resolved: &[ResolvedSlot], policy: &AnomalyPolicy) -> Vec<Anomaly> {
    let mut ordered: Vec<&ResolvedSlot> = resolved.iter().collect();
    ordered.sort_by_key(|r| r.slot.scheduled_at());

    let mut anomalies = consecutive_miss_runs(&ordered, policy);
    anomalies.extend(low_adherence_windows(&ordered, policy));
    anomalies.sort_by_key(|a| a.detected_at);

    if !anomalies.is_empty() {
        tracing::info!("Detected {} adherence anomalies", anomalies.len());
    }
    anomalies
}

/// True iff at least one anomaly is of HIGH severity
pub fn has_danger(anomalies: &[Anomaly]) -> bool {
    anomalies.iter().any(|a| a.severity >= Severity::High)
}

struct MissRun {
    first: NaiveDateTime,
    last: NaiveDateTime,
    detected_at: Option<NaiveDateTime>,
    len: u32,
}

fn consecutive_miss_runs(ordered: &[&ResolvedSlot], policy: &AnomalyPolicy) -> Vec<Anomaly> {
    let threshold = policy.consecutive_miss_threshold.max(1);
    let mut anomalies = Vec::new();
    let mut run: Option<MissRun> = None;

    for resolved in ordered {
        let at = resolved.slot.scheduled_at();
        if resolved.status == SlotStatus::Missed {
            let current = run.get_or_insert(MissRun {
                first: at,
                last: at,
                detected_at: None,
                len: 0,
            });
            current.len += 1;
            current.last = at;
            if current.len == threshold {
                current.detected_at = Some(at);
            }
        } else if let Some(finished) = run.take() {
            anomalies.extend(close_run(finished, threshold));
        }
    }

    if let Some(finished) = run.take() {
        anomalies.extend(close_run(finished, threshold));
    }

    anomalies
}

fn close_run(run: MissRun, threshold: u32) -> Option<Anomaly> {
    let detected_at = run.detected_at?;
    let severity = if run.len >= threshold.saturating_mul(2) {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(Anomaly {
        kind: AnomalyKind::ConsecutiveMiss,
        severity,
        description: format!(
            "{} consecutive missed doses from {} to {}",
            run.len,
            run.first.format("%Y-%m-%d %H:%M"),
            run.last.format("%Y-%m-%d %H:%M")
        ),
        detected_at,
    })
}

#[derive(Default)]
struct WindowTally {
    confirmed: usize,
    missed: usize,
    last_due: Option<NaiveDateTime>,
}

fn low_adherence_windows(ordered: &[&ResolvedSlot], policy: &AnomalyPolicy) -> Vec<Anomaly> {
    let window = i64::from(policy.window_days.max(1));

    let latest: NaiveDate = match ordered.iter().rev().find(|r| r.is_due()) {
        Some(r) => r.slot.date,
        None => return Vec::new(),
    };

    // Window index counts backwards from the latest due date
    let mut tallies: BTreeMap<i64, WindowTally> = BTreeMap::new();
    for resolved in ordered.iter().filter(|r| r.is_due()) {
        let index = (latest - resolved.slot.date).num_days() / window;
        let tally = tallies.entry(index).or_default();
        match resolved.status {
            SlotStatus::Confirmed => tally.confirmed += 1,
            SlotStatus::Missed => tally.missed += 1,
            SlotStatus::Pending => {}
        }
        tally.last_due = Some(resolved.slot.scheduled_at());
    }

    let mut anomalies = Vec::new();
    for (index, tally) in tallies.iter().rev() {
        let due = tally.confirmed + tally.missed;
        let Some(detected_at) = tally.last_due else {
            continue;
        };

        let rate = tally.confirmed as f64 / due as f64;
        if rate >= policy.min_adherence_rate {
            continue;
        }

        let end = days_before(latest, index * window);
        let start = days_before(end, window - 1);
        let severity = if rate < policy.min_adherence_rate / 2.0 {
            Severity::High
        } else {
            Severity::Medium
        };

        anomalies.push(Anomaly {
            kind: AnomalyKind::LowAdherence,
            severity,
            description: format!(
                "adherence {:.0}% from {} to {} is below {:.0}% ({} of {} doses taken)",
                rate * 100.0,
                start,
                end,
                policy.min_adherence_rate * 100.0,
                tally.confirmed,
                due
            ),
            detected_at,
        });
    }

    anomalies
}

/// `date` moved back by `days`, saturating at the earliest representable date
fn days_before(date: NaiveDate, days: i64) -> NaiveDate {
    u64::try_from(days)
        .ok()
        .and_then(|days| date.checked_sub_days(Days::new(days)))
        .unwrap_or(NaiveDate::MIN)
}
