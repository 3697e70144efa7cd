//! Adherence summaries over resolved slots.

use crate::{AdherenceSummary, ResolvedSlot, SlotStatus};

/// Count resolved slots by status and compute the adherence rate
///
/// Total over any input; an empty slice yields an all-zero summary.
pub fn summarize(resolved: &[ResolvedSlot]) -> AdherenceSummary {
    let mut confirmed = 0;
    let mut missed = 0;
    let mut pending = 0;
    let mut delay_total = 0i64;
    let mut delay_count = 0usize;

    for slot in resolved {
        match slot.status {
            SlotStatus::Confirmed => confirmed += 1,
            SlotStatus::Missed => missed += 1,
            SlotStatus::Pending => pending += 1,
        }
        if let Some(delay) = slot.delay_minutes() {
            delay_total += delay;
            delay_count += 1;
        }
    }

    AdherenceSummary {
        total_slots: resolved.len(),
        confirmed_slots: confirmed,
        missed_slots: missed,
        pending_slots: pending,
        adherence_rate: rate(confirmed, missed),
        average_delay_minutes: (delay_count > 0)
            .then(|| delay_total as f64 / delay_count as f64),
    }
}

fn rate(confirmed: usize, missed: usize) -> f64 {
    let due = confirmed + missed;
    if due == 0 {
        0.0
    } else {
        confirmed as f64 / due as f64
    }
}

impl AdherenceSummary {
    /// Slots whose status is settled (confirmed or missed)
    pub fn due_slots(&self) -> usize {
        self.confirmed_slots + self.missed_slots
    }
}
