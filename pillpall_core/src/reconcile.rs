//! Intake reconciliation.
//!
//! Matches the expected slots of a [`Schedule`] against logged intake records
//! by value: a record matches a slot when its scheduled timestamp, truncated to
//! the minute, falls on the slot's date and time of day.
//!
//! When several records share a slot key they are ranked: confirmed records
//! first (earliest confirmation wins), then backend-missed records, then
//! pending ones. Duplicate slots for the same key take ranked records in turn.

use crate::{IntakeRecord, IntakeStatus, ResolvedSlot, Schedule, SlotKey, SlotStatus};
use chrono::{Duration, NaiveDateTime};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Reconcile a schedule against intake records with no grace window
///
/// Records should already be filtered to the schedule's prescription
/// (see [`crate::records_for`]). Output has the same order as the schedule.
pub fn reconcile(schedule: &Schedule, records: &[IntakeRecord]) -> Vec<ResolvedSlot> {
    reconcile_with_grace(schedule, records, Duration::zero())
}

/// Reconcile, treating an unmatched slot as missed only once `grace` has
/// elapsed after its scheduled time
pub fn reconcile_with_grace(
    schedule: &Schedule,
    records: &[IntakeRecord],
    grace: Duration,
) -> Vec<ResolvedSlot> {
    let mut by_key: HashMap<SlotKey, Vec<&IntakeRecord>> = HashMap::new();
    for record in records {
        by_key.entry(record.key()).or_default().push(record);
    }

    for candidates in by_key.values_mut() {
        if candidates.len() > 1 {
            candidates.sort_by(|a, b| rank(a, b));
        }
    }

    let mut taken: HashMap<SlotKey, usize> = HashMap::new();
    let mut resolved = Vec::with_capacity(schedule.len());

    for slot in schedule.iter() {
        let key = slot.key();
        let index = taken.entry(key).or_insert(0);
        let matched = by_key.get(&key).and_then(|c| c.get(*index)).copied();
        *index += 1;

        let (status, confirmed_at, record_id) = match matched {
            Some(record) if record.is_confirmed() => (
                SlotStatus::Confirmed,
                record.confirmed_at,
                record.id.clone(),
            ),
            Some(record) if record.status == IntakeStatus::Missed => {
                (SlotStatus::Missed, None, record.id.clone())
            }
            Some(record) => (SlotStatus::Pending, None, record.id.clone()),
            None if schedule.is_past(&slot, grace) => (SlotStatus::Missed, None, None),
            None => (SlotStatus::Pending, None, None),
        };

        resolved.push(ResolvedSlot {
            slot,
            status,
            confirmed_at,
            record_id,
        });
    }

    let unmatched = records.len() - handed_out(&by_key, &taken);
    if unmatched > 0 {
        tracing::debug!(
            "{} intake records for prescription {} matched no slot",
            unmatched,
            schedule.prescription_id()
        );
    }

    resolved
}

/// Number of records assigned to a slot, given how many slots drew on each key
fn handed_out(
    by_key: &HashMap<SlotKey, Vec<&IntakeRecord>>,
    taken: &HashMap<SlotKey, usize>,
) -> usize {
    taken
        .iter()
        .map(|(key, &slots)| by_key.get(key).map_or(0, |c| c.len().min(slots)))
        .sum()
}

/// Precedence between records competing for one slot
fn rank(a: &IntakeRecord, b: &IntakeRecord) -> Ordering {
    tier(a)
        .cmp(&tier(b))
        .then_with(|| confirmation_order(a.confirmed_at, b.confirmed_at))
}

fn tier(record: &IntakeRecord) -> u8 {
    if record.is_confirmed() {
        0
    } else if record.status == IntakeStatus::Missed {
        1
    } else {
        2
    }
}

/// Earliest confirmation first; records without a timestamp sort last
fn confirmation_order(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
