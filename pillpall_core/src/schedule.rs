//! Schedule expansion.
//!
//! Turns a prescription's date range and daily dose times into the sequence
//! of expected intake slots, ordered by date and then by time of day.

use crate::types::days_inclusive;
use crate::{DoseTime, Error, IntakeSlot, Prescription, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// The expanded schedule of one prescription, evaluated as of a given time
///
/// Slots are produced lazily by [`Schedule::iter`]; each call starts a fresh
/// pass over the same sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Schedule {
    prescription_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    dose_times: Vec<DoseTime>,
    as_of: NaiveDateTime,
}

/// Expand a prescription into its schedule of expected slots
///
/// Fails with [`Error::InvalidSchedule`] when `start_date > end_date`, when
/// `dose_times` is empty, or when a dose time is out of range.
pub fn expand_schedule(prescription: &Prescription, as_of: NaiveDateTime) -> Result<Schedule> {
    if prescription.start_date > prescription.end_date {
        return Err(Error::InvalidSchedule(format!(
            "prescription {} starts {} after it ends {}",
            prescription.id, prescription.start_date, prescription.end_date
        )));
    }

    if prescription.dose_times.is_empty() {
        return Err(Error::InvalidSchedule(format!(
            "prescription {} has no dose times",
            prescription.id
        )));
    }

    let mut dose_times = prescription
        .dose_times
        .iter()
        .map(|t| DoseTime::new(t.hour, t.minute))
        .collect::<Result<Vec<_>>>()?;

    // Stable: duplicates keep their insertion order
    dose_times.sort();

    tracing::debug!(
        "Expanded prescription {} ({} days x {} doses)",
        prescription.id,
        days_inclusive(prescription.start_date, prescription.end_date),
        dose_times.len()
    );

    Ok(Schedule {
        prescription_id: prescription.id.clone(),
        start_date: prescription.start_date,
        end_date: prescription.end_date,
        dose_times,
        as_of,
    })
}

impl Schedule {
    pub fn prescription_id(&self) -> &str {
        &self.prescription_id
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// The caller's "now" this schedule is evaluated against
    pub fn as_of(&self) -> NaiveDateTime {
        self.as_of
    }

    /// Dose times in slot order
    pub fn dose_times(&self) -> &[DoseTime] {
        &self.dose_times
    }

    /// Number of slots: days in range times dose times per day
    pub fn len(&self) -> usize {
        days_inclusive(self.start_date, self.end_date) as usize * self.dose_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over all slots in chronological order
    pub fn iter(&self) -> SlotIter<'_> {
        SlotIter {
            schedule: self,
            day: 0,
            dose: 0,
            remaining: self.len(),
        }
    }

    /// Whether a slot's dose window has passed, allowing `grace` after its time
    ///
    /// The boundary is exclusive: a slot due exactly at `as_of` is not past.
    /// A grace reaching beyond the representable range never elapses.
    pub fn is_past(&self, slot: &IntakeSlot, grace: Duration) -> bool {
        slot.scheduled_at()
            .checked_add_signed(grace)
            .is_some_and(|deadline| deadline < self.as_of)
    }
}

impl<'a> IntoIterator for &'a Schedule {
    type Item = IntakeSlot;
    type IntoIter = SlotIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over the slots of a [`Schedule`]
#[derive(Clone, Debug)]
pub struct SlotIter<'a> {
    schedule: &'a Schedule,
    day: i64,
    dose: usize,
    remaining: usize,
}

impl Iterator for SlotIter<'_> {
    type Item = IntakeSlot;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let time = self.schedule.dose_times[self.dose];
        let date = self.schedule.start_date + Duration::days(self.day);

        self.dose += 1;
        if self.dose == self.schedule.dose_times.len() {
            self.dose = 0;
            self.day += 1;
        }
        self.remaining -= 1;

        Some(IntakeSlot {
            prescription_id: self.schedule.prescription_id.clone(),
            date,
            time,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SlotIter<'_> {}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    pub(crate) fn twice_daily(start: NaiveDate, end: NaiveDate) -> Prescription {
        Prescription {
            id: "rx-1".into(),
            medication_name: "Amoxicillin".into(),
            dosage: "500mg".into(),
            start_date: start,
            end_date: end,
            dose_times: vec![
                DoseTime { hour: 8, minute: 0 },
                DoseTime { hour: 20, minute: 0 },
            ],
        }
    }

    #[test]
    fn test_slot_count_is_days_times_doses() {
        let rx = twice_daily(date(2024, 1, 1), date(2024, 1, 10));
        let schedule = expand_schedule(&rx, at(2024, 1, 1, 0, 0)).unwrap();

        assert_eq!(schedule.len(), 20);
        assert_eq!(schedule.iter().count(), 20);
        assert_eq!(schedule.iter().len(), 20);
    }

    #[test]
    fn test_slots_ordered_by_date_then_time() {
        let mut rx = twice_daily(date(2024, 1, 1), date(2024, 1, 2));
        // Evening dose entered first
        rx.dose_times = vec![
            DoseTime { hour: 20, minute: 0 },
            DoseTime { hour: 8, minute: 0 },
        ];

        let schedule = expand_schedule(&rx, at(2024, 1, 1, 0, 0)).unwrap();
        let stamps: Vec<_> = schedule.iter().map(|s| s.scheduled_at()).collect();

        assert_eq!(
            stamps,
            vec![
                at(2024, 1, 1, 8, 0),
                at(2024, 1, 1, 20, 0),
                at(2024, 1, 2, 8, 0),
                at(2024, 1, 2, 20, 0),
            ]
        );
    }

    #[test]
    fn test_iteration_is_restartable() {
        let rx = twice_daily(date(2024, 1, 1), date(2024, 1, 3));
        let schedule = expand_schedule(&rx, at(2024, 1, 1, 0, 0)).unwrap();

        let first: Vec<_> = schedule.iter().collect();
        let second: Vec<_> = (&schedule).into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_day_range() {
        let rx = twice_daily(date(2024, 3, 5), date(2024, 3, 5));
        let schedule = expand_schedule(&rx, at(2024, 3, 5, 0, 0)).unwrap();
        assert_eq!(schedule.len(), 2);
        assert!(schedule.iter().all(|s| s.date == date(2024, 3, 5)));
    }

    #[test]
    fn test_duplicate_dose_times_are_kept() {
        let mut rx = twice_daily(date(2024, 1, 1), date(2024, 1, 1));
        rx.dose_times.push(DoseTime { hour: 8, minute: 0 });

        let schedule = expand_schedule(&rx, at(2024, 1, 1, 0, 0)).unwrap();
        let times: Vec<_> = schedule.iter().map(|s| s.time.to_string()).collect();
        assert_eq!(times, vec!["08:00", "08:00", "20:00"]);
    }

    #[test]
    fn test_empty_dose_times_rejected() {
        let mut rx = twice_daily(date(2024, 1, 1), date(2024, 1, 2));
        rx.dose_times.clear();

        let result = expand_schedule(&rx, at(2024, 1, 1, 0, 0));
        assert!(matches!(result, Err(Error::InvalidSchedule(_))));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let rx = twice_daily(date(2024, 1, 5), date(2024, 1, 1));

        let result = expand_schedule(&rx, at(2024, 1, 1, 0, 0));
        assert!(matches!(result, Err(Error::InvalidSchedule(_))));
    }

    #[test]
    fn test_out_of_range_dose_time_rejected() {
        let mut rx = twice_daily(date(2024, 1, 1), date(2024, 1, 1));
        rx.dose_times.push(DoseTime { hour: 25, minute: 0 });

        let result = expand_schedule(&rx, at(2024, 1, 1, 0, 0));
        assert!(matches!(result, Err(Error::InvalidSchedule(_))));
    }

    #[test]
    fn test_is_past_boundary_is_exclusive() {
        let rx = twice_daily(date(2024, 1, 1), date(2024, 1, 1));
        let schedule = expand_schedule(&rx, at(2024, 1, 1, 8, 0)).unwrap();
        let morning = schedule.iter().next().unwrap();

        assert!(!schedule.is_past(&morning, Duration::zero()));

        let later = expand_schedule(&rx, at(2024, 1, 1, 8, 1)).unwrap();
        assert!(later.is_past(&morning, Duration::zero()));
        assert!(!later.is_past(&morning, Duration::minutes(30)));
    }

    #[test]
    fn test_grace_beyond_calendar_never_elapses() {
        let rx = twice_daily(date(2024, 1, 1), date(2024, 1, 1));
        let schedule = expand_schedule(&rx, at(2030, 1, 1, 0, 0)).unwrap();
        let morning = schedule.iter().next().unwrap();

        assert!(!schedule.is_past(&morning, Duration::days(1_000_000_000)));
    }
}
