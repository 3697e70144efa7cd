//! Patient adherence reports.
//!
//! Combines every prescription of a patient over an optional date range into
//! one report: per-prescription timelines and summaries, an overall summary,
//! anomalies and the danger flag.

use crate::anomaly::{detect_anomalies, has_danger};
use crate::{
    expand_schedule, reconcile_with_grace, records_for, summarize, AdherenceSummary, Anomaly,
    Config, Error, IntakeRecord, Prescription, ResolvedSlot, Result,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Inclusive calendar date range
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(Error::Other(format!(
                "report range starts {} after it ends {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    /// Overlap of this range with a prescription's active period
    fn clamp(&self, prescription: &Prescription) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.from.max(prescription.start_date);
        let end = self.to.min(prescription.end_date);
        (start <= end).then_some((start, end))
    }
}

/// Report section for one prescription
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionReport {
    pub prescription_id: String,
    pub medication_name: String,
    pub dosage: String,
    pub summary: AdherenceSummary,
    pub anomalies: Vec<Anomaly>,
    pub slots: Vec<ResolvedSlot>,
}

/// Full adherence report for one patient
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceReport {
    pub as_of: NaiveDateTime,
    pub range: Option<DateRange>,
    pub prescriptions: Vec<PrescriptionReport>,
    pub summary: AdherenceSummary,
    pub adherence_rate: f64,
    pub missed_doses: usize,
    pub anomalies: Vec<Anomaly>,
    pub has_danger: bool,
}

impl AdherenceReport {
    pub fn is_empty(&self) -> bool {
        self.prescriptions.is_empty()
    }
}

/// Build a report over all prescriptions
///
/// Prescriptions outside `range` are omitted; prescriptions with an invalid
/// schedule are skipped with a warning.
pub fn build_report(
    prescriptions: &[Prescription],
    records: &[IntakeRecord],
    as_of: NaiveDateTime,
    range: Option<DateRange>,
    config: &Config,
) -> Result<AdherenceReport> {
    config.validate()?;
    let grace = config.reconcile.grace();

    let mut sections = Vec::new();
    let mut all_slots = Vec::new();
    let mut anomalies = Vec::new();

    for prescription in prescriptions {
        let scoped = match range {
            Some(range) => match range.clamp(prescription) {
                Some((start, end)) => Prescription {
                    start_date: start,
                    end_date: end,
                    ..prescription.clone()
                },
                None => {
                    tracing::debug!(
                        "Prescription {} is outside the report range",
                        prescription.id
                    );
                    continue;
                }
            },
            None => prescription.clone(),
        };

        let schedule = match expand_schedule(&scoped, as_of) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::warn!("Skipping prescription {} in report: {}", prescription.id, e);
                continue;
            }
        };

        let matched = records_for(prescription, records);
        let slots = reconcile_with_grace(&schedule, &matched, grace);
        let section_anomalies = detect_anomalies(&slots, &config.anomaly);

        all_slots.extend(slots.iter().cloned());
        anomalies.extend(section_anomalies.iter().cloned());

        sections.push(PrescriptionReport {
            prescription_id: prescription.id.clone(),
            medication_name: prescription.medication_name.clone(),
            dosage: prescription.dosage.clone(),
            summary: summarize(&slots),
            anomalies: section_anomalies,
            slots,
        });
    }

    anomalies.sort_by_key(|a| a.detected_at);
    let summary = summarize(&all_slots);

    tracing::info!(
        "Built report: {} prescriptions, {} slots, adherence {:.1}%",
        sections.len(),
        summary.total_slots,
        summary.adherence_rate * 100.0
    );

    Ok(AdherenceReport {
        as_of,
        range,
        adherence_rate: summary.adherence_rate,
        missed_doses: summary.missed_slots,
        has_danger: has_danger(&anomalies),
        prescriptions: sections,
        summary,
        anomalies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::tests::{at, date, twice_daily};
    use crate::{IntakeStatus, SlotStatus};

    fn confirmed(rx: &str, scheduled_at: NaiveDateTime) -> IntakeRecord {
        IntakeRecord {
            id: None,
            prescription_id: Some(rx.into()),
            medication_name: None,
            scheduled_at,
            confirmed_at: Some(scheduled_at),
            status: IntakeStatus::Confirmed,
        }
    }

    #[test]
    fn test_report_over_two_prescriptions() {
        let first = twice_daily(date(2024, 1, 1), date(2024, 1, 2));
        let mut second = twice_daily(date(2024, 1, 1), date(2024, 1, 2));
        second.id = "rx-2".into();
        second.medication_name = "Metformin".into();

        let records = vec![
            confirmed("rx-1", at(2024, 1, 1, 8, 0)),
            confirmed("rx-1", at(2024, 1, 1, 20, 0)),
            confirmed("rx-1", at(2024, 1, 2, 8, 0)),
            confirmed("rx-1", at(2024, 1, 2, 20, 0)),
        ];

        let report = build_report(
            &[first, second],
            &records,
            at(2024, 1, 3, 0, 0),
            None,
            &Config::default(),
        )
        .unwrap();

        assert_eq!(report.prescriptions.len(), 2);
        assert_eq!(report.prescriptions[0].summary.adherence_rate, 1.0);
        assert_eq!(report.prescriptions[1].summary.adherence_rate, 0.0);
        assert_eq!(report.summary.total_slots, 8);
        assert!((report.adherence_rate - 0.5).abs() < 1e-9);
        assert_eq!(report.missed_doses, 4);
        assert!(report.prescriptions[0].anomalies.is_empty());
        assert!(!report.prescriptions[1].anomalies.is_empty());
        assert!(report.has_danger);
    }

    #[test]
    fn test_range_clamps_and_filters() {
        let january = twice_daily(date(2024, 1, 1), date(2024, 1, 31));
        let mut march = twice_daily(date(2024, 3, 1), date(2024, 3, 31));
        march.id = "rx-3".into();

        let range = DateRange::new(date(2024, 1, 10), date(2024, 1, 12)).unwrap();
        let report = build_report(
            &[january, march],
            &[],
            at(2024, 2, 1, 0, 0),
            Some(range),
            &Config::default(),
        )
        .unwrap();

        assert_eq!(report.prescriptions.len(), 1);
        let slots = &report.prescriptions[0].slots;
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[0].slot.date, date(2024, 1, 10));
        assert!(slots.iter().all(|s| s.status == SlotStatus::Missed));
    }

    #[test]
    fn test_invalid_prescription_is_skipped() {
        let good = twice_daily(date(2024, 1, 1), date(2024, 1, 1));
        let mut bad = twice_daily(date(2024, 1, 1), date(2024, 1, 1));
        bad.id = "rx-bad".into();
        bad.dose_times.clear();

        let report =
            build_report(&[bad, good], &[], at(2024, 1, 1, 0, 0), None, &Config::default())
                .unwrap();

        assert_eq!(report.prescriptions.len(), 1);
        assert_eq!(report.prescriptions[0].prescription_id, "rx-1");
    }

    #[test]
    fn test_grace_from_config_applies() {
        let rx = twice_daily(date(2024, 1, 1), date(2024, 1, 1));
        let mut config = Config::default();
        config.reconcile.grace_minutes = 60;

        let report = build_report(&[rx], &[], at(2024, 1, 1, 8, 30), None, &config).unwrap();

        assert_eq!(report.summary.pending_slots, 2);
        assert_eq!(report.missed_doses, 0);
        assert!(!report.has_danger);
    }

    #[test]
    fn test_extreme_policy_values_do_not_overflow() {
        let rx = twice_daily(date(2024, 1, 1), date(2024, 1, 2));
        let mut config = Config::default();
        config.anomaly.window_days = 100_000_000;
        assert!(config.validate().is_ok());

        let report = build_report(&[rx], &[], at(2024, 1, 3, 0, 0), None, &config).unwrap();

        assert_eq!(report.missed_doses, 4);
        assert!(report.has_danger);
    }

    #[test]
    fn test_report_json_uses_client_field_names() {
        let rx = twice_daily(date(2024, 1, 1), date(2024, 1, 1));
        let report =
            build_report(&[rx], &[], at(2024, 1, 2, 0, 0), None, &Config::default()).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("adherenceRate").is_some());
        assert!(json.get("missedDoses").is_some());
        assert!(json.get("hasDanger").is_some());
        assert!(json["anomalies"].is_array());
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(DateRange::new(date(2024, 1, 2), date(2024, 1, 1)).is_err());
    }
}
