//! Core domain types for PillPall adherence tracking.
//!
//! This module defines the fundamental types used throughout the system:
//! - Prescriptions and their daily dose times
//! - Expected intake slots derived from a schedule
//! - Intake records logged by the backend or the local log
//! - Resolved slots, adherence summaries and anomalies

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Prescription Types
// ============================================================================

/// A time of day at which a dose is due
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DoseTime {
    pub hour: u32,
    pub minute: u32,
}

impl DoseTime {
    /// Create a dose time, rejecting out-of-range hours or minutes
    pub fn new(hour: u32, minute: u32) -> crate::Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(crate::Error::InvalidSchedule(format!(
                "dose time {:02}:{:02} out of range",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Wall-clock time of this dose
    pub fn as_naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0)
    }
}

impl fmt::Display for DoseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for DoseTime {
    type Err = crate::Error;

    /// Parse `HH:MM` (a trailing `:SS` is accepted and ignored)
    fn from_str(s: &str) -> crate::Result<Self> {
        let mut parts = s.trim().split(':');
        let parse = |p: Option<&str>| -> crate::Result<u32> {
            p.and_then(|v| v.trim().parse::<u32>().ok()).ok_or_else(|| {
                crate::Error::InvalidSchedule(format!("invalid dose time '{}'", s))
            })
        };
        let hour = parse(parts.next())?;
        let minute = parse(parts.next())?;
        Self::new(hour, minute)
    }
}

/// A prescription as issued by a doctor
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: String,
    pub medication_name: String,
    #[serde(default)]
    pub dosage: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dose_times: Vec<DoseTime>,
}

// ============================================================================
// Slot Types
// ============================================================================

/// One expected dose occurrence
///
/// Identified by `(prescription_id, date, time)`; no backend id exists until a
/// matching record is confirmed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct IntakeSlot {
    pub prescription_id: String,
    pub date: NaiveDate,
    pub time: DoseTime,
}

impl IntakeSlot {
    /// Scheduled timestamp of this slot
    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.date
            .and_time(self.time.as_naive_time().unwrap_or(NaiveTime::MIN))
    }

    /// Value key used to match records against this slot
    pub fn key(&self) -> SlotKey {
        SlotKey {
            date: self.date,
            time: self.time,
        }
    }
}

/// Matching key shared by slots and records: calendar date and minute of day
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub time: DoseTime,
}

impl SlotKey {
    /// Key of a timestamp, truncated to the minute
    pub fn from_timestamp(ts: NaiveDateTime) -> Self {
        use chrono::Timelike;
        Self {
            date: ts.date(),
            time: DoseTime {
                hour: ts.hour(),
                minute: ts.minute(),
            },
        }
    }
}

// ============================================================================
// Intake Record Types
// ============================================================================

/// Status of a logged intake event
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntakeStatus {
    Pending,
    Confirmed,
    Missed,
}

impl FromStr for IntakeStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "MISSED" => Ok(Self::Missed),
            other => Err(crate::Error::MalformedRecord(format!(
                "unknown intake status '{}'",
                other
            ))),
        }
    }
}

/// A logged intake event, normalized from a backend payload or the local log
///
/// Timestamps are patient wall-clock times.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRecord {
    pub id: Option<String>,
    pub prescription_id: Option<String>,
    pub medication_name: Option<String>,
    pub scheduled_at: NaiveDateTime,
    pub confirmed_at: Option<NaiveDateTime>,
    pub status: IntakeStatus,
}

impl IntakeRecord {
    /// A record counts as taken when confirmed by status or by timestamp
    pub fn is_confirmed(&self) -> bool {
        self.status == IntakeStatus::Confirmed || self.confirmed_at.is_some()
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::from_timestamp(self.scheduled_at)
    }
}

// ============================================================================
// Reconciliation Output Types
// ============================================================================

/// Resolved status of an expected slot
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Confirmed,
    Missed,
    Pending,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Confirmed => write!(f, "CONFIRMED"),
            SlotStatus::Missed => write!(f, "MISSED"),
            SlotStatus::Pending => write!(f, "PENDING"),
        }
    }
}

/// A slot together with its reconciled status
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSlot {
    pub slot: IntakeSlot,
    pub status: SlotStatus,
    pub confirmed_at: Option<NaiveDateTime>,
    /// Id of the record the status was taken from, if any
    pub record_id: Option<String>,
}

impl ResolvedSlot {
    /// Minutes between the scheduled time and confirmation (negative if early)
    pub fn delay_minutes(&self) -> Option<i64> {
        if self.status != SlotStatus::Confirmed {
            return None;
        }
        self.confirmed_at
            .map(|at| (at - self.slot.scheduled_at()).num_minutes())
    }

    /// Whether the slot was due (taken or missed) rather than still pending
    pub fn is_due(&self) -> bool {
        self.status != SlotStatus::Pending
    }
}

/// Aggregate adherence statistics over a set of resolved slots
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceSummary {
    pub total_slots: usize,
    pub confirmed_slots: usize,
    pub missed_slots: usize,
    pub pending_slots: usize,
    /// `confirmed / (confirmed + missed)`, 0 when nothing is due yet
    pub adherence_rate: f64,
    pub average_delay_minutes: Option<f64>,
}

// ============================================================================
// Anomaly Types
// ============================================================================

/// Kind of adherence-risk pattern
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// A run of consecutive missed doses
    ConsecutiveMiss,
    /// A trailing window whose adherence rate is below the policy minimum
    LowAdherence,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::ConsecutiveMiss => write!(f, "CONSECUTIVE_MISS"),
            AnomalyKind::LowAdherence => write!(f, "LOW_ADHERENCE"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

/// A detected adherence-risk pattern
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
    pub detected_at: NaiveDateTime,
}

/// Length of an inclusive date range in days
pub(crate) fn days_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}
