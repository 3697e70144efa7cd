//! Normalization of backend payloads.
//!
//! The backend and older client builds disagree on field names (`medication`
//! vs `medicationName`, nested `prescription` objects vs flat ids, numeric vs
//! string ids). Everything is mapped here into the canonical [`Prescription`]
//! and [`IntakeRecord`] types before it reaches reconciliation.
//!
//! Timestamps keep their wall-clock part: `2024-01-01T08:00:00Z` and
//! `2024-01-01T08:00:00+02:00` both mean 08:00 on the patient's calendar.

use crate::{DoseTime, Error, IntakeRecord, IntakeStatus, Prescription, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp in RFC 3339 or naive `YYYY-MM-DDTHH:MM[:SS]` form
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }

    let without_zone = s.strip_suffix('Z').unwrap_or(s);
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(without_zone, fmt).ok())
        .ok_or_else(|| Error::MalformedRecord(format!("unparseable timestamp '{}'", raw)))
}

/// Parse a calendar date (`YYYY-MM-DD`, or the date part of a timestamp)
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| parse_timestamp(s).map(|ts| ts.date()))
        .map_err(|_| Error::MalformedRecord(format!("unparseable date '{}'", raw)))
}

/// Normalize one intake payload
pub fn normalize_intake(value: &Value) -> Result<IntakeRecord> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::MalformedRecord("intake is not a JSON object".into()))?;
    let nested = obj.get("prescription");

    let scheduled_at = match obj.get("scheduledAt").and_then(Value::as_str) {
        Some(s) => parse_timestamp(s)?,
        None => return Err(Error::MalformedRecord("intake has no scheduledAt".into())),
    };

    let confirmed_at = match obj.get("confirmedAt") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(parse_timestamp(s)?),
        Some(other) => {
            return Err(Error::MalformedRecord(format!(
                "confirmedAt has unexpected type: {}",
                other
            )))
        }
    };

    let status = match obj.get("status").and_then(Value::as_str) {
        Some(s) => s.parse::<IntakeStatus>()?,
        None if confirmed_at.is_some() => IntakeStatus::Confirmed,
        None => IntakeStatus::Pending,
    };

    let prescription_id = obj
        .get("prescriptionId")
        .and_then(id_string)
        .or_else(|| nested.and_then(|p| p.get("id")).and_then(id_string));

    let medication_name = text_field(obj.get("medicationName"))
        .or_else(|| text_field(obj.get("medication")))
        .or_else(|| text_field(nested.and_then(|p| p.get("medicationName"))));

    Ok(IntakeRecord {
        id: obj.get("id").and_then(id_string),
        prescription_id,
        medication_name,
        scheduled_at,
        confirmed_at,
        status,
    })
}

/// Normalize a batch of intake payloads, skipping malformed entries
pub fn normalize_intakes(values: &[Value]) -> Vec<IntakeRecord> {
    let records: Vec<_> = values
        .iter()
        .enumerate()
        .filter_map(|(index, value)| match normalize_intake(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping intake #{}: {}", index, e);
                None
            }
        })
        .collect();

    tracing::debug!("Normalized {} of {} intakes", records.len(), values.len());
    records
}

/// Normalize one prescription payload
///
/// Dates and dose times are parsed but not checked against each other; that
/// happens when the schedule is expanded.
pub fn normalize_prescription(value: &Value) -> Result<Prescription> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::MalformedRecord("prescription is not a JSON object".into()))?;

    let id = obj
        .get("id")
        .and_then(id_string)
        .ok_or_else(|| Error::MalformedRecord("prescription has no id".into()))?;

    let medication_name = text_field(obj.get("medicationName"))
        .or_else(|| text_field(obj.get("medication")))
        .ok_or_else(|| {
            Error::MalformedRecord(format!("prescription {} has no medication name", id))
        })?;

    let date_field = |key: &str| -> Result<NaiveDate> {
        obj.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedRecord(format!("prescription {} has no {}", id, key)))
            .and_then(parse_date)
    };

    let dose_times = match obj.get("doseTimes") {
        Some(Value::Array(items)) => items
            .iter()
            .map(dose_time)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::MalformedRecord(format!("prescription {}: {}", id, e)))?,
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            return Err(Error::MalformedRecord(format!(
                "prescription {} has non-list doseTimes",
                id
            )))
        }
    };

    Ok(Prescription {
        medication_name,
        dosage: text_field(obj.get("dosage")).unwrap_or_default(),
        start_date: date_field("startDate")?,
        end_date: date_field("endDate")?,
        dose_times,
        id,
    })
}

/// Normalize a batch of prescription payloads, skipping malformed entries
pub fn normalize_prescriptions(values: &[Value]) -> Vec<Prescription> {
    values
        .iter()
        .enumerate()
        .filter_map(|(index, value)| match normalize_prescription(value) {
            Ok(prescription) => Some(prescription),
            Err(e) => {
                tracing::warn!("Skipping prescription #{}: {}", index, e);
                None
            }
        })
        .collect()
}

/// Records belonging to a prescription
///
/// Linked by prescription id when the record carries one, otherwise by
/// medication name (trimmed, case-insensitive).
pub fn records_for(prescription: &Prescription, records: &[IntakeRecord]) -> Vec<IntakeRecord> {
    let medication = prescription.medication_name.trim().to_lowercase();

    records
        .iter()
        .filter(|r| match (&r.prescription_id, &r.medication_name) {
            (Some(id), _) => id == &prescription.id,
            (None, Some(name)) => name.trim().to_lowercase() == medication,
            (None, None) => false,
        })
        .cloned()
        .collect()
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn dose_time(value: &Value) -> Result<DoseTime> {
    match value {
        Value::String(s) => s.parse(),
        Value::Object(obj) => {
            let part = |key: &str| {
                obj.get(key)
                    .and_then(Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| Error::MalformedRecord(format!("dose time missing {}", key)))
            };
            DoseTime::new(part("hour")?, part("minute")?)
        }
        other => Err(Error::MalformedRecord(format!(
            "unexpected dose time: {}",
            other
        ))),
    }
}
