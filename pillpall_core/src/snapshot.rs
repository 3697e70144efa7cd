//! Backend snapshot loading.
//!
//! Prescriptions and intake history fetched from the backend are stored as
//! JSON arrays of raw payloads and normalized on load.

use crate::normalize::{normalize_intakes, normalize_prescriptions};
use crate::{IntakeRecord, Prescription, Result};
use serde_json::Value;
use std::path::Path;

/// Load prescriptions from a JSON array file
///
/// Returns an empty list if the file doesn't exist. Returns an error if the
/// file is not a JSON array; individual malformed entries are skipped.
pub fn load_prescriptions(path: &Path) -> Result<Vec<Prescription>> {
    let Some(values) = read_array(path)? else {
        return Ok(Vec::new());
    };

    let prescriptions = normalize_prescriptions(&values);
    tracing::info!(
        "Loaded {} prescriptions from {:?}",
        prescriptions.len(),
        path
    );
    Ok(prescriptions)
}

/// Load intake records from a JSON array file
pub fn load_intake_records(path: &Path) -> Result<Vec<IntakeRecord>> {
    let Some(values) = read_array(path)? else {
        return Ok(Vec::new());
    };

    let records = normalize_intakes(&values);
    tracing::info!("Loaded {} intakes from {:?}", records.len(), path);
    Ok(records)
}

fn read_array(path: &Path) -> Result<Option<Vec<Value>>> {
    if !path.exists() {
        tracing::debug!("No snapshot found at {:?}", path);
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)?;
    let values: Vec<Value> = serde_json::from_str(&contents)?;
    Ok(Some(values))
}
