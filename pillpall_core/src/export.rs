//! CSV export of reconciled timelines.
//!
//! The export is written to a temporary file next to the destination, synced,
//! and renamed into place so a reader never sees a half-written file.

use crate::report::AdherenceReport;
use crate::{Error, Result};
use std::path::Path;
use tempfile::NamedTempFile;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct TimelineRow<'a> {
    prescription_id: &'a str,
    medication: &'a str,
    date: String,
    time: String,
    status: String,
    confirmed_at: Option<String>,
    delay_minutes: Option<i64>,
}

/// Write every slot of a report to a CSV file, replacing any existing file
///
/// Returns the number of rows written.
pub fn export_timeline_csv(path: &Path, report: &AdherenceReport) -> Result<usize> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(temp.as_file());

    let mut count = 0;
    for section in &report.prescriptions {
        for resolved in &section.slots {
            writer.serialize(TimelineRow {
                prescription_id: &section.prescription_id,
                medication: &section.medication_name,
                date: resolved.slot.date.to_string(),
                time: resolved.slot.time.to_string(),
                status: resolved.status.to_string(),
                confirmed_at: resolved
                    .confirmed_at
                    .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string()),
                delay_minutes: resolved.delay_minutes(),
            })?;
            count += 1;
        }
    }

    writer.flush()?;
    drop(writer);
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::info!("Exported {} slots to {:?}", count, path);
    Ok(count)
}
