//! Local intake confirmation log.
//!
//! Confirmations made on this device are appended to a JSONL (JSON Lines)
//! file with file locking so that concurrent invocations cannot interleave
//! partial lines.

use crate::{IntakeRecord, IntakeSlot, IntakeStatus, Result};
use chrono::NaiveDateTime;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Sink for persisting intake records
pub trait IntakeSink {
    fn append(&mut self, record: &IntakeRecord) -> Result<()>;
}

/// JSONL-based intake log with file locking
pub struct JsonlIntakeLog {
    path: PathBuf,
}

impl JsonlIntakeLog {
    /// Create a new log writer for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl JsonlIntakeLog {
    /// Append `record` unless `skip` rejects it, deciding under the exclusive lock
    ///
    /// `skip` sees every record already in the log, so a check-then-append
    /// from several processes cannot both succeed. Returns whether the record
    /// was written.
    pub fn append_unless<F>(&mut self, record: &IntakeRecord, skip: F) -> Result<bool>
    where
        F: FnOnce(&[IntakeRecord]) -> bool,
    {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let existing = parse_lines(BufReader::new(&file))?;
        let written = if skip(&existing) {
            false
        } else {
            write_line(&file, record)?;
            true
        };

        file.unlock()?;

        if written {
            tracing::debug!(
                "Appended intake {} at {} to log",
                record.id.as_deref().unwrap_or("<unsaved>"),
                record.scheduled_at
            );
        }
        Ok(written)
    }
}

impl IntakeSink for JsonlIntakeLog {
    fn append(&mut self, record: &IntakeRecord) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;
        write_line(&file, record)?;
        file.unlock()?;

        tracing::debug!(
            "Appended intake {} at {} to log",
            record.id.as_deref().unwrap_or("<unsaved>"),
            record.scheduled_at
        );
        Ok(())
    }
}

fn write_line(file: &File, record: &IntakeRecord) -> Result<()> {
    let mut writer = std::io::BufWriter::new(file);
    let line = serde_json::to_string(record)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn parse_lines(reader: impl BufRead) -> Result<Vec<IntakeRecord>> {
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<IntakeRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Failed to parse intake at line {}: {}", line_num + 1, e);
            }
        }
    }

    Ok(records)
}

/// Build a confirmed intake record for a slot
pub fn confirm_slot(slot: &IntakeSlot, confirmed_at: NaiveDateTime) -> IntakeRecord {
    IntakeRecord {
        id: Some(Uuid::new_v4().to_string()),
        prescription_id: Some(slot.prescription_id.clone()),
        medication_name: None,
        scheduled_at: slot.scheduled_at(),
        confirmed_at: Some(confirmed_at),
        status: IntakeStatus::Confirmed,
    }
}

/// Read all records from a log file
///
/// A missing file yields an empty list; unparseable lines are skipped.
pub fn read_records(path: &Path) -> Result<Vec<IntakeRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let records = parse_lines(BufReader::new(&file))?;

    file.unlock()?;
    tracing::debug!("Read {} intakes from log", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::tests::{at, date};
    use crate::DoseTime;

    fn morning_slot(day: u32) -> IntakeSlot {
        IntakeSlot {
            prescription_id: "rx-1".into(),
            date: date(2024, 1, day),
            time: DoseTime { hour: 8, minute: 0 },
        }
    }

    #[test]
    fn test_confirm_slot_builds_confirmed_record() {
        let record = confirm_slot(&morning_slot(1), at(2024, 1, 1, 8, 7));

        assert!(record.id.is_some());
        assert_eq!(record.prescription_id.as_deref(), Some("rx-1"));
        assert_eq!(record.scheduled_at, at(2024, 1, 1, 8, 0));
        assert_eq!(record.confirmed_at, Some(at(2024, 1, 1, 8, 7)));
        assert_eq!(record.status, IntakeStatus::Confirmed);
    }

    #[test]
    fn test_append_and_read_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("logs").join("intakes.wal");

        let mut log = JsonlIntakeLog::new(&log_path);
        for day in 1..=3 {
            log.append(&confirm_slot(&morning_slot(day), at(2024, 1, day, 8, 1)))
                .unwrap();
        }

        let records = read_records(&log_path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].scheduled_at, at(2024, 1, 3, 8, 0));
    }

    #[test]
    fn test_read_missing_log_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let records = read_records(&temp_dir.path().join("nonexistent.wal")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_corrupted_lines_are_skipped() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("intakes.wal");

        let mut log = JsonlIntakeLog::new(&log_path);
        log.append(&confirm_slot(&morning_slot(1), at(2024, 1, 1, 8, 0)))
            .unwrap();

        let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
        writeln!(file, "{{ partial json").unwrap();
        drop(file);

        log.append(&confirm_slot(&morning_slot(2), at(2024, 1, 2, 8, 0)))
            .unwrap();

        let records = read_records(&log_path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_append_unless_sees_existing_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("intakes.wal");
        let mut log = JsonlIntakeLog::new(&log_path);
        let record = confirm_slot(&morning_slot(1), at(2024, 1, 1, 8, 2));

        let first = log
            .append_unless(&record, |existing| !existing.is_empty())
            .unwrap();
        let second = log
            .append_unless(&record, |existing| !existing.is_empty())
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(read_records(&log_path).unwrap().len(), 1);
    }
}
