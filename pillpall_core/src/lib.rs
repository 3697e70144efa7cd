#![forbid(unsafe_code)]

//! Core domain model and adherence logic for PillPall.
//!
//! This crate provides:
//! - Domain types (prescriptions, intake slots and records, summaries, anomalies)
//! - Schedule expansion and intake reconciliation
//! - Adherence summaries and anomaly detection
//! - Normalization of backend payloads
//! - Persistence (intake log, snapshots, CSV export)
//! - Patient reports

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod normalize;
pub mod schedule;
pub mod reconcile;
pub mod summary;
pub mod anomaly;
pub mod intake_log;
pub mod snapshot;
pub mod export;
pub mod report;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use schedule::{expand_schedule, Schedule, SlotIter};
pub use reconcile::{reconcile, reconcile_with_grace};
pub use summary::summarize;
pub use anomaly::{detect_anomalies, has_danger, AnomalyPolicy};
pub use normalize::{
    normalize_intake, normalize_intakes, normalize_prescription, normalize_prescriptions,
    parse_date, parse_timestamp, records_for,
};
pub use intake_log::{confirm_slot, read_records, IntakeSink, JsonlIntakeLog};
pub use snapshot::{load_intake_records, load_prescriptions};
pub use export::export_timeline_csv;
pub use report::{build_report, AdherenceReport, DateRange, PrescriptionReport};
