use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use pillpall_core::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pillpall")]
#[command(about = "Medication adherence tracking for PillPall", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Load configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evaluate as of this time (YYYY-MM-DDTHH:MM), defaults to now
    #[arg(long, global = true)]
    as_of: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every expected dose of a prescription with its status
    Schedule {
        /// Prescription id
        #[arg(long)]
        prescription: String,
    },

    /// Record that a scheduled dose was taken
    Confirm {
        /// Prescription id
        #[arg(long)]
        prescription: String,

        /// Scheduled time of the dose (YYYY-MM-DDTHH:MM)
        #[arg(long)]
        at: String,

        /// When the dose was taken, defaults to --as-of
        #[arg(long)]
        confirmed_at: Option<String>,
    },

    /// Adherence report across all prescriptions (default)
    Report {
        /// First day of the report (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Last day of the report (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the reconciled timeline of all prescriptions as CSV
    Export {
        /// Destination CSV file
        #[arg(long)]
        out: PathBuf,
    },
}

/// Files inside the data directory
struct DataPaths {
    prescriptions: PathBuf,
    intakes: PathBuf,
    log: PathBuf,
}

impl DataPaths {
    fn new(data_dir: &Path) -> Self {
        Self {
            prescriptions: data_dir.join("prescriptions.json"),
            intakes: data_dir.join("intakes.json"),
            log: data_dir.join("intakes.wal"),
        }
    }

    /// Backend intake history plus confirmations logged on this device
    fn load_records(&self) -> Result<Vec<IntakeRecord>> {
        let mut records = load_intake_records(&self.intakes)?;
        records.extend(read_records(&self.log)?);
        Ok(records)
    }
}

fn main() -> ExitCode {
    // Initialize logging
    pillpall_core::logging::init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());
    let paths = DataPaths::new(&data_dir);

    let as_of = match cli.as_of {
        Some(ref s) => parse_timestamp(s)?,
        None => chrono::Local::now().naive_local(),
    };
    tracing::debug!("Using data directory {:?} as of {}", data_dir, as_of);

    match cli.command {
        Some(Commands::Schedule { prescription }) => {
            cmd_schedule(&paths, &prescription, as_of, &config)
        }
        Some(Commands::Confirm {
            prescription,
            at,
            confirmed_at,
        }) => cmd_confirm(&paths, &prescription, &at, confirmed_at, as_of),
        Some(Commands::Report { from, to, json }) => {
            cmd_report(&paths, from, to, json, as_of, &config)
        }
        Some(Commands::Export { out }) => cmd_export(&paths, &out, as_of, &config),
        None => cmd_report(&paths, None, None, false, as_of, &config),
    }
}

fn find_prescription(paths: &DataPaths, id: &str) -> Result<Prescription> {
    load_prescriptions(&paths.prescriptions)?
        .into_iter()
        .find(|p| p.id == id)
        .ok_or_else(|| Error::NotFound(format!("prescription {}", id)))
}

fn cmd_schedule(
    paths: &DataPaths,
    prescription_id: &str,
    as_of: NaiveDateTime,
    config: &Config,
) -> Result<()> {
    let prescription = find_prescription(paths, prescription_id)?;
    let schedule = expand_schedule(&prescription, as_of)?;
    let records = records_for(&prescription, &paths.load_records()?);
    let resolved = reconcile_with_grace(&schedule, &records, config.reconcile.grace());

    println!(
        "\n  {} {} ({} to {})",
        prescription.medication_name,
        prescription.dosage,
        prescription.start_date,
        prescription.end_date
    );
    println!("─────────────────────────────────────────");

    for slot in &resolved {
        let confirmed = slot
            .confirmed_at
            .map(|t| format!("  taken {}", t.format("%Y-%m-%d %H:%M")))
            .unwrap_or_default();
        println!(
            "  {} {}  {:<9}{}",
            slot.slot.date,
            slot.slot.time,
            slot.status.to_string(),
            confirmed
        );
    }

    let summary = summarize(&resolved);
    println!("─────────────────────────────────────────");
    print_summary(&summary);

    Ok(())
}

fn cmd_confirm(
    paths: &DataPaths,
    prescription_id: &str,
    at: &str,
    confirmed_at: Option<String>,
    as_of: NaiveDateTime,
) -> Result<()> {
    let prescription = find_prescription(paths, prescription_id)?;
    let schedule = expand_schedule(&prescription, as_of)?;

    let wanted = SlotKey::from_timestamp(parse_timestamp(at)?);
    let slot = schedule
        .iter()
        .find(|s| s.key() == wanted)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no dose of prescription {} scheduled at {}",
                prescription_id, at
            ))
        })?;

    let confirmed_at = match confirmed_at {
        Some(ref s) => parse_timestamp(s)?,
        None => as_of,
    };

    // Duplicate dose times each take one confirmation
    let slots_at_time = schedule.iter().filter(|s| s.key() == wanted).count();
    let backend = records_for(&prescription, &load_intake_records(&paths.intakes)?);
    let backend_confirmed = confirmed_at_key(&backend, wanted);

    let record = confirm_slot(&slot, confirmed_at);
    let mut log = JsonlIntakeLog::new(&paths.log);
    let written = log.append_unless(&record, |logged| {
        let logged = records_for(&prescription, logged);
        backend_confirmed + confirmed_at_key(&logged, wanted) >= slots_at_time
    })?;

    if !written {
        tracing::debug!(
            "All {} doses of {} at {} already confirmed",
            slots_at_time,
            prescription.id,
            at
        );
        println!(
            "Dose of {} at {} {} is already confirmed.",
            prescription.medication_name, slot.date, slot.time
        );
        return Ok(());
    }

    tracing::info!(
        "Confirmed dose of {} at {} (taken {})",
        prescription.id,
        slot.scheduled_at(),
        confirmed_at
    );
    println!(
        "✓ Intake confirmed: {} {} {}",
        prescription.medication_name, slot.date, slot.time
    );
    Ok(())
}

fn confirmed_at_key(records: &[IntakeRecord], key: SlotKey) -> usize {
    records
        .iter()
        .filter(|r| r.key() == key && r.is_confirmed())
        .count()
}

fn cmd_report(
    paths: &DataPaths,
    from: Option<String>,
    to: Option<String>,
    json: bool,
    as_of: NaiveDateTime,
    config: &Config,
) -> Result<()> {
    let range = match (from, to) {
        (None, None) => None,
        (from, to) => {
            let from = from.as_deref().map(parse_date).transpose()?;
            let to = to.as_deref().map(parse_date).transpose()?;
            Some(DateRange::new(
                from.unwrap_or(NaiveDate::MIN),
                to.unwrap_or(NaiveDate::MAX),
            )?)
        }
    };

    let prescriptions = load_prescriptions(&paths.prescriptions)?;
    let records = paths.load_records()?;
    let report = build_report(&prescriptions, &records, as_of, range, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    display_report(&report);
    Ok(())
}

fn cmd_export(
    paths: &DataPaths,
    out: &Path,
    as_of: NaiveDateTime,
    config: &Config,
) -> Result<()> {
    let prescriptions = load_prescriptions(&paths.prescriptions)?;
    let records = paths.load_records()?;
    let report = build_report(&prescriptions, &records, as_of, None, config)?;

    let count = export_timeline_csv(out, &report)?;

    println!("✓ Exported {} doses", count);
    println!("  CSV: {}", out.display());
    Ok(())
}

fn display_report(report: &AdherenceReport) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  ADHERENCE REPORT");
    println!("╰─────────────────────────────────────────╯");
    println!("  As of: {}", report.as_of.format("%Y-%m-%d %H:%M"));

    if report.is_empty() {
        println!("\n  No data available for this period.");
        return;
    }

    for section in &report.prescriptions {
        println!();
        println!("  {} {}", section.medication_name, section.dosage);
        print_summary(&section.summary);
    }

    println!();
    println!("─────────────────────────────────────────");
    println!(
        "  Adherence rate: {:.2}%",
        report.adherence_rate * 100.0
    );
    println!("  Missed doses: {}", report.missed_doses);
    println!("  Anomalies: {}", report.anomalies.len());
    for anomaly in &report.anomalies {
        println!(
            "  ⚠ [{}] {}: {}",
            anomaly.severity, anomaly.kind, anomaly.description
        );
    }
    println!("  Danger: {}", if report.has_danger { "yes" } else { "no" });
    println!();
}

fn print_summary(summary: &AdherenceSummary) {
    println!(
        "  → {:.2}% adherence ({} taken, {} missed, {} pending)",
        summary.adherence_rate * 100.0,
        summary.confirmed_slots,
        summary.missed_slots,
        summary.pending_slots
    );
    if let Some(delay) = summary.average_delay_minutes {
        println!("  → Average delay: {:.1} min", delay);
    }
}
