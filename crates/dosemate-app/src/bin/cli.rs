//! DoseMate CLI
//!
//! Maintenance commands for the shared container: inspect and migrate the
//! store, manage backups, publish or inspect the widget snapshot, and seed
//! the store with medications, dose logs and health readings.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use uuid::Uuid;

use dosemate_core::app::preferences;
use dosemate_core::metrics::{self, latest_metrics, metric_history};
use dosemate_core::schema::history::registry as history_registry;
use dosemate_core::sync_gate;
use dosemate_core::{
    AppConfig, BackupManager, Clock, DataSnapshot, DoseSnapshotItem, EntityStore,
    IdentityTokenProbe, LogStatus, ManualEntry, Measurement, Medication, MedicationLog,
    MetricKind, MigrationCoordinator, MigrationOutcome, MoodLevel, SharedContainer,
    SnapshotChannel, SqliteStore, StatisticsPeriod, SystemClock, refresh_once,
    watch_snapshots,
};

/// DoseMate - medication tracker maintenance CLI
#[derive(Parser)]
#[command(name = "dosemate")]
#[command(author = "bbdyno")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the DoseMate medication tracker store and widget snapshot")]
struct Cli {
    /// Shared container directory (overrides DOSEMATE_CONTAINER_DIR)
    #[arg(long, global = true)]
    container_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show store version, migration state, backups and the published snapshot
    Status,

    /// Run the startup migration gate (backup, migrate, restore on failure)
    Migrate,

    /// Create, list, restore or prune store backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Build today's snapshot and publish it to the widget channel
    Publish,

    /// Print the snapshot currently in the widget channel
    Show {
        /// Print the raw JSON payload
        #[arg(long)]
        json: bool,
    },

    /// Print the snapshot every time the app publishes one (Ctrl-C to stop)
    Watch,

    /// Add a medication
    AddMedication {
        /// Medication name
        name: String,

        /// Dosage, e.g. "1 tablet"
        #[arg(long, default_value = "")]
        dosage: String,

        /// Strength, e.g. "500mg"
        #[arg(long, default_value = "")]
        strength: String,
    },

    /// Schedule or record a dose
    LogDose {
        /// Medication id or name
        medication: String,

        /// Scheduled time: RFC 3339 or HH:MM today (local)
        #[arg(long)]
        at: String,

        /// Dose status
        #[arg(long, default_value = "pending")]
        status: LogStatus,
    },

    /// Record a health reading
    RecordMetric {
        /// bloodPressure, mood, bloodSugar, weight, heartRate, bodyTemperature, oxygenSaturation
        kind: MetricKind,

        /// Value for single-number metrics
        #[arg(long, default_value = "")]
        value: String,

        /// Systolic pressure (bloodPressure)
        #[arg(long, default_value = "")]
        systolic: String,

        /// Diastolic pressure (bloodPressure)
        #[arg(long, default_value = "")]
        diastolic: String,

        /// Mood level 1-5 (mood)
        #[arg(long, default_value_t = 3)]
        mood: u8,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Related medication id or name
        #[arg(long)]
        medication: Option<String>,
    },

    /// Show the latest reading of each metric, or the history of one
    Metrics {
        /// Metric to show history for
        kind: Option<MetricKind>,

        /// History window
        #[arg(long, value_enum, default_value = "week")]
        period: Period,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Copy the store now
    Create,
    /// List backups, newest first
    List,
    /// Replace the store with a backup (newest if no file is given)
    Restore {
        /// Backup file name in the container
        file: Option<String>,
    },
    /// Delete all but the newest backups
    Cleanup {
        /// Number of backups to keep (defaults to DOSEMATE_BACKUP_RETENTION)
        #[arg(long)]
        keep: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Period {
    Week,
    Month,
    ThreeMonths,
    Year,
}

impl From<Period> for StatisticsPeriod {
    fn from(period: Period) -> Self {
        match period {
            Period::Week => StatisticsPeriod::Week,
            Period::Month => StatisticsPeriod::Month,
            Period::ThreeMonths => StatisticsPeriod::ThreeMonths,
            Period::Year => StatisticsPeriod::Year,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(dir) = cli.container_dir {
        config = config.with_container_dir(dir);
    }

    match cli.command {
        Commands::Status => run_status(&config),
        Commands::Migrate => run_migrate(&config),
        Commands::Backup { action } => run_backup(&config, action),
        Commands::Publish => run_publish(&config),
        Commands::Show { json } => run_show(&config, json),
        Commands::Watch => run_watch(&config),
        Commands::AddMedication {
            name,
            dosage,
            strength,
        } => run_add_medication(&config, name, dosage, strength),
        Commands::LogDose {
            medication,
            at,
            status,
        } => run_log_dose(&config, &medication, &at, status),
        Commands::RecordMetric {
            kind,
            value,
            systolic,
            diastolic,
            mood,
            notes,
            medication,
        } => {
            let mood = MoodLevel::try_from(mood).map_err(anyhow::Error::msg)?;
            let entry = ManualEntry {
                value,
                systolic,
                diastolic,
                mood,
            };
            run_record_metric(&config, kind, &entry, notes, medication.as_deref())
        }
        Commands::Metrics { kind, period } => run_metrics(&config, kind, period.into()),
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn backup_manager(container: &SharedContainer) -> BackupManager {
    BackupManager::new(container.clone(), Arc::new(SystemClock))
}

fn coordinator(container: &SharedContainer) -> anyhow::Result<MigrationCoordinator> {
    let registry = Arc::new(history_registry()?);
    Ok(MigrationCoordinator::new(registry, backup_manager(container)))
}

/// Open the store after the migration gate, in the mode the sync gate picks
fn open_store(config: &AppConfig) -> anyhow::Result<(SharedContainer, SqliteStore)> {
    let container = config.resolve_container()?;
    let report = coordinator(&container)?.run()?;
    if report.outcome != MigrationOutcome::UpToDate {
        println!(
            "{} Store {} {}",
            "!".yellow(),
            outcome_label(report.outcome),
            report.to
        );
    }

    let probe = IdentityTokenProbe::new(config.account_token.clone());
    let mode = sync_gate::evaluate(&preferences(config, &container), &probe);
    let store = SqliteStore::open(&container.store_path(), mode)?;
    Ok((container, store))
}

fn outcome_label(outcome: MigrationOutcome) -> &'static str {
    match outcome {
        MigrationOutcome::Created => "created at",
        MigrationOutcome::UpToDate => "already at",
        MigrationOutcome::Migrated => "migrated to",
    }
}

/// Accept a medication id, or an active medication's name
fn find_medication(store: &SqliteStore, needle: &str) -> anyhow::Result<Medication> {
    let active = metrics::active_medications(store)?;
    let found = match Uuid::parse_str(needle) {
        Ok(id) => active.into_iter().find(|m| m.id == id),
        Err(_) => active
            .into_iter()
            .find(|m| m.name.eq_ignore_ascii_case(needle.trim())),
    };
    found.ok_or_else(|| anyhow::anyhow!("No active medication matches '{}'", needle))
}

fn parse_time(raw: &str, now: DateTime<Local>) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let time = NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| anyhow::anyhow!("Invalid time '{}': use RFC 3339 or HH:MM", raw))?;
    let local = Local
        .from_local_datetime(&now.date_naive().and_time(time))
        .earliest()
        .ok_or_else(|| anyhow::anyhow!("{} does not exist today in the local timezone", raw))?;
    Ok(local.with_timezone(&Utc))
}

fn format_measurement(measurement: &Measurement) -> String {
    match measurement {
        Measurement::BloodPressure {
            systolic,
            diastolic,
        } => format!("{}/{} mmHg", systolic, diastolic),
        Measurement::Mood { level } => format!("mood {}/5", u8::from(*level)),
        Measurement::Scalar { value, .. } => format!("{}", value),
    }
}

fn status_label(item: &DoseSnapshotItem) -> colored::ColoredString {
    let color = item.status_color();
    item.status.truecolor(color.r, color.g, color.b)
}

fn print_snapshot(snapshot: &DataSnapshot) {
    println!(
        "{}: {:.0}%",
        "Adherence".white().bold(),
        snapshot.adherence_rate * 100.0
    );
    println!(
        "{}: {}",
        "Updated".white().bold(),
        snapshot.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );

    match &snapshot.next_dose {
        Some(next) => println!(
            "{}: {} {} at {}",
            "Next Dose".white().bold(),
            next.name,
            next.dosage,
            next.scheduled_time.with_timezone(&Local).format("%H:%M")
        ),
        None => println!("{}: {}", "Next Dose".white().bold(), "none".dimmed()),
    }

    println!();
    if snapshot.medications.is_empty() {
        println!("{}", "No doses scheduled today.".dimmed());
    }
    for item in &snapshot.medications {
        println!(
            "  {}  {:<24} {:<12} {}",
            item.scheduled_time.with_timezone(&Local).format("%H:%M"),
            item.name,
            item.dosage,
            status_label(item)
        );
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_status(config: &AppConfig) -> anyhow::Result<()> {
    let container = config.resolve_container()?;
    let mut coordinator = coordinator(&container)?;
    let registry = history_registry()?;

    println!("{}", "=== DoseMate Status ===".cyan().bold());
    println!();
    println!("{}: {}", "Container".white().bold(), container.root().display());
    println!("{}: {}", "Group".white().bold(), container.group_id());
    println!(
        "{}: {}",
        "Schema Version".white().bold(),
        registry.current_version().id
    );

    if container.store_path().exists() {
        match coordinator.recorded_version() {
            Ok(Some(version)) => println!("{}: {}", "Store Version".white().bold(), version),
            Ok(None) => println!("{}: {}", "Store Version".white().bold(), "unversioned".yellow()),
            Err(e) => println!("{}: {}", "Store Version".white().bold(), e.to_string().red()),
        }
        match coordinator.check() {
            Ok(state) => println!("{}: {:?}", "Migration".white().bold(), state),
            Err(e) => println!("{}: {}", "Migration".white().bold(), e.to_string().red()),
        }
    } else {
        println!("{}: {}", "Store".white().bold(), "not created yet".dimmed());
    }

    let backups = backup_manager(&container).list_backups()?;
    println!("{}: {}", "Backups".white().bold(), backups.len());
    if let Some(newest) = backups.first() {
        println!(
            "{}: {} ({})",
            "Newest Backup".white().bold(),
            newest.file_name,
            newest.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }

    let channel = SnapshotChannel::for_container(&container);
    match channel.last_update() {
        Some(at) => println!(
            "{}: {}",
            "Last Publish".white().bold(),
            at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("{}: {}", "Last Publish".white().bold(), "never".dimmed()),
    }
    if let Some(snapshot) = channel.read() {
        println!(
            "{}: {} doses, {:.0}% adherence",
            "Snapshot".white().bold(),
            snapshot.medications.len(),
            snapshot.adherence_rate * 100.0
        );
    }

    Ok(())
}

fn run_migrate(config: &AppConfig) -> anyhow::Result<()> {
    let container = config.resolve_container()?;
    let mut coordinator = coordinator(&container)?;

    println!("{}", "=== DoseMate Migration ===".cyan().bold());
    println!();

    let report = match coordinator.run() {
        Ok(report) => report,
        Err(e) => {
            println!("{}: {:?}", "State".white().bold(), coordinator.state());
            return Err(e.into());
        }
    };

    let from = report
        .from
        .map(|v| v.to_string())
        .unwrap_or_else(|| "none".to_string());
    println!("{}: {}", "From".white().bold(), from);
    println!("{}: {}", "To".white().bold(), report.to);
    println!("{}: {}", "Stages".white().bold(), report.stages_applied);
    if let Some(backup) = &report.backup {
        println!("{}: {}", "Backup".white().bold(), backup);
    }
    println!();
    println!(
        "{}",
        format!("Store {} {}", outcome_label(report.outcome), report.to)
            .green()
            .bold()
    );

    Ok(())
}

fn run_backup(config: &AppConfig, action: BackupAction) -> anyhow::Result<()> {
    let container = config.resolve_container()?;
    let manager = backup_manager(&container);

    println!("{}", "=== DoseMate Backup ===".cyan().bold());
    println!();

    match action {
        BackupAction::Create => {
            println!("{}: {}", "From".dimmed(), container.store_path().display());
            let backup = manager.create_backup()?;
            let size = std::fs::metadata(&backup.path).map(|m| m.len()).unwrap_or(0);
            println!("{}: {}", "To".dimmed(), backup.path.display());
            println!();
            println!(
                "{}",
                format!("Backup complete: {} bytes", size).green().bold()
            );
        }
        BackupAction::List => {
            let backups = manager.list_backups()?;
            if backups.is_empty() {
                println!("{}", "No backups found.".dimmed());
            }
            for backup in backups {
                println!(
                    "  {}  {}",
                    backup.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    backup.file_name
                );
            }
        }
        BackupAction::Restore { file } => {
            let restored = match file {
                Some(name) => {
                    let backup = manager
                        .list_backups()?
                        .into_iter()
                        .find(|b| b.file_name == name)
                        .ok_or_else(|| anyhow::anyhow!("No backup named '{}'", name))?;
                    manager.restore(&backup)?;
                    backup
                }
                None => manager.restore_from_backup()?,
            };
            println!("{}: {}", "From".dimmed(), restored.file_name);
            println!();
            println!("{}", "Store restored".green().bold());
        }
        BackupAction::Cleanup { keep } => {
            let keep = keep.unwrap_or(config.backup_retention);
            let report = manager.cleanup_old_backups(keep)?;
            for name in &report.removed {
                println!("  {} {}", "-".red(), name);
            }
            for name in &report.failed {
                println!("  {} {} (could not remove)", "!".yellow(), name);
            }
            println!();
            println!(
                "{}",
                format!(
                    "Kept {} backups, removed {}",
                    report.kept,
                    report.removed.len()
                )
                .green()
                .bold()
            );
        }
    }

    Ok(())
}

fn run_publish(config: &AppConfig) -> anyhow::Result<()> {
    let (container, store) = open_store(config)?;
    let channel = SnapshotChannel::for_container(&container);
    let snapshot = refresh_once(&store, &channel, &SystemClock)?;

    println!("{}", "=== DoseMate Publish ===".cyan().bold());
    println!();
    print_snapshot(&snapshot);
    println!();
    println!("{}", "Snapshot published".green().bold());
    Ok(())
}

fn run_show(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let container = config.resolve_container()?;
    let channel = SnapshotChannel::for_container(&container);
    let snapshot = channel.read();

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{}", "=== DoseMate Snapshot ===".cyan().bold());
    println!();
    match snapshot {
        Some(snapshot) => print_snapshot(&snapshot),
        None => println!("{}", "Nothing published yet.".dimmed()),
    }
    Ok(())
}

fn run_watch(config: &AppConfig) -> anyhow::Result<()> {
    let container = config.resolve_container()?;

    println!("{}", "=== DoseMate Watch ===".cyan().bold());
    println!();
    println!("Watching {} (Ctrl-C to stop)", container.root().display());

    let _watcher = watch_snapshots(&container, |snapshot| {
        println!();
        match snapshot {
            Some(snapshot) => print_snapshot(&snapshot),
            None => println!("{}", "Reload requested but no snapshot is readable.".yellow()),
        }
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(tokio::signal::ctrl_c())?;
    Ok(())
}

fn run_add_medication(
    config: &AppConfig,
    name: String,
    dosage: String,
    strength: String,
) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!("Medication name cannot be empty");
    }

    let (_, mut store) = open_store(config)?;
    let medication = Medication::new(name.trim(), dosage, strength);
    store.insert(&medication)?;
    store.save()?;

    println!("{}", "=== DoseMate Medication ===".cyan().bold());
    println!();
    println!("{}: {}", "ID".white().bold(), medication.id);
    println!("{}: {}", "Name".white().bold(), medication.name);
    println!("{}: {}", "Dosage".white().bold(), medication.display_dosage());
    println!();
    println!("{}", "Medication added".green().bold());
    Ok(())
}

fn run_log_dose(
    config: &AppConfig,
    medication: &str,
    at: &str,
    status: LogStatus,
) -> anyhow::Result<()> {
    let (_, mut store) = open_store(config)?;
    let medication = find_medication(&store, medication)?;
    let now = SystemClock.now_local();
    let scheduled = parse_time(at, now)?;

    let mut log = MedicationLog::scheduled(medication.id, scheduled).with_status(status);
    if status.is_completed() {
        log.taken_time = Some(now.with_timezone(&Utc));
    }
    store.insert(&log)?;
    store.save()?;

    println!("{}", "=== DoseMate Dose ===".cyan().bold());
    println!();
    println!("{}: {}", "Medication".white().bold(), medication.name);
    println!(
        "{}: {}",
        "Scheduled".white().bold(),
        scheduled.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    let color = status.color();
    println!(
        "{}: {}",
        "Status".white().bold(),
        status.as_str().truecolor(color.r, color.g, color.b)
    );
    println!();
    println!("{}", "Dose logged (run `dosemate publish` to refresh the widget)".green().bold());
    Ok(())
}

fn run_record_metric(
    config: &AppConfig,
    kind: MetricKind,
    entry: &ManualEntry,
    notes: Option<String>,
    medication: Option<&str>,
) -> anyhow::Result<()> {
    let (_, mut store) = open_store(config)?;
    let medication_id = match medication {
        Some(needle) => Some(find_medication(&store, needle)?.id),
        None => None,
    };

    let metric = match metrics::record_metric(
        &mut store,
        kind,
        entry,
        notes,
        medication_id,
        SystemClock.now(),
    ) {
        Ok(metric) => metric,
        Err(metrics::RecordError::Entry(e)) => {
            println!("{}", e.message.red());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", "=== DoseMate Health Metric ===".cyan().bold());
    println!();
    println!("{}: {}", "Kind".white().bold(), metric.kind());
    println!(
        "{}: {}",
        "Value".white().bold(),
        format_measurement(&metric.measurement)
    );
    println!();
    println!("{}", "Reading recorded".green().bold());
    Ok(())
}

fn run_metrics(
    config: &AppConfig,
    kind: Option<MetricKind>,
    period: StatisticsPeriod,
) -> anyhow::Result<()> {
    let (_, store) = open_store(config)?;

    println!("{}", "=== DoseMate Health Metrics ===".cyan().bold());
    println!();

    let Some(kind) = kind else {
        let latest = latest_metrics(&store)?;
        if latest.is_empty() {
            println!("{}", "No readings recorded.".dimmed());
        }
        for (kind, metric) in latest {
            println!(
                "  {:<18} {:<16} {}",
                kind.to_string(),
                format_measurement(&metric.measurement),
                metric.recorded_at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string().dimmed()
            );
        }
        return Ok(());
    };

    let history = metric_history(&store, kind, period, SystemClock.now())?;
    println!("{}: {} ({:?})", "Kind".white().bold(), kind, period);
    println!();
    if history.is_empty() {
        println!("{}", "No readings in this period.".dimmed());
    }
    for metric in history {
        let notes = metric.notes.as_deref().unwrap_or("");
        println!(
            "  {}  {:<16} {}",
            metric.recorded_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            format_measurement(&metric.measurement),
            notes.dimmed()
        );
    }
    Ok(())
}
