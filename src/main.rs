mod cli;

use bree_reconcile::{
    billing::{eligibility_window, ContractStatus},
    config::Config,
    error::{self, ReconcileError},
    portal::SnapshotPortal,
    reconcile::{Heartbeat, Reconciler, ShutdownSignal, Watchdog},
    storage::{Database, NewContract, StatusOverride},
    utils,
};
use chrono::NaiveDate;
use clap::Parser;
use cli::{Cli, Commands};
use colored::*;
use std::path::Path;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("bree_reconcile=debug,info")
        .init();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init => initialize(&config),

        Commands::Run { date } => {
            info!("Running one reconciliation cycle...");
            run_once(&config, date).await
        }

        Commands::Watch { interval } => {
            info!("Starting reconciliation service...");
            run_service(&config, interval).await
        }

        Commands::D3 { due_day, date } => explain_d3(&config, due_day, date),

        Commands::Override { file, yes } => {
            info!("Importing status overrides from {}", file);
            import_overrides(&config, &file, yes)
        }

        Commands::CorrectOverdue { yes } => correct_overdue(&config, yes),

        Commands::Migrate => {
            info!("Migrating legacy statuses...");
            migrate(&config)
        }

        Commands::Audit { format } => audit(&config, &format),

        Commands::List { status, format } => list_contracts(&config, status.as_deref(), &format),

        Commands::Add {
            number,
            due_day,
            status,
            holder,
        } => add_contract(&config, number, due_day, &status, holder),
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn parse_status(value: &str) -> error::Result<ContractStatus> {
    value.parse().map_err(ReconcileError::InvalidInput)
}

fn open_portal(config: &Config) -> error::Result<SnapshotPortal> {
    let dir = Path::new(&config.portal.snapshot_dir);
    if !dir.is_dir() {
        return Err(ReconcileError::Config(format!(
            "portal snapshot directory {} does not exist",
            dir.display()
        )));
    }
    Ok(SnapshotPortal::new(dir))
}

fn initialize(config: &Config) -> error::Result<()> {
    println!("{}", "Initializing contract reconciliation...".green());
    let db = Database::new(&config.database.path)?;
    println!("{}", "✓ Database initialized".green());
    println!("{}", "✓ Configuration loaded".green());

    let settings = &config.reconcile;
    println!("\n{}", "Configuration:".cyan());
    println!("  Database:        {}", config.database.path);
    println!("  Snapshots:       {}", config.portal.snapshot_dir);
    println!("  Interval:        {}s", settings.interval_secs);
    println!("  Local retries:   {}", settings.max_retries);
    println!("  Watchdog:        {}s", settings.watchdog_timeout_secs);
    println!("  Probe:           {}", settings.connectivity_probe);
    println!("  UTC offset:      {}h", settings.utc_offset_hours);
    println!("  Last check:      {}", utils::format_date(db.last_check_date()?));

    println!("\n{}", "Ready to use! Try running:".cyan());
    println!("  {} to register a contract", "bree-reconcile add <number> --due-day 10".yellow());
    println!("  {} to run one cycle", "bree-reconcile run".yellow());
    println!("  {} to run continuously", "bree-reconcile watch".yellow());
    Ok(())
}

async fn run_once(config: &Config, date: Option<NaiveDate>) -> error::Result<()> {
    let portal = open_portal(config)?;
    let db = Database::new(&config.database.path)?;
    let today = match date {
        Some(date) => date,
        None => config.reconcile.today()?,
    };

    let shutdown = ShutdownSignal::new();
    shutdown.listen_for_ctrl_c();

    let mut reconciler = Reconciler::new(portal, db, config.reconcile.clone()).with_shutdown(shutdown);
    if !reconciler.login().await {
        println!("{}", "Cancelled before login".yellow());
        return Ok(());
    }

    let summary = reconciler.run_cycle(today).await;
    reconciler.close().await;

    let summary = summary?;
    summary.log();
    summary.print_summary();
    Ok(())
}

async fn run_service(config: &Config, interval: Option<u64>) -> error::Result<()> {
    let portal = open_portal(config)?;
    let db = Database::new(&config.database.path)?;

    let mut settings = config.reconcile.clone();
    if let Some(interval) = interval {
        settings.interval_secs = interval;
    }

    println!("{}", "Starting reconciliation service...".green());
    println!("Interval: {} seconds", settings.interval_secs);
    println!("Watchdog: {} seconds", settings.watchdog_timeout_secs);

    let heartbeat = Heartbeat::new();
    let shutdown = ShutdownSignal::new();
    shutdown.listen_for_ctrl_c();
    Watchdog::new(heartbeat.clone(), settings.watchdog_timeout(), settings.watchdog_poll()).spawn();

    let mut reconciler = Reconciler::new(portal, db, settings)
        .with_heartbeat(heartbeat)
        .with_shutdown(shutdown);

    let result = reconciler.run_forever().await;
    reconciler.close().await;
    result
}

fn explain_d3(config: &Config, due_day: u32, date: Option<NaiveDate>) -> error::Result<()> {
    let reference = match date {
        Some(date) => date,
        None => config.reconcile.today()?,
    };

    let window = eligibility_window(due_day, reference).ok_or_else(|| {
        ReconcileError::InvalidInput(format!("due day must be between 1 and 31, got {}", due_day))
    })?;

    println!("{}", "=== D+3 Eligibility ===".cyan().bold());
    println!("Reference:    {}", reference.format("%d/%m/%Y"));
    println!("Due day:      {}", due_day);
    println!("Due date:     {}", window.due_date.format("%d/%m/%Y"));
    println!("D+3 date:     {}", window.eligibility_date.format("%d/%m/%Y"));
    let verdict = window.describe(reference);
    if window.eligible {
        println!("{}", verdict.green());
    } else {
        println!("{}", verdict.yellow());
    }
    Ok(())
}

fn import_overrides(config: &Config, file: &str, yes: bool) -> error::Result<()> {
    let content = std::fs::read_to_string(file)?;
    let rows: Vec<StatusOverride> = serde_json::from_str(&content)?;
    println!("Loaded {} override rows from {}", rows.len(), file);

    if !yes && !utils::confirm_action(&format!("Overwrite status for {} contracts?", rows.len()))? {
        println!("Cancelled");
        return Ok(());
    }

    let db = Database::new(&config.database.path)?;
    let report = db.apply_status_overrides(&rows)?;

    for message in &report.messages {
        println!("  {}", message);
    }
    println!("\n{}", "=== Override Summary ===".cyan().bold());
    println!("Updated:    {} ✓", report.updated.to_string().green());
    println!("Not found:  {}", report.not_found.to_string().yellow());
    println!("Errors:     {}", report.errors.to_string().red());
    Ok(())
}

fn correct_overdue(config: &Config, yes: bool) -> error::Result<()> {
    if !yes && !utils::confirm_action("Cancel every in-arrears contract more than 60 days late?")? {
        println!("Cancelled");
        return Ok(());
    }

    let db = Database::new(&config.database.path)?;
    let corrected = db.correct_overdue_defaults()?;
    println!(
        "{} contracts moved to {}",
        corrected.to_string().green(),
        ContractStatus::CancelledForDefault.label()
    );
    Ok(())
}

fn migrate(config: &Config) -> error::Result<()> {
    let db = Database::new(&config.database.path)?;
    let report = db.migrate_legacy_statuses()?;

    println!("{}", "=== Legacy Status Migration ===".cyan().bold());
    println!("Labels rewritten:            {}", report.relabelled);
    println!("Dead clients cancelled:      {}", report.dead_clients);
    println!("Lookup errors cancelled:     {}", report.lookup_errors_cancelled);
    println!("Lookup errors back in arrears: {}", report.lookup_errors_reset);
    println!("Overdue >60 days cancelled:  {}", report.overdue_cancelled);
    Ok(())
}

fn audit(config: &Config, format: &str) -> error::Result<()> {
    let db = Database::new(&config.database.path)?;
    let audit = db.status_audit()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&audit)?);
        return Ok(());
    }

    println!("{}", "=== Contract Status Audit ===".cyan().bold());
    utils::print_table_border(50);
    utils::print_table_row(&["Status", "Contracts"], &[36, 10]);
    utils::print_table_border(50);
    for (status, count) in &audit.groups {
        let label = status
            .parse::<ContractStatus>()
            .map(|s| s.label().to_string())
            .unwrap_or_else(|_| format!("{} (legacy)", status));
        utils::print_table_row(&[&label, &count.to_string()], &[36, 10]);
    }
    utils::print_table_border(50);
    println!("Total: {}", audit.total);
    if audit.grouped_total() != audit.total {
        println!(
            "{}",
            format!("Warning: grouped counts add up to {}", audit.grouped_total()).yellow()
        );
    }
    Ok(())
}

fn list_contracts(config: &Config, status: Option<&str>, format: &str) -> error::Result<()> {
    let status = status.map(parse_status).transpose()?;
    let db = Database::new(&config.database.path)?;
    let contracts = db.list_contracts(status)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&contracts)?);
        return Ok(());
    }

    if contracts.is_empty() {
        println!("{}", "No contracts found".yellow());
        return Ok(());
    }

    let widths = [14, 28, 5, 12, 6, 14, 12];
    utils::print_table_border(110);
    utils::print_table_row(
        &["Contract", "Status", "Due", "Last check", "Days", "Amount", "Cancelled"],
        &widths,
    );
    utils::print_table_border(110);
    for contract in &contracts {
        utils::print_table_row(
            &[
                &contract.number,
                contract.status.label(),
                &contract.due_day.map(|d| d.to_string()).unwrap_or_default(),
                &utils::format_date(contract.last_check),
                &contract.delinquency_days.map(|d| d.to_string()).unwrap_or_default(),
                &contract.amount.map(utils::format_brl).unwrap_or_default(),
                &utils::format_date(contract.cancellation_month),
            ],
            &widths,
        );
    }
    utils::print_table_border(110);
    println!("{} contracts", contracts.len());
    Ok(())
}

fn add_contract(
    config: &Config,
    number: String,
    due_day: Option<u32>,
    status: &str,
    holder: Option<String>,
) -> error::Result<()> {
    if let Some(day) = due_day {
        if !(1..=31).contains(&day) {
            return Err(ReconcileError::InvalidInput(format!(
                "due day must be between 1 and 31, got {}",
                day
            )));
        }
    }

    let db = Database::new(&config.database.path)?;
    let contract = db.add_contract(&NewContract {
        number,
        holder_name: holder,
        due_day,
        status: parse_status(status)?,
    })?;

    println!(
        "✓ Contract {} registered as {}",
        contract.number.cyan(),
        utils::format_status(contract.status)
    );
    Ok(())
}
