use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bree-reconcile")]
#[command(about = "Contract status reconciliation against the billing portal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database schema and show the loaded configuration
    Init,

    /// Run a single reconciliation cycle
    Run {
        /// Reference date (YYYY-MM-DD); defaults to today in the configured offset
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Reconcile continuously with watchdog and Ctrl-C handling
    Watch {
        /// Seconds between cycles; overrides the configured interval
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Explain the D+3 eligibility window for a due day
    D3 {
        /// Contract due day (1-31)
        due_day: u32,

        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Overwrite contract statuses from a JSON sheet of {"CONTRATO", "STATUS"} rows
    Override {
        file: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Cancel in-arrears contracts more than 60 days late
    CorrectOverdue {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Rewrite legacy status labels to the canonical set
    Migrate,

    /// Count contracts per stored status
    Audit {
        /// Output format: table or json
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// List contracts and their reconciled fields
    List {
        /// Only contracts with this status (canonical value or label)
        #[arg(short, long)]
        status: Option<String>,

        /// Output format: table or json
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Register a contract
    Add {
        number: String,

        #[arg(short, long)]
        due_day: Option<u32>,

        /// Initial status (canonical value or label)
        #[arg(short, long, default_value = "current")]
        status: String,

        #[arg(long)]
        holder: Option<String>,
    },
}
