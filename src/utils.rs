use chrono::NaiveDate;
use colored::Colorize;

use crate::billing::ContractStatus;

/// Format an amount as Brazilian currency, e.g. `R$ 1.234,56`
pub fn format_brl(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}R$ {},{:02}", sign, grouped, cents % 100)
}

pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Status label colored by severity
pub fn format_status(status: ContractStatus) -> String {
    match status {
        ContractStatus::Current => status.label().green().to_string(),
        ContractStatus::Paid => status.label().cyan().to_string(),
        ContractStatus::InArrears => status.label().yellow().to_string(),
        ContractStatus::CancelledForDefault | ContractStatus::CancelledByRule => {
            status.label().red().to_string()
        }
    }
}

/// Prompt user for yes/no confirmation
pub fn confirm_action(prompt: &str) -> std::io::Result<bool> {
    use std::io::{self, Write};

    print!("{} (y/N): ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "sim"))
}

pub fn print_table_border(width: usize) {
    println!("{}", "=".repeat(width));
}

/// Print a table row with columns padded to `widths`
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    let mut row = String::new();
    for (col, width) in columns.iter().zip(widths) {
        row.push_str(&format!("{:<width$}  ", col, width = width));
    }
    println!("{}", row.trim_end());
}
