use colored::Colorize;
use serde::Serialize;
use tracing::info;

use crate::billing::ContractStatus;

/// Result of reconciling a single contract
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ContractOutcome {
    Updated {
        previous: ContractStatus,
        status: ContractStatus,
        action_created: bool,
    },
    Skipped(String),
    Failed(String),
}

/// Summary of one reconciliation cycle
#[derive(Debug, Default, Serialize)]
pub struct CycleSummary {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub actions_created: usize,
    pub newly_cancelled: usize,
    /// Stopped early by a shutdown request
    pub interrupted: bool,
    pub outcomes: Vec<(String, ContractOutcome)>,
}

impl CycleSummary {
    pub fn record(&mut self, contract_number: String, outcome: ContractOutcome) {
        match &outcome {
            ContractOutcome::Updated {
                previous,
                status,
                action_created,
            } => {
                self.updated += 1;
                if *action_created {
                    self.actions_created += 1;
                }
                if *status == ContractStatus::CancelledForDefault
                    && *previous != ContractStatus::CancelledForDefault
                {
                    self.newly_cancelled += 1;
                }
            }
            ContractOutcome::Skipped(_) => self.skipped += 1,
            ContractOutcome::Failed(_) => self.failed += 1,
        }
        self.outcomes.push((contract_number, outcome));
    }

    pub fn processed(&self) -> usize {
        self.updated + self.skipped + self.failed
    }

    /// Share of queued contracts updated, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.updated as f64 / self.total as f64) * 100.0
        }
    }

    pub fn log(&self) {
        info!(
            "Cycle finished: {}/{} updated, {} failed, {} skipped, {} collection actions, {} cancelled for default{}",
            self.updated,
            self.total,
            self.failed,
            self.skipped,
            self.actions_created,
            self.newly_cancelled,
            if self.interrupted { " (interrupted)" } else { "" }
        );
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=== Reconciliation Cycle Summary ===".cyan().bold());
        println!("Queued:             {}", self.total);
        println!("Updated:            {} ✓", self.updated.to_string().green());
        println!("Failed:             {} ✗", self.failed.to_string().red());
        println!("Skipped:            {}", self.skipped);
        println!("Collection actions: {}", self.actions_created);
        println!("Cancelled (>60d):   {}", self.newly_cancelled.to_string().yellow());
        println!("Success rate:       {:.1}%", self.success_rate());
        if self.interrupted {
            println!("{}", "Cycle interrupted by shutdown request".yellow());
        }

        for (number, outcome) in &self.outcomes {
            match outcome {
                ContractOutcome::Updated { previous, status, .. } if previous != status => {
                    println!("  {}  {} -> {}", number, previous.label(), status.label().cyan());
                }
                ContractOutcome::Failed(reason) => {
                    println!("  {}  {}", number, format!("failed: {}", reason).red());
                }
                ContractOutcome::Skipped(reason) => {
                    println!("  {}  {}", number, format!("skipped: {}", reason).yellow());
                }
                _ => {}
            }
        }
        println!("{}", "====================================".cyan());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_outcomes() {
        let mut summary = CycleSummary {
            total: 4,
            ..CycleSummary::default()
        };
        summary.record(
            "1".to_string(),
            ContractOutcome::Updated {
                previous: ContractStatus::InArrears,
                status: ContractStatus::CancelledForDefault,
                action_created: false,
            },
        );
        summary.record(
            "2".to_string(),
            ContractOutcome::Updated {
                previous: ContractStatus::Current,
                status: ContractStatus::InArrears,
                action_created: true,
            },
        );
        summary.record("3".to_string(), ContractOutcome::Failed("timeout".to_string()));
        summary.record("4".to_string(), ContractOutcome::Skipped("no digits".to_string()));

        assert_eq!(summary.updated, 2);
        assert_eq!(summary.actions_created, 1);
        assert_eq!(summary.newly_cancelled, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed(), 4);
        assert_eq!(summary.success_rate(), 50.0);
    }
}
