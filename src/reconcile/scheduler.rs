use chrono::NaiveDate;
use tracing::{debug, info};

use crate::{
    billing::{contract_window, ContractStatus},
    error::Result,
    storage::{CandidateFilter, Contract, Database},
};

/// Contracts picked for one reconciliation cycle, in processing order
#[derive(Debug, Default)]
pub struct CandidateSet {
    pub overdue: Vec<Contract>,
    pub active: Vec<Contract>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.overdue.len() + self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_queue(self) -> impl Iterator<Item = (CheckKind, Contract)> {
        self.overdue
            .into_iter()
            .map(|c| (CheckKind::Overdue, c))
            .chain(self.active.into_iter().map(|c| (CheckKind::Active, c)))
    }
}

/// Why a contract is in this cycle's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Overdue,
    Active,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Overdue => write!(f, "ARREARS"),
            CheckKind::Active => write!(f, "ACTIVE"),
        }
    }
}

/// In-arrears contracts are checked once a day
pub fn needs_overdue_check(contract: &Contract, today: NaiveDate) -> bool {
    contract.status == ContractStatus::InArrears && contract.last_check != Some(today)
}

/// Current and paid contracts are checked once per D+3 window
pub fn needs_window_check(contract: &Contract, today: NaiveDate) -> bool {
    if !matches!(contract.status, ContractStatus::Current | ContractStatus::Paid) {
        return false;
    }

    let window = contract_window(contract.due_day, today);
    if !window.eligible {
        return false;
    }

    match contract.last_check {
        None => true,
        Some(checked) => checked < window.eligibility_date,
    }
}

/// Splits loaded contracts into this cycle's queues. Cancelled contracts
/// never make it through.
pub fn select_candidates(
    overdue: Vec<Contract>,
    active: Vec<Contract>,
    today: NaiveDate,
) -> CandidateSet {
    let overdue: Vec<Contract> = overdue
        .into_iter()
        .filter(|c| needs_overdue_check(c, today))
        .collect();

    let active: Vec<Contract> = active
        .into_iter()
        .filter(|c| {
            let due = needs_window_check(c, today);
            if !due {
                debug!("Contract {} outside its D+3 window or already checked", c.number);
            }
            due
        })
        .collect();

    CandidateSet { overdue, active }
}

pub fn load_candidates(db: &Database, today: NaiveDate) -> Result<CandidateSet> {
    let overdue = db.load_candidates(CandidateFilter::InArrearsNotCheckedOn(today))?;
    let active = db.load_candidates(CandidateFilter::Active)?;
    let set = select_candidates(overdue, active, today);

    info!("{}", "=".repeat(50));
    info!("Reconciliation forecast: {} contracts queued", set.len());
    info!("   In arrears:  {}", set.overdue.len());
    info!("   Active (D+3): {}", set.active.len());
    info!("{}", "=".repeat(50));

    Ok(set)
}
