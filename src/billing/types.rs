use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::billing::parse::parse_reference_period;

/// Marker the portal puts in the cycle label of a rescission penalty invoice
pub const TERMINATION_MARKER: &str = "multa por rescisão";

/// Fixed set of states a contract can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Current,
    Paid,
    InArrears,
    CancelledForDefault,
    CancelledByRule,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 5] = [
        ContractStatus::Current,
        ContractStatus::Paid,
        ContractStatus::InArrears,
        ContractStatus::CancelledForDefault,
        ContractStatus::CancelledByRule,
    ];

    /// Value stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Current => "current",
            ContractStatus::Paid => "paid",
            ContractStatus::InArrears => "in_arrears",
            ContractStatus::CancelledForDefault => "cancelled_for_default",
            ContractStatus::CancelledByRule => "cancelled_by_rule",
        }
    }

    /// Label used by the collections dashboard and the portal exports
    pub fn label(&self) -> &'static str {
        match self {
            ContractStatus::Current => "Em dia",
            ContractStatus::Paid => "Pago",
            ContractStatus::InArrears => "Em atraso",
            ContractStatus::CancelledForDefault => "Cancelado por Inadimplência",
            ContractStatus::CancelledByRule => "Cancelado por Regra",
        }
    }

    /// Terminal for the automated scheduler
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ContractStatus::CancelledForDefault | ContractStatus::CancelledByRule
        )
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContractStatus {
    type Err = String;

    /// Accepts the canonical value or the dashboard label, ignoring case
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ContractStatus::ALL
            .iter()
            .find(|status| {
                status.as_str() == wanted || status.label().to_lowercase() == wanted
            })
            .copied()
            .ok_or_else(|| format!("unknown contract status '{}'", s.trim()))
    }
}

/// One row of a contract's invoice list as returned by the billing portal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFact {
    pub cycle: String,
    /// Reference period label, `MM/YYYY`
    pub reference: String,
    pub due_date: Option<NaiveDate>,
    pub payment_date: Option<NaiveDate>,
    pub amount: f64,
    pub delinquency_days: i64,
}

impl InvoiceFact {
    pub fn is_termination_fee(&self) -> bool {
        self.cycle.to_lowercase().contains(TERMINATION_MARKER)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_date.is_some()
    }

    /// Due on or before `reference` and still unpaid
    pub fn is_overdue(&self, reference: NaiveDate) -> bool {
        matches!(self.due_date, Some(due) if due <= reference) && !self.is_paid()
    }

    /// (month, year) parsed from the reference label
    pub fn reference_period(&self) -> Option<(u32, i32)> {
        parse_reference_period(&self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_canonical_and_labels() {
        assert_eq!("in_arrears".parse::<ContractStatus>(), Ok(ContractStatus::InArrears));
        assert_eq!("Em dia".parse::<ContractStatus>(), Ok(ContractStatus::Current));
        assert_eq!(
            " cancelado por inadimplência ".parse::<ContractStatus>(),
            Ok(ContractStatus::CancelledForDefault)
        );
        assert_eq!("PAGO".parse::<ContractStatus>(), Ok(ContractStatus::Paid));
        assert!("Cliente Morto".parse::<ContractStatus>().is_err());
    }

    #[test]
    fn termination_marker_is_case_insensitive() {
        let invoice = InvoiceFact {
            cycle: "MULTA POR RESCISÃO CONTRATUAL".to_string(),
            reference: "03/2025".to_string(),
            due_date: None,
            payment_date: None,
            amount: 0.0,
            delinquency_days: 0,
        };
        assert!(invoice.is_termination_fee());
    }
}
