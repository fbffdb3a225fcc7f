use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};

use crate::billing::{Classification, ContractStatus, Rule};

impl ToSql for ContractStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ContractStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        ContractStatus::ALL
            .iter()
            .find(|status| status.as_str() == text)
            .copied()
            .ok_or_else(|| FromSqlError::Other(format!("unknown contract status '{}'", text).into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: i64,
    pub number: String,
    pub holder_name: Option<String>,
    /// Day of month the installment falls due (vigência)
    pub due_day: Option<u32>,
    pub last_check: Option<NaiveDate>,
    pub status: ContractStatus,
    pub delinquency_days: Option<i64>,
    pub installment: Option<u32>,
    pub amount: Option<f64>,
    pub cancellation_month: Option<NaiveDate>,
}

impl Contract {
    /// Digits of the contract number, the form the portal expects
    pub fn portal_number(&self) -> Option<String> {
        let digits: String = self.number.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            None
        } else {
            Some(digits)
        }
    }

    /// Copies a classification into the contract and stamps the check date.
    /// Delinquency fields survive only for arrears and the cutoff derived from them.
    pub fn apply_classification(&mut self, result: &Classification, checked_on: NaiveDate) {
        self.status = result.status;
        self.last_check = Some(checked_on);
        self.cancellation_month = result.cancellation_month;

        if result.rule == Rule::OverdueInvoice {
            self.delinquency_days = Some(result.delinquency_days);
            self.installment = Some(result.installment);
            self.amount = Some(result.amount);
        } else {
            self.delinquency_days = None;
            self.installment = None;
            self.amount = None;
        }
    }
}

/// Outreach record created for a contract at a given delinquency day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionAction {
    pub id: i64,
    pub contract_id: i64,
    pub channel: String,
    pub message: String,
    pub delinquency_day: i64,
    pub installment: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub delivery_status: String,
}

/// Subsets of contracts the scheduler loads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateFilter {
    /// In arrears and not yet checked on the given day
    InArrearsNotCheckedOn(NaiveDate),
    /// Current or paid, before any D+3 filtering
    Active,
}

/// One row of a manual status override sheet
#[derive(Debug, Clone, Deserialize)]
pub struct StatusOverride {
    #[serde(alias = "CONTRATO", deserialize_with = "string_or_number")]
    pub contract: String,
    #[serde(alias = "STATUS")]
    pub status: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s.trim().to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected contract number, found {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OverrideReport {
    pub updated: usize,
    pub not_found: usize,
    pub errors: usize,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub relabelled: usize,
    pub dead_clients: usize,
    pub lookup_errors_cancelled: usize,
    pub lookup_errors_reset: usize,
    pub overdue_cancelled: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusAudit {
    pub total: usize,
    /// Stored status value and row count, including unmigrated labels
    pub groups: Vec<(String, usize)>,
}

impl StatusAudit {
    pub fn grouped_total(&self) -> usize {
        self.groups.iter().map(|(_, count)| count).sum()
    }
}

/// Contract registered by hand or by the import tooling
#[derive(Debug, Clone)]
pub struct NewContract {
    pub number: String,
    pub holder_name: Option<String>,
    pub due_day: Option<u32>,
    pub status: ContractStatus,
}
