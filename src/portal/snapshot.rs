use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{
    billing::{
        parse::{parse_br_amount, parse_br_date, parse_delinquency_days},
        InvoiceFact,
    },
    portal::{BillingPortal, PortalError},
};

/// One row of the portal's issued-invoices table, as raw cell text
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawInvoiceRow {
    pub cycle: String,
    pub reference: String,
    pub due: String,
    pub payment: String,
    pub amount: String,
    pub delinquency_days: String,
}

impl From<RawInvoiceRow> for InvoiceFact {
    fn from(row: RawInvoiceRow) -> Self {
        InvoiceFact {
            cycle: row.cycle.trim().to_lowercase(),
            reference: row.reference.trim().to_string(),
            due_date: parse_br_date(&row.due),
            payment_date: parse_br_date(&row.payment),
            amount: parse_br_amount(&row.amount.replace("R$", "")),
            delinquency_days: parse_delinquency_days(&row.delinquency_days),
        }
    }
}

/// Billing portal backed by exported invoice tables: `<dir>/<contract>.json`,
/// each file an array of [`RawInvoiceRow`].
pub struct SnapshotPortal {
    dir: PathBuf,
    logged_in: bool,
}

impl SnapshotPortal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            logged_in: false,
        }
    }

    fn snapshot_path(&self, contract_number: &str) -> PathBuf {
        self.dir.join(format!("{}.json", contract_number))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// The portal is queried from 01/2000 up to the reference month
fn within_query_range(invoice: &InvoiceFact, reference: NaiveDate) -> bool {
    match invoice.reference_period() {
        Some((month, year)) => (year, month) <= (reference.year(), reference.month()),
        None => true,
    }
}

#[async_trait]
impl BillingPortal for SnapshotPortal {
    async fn login(&mut self) -> Result<(), PortalError> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => {
                self.logged_in = true;
                info!("Snapshot portal ready at {}", self.dir.display());
                Ok(())
            }
            Ok(_) => Err(PortalError::Unavailable(format!(
                "{} is not a directory",
                self.dir.display()
            ))),
            Err(e) => Err(PortalError::Unavailable(format!(
                "{}: {}",
                self.dir.display(),
                e
            ))),
        }
    }

    async fn fetch_invoices(
        &mut self,
        contract_number: &str,
        reference_date: NaiveDate,
    ) -> Result<Vec<InvoiceFact>, PortalError> {
        if !self.logged_in {
            return Err(PortalError::SessionExpired("not logged in".to_string()));
        }

        let path = self.snapshot_path(contract_number);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No records for contract {}", contract_number);
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(PortalError::Extraction(format!("{}: {}", path.display(), e)));
            }
        };

        let rows: Vec<RawInvoiceRow> = serde_json::from_str(&content)
            .map_err(|e| PortalError::Extraction(format!("{}: {}", path.display(), e)))?;

        let invoices: Vec<InvoiceFact> = rows
            .into_iter()
            .map(InvoiceFact::from)
            .filter(|inv| within_query_range(inv, reference_date))
            .collect();

        debug!("Extracted {} invoices for contract {}", invoices.len(), contract_number);
        Ok(invoices)
    }

    async fn reset(&mut self) -> Result<(), PortalError> {
        Ok(())
    }

    async fn close(&mut self) {
        self.logged_in = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const TABLE: &str = r#"[
        {"cycle": "Fatura Normal", "reference": "01/2025", "due": "10/01/2025",
         "payment": "09/01/2025", "amount": "R$ 1.234,56", "delinquency_days": "0"},
        {"cycle": "Fatura Normal", "reference": "02/2025", "due": "10/02/2025",
         "payment": " ", "amount": "R$ 1.234,56", "delinquency_days": "12"},
        {"cycle": "Fatura Normal", "reference": "03/2025", "due": "10/03/2025",
         "amount": "R$ 1.234,56"}
    ]"#;

    #[tokio::test]
    async fn reads_and_parses_exported_table() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("123456.json"), TABLE).unwrap();

        let mut portal = SnapshotPortal::new(dir.path());
        portal.login().await.unwrap();
        let invoices = portal.fetch_invoices("123456", date(2025, 2, 22)).await.unwrap();

        assert_eq!(invoices.len(), 2);
        assert_eq!(invoices[0].cycle, "fatura normal");
        assert_eq!(invoices[0].payment_date, Some(date(2025, 1, 9)));
        assert_eq!(invoices[0].amount, 1234.56);
        assert_eq!(invoices[1].payment_date, None);
        assert_eq!(invoices[1].delinquency_days, 12);
    }

    #[tokio::test]
    async fn missing_snapshot_means_no_records() {
        let dir = TempDir::new().unwrap();
        let mut portal = SnapshotPortal::new(dir.path());
        portal.login().await.unwrap();
        let invoices = portal.fetch_invoices("999", date(2025, 2, 22)).await.unwrap();
        assert!(invoices.is_empty());
    }

    #[tokio::test]
    async fn requires_login_and_valid_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("42.json"), "not json").unwrap();
        let mut portal = SnapshotPortal::new(dir.path());

        let err = portal.fetch_invoices("42", date(2025, 2, 22)).await.unwrap_err();
        assert!(err.is_session_error());

        portal.login().await.unwrap();
        let err = portal.fetch_invoices("42", date(2025, 2, 22)).await.unwrap_err();
        assert!(matches!(err, PortalError::Extraction(_)));
    }

    #[tokio::test]
    async fn login_fails_for_missing_directory() {
        let mut portal = SnapshotPortal::new("/nonexistent/bree-snapshots");
        assert!(matches!(portal.login().await, Err(PortalError::Unavailable(_))));
    }
}
