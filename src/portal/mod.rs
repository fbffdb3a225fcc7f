pub mod snapshot;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::billing::InvoiceFact;

pub use snapshot::{RawInvoiceRow, SnapshotPortal};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortalError {
    /// The portal session expired or became invalid; a fresh login is needed
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Navigating to or reading the invoice table failed
    #[error("invoice extraction failed: {0}")]
    Extraction(String),

    #[error("portal unavailable: {0}")]
    Unavailable(String),
}

impl PortalError {
    pub fn is_session_error(&self) -> bool {
        matches!(self, PortalError::SessionExpired(_))
    }
}

/// Session with the billing portal. One session is used sequentially for a
/// whole reconciliation cycle.
#[async_trait]
pub trait BillingPortal: Send {
    async fn login(&mut self) -> Result<(), PortalError>;

    /// Invoices issued for a contract up to the month of `reference_date`.
    /// A contract without records yields an empty list.
    async fn fetch_invoices(
        &mut self,
        contract_number: &str,
        reference_date: NaiveDate,
    ) -> Result<Vec<InvoiceFact>, PortalError>;

    /// Return to the query screen before the next contract
    async fn reset(&mut self) -> Result<(), PortalError>;

    async fn close(&mut self);
}
