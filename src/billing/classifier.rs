use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::debug;

use crate::billing::{
    parse::reference_month_start,
    types::{ContractStatus, InvoiceFact},
};

/// Delinquency days above which an in-arrears contract is cancelled for default
pub const DEFAULT_CUTOFF_DAYS: i64 = 60;

/// Inputs the classifier needs besides the invoices
#[derive(Debug, Clone, Copy)]
pub struct ClassificationContext {
    pub reference_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub eligible_now: bool,
}

/// Classification rules, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rule {
    TerminationFee,
    OverdueInvoice,
    CurrentPeriodPaid,
    Default,
}

pub const RULES: [Rule; 4] = [
    Rule::TerminationFee,
    Rule::OverdueInvoice,
    Rule::CurrentPeriodPaid,
    Rule::Default,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub status: ContractStatus,
    pub rule: Rule,
    pub amount: f64,
    pub installment: u32,
    pub delinquency_days: i64,
    pub cancellation_month: Option<NaiveDate>,
}

impl Classification {
    fn settled(status: ContractStatus, rule: Rule) -> Self {
        Self {
            status,
            rule,
            amount: 0.0,
            installment: 0,
            delinquency_days: 0,
            cancellation_month: None,
        }
    }

    /// Applies the cutoff: more than 60 days in arrears means cancelled for default.
    /// Derived fields are kept so the dashboard still sees the overdue installment.
    pub fn with_default_cutoff(mut self) -> Self {
        if self.status == ContractStatus::InArrears && self.delinquency_days > DEFAULT_CUTOFF_DAYS {
            debug!(
                "Arrears of {} days exceed {} days, cancelling for default",
                self.delinquency_days, DEFAULT_CUTOFF_DAYS
            );
            self.status = ContractStatus::CancelledForDefault;
        }
        self
    }
}

impl Rule {
    pub fn evaluate(
        self,
        invoices: &[InvoiceFact],
        ctx: &ClassificationContext,
    ) -> Option<Classification> {
        match self {
            Rule::TerminationFee => termination_fee(invoices),
            Rule::OverdueInvoice => overdue_invoice(invoices, ctx.reference_date),
            Rule::CurrentPeriodPaid => current_period_paid(invoices, ctx),
            Rule::Default => Some(Classification::settled(ContractStatus::Current, Rule::Default)),
        }
    }
}

/// Maps a contract's invoice list onto a status. The first matching rule wins.
pub fn classify(invoices: &[InvoiceFact], ctx: &ClassificationContext) -> Classification {
    RULES
        .iter()
        .find_map(|rule| rule.evaluate(invoices, ctx))
        .unwrap_or_else(|| Classification::settled(ContractStatus::Current, Rule::Default))
}

fn termination_fee(invoices: &[InvoiceFact]) -> Option<Classification> {
    let penalty = invoices.iter().find(|inv| inv.is_termination_fee())?;
    debug!("Rescission penalty found in invoice ref {}", penalty.reference);

    Some(Classification {
        cancellation_month: reference_month_start(&penalty.reference),
        ..Classification::settled(ContractStatus::CancelledForDefault, Rule::TerminationFee)
    })
}

fn overdue_invoice(invoices: &[InvoiceFact], reference: NaiveDate) -> Option<Classification> {
    let installments: Vec<&InvoiceFact> = invoices
        .iter()
        .filter(|inv| !inv.is_termination_fee())
        .collect();

    let oldest = installments
        .iter()
        .copied()
        .filter(|inv| inv.is_overdue(reference))
        .min_by_key(|inv| inv.due_date)?;

    let installment = installment_position(&installments, oldest).unwrap_or(1);
    debug!(
        "Overdue invoice ref {} due {:?}, amount {:.2}, {} days late, installment {}",
        oldest.reference, oldest.due_date, oldest.amount, oldest.delinquency_days, installment
    );

    Some(Classification {
        status: ContractStatus::InArrears,
        rule: Rule::OverdueInvoice,
        amount: oldest.amount,
        installment,
        delinquency_days: oldest.delinquency_days,
        cancellation_month: None,
    })
}

/// 1-based position among installments ordered by due date. Undefined when
/// any installment lacks a due date.
fn installment_position(installments: &[&InvoiceFact], target: &InvoiceFact) -> Option<u32> {
    if installments.iter().any(|inv| inv.due_date.is_none()) {
        return None;
    }

    let mut ordered = installments.to_vec();
    ordered.sort_by_key(|inv| inv.due_date);
    ordered
        .iter()
        .position(|inv| *inv == target)
        .map(|idx| idx as u32 + 1)
}

fn current_period_paid(
    invoices: &[InvoiceFact],
    ctx: &ClassificationContext,
) -> Option<Classification> {
    if !ctx.eligible_now || ctx.due_date.is_none() {
        return None;
    }

    let period = (ctx.reference_date.month(), ctx.reference_date.year());
    let paid = invoices
        .iter()
        .filter(|inv| !inv.is_termination_fee())
        .any(|inv| inv.reference_period() == Some(period) && inv.is_paid());

    if paid {
        debug!("Installment for {:02}/{} confirmed paid", period.0, period.1);
        Some(Classification::settled(ContractStatus::Paid, Rule::CurrentPeriodPaid))
    } else {
        None
    }
}
