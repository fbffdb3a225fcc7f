use chrono::NaiveDate;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::{
    billing::{classify, eligibility_window, ClassificationContext, ContractStatus, InvoiceFact},
    config::ReconcileConfig,
    error::Result,
    portal::BillingPortal,
    reconcile::{
        connectivity::{wait_for_connectivity, ConnectivityProbe, TcpProbe},
        lifecycle::{Heartbeat, ShutdownSignal},
        retry::{RetryDecision, RetryPolicy},
        scheduler::{self, CheckKind},
        summary::{ContractOutcome, CycleSummary},
    },
    storage::{Contract, Database},
};

/// Wait before retrying a login rejected for an invalid session
const SESSION_RELOGIN_DELAY: Duration = Duration::from_secs(5);

/// Drives reconciliation cycles against one portal session
pub struct Reconciler<P: BillingPortal> {
    portal: P,
    db: Database,
    settings: ReconcileConfig,
    retry: RetryPolicy,
    probe: Box<dyn ConnectivityProbe>,
    heartbeat: Heartbeat,
    shutdown: ShutdownSignal,
}

impl<P: BillingPortal> Reconciler<P> {
    pub fn new(portal: P, db: Database, settings: ReconcileConfig) -> Self {
        let probe = Box::new(TcpProbe::new(settings.connectivity_probe.clone()));
        Self {
            portal,
            db,
            retry: RetryPolicy::new(settings.max_retries),
            settings,
            probe,
            heartbeat: Heartbeat::new(),
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn ConnectivityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    /// Logs in, retrying until it works. Returns `false` only when a shutdown
    /// was requested before a session could be established.
    pub async fn login(&mut self) -> bool {
        let mut attempt: u32 = 0;
        loop {
            if self.shutdown.is_triggered() || !self.wait_online().await {
                return false;
            }

            attempt += 1;
            info!("Portal login attempt #{}", attempt);
            match self.portal.login().await {
                Ok(()) => {
                    self.heartbeat.beat();
                    info!("Portal session established");
                    return true;
                }
                Err(e) => {
                    let delay = if e.is_session_error() {
                        SESSION_RELOGIN_DELAY
                    } else {
                        self.settings.login_backoff(attempt)
                    };
                    error!(
                        "Login attempt #{} failed: {}. Retrying in {}s",
                        attempt,
                        e,
                        delay.as_secs()
                    );
                    if !self.idle(delay).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Runs one pass over every contract due for a check on `today`
    pub async fn run_cycle(&mut self, today: NaiveDate) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();

        if !self.wait_online().await {
            summary.interrupted = true;
            return Ok(summary);
        }

        let candidates = scheduler::load_candidates(&self.db, today)?;
        summary.total = candidates.len();
        if candidates.is_empty() {
            info!("No contracts pending for {}", today);
            return Ok(summary);
        }

        for (kind, contract) in candidates.into_queue() {
            if self.shutdown.is_triggered() {
                warn!(
                    "Shutdown requested, stopping cycle after {} contracts",
                    summary.processed()
                );
                summary.interrupted = true;
                break;
            }

            self.heartbeat.beat();
            let number = contract.number.clone();
            let outcome = self.reconcile_contract(contract, kind, today).await;
            summary.record(number, outcome);
        }

        Ok(summary)
    }

    /// Fetches, classifies and persists one contract. Failures are reported
    /// in the outcome so the rest of the batch keeps going.
    pub async fn reconcile_contract(
        &mut self,
        mut contract: Contract,
        kind: CheckKind,
        today: NaiveDate,
    ) -> ContractOutcome {
        let Some(portal_number) = contract.portal_number() else {
            warn!("Contract {:?} has no digits, skipping", contract.number);
            return ContractOutcome::Skipped("contract number has no digits".to_string());
        };

        info!("[{}] Checking contract {}", kind, contract.number);

        let mut attempt: u32 = 0;
        let invoices = loop {
            match self.portal.fetch_invoices(&portal_number, today).await {
                Ok(invoices) => break invoices,
                Err(e) => {
                    warn!(
                        "Contract {} attempt {}/{} failed: {}",
                        contract.number,
                        attempt + 1,
                        self.retry.max_attempts(),
                        e
                    );

                    match self.retry.decide(attempt, &e) {
                        RetryDecision::Relogin => {
                            warn!("Session lost while checking {}, logging in again", contract.number);
                            if !self.login().await {
                                return ContractOutcome::Failed("shutdown during re-login".to_string());
                            }
                        }
                        RetryDecision::ResetAndRetry => {
                            if let Err(reset_err) = self.portal.reset().await {
                                warn!("Portal reset failed: {}", reset_err);
                            }
                        }
                        RetryDecision::GiveUp { restore_session } => {
                            error!(
                                "Giving up on contract {} for this cycle: {}",
                                contract.number, e
                            );
                            if restore_session {
                                self.login().await;
                            }
                            return ContractOutcome::Failed(e.to_string());
                        }
                    }
                    attempt += 1;
                }
            }
        };

        let previous = contract.status;
        let outcome = match self.record(&mut contract, &invoices, today) {
            Ok(action_created) => {
                info!(
                    "Contract {}: {} -> {}",
                    contract.number,
                    previous.label(),
                    contract.status.label()
                );
                ContractOutcome::Updated {
                    previous,
                    status: contract.status,
                    action_created,
                }
            }
            Err(e) => {
                error!("Failed to save contract {}: {}", contract.number, e);
                ContractOutcome::Failed(e.to_string())
            }
        };

        if let Err(e) = self.portal.reset().await {
            warn!("Portal reset after {} failed: {}", contract.number, e);
        }

        outcome
    }

    /// Classifies the invoices, persists the result and creates the
    /// collection action for contracts still in arrears
    fn record(&self, contract: &mut Contract, invoices: &[InvoiceFact], today: NaiveDate) -> Result<bool> {
        let window = contract.due_day.and_then(|day| eligibility_window(day, today));
        let ctx = ClassificationContext {
            reference_date: today,
            due_date: window.map(|w| w.due_date),
            eligible_now: window.map_or(false, |w| w.eligible),
        };

        let classification = classify(invoices, &ctx).with_default_cutoff();
        if classification.status == ContractStatus::CancelledForDefault
            && contract.status != ContractStatus::CancelledForDefault
        {
            warn!(
                "Contract {} is {} days late, cancelling for default",
                contract.number, classification.delinquency_days
            );
        }

        contract.apply_classification(&classification, today);
        self.db.save_contract(contract)?;

        if contract.status == ContractStatus::InArrears {
            let day = contract.delinquency_days.unwrap_or(0);
            return self.db.ensure_collection_action(contract, day);
        }
        Ok(false)
    }

    /// Logs in, then reconciles on a fixed interval until shutdown
    pub async fn run_forever(&mut self) -> Result<()> {
        if !self.login().await {
            return Ok(());
        }

        loop {
            self.heartbeat.beat();
            let today = self.settings.today()?;

            match self.run_cycle(today).await {
                Ok(summary) => summary.log(),
                Err(e) => {
                    error!("Cycle failed: {}", e);
                    if !self.login().await {
                        break;
                    }
                }
            }

            if self.shutdown.is_triggered() {
                break;
            }

            info!("Next cycle in {}s", self.settings.interval_secs);
            if !self.idle(Duration::from_secs(self.settings.interval_secs)).await {
                break;
            }
        }

        info!("Reconciliation service stopped");
        Ok(())
    }

    pub async fn close(&mut self) {
        self.portal.close().await;
    }

    async fn wait_online(&self) -> bool {
        wait_for_connectivity(
            self.probe.as_ref(),
            self.settings.connectivity_poll(),
            &self.heartbeat,
            &self.shutdown,
        )
        .await
    }

    /// Sleeps in watchdog-sized slices, beating between them. Returns `false`
    /// if shutdown was requested.
    async fn idle(&self, total: Duration) -> bool {
        let step = self.settings.watchdog_poll().max(Duration::from_millis(10));
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.shutdown.is_triggered() {
                return false;
            }
            let nap = remaining.min(step);
            tokio::time::sleep(nap).await;
            self.heartbeat.beat();
            remaining -= nap;
        }
        !self.shutdown.is_triggered()
    }
}
