//! Applies ledger transitions to stored invoices.

use crate::error::SettlementError;
use crate::models::{AccessScope, Invoice};
use crate::services::metrics::PAYMENT_TRANSITIONS_TOTAL;
use crate::settlement::ledger::{SettlementState, SettlementStep, StepRecord, Transition};
use crate::store::{bounded, SettlementStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PaymentStepStateMachine {
    store: Arc<dyn SettlementStore>,
    lookup_timeout: Duration,
}

fn record_outcome<T>(step: SettlementStep, action: &str, result: &Result<T, SettlementError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    PAYMENT_TRANSITIONS_TOTAL
        .with_label_values(&[step.as_str(), action, outcome])
        .inc();
}

impl PaymentStepStateMachine {
    pub fn new(store: Arc<dyn SettlementStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
        }
    }

    /// Role gate for marking `step` on `invoice`.
    ///
    /// The first hop may be marked by the assigned distributor or anyone who
    /// sees all invoices; the admin hops need the admin role.
    pub fn can_transition(scope: &AccessScope, invoice: &Invoice, step: SettlementStep) -> bool {
        match step {
            SettlementStep::ClientToDistributor => {
                scope.can_view_all || invoice.assigned_distributor_id == scope.actor_id
            }
            SettlementStep::DistributorToAdmin | SettlementStep::AdminToCompany => {
                scope.is_admin()
            }
        }
    }

    #[instrument(
        skip(self, scope, invoice_id, step),
        fields(actor_id = %scope.actor_id, invoice_id = %invoice_id, step = %step)
    )]
    pub async fn mark_paid(
        &self,
        scope: &AccessScope,
        invoice_id: Uuid,
        step: SettlementStep,
    ) -> Result<Invoice, SettlementError> {
        let result = match self.load_visible(scope, invoice_id).await {
            Ok(invoice) => self.mark_loaded(scope, invoice, step).await,
            Err(e) => Err(e),
        };
        record_outcome(step, "mark", &result);
        result
    }

    /// Mark `step` on an invoice the caller has already loaded and may see.
    pub(crate) async fn mark_loaded(
        &self,
        scope: &AccessScope,
        invoice: Invoice,
        step: SettlementStep,
    ) -> Result<Invoice, SettlementError> {
        let invoice_id = invoice.invoice_id;

        if !Self::can_transition(scope, &invoice, step) {
            return Err(SettlementError::Permission(format!(
                "role '{}' cannot mark '{}' on invoice {}",
                scope.role.as_str(),
                step,
                invoice_id
            )));
        }

        ledger_state(&invoice)?.apply(Transition::Mark(step))?;

        let record = StepRecord::paid(scope.actor_id, Utc::now());
        let written = bounded(
            self.lookup_timeout,
            "set_step_paid",
            self.store.set_step_paid(invoice_id, step, &record),
        )
        .await?;

        if !written {
            return Err(self.explain_lost_write(invoice_id, Transition::Mark(step)).await);
        }

        info!(invoice_id = %invoice_id, step_label = step.label(), "Payment step marked as paid");

        let mut updated = invoice;
        updated.updated_utc = record.marked_at.unwrap_or(updated.updated_utc);
        *updated.payment_status.step_mut(step) = record;
        Ok(updated)
    }

    /// Reset one step. Administrators only; later steps must be unpaid.
    #[instrument(
        skip(self, scope, invoice_id, step),
        fields(actor_id = %scope.actor_id, invoice_id = %invoice_id, step = %step)
    )]
    pub async fn unmark_paid(
        &self,
        scope: &AccessScope,
        invoice_id: Uuid,
        step: SettlementStep,
    ) -> Result<Invoice, SettlementError> {
        let result = self.unmark(scope, invoice_id, step).await;
        record_outcome(step, "unmark", &result);
        result
    }

    async fn unmark(
        &self,
        scope: &AccessScope,
        invoice_id: Uuid,
        step: SettlementStep,
    ) -> Result<Invoice, SettlementError> {
        if !scope.is_admin() {
            return Err(SettlementError::Permission(
                "only administrators can reverse payment steps".to_string(),
            ));
        }

        let invoice = self.load_visible(scope, invoice_id).await?;
        ledger_state(&invoice)?.apply(Transition::Unmark(step))?;

        let at = Utc::now();
        let written = bounded(
            self.lookup_timeout,
            "clear_step",
            self.store.clear_step(invoice_id, step, at),
        )
        .await?;

        if !written {
            return Err(self
                .explain_lost_write(invoice_id, Transition::Unmark(step))
                .await);
        }

        info!(invoice_id = %invoice_id, step_label = step.label(), "Payment step reverted");

        let mut updated = invoice;
        *updated.payment_status.step_mut(step) = StepRecord::default();
        updated.updated_utc = at;
        Ok(updated)
    }

    async fn load_visible(
        &self,
        scope: &AccessScope,
        invoice_id: Uuid,
    ) -> Result<Invoice, SettlementError> {
        bounded(
            self.lookup_timeout,
            "get_invoice",
            self.store.get_invoice(invoice_id),
        )
        .await?
        .filter(|invoice| scope.can_see(invoice))
        .ok_or_else(|| SettlementError::invoice_not_found(invoice_id))
    }

    /// A conditional write matched nothing: re-read and report why.
    async fn explain_lost_write(&self, invoice_id: Uuid, transition: Transition) -> SettlementError {
        let current = match bounded(
            self.lookup_timeout,
            "get_invoice",
            self.store.get_invoice(invoice_id),
        )
        .await
        {
            Ok(Some(invoice)) => invoice,
            Ok(None) => return SettlementError::invoice_not_found(invoice_id),
            Err(e) => return SettlementError::Store(e),
        };

        let reason = match ledger_state(&current) {
            Ok(state) => match state.apply(transition) {
                Err(e) => e,
                Ok(_) => SettlementError::ConcurrentModification(invoice_id),
            },
            Err(e) => e,
        };
        warn!(invoice_id = %invoice_id, reason = %reason, "Conditional ledger write lost");
        reason
    }
}

fn ledger_state(invoice: &Invoice) -> Result<SettlementState, SettlementError> {
    invoice
        .payment_status
        .state()
        .ok_or(SettlementError::InconsistentLedger(invoice.invoice_id))
}
