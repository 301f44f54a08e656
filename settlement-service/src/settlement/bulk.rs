//! Advance many invoices by one step.

use crate::error::SettlementError;
use crate::models::{AccessScope, Invoice, InvoiceQuery, Role};
use crate::services::metrics::BULK_INVOICES_TOTAL;
use crate::settlement::ledger::SettlementStep;
use crate::settlement::machine::PaymentStepStateMachine;
use crate::store::{bounded, SettlementStore};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Narrows the invoices a bulk call touches. Absent fields do not filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFilter {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub distributor_id: Option<Uuid>,
    /// Matches invoices whose file belongs to this company.
    #[serde(default)]
    pub company_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkOutcome {
    NoEligibleInvoices,
    Applied { updated: usize, failed: usize },
}

impl BulkOutcome {
    pub fn updated(&self) -> usize {
        match self {
            BulkOutcome::NoEligibleInvoices => 0,
            BulkOutcome::Applied { updated, .. } => *updated,
        }
    }
}

#[derive(Clone)]
pub struct BulkSettlementProcessor {
    machine: PaymentStepStateMachine,
    store: Arc<dyn SettlementStore>,
    lookup_timeout: Duration,
    concurrency: usize,
}

impl BulkSettlementProcessor {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        lookup_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            machine: PaymentStepStateMachine::new(store.clone(), lookup_timeout),
            store,
            lookup_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Mark `step` on every visible invoice matching `filter` whose previous
    /// step is paid and whose `step` is not. Per-invoice failures are logged
    /// and counted; only setup errors are returned.
    #[instrument(skip(self, scope, step), fields(actor_id = %scope.actor_id, step = %step))]
    pub async fn apply_step(
        &self,
        scope: &AccessScope,
        step: SettlementStep,
        filter: BulkFilter,
    ) -> Result<BulkOutcome, SettlementError> {
        let allowed = match step {
            SettlementStep::ClientToDistributor => {
                scope.role == Role::Distributor || scope.can_view_all
            }
            SettlementStep::DistributorToAdmin | SettlementStep::AdminToCompany => {
                scope.is_admin()
            }
        };
        if !allowed {
            return Err(SettlementError::Permission(format!(
                "role '{}' cannot bulk-mark '{}'",
                scope.role.as_str(),
                step
            )));
        }

        let Some(query) = self.build_query(scope, step, &filter).await? else {
            return Ok(BulkOutcome::NoEligibleInvoices);
        };

        let candidates: Vec<Invoice> = bounded(
            self.lookup_timeout,
            "find_invoices",
            self.store.find_invoices(&query),
        )
        .await?
        .into_iter()
        .filter(|invoice| PaymentStepStateMachine::can_transition(scope, invoice, step))
        .collect();

        if candidates.is_empty() {
            info!(?filter, "No eligible invoices for bulk settlement");
            return Ok(BulkOutcome::NoEligibleInvoices);
        }

        let results: Vec<(Uuid, Result<Invoice, SettlementError>)> = stream::iter(candidates)
            .map(|invoice| async move {
                let invoice_id = invoice.invoice_id;
                (
                    invoice_id,
                    self.machine.mark_loaded(scope, invoice, step).await,
                )
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut updated = 0;
        let mut failed = 0;
        for (invoice_id, result) in results {
            match result {
                Ok(_) => {
                    updated += 1;
                    BULK_INVOICES_TOTAL
                        .with_label_values(&[step.as_str(), "updated"])
                        .inc();
                }
                Err(e) => {
                    failed += 1;
                    BULK_INVOICES_TOTAL
                        .with_label_values(&[step.as_str(), e.kind()])
                        .inc();
                    warn!(invoice_id = %invoice_id, error = %e, "Bulk settlement skipped invoice");
                }
            }
        }

        info!(updated, failed, step_label = step.label(), "Bulk settlement applied");
        Ok(BulkOutcome::Applied { updated, failed })
    }

    /// `None` when the filter cannot match anything (company without files,
    /// or a distributor filtering on someone else's invoices).
    async fn build_query(
        &self,
        scope: &AccessScope,
        step: SettlementStep,
        filter: &BulkFilter,
    ) -> Result<Option<InvoiceQuery>, SettlementError> {
        let mut query = InvoiceQuery::new(scope.visibility()).eligible_for(step);

        if let Some(client_id) = filter.client_id {
            query = query.client(client_id);
        }
        if let Some(distributor_id) = filter.distributor_id {
            query = query.distributor(distributor_id);
        }
        // A distributor only collects on their own invoices, even with view-all.
        if step == SettlementStep::ClientToDistributor && scope.role == Role::Distributor {
            if filter.distributor_id.is_some_and(|id| id != scope.actor_id) {
                return Ok(None);
            }
            query = query.distributor(scope.actor_id);
        }
        if let Some(company_id) = filter.company_id {
            let file_ids = bounded(
                self.lookup_timeout,
                "file_ids_for_company",
                self.store.file_ids_for_company(company_id),
            )
            .await?;
            if file_ids.is_empty() {
                return Ok(None);
            }
            query = query.files(file_ids);
        }

        Ok(Some(query))
    }
}
