//! Invoice lifecycle: create, edit, read and delete with commission snapshots.

use crate::commission::{CommissionPreview, InvoiceCommissionCalculator, SnapshotRequest};
use crate::error::SettlementError;
use crate::models::{
    AccessScope, CreateInvoice, Invoice, InvoiceQuery, InvoiceStatus, UpdateInvoice,
};
use crate::services::metrics::INVOICES_TOTAL;
use crate::store::{bounded, SettlementStore};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub client_id: Option<Uuid>,
    pub distributor_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct InvoiceService {
    store: Arc<dyn SettlementStore>,
    calculator: InvoiceCommissionCalculator,
    lookup_timeout: Duration,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn SettlementStore>, lookup_timeout: Duration) -> Self {
        Self {
            calculator: InvoiceCommissionCalculator::new(store.clone(), lookup_timeout),
            store,
            lookup_timeout,
        }
    }

    /// Create an invoice with a fresh commission snapshot and an unpaid ledger.
    ///
    /// Callers without view-all may only create invoices assigned to themselves.
    #[instrument(skip(self, scope, input), fields(actor_id = %scope.actor_id, invoice_code = %input.invoice_code))]
    pub async fn create(
        &self,
        scope: &AccessScope,
        input: CreateInvoice,
    ) -> Result<Invoice, SettlementError> {
        input.validate().map_err(AppError::from)?;
        ensure_may_assign(scope, input.assigned_distributor_id)?;

        let snapshot = self
            .calculator
            .compute_snapshot(&SnapshotRequest {
                client_id: input.client_id,
                distributor_id: input.assigned_distributor_id,
                file_id: input.file_id,
                amount: input.amount,
            })
            .await?;

        let invoice = Invoice::new(input, scope.actor_id, snapshot);
        bounded(
            self.lookup_timeout,
            "insert_invoice",
            self.store.insert_invoice(&invoice),
        )
        .await?;

        INVOICES_TOTAL.with_label_values(&["created"]).inc();
        info!(invoice_id = %invoice.invoice_id, amount = %invoice.amount, "Invoice created");

        Ok(invoice)
    }

    /// The invoice, if it exists and the caller may see it.
    pub async fn get(&self, scope: &AccessScope, invoice_id: Uuid) -> Result<Invoice, SettlementError> {
        bounded(
            self.lookup_timeout,
            "get_invoice",
            self.store.get_invoice(invoice_id),
        )
        .await?
        .filter(|invoice| scope.can_see(invoice))
        .ok_or_else(|| SettlementError::invoice_not_found(invoice_id))
    }

    pub async fn list(
        &self,
        scope: &AccessScope,
        filter: ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, SettlementError> {
        let mut query = InvoiceQuery::new(scope.visibility());
        query.client_id = filter.client_id;
        query.distributor_id = filter.distributor_id;
        query.status = filter.status;
        query.limit = filter.limit;

        Ok(bounded(
            self.lookup_timeout,
            "find_invoices",
            self.store.find_invoices(&query),
        )
        .await?)
    }

    /// Apply an edit. The commission snapshot is recomputed only when the
    /// amount or a party changes; the payment ledger is never touched.
    #[instrument(skip(self, scope, changes), fields(actor_id = %scope.actor_id))]
    pub async fn update(
        &self,
        scope: &AccessScope,
        invoice_id: Uuid,
        changes: UpdateInvoice,
    ) -> Result<Invoice, SettlementError> {
        changes.validate().map_err(AppError::from)?;
        let current = self.get(scope, invoice_id).await?;
        if let Some(distributor_id) = changes.assigned_distributor_id {
            ensure_may_assign(scope, distributor_id)?;
        }

        let recompute = changes.touches_commission(&current);
        let mut updated = current;
        changes.apply_to(&mut updated);

        if recompute {
            updated.commission = self
                .calculator
                .compute_snapshot(&SnapshotRequest {
                    client_id: updated.client_id,
                    distributor_id: updated.assigned_distributor_id,
                    file_id: updated.file_id,
                    amount: updated.amount,
                })
                .await?;
        }

        let saved = bounded(
            self.lookup_timeout,
            "save_invoice_details",
            self.store.save_invoice_details(&updated),
        )
        .await?;
        if !saved {
            return Err(SettlementError::invoice_not_found(invoice_id));
        }

        INVOICES_TOTAL.with_label_values(&["updated"]).inc();
        info!(invoice_id = %invoice_id, recomputed = recompute, "Invoice updated");

        // Re-read so the returned ledger reflects concurrent step writes.
        bounded(
            self.lookup_timeout,
            "get_invoice",
            self.store.get_invoice(invoice_id),
        )
        .await?
        .ok_or_else(|| SettlementError::invoice_not_found(invoice_id))
    }

    /// Administrators only.
    #[instrument(skip(self, scope), fields(actor_id = %scope.actor_id))]
    pub async fn delete(&self, scope: &AccessScope, invoice_id: Uuid) -> Result<(), SettlementError> {
        if !scope.is_admin() {
            return Err(SettlementError::Permission(
                "only administrators can delete invoices".to_string(),
            ));
        }
        self.get(scope, invoice_id).await?;

        let deleted = bounded(
            self.lookup_timeout,
            "delete_invoice",
            self.store.delete_invoice(invoice_id),
        )
        .await?;
        if !deleted {
            return Err(SettlementError::invoice_not_found(invoice_id));
        }

        INVOICES_TOTAL.with_label_values(&["deleted"]).inc();
        info!(invoice_id = %invoice_id, "Invoice deleted");
        Ok(())
    }

    /// What the commission would be right now. Nothing is written. Callers
    /// may only preview invoices they would be allowed to create.
    pub async fn preview(
        &self,
        scope: &AccessScope,
        request: &SnapshotRequest,
    ) -> Result<CommissionPreview, SettlementError> {
        ensure_may_assign(scope, request.distributor_id)?;
        self.calculator.preview(request).await
    }
}

fn ensure_may_assign(scope: &AccessScope, distributor_id: Uuid) -> Result<(), SettlementError> {
    if scope.can_view_all || (scope.can_view_own && distributor_id == scope.actor_id) {
        Ok(())
    } else {
        Err(SettlementError::Permission(
            "invoices can only be assigned to yourself".to_string(),
        ))
    }
}
