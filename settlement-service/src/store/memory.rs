//! In-process store backed by `DashMap`, used for tests and local runs.

use super::SettlementStore;
use crate::models::{
    Client, CommissionEntity, CommissionTier, Company, Distributor, File, Invoice, InvoiceQuery,
};
use crate::settlement::{SettlementStep, StepRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    clients: DashMap<Uuid, Client>,
    distributors: DashMap<Uuid, Distributor>,
    companies: DashMap<Uuid, Company>,
    files: DashMap<Uuid, File>,
    tiers: DashMap<Uuid, CommissionTier>,
    invoices: DashMap<Uuid, Invoice>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        Ok(self.clients.get(&client_id).map(|c| c.clone()))
    }

    async fn distributor(&self, distributor_id: Uuid) -> Result<Option<Distributor>, AppError> {
        Ok(self.distributors.get(&distributor_id).map(|d| d.clone()))
    }

    async fn company(&self, company_id: Uuid) -> Result<Option<Company>, AppError> {
        Ok(self.companies.get(&company_id).map(|c| c.clone()))
    }

    async fn file(&self, file_id: Uuid) -> Result<Option<File>, AppError> {
        Ok(self.files.get(&file_id).map(|f| f.clone()))
    }

    async fn tiers_for(&self, entity: CommissionEntity) -> Result<Vec<CommissionTier>, AppError> {
        Ok(self
            .tiers
            .iter()
            .filter(|t| t.entity == entity)
            .map(|t| t.clone())
            .collect())
    }

    async fn file_ids_for_company(&self, company_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .files
            .iter()
            .filter(|f| f.company_id == Some(company_id))
            .map(|f| f.file_id)
            .collect())
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        match self.invoices.entry(invoice.invoice_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} already exists",
                invoice.invoice_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(invoice.clone());
                Ok(())
            }
        }
    }

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.invoices.get(&invoice_id).map(|i| i.clone()))
    }

    async fn save_invoice_details(&self, invoice: &Invoice) -> Result<bool, AppError> {
        let Some(mut stored) = self.invoices.get_mut(&invoice.invoice_id) else {
            return Ok(false);
        };
        let payment_status = stored.payment_status.clone();
        *stored = Invoice {
            payment_status,
            ..invoice.clone()
        };
        Ok(true)
    }

    async fn delete_invoice(&self, invoice_id: Uuid) -> Result<bool, AppError> {
        Ok(self.invoices.remove(&invoice_id).is_some())
    }

    async fn find_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, AppError> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|i| query.matches(i))
            .map(|i| i.clone())
            .collect();
        invoices.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        if let Some(limit) = query.limit {
            invoices.truncate(limit);
        }
        Ok(invoices)
    }

    async fn set_step_paid(
        &self,
        invoice_id: Uuid,
        step: SettlementStep,
        record: &StepRecord,
    ) -> Result<bool, AppError> {
        // get_mut holds the shard lock, so check-and-set is atomic per invoice.
        let Some(mut invoice) = self.invoices.get_mut(&invoice_id) else {
            return Ok(false);
        };
        if !invoice.payment_status.is_next(step) {
            return Ok(false);
        }
        *invoice.payment_status.step_mut(step) = record.clone();
        invoice.updated_utc = record.marked_at.unwrap_or_else(Utc::now);
        Ok(true)
    }

    async fn clear_step(
        &self,
        invoice_id: Uuid,
        step: SettlementStep,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let Some(mut invoice) = self.invoices.get_mut(&invoice_id) else {
            return Ok(false);
        };
        let status = &invoice.payment_status;
        let later_paid = step.next().is_some_and(|next| status.step(next).is_paid);
        if !status.step(step).is_paid || later_paid {
            return Ok(false);
        }
        *invoice.payment_status.step_mut(step) = StepRecord::default();
        invoice.updated_utc = at;
        Ok(true)
    }

    async fn save_client(&self, client: &Client) -> Result<(), AppError> {
        self.clients.insert(client.client_id, client.clone());
        Ok(())
    }

    async fn save_distributor(&self, distributor: &Distributor) -> Result<(), AppError> {
        self.distributors
            .insert(distributor.distributor_id, distributor.clone());
        Ok(())
    }

    async fn save_company(&self, company: &Company) -> Result<(), AppError> {
        self.companies.insert(company.company_id, company.clone());
        Ok(())
    }

    async fn save_file(&self, file: &File) -> Result<(), AppError> {
        self.files.insert(file.file_id, file.clone());
        Ok(())
    }

    async fn save_tier(&self, tier: &CommissionTier) -> Result<(), AppError> {
        self.tiers.insert(tier.tier_id, tier.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}
