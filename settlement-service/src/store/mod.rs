//! Persistence seam for settlement-service.

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::models::{
    Client, CommissionEntity, CommissionTier, Company, Distributor, File, Invoice, InvoiceQuery,
};
use crate::settlement::{SettlementStep, StepRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Storage used by the commission engine and the settlement state machine.
///
/// Step writes are conditional: they apply only while the ledger is still in
/// the state the caller observed, and report `false` otherwise.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn client(&self, client_id: Uuid) -> Result<Option<Client>, AppError>;

    async fn distributor(&self, distributor_id: Uuid) -> Result<Option<Distributor>, AppError>;

    async fn company(&self, company_id: Uuid) -> Result<Option<Company>, AppError>;

    async fn file(&self, file_id: Uuid) -> Result<Option<File>, AppError>;

    /// Default rate of an entity, `None` if the entity does not exist.
    async fn default_rate(&self, entity: CommissionEntity) -> Result<Option<Decimal>, AppError> {
        Ok(match entity {
            CommissionEntity::Client(id) => self.client(id).await?.map(|c| c.commission_rate),
            CommissionEntity::Distributor(id) => {
                self.distributor(id).await?.map(|d| d.commission_rate)
            }
            CommissionEntity::Company(id) => self.company(id).await?.map(|c| c.commission_rate),
        })
    }

    async fn file_company(&self, file_id: Uuid) -> Result<Option<Uuid>, AppError> {
        Ok(self.file(file_id).await?.and_then(|f| f.company_id))
    }

    async fn tiers_for(&self, entity: CommissionEntity) -> Result<Vec<CommissionTier>, AppError>;

    async fn file_ids_for_company(&self, company_id: Uuid) -> Result<Vec<Uuid>, AppError>;

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError>;

    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError>;

    /// Overwrite everything except the payment ledger. `false` if missing.
    async fn save_invoice_details(&self, invoice: &Invoice) -> Result<bool, AppError>;

    async fn delete_invoice(&self, invoice_id: Uuid) -> Result<bool, AppError>;

    /// Matching invoices, newest first.
    async fn find_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, AppError>;

    /// Mark `step` paid if it is unpaid and its predecessor is paid.
    async fn set_step_paid(
        &self,
        invoice_id: Uuid,
        step: SettlementStep,
        record: &StepRecord,
    ) -> Result<bool, AppError>;

    /// Reset `step` if it is paid and its successor is unpaid.
    async fn clear_step(
        &self,
        invoice_id: Uuid,
        step: SettlementStep,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn save_client(&self, client: &Client) -> Result<(), AppError>;

    async fn save_distributor(&self, distributor: &Distributor) -> Result<(), AppError>;

    async fn save_company(&self, company: &Company) -> Result<(), AppError>;

    async fn save_file(&self, file: &File) -> Result<(), AppError>;

    async fn save_tier(&self, tier: &CommissionTier) -> Result<(), AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Run a store call under the lookup deadline.
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation = operation,
                timeout_ms = limit.as_millis() as u64,
                "Store call timed out"
            );
            Err(AppError::Timeout(format!(
                "{} exceeded {}ms",
                operation,
                limit.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let value = bounded(Duration::from_millis(50), "noop", async { Ok::<_, AppError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result = bounded(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
    }
}
