use crate::error::SettlementError;
use crate::models::{AccessScope, Client, Company, Distributor, Invoice, InvoiceQuery};
use crate::settlement::SettlementStep;
use crate::store::{bounded, SettlementStore};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

/// Paid count per settlement step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepCounts {
    pub client_to_distributor: usize,
    pub distributor_to_admin: usize,
    pub admin_to_company: usize,
}

impl StepCounts {
    fn add(&mut self, step: SettlementStep) {
        match step {
            SettlementStep::ClientToDistributor => self.client_to_distributor += 1,
            SettlementStep::DistributorToAdmin => self.distributor_to_admin += 1,
            SettlementStep::AdminToCompany => self.admin_to_company += 1,
        }
    }
}

/// Totals over a set of invoices, read from stored snapshots and ledgers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceStats {
    pub invoice_count: usize,
    pub total_amount: Decimal,
    pub paid_steps: StepCounts,
    /// Invoices whose final step is paid.
    pub completed_count: usize,
    pub pending_count: usize,
    pub client_commission: Decimal,
    pub distributor_commission: Decimal,
    pub company_commission: Decimal,
    pub net_profit: Decimal,
}

/// `total += value`, failing instead of overflowing.
pub(crate) fn accumulate(total: &mut Decimal, value: Decimal) -> Result<(), SettlementError> {
    *total = total
        .checked_add(value)
        .ok_or(SettlementError::TotalsOverflow)?;
    Ok(())
}

impl InvoiceStats {
    pub fn from_invoices(invoices: &[Invoice]) -> Result<Self, SettlementError> {
        let mut stats = InvoiceStats::default();

        for invoice in invoices {
            stats.invoice_count += 1;
            accumulate(&mut stats.total_amount, invoice.amount)?;
            accumulate(&mut stats.client_commission, invoice.commission.client_amount)?;
            accumulate(
                &mut stats.distributor_commission,
                invoice.commission.distributor_amount,
            )?;
            accumulate(&mut stats.company_commission, invoice.commission.company_amount)?;
            let net_profit = invoice
                .net_profit()
                .ok_or(SettlementError::TotalsOverflow)?;
            accumulate(&mut stats.net_profit, net_profit)?;

            for step in SettlementStep::ALL {
                if invoice.payment_status.step(step).is_paid {
                    stats.paid_steps.add(step);
                }
            }
        }

        stats.completed_count = stats.paid_steps.admin_to_company;
        stats.pending_count = stats.invoice_count - stats.completed_count;
        Ok(stats)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientStatistics {
    pub client: Client,
    pub stats: InvoiceStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributorStatistics {
    pub distributor: Distributor,
    pub stats: InvoiceStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyStatistics {
    pub company: Company,
    pub file_count: usize,
    pub stats: InvoiceStats,
}

/// Per-party and dashboard statistics, limited to what the caller may see.
#[derive(Clone)]
pub struct StatisticsAggregator {
    store: Arc<dyn SettlementStore>,
    lookup_timeout: Duration,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<dyn SettlementStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
        }
    }

    async fn invoices(&self, query: InvoiceQuery) -> Result<Vec<Invoice>, SettlementError> {
        Ok(bounded(
            self.lookup_timeout,
            "find_invoices",
            self.store.find_invoices(&query),
        )
        .await?)
    }

    #[instrument(skip(self, scope), fields(actor_id = %scope.actor_id))]
    pub async fn dashboard(&self, scope: &AccessScope) -> Result<InvoiceStats, SettlementError> {
        let invoices = self.invoices(InvoiceQuery::new(scope.visibility())).await?;
        InvoiceStats::from_invoices(&invoices)
    }

    #[instrument(skip(self, scope), fields(actor_id = %scope.actor_id))]
    pub async fn for_client(
        &self,
        scope: &AccessScope,
        client_id: Uuid,
    ) -> Result<ClientStatistics, SettlementError> {
        let client = bounded(self.lookup_timeout, "get_client", self.store.client(client_id))
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("Client {}", client_id)))?;

        let invoices = self
            .invoices(InvoiceQuery::new(scope.visibility()).client(client_id))
            .await?;

        Ok(ClientStatistics {
            client,
            stats: InvoiceStats::from_invoices(&invoices)?,
        })
    }

    #[instrument(skip(self, scope), fields(actor_id = %scope.actor_id))]
    pub async fn for_distributor(
        &self,
        scope: &AccessScope,
        distributor_id: Uuid,
    ) -> Result<DistributorStatistics, SettlementError> {
        let distributor = bounded(
            self.lookup_timeout,
            "get_distributor",
            self.store.distributor(distributor_id),
        )
        .await?
        .ok_or_else(|| SettlementError::NotFound(format!("Distributor {}", distributor_id)))?;

        let invoices = self
            .invoices(InvoiceQuery::new(scope.visibility()).distributor(distributor_id))
            .await?;

        Ok(DistributorStatistics {
            distributor,
            stats: InvoiceStats::from_invoices(&invoices)?,
        })
    }

    #[instrument(skip(self, scope), fields(actor_id = %scope.actor_id))]
    pub async fn for_company(
        &self,
        scope: &AccessScope,
        company_id: Uuid,
    ) -> Result<CompanyStatistics, SettlementError> {
        let company = bounded(
            self.lookup_timeout,
            "get_company",
            self.store.company(company_id),
        )
        .await?
        .ok_or_else(|| SettlementError::NotFound(format!("Company {}", company_id)))?;

        let file_ids = bounded(
            self.lookup_timeout,
            "file_ids_for_company",
            self.store.file_ids_for_company(company_id),
        )
        .await?;
        let file_count = file_ids.len();

        let invoices = if file_ids.is_empty() {
            Vec::new()
        } else {
            self.invoices(InvoiceQuery::new(scope.visibility()).files(file_ids))
                .await?
        };

        Ok(CompanyStatistics {
            company,
            file_count,
            stats: InvoiceStats::from_invoices(&invoices)?,
        })
    }
}
