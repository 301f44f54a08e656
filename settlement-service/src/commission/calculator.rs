//! Commission snapshot for an invoice: three rates looked up concurrently.

use crate::commission::rate::{CommissionRateService, RateQuote};
use crate::error::SettlementError;
use crate::models::{CommissionEntity, CommissionSnapshot};
use crate::store::{bounded, SettlementStore};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Inputs of a commission snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SnapshotRequest {
    pub client_id: Uuid,
    pub distributor_id: Uuid,
    pub file_id: Uuid,
    pub amount: Decimal,
}

/// A read-only quote: the rates as they would be applied right now.
#[derive(Debug, Clone, Serialize)]
pub struct CommissionPreview {
    pub client: RateQuote,
    pub distributor: RateQuote,
    /// `None` when the file is missing or has no company.
    pub company: Option<RateQuote>,
    pub snapshot: CommissionSnapshot,
    pub net_profit: Decimal,
}

#[derive(Clone)]
pub struct InvoiceCommissionCalculator {
    rates: CommissionRateService,
    store: Arc<dyn SettlementStore>,
    lookup_timeout: Duration,
}

impl InvoiceCommissionCalculator {
    pub fn new(store: Arc<dyn SettlementStore>, lookup_timeout: Duration) -> Self {
        Self {
            rates: CommissionRateService::new(store.clone(), lookup_timeout),
            store,
            lookup_timeout,
        }
    }

    /// Snapshot to freeze onto a new or edited invoice.
    pub async fn compute_snapshot(
        &self,
        request: &SnapshotRequest,
    ) -> Result<CommissionSnapshot, SettlementError> {
        Ok(self.quote(request).await?.snapshot)
    }

    /// Same computation, returned with the source of each rate. Nothing is stored.
    pub async fn preview(
        &self,
        request: &SnapshotRequest,
    ) -> Result<CommissionPreview, SettlementError> {
        self.quote(request).await
    }

    #[instrument(skip(self, request), fields(amount = %request.amount, file_id = %request.file_id))]
    async fn quote(&self, request: &SnapshotRequest) -> Result<CommissionPreview, SettlementError> {
        let amount = request.amount;
        if amount <= Decimal::ZERO {
            return Err(SettlementError::InvalidAmount(amount));
        }

        let (client, distributor, company) = tokio::join!(
            self.rates
                .rate_for(CommissionEntity::Client(request.client_id), amount),
            self.rates
                .rate_for(CommissionEntity::Distributor(request.distributor_id), amount),
            self.company_quote(request.file_id, amount),
        );

        let company_rate = company.map_or(Decimal::ZERO, |q| q.rate);
        let snapshot =
            CommissionSnapshot::from_rates(amount, client.rate, distributor.rate, company_rate)
                .ok_or(SettlementError::AmountTooLarge(amount))?;
        let net_profit = snapshot
            .net_profit(amount)
            .ok_or(SettlementError::AmountTooLarge(amount))?;

        Ok(CommissionPreview {
            client,
            distributor,
            company,
            snapshot,
            net_profit,
        })
    }

    async fn company_quote(&self, file_id: Uuid, amount: Decimal) -> Option<RateQuote> {
        let company_id = match bounded(
            self.lookup_timeout,
            "file_company",
            self.store.file_company(file_id),
        )
        .await
        {
            Ok(company_id) => company_id?,
            Err(e) => {
                warn!(error = %e, file_id = %file_id, "File lookup failed, company rate is zero");
                return None;
            }
        };

        Some(
            self.rates
                .rate_for(CommissionEntity::Company(company_id), amount)
                .await,
        )
    }
}
