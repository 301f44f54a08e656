//! Integration tests for commission rate resolution and invoice snapshots.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{dec, Fixture, LOOKUP_TIMEOUT};
use service_core::error::AppError;
use settlement_service::commission::{
    CommissionRateService, InvoiceCommissionCalculator, RateSource, SnapshotRequest,
};
use settlement_service::error::SettlementError;
use settlement_service::models::{
    Client, CommissionEntity, CommissionTier, Company, Distributor, File, Invoice, InvoiceQuery,
};
use settlement_service::settlement::{SettlementStep, StepRecord};
use settlement_service::store::SettlementStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn request(fixture: &Fixture, amount: &str) -> SnapshotRequest {
    SnapshotRequest {
        client_id: fixture.client.client_id,
        distributor_id: fixture.distributor.distributor_id,
        file_id: fixture.file.file_id,
        amount: dec(amount),
    }
}

#[tokio::test]
async fn test_default_rates_apply_without_tiers() {
    let fixture = Fixture::seed().await;
    let calculator = InvoiceCommissionCalculator::new(fixture.store.clone(), LOOKUP_TIMEOUT);

    let preview = calculator.preview(&request(&fixture, "1000")).await.unwrap();

    assert_eq!(preview.client.source, RateSource::EntityDefault);
    assert_eq!(preview.snapshot.client_amount, dec("20.00"));
    assert_eq!(preview.snapshot.distributor_amount, dec("30.00"));
    assert_eq!(preview.snapshot.company_amount, dec("50.00"));
    assert_eq!(preview.net_profit, dec("900.00"));
}

#[tokio::test]
async fn test_matching_tier_overrides_default_rate() {
    let fixture = Fixture::seed().await;
    let client = CommissionEntity::Client(fixture.client.client_id);
    fixture.add_tier(client, "0", Some("500"), "1").await;
    let high = fixture.add_tier(client, "500", None, "1.5").await;

    let rates = CommissionRateService::new(fixture.store.clone(), LOOKUP_TIMEOUT);

    let quote = rates.rate_for(client, dec("500")).await;
    assert_eq!(quote.rate, dec("1.5"));
    assert_eq!(
        quote.source,
        RateSource::Tier {
            tier_id: high.tier_id
        }
    );

    let quote = rates.rate_for(client, dec("499.99")).await;
    assert_eq!(quote.rate, dec("1"));
}

#[tokio::test]
async fn test_amount_outside_every_tier_uses_default() {
    let fixture = Fixture::seed().await;
    let distributor = CommissionEntity::Distributor(fixture.distributor.distributor_id);
    fixture.add_tier(distributor, "1000", Some("2000"), "9").await;

    let rates = CommissionRateService::new(fixture.store.clone(), LOOKUP_TIMEOUT);
    let quote = rates.rate_for(distributor, dec("250")).await;

    assert_eq!(quote.rate, dec("3"));
    assert_eq!(quote.source, RateSource::EntityDefault);
}

#[tokio::test]
async fn test_unknown_entity_falls_back_to_zero() {
    let fixture = Fixture::seed().await;
    let rates = CommissionRateService::new(fixture.store.clone(), LOOKUP_TIMEOUT);

    let quote = rates
        .rate_for(CommissionEntity::Client(Uuid::new_v4()), dec("100"))
        .await;

    assert_eq!(quote.rate, dec("0"));
    assert_eq!(quote.source, RateSource::Fallback);
}

#[tokio::test]
async fn test_file_without_company_has_no_company_commission() {
    let fixture = Fixture::seed().await;
    let calculator = InvoiceCommissionCalculator::new(fixture.store.clone(), LOOKUP_TIMEOUT);

    let mut req = request(&fixture, "1000");
    req.file_id = fixture.orphan_file.file_id;
    let preview = calculator.preview(&req).await.unwrap();

    assert!(preview.company.is_none());
    assert_eq!(preview.snapshot.company_rate, dec("0"));
    assert_eq!(preview.snapshot.company_amount, dec("0"));
    assert_eq!(preview.net_profit, dec("950.00"));
}

#[tokio::test]
async fn test_non_positive_amount_is_rejected() {
    let fixture = Fixture::seed().await;
    let calculator = InvoiceCommissionCalculator::new(fixture.store.clone(), LOOKUP_TIMEOUT);

    for amount in ["0", "-10"] {
        let result = calculator.compute_snapshot(&request(&fixture, amount)).await;
        assert!(matches!(result, Err(SettlementError::InvalidAmount(_))));
    }
}

#[tokio::test]
async fn test_amount_too_large_for_commission_is_rejected() {
    let fixture = Fixture::seed().await;
    let calculator = InvoiceCommissionCalculator::new(fixture.store.clone(), LOOKUP_TIMEOUT);

    let result = calculator
        .compute_snapshot(&request(&fixture, "79228162514264337593543950335"))
        .await;

    assert!(matches!(result, Err(SettlementError::AmountTooLarge(_))));
}

#[tokio::test]
async fn test_commission_rounds_half_away_from_zero() {
    let fixture = Fixture::seed().await;
    let company = CommissionEntity::Company(fixture.company.company_id);
    fixture.add_tier(company, "0", None, "2.5").await;

    let calculator = InvoiceCommissionCalculator::new(fixture.store.clone(), LOOKUP_TIMEOUT);
    let snapshot = calculator
        .compute_snapshot(&request(&fixture, "10.10"))
        .await
        .unwrap();

    // 10.10 * 2.5% = 0.2525
    assert_eq!(snapshot.company_amount, dec("0.25"));
    // 10.10 * 3% = 0.303
    assert_eq!(snapshot.distributor_amount, dec("0.30"));

    let snapshot = calculator
        .compute_snapshot(&request(&fixture, "0.50"))
        .await
        .unwrap();
    // 0.50 * 2.5% = 0.0125
    assert_eq!(snapshot.company_amount, dec("0.01"));
    // 0.50 * 3% = 0.015
    assert_eq!(snapshot.distributor_amount, dec("0.02"));
}

/// Delegates to the seeded store, except that tier lookups never answer.
struct StalledTierStore {
    inner: Arc<dyn SettlementStore>,
}

#[async_trait]
impl SettlementStore for StalledTierStore {
    async fn client(&self, id: Uuid) -> Result<Option<Client>, AppError> {
        self.inner.client(id).await
    }

    async fn distributor(&self, id: Uuid) -> Result<Option<Distributor>, AppError> {
        self.inner.distributor(id).await
    }

    async fn company(&self, id: Uuid) -> Result<Option<Company>, AppError> {
        self.inner.company(id).await
    }

    async fn file(&self, id: Uuid) -> Result<Option<File>, AppError> {
        self.inner.file(id).await
    }

    async fn tiers_for(&self, _entity: CommissionEntity) -> Result<Vec<CommissionTier>, AppError> {
        std::future::pending().await
    }

    async fn file_ids_for_company(&self, id: Uuid) -> Result<Vec<Uuid>, AppError> {
        self.inner.file_ids_for_company(id).await
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        self.inner.insert_invoice(invoice).await
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError> {
        self.inner.get_invoice(id).await
    }

    async fn save_invoice_details(&self, invoice: &Invoice) -> Result<bool, AppError> {
        self.inner.save_invoice_details(invoice).await
    }

    async fn delete_invoice(&self, id: Uuid) -> Result<bool, AppError> {
        self.inner.delete_invoice(id).await
    }

    async fn find_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, AppError> {
        self.inner.find_invoices(query).await
    }

    async fn set_step_paid(
        &self,
        id: Uuid,
        step: SettlementStep,
        record: &StepRecord,
    ) -> Result<bool, AppError> {
        self.inner.set_step_paid(id, step, record).await
    }

    async fn clear_step(
        &self,
        id: Uuid,
        step: SettlementStep,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.inner.clear_step(id, step, at).await
    }

    async fn save_client(&self, client: &Client) -> Result<(), AppError> {
        self.inner.save_client(client).await
    }

    async fn save_distributor(&self, distributor: &Distributor) -> Result<(), AppError> {
        self.inner.save_distributor(distributor).await
    }

    async fn save_company(&self, company: &Company) -> Result<(), AppError> {
        self.inner.save_company(company).await
    }

    async fn save_file(&self, file: &File) -> Result<(), AppError> {
        self.inner.save_file(file).await
    }

    async fn save_tier(&self, tier: &CommissionTier) -> Result<(), AppError> {
        self.inner.save_tier(tier).await
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_lookup_falls_back_to_zero_rate() {
    let fixture = Fixture::seed().await;
    let store: Arc<dyn SettlementStore> = Arc::new(StalledTierStore {
        inner: fixture.store.clone(),
    });
    let rates = CommissionRateService::new(store, Duration::from_millis(200));

    let quote = rates
        .rate_for(CommissionEntity::Client(fixture.client.client_id), dec("100"))
        .await;

    assert_eq!(quote.rate, dec("0"));
    assert_eq!(quote.source, RateSource::Fallback);
}
