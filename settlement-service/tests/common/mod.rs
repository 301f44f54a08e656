//! Common test utilities for settlement-service integration tests.

#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use settlement_service::config::SettlementConfig;
use settlement_service::models::{
    AccessScope, Client, CommissionEntity, CommissionTier, Company, CreateInvoice, Distributor,
    File, Invoice, Role,
};
use settlement_service::services::InvoiceService;
use settlement_service::startup::Application;
use settlement_service::store::{MemoryStore, SettlementStore};
use std::sync::{Arc, Once};
use std::time::Duration;
use uuid::Uuid;

static INIT: Once = Once::new();

pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,settlement_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// One client, two distributors, a company with one file and an orphan file.
pub struct Fixture {
    pub store: Arc<dyn SettlementStore>,
    pub admin: AccessScope,
    pub client: Client,
    pub distributor: Distributor,
    pub other_distributor: Distributor,
    pub company: Company,
    pub file: File,
    pub orphan_file: File,
}

impl Fixture {
    /// Default rates: client 2%, distributors 3%, company 5%. No tiers.
    pub async fn seed() -> Self {
        init_tracing();

        let store: Arc<dyn SettlementStore> = Arc::new(MemoryStore::new());

        let client = Client {
            client_id: Uuid::new_v4(),
            full_name: "Acme Trading".to_string(),
            mobile_number: Some("+15550100".to_string()),
            commission_rate: dec("2"),
        };
        let distributor = Distributor {
            distributor_id: Uuid::new_v4(),
            username: "north-dist".to_string(),
            commission_rate: dec("3"),
        };
        let other_distributor = Distributor {
            distributor_id: Uuid::new_v4(),
            username: "south-dist".to_string(),
            commission_rate: dec("3"),
        };
        let company = Company {
            company_id: Uuid::new_v4(),
            name: "Globex".to_string(),
            commission_rate: dec("5"),
        };
        let file = File {
            file_id: Uuid::new_v4(),
            file_name: "march-batch.xlsx".to_string(),
            company_id: Some(company.company_id),
        };
        let orphan_file = File {
            file_id: Uuid::new_v4(),
            file_name: "unlinked.xlsx".to_string(),
            company_id: None,
        };

        store.save_client(&client).await.unwrap();
        store.save_distributor(&distributor).await.unwrap();
        store.save_distributor(&other_distributor).await.unwrap();
        store.save_company(&company).await.unwrap();
        store.save_file(&file).await.unwrap();
        store.save_file(&orphan_file).await.unwrap();

        Self {
            store,
            admin: AccessScope::admin(Uuid::new_v4()),
            client,
            distributor,
            other_distributor,
            company,
            file,
            orphan_file,
        }
    }

    pub async fn add_tier(
        &self,
        entity: CommissionEntity,
        min: &str,
        max: Option<&str>,
        rate: &str,
    ) -> CommissionTier {
        let tier = CommissionTier::new(entity, dec(min), max.map(dec), dec(rate));
        self.store.save_tier(&tier).await.unwrap();
        tier
    }

    pub fn distributor_scope(&self) -> AccessScope {
        AccessScope::distributor(self.distributor.distributor_id)
    }

    pub fn other_distributor_scope(&self) -> AccessScope {
        AccessScope::distributor(self.other_distributor.distributor_id)
    }

    /// Staff member who can read every invoice but is not an admin.
    pub fn supervisor_scope(&self) -> AccessScope {
        AccessScope::new(Uuid::new_v4(), Role::Staff, true, true)
    }

    pub fn invoices(&self) -> InvoiceService {
        InvoiceService::new(self.store.clone(), LOOKUP_TIMEOUT)
    }

    pub fn new_invoice(&self, code: &str, amount: &str) -> CreateInvoice {
        CreateInvoice {
            invoice_code: code.to_string(),
            amount: dec(amount),
            invoice_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            status: None,
            client_id: self.client.client_id,
            file_id: self.file.file_id,
            assigned_distributor_id: self.distributor.distributor_id,
        }
    }

    /// Create an invoice as admin, assigned to the fixture distributor.
    pub async fn create_invoice(&self, code: &str, amount: &str) -> Invoice {
        self.invoices()
            .create(&self.admin, self.new_invoice(code, amount))
            .await
            .expect("Failed to create invoice")
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub fixture: Fixture,
    pub http: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Request builder carrying the identity headers of `scope`.
    pub fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        scope: &AccessScope,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("X-User-ID", scope.actor_id.to_string())
            .header("X-User-Role", scope.role.as_str())
            .header("X-Can-View-All", scope.can_view_all.to_string())
            .header("X-Can-View-Own", scope.can_view_own.to_string())
    }
}

/// Spawn the HTTP application on a random port around a seeded in-memory store.
pub async fn spawn_app() -> TestApp {
    let fixture = Fixture::seed().await;

    let app = Application::build_with_store(SettlementConfig::in_memory(0), fixture.store.clone())
        .await
        .expect("Failed to build application");
    let port = app.port();

    // Start the application in the background
    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        port,
        fixture,
        http: reqwest::Client::new(),
    }
}
