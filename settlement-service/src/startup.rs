//! Application startup and lifecycle management.

use crate::config::{SettlementConfig, StoreBackend};
use crate::handlers::{health, invoices, payments, statistics};
use crate::reporting::{InvoiceExporter, StatisticsAggregator};
use crate::services::metrics::track_http;
use crate::services::{init_metrics, InvoiceService};
use crate::settlement::{BulkSettlementProcessor, PaymentStepStateMachine};
use crate::store::{MemoryStore, MongoStore, SettlementStore};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: SettlementConfig,
    pub store: Arc<dyn SettlementStore>,
    pub invoices: InvoiceService,
    pub payments: PaymentStepStateMachine,
    pub bulk: BulkSettlementProcessor,
    pub statistics: StatisticsAggregator,
    pub exporter: InvoiceExporter,
}

impl AppState {
    pub fn new(config: SettlementConfig, store: Arc<dyn SettlementStore>) -> Self {
        let timeout = config.lookup_timeout;
        Self {
            invoices: InvoiceService::new(store.clone(), timeout),
            payments: PaymentStepStateMachine::new(store.clone(), timeout),
            bulk: BulkSettlementProcessor::new(store.clone(), timeout, config.bulk_concurrency),
            statistics: StatisticsAggregator::new(store.clone(), timeout),
            exporter: InvoiceExporter::new(store.clone(), timeout),
            store,
            config,
        }
    }
}

/// HTTP routes with tracing, metrics and request-id layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route(
            "/invoices",
            post(invoices::create_invoice).get(invoices::list_invoices),
        )
        .route(
            "/invoices/commission-preview",
            post(invoices::preview_commission),
        )
        .route("/invoices/export", get(invoices::export_invoices))
        .route(
            "/invoices/:id",
            get(invoices::get_invoice)
                .put(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route(
            "/invoices/:id/payment/:step",
            post(payments::mark_payment).delete(payments::unmark_payment),
        )
        .route("/bulk-settlements/:step", post(payments::bulk_settle))
        .route("/statistics", get(statistics::dashboard))
        .route(
            "/statistics/clients/:id",
            get(statistics::client_statistics),
        )
        .route(
            "/statistics/distributors/:id",
            get(statistics::distributor_statistics),
        )
        .route(
            "/statistics/companies/:id",
            get(statistics::company_statistics),
        )
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(track_http))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the store selected by configuration.
    pub async fn build(config: SettlementConfig) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn SettlementStore> = match config.store_backend {
            StoreBackend::Mongo => {
                let store = MongoStore::connect(config.database.uri(), &config.database.database)
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to connect to MongoDB");
                        e
                    })?;
                store.init_indexes().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to create indexes");
                    e
                })?;
                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store - data will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        Self::build_with_store(config, store).await
    }

    /// Build the application around an existing store.
    /// Use this in tests to seed data before serving requests.
    pub async fn build_with_store(
        config: SettlementConfig,
        store: Arc<dyn SettlementStore>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let addr = config.common.bind_address();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, store = config.store_backend.as_str(), "Settlement service listener bound");

        Ok(Self {
            port,
            listener,
            state: AppState::new(config, store),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = %self.state.config.service_name,
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router(self.state)).await
    }
}
