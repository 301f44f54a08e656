//! MongoDB-backed store.
//!
//! Documents are written through `bson::to_document`, so ids, decimals and
//! timestamps are stored as strings and filtered with `to_string()`.

use super::SettlementStore;
use crate::models::{
    Client, CommissionEntity, CommissionTier, Company, Distributor, File, Invoice, InvoiceQuery,
    Visibility,
};
use crate::services::metrics::STORE_QUERY_DURATION;
use crate::settlement::{SettlementStep, StepRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::{IndexOptions, ReplaceOptions};
use mongodb::{Client as MongoClient, Collection, Database, IndexModel};
use serde::{de::DeserializeOwned, Serialize};
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

fn to_doc<T: Serialize>(value: &T) -> Result<Document, AppError> {
    bson::to_document(value)
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to encode document: {}", e)))
}

fn from_doc<T: DeserializeOwned>(document: Document) -> Result<T, AppError> {
    bson::from_document(document)
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to decode document: {}", e)))
}

fn paid_path(step: SettlementStep) -> String {
    format!("{}.is_paid", step.field_path())
}

/// Translate an invoice query into a MongoDB filter. `None` means nothing can match.
fn invoice_filter(query: &InvoiceQuery) -> Option<Document> {
    let mut clauses: Vec<Document> = Vec::new();

    match query.visibility {
        Visibility::All => {}
        Visibility::AssignedTo(actor) => {
            clauses.push(doc! { "assigned_distributor_id": actor.to_string() })
        }
        Visibility::Nothing => return None,
    }
    if let Some(client_id) = query.client_id {
        clauses.push(doc! { "client_id": client_id.to_string() });
    }
    if let Some(distributor_id) = query.distributor_id {
        clauses.push(doc! { "assigned_distributor_id": distributor_id.to_string() });
    }
    if let Some(file_ids) = &query.file_ids {
        let ids: Vec<String> = file_ids.iter().map(Uuid::to_string).collect();
        clauses.push(doc! { "file_id": { "$in": ids } });
    }
    if let Some(step) = query.eligible_for {
        clauses.push(doc! { paid_path(step): false });
        if let Some(previous) = step.previous() {
            clauses.push(doc! { paid_path(previous): true });
        }
    }
    if let Some(status) = query.status {
        clauses.push(doc! { "status": status.as_str() });
    }

    Some(if clauses.is_empty() {
        doc! {}
    } else {
        doc! { "$and": clauses }
    })
}

impl MongoStore {
    #[instrument(skip(uri), fields(service = "settlement-service"))]
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to MongoDB");
            AppError::from(e)
        })?;
        let db = client.database(database);
        info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    fn invoices(&self) -> Collection<Document> {
        self.db.collection("invoices")
    }

    fn tiers(&self) -> Collection<Document> {
        self.db.collection("commission_tiers")
    }

    fn clients(&self) -> Collection<Document> {
        self.db.collection("clients")
    }

    fn distributors(&self) -> Collection<Document> {
        self.db.collection("distributors")
    }

    fn companies(&self) -> Collection<Document> {
        self.db.collection("companies")
    }

    fn files(&self) -> Collection<Document> {
        self.db.collection("files")
    }

    /// Initialize indexes used by settlement lookups.
    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let unique = |name: &str| {
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .build()
        };
        let named = |name: &str| IndexOptions::builder().name(name.to_string()).build();

        self.invoices()
            .create_indexes(
                [
                    IndexModel::builder()
                        .keys(doc! { "invoice_id": 1 })
                        .options(unique("invoice_id_idx"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "assigned_distributor_id": 1, "created_utc": -1 })
                        .options(named("invoice_distributor_idx"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "client_id": 1 })
                        .options(named("invoice_client_idx"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "file_id": 1 })
                        .options(named("invoice_file_idx"))
                        .build(),
                ],
                None,
            )
            .await?;

        self.tiers()
            .create_indexes(
                [IndexModel::builder()
                    .keys(doc! { "entity.kind": 1, "entity.id": 1, "min_amount": 1 })
                    .options(named("tier_entity_idx"))
                    .build()],
                None,
            )
            .await?;

        for (collection, key) in [
            (self.clients(), "client_id"),
            (self.distributors(), "distributor_id"),
            (self.companies(), "company_id"),
            (self.files(), "file_id"),
        ] {
            collection
                .create_indexes(
                    [IndexModel::builder()
                        .keys(doc! { key: 1 })
                        .options(unique(&format!("{}_idx", key)))
                        .build()],
                    None,
                )
                .await?;
        }

        self.files()
            .create_indexes(
                [IndexModel::builder()
                    .keys(doc! { "company_id": 1 })
                    .options(named("file_company_idx"))
                    .build()],
                None,
            )
            .await?;

        info!("Settlement service indexes initialized");
        Ok(())
    }

    async fn find_by<T: DeserializeOwned>(
        &self,
        collection: Collection<Document>,
        operation: &'static str,
        filter: Document,
    ) -> Result<Option<T>, AppError> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();
        let found = collection.find_one(filter, None).await?;
        timer.observe_duration();
        found.map(from_doc).transpose()
    }

    async fn upsert_by<T: Serialize>(
        &self,
        collection: Collection<Document>,
        operation: &'static str,
        key: &str,
        id: Uuid,
        value: &T,
    ) -> Result<(), AppError> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();
        let options = ReplaceOptions::builder().upsert(true).build();
        collection
            .replace_one(doc! { key: id.to_string() }, to_doc(value)?, options)
            .await?;
        timer.observe_duration();
        Ok(())
    }
}

#[async_trait]
impl SettlementStore for MongoStore {
    #[instrument(skip(self))]
    async fn client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        self.find_by(
            self.clients(),
            "get_client",
            doc! { "client_id": client_id.to_string() },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn distributor(&self, distributor_id: Uuid) -> Result<Option<Distributor>, AppError> {
        self.find_by(
            self.distributors(),
            "get_distributor",
            doc! { "distributor_id": distributor_id.to_string() },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn company(&self, company_id: Uuid) -> Result<Option<Company>, AppError> {
        self.find_by(
            self.companies(),
            "get_company",
            doc! { "company_id": company_id.to_string() },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn file(&self, file_id: Uuid) -> Result<Option<File>, AppError> {
        self.find_by(self.files(), "get_file", doc! { "file_id": file_id.to_string() })
            .await
    }

    #[instrument(skip(self, entity), fields(entity = %entity))]
    async fn tiers_for(&self, entity: CommissionEntity) -> Result<Vec<CommissionTier>, AppError> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["tiers_for"])
            .start_timer();

        let filter = doc! {
            "entity.kind": entity.kind().as_str(),
            "entity.id": entity.id().to_string(),
        };
        let documents: Vec<Document> = self.tiers().find(filter, None).await?.try_collect().await?;
        timer.observe_duration();

        documents.into_iter().map(from_doc).collect()
    }

    #[instrument(skip(self))]
    async fn file_ids_for_company(&self, company_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["file_ids_for_company"])
            .start_timer();

        let documents: Vec<Document> = self
            .files()
            .find(doc! { "company_id": company_id.to_string() }, None)
            .await?
            .try_collect()
            .await?;
        timer.observe_duration();

        documents
            .into_iter()
            .map(|d| from_doc::<File>(d).map(|f| f.file_id))
            .collect()
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();
        self.invoices().insert_one(to_doc(invoice)?, None).await?;
        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        self.find_by(
            self.invoices(),
            "get_invoice",
            doc! { "invoice_id": invoice_id.to_string() },
        )
        .await
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn save_invoice_details(&self, invoice: &Invoice) -> Result<bool, AppError> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["save_invoice_details"])
            .start_timer();

        let mut fields = to_doc(invoice)?;
        fields.remove("payment_status");
        fields.remove("invoice_id");

        let result = self
            .invoices()
            .update_one(
                doc! { "invoice_id": invoice.invoice_id.to_string() },
                doc! { "$set": fields },
                None,
            )
            .await?;
        timer.observe_duration();

        Ok(result.matched_count == 1)
    }

    #[instrument(skip(self))]
    async fn delete_invoice(&self, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();
        let result = self
            .invoices()
            .delete_one(doc! { "invoice_id": invoice_id.to_string() }, None)
            .await?;
        timer.observe_duration();
        Ok(result.deleted_count == 1)
    }

    #[instrument(skip(self, query))]
    async fn find_invoices(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, AppError> {
        let Some(filter) = invoice_filter(query) else {
            return Ok(Vec::new());
        };

        let timer = STORE_QUERY_DURATION
            .with_label_values(&["find_invoices"])
            .start_timer();
        let documents: Vec<Document> = self.invoices().find(filter, None).await?.try_collect().await?;
        timer.observe_duration();

        let mut invoices = documents
            .into_iter()
            .map(from_doc)
            .collect::<Result<Vec<Invoice>, AppError>>()?;
        invoices.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        if let Some(limit) = query.limit {
            invoices.truncate(limit);
        }
        Ok(invoices)
    }

    #[instrument(
        skip(self, invoice_id, step, record),
        fields(invoice_id = %invoice_id, step = %step)
    )]
    async fn set_step_paid(
        &self,
        invoice_id: Uuid,
        step: SettlementStep,
        record: &StepRecord,
    ) -> Result<bool, AppError> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["set_step_paid"])
            .start_timer();

        let mut filter = doc! {
            "invoice_id": invoice_id.to_string(),
            paid_path(step): false,
        };
        if let Some(previous) = step.previous() {
            filter.insert(paid_path(previous), true);
        }
        let update = doc! {
            "$set": {
                step.field_path(): to_doc(record)?,
                "updated_utc": to_bson_string(record.marked_at.unwrap_or_else(Utc::now)),
            }
        };

        let result = self.invoices().update_one(filter, update, None).await?;
        timer.observe_duration();

        Ok(result.modified_count == 1)
    }

    #[instrument(
        skip(self, invoice_id, step),
        fields(invoice_id = %invoice_id, step = %step)
    )]
    async fn clear_step(
        &self,
        invoice_id: Uuid,
        step: SettlementStep,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let timer = STORE_QUERY_DURATION
            .with_label_values(&["clear_step"])
            .start_timer();

        let mut filter = doc! {
            "invoice_id": invoice_id.to_string(),
            paid_path(step): true,
        };
        if let Some(next) = step.next() {
            filter.insert(paid_path(next), false);
        }
        let update = doc! {
            "$set": {
                step.field_path(): to_doc(&StepRecord::default())?,
                "updated_utc": to_bson_string(at),
            }
        };

        let result = self.invoices().update_one(filter, update, None).await?;
        timer.observe_duration();

        Ok(result.modified_count == 1)
    }

    async fn save_client(&self, client: &Client) -> Result<(), AppError> {
        self.upsert_by(self.clients(), "save_client", "client_id", client.client_id, client)
            .await
    }

    async fn save_distributor(&self, distributor: &Distributor) -> Result<(), AppError> {
        self.upsert_by(
            self.distributors(),
            "save_distributor",
            "distributor_id",
            distributor.distributor_id,
            distributor,
        )
        .await
    }

    async fn save_company(&self, company: &Company) -> Result<(), AppError> {
        self.upsert_by(
            self.companies(),
            "save_company",
            "company_id",
            company.company_id,
            company,
        )
        .await
    }

    async fn save_file(&self, file: &File) -> Result<(), AppError> {
        self.upsert_by(self.files(), "save_file", "file_id", file.file_id, file)
            .await
    }

    async fn save_tier(&self, tier: &CommissionTier) -> Result<(), AppError> {
        self.upsert_by(self.tiers(), "save_tier", "tier_id", tier.tier_id, tier)
            .await
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "MongoDB health check failed");
                AppError::from(e)
            })?;
        Ok(())
    }
}

/// Timestamps are stored in the same string form serde gives them.
fn to_bson_string(at: DateTime<Utc>) -> Bson {
    Bson::String(at.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
}
