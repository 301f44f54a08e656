use crate::commission::SnapshotRequest;
use crate::middleware::Caller;
use crate::models::{CreateInvoice, Invoice, InvoiceStatus, UpdateInvoice};
use crate::services::invoices::ListInvoicesFilter;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ListInvoicesParams {
    pub client_id: Option<Uuid>,
    pub distributor_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<Invoice>,
    pub count: usize,
}

pub async fn preview_commission(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Json(request): Json<SnapshotRequest>,
) -> Result<impl IntoResponse, AppError> {
    let preview = state.invoices.preview(&scope, &request).await?;
    Ok(Json(preview))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Json(input): Json<CreateInvoice>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state.invoices.create(&scope, input).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Query(params): Query<ListInvoicesParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = ListInvoicesFilter {
        client_id: params.client_id,
        distributor_id: params.distributor_id,
        status: params.status,
        limit: Some(params.limit.unwrap_or(100).clamp(1, MAX_PAGE_SIZE)),
    };
    let invoices = state.invoices.list(&scope, filter).await?;
    Ok(Json(InvoiceListResponse {
        count: invoices.len(),
        invoices,
    }))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state.invoices.get(&scope, invoice_id).await?;
    Ok(Json(invoice))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(invoice_id): Path<Uuid>,
    Json(changes): Json<UpdateInvoice>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state.invoices.update(&scope, invoice_id, changes).await?;
    Ok(Json(invoice))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.invoices.delete(&scope, invoice_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_invoices(
    State(state): State<AppState>,
    Caller(scope): Caller,
) -> Result<impl IntoResponse, AppError> {
    let export = state.exporter.export(&scope).await?;
    Ok(Json(export))
}
