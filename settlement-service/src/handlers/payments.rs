use crate::middleware::Caller;
use crate::settlement::{BulkFilter, BulkOutcome, SettlementStep};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct BulkSettlementResponse {
    pub step: SettlementStep,
    #[serde(flatten)]
    pub outcome: BulkOutcome,
}

fn parse_step(raw: &str) -> Result<SettlementStep, AppError> {
    SettlementStep::from_string(raw).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Unknown payment step '{}'", raw))
    })
}

pub async fn mark_payment(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path((invoice_id, step)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let step = parse_step(&step)?;
    let invoice = state.payments.mark_paid(&scope, invoice_id, step).await?;
    Ok(Json(invoice))
}

pub async fn unmark_payment(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path((invoice_id, step)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let step = parse_step(&step)?;
    let invoice = state.payments.unmark_paid(&scope, invoice_id, step).await?;
    Ok(Json(invoice))
}

pub async fn bulk_settle(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(step): Path<String>,
    Json(filter): Json<BulkFilter>,
) -> Result<impl IntoResponse, AppError> {
    let step = parse_step(&step)?;
    let outcome = state.bulk.apply_step(&scope, step, filter).await?;
    Ok(Json(BulkSettlementResponse { step, outcome }))
}
