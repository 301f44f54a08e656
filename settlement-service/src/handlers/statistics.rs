use crate::middleware::Caller;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

pub async fn dashboard(
    State(state): State<AppState>,
    Caller(scope): Caller,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.statistics.dashboard(&scope).await?))
}

pub async fn client_statistics(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(client_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.statistics.for_client(&scope, client_id).await?))
}

pub async fn distributor_statistics(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(distributor_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state
            .statistics
            .for_distributor(&scope, distributor_id)
            .await?,
    ))
}

pub async fn company_statistics(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(company_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.statistics.for_company(&scope, company_id).await?))
}
