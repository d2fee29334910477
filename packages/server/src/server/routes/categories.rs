//! Category resource: thin consumers of the data provider.

use axum::extract::{Extension, Path, RawQuery};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use super::{decode_row, decode_rows, ListResponse};
use crate::common::{ApiError, ListParams};
use crate::domains::categories::{Category, CreateCategory, UpdateCategory};
use crate::server::app::AppState;

const RESOURCE: &str = "categories";

pub async fn list(
    Extension(state): Extension<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<ListResponse<Category>>, ApiError> {
    let params = ListParams::from_query(query.as_deref().unwrap_or(""))?;
    let result = state.provider.get_list(RESOURCE, &params).await?;
    Ok(Json(ListResponse {
        data: decode_rows(result.data)?,
        total: result.total,
    }))
}

pub async fn create(
    Extension(state): Extension<AppState>,
    Json(input): Json<CreateCategory>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    input.validate()?;
    let payload = serde_json::to_value(&input)
        .map_err(|e| ApiError::Validation(format!("malformed payload: {}", e)))?;
    let row = state.provider.create(RESOURCE, &payload).await?;
    Ok((StatusCode::CREATED, Json(decode_row(row)?)))
}

pub async fn show(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Category>, ApiError> {
    let row = state.provider.get_one(RESOURCE, &id.to_string()).await?;
    Ok(Json(decode_row(row)?))
}

pub async fn update(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateCategory>,
) -> Result<Json<Category>, ApiError> {
    input.validate()?;
    let payload = serde_json::to_value(&input)
        .map_err(|e| ApiError::Validation(format!("malformed payload: {}", e)))?;
    let row = state
        .provider
        .update(RESOURCE, &id.to_string(), &payload)
        .await?;
    Ok(Json(decode_row(row)?))
}

pub async fn destroy(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted_id = state.provider.delete(RESOURCE, &id.to_string()).await?;
    Ok(Json(json!({ "id": deleted_id })))
}
