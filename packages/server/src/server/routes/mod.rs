// HTTP routes
pub mod auth;
pub mod blog_posts;
pub mod categories;
pub mod health;
pub mod stream;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::common::ApiError;

/// One page of typed rows plus the exact total.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub total: u64,
}

/// Rows come out of the provider as raw JSON; handlers give them a shape.
/// A mismatch means the backend schema drifted, which is worth a loud log.
pub(crate) fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T, ApiError> {
    serde_json::from_value(row).map_err(|e| {
        tracing::error!(error = %e, "row did not match the expected shape");
        ApiError::Backend("unexpected row shape from backend".into())
    })
}

pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, ApiError> {
    rows.into_iter().map(decode_row).collect()
}
