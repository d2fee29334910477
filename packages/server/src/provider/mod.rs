//! Generic CRUD data provider over the hosted backend.
//!
//! Callers name a resource and an operation; this module translates the
//! parameters into the backend's query language and normalizes the result.
//! Rows travel as raw JSON because the backend's schema owns them.

pub mod hub;
pub mod live;

pub use hub::StreamHub;
pub use live::{LiveProvider, LiveSubscription};

use serde_json::Value;
use supabase::{Order, QueryBuilder, SupabaseClient};

use crate::common::{ApiError, Filter, FilterOperator, ListParams, SortOrder};

/// Result of a `list` operation: one page of rows plus the exact total.
#[derive(Debug)]
pub struct ListResult {
    pub data: Vec<Value>,
    pub total: u64,
}

#[derive(Clone)]
pub struct DataProvider {
    client: SupabaseClient,
}

impl DataProvider {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    fn query(&self, resource: &str) -> Result<QueryBuilder, ApiError> {
        Ok(self.client.from(resource)?)
    }

    /// List rows with filtering, sorting and pagination.
    pub async fn get_list(
        &self,
        resource: &str,
        params: &ListParams,
    ) -> Result<ListResult, ApiError> {
        let mut query = self.query(resource)?.select("*").count_exact();

        for filter in &params.filters {
            query = apply_filter(query, filter);
        }
        for sorter in &params.sorters {
            let order = match sorter.order {
                SortOrder::Asc => Order::Asc,
                SortOrder::Desc => Order::Desc,
            };
            query = query.order(&sorter.field, order);
        }

        let page = params.pagination;
        let response = query
            .offset(page.offset())
            .limit(page.page_size)
            .fetch()
            .await?;

        let total = match response.total {
            Some(total) => total,
            None => {
                // The backend is expected to count; fall back to what we see.
                tracing::warn!(resource, "backend did not report an exact count");
                response.rows.len() as u64
            }
        };

        Ok(ListResult {
            data: response.rows,
            total,
        })
    }

    /// Fetch a single row by id.
    pub async fn get_one(&self, resource: &str, id: &str) -> Result<Value, ApiError> {
        self.query(resource)?
            .select("*")
            .eq("id", id)
            .fetch_one()
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("{} {} not found", resource, id)))
    }

    /// Insert a row; the stored representation comes back with
    /// server-generated fields.
    pub async fn create(&self, resource: &str, payload: &Value) -> Result<Value, ApiError> {
        Ok(self.query(resource)?.insert(payload).await?)
    }

    /// Patch a row by id.
    pub async fn update(
        &self,
        resource: &str,
        id: &str,
        payload: &Value,
    ) -> Result<Value, ApiError> {
        self.query(resource)?
            .eq("id", id)
            .update(payload)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("{} {} not found", resource, id)))
    }

    /// Delete a row by id. Returns the deleted row's id so callers can
    /// invalidate caches.
    pub async fn delete(&self, resource: &str, id: &str) -> Result<String, ApiError> {
        let deleted = self
            .query(resource)?
            .eq("id", id)
            .delete()
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("{} {} not found", resource, id)))?;

        Ok(deleted
            .get("id")
            .and_then(row_id)
            .unwrap_or_else(|| id.to_string()))
    }
}

fn row_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn apply_filter(query: QueryBuilder, filter: &Filter) -> QueryBuilder {
    let field = filter.field.as_str();
    let value = filter.value.as_str();
    match filter.operator {
        FilterOperator::Eq => query.eq(field, value),
        FilterOperator::Ne => query.neq(field, value),
        FilterOperator::Gt => query.gt(field, value),
        FilterOperator::Gte => query.gte(field, value),
        FilterOperator::Lt => query.lt(field, value),
        FilterOperator::Lte => query.lte(field, value),
        FilterOperator::Contains => query.ilike(field, &format!("*{}*", value)),
        FilterOperator::In => {
            let values: Vec<String> = value
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            query.in_list(field, &values)
        }
        FilterOperator::IsNull => query.is_null(field),
    }
}
