//! Client for the backend's row API.
//!
//! Builds filter/order/limit query parameters the way the service expects
//! them (`field=eq.value`, `order=field.desc`, `limit`/`offset`) and parses
//! exact row counts out of the `Content-Range` response header.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use url::Url;

use crate::error::SupabaseError;
use crate::models::RestErrorBody;

const SERVICE: &str = "postgrest";

/// Sort direction for `order=` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn suffix(self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

/// Entry point for the row API. Cheap to clone; holds the shared HTTP client.
#[derive(Clone)]
pub struct Postgrest {
    base: Url,
    anon_key: String,
    http: reqwest::Client,
}

impl Postgrest {
    pub(crate) fn new(base: Url, anon_key: String, http: reqwest::Client) -> Self {
        Self {
            base,
            anon_key,
            http,
        }
    }

    /// Start a query against a table.
    pub fn from(&self, table: &str) -> Result<QueryBuilder, SupabaseError> {
        let url = self.base.join(table)?;
        Ok(QueryBuilder {
            http: self.http.clone(),
            url,
            anon_key: self.anon_key.clone(),
            access_token: None,
            select: None,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            count_exact: false,
        })
    }
}

/// Rows plus the exact total reported by the backend (when requested).
#[derive(Debug)]
pub struct RowsResponse {
    pub rows: Vec<Value>,
    pub total: Option<u64>,
}

/// One query against one table. Consumed by the terminal methods.
pub struct QueryBuilder {
    http: reqwest::Client,
    url: Url,
    anon_key: String,
    access_token: Option<String>,
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Vec<(String, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
    count_exact: bool,
}

impl QueryBuilder {
    /// Run the query under a user's access token instead of the public key.
    pub fn auth(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    pub fn eq(self, field: &str, value: &str) -> Self {
        self.filter(field, "eq", value)
    }

    pub fn neq(self, field: &str, value: &str) -> Self {
        self.filter(field, "neq", value)
    }

    pub fn gt(self, field: &str, value: &str) -> Self {
        self.filter(field, "gt", value)
    }

    pub fn gte(self, field: &str, value: &str) -> Self {
        self.filter(field, "gte", value)
    }

    pub fn lt(self, field: &str, value: &str) -> Self {
        self.filter(field, "lt", value)
    }

    pub fn lte(self, field: &str, value: &str) -> Self {
        self.filter(field, "lte", value)
    }

    /// Case-insensitive pattern match. `*` is the wildcard.
    pub fn ilike(self, field: &str, pattern: &str) -> Self {
        self.filter(field, "ilike", pattern)
    }

    pub fn in_list(mut self, field: &str, values: &[String]) -> Self {
        let quoted: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
        self.filters
            .push((field.to_string(), format!("in.({})", quoted.join(","))));
        self
    }

    pub fn is_null(mut self, field: &str) -> Self {
        self.filters.push((field.to_string(), "is.null".to_string()));
        self
    }

    fn filter(mut self, field: &str, op: &str, value: &str) -> Self {
        self.filters
            .push((field.to_string(), format!("{}.{}", op, value)));
        self
    }

    pub fn order(mut self, field: &str, order: Order) -> Self {
        self.order.push((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Ask the backend to report the exact total row count for the query.
    pub fn count_exact(mut self) -> Self {
        self.count_exact = true;
        self
    }

    fn build_url(&self) -> Url {
        let mut url = self.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(select) = &self.select {
                pairs.append_pair("select", select);
            }
            for (field, predicate) in &self.filters {
                pairs.append_pair(field, predicate);
            }
            if !self.order.is_empty() {
                let order = self
                    .order
                    .iter()
                    .map(|(field, dir)| format!("{}.{}", field, dir.suffix()))
                    .collect::<Vec<_>>()
                    .join(",");
                pairs.append_pair("order", &order);
            }
            if let Some(limit) = self.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(offset) = self.offset {
                pairs.append_pair("offset", &offset.to_string());
            }
        }
        url
    }

    fn headers(&self, prefer: Option<&str>) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();
        let apikey = HeaderValue::from_str(&self.anon_key)
            .map_err(|_| SupabaseError::Decode("API key is not a valid header value".into()))?;
        headers.insert("apikey", apikey);
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        let auth = HeaderValue::from_str(&format!("Bearer {}", bearer))
            .map_err(|_| SupabaseError::Decode("access token is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, auth);
        if let Some(prefer) = prefer {
            headers.insert(
                "Prefer",
                HeaderValue::from_str(prefer)
                    .map_err(|_| SupabaseError::Decode("invalid Prefer header".into()))?,
            );
        }
        Ok(headers)
    }

    /// Fetch matching rows.
    pub async fn fetch(self) -> Result<RowsResponse, SupabaseError> {
        let prefer = self.count_exact.then_some("count=exact");
        let headers = self.headers(prefer)?;
        let response = self
            .http
            .get(self.build_url())
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rest_error(status.as_u16(), response).await);
        }

        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        let rows: Vec<Value> = response.json().await?;
        Ok(RowsResponse { rows, total })
    }

    /// Fetch at most one matching row.
    pub async fn fetch_one(self) -> Result<Option<Value>, SupabaseError> {
        let response = self.limit(1).fetch().await?;
        Ok(response.rows.into_iter().next())
    }

    /// Insert a row and return the stored representation (server-generated
    /// fields included).
    pub async fn insert(self, payload: &Value) -> Result<Value, SupabaseError> {
        let headers = self.headers(Some("return=representation"))?;
        let response = self
            .http
            .post(self.build_url())
            .headers(headers)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rest_error(status.as_u16(), response).await);
        }

        first_row(response.json().await?)
            .ok_or_else(|| SupabaseError::Decode("insert returned no representation".into()))
    }

    /// Patch the rows selected by the builder's filters. `None` when nothing
    /// matched.
    pub async fn update(self, payload: &Value) -> Result<Option<Value>, SupabaseError> {
        let headers = self.headers(Some("return=representation"))?;
        let response = self
            .http
            .patch(self.build_url())
            .headers(headers)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rest_error(status.as_u16(), response).await);
        }

        Ok(first_row(response.json().await?))
    }

    /// Delete the rows selected by the builder's filters. `None` when nothing
    /// matched.
    pub async fn delete(self) -> Result<Option<Value>, SupabaseError> {
        let headers = self.headers(Some("return=representation"))?;
        let response = self
            .http
            .delete(self.build_url())
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rest_error(status.as_u16(), response).await);
        }

        Ok(first_row(response.json().await?))
    }
}

/// Representation responses come back as an array, even for single rows.
fn first_row(body: Value) -> Option<Value> {
    match body {
        Value::Array(rows) => rows.into_iter().next(),
        Value::Null => None,
        other => Some(other),
    }
}

/// `Content-Range: 0-9/42` — the part after the slash is the exact total.
/// A `*` total means the backend did not count.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.parse().ok()
}

async fn rest_error(status: u16, response: reqwest::Response) -> SupabaseError {
    let message = match response.json::<RestErrorBody>().await {
        Ok(body) => body.into_message(),
        Err(_) => "unreadable error body".to_string(),
    };
    SupabaseError::Api {
        service: SERVICE,
        status,
        message,
    }
}
