//! List-query types for the data provider.
//!
//! The UI sends `page`/`page_size`, repeatable `sort`+`order` pairs and
//! repeatable `filter=field:op:value` triples. Everything is validated and
//! bounded here, before any of it reaches the backend's query language.

use std::str::FromStr;

use crate::common::ApiError;

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(ApiError::Validation(format!(
                "invalid sort order: {}",
                other
            ))),
        }
    }
}

/// 1-based page window, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
}

impl Pagination {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Row offset of the first item on this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sorter {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive substring match.
    Contains,
    /// Membership in a comma-separated list.
    In,
    IsNull,
}

impl FromStr for FilterOperator {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(FilterOperator::Eq),
            "ne" => Ok(FilterOperator::Ne),
            "gt" => Ok(FilterOperator::Gt),
            "gte" => Ok(FilterOperator::Gte),
            "lt" => Ok(FilterOperator::Lt),
            "lte" => Ok(FilterOperator::Lte),
            "contains" => Ok(FilterOperator::Contains),
            "in" => Ok(FilterOperator::In),
            "is_null" => Ok(FilterOperator::IsNull),
            other => Err(ApiError::Validation(format!(
                "unknown filter operator: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: String,
}

/// Everything a `list` operation accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub pagination: Pagination,
    pub sorters: Vec<Sorter>,
    pub filters: Vec<Filter>,
}

impl ListParams {
    /// Parse from a raw query string. Unknown keys are ignored; malformed
    /// values are a validation error, never a guess.
    pub fn from_query(query: &str) -> Result<Self, ApiError> {
        let mut page: u64 = 1;
        let mut page_size: u64 = DEFAULT_PAGE_SIZE;
        let mut sort_fields: Vec<String> = Vec::new();
        let mut orders: Vec<SortOrder> = Vec::new();
        let mut filters: Vec<Filter> = Vec::new();

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "page" => {
                    page = value
                        .parse()
                        .map_err(|_| ApiError::Validation(format!("invalid page: {}", value)))?;
                }
                "page_size" => {
                    page_size = value.parse().map_err(|_| {
                        ApiError::Validation(format!("invalid page_size: {}", value))
                    })?;
                }
                "sort" => {
                    check_field(&value)?;
                    sort_fields.push(value.into_owned());
                }
                "order" => {
                    orders.push(value.parse()?);
                }
                "filter" => {
                    filters.push(parse_filter(&value)?);
                }
                _ => {}
            }
        }

        let sorters = sort_fields
            .into_iter()
            .enumerate()
            .map(|(i, field)| Sorter {
                field,
                order: orders.get(i).copied().unwrap_or(SortOrder::Asc),
            })
            .collect();

        Ok(ListParams {
            pagination: Pagination::new(page, page_size),
            sorters,
            filters,
        })
    }
}

/// `field:op:value`; the value part may itself contain colons.
fn parse_filter(raw: &str) -> Result<Filter, ApiError> {
    let mut parts = raw.splitn(3, ':');
    let field = parts
        .next()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("invalid filter: {}", raw)))?;
    check_field(field)?;
    let operator: FilterOperator = parts
        .next()
        .ok_or_else(|| ApiError::Validation(format!("invalid filter: {}", raw)))?
        .parse()?;
    let value = parts.next().unwrap_or_default().to_string();

    if value.is_empty() && operator != FilterOperator::IsNull {
        return Err(ApiError::Validation(format!(
            "filter on {} is missing a value",
            field
        )));
    }

    Ok(Filter {
        field: field.to_string(),
        operator,
        value,
    })
}

/// Field names travel into the backend's query parameters; keep them to
/// plain identifiers.
fn check_field(field: &str) -> Result<(), ApiError> {
    let ok = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "invalid field name: {}",
            field
        )))
    }
}
