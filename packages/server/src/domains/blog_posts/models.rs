use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::ApiError;

/// Publication state of a post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Published,
    Rejected,
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostStatus::Draft => write!(f, "draft"),
            PostStatus::Published => write!(f, "published"),
            PostStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for PostStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            "rejected" => Ok(PostStatus::Rejected),
            _ => Err(ApiError::Validation(format!("invalid post status: {}", s))),
        }
    }
}

/// A blog post row as the backend stores it. The backend owns the record;
/// this type is only the shape it travels in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating a new post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlogPost {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    pub status: PostStatus,
}

impl CreateBlogPost {
    /// Shape checks done locally; everything else is the backend's call.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.title.trim().is_empty() {
            return Err(ApiError::Validation("title must not be empty".into()));
        }
        Ok(())
    }
}

/// Input for updating a post; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBlogPost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
}

impl UpdateBlogPost {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.title.is_none()
            && self.content.is_none()
            && self.category_id.is_none()
            && self.status.is_none()
        {
            return Err(ApiError::Validation("update has no fields".into()));
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(ApiError::Validation("title must not be empty".into()));
            }
        }
        Ok(())
    }
}
