pub mod models;

pub use models::{BlogPost, CreateBlogPost, PostStatus, UpdateBlogPost};
