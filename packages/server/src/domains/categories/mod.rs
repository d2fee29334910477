pub mod models;

pub use models::{Category, CreateCategory, UpdateCategory};
