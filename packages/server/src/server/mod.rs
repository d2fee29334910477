pub mod app;
pub mod guard;
pub mod routes;

pub use app::{build_app, AppState};
