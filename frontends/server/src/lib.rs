//! HTTP frontend for morph
//!
//! Serves schema administration under `/api/schemas` and the generated CRUD
//! surface of every entity type under `/api/entities/{entity}`.

pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

pub use app::{create_app, run_server};
pub use config::ServerConfig;
pub use state::AppState;
