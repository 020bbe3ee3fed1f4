pub mod dto;
pub mod handlers;
pub mod import;
pub mod repo_types;
pub mod services;
pub mod validators;

use crate::state::AppState;
use axum::Router;

pub fn router(import_max_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::expense_routes())
        .merge(handlers::import_routes(import_max_bytes))
}
