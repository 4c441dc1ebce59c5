use crate::state::AppState;
use axum::Router;

pub mod dto;
mod forms;
pub mod handlers;
pub mod model;
pub mod repo;
pub(crate) mod validation;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    handlers::account_routes(max_upload_bytes)
}
