use crate::state::AppState;
use axum::Router;

mod dto;
pub(crate) mod extractors;
pub mod handlers;
mod password;
pub mod repo;
mod repo_types;
pub mod services;
mod tokens;

pub use services::AccountService;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
