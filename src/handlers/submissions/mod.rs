//! Submission handlers

mod handler;
pub mod request;
pub mod response;

pub use handler::*;
pub use request::*;
pub use response::*;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Submission routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::list_submissions))
        .route("/{id}", get(handler::get_submission))
        .route("/{id}", post(handler::save_submission))
        .route("/{id}/test", post(handler::test_submission))
        .route("/{id}/submit", post(handler::submit_submission))
        .route("/{id}/reset", post(handler::reset_submission))
}
