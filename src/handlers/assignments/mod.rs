//! Per-assignment draft handlers
//!
//! Each student has at most one open draft per assignment; these routes
//! act on it without knowing its id.

mod handler;

pub use handler::*;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Assignment routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{id}/submission", get(handler::get_draft))
        .route("/{id}/submission", post(handler::save_draft))
        .route("/{id}/submission/test", post(handler::test_draft))
        .route("/{id}/submission/submit", post(handler::submit_draft))
        .route("/{id}/submission/reset", post(handler::reset_draft))
}
