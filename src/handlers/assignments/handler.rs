//! Assignment draft handler implementations

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    handlers::submissions::{action_input, DraftView, SubmissionActionRequest},
    middleware::auth::AuthenticatedUser,
    services::{ActionOutcome, ActionTarget},
    state::AppState,
};

/// Current draft of the caller, with the languages they may use
pub async fn get_draft(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DraftView>> {
    let view = state.service().current(&auth_user, id).await?;
    Ok(Json(view))
}

/// Store source and language without running anything
pub async fn save_draft(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<SubmissionActionRequest>>,
) -> AppResult<Json<ActionOutcome>> {
    let input = action_input(body)?;
    let outcome = state
        .service()
        .save(&auth_user, ActionTarget::Assignment(id), input)
        .await?;
    Ok(Json(outcome))
}

pub async fn test_draft(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<SubmissionActionRequest>>,
) -> AppResult<Json<ActionOutcome>> {
    let input = action_input(body)?;
    let outcome = state
        .service()
        .test(&auth_user, ActionTarget::Assignment(id), input)
        .await?;
    Ok(Json(outcome))
}

pub async fn submit_draft(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<SubmissionActionRequest>>,
) -> AppResult<Json<ActionOutcome>> {
    let input = action_input(body)?;
    let outcome = state
        .service()
        .submit(&auth_user, ActionTarget::Assignment(id), input)
        .await?;
    Ok(Json(outcome))
}

/// Discard the caller's draft
pub async fn reset_draft(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ActionOutcome>> {
    let outcome = state
        .service()
        .reset(&auth_user, ActionTarget::Assignment(id))
        .await?;
    Ok(Json(outcome))
}
