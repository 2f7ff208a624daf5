//! Submission handler implementations

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    middleware::auth::AuthenticatedUser,
    services::{ActionOutcome, ActionTarget},
    state::AppState,
};

use super::{
    request::{action_input, ListSubmissionsQuery, SubmissionActionRequest},
    response::{SubmissionView, SubmissionsListResponse},
};

/// List submissions, newest first
pub async fn list_submissions(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Query(query): Query<ListSubmissionsQuery>,
) -> AppResult<Json<SubmissionsListResponse>> {
    let list = state
        .service()
        .list(
            &auth_user,
            query.assignment_id,
            query.student_id,
            query.page.unwrap_or(1),
        )
        .await?;

    Ok(Json(list))
}

/// Get a specific submission with its test runs
pub async fn get_submission(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SubmissionView>> {
    let view = state.service().show(&auth_user, id).await?;
    Ok(Json(view))
}

/// Update an incomplete submission
pub async fn save_submission(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<SubmissionActionRequest>>,
) -> AppResult<Json<ActionOutcome>> {
    let input = action_input(body)?;
    let outcome = state
        .service()
        .save(&auth_user, ActionTarget::Submission(id), input)
        .await?;
    Ok(Json(outcome))
}

/// Run the visible tests against a submission
pub async fn test_submission(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<SubmissionActionRequest>>,
) -> AppResult<Json<ActionOutcome>> {
    let input = action_input(body)?;
    let outcome = state
        .service()
        .test(&auth_user, ActionTarget::Submission(id), input)
        .await?;
    Ok(Json(outcome))
}

/// Grade a submission
pub async fn submit_submission(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<SubmissionActionRequest>>,
) -> AppResult<Json<ActionOutcome>> {
    let input = action_input(body)?;
    let outcome = state
        .service()
        .submit(&auth_user, ActionTarget::Submission(id), input)
        .await?;
    Ok(Json(outcome))
}

pub async fn reset_submission(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ActionOutcome>> {
    let outcome = state
        .service()
        .reset(&auth_user, ActionTarget::Submission(id))
        .await?;
    Ok(Json(outcome))
}
