use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use handoff_core::error::ApiError;
use handoff_core::user_input::{AnswerUserInputRequest, UserInputRequest};

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/user-input-requests",
            get(list_pending_user_input_requests),
        )
        .route(
            "/api/v1/user-input-requests/{request_id}/answer",
            post(answer_user_input_request),
        )
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUserInputRequestsParams {
    /// Only return requests of this session
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

/// List the caller's pending user input requests, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/user-input-requests",
    params(ListUserInputRequestsParams),
    responses(
        (status = 200, description = "Pending requests owned by the caller", body = Vec<UserInputRequest>),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "user-input-requests"
)]
pub async fn list_pending_user_input_requests(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(params): Query<ListUserInputRequestsParams>,
) -> Result<Json<Vec<UserInputRequest>>, AppError> {
    let pending = state
        .broker
        .list_pending_for_user(auth.user_id, params.session_id)
        .await?;
    Ok(Json(pending))
}

/// Answer a pending user input request
///
/// Accepted once. A request that was already answered yields 409; one whose
/// deadline has passed yields 410 and is marked expired.
#[utoipa::path(
    post,
    path = "/api/v1/user-input-requests/{request_id}/answer",
    params(
        ("request_id" = Uuid, Path, description = "User input request id")
    ),
    request_body = AnswerUserInputRequest,
    responses(
        (status = 200, description = "Request answered", body = UserInputRequest),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Caller does not own the session", body = ApiError),
        (status = 404, description = "Request not found", body = ApiError),
        (status = 409, description = "Request already answered", body = ApiError),
        (status = 410, description = "Request expired", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "user-input-requests"
)]
pub async fn answer_user_input_request(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
    AppJson(req): AppJson<AnswerUserInputRequest>,
) -> Result<Json<UserInputRequest>, AppError> {
    tracing::debug!(
        user_id = %auth.user_id,
        key_id = %auth.key_id,
        request_id = %request_id,
        "answering user input request"
    );
    let answered = state
        .broker
        .answer_request(auth.user_id, request_id, req.answers)
        .await?;
    Ok(Json(answered))
}
