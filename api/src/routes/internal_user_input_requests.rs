use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use handoff_core::error::ApiError;
use handoff_core::user_input::{CreateUserInputRequest, UserInputRequest};

use crate::auth::InternalCaller;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

/// Routes for the agent runtime. Every handler requires `X-Internal-Token`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/internal/user-input-requests",
            post(create_user_input_request),
        )
        .route(
            "/api/v1/internal/user-input-requests/{request_id}",
            get(get_user_input_request),
        )
        .route(
            "/api/v1/internal/sessions/{session_id}/user-input-requests",
            get(list_session_user_input_requests),
        )
}

/// Ask the session's user a question on behalf of an agent tool
#[utoipa::path(
    post,
    path = "/api/v1/internal/user-input-requests",
    request_body = CreateUserInputRequest,
    responses(
        (status = 201, description = "Request created", body = UserInputRequest),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 403, description = "Missing or invalid internal token", body = ApiError),
        (status = 404, description = "Session not found", body = ApiError)
    ),
    security(("internal_token" = [])),
    tag = "internal"
)]
pub async fn create_user_input_request(
    State(state): State<AppState>,
    _caller: InternalCaller,
    AppJson(req): AppJson<CreateUserInputRequest>,
) -> Result<(StatusCode, Json<UserInputRequest>), AppError> {
    let created = state.broker.create_request(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Fetch a user input request by id (any session)
#[utoipa::path(
    get,
    path = "/api/v1/internal/user-input-requests/{request_id}",
    params(
        ("request_id" = Uuid, Path, description = "User input request id")
    ),
    responses(
        (status = 200, description = "Current state of the request", body = UserInputRequest),
        (status = 403, description = "Missing or invalid internal token", body = ApiError),
        (status = 404, description = "Request not found", body = ApiError)
    ),
    security(("internal_token" = [])),
    tag = "internal"
)]
pub async fn get_user_input_request(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Path(request_id): Path<Uuid>,
) -> Result<Json<UserInputRequest>, AppError> {
    Ok(Json(state.broker.get_request(request_id).await?))
}

/// List pending requests of one session, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/internal/sessions/{session_id}/user-input-requests",
    params(
        ("session_id" = Uuid, Path, description = "Agent session id")
    ),
    responses(
        (status = 200, description = "Pending requests of the session", body = Vec<UserInputRequest>),
        (status = 403, description = "Missing or invalid internal token", body = ApiError),
        (status = 404, description = "Session not found", body = ApiError)
    ),
    security(("internal_token" = [])),
    tag = "internal"
)]
pub async fn list_session_user_input_requests(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<UserInputRequest>>, AppError> {
    Ok(Json(
        state.broker.list_pending_for_session(session_id).await?,
    ))
}
