use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use handoff_core::auth::{API_KEY_PREFIX, hash_token, shared_secret_matches};
use tower::{Layer, Service, ServiceExt};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// End user extracted from the `Authorization: Bearer <api key>` header.
///
/// Two-phase resolution:
/// 1. Auth middleware (`InjectAuthLayer`) runs first: validates the key, injects into extensions
/// 2. Handler extractor reads from extensions (no DB hit), or falls back to full auth
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub key_id: Uuid,
}

// --- Tower Layer/Service for auth injection ---

/// Tower Layer that injects `AuthenticatedUser` into request extensions.
/// Silently continues on auth failure (health, docs and internal routes don't need it).
#[derive(Clone)]
pub struct InjectAuthLayer {
    pool: sqlx::PgPool,
}

impl InjectAuthLayer {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

impl<S> Layer<S> for InjectAuthLayer {
    type Service = InjectAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectAuthService {
            inner,
            pool: self.pool.clone(),
        }
    }
}

#[derive(Clone)]
pub struct InjectAuthService<S> {
    inner: S,
    pool: sqlx::PgPool,
}

impl<S> Service<Request> for InjectAuthService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);
        let pool = self.pool.clone();

        // Extract token synchronously (headers are Send-safe, Body is not)
        let token = bearer_token(req.headers()).map(str::to_owned);

        Box::pin(async move {
            if let Some(token) = token {
                if token.starts_with(API_KEY_PREFIX) {
                    if let Ok(auth_user) = authenticate_api_key(&token, &pool).await {
                        req.extensions_mut().insert(auth_user);
                    }
                }
            }
            Ok(ready.oneshot(req).await.into_response())
        })
    }
}

/// Bearer token from the Authorization header (synchronous, no body access).
fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

// --- Extractor (used by handlers) ---

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Fast path: auth middleware already validated the key
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        // Slow path: no middleware ran (shouldn't happen in normal flow)
        if !parts.headers.contains_key("authorization") {
            return Err(AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
                docs_hint: Some(
                    "Include 'Authorization: Bearer <api key>' header. Keys start with 'handoff_sk_'."
                        .to_string(),
                ),
            });
        }

        let token = bearer_token(&parts.headers).ok_or_else(|| AppError::Unauthorized {
            message: "Authorization header must use Bearer scheme".to_string(),
            docs_hint: Some("Format: 'Authorization: Bearer <api key>'".to_string()),
        })?;

        if !token.starts_with(API_KEY_PREFIX) {
            return Err(AppError::Unauthorized {
                message: "Invalid token format".to_string(),
                docs_hint: Some("API keys start with 'handoff_sk_'.".to_string()),
            });
        }

        authenticate_api_key(token, &state.db).await
    }
}

async fn authenticate_api_key(
    token: &str,
    pool: &sqlx::PgPool,
) -> Result<AuthenticatedUser, AppError> {
    let token_hash = hash_token(token);

    let row = sqlx::query_as::<_, ApiKeyRow>(
        "SELECT ak.id, ak.user_id, ak.expires_at \
         FROM api_keys ak \
         JOIN users u ON u.id = ak.user_id \
         WHERE ak.key_hash = $1 \
           AND ak.is_revoked = FALSE \
           AND u.is_active = TRUE",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await
    .map_err(AppError::Database)?
    .ok_or_else(|| AppError::Unauthorized {
        message: "Invalid API key".to_string(),
        docs_hint: Some("Check that the API key is correct and has not been revoked.".to_string()),
    })?;

    if let Some(expires_at) = row.expires_at {
        if Utc::now() > expires_at {
            return Err(AppError::Unauthorized {
                message: "API key has expired".to_string(),
                docs_hint: Some("Create a new API key with 'handoff admin create-key'.".to_string()),
            });
        }
    }

    // Fire-and-forget last_used_at update
    let pool_clone = pool.clone();
    let key_id = row.id;
    tokio::spawn(async move {
        let _ = sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(key_id)
            .execute(&pool_clone)
            .await;
    });

    Ok(AuthenticatedUser {
        user_id: row.user_id,
        key_id: row.id,
    })
}

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    user_id: Uuid,
    expires_at: Option<chrono::DateTime<Utc>>,
}

// --- Internal (service-to-service) credential ---

/// Digest of the shared secret trusted callers present in `X-Internal-Token`.
/// `None` means no secret is configured and every internal call is refused.
#[derive(Clone, Default)]
pub struct InternalToken {
    expected_hash: Option<Arc<str>>,
}

impl InternalToken {
    pub fn from_secret(secret: Option<&str>) -> Self {
        Self {
            expected_hash: secret
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Arc::from(hash_token(s))),
        }
    }

    fn verify(&self, presented: Option<&str>) -> Result<(), AppError> {
        let Some(expected_hash) = self.expected_hash.as_deref() else {
            tracing::warn!("internal call refused: no internal API token configured");
            return Err(AppError::Forbidden {
                message: "Internal API token is not configured".to_string(),
                docs_hint: Some("Set HANDOFF_INTERNAL_API_TOKEN on the API server.".to_string()),
            });
        };

        match presented {
            Some(token) if shared_secret_matches(expected_hash, token) => Ok(()),
            _ => {
                tracing::warn!(
                    header_present = presented.is_some(),
                    decision = "deny",
                    "internal token authorization decision"
                );
                Err(AppError::Forbidden {
                    message: "Invalid internal token".to_string(),
                    docs_hint: Some(
                        "Internal routes require the 'X-Internal-Token' header.".to_string(),
                    ),
                })
            }
        }
    }
}

/// Marker extractor for trusted backend callers (e.g. the agent runtime).
#[derive(Debug, Clone, Copy)]
pub struct InternalCaller;

impl FromRequestParts<AppState> for InternalCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        state.internal_token.verify(presented)?;
        Ok(InternalCaller)
    }
}
