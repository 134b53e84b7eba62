use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service, ServiceExt};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;

/// Tower Layer that records one `api_access_log` row per `/api/v1/` call.
///
/// Runs after `InjectAuthLayer` so the caller's user id is in the request
/// extensions. The insert is spawned and never fails the response.
#[derive(Clone)]
pub struct AccessLogLayer {
    pool: sqlx::PgPool,
}

impl AccessLogLayer {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            pool: self.pool.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
    pool: sqlx::PgPool,
}

impl<S> Service<Request> for AccessLogService<S>
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

    fn call(&mut self, req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);
        let pool = self.pool.clone();

        Box::pin(async move {
            let path = req.uri().path().to_owned();

            if !path.starts_with("/api/v1/") {
                return Ok(ready.oneshot(req).await.into_response());
            }

            let start = Instant::now();
            let method = req.method().to_string();
            let user_id: Option<Uuid> = req
                .extensions()
                .get::<AuthenticatedUser>()
                .map(|u| u.user_id);

            let response = ready.oneshot(req).await.into_response();

            let status_code = response.status().as_u16() as i16;
            let response_time_ms = start.elapsed().as_millis().min(i32::MAX as u128) as i32;
            let user_input_request_id = parse_user_input_request_id(&path);

            tokio::spawn(async move {
                if let Err(e) = sqlx::query(
                    "INSERT INTO api_access_log \
                     (user_id, method, path, user_input_request_id, status_code, response_time_ms) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(user_id)
                .bind(&method)
                .bind(&path)
                .bind(user_input_request_id)
                .bind(status_code)
                .bind(response_time_ms)
                .execute(&pool)
                .await
                {
                    tracing::warn!(error = %e, "Failed to insert access log entry");
                }
            });

            Ok(response)
        })
    }
}

/// Request id from `/api/v1/user-input-requests/{id}/answer` or
/// `/api/v1/internal/user-input-requests/{id}`.
fn parse_user_input_request_id(path: &str) -> Option<Uuid> {
    let segment = if let Some(rest) = path.strip_prefix("/api/v1/user-input-requests/") {
        rest.strip_suffix("/answer")?
    } else {
        path.strip_prefix("/api/v1/internal/user-input-requests/")?
    };
    Uuid::parse_str(segment).ok()
}
