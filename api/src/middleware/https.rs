use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Paths served over plain HTTP too, so load-balancer probes keep working.
const PLAIN_HTTP_PATHS: &[&str] = &["/health"];

/// Middleware that enforces HTTPS via the `X-Forwarded-Proto` header.
///
/// When a reverse proxy terminates TLS it sets `X-Forwarded-Proto: https`.
/// If the header says `http`, the request is 308-redirected to the HTTPS
/// equivalent (308 keeps the method and body of answer submissions).
/// All responses get an HSTS header.
pub async fn require_https(req: Request, next: Next) -> Response {
    let proto = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");

    if proto == "http" && !PLAIN_HTTP_PATHS.contains(&req.uri().path()) {
        if let Some(uri) = https_location(&req) {
            let mut response = (
                StatusCode::PERMANENT_REDIRECT,
                [("location", uri.to_string())],
            )
                .into_response();
            add_hsts_header(&mut response);
            return response;
        }
    }

    let mut response = next.run(req).await;
    add_hsts_header(&mut response);
    response
}

fn https_location(req: &Request) -> Option<Uri> {
    let host = req
        .headers()
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("https://{host}{path_and_query}").parse().ok()
}

fn add_hsts_header(response: &mut Response) {
    response.headers_mut().insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
}
