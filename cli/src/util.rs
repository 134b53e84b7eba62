use std::collections::BTreeMap;

use serde_json::json;

pub const INTERNAL_TOKEN_HEADER: &str = "X-Internal-Token";

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", pretty(&err));
    std::process::exit(4);
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Credential attached to an API call.
pub enum Credential {
    None,
    /// End-user API key, sent as `Authorization: Bearer`.
    ApiKey(String),
    /// Shared secret for internal routes.
    Internal(String),
}

/// API key for user-facing commands, from `HANDOFF_API_KEY`.
pub fn resolve_api_key() -> Credential {
    match std::env::var("HANDOFF_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Credential::ApiKey(key.trim().to_string()),
        _ => exit_error(
            "No API key configured",
            Some("Set HANDOFF_API_KEY. Create one with 'handoff admin create-key'."),
        ),
    }
}

/// Shared secret for internal commands, from `HANDOFF_INTERNAL_API_TOKEN`.
pub fn resolve_internal_token() -> Credential {
    match std::env::var("HANDOFF_INTERNAL_API_TOKEN") {
        Ok(token) if !token.trim().is_empty() => Credential::Internal(token.trim().to_string()),
        _ => exit_error(
            "No internal API token configured",
            Some("Set HANDOFF_INTERNAL_API_TOKEN to the value the API server uses."),
        ),
    }
}

/// Execute an API request, print the response, return a structured exit code.
///
/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    credential: Credential,
    body: Option<serde_json::Value>,
    query: &[(String, String)],
) -> i32 {
    let url = match reqwest::Url::parse(&format!("{api_url}{path}")) {
        Ok(mut u) => {
            if !query.is_empty() {
                let mut q = u.query_pairs_mut();
                for (k, v) in query {
                    q.append_pair(k, v);
                }
            }
            u
        }
        Err(e) => {
            let err = json!({
                "error": "cli_error",
                "message": format!("Invalid URL: {api_url}{path}: {e}")
            });
            eprintln!("{}", pretty(&err));
            return 4;
        }
    };

    let mut req = client().request(method, url);

    match credential {
        Credential::None => {}
        Credential::ApiKey(key) => req = req.header("Authorization", format!("Bearer {key}")),
        Credential::Internal(token) => req = req.header(INTERNAL_TOKEN_HEADER, token),
    }

    if let Some(b) = body {
        req = req.json(&b);
    }

    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            let err = json!({
                "error": "connection_error",
                "message": format!("{e}"),
                "docs_hint": "Is the API server running? Check HANDOFF_API_URL."
            });
            eprintln!("{}", pretty(&err));
            return 3;
        }
    };

    let status = resp.status().as_u16();
    let exit_code = exit_code_for_status(status);

    let resp_body: serde_json::Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };

    if exit_code == 0 {
        println!("{}", pretty(&resp_body));
    } else {
        eprintln!("{}", pretty(&resp_body));
    }

    exit_code
}

fn exit_code_for_status(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

/// Read JSON from a file path or stdin (when path is "-").
pub fn read_json_from_file(path: &str) -> Result<serde_json::Value, String> {
    let raw = if path == "-" {
        std::io::read_to_string(std::io::stdin())
            .map_err(|e| format!("Failed to read stdin: {e}"))?
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file '{path}': {e}"))?
    };
    serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON in '{path}': {e}"))
}

/// Parse repeated `--answer key=value` flags. Later keys win.
pub fn parse_answers(pairs: &[String]) -> Result<BTreeMap<String, String>, String> {
    let mut answers = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid answer '{pair}': expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Invalid answer '{pair}': key must not be empty"));
        }
        answers.insert(key.to_string(), value.to_string());
    }
    if answers.is_empty() {
        return Err("At least one --answer key=value is required".to_string());
    }
    Ok(answers)
}

/// Direct database connection for bootstrap commands.
pub async fn connect_db() -> sqlx::PgPool {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => exit_error(
            "DATABASE_URL must be set for admin commands",
            Some("Admin commands connect directly to the database for bootstrapping"),
        ),
    };

    match sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!(
                "{}",
                pretty(&json!({
                    "error": "connection_error",
                    "message": format!("Failed to connect to database: {e}")
                }))
            );
            std::process::exit(3);
        }
    }
}

pub fn print_json(value: &serde_json::Value) {
    println!("{}", pretty(value));
}
