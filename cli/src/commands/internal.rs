use clap::Subcommand;
use serde_json::json;

use crate::util::{api_request, exit_error, read_json_from_file, resolve_internal_token};

/// Calls an agent runtime makes. Useful for scripting and local testing.
#[derive(Subcommand)]
pub enum InternalCommands {
    /// Ask a session's user a question
    Create {
        /// Agent session UUID
        #[arg(long)]
        session_id: uuid::Uuid,
        /// Name of the tool asking (e.g. "ask_user")
        #[arg(long)]
        tool_name: String,
        /// JSON object with the tool input (use '-' for stdin)
        #[arg(long)]
        tool_input_file: String,
        /// Deadline (RFC3339). Defaults to the server's TTL.
        #[arg(long)]
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// Fetch a request's current state
    Get {
        /// User input request UUID
        #[arg(long)]
        request_id: uuid::Uuid,
    },
    /// List a session's pending requests
    Pending {
        /// Agent session UUID
        #[arg(long)]
        session_id: uuid::Uuid,
    },
}

pub async fn run(api_url: &str, command: InternalCommands) -> i32 {
    match command {
        InternalCommands::Create {
            session_id,
            tool_name,
            tool_input_file,
            expires_at,
        } => create(api_url, session_id, &tool_name, &tool_input_file, expires_at).await,
        InternalCommands::Get { request_id } => {
            api_request(
                api_url,
                reqwest::Method::GET,
                &format!("/api/v1/internal/user-input-requests/{request_id}"),
                resolve_internal_token(),
                None,
                &[],
            )
            .await
        }
        InternalCommands::Pending { session_id } => {
            api_request(
                api_url,
                reqwest::Method::GET,
                &format!("/api/v1/internal/sessions/{session_id}/user-input-requests"),
                resolve_internal_token(),
                None,
                &[],
            )
            .await
        }
    }
}

async fn create(
    api_url: &str,
    session_id: uuid::Uuid,
    tool_name: &str,
    tool_input_file: &str,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
) -> i32 {
    let tool_input = match read_json_from_file(tool_input_file) {
        Ok(v) if v.is_object() => v,
        Ok(_) => exit_error("Tool input must be a JSON object", None),
        Err(e) => exit_error(&e, None),
    };

    let mut body = json!({
        "session_id": session_id,
        "tool_name": tool_name,
        "tool_input": tool_input
    });
    if let Some(expires_at) = expires_at {
        body["expires_at"] = json!(expires_at);
    }

    api_request(
        api_url,
        reqwest::Method::POST,
        "/api/v1/internal/user-input-requests",
        resolve_internal_token(),
        Some(body),
        &[],
    )
    .await
}
