use clap::Subcommand;
use serde_json::json;

use crate::util::{api_request, exit_error, parse_answers, resolve_api_key};

#[derive(Subcommand)]
pub enum RequestCommands {
    /// List your pending questions, oldest first
    List {
        /// Only show questions from this session
        #[arg(long)]
        session_id: Option<uuid::Uuid>,
    },
    /// Answer a pending question
    Answer {
        /// User input request UUID
        #[arg(long)]
        request_id: uuid::Uuid,
        /// Answer as key=value (repeatable)
        #[arg(long = "answer", value_name = "KEY=VALUE", required = true)]
        answers: Vec<String>,
    },
}

pub async fn run(api_url: &str, command: RequestCommands) -> i32 {
    match command {
        RequestCommands::List { session_id } => list(api_url, session_id).await,
        RequestCommands::Answer {
            request_id,
            answers,
        } => answer(api_url, request_id, &answers).await,
    }
}

async fn list(api_url: &str, session_id: Option<uuid::Uuid>) -> i32 {
    let query: Vec<(String, String)> = session_id
        .map(|id| vec![("session_id".to_string(), id.to_string())])
        .unwrap_or_default();

    api_request(
        api_url,
        reqwest::Method::GET,
        "/api/v1/user-input-requests",
        resolve_api_key(),
        None,
        &query,
    )
    .await
}

async fn answer(api_url: &str, request_id: uuid::Uuid, pairs: &[String]) -> i32 {
    let answers = match parse_answers(pairs) {
        Ok(a) => a,
        Err(e) => exit_error(&e, Some("Example: --answer approve=yes --answer note=ship it")),
    };

    api_request(
        api_url,
        reqwest::Method::POST,
        &format!("/api/v1/user-input-requests/{request_id}/answer"),
        resolve_api_key(),
        Some(json!({ "answers": answers })),
        &[],
    )
    .await
}
