use clap::Subcommand;
use serde_json::json;

use crate::util::{connect_db, exit_error, print_json};

/// Bootstrap commands. These write straight to the database (requires DATABASE_URL).
#[derive(Subcommand)]
pub enum AdminCommands {
    /// Create a new user
    CreateUser {
        /// User email
        #[arg(long)]
        email: String,
        /// Display name
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Create an API key for a user
    CreateKey {
        /// User UUID
        #[arg(long)]
        user_id: uuid::Uuid,
        /// Human-readable label (e.g. "laptop")
        #[arg(long)]
        label: String,
        /// Expiration in days (default: never)
        #[arg(long)]
        expires_in_days: Option<i64>,
    },
    /// Register an agent session owned by a user
    CreateSession {
        /// User UUID
        #[arg(long)]
        user_id: uuid::Uuid,
    },
}

pub async fn run(command: AdminCommands) -> i32 {
    match command {
        AdminCommands::CreateUser {
            email,
            display_name,
        } => create_user(&email, display_name.as_deref()).await,
        AdminCommands::CreateKey {
            user_id,
            label,
            expires_in_days,
        } => create_key(user_id, &label, expires_in_days).await,
        AdminCommands::CreateSession { user_id } => create_session(user_id).await,
    }
}

async fn create_user(email: &str, display_name: Option<&str>) -> i32 {
    let email = email.trim();
    if !email.contains('@') {
        exit_error("Invalid email address", None);
    }

    let pool = connect_db().await;
    let user_id = uuid::Uuid::now_v7();

    if let Err(e) = sqlx::query("INSERT INTO users (id, email, display_name) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(email)
        .bind(display_name)
        .execute(&pool)
        .await
    {
        return db_failure("Failed to create user", &e);
    }

    print_json(&json!({
        "user_id": user_id,
        "email": email,
        "display_name": display_name
    }));
    0
}

async fn create_key(user_id: uuid::Uuid, label: &str, expires_in_days: Option<i64>) -> i32 {
    if matches!(expires_in_days, Some(d) if d <= 0) {
        exit_error("--expires-in-days must be positive", None);
    }

    let pool = connect_db().await;

    let (full_key, key_hash) = handoff_core::auth::generate_api_key();
    let prefix = handoff_core::auth::key_prefix(&full_key);
    let key_id = uuid::Uuid::now_v7();
    let expires_at = expires_in_days.map(|d| chrono::Utc::now() + chrono::Duration::days(d));

    if let Err(e) = sqlx::query(
        "INSERT INTO api_keys (id, user_id, key_hash, key_prefix, label, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(key_id)
    .bind(user_id)
    .bind(&key_hash)
    .bind(&prefix)
    .bind(label)
    .bind(expires_at)
    .execute(&pool)
    .await
    {
        return db_failure("Failed to create API key", &e);
    }

    print_json(&json!({
        "key_id": key_id,
        "api_key": full_key,
        "key_prefix": prefix,
        "label": label,
        "expires_at": expires_at,
        "warning": "Store this key securely. It cannot be retrieved again."
    }));
    0
}

async fn create_session(user_id: uuid::Uuid) -> i32 {
    let pool = connect_db().await;
    let session_id = uuid::Uuid::now_v7();

    if let Err(e) = sqlx::query("INSERT INTO agent_sessions (id, user_id) VALUES ($1, $2)")
        .bind(session_id)
        .bind(user_id)
        .execute(&pool)
        .await
    {
        return db_failure("Failed to create session", &e);
    }

    print_json(&json!({
        "session_id": session_id,
        "user_id": user_id
    }));
    0
}

/// Report a failed insert. Constraint violations are the caller's fault (exit 1).
fn db_failure(context: &str, e: &sqlx::Error) -> i32 {
    let is_constraint = e
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code.starts_with("23"));
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "error": if is_constraint { "conflict" } else { "database_error" },
            "message": format!("{context}: {e}")
        }))
        .unwrap_or_default()
    );
    if is_constraint { 1 } else { 2 }
}
