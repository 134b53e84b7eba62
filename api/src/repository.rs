//! SQL access for `user_input_requests`.
//!
//! Every function takes a connection (usually `&mut *tx`) and never commits;
//! transaction boundaries belong to the caller.

use chrono::{DateTime, Utc};
use handoff_core::user_input::{Answers, UserInputRequest, UserInputRequestPatch, UserInputStatus};
use serde_json::{Value, json};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct UserInputRequestRow {
    id: Uuid,
    session_id: Uuid,
    tool_name: String,
    tool_input: Value,
    status: String,
    answers: Option<Value>,
    expires_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserInputRequestRow {
    fn into_entity(self) -> Result<UserInputRequest, sqlx::Error> {
        let status = self
            .status
            .parse::<UserInputStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        let tool_input = match self.tool_input {
            Value::Object(map) => map,
            other => {
                return Err(sqlx::Error::Decode(
                    format!("tool_input of {} is not an object: {other}", self.id).into(),
                ));
            }
        };

        let answers = self
            .answers
            .map(serde_json::from_value::<Answers>)
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(UserInputRequest {
            id: self.id,
            session_id: self.session_id,
            tool_name: self.tool_name,
            tool_input,
            status,
            answers,
            expires_at: self.expires_at,
            answered_at: self.answered_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_entities(rows: Vec<UserInputRequestRow>) -> Result<Vec<UserInputRequest>, sqlx::Error> {
    rows.into_iter().map(UserInputRequestRow::into_entity).collect()
}

pub async fn create(conn: &mut PgConnection, request: &UserInputRequest) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_input_requests (
            id,
            session_id,
            tool_name,
            tool_input,
            status,
            answers,
            expires_at,
            answered_at,
            created_at,
            updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(request.id)
    .bind(request.session_id)
    .bind(&request.tool_name)
    .bind(Value::Object(request.tool_input.clone()))
    .bind(request.status.as_str())
    .bind(request.answers.as_ref().map(|answers| json!(answers)))
    .bind(request.expires_at)
    .bind(request.answered_at)
    .bind(request.created_at)
    .bind(request.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_by_id(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<UserInputRequest>, sqlx::Error> {
    sqlx::query_as::<_, UserInputRequestRow>(
        r#"
        SELECT id, session_id, tool_name, tool_input, status, answers,
               expires_at, answered_at, created_at, updated_at
        FROM user_input_requests
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .map(UserInputRequestRow::into_entity)
    .transpose()
}

pub async fn list_pending_by_session(
    conn: &mut PgConnection,
    session_id: Uuid,
) -> Result<Vec<UserInputRequest>, sqlx::Error> {
    let rows = sqlx::query_as::<_, UserInputRequestRow>(
        r#"
        SELECT id, session_id, tool_name, tool_input, status, answers,
               expires_at, answered_at, created_at, updated_at
        FROM user_input_requests
        WHERE session_id = $1
          AND status = 'pending'
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;
    into_entities(rows)
}

pub async fn list_pending_by_user(
    conn: &mut PgConnection,
    user_id: Uuid,
    session_id: Option<Uuid>,
) -> Result<Vec<UserInputRequest>, sqlx::Error> {
    let rows = sqlx::query_as::<_, UserInputRequestRow>(
        r#"
        SELECT r.id, r.session_id, r.tool_name, r.tool_input, r.status, r.answers,
               r.expires_at, r.answered_at, r.created_at, r.updated_at
        FROM user_input_requests r
        JOIN agent_sessions s ON s.id = r.session_id
        WHERE s.user_id = $1
          AND s.is_deleted = FALSE
          AND r.status = 'pending'
          AND ($2::uuid IS NULL OR r.session_id = $2)
        ORDER BY r.created_at ASC, r.id ASC
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;
    into_entities(rows)
}

/// Applies `patch` only while the row is still `pending`.
///
/// Postgres re-evaluates the `status = 'pending'` predicate after waiting on a
/// concurrent writer's row lock, so of two racing updates exactly one returns
/// a row.
pub async fn update_if_pending(
    conn: &mut PgConnection,
    id: Uuid,
    patch: &UserInputRequestPatch,
    now: DateTime<Utc>,
) -> Result<Option<UserInputRequest>, sqlx::Error> {
    let status = patch.status.as_set().map(|status| status.as_str());
    let answers = patch
        .answers
        .as_set()
        .cloned()
        .flatten()
        .map(|answers| json!(answers));
    let answered_at = patch.answered_at.as_set().copied().flatten();

    sqlx::query_as::<_, UserInputRequestRow>(
        r#"
        UPDATE user_input_requests
        SET status = CASE WHEN $2::boolean THEN $3::text ELSE status END,
            answers = CASE WHEN $4::boolean THEN $5::jsonb ELSE answers END,
            answered_at = CASE WHEN $6::boolean THEN $7::timestamptz ELSE answered_at END,
            updated_at = $8
        WHERE id = $1
          AND status = 'pending'
        RETURNING id, session_id, tool_name, tool_input, status, answers,
                  expires_at, answered_at, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(patch.status.is_set())
    .bind(status)
    .bind(patch.answers.is_set())
    .bind(answers)
    .bind(patch.answered_at.is_set())
    .bind(answered_at)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?
    .map(UserInputRequestRow::into_entity)
    .transpose()
}

pub async fn expire_overdue(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE user_input_requests
        SET status = 'expired',
            updated_at = $1
        WHERE status = 'pending'
          AND expires_at < $1
        "#,
    )
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn session_owner(
    conn: &mut PgConnection,
    session_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        "SELECT user_id FROM agent_sessions WHERE id = $1 AND is_deleted = FALSE",
    )
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await
}
