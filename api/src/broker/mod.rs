//! User-input-request broker: lets an agent pause, ask its user a question,
//! and resume once the answer arrives.
//!
//! The service is the only writer of request rows. Ownership ("who may
//! answer") is resolved through the session directory on every answer rather
//! than stored on the request.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use handoff_core::user_input::{
    Answers, CreateUserInputRequest, ToolInput, UserInputRequest, UserInputRequestPatch,
    UserInputStatus,
};
use serde_json::Value;
use uuid::Uuid;

#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod store;
pub mod sweeper;

use store::{SessionDirectory, UserInputStore};

pub const MAX_TOOL_NAME_LEN: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("user input request {0} not found")]
    RequestNotFound(Uuid),
    #[error("user {user_id} does not own session {session_id}")]
    Forbidden { user_id: Uuid, session_id: Uuid },
    #[error("user input request {id} is already {status}")]
    InvalidState { id: Uuid, status: UserInputStatus },
    #[error("user input request {id} expired at {expires_at}")]
    Expired {
        id: Uuid,
        expires_at: DateTime<Utc>,
    },
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct BrokerSettings {
    /// Horizon applied when the caller leaves `expires_at` out.
    pub default_ttl: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::hours(24),
        }
    }
}

pub struct BrokerService {
    store: Arc<dyn UserInputStore>,
    sessions: Arc<dyn SessionDirectory>,
    settings: BrokerSettings,
}

impl BrokerService {
    pub fn new(
        store: Arc<dyn UserInputStore>,
        sessions: Arc<dyn SessionDirectory>,
        settings: BrokerSettings,
    ) -> Self {
        Self {
            store,
            sessions,
            settings,
        }
    }

    pub async fn create_request(
        &self,
        req: CreateUserInputRequest,
    ) -> Result<UserInputRequest, BrokerError> {
        let tool_name = validate_tool_name(&req.tool_name)?;
        validate_tool_input(&req.tool_input)?;

        if self.sessions.owner_of(req.session_id).await?.is_none() {
            return Err(BrokerError::SessionNotFound(req.session_id));
        }

        let now = Utc::now();
        let expires_at = match req.expires_at {
            Some(expires_at) => expires_at,
            None => now
                .checked_add_signed(self.settings.default_ttl)
                .ok_or_else(|| BrokerError::Validation {
                    field: "expires_at",
                    message: "default expiry horizon is out of range; pass expires_at explicitly"
                        .to_string(),
                })?,
        };
        let request =
            UserInputRequest::new_pending(req.session_id, tool_name, req.tool_input, expires_at, now);

        self.store.insert(&request).await?;

        tracing::info!(
            request_id = %request.id,
            session_id = %request.session_id,
            tool_name = %request.tool_name,
            expires_at = %request.expires_at,
            "user input request created"
        );
        Ok(request)
    }

    /// Fetch a request by id. An overdue pending request is expired on the way out.
    pub async fn get_request(&self, id: Uuid) -> Result<UserInputRequest, BrokerError> {
        let request = self
            .store
            .get(id)
            .await?
            .ok_or(BrokerError::RequestNotFound(id))?;

        let now = Utc::now();
        if request.status == UserInputStatus::Pending && request.is_overdue(now) {
            return self.expire(request, now).await;
        }
        Ok(request)
    }

    pub async fn list_pending_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<UserInputRequest>, BrokerError> {
        if self.sessions.owner_of(session_id).await?.is_none() {
            return Err(BrokerError::SessionNotFound(session_id));
        }
        let pending = self.store.list_pending_by_session(session_id).await?;
        Ok(drop_overdue(pending, Utc::now()))
    }

    pub async fn list_pending_for_user(
        &self,
        user_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<Vec<UserInputRequest>, BrokerError> {
        let pending = self.store.list_pending_by_user(user_id, session_id).await?;
        Ok(drop_overdue(pending, Utc::now()))
    }

    pub async fn answer_request(
        &self,
        user_id: Uuid,
        request_id: Uuid,
        answers: Answers,
    ) -> Result<UserInputRequest, BrokerError> {
        if answers.is_empty() {
            return Err(BrokerError::Validation {
                field: "answers",
                message: "answers must contain at least one field".to_string(),
            });
        }
        validate_answers(&answers)?;

        let request = self
            .store
            .get(request_id)
            .await?
            .ok_or(BrokerError::RequestNotFound(request_id))?;

        self.authorize_answer(user_id, &request).await?;
        ensure_pending(&request)?;

        let now = Utc::now();
        if request.is_overdue(now) {
            let expired = self.expire(request, now).await?;
            return Err(BrokerError::Expired {
                id: expired.id,
                expires_at: expired.expires_at,
            });
        }

        let patch = UserInputRequestPatch::answered(answers, now);
        match self.store.apply_if_pending(request_id, &patch, now).await? {
            Some(answered) => {
                tracing::info!(
                    request_id = %answered.id,
                    session_id = %answered.session_id,
                    user_id = %user_id,
                    "user input request answered"
                );
                Ok(answered)
            }
            None => {
                // Lost the race: report whatever the winner left behind.
                let current = self
                    .store
                    .get(request_id)
                    .await?
                    .ok_or(BrokerError::RequestNotFound(request_id))?;
                tracing::warn!(
                    request_id = %request_id,
                    status = %current.status,
                    "concurrent transition won over answer attempt"
                );
                ensure_pending(&current)?;
                Err(BrokerError::InvalidState {
                    id: request_id,
                    status: current.status,
                })
            }
        }
    }

    /// Expire every overdue pending request. Returns how many were moved.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, BrokerError> {
        Ok(self.store.expire_overdue(now).await?)
    }

    async fn authorize_answer(
        &self,
        user_id: Uuid,
        request: &UserInputRequest,
    ) -> Result<(), BrokerError> {
        let owner = self.sessions.owner_of(request.session_id).await?;
        if owner == Some(user_id) {
            return Ok(());
        }
        tracing::warn!(
            user_id = %user_id,
            request_id = %request.id,
            session_id = %request.session_id,
            decision = "deny",
            "answer authorization decision"
        );
        Err(BrokerError::Forbidden {
            user_id,
            session_id: request.session_id,
        })
    }

    async fn expire(
        &self,
        request: UserInputRequest,
        now: DateTime<Utc>,
    ) -> Result<UserInputRequest, BrokerError> {
        let patch = UserInputRequestPatch::expired();
        match self.store.apply_if_pending(request.id, &patch, now).await? {
            Some(expired) => {
                tracing::info!(
                    request_id = %expired.id,
                    expires_at = %expired.expires_at,
                    "user input request expired"
                );
                Ok(expired)
            }
            // Someone else moved it first; the stored state is authoritative.
            None => self
                .store
                .get(request.id)
                .await?
                .ok_or(BrokerError::RequestNotFound(request.id)),
        }
    }
}

fn validate_tool_name(raw: &str) -> Result<String, BrokerError> {
    let tool_name = raw.trim();
    if tool_name.is_empty() {
        return Err(BrokerError::Validation {
            field: "tool_name",
            message: "tool_name must not be empty".to_string(),
        });
    }
    if tool_name.chars().count() > MAX_TOOL_NAME_LEN {
        return Err(BrokerError::Validation {
            field: "tool_name",
            message: format!("tool_name must be <= {MAX_TOOL_NAME_LEN} characters"),
        });
    }
    reject_nul("tool_name", tool_name)?;
    Ok(tool_name.to_string())
}

/// Postgres stores neither NUL in TEXT nor `\u0000` in JSONB.
fn reject_nul(field: &'static str, text: &str) -> Result<(), BrokerError> {
    if text.contains('\0') {
        return Err(BrokerError::Validation {
            field,
            message: format!("{field} must not contain NUL characters"),
        });
    }
    Ok(())
}

fn validate_tool_input(tool_input: &ToolInput) -> Result<(), BrokerError> {
    fn walk(value: &Value) -> Result<(), BrokerError> {
        match value {
            Value::String(text) => reject_nul("tool_input", text),
            Value::Array(items) => items.iter().try_for_each(walk),
            Value::Object(map) => map.iter().try_for_each(|(key, value)| {
                reject_nul("tool_input", key)?;
                walk(value)
            }),
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        }
    }
    tool_input.iter().try_for_each(|(key, value)| {
        reject_nul("tool_input", key)?;
        walk(value)
    })
}

fn validate_answers(answers: &Answers) -> Result<(), BrokerError> {
    answers.iter().try_for_each(|(key, value)| {
        reject_nul("answers", key)?;
        reject_nul("answers", value)
    })
}

/// Maps a terminal status to the error an answer attempt should see.
fn ensure_pending(request: &UserInputRequest) -> Result<(), BrokerError> {
    match request.status {
        UserInputStatus::Pending => Ok(()),
        UserInputStatus::Answered => Err(BrokerError::InvalidState {
            id: request.id,
            status: request.status,
        }),
        UserInputStatus::Expired => Err(BrokerError::Expired {
            id: request.id,
            expires_at: request.expires_at,
        }),
    }
}

fn drop_overdue(requests: Vec<UserInputRequest>, now: DateTime<Utc>) -> Vec<UserInputRequest> {
    requests.into_iter().filter(|r| !r.is_overdue(now)).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use handoff_core::user_input::{
        Answers, CreateUserInputRequest, ToolInput, UserInputStatus,
    };
    use serde_json::json;
    use uuid::Uuid;

    use super::memory::{MemorySessionDirectory, MemoryUserInputStore};
    use super::store::UserInputStore;
    use super::{BrokerError, BrokerService, BrokerSettings, MAX_TOOL_NAME_LEN};

    struct Fixture {
        broker: Arc<BrokerService>,
        sessions: Arc<MemorySessionDirectory>,
        store: Arc<MemoryUserInputStore>,
    }

    fn fixture() -> Fixture {
        let sessions = Arc::new(MemorySessionDirectory::default());
        let store = Arc::new(MemoryUserInputStore::new(sessions.clone()));
        let broker = Arc::new(BrokerService::new(
            store.clone(),
            sessions.clone(),
            BrokerSettings::default(),
        ));
        Fixture {
            broker,
            sessions,
            store,
        }
    }

    fn question() -> ToolInput {
        let mut input = ToolInput::new();
        input.insert("q".to_string(), json!("continue?"));
        input
    }

    fn answer(value: &str) -> Answers {
        let mut answers = Answers::new();
        answers.insert("q".to_string(), value.to_string());
        answers
    }

    fn create_body(session_id: Uuid, expires_in: Option<Duration>) -> CreateUserInputRequest {
        CreateUserInputRequest {
            session_id,
            tool_name: "ask_user".to_string(),
            tool_input: question(),
            expires_at: expires_in.map(|d| Utc::now() + d),
        }
    }

    #[tokio::test]
    async fn created_request_is_pending_without_answers() {
        let fx = fixture();
        let session_id = fx.sessions.add_session(Uuid::now_v7());

        let created = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::hours(1))))
            .await
            .unwrap();

        assert_eq!(created.status, UserInputStatus::Pending);
        assert!(created.answers.is_none());
        assert!(created.answered_at.is_none());
        assert!(created.is_consistent());
        assert_eq!(fx.store.get(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn missing_expiry_gets_default_horizon() {
        let fx = fixture();
        let session_id = fx.sessions.add_session(Uuid::now_v7());

        let created = fx
            .broker
            .create_request(create_body(session_id, None))
            .await
            .unwrap();

        assert_eq!(created.expires_at - created.created_at, Duration::hours(24));
    }

    #[tokio::test]
    async fn create_for_unknown_session_is_not_found() {
        let fx = fixture();
        let missing = Uuid::now_v7();
        let err = fx
            .broker
            .create_request(create_body(missing, None))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::SessionNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn create_rejects_blank_tool_name() {
        let fx = fixture();
        let session_id = fx.sessions.add_session(Uuid::now_v7());
        let mut body = create_body(session_id, None);
        body.tool_name = "   ".to_string();

        let err = fx.broker.create_request(body).await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Validation {
                field: "tool_name",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn create_rejects_nul_anywhere_in_tool_input() {
        let fx = fixture();
        let session_id = fx.sessions.add_session(Uuid::now_v7());

        let mut nested = ToolInput::new();
        nested.insert("choices".to_string(), json!(["ok", {"label": "a\u{0}b"}]));
        let mut bad_key = ToolInput::new();
        bad_key.insert("q\u{0}".to_string(), json!("continue?"));

        for tool_input in [nested, bad_key] {
            let mut body = create_body(session_id, None);
            body.tool_input = tool_input;
            let err = fx.broker.create_request(body).await.unwrap_err();
            assert!(matches!(
                err,
                BrokerError::Validation {
                    field: "tool_input",
                    ..
                }
            ));
        }

        let mut body = create_body(session_id, None);
        body.tool_name = "ask\u{0}user".to_string();
        let err = fx.broker.create_request(body).await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Validation {
                field: "tool_name",
                ..
            }
        ));

        assert!(fx.store.list_pending_by_session(session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tool_name_limit_counts_characters() {
        let fx = fixture();
        let session_id = fx.sessions.add_session(Uuid::now_v7());

        let mut body = create_body(session_id, None);
        body.tool_name = "é".repeat(MAX_TOOL_NAME_LEN);
        assert!(fx.broker.create_request(body).await.is_ok());

        let mut body = create_body(session_id, None);
        body.tool_name = "é".repeat(MAX_TOOL_NAME_LEN + 1);
        let err = fx.broker.create_request(body).await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Validation {
                field: "tool_name",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unrepresentable_default_horizon_is_a_validation_error() {
        let sessions = Arc::new(MemorySessionDirectory::default());
        let store = Arc::new(MemoryUserInputStore::new(sessions.clone()));
        let broker = BrokerService::new(
            store,
            sessions.clone(),
            BrokerSettings {
                default_ttl: Duration::MAX,
            },
        );
        let session_id = sessions.add_session(Uuid::now_v7());

        let err = broker
            .create_request(create_body(session_id, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrokerError::Validation {
                field: "expires_at",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn answer_then_second_answer_conflicts() {
        let fx = fixture();
        let user_id = Uuid::now_v7();
        let session_id = fx.sessions.add_session(user_id);
        let created = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::hours(1))))
            .await
            .unwrap();

        let answered = fx
            .broker
            .answer_request(user_id, created.id, answer("yes"))
            .await
            .unwrap();
        assert_eq!(answered.status, UserInputStatus::Answered);
        assert_eq!(answered.answers, Some(answer("yes")));
        assert!(answered.answered_at.is_some());
        assert!(answered.is_consistent());

        let err = fx
            .broker
            .answer_request(user_id, created.id, answer("no"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrokerError::InvalidState {
                status: UserInputStatus::Answered,
                ..
            }
        ));

        let stored = fx.store.get(created.id).await.unwrap().unwrap();
        assert_eq!(stored.answers, Some(answer("yes")));
    }

    #[tokio::test]
    async fn answering_overdue_request_expires_it() {
        let fx = fixture();
        let user_id = Uuid::now_v7();
        let session_id = fx.sessions.add_session(user_id);
        let created = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::seconds(-1))))
            .await
            .unwrap();

        for _ in 0..2 {
            let err = fx
                .broker
                .answer_request(user_id, created.id, answer("yes"))
                .await
                .unwrap_err();
            assert!(matches!(err, BrokerError::Expired { id, .. } if id == created.id));
        }

        let stored = fx.store.get(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, UserInputStatus::Expired);
        assert!(stored.answers.is_none());
        assert!(stored.is_consistent());
    }

    #[tokio::test]
    async fn foreign_user_cannot_answer() {
        let fx = fixture();
        let owner = Uuid::now_v7();
        let intruder = Uuid::now_v7();
        fx.sessions.add_session(intruder);
        let session_id = fx.sessions.add_session(owner);
        let created = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::hours(1))))
            .await
            .unwrap();

        let err = fx
            .broker
            .answer_request(intruder, created.id, answer("yes"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Forbidden { user_id, .. } if user_id == intruder));

        let stored = fx.store.get(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, UserInputStatus::Pending);
    }

    #[tokio::test]
    async fn answer_for_deleted_session_is_forbidden() {
        let fx = fixture();
        let user_id = Uuid::now_v7();
        let session_id = fx.sessions.add_session(user_id);
        let created = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::hours(1))))
            .await
            .unwrap();
        fx.sessions.remove_session(session_id);

        let err = fx
            .broker
            .answer_request(user_id, created.id, answer("yes"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn answer_unknown_request_is_not_found() {
        let fx = fixture();
        let missing = Uuid::now_v7();
        let err = fx
            .broker
            .answer_request(Uuid::now_v7(), missing, answer("yes"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::RequestNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn empty_answers_are_rejected() {
        let fx = fixture();
        let user_id = Uuid::now_v7();
        let session_id = fx.sessions.add_session(user_id);
        let created = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::hours(1))))
            .await
            .unwrap();

        let err = fx
            .broker
            .answer_request(user_id, created.id, Answers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Validation { field: "answers", .. }));
    }

    #[tokio::test]
    async fn answers_with_nul_are_rejected_and_request_stays_pending() {
        let fx = fixture();
        let user_id = Uuid::now_v7();
        let session_id = fx.sessions.add_session(user_id);
        let created = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::hours(1))))
            .await
            .unwrap();

        let mut bad_key = Answers::new();
        bad_key.insert("q\u{0}".to_string(), "yes".to_string());
        for answers in [answer("a\u{0}b"), bad_key] {
            let err = fx
                .broker
                .answer_request(user_id, created.id, answers)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                BrokerError::Validation {
                    field: "answers",
                    ..
                }
            ));
        }

        let stored = fx.store.get(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, UserInputStatus::Pending);
    }

    #[tokio::test]
    async fn listing_only_returns_callers_pending_requests_oldest_first() {
        let fx = fixture();
        let user_id = Uuid::now_v7();
        let other_user = Uuid::now_v7();
        let first_session = fx.sessions.add_session(user_id);
        let second_session = fx.sessions.add_session(user_id);
        let foreign_session = fx.sessions.add_session(other_user);

        let oldest = fx
            .broker
            .create_request(create_body(first_session, Some(Duration::hours(1))))
            .await
            .unwrap();
        let answered = fx
            .broker
            .create_request(create_body(first_session, Some(Duration::hours(1))))
            .await
            .unwrap();
        let newest = fx
            .broker
            .create_request(create_body(second_session, Some(Duration::hours(1))))
            .await
            .unwrap();
        fx.broker
            .create_request(create_body(first_session, Some(Duration::seconds(-5))))
            .await
            .unwrap();
        fx.broker
            .create_request(create_body(foreign_session, Some(Duration::hours(1))))
            .await
            .unwrap();
        fx.broker
            .answer_request(user_id, answered.id, answer("done"))
            .await
            .unwrap();

        let all = fx.broker.list_pending_for_user(user_id, None).await.unwrap();
        let ids: Vec<Uuid> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![oldest.id, newest.id]);
        assert!(all.iter().all(|r| r.status == UserInputStatus::Pending));

        let scoped = fx
            .broker
            .list_pending_for_user(user_id, Some(second_session))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, newest.id);

        let nobody = fx
            .broker
            .list_pending_for_user(Uuid::now_v7(), None)
            .await
            .unwrap();
        assert!(nobody.is_empty());

        let foreign_scope = fx
            .broker
            .list_pending_for_user(user_id, Some(foreign_session))
            .await
            .unwrap();
        assert!(foreign_scope.is_empty());
    }

    #[tokio::test]
    async fn session_listing_requires_known_session() {
        let fx = fixture();
        let session_id = fx.sessions.add_session(Uuid::now_v7());
        let created = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::hours(1))))
            .await
            .unwrap();

        let pending = fx.broker.list_pending_for_session(session_id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, created.id);

        let err = fx
            .broker
            .list_pending_for_session(Uuid::now_v7())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn get_expires_overdue_request_lazily() {
        let fx = fixture();
        let session_id = fx.sessions.add_session(Uuid::now_v7());
        let created = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::seconds(-1))))
            .await
            .unwrap();
        assert_eq!(created.status, UserInputStatus::Pending);

        let fetched = fx.broker.get_request(created.id).await.unwrap();
        assert_eq!(fetched.status, UserInputStatus::Expired);
        assert!(fetched.updated_at >= created.updated_at);
        assert_eq!(fetched.expires_at, created.expires_at);

        let err = fx.broker.get_request(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, BrokerError::RequestNotFound(_)));
    }

    #[tokio::test]
    async fn sweep_expires_only_overdue_pending_requests() {
        let fx = fixture();
        let user_id = Uuid::now_v7();
        let session_id = fx.sessions.add_session(user_id);
        let overdue = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::seconds(-1))))
            .await
            .unwrap();
        let live = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::hours(1))))
            .await
            .unwrap();
        let answered = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::hours(1))))
            .await
            .unwrap();
        fx.broker
            .answer_request(user_id, answered.id, answer("yes"))
            .await
            .unwrap();

        let swept = fx.broker.expire_overdue(Utc::now()).await.unwrap();
        assert_eq!(swept, 1);

        let status = |id| {
            let store = fx.store.clone();
            async move { store.get(id).await.unwrap().unwrap().status }
        };
        assert_eq!(status(overdue.id).await, UserInputStatus::Expired);
        assert_eq!(status(live.id).await, UserInputStatus::Pending);
        assert_eq!(status(answered.id).await, UserInputStatus::Answered);

        assert_eq!(fx.broker.expire_overdue(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_answers_have_exactly_one_winner() {
        let fx = fixture();
        let user_id = Uuid::now_v7();
        let session_id = fx.sessions.add_session(user_id);
        let created = fx
            .broker
            .create_request(create_body(session_id, Some(Duration::hours(1))))
            .await
            .unwrap();

        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let broker = fx.broker.clone();
                let request_id = created.id;
                tokio::spawn(async move {
                    broker
                        .answer_request(user_id, request_id, answer(&format!("answer-{i}")))
                        .await
                })
            })
            .collect();

        let mut winners = Vec::new();
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(answered) => winners.push(answered),
                Err(BrokerError::InvalidState { status, .. }) => {
                    assert_eq!(status, UserInputStatus::Answered)
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = fx.store.get(created.id).await.unwrap().unwrap();
        assert_eq!(stored.answers, winners[0].answers);
    }
}
