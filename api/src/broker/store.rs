use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handoff_core::user_input::{UserInputRequest, UserInputRequestPatch};
use uuid::Uuid;

/// Persistence seam for user input requests.
///
/// Each call is its own unit of work: implementations commit before returning
/// and never leave a partial write behind.
#[async_trait]
pub trait UserInputStore: Send + Sync {
    async fn insert(&self, request: &UserInputRequest) -> Result<(), sqlx::Error>;

    async fn get(&self, id: Uuid) -> Result<Option<UserInputRequest>, sqlx::Error>;

    /// Pending requests of one session, oldest first.
    async fn list_pending_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<UserInputRequest>, sqlx::Error>;

    /// Pending requests across every session owned by `user_id`, oldest first.
    async fn list_pending_by_user(
        &self,
        user_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<Vec<UserInputRequest>, sqlx::Error>;

    /// Compare-and-swap on `status = pending`.
    ///
    /// Returns the updated request, or `None` when the request is missing or
    /// has already left `pending`.
    async fn apply_if_pending(
        &self,
        id: Uuid,
        patch: &UserInputRequestPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<UserInputRequest>, sqlx::Error>;

    /// Moves every pending request whose deadline is before `now` to `expired`.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error>;
}

/// Read-only view of agent sessions, owned by the session service.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Owning user of a live session, `None` if it does not exist.
    async fn owner_of(&self, session_id: Uuid) -> Result<Option<Uuid>, sqlx::Error>;
}
