use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handoff_core::user_input::{UserInputRequest, UserInputRequestPatch};
use sqlx::PgPool;
use uuid::Uuid;

use super::store::{SessionDirectory, UserInputStore};
use crate::repository;

/// `UserInputStore` over Postgres. Owns the transaction boundary of every call.
#[derive(Clone)]
pub struct PgUserInputStore {
    pool: PgPool,
}

impl PgUserInputStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserInputStore for PgUserInputStore {
    async fn insert(&self, request: &UserInputRequest) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        repository::create(&mut tx, request).await?;
        tx.commit().await
    }

    async fn get(&self, id: Uuid) -> Result<Option<UserInputRequest>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        repository::get_by_id(&mut conn, id).await
    }

    async fn list_pending_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<UserInputRequest>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        repository::list_pending_by_session(&mut conn, session_id).await
    }

    async fn list_pending_by_user(
        &self,
        user_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<Vec<UserInputRequest>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        repository::list_pending_by_user(&mut conn, user_id, session_id).await
    }

    async fn apply_if_pending(
        &self,
        id: Uuid,
        patch: &UserInputRequestPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<UserInputRequest>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let updated = repository::update_if_pending(&mut tx, id, patch, now).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let expired = repository::expire_overdue(&mut tx, now).await?;
        tx.commit().await?;
        Ok(expired)
    }
}

/// Reads session ownership from the session service's `agent_sessions` table.
#[derive(Clone)]
pub struct PgSessionDirectory {
    pool: PgPool,
}

impl PgSessionDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionDirectory for PgSessionDirectory {
    async fn owner_of(&self, session_id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        repository::session_owner(&mut conn, session_id).await
    }
}
