//! In-process store and session directory used by the broker and route tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handoff_core::user_input::{UserInputRequest, UserInputRequestPatch, UserInputStatus};
use uuid::Uuid;

use super::store::{SessionDirectory, UserInputStore};

#[derive(Default)]
pub struct MemorySessionDirectory {
    owners: Mutex<HashMap<Uuid, Uuid>>,
}

impl MemorySessionDirectory {
    /// Registers a session owned by `user_id` and returns its id.
    pub fn add_session(&self, user_id: Uuid) -> Uuid {
        let session_id = Uuid::now_v7();
        self.owners.lock().unwrap().insert(session_id, user_id);
        session_id
    }

    pub fn remove_session(&self, session_id: Uuid) {
        self.owners.lock().unwrap().remove(&session_id);
    }

    fn owner(&self, session_id: Uuid) -> Option<Uuid> {
        self.owners.lock().unwrap().get(&session_id).copied()
    }
}

#[async_trait]
impl SessionDirectory for MemorySessionDirectory {
    async fn owner_of(&self, session_id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
        Ok(self.owner(session_id))
    }
}

pub struct MemoryUserInputStore {
    rows: Mutex<HashMap<Uuid, UserInputRequest>>,
    sessions: Arc<MemorySessionDirectory>,
}

impl MemoryUserInputStore {
    pub fn new(sessions: Arc<MemorySessionDirectory>) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            sessions,
        }
    }

    fn pending_where(&self, keep: impl Fn(&UserInputRequest) -> bool) -> Vec<UserInputRequest> {
        let mut pending: Vec<UserInputRequest> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == UserInputStatus::Pending && keep(r))
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.created_at, r.id));
        pending
    }
}

#[async_trait]
impl UserInputStore for MemoryUserInputStore {
    async fn insert(&self, request: &UserInputRequest) -> Result<(), sqlx::Error> {
        self.rows
            .lock()
            .unwrap()
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<UserInputRequest>, sqlx::Error> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn list_pending_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<UserInputRequest>, sqlx::Error> {
        Ok(self.pending_where(|r| r.session_id == session_id))
    }

    async fn list_pending_by_user(
        &self,
        user_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<Vec<UserInputRequest>, sqlx::Error> {
        Ok(self.pending_where(|r| {
            self.sessions.owner(r.session_id) == Some(user_id)
                && session_id.is_none_or(|sid| sid == r.session_id)
        }))
    }

    async fn apply_if_pending(
        &self,
        id: Uuid,
        patch: &UserInputRequestPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<UserInputRequest>, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        let Some(request) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if request.status != UserInputStatus::Pending {
            return Ok(None);
        }
        if patch.apply_to(request, now).is_err() {
            return Ok(None);
        }
        Ok(Some(request.clone()))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let mut expired = 0;
        for request in self.rows.lock().unwrap().values_mut() {
            if request.status == UserInputStatus::Pending
                && request.expires_at < now
                && UserInputRequestPatch::expired()
                    .apply_to(request, now)
                    .is_ok()
            {
                expired += 1;
            }
        }
        Ok(expired)
    }
}
