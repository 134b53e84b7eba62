use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Answers keyed by the input field they respond to.
pub type Answers = BTreeMap<String, String>;

/// Structured payload describing what the agent is asking.
pub type ToolInput = serde_json::Map<String, serde_json::Value>;

/// Lifecycle of a user input request.
///
/// `Pending` is the only non-terminal state. `Answered` and `Expired` never
/// transition anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserInputStatus {
    Pending,
    Answered,
    Expired,
}

impl UserInputStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Answered => "answered",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Answered) | (Self::Pending, Self::Expired)
        )
    }
}

impl fmt::Display for UserInputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown user input request status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for UserInputStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "answered" => Ok(Self::Answered),
            "expired" => Ok(Self::Expired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One question posed to a human on behalf of an agent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserInputRequest {
    /// Request ID (UUIDv7)
    pub id: Uuid,
    /// Owning agent session
    pub session_id: Uuid,
    /// Agent tool that triggered the request
    pub tool_name: String,
    /// What is being asked; shape is defined by the tool
    #[schema(value_type = Object)]
    pub tool_input: ToolInput,
    pub status: UserInputStatus,
    /// Present only once the request has been answered
    pub answers: Option<Answers>,
    /// Absolute deadline, immutable after creation
    pub expires_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserInputRequest {
    pub fn new_pending(
        session_id: Uuid,
        tool_name: String,
        tool_input: ToolInput,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            tool_name,
            tool_input,
            status: UserInputStatus::Pending,
            answers: None,
            expires_at,
            answered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True once the deadline has passed, regardless of the stored status.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// `answered_at` and a non-empty `answers` map exist exactly when answered.
    pub fn is_consistent(&self) -> bool {
        let answered = self.status == UserInputStatus::Answered;
        let has_answers = self.answers.as_ref().is_some_and(|a| !a.is_empty());
        answered == self.answered_at.is_some() && answered == has_answers
    }
}

/// Body of `POST /api/v1/internal/user-input-requests`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserInputRequest {
    pub session_id: Uuid,
    pub tool_name: String,
    #[schema(value_type = Object)]
    pub tool_input: ToolInput,
    /// Defaults to the server's configured horizon when omitted
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/v1/user-input-requests/{id}/answer`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnswerUserInputRequest {
    pub answers: Answers,
}

/// A patch field with an explicit presence flag.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Unchanged,
    Set(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Unchanged
    }
}

impl<T> Field<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Unchanged => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("cannot move user input request from {from} to {to}")]
pub struct TransitionError {
    pub from: UserInputStatus,
    pub to: UserInputStatus,
}

/// Mutation of a user input request. Only fields marked `Set` are written.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserInputRequestPatch {
    pub status: Field<UserInputStatus>,
    pub answers: Field<Option<Answers>>,
    pub answered_at: Field<Option<DateTime<Utc>>>,
}

impl UserInputRequestPatch {
    pub fn answered(answers: Answers, at: DateTime<Utc>) -> Self {
        Self {
            status: Field::Set(UserInputStatus::Answered),
            answers: Field::Set(Some(answers)),
            answered_at: Field::Set(Some(at)),
        }
    }

    pub fn expired() -> Self {
        Self {
            status: Field::Set(UserInputStatus::Expired),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.status.is_set() && !self.answers.is_set() && !self.answered_at.is_set()
    }

    /// Merge the set fields into `request` and refresh `updated_at`.
    ///
    /// Fails without touching `request` if the patch moves the status along
    /// an edge the state machine does not allow.
    pub fn apply_to(
        &self,
        request: &mut UserInputRequest,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if let Field::Set(next) = self.status {
            if !request.status.can_transition_to(next) {
                return Err(TransitionError {
                    from: request.status,
                    to: next,
                });
            }
        }
        if self.is_empty() {
            return Ok(());
        }

        if let Field::Set(next) = self.status {
            request.status = next;
        }
        if let Field::Set(answers) = &self.answers {
            request.answers = answers.clone();
        }
        if let Field::Set(answered_at) = self.answered_at {
            request.answered_at = answered_at;
        }
        request.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn pending(now: DateTime<Utc>) -> UserInputRequest {
        let mut input = ToolInput::new();
        input.insert("q".to_string(), json!("continue?"));
        UserInputRequest::new_pending(
            Uuid::now_v7(),
            "ask_user".to_string(),
            input,
            now + Duration::hours(1),
            now,
        )
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            UserInputStatus::Pending,
            UserInputStatus::Answered,
            UserInputStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<UserInputStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<UserInputStatus>().is_err());
    }

    #[test]
    fn only_pending_has_outgoing_transitions() {
        use UserInputStatus::*;
        assert!(Pending.can_transition_to(Answered));
        assert!(Pending.can_transition_to(Expired));
        assert!(!Pending.can_transition_to(Pending));
        for terminal in [Answered, Expired] {
            assert!(terminal.is_terminal());
            for next in [Pending, Answered, Expired] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn new_request_is_pending_without_answers() {
        let now = Utc::now();
        let request = pending(now);
        assert_eq!(request.status, UserInputStatus::Pending);
        assert!(request.answers.is_none());
        assert!(request.answered_at.is_none());
        assert_eq!(request.created_at, request.updated_at);
        assert!(request.is_consistent());
    }

    #[test]
    fn answered_patch_sets_answers_and_timestamp() {
        let now = Utc::now();
        let mut request = pending(now);
        let later = now + Duration::minutes(5);
        let mut answers = Answers::new();
        answers.insert("q".to_string(), "yes".to_string());

        UserInputRequestPatch::answered(answers.clone(), later)
            .apply_to(&mut request, later)
            .unwrap();

        assert_eq!(request.status, UserInputStatus::Answered);
        assert_eq!(request.answers, Some(answers));
        assert_eq!(request.answered_at, Some(later));
        assert_eq!(request.updated_at, later);
        assert!(request.is_consistent());
    }

    #[test]
    fn patch_refuses_to_leave_terminal_state() {
        let now = Utc::now();
        let mut request = pending(now);
        UserInputRequestPatch::expired()
            .apply_to(&mut request, now)
            .unwrap();
        let snapshot = request.clone();

        let err = UserInputRequestPatch::answered(Answers::new(), now)
            .apply_to(&mut request, now + Duration::seconds(1))
            .unwrap_err();

        assert_eq!(err.from, UserInputStatus::Expired);
        assert_eq!(err.to, UserInputStatus::Answered);
        assert_eq!(request, snapshot);
    }

    #[test]
    fn empty_patch_leaves_updated_at_alone() {
        let now = Utc::now();
        let mut request = pending(now);
        UserInputRequestPatch::default()
            .apply_to(&mut request, now + Duration::hours(2))
            .unwrap();
        assert_eq!(request.updated_at, now);
    }

    #[test]
    fn serialized_shape_keeps_absent_answers_as_null() {
        let request = pending(Utc::now());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["status"], "pending");
        assert!(value["answers"].is_null());
        assert!(value["answered_at"].is_null());
        assert_eq!(value["tool_input"]["q"], "continue?");
    }

    #[test]
    fn create_body_accepts_missing_expiry() {
        let body: CreateUserInputRequest = serde_json::from_value(json!({
            "session_id": Uuid::now_v7(),
            "tool_name": "ask_user",
            "tool_input": {"q": "continue?"}
        }))
        .unwrap();
        assert!(body.expires_at.is_none());
    }

    #[test]
    fn create_body_rejects_non_object_tool_input() {
        let result = serde_json::from_value::<CreateUserInputRequest>(json!({
            "session_id": Uuid::now_v7(),
            "tool_name": "ask_user",
            "tool_input": ["not", "an", "object"]
        }));
        assert!(result.is_err());
    }
}
