use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(type_name = "friend_event_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FriendEventType {
    FriendAdd,
    FriendRemove,
    ScoreUp,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FriendEventDlqEntity {
    pub id: Uuid,
    pub event_type: FriendEventType,
    pub member_id: Uuid,
    pub target_id: Uuid,
    pub score_delta: Option<f64>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
}

impl FriendEventDlqEntity {
    /// Unordered pair key; events for the same pair must replay in enqueue order.
    pub fn pair(&self) -> (Uuid, Uuid) {
        if self.member_id <= self.target_id {
            (self.member_id, self.target_id)
        } else {
            (self.target_id, self.member_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFriendEvent {
    pub event_type: FriendEventType,
    pub member_id: Uuid,
    pub target_id: Uuid,
    pub score_delta: Option<f64>,
}

impl NewFriendEvent {
    pub fn friend_add(member_id: Uuid, target_id: Uuid) -> Self {
        Self { event_type: FriendEventType::FriendAdd, member_id, target_id, score_delta: None }
    }

    pub fn friend_remove(member_id: Uuid, target_id: Uuid) -> Self {
        Self { event_type: FriendEventType::FriendRemove, member_id, target_id, score_delta: None }
    }

    pub fn score_up(member_id: Uuid, target_id: Uuid, delta: f64) -> Self {
        Self {
            event_type: FriendEventType::ScoreUp,
            member_id,
            target_id,
            score_delta: Some(delta),
        }
    }
}
