use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{AgentId, HandoffId, SessionId, UserId};
use crate::domain::message::ChatMessage;
use crate::errors::DomainError;

/// Urgency rank in 1..=5, 5 most urgent. Out-of-range values are clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(1);
    pub const NORMAL: Priority = Priority(3);
    pub const ELEVATED: Priority = Priority(4);
    pub const MAX: Priority = Priority(5);

    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 5))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Assigned,
    Completed,
}

impl HandoffStatus {
    /// Assigned and Pending → Completed are both legal; Completed is terminal.
    pub fn can_transition_to(self, next: HandoffStatus) -> bool {
        matches!(
            (self, next),
            (HandoffStatus::Pending, HandoffStatus::Assigned)
                | (HandoffStatus::Pending, HandoffStatus::Completed)
                | (HandoffStatus::Assigned, HandoffStatus::Completed)
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, HandoffStatus::Pending | HandoffStatus::Assigned)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub id: HandoffId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub reason: String,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    pub status: HandoffStatus,
    pub conversation_history: Vec<ChatMessage>,
    pub assigned_agent: Option<AgentId>,
    /// Minutes, frozen at creation time. Not refreshed while the request waits.
    pub estimated_wait_time: u32,
}

impl HandoffRequest {
    pub fn transition_to(&mut self, next: HandoffStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidHandoffTransition { from: self.status, to: next });
        }
        self.status = next;
        Ok(())
    }
}
