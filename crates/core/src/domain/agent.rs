use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{AgentId, SessionId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Available,
    Busy,
    Offline,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HumanAgent {
    pub id: AgentId,
    pub name: String,
    pub status: AgentStatus,
    pub active_session_id: Option<SessionId>,
    pub last_activity: DateTime<Utc>,
}

impl HumanAgent {
    pub fn new(id: AgentId, name: impl Into<String>, status: AgentStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            active_session_id: None,
            last_activity: Utc::now(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Available
    }
}
