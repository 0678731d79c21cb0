pub mod wait_time;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::{AgentStatus, HumanAgent};
use crate::domain::handoff::{HandoffRequest, HandoffStatus, Priority};
use crate::domain::ids::{AgentId, HandoffId, SessionId, UserId};
use crate::domain::message::ChatMessage;
use crate::events::{EventSink, HandoffEvent};
use crate::handoff::wait_time::estimate_wait;

pub const AGENT_ASSIGNED_MESSAGE: &str =
    "A support agent has been assigned to your case and will respond shortly.";

#[derive(Clone, Debug)]
pub struct HandoffSettings {
    /// Baseline wait estimate in minutes.
    pub default_wait_time: u32,
    /// User-facing template; `{wait_time}` is replaced with the estimate.
    pub wait_time_message: String,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            default_wait_time: 5,
            wait_time_message:
                "A support agent will be with you shortly. The current estimated wait time is {wait_time} minutes."
                    .to_string(),
        }
    }
}

/// Input for `request_handoff`. The conversation history is snapshotted here
/// and handed to the assigned agent as-is.
#[derive(Clone, Debug)]
pub struct HandoffTicket {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub reason: String,
    pub conversation_history: Vec<ChatMessage>,
    pub priority: Priority,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandoffReceipt {
    pub handoff_id: HandoffId,
    pub status: HandoffStatus,
    pub estimated_wait_time: u32,
    pub message: String,
}

/// Failure modes of an operator explicitly accepting a request.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AcceptError {
    #[error("handoff request was not found")]
    UnknownHandoff,
    #[error("agent is not registered")]
    UnknownAgent,
    #[error("handoff is already assigned to another agent")]
    AssignedToOther,
    #[error("handoff is already completed")]
    AlreadyCompleted,
}

#[derive(Default)]
struct QueueState {
    /// Kept sorted: priority descending, then timestamp ascending.
    queue: Vec<HandoffRequest>,
    /// Registration order; assignment scans this in order.
    agents: Vec<HumanAgent>,
    /// session id -> handoff id for the session's most recent request.
    session_index: HashMap<String, String>,
}

/// Owns the handoff queue, the human-agent registry, and the session index.
/// Every public operation takes the lock once, so each is a single atomic
/// step with respect to the others. Constructed once per process and shared
/// by handle.
pub struct HandoffService {
    settings: HandoffSettings,
    events: Arc<dyn EventSink>,
    state: Mutex<QueueState>,
}

impl HandoffService {
    pub fn new(settings: HandoffSettings, events: Arc<dyn EventSink>) -> Self {
        Self { settings, events, state: Mutex::new(QueueState::default()) }
    }

    /// Queue a request for a human agent, or return the session's existing
    /// active request unchanged. Attempts an immediate assignment before
    /// returning, so the receipt may already be `Assigned`.
    pub fn request_handoff(&self, ticket: HandoffTicket) -> HandoffReceipt {
        let mut pending_events = Vec::new();

        let receipt = {
            let mut state = self.lock_state();

            if let Some(existing) = active_request_for_session(&state, &ticket.session_id) {
                let message = match existing.status {
                    HandoffStatus::Assigned => AGENT_ASSIGNED_MESSAGE.to_string(),
                    _ => self.wait_message(existing.estimated_wait_time),
                };
                return HandoffReceipt {
                    handoff_id: existing.id.clone(),
                    status: existing.status,
                    estimated_wait_time: existing.estimated_wait_time,
                    message,
                };
            }

            let pending_count =
                state.queue.iter().filter(|r| r.status == HandoffStatus::Pending).count();
            let available_agents = state.agents.iter().filter(|a| a.is_available()).count();
            let estimated_wait_time = estimate_wait(
                ticket.priority,
                pending_count,
                available_agents,
                self.settings.default_wait_time,
            );

            let request = HandoffRequest {
                id: HandoffId(Uuid::new_v4().to_string()),
                session_id: ticket.session_id.clone(),
                user_id: ticket.user_id,
                reason: ticket.reason,
                priority: ticket.priority,
                timestamp: Utc::now(),
                status: HandoffStatus::Pending,
                conversation_history: ticket.conversation_history,
                assigned_agent: None,
                estimated_wait_time,
            };

            let handoff_id = request.id.clone();
            state.session_index.insert(ticket.session_id.0.clone(), handoff_id.0.clone());
            pending_events.push(HandoffEvent::Requested { request: request.clone() });
            state.queue.push(request);
            sort_queue(&mut state.queue);

            if let Some(event) = try_assign(&mut state) {
                pending_events.push(event);
            }

            let status = state
                .queue
                .iter()
                .find(|r| r.id == handoff_id)
                .map(|r| r.status)
                .unwrap_or(HandoffStatus::Pending);

            HandoffReceipt {
                handoff_id,
                status,
                estimated_wait_time,
                message: self.wait_message(estimated_wait_time),
            }
        };

        self.flush(pending_events);
        receipt
    }

    pub fn get(&self, id: &HandoffId) -> Option<HandoffRequest> {
        let state = self.lock_state();
        state.queue.iter().find(|r| &r.id == id).cloned()
    }

    pub fn get_by_session(&self, session_id: &SessionId) -> Option<HandoffRequest> {
        let state = self.lock_state();
        let handoff_id = state.session_index.get(&session_id.0)?;
        state.queue.iter().find(|r| r.id.0 == *handoff_id).cloned()
    }

    /// Pending requests in service order (priority desc, then FIFO).
    pub fn pending(&self) -> Vec<HandoffRequest> {
        let state = self.lock_state();
        state.queue.iter().filter(|r| r.status == HandoffStatus::Pending).cloned().collect()
    }

    /// Operator accept: pair a specific request with a specific agent,
    /// bypassing queue order. The agent goes `Busy` and the request
    /// `Assigned` in one atomic step; accepting a request already assigned
    /// to the same agent is a no-op success.
    pub fn accept(
        &self,
        id: &HandoffId,
        agent_id: &AgentId,
    ) -> Result<HandoffRequest, AcceptError> {
        let mut pending_events = Vec::new();

        let accepted = {
            let mut state = self.lock_state();

            let Some(request_index) = state.queue.iter().position(|r| &r.id == id) else {
                return Err(AcceptError::UnknownHandoff);
            };
            let Some(agent_index) = state.agents.iter().position(|a| &a.id == agent_id) else {
                return Err(AcceptError::UnknownAgent);
            };

            match state.queue[request_index].status {
                HandoffStatus::Completed => return Err(AcceptError::AlreadyCompleted),
                HandoffStatus::Assigned => {
                    let request = state.queue[request_index].clone();
                    return if request.assigned_agent.as_ref() == Some(agent_id) {
                        Ok(request)
                    } else {
                        Err(AcceptError::AssignedToOther)
                    };
                }
                HandoffStatus::Pending => {}
            }

            let session_id = state.queue[request_index].session_id.clone();
            let request = &mut state.queue[request_index];
            request.assigned_agent = Some(agent_id.clone());
            request.status = HandoffStatus::Assigned;
            let snapshot = request.clone();

            let agent = &mut state.agents[agent_index];
            agent.status = AgentStatus::Busy;
            agent.active_session_id = Some(session_id);
            agent.last_activity = Utc::now();

            pending_events
                .push(HandoffEvent::Assigned { request: snapshot.clone(), agent: agent.clone() });
            snapshot
        };

        self.flush(pending_events);
        Ok(accepted)
    }

    /// Complete a handoff and free its agent. Unknown or already-completed
    /// ids return false without touching any agent.
    pub fn complete(&self, id: &HandoffId, resolution: Option<&str>) -> bool {
        let mut pending_events = Vec::new();

        let completed = {
            let mut state = self.lock_state();

            let Some(index) = state.queue.iter().position(|r| &r.id == id) else {
                return false;
            };
            if state.queue[index].status == HandoffStatus::Completed {
                return false;
            }

            state.queue[index].status = HandoffStatus::Completed;
            let request = state.queue[index].clone();

            if let Some(agent_id) = request.assigned_agent.clone() {
                if let Some(agent) = state.agents.iter_mut().find(|a| a.id == agent_id) {
                    agent.status = AgentStatus::Available;
                    agent.active_session_id = None;
                    agent.last_activity = Utc::now();
                }
            }

            pending_events.push(HandoffEvent::Completed {
                request,
                resolution: resolution.map(str::to_string),
            });

            if let Some(event) = try_assign(&mut state) {
                pending_events.push(event);
            }

            true
        };

        self.flush(pending_events);
        completed
    }

    /// Register or update a human agent. Registering with `Available` status
    /// immediately tries to drain the queue.
    pub fn register_agent(
        &self,
        id: AgentId,
        name: impl Into<String>,
        status: AgentStatus,
    ) -> HumanAgent {
        let mut pending_events = Vec::new();

        let agent = {
            let mut state = self.lock_state();

            let agent = match state.agents.iter_mut().find(|a| a.id == id) {
                Some(existing) => {
                    existing.name = name.into();
                    existing.status = status;
                    existing.last_activity = Utc::now();
                    existing.clone()
                }
                None => {
                    let agent = HumanAgent::new(id, name, status);
                    state.agents.push(agent.clone());
                    agent
                }
            };

            pending_events.push(HandoffEvent::AgentRegistered { agent: agent.clone() });

            if agent.is_available() {
                if let Some(event) = try_assign(&mut state) {
                    pending_events.push(event);
                }
            }

            agent
        };

        self.flush(pending_events);
        agent
    }

    /// Update an agent's availability. Returns None for unknown agents.
    /// Transitioning to `Available` triggers an assignment attempt.
    pub fn update_agent_status(&self, id: &AgentId, status: AgentStatus) -> Option<HumanAgent> {
        let mut pending_events = Vec::new();

        let updated = {
            let mut state = self.lock_state();

            let agent = state.agents.iter_mut().find(|a| &a.id == id)?;
            agent.status = status;
            if status != AgentStatus::Busy {
                agent.active_session_id = None;
            }
            agent.last_activity = Utc::now();
            let snapshot = agent.clone();

            pending_events.push(HandoffEvent::AgentStatusChanged { agent: snapshot.clone() });

            if status == AgentStatus::Available {
                if let Some(event) = try_assign(&mut state) {
                    pending_events.push(event);
                }
            }

            Some(snapshot)
        };

        self.flush(pending_events);
        updated
    }

    pub fn agents(&self) -> Vec<HumanAgent> {
        let state = self.lock_state();
        state.agents.clone()
    }

    fn wait_message(&self, minutes: u32) -> String {
        self.settings.wait_time_message.replace("{wait_time}", &minutes.to_string())
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn flush(&self, events: Vec<HandoffEvent>) {
        for event in events {
            self.events.emit(event);
        }
    }
}

fn active_request_for_session<'a>(
    state: &'a QueueState,
    session_id: &SessionId,
) -> Option<&'a HandoffRequest> {
    let handoff_id = state.session_index.get(&session_id.0)?;
    state.queue.iter().find(|r| r.id.0 == *handoff_id && r.status.is_active())
}

/// Priority descending, then timestamp ascending. The sort is stable, so two
/// requests at the same priority keep submission order.
fn sort_queue(queue: &mut [HandoffRequest]) {
    queue.sort_by(|a, b| {
        b.priority.cmp(&a.priority).then_with(|| a.timestamp.cmp(&b.timestamp))
    });
}

/// Pair the first available agent (registration order) with the first
/// pending request (queue order). One pairing per invocation; callers
/// re-invoke after any state change that adds capacity or demand.
fn try_assign(state: &mut QueueState) -> Option<HandoffEvent> {
    let agent_index = state.agents.iter().position(|a| a.is_available())?;
    let request_index = state.queue.iter().position(|r| r.status == HandoffStatus::Pending)?;

    let agent_id = state.agents[agent_index].id.clone();
    let session_id = state.queue[request_index].session_id.clone();

    let request = &mut state.queue[request_index];
    request.assigned_agent = Some(agent_id);
    request.status = HandoffStatus::Assigned;
    let request_snapshot = request.clone();

    let agent = &mut state.agents[agent_index];
    agent.status = AgentStatus::Busy;
    agent.active_session_id = Some(session_id);
    agent.last_activity = Utc::now();

    Some(HandoffEvent::Assigned { request: request_snapshot, agent: agent.clone() })
}
