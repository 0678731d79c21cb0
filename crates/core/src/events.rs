use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::domain::agent::HumanAgent;
use crate::domain::handoff::HandoffRequest;

/// Lifecycle notifications from the handoff subsystem. Consumers (admin UI
/// pushers, notification senders) subscribe through an `EventSink` instead of
/// reaching into the service's call graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HandoffEvent {
    Requested { request: HandoffRequest },
    Assigned { request: HandoffRequest, agent: HumanAgent },
    Completed { request: HandoffRequest, resolution: Option<String> },
    AgentRegistered { agent: HumanAgent },
    AgentStatusChanged { agent: HumanAgent },
}

impl HandoffEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Requested { .. } => "handoff.requested",
            Self::Assigned { .. } => "handoff.assigned",
            Self::Completed { .. } => "handoff.completed",
            Self::AgentRegistered { .. } => "agent.registered",
            Self::AgentStatusChanged { .. } => "agent.status_changed",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: HandoffEvent);
}

/// Sink that drops everything. Useful where no consumer is wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: HandoffEvent) {}
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<HandoffEvent>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<HandoffEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: HandoffEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Sink that forwards lifecycle events to structured logs. This is the
/// process-local notification channel; outbound transports (email, chat)
/// subscribe via their own sinks.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: HandoffEvent) {
        match &event {
            HandoffEvent::Requested { request } => tracing::info!(
                event_name = event.name(),
                handoff_id = %request.id.0,
                session_id = %request.session_id.0,
                priority = request.priority.get(),
                estimated_wait_time = request.estimated_wait_time,
                "handoff requested"
            ),
            HandoffEvent::Assigned { request, agent } => tracing::info!(
                event_name = event.name(),
                handoff_id = %request.id.0,
                session_id = %request.session_id.0,
                agent_id = %agent.id.0,
                "handoff assigned"
            ),
            HandoffEvent::Completed { request, resolution } => tracing::info!(
                event_name = event.name(),
                handoff_id = %request.id.0,
                session_id = %request.session_id.0,
                resolution = resolution.as_deref().unwrap_or(""),
                "handoff completed"
            ),
            HandoffEvent::AgentRegistered { agent } => tracing::info!(
                event_name = event.name(),
                agent_id = %agent.id.0,
                agent_status = ?agent.status,
                "human agent registered"
            ),
            HandoffEvent::AgentStatusChanged { agent } => tracing::info!(
                event_name = event.name(),
                agent_id = %agent.id.0,
                agent_status = ?agent.status,
                "human agent status changed"
            ),
        }
    }
}
