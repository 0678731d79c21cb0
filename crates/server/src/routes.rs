use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use helpdesk_agent::{AgentReply, IncomingMessage, SupportOrchestrator};
use helpdesk_core::domain::agent::{AgentStatus, HumanAgent};
use helpdesk_core::domain::handoff::{HandoffRequest, HandoffStatus};
use helpdesk_core::domain::ids::{AgentId, HandoffId, MessageId, SessionId, UserId};
use helpdesk_core::domain::message::ChatMessage;
use helpdesk_core::errors::{ApplicationError, InterfaceError};
use helpdesk_core::handoff::{AcceptError, HandoffService};
use helpdesk_core::memory::{ConversationStore, Feedback};

/// Seam between the HTTP layer and the conversation pipeline, so handlers
/// are testable without a live LLM.
#[async_trait]
pub trait ChatPort: Send + Sync {
    async fn process(&self, incoming: IncomingMessage) -> Result<AgentReply, ApplicationError>;
}

#[async_trait]
impl ChatPort for SupportOrchestrator {
    async fn process(&self, incoming: IncomingMessage) -> Result<AgentReply, ApplicationError> {
        self.process_message(incoming).await
    }
}

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<dyn ChatPort>,
    pub handoff: Arc<HandoffService>,
    pub store: Arc<dyn ConversationStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/sessions/{id}/history", get(session_history))
        .route("/feedback", post(record_feedback))
        .route("/admin/agents", post(register_agent).get(list_agents))
        .route("/admin/agents/{id}/status", patch(update_agent_status))
        .route("/admin/queue", get(pending_queue))
        .route("/admin/handoffs/{id}", get(handoff_by_id))
        .route("/admin/handoffs/{id}/accept", post(accept_handoff))
        .route("/admin/handoffs/{id}/complete", post(complete_handoff))
        .route("/admin/sessions/{id}/handoff", get(handoff_by_session))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub message: String,
    pub needs_human_intervention: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_time: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub id: String,
    pub name: String,
    #[serde(default = "default_agent_status")]
    pub status: AgentStatus,
}

fn default_agent_status() -> AgentStatus {
    AgentStatus::Offline
}

#[derive(Debug, Deserialize)]
pub struct UpdateAgentStatusRequest {
    pub status: AgentStatus,
}

#[derive(Debug, Serialize)]
pub struct AgentDto {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_session_id: Option<String>,
    pub last_activity: DateTime<Utc>,
}

impl From<HumanAgent> for AgentDto {
    fn from(agent: HumanAgent) -> Self {
        Self {
            id: agent.id.0,
            name: agent.name,
            status: agent.status,
            active_session_id: agent.active_session_id.map(|session| session.0),
            last_activity: agent.last_activity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HandoffDto {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub reason: String,
    pub priority: u8,
    pub status: HandoffStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    pub estimated_wait_time: u32,
    pub conversation_history: Vec<ChatMessage>,
}

impl From<HandoffRequest> for HandoffDto {
    fn from(request: HandoffRequest) -> Self {
        Self {
            id: request.id.0,
            session_id: request.session_id.0,
            user_id: request.user_id.0,
            reason: request.reason,
            priority: request.priority.get(),
            status: request.status,
            timestamp: request.timestamp,
            assigned_agent: request.assigned_agent.map(|agent| agent.0),
            estimated_wait_time: request.estimated_wait_time,
            conversation_history: request.conversation_history,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AcceptHandoffRequest {
    pub agent_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub session_id: String,
    pub message_id: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteHandoffRequest {
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompleteHandoffResponse {
    pub completed: bool,
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let reply = state
        .chat
        .process(IncomingMessage {
            session_id: SessionId(request.session_id),
            user_id: UserId(request.user_id),
            content: request.message,
        })
        .await
        .map_err(|error| {
            tracing::error!(error = %error, correlation_id = %correlation_id, "chat turn failed");
            interface_error(error.into_interface(correlation_id))
        })?;

    Ok(Json(ChatResponse {
        id: reply.id.0,
        message: reply.message,
        needs_human_intervention: reply.needs_human_intervention,
        confidence_score: reply.confidence_score,
        handoff_id: reply.handoff_id.map(|id| id.0),
        handoff_reason: reply.handoff_reason,
        estimated_wait_time: reply.estimated_wait_time,
    }))
}

async fn register_agent(
    State(state): State<AppState>,
    Json(request): Json<RegisterAgentRequest>,
) -> (StatusCode, Json<AgentDto>) {
    let agent =
        state.handoff.register_agent(AgentId(request.id), request.name, request.status);
    (StatusCode::CREATED, Json(agent.into()))
}

async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentDto>> {
    Json(state.handoff.agents().into_iter().map(AgentDto::from).collect())
}

async fn update_agent_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateAgentStatusRequest>,
) -> Result<Json<AgentDto>, (StatusCode, Json<ErrorBody>)> {
    state
        .handoff
        .update_agent_status(&AgentId(id.clone()), request.status)
        .map(|agent| Json(agent.into()))
        .ok_or_else(|| not_found(format!("agent `{id}` is not registered")))
}

async fn pending_queue(State(state): State<AppState>) -> Json<Vec<HandoffDto>> {
    Json(state.handoff.pending().into_iter().map(HandoffDto::from).collect())
}

async fn handoff_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HandoffDto>, (StatusCode, Json<ErrorBody>)> {
    state
        .handoff
        .get(&HandoffId(id.clone()))
        .map(|request| Json(request.into()))
        .ok_or_else(|| not_found(format!("handoff `{id}` was not found")))
}

async fn handoff_by_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HandoffDto>, (StatusCode, Json<ErrorBody>)> {
    state
        .handoff
        .get_by_session(&SessionId(id.clone()))
        .map(|request| Json(request.into()))
        .ok_or_else(|| not_found(format!("session `{id}` has no handoff request")))
}

async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let history = state.store.history(&SessionId(id)).await.map_err(|error| {
        interface_error(
            ApplicationError::Persistence(error.to_string()).into_interface(correlation_id),
        )
    })?;
    Ok(Json(HistoryResponse { history }))
}

async fn record_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, (StatusCode, Json<ErrorBody>)> {
    if !(1..=5).contains(&request.rating) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "rating must be between 1 and 5".to_string(),
                correlation_id: Uuid::new_v4().to_string(),
            }),
        ));
    }

    let correlation_id = Uuid::new_v4().to_string();
    state
        .store
        .record_feedback(Feedback {
            session_id: SessionId(request.session_id),
            message_id: MessageId(request.message_id),
            rating: request.rating,
            comment: request.comment,
            timestamp: Utc::now(),
        })
        .await
        .map_err(|error| {
            interface_error(
                ApplicationError::Persistence(error.to_string()).into_interface(correlation_id),
            )
        })?;

    Ok(Json(FeedbackResponse { success: true }))
}

async fn accept_handoff(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AcceptHandoffRequest>,
) -> Result<Json<HandoffDto>, (StatusCode, Json<ErrorBody>)> {
    state
        .handoff
        .accept(&HandoffId(id), &AgentId(request.agent_id))
        .map(|accepted| Json(accepted.into()))
        .map_err(|error| {
            let status = match error {
                AcceptError::UnknownHandoff | AcceptError::UnknownAgent => StatusCode::NOT_FOUND,
                AcceptError::AssignedToOther | AcceptError::AlreadyCompleted => {
                    StatusCode::BAD_REQUEST
                }
            };
            (
                status,
                Json(ErrorBody {
                    error: error.to_string(),
                    correlation_id: Uuid::new_v4().to_string(),
                }),
            )
        })
}

async fn complete_handoff(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CompleteHandoffRequest>>,
) -> Result<Json<CompleteHandoffResponse>, (StatusCode, Json<ErrorBody>)> {
    let resolution = body.and_then(|Json(request)| request.resolution);
    if state.handoff.complete(&HandoffId(id.clone()), resolution.as_deref()) {
        Ok(Json(CompleteHandoffResponse { completed: true }))
    } else {
        Err(not_found(format!("handoff `{id}` is unknown or already completed")))
    }
}

fn not_found(message: String) -> (StatusCode, Json<ErrorBody>) {
    interface_error(InterfaceError::not_found(message, Uuid::new_v4().to_string()))
}

fn interface_error(error: InterfaceError) -> (StatusCode, Json<ErrorBody>) {
    let (status, correlation_id) = match &error {
        InterfaceError::BadRequest { correlation_id, .. } => {
            (StatusCode::BAD_REQUEST, correlation_id.clone())
        }
        InterfaceError::NotFound { correlation_id, .. } => {
            (StatusCode::NOT_FOUND, correlation_id.clone())
        }
        InterfaceError::ServiceUnavailable { correlation_id, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, correlation_id.clone())
        }
        InterfaceError::Internal { correlation_id, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, correlation_id.clone())
        }
    };
    (status, Json(ErrorBody { error: error.user_message().to_string(), correlation_id }))
}
