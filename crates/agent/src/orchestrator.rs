use std::sync::Arc;

use helpdesk_core::config::AppConfig;
use helpdesk_core::domain::handoff::{HandoffRequest, HandoffStatus, Priority};
use helpdesk_core::domain::ids::{HandoffId, MessageId, SessionId, UserId};
use helpdesk_core::domain::message::{ChatMessage, MessageMetadata, MessageRole, ToolCallRecord};
use helpdesk_core::errors::ApplicationError;
use helpdesk_core::handoff::{HandoffService, HandoffTicket, AGENT_ASSIGNED_MESSAGE};
use helpdesk_core::memory::{ConversationStore, StoreError};

use crate::classifier::{Classifier, SentimentAnalysis, SentimentCategory};
use crate::workflow::{ConversationContext, ConversationalEngine};

/// Emotions at or above this intensity are named in a sentiment-handoff
/// reason.
const EMOTION_INTENSITY_FLOOR: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub content: String,
}

/// Which branch of the turn policy produced the reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnDisposition {
    /// A handoff was already active; the user got a waiting/assigned notice.
    ActiveHandoffWait,
    SensitiveTopicHandoff,
    NegativeSentimentHandoff,
    LowConfidenceHandoff,
    /// The AI answered on its own.
    Answered,
}

#[derive(Clone, Debug)]
pub struct AgentReply {
    /// Id of the persisted assistant message.
    pub id: MessageId,
    pub message: String,
    pub needs_human_intervention: bool,
    pub confidence_score: Option<f32>,
    pub handoff_id: Option<HandoffId>,
    pub handoff_reason: Option<String>,
    pub estimated_wait_time: Option<u32>,
    pub disposition: TurnDisposition,
}

/// The orchestrator's slice of the configuration.
#[derive(Clone, Debug)]
pub struct PolicySettings {
    pub handoff_enabled: bool,
    pub sentiment_threshold: f32,
    pub short_term_max_messages: usize,
    pub wait_time_message: String,
}

impl PolicySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            handoff_enabled: config.handoff.enabled,
            sentiment_threshold: config.handoff.sentiment_threshold,
            short_term_max_messages: config.memory.short_term_max_messages,
            wait_time_message: config.handoff.wait_time_message.clone(),
        }
    }
}

/// Turn-by-turn conversation driver. For each incoming message it checks, in
/// order: an already-active handoff, sensitive topics, negative sentiment,
/// and only then runs the conversational workflow, which may still escalate
/// on low confidence. Every path persists the user message first and the
/// reply before returning.
pub struct SupportOrchestrator {
    store: Arc<dyn ConversationStore>,
    classifier: Arc<dyn Classifier>,
    engine: Arc<dyn ConversationalEngine>,
    handoff: Arc<HandoffService>,
    settings: PolicySettings,
}

impl SupportOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        classifier: Arc<dyn Classifier>,
        engine: Arc<dyn ConversationalEngine>,
        handoff: Arc<HandoffService>,
        settings: PolicySettings,
    ) -> Self {
        Self { store, classifier, engine, handoff, settings }
    }

    pub async fn process_message(
        &self,
        incoming: IncomingMessage,
    ) -> Result<AgentReply, ApplicationError> {
        let IncomingMessage { session_id, user_id, content } = incoming;

        let user_message = ChatMessage::new(
            session_id.clone(),
            user_id.clone(),
            MessageRole::User,
            content.clone(),
        );
        self.store.add_message(user_message).await.map_err(persistence)?;

        if let Some(existing) = self
            .handoff
            .get_by_session(&session_id)
            .filter(|request| request.status.is_active())
        {
            return self.active_handoff_notice(session_id, user_id, existing).await;
        }

        if self.settings.handoff_enabled {
            let topics = self.classifier.check_sensitive_topics(&content).await;
            if topics.contains_sensitive_topics {
                let reason =
                    format!("Detected sensitive topics: {}", topics.detected_topics.join(", "));
                return self
                    .initiate_handoff(
                        session_id,
                        user_id,
                        reason,
                        Priority::ELEVATED,
                        TurnDisposition::SensitiveTopicHandoff,
                    )
                    .await;
            }

            let sentiment = self.classifier.analyze_sentiment(&content).await;
            if sentiment.category == SentimentCategory::Negative
                && sentiment.score <= self.settings.sentiment_threshold
            {
                return self
                    .initiate_handoff(
                        session_id,
                        user_id,
                        sentiment_reason(&sentiment),
                        Priority::NORMAL,
                        TurnDisposition::NegativeSentimentHandoff,
                    )
                    .await;
            }
        }

        self.converse(session_id, user_id).await
    }

    /// Normal path: run the workflow, persist its reply, and escalate if the
    /// engine's own evaluation asked for a human.
    async fn converse(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<AgentReply, ApplicationError> {
        let history = self
            .store
            .recent(&session_id, self.settings.short_term_max_messages)
            .await
            .map_err(persistence)?;
        let context =
            ConversationContext { session_id: session_id.clone(), user_id: user_id.clone(), history };

        let response = self.engine.respond(&context).await;

        let tool_calls = response
            .tool_invocations
            .iter()
            .map(|invocation| ToolCallRecord {
                tool: invocation.tool.clone(),
                input: invocation.input.clone(),
            })
            .collect();
        let metadata = MessageMetadata {
            confidence_score: response.confidence_score,
            needs_human_intervention: Some(response.needs_human_intervention),
            tool_calls,
            ..MessageMetadata::default()
        };
        let assistant_message = ChatMessage::new(
            session_id.clone(),
            user_id.clone(),
            MessageRole::Assistant,
            response.response_text.clone(),
        )
        .with_metadata(metadata);
        let message_id = self.store.add_message(assistant_message).await.map_err(persistence)?;

        if response.needs_human_intervention {
            let reason = match response.confidence_score {
                Some(score) => format!("Low confidence score ({score})"),
                None => "AI unable to provide a satisfactory response".to_string(),
            };
            let mut reply = self
                .initiate_handoff(
                    session_id,
                    user_id,
                    reason,
                    Priority::NORMAL,
                    TurnDisposition::LowConfidenceHandoff,
                )
                .await?;
            reply.confidence_score = response.confidence_score;
            return Ok(reply);
        }

        Ok(AgentReply {
            id: message_id,
            message: response.response_text,
            needs_human_intervention: false,
            confidence_score: response.confidence_score,
            handoff_id: None,
            handoff_reason: None,
            estimated_wait_time: None,
            disposition: TurnDisposition::Answered,
        })
    }

    /// Queue the session for a human, snapshotting the full history for the
    /// assigned agent, and tell the user what happens next.
    async fn initiate_handoff(
        &self,
        session_id: SessionId,
        user_id: UserId,
        reason: String,
        priority: Priority,
        disposition: TurnDisposition,
    ) -> Result<AgentReply, ApplicationError> {
        let history = self.store.history(&session_id).await.map_err(persistence)?;
        let receipt = self.handoff.request_handoff(HandoffTicket {
            session_id: session_id.clone(),
            user_id: user_id.clone(),
            reason: reason.clone(),
            conversation_history: history,
            priority,
        });

        let message = format!(
            "I've noticed that this query would be better handled by a human support agent. {}",
            receipt.message
        );
        let metadata = MessageMetadata {
            needs_human_intervention: Some(true),
            handoff_id: Some(receipt.handoff_id.clone()),
            handoff_reason: Some(reason.clone()),
            ..MessageMetadata::default()
        };
        let assistant_message =
            ChatMessage::new(session_id, user_id, MessageRole::Assistant, message.clone())
                .with_metadata(metadata);
        let message_id = self.store.add_message(assistant_message).await.map_err(persistence)?;

        Ok(AgentReply {
            id: message_id,
            message,
            needs_human_intervention: true,
            confidence_score: None,
            handoff_id: Some(receipt.handoff_id),
            handoff_reason: Some(reason),
            estimated_wait_time: Some(receipt.estimated_wait_time),
            disposition,
        })
    }

    /// Short-circuit while a handoff is pending or assigned: no classifier,
    /// no LLM, just a status notice.
    async fn active_handoff_notice(
        &self,
        session_id: SessionId,
        user_id: UserId,
        existing: HandoffRequest,
    ) -> Result<AgentReply, ApplicationError> {
        let message = match existing.status {
            HandoffStatus::Assigned => AGENT_ASSIGNED_MESSAGE.to_string(),
            _ => format!(
                "Your request has been queued. {}",
                self.settings
                    .wait_time_message
                    .replace("{wait_time}", &existing.estimated_wait_time.to_string())
            ),
        };

        let metadata = MessageMetadata {
            needs_human_intervention: Some(true),
            handoff_id: Some(existing.id.clone()),
            handoff_reason: Some(existing.reason.clone()),
            ..MessageMetadata::default()
        };
        let assistant_message =
            ChatMessage::new(session_id, user_id, MessageRole::Assistant, message.clone())
                .with_metadata(metadata);
        let message_id = self.store.add_message(assistant_message).await.map_err(persistence)?;

        Ok(AgentReply {
            id: message_id,
            message,
            needs_human_intervention: true,
            confidence_score: None,
            handoff_id: Some(existing.id),
            handoff_reason: Some(existing.reason),
            estimated_wait_time: Some(existing.estimated_wait_time),
            disposition: TurnDisposition::ActiveHandoffWait,
        })
    }
}

fn persistence(error: StoreError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn sentiment_reason(sentiment: &SentimentAnalysis) -> String {
    let emotions = sentiment.dominant_emotions(EMOTION_INTENSITY_FLOOR);
    if emotions.is_empty() {
        format!("Detected negative sentiment ({:.2})", sentiment.score)
    } else {
        format!("Detected negative sentiment ({:.2}): {}", sentiment.score, emotions.join(", "))
    }
}
