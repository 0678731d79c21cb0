use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use helpdesk_core::domain::ids::{SessionId, UserId};
use helpdesk_core::domain::message::{ChatMessage, MessageRole};

use crate::llm::LlmClient;
use crate::prompts::{
    EVALUATION_PROMPT, HUMAN_ESCALATION_PROMPT, SYSTEM_PROMPT, TOOL_CALL_INSTRUCTIONS,
    TOOL_RESPONSE_PROMPT,
};
use crate::tools::{ToolOutcome, ToolRegistry};

pub const PROCESSING_APOLOGY: &str =
    "I'm having trouble processing your request. Let me connect you with a human support agent.";
pub const GENERATION_APOLOGY: &str =
    "I'm having trouble generating a response. Let me connect you with a human support agent.";
pub const ESCALATION_FALLBACK: &str = "I need to connect you with a human support agent for \
     further assistance. Please wait while I transfer your conversation.";

/// Everything the engine sees for one turn: the session identity and the
/// recent history, newest message last.
#[derive(Clone, Debug)]
pub struct ConversationContext {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub history: Vec<ChatMessage>,
}

impl ConversationContext {
    fn last_user_message(&self) -> &str {
        self.history
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .map(|message| message.content.as_str())
            .unwrap_or("")
    }
}

#[derive(Clone, Debug)]
pub struct ToolInvocation {
    pub tool: String,
    pub input: Value,
    pub outcome: ToolOutcome,
}

#[derive(Clone, Debug)]
pub struct EngineResponse {
    pub response_text: String,
    pub confidence_score: Option<f32>,
    pub tool_invocations: Vec<ToolInvocation>,
    pub needs_human_intervention: bool,
}

impl EngineResponse {
    fn degraded(apology: &str) -> Self {
        Self {
            response_text: apology.to_string(),
            confidence_score: Some(0.0),
            tool_invocations: Vec::new(),
            needs_human_intervention: true,
        }
    }
}

/// The conversational engine seam. Implementations never fail: an internal
/// error becomes a response with `needs_human_intervention` set, which the
/// orchestrator turns into a handoff.
#[async_trait]
pub trait ConversationalEngine: Send + Sync {
    async fn respond(&self, context: &ConversationContext) -> EngineResponse;
}

/// LLM-driven turn pipeline: construct the prompt, detect a tool-call plan,
/// run tools, compose the reply, then self-evaluate its confidence.
pub struct LlmWorkflow {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    confidence_threshold: f32,
}

#[derive(Deserialize)]
struct ToolCallPlan {
    tool_calls: Vec<PlannedCall>,
}

#[derive(Deserialize)]
struct PlannedCall {
    tool: String,
    #[serde(default)]
    input: Value,
}

impl LlmWorkflow {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry, confidence_threshold: f32) -> Self {
        Self { llm, tools, confidence_threshold }
    }

    fn transcript_prompt(&self, context: &ConversationContext) -> String {
        let mut prompt = String::from(SYSTEM_PROMPT);
        if !self.tools.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&TOOL_CALL_INSTRUCTIONS.replace("{tool_list}", &self.tools.describe()));
        }
        for message in &context.history {
            if matches!(message.role, MessageRole::User | MessageRole::Assistant) {
                prompt.push_str("\n\n");
                prompt.push_str(message.role.as_str());
                prompt.push_str(": ");
                prompt.push_str(&message.content);
            }
        }
        prompt.push_str("\n\nassistant:");
        prompt
    }

    async fn execute_plan(&self, plan: ToolCallPlan) -> Vec<ToolInvocation> {
        let mut invocations = Vec::with_capacity(plan.tool_calls.len());
        for call in plan.tool_calls {
            let outcome = self.tools.execute(&call.tool, call.input.clone()).await;
            if !outcome.success {
                tracing::warn!(tool = %call.tool, error = ?outcome.error, "tool invocation failed");
            }
            invocations.push(ToolInvocation { tool: call.tool, input: call.input, outcome });
        }
        invocations
    }

    async fn compose_from_tools(
        &self,
        context: &ConversationContext,
        invocations: &[ToolInvocation],
    ) -> Option<String> {
        let tool_results = invocations
            .iter()
            .map(|invocation| {
                format!(
                    "Tool: {}\nInput: {}\nResult: {}",
                    invocation.tool,
                    invocation.input,
                    serde_json::to_string(&invocation.outcome).unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = TOOL_RESPONSE_PROMPT
            .replace("{user_query}", context.last_user_message())
            .replace("{tool_results}", &tool_results);
        match self.llm.complete(&prompt).await {
            Ok(text) => Some(text.trim().to_string()),
            Err(error) => {
                tracing::warn!(error = %error, "tool response composition failed");
                None
            }
        }
    }

    /// Returns `(confidence, needs_human)`. A transport failure scores the
    /// turn at zero confidence; an unparseable verdict lands just below the
    /// configured threshold.
    async fn evaluate(&self, context: &ConversationContext, response: &str) -> (f32, bool) {
        let prompt = EVALUATION_PROMPT
            .replace("{response}", response)
            .replace("{query}", context.last_user_message());

        let verdict = match self.llm.complete(&prompt).await {
            Ok(verdict) => verdict,
            Err(error) => {
                tracing::warn!(error = %error, "response evaluation failed");
                return (0.0, true);
            }
        };

        let confidence =
            parse_confidence_marker(&verdict).unwrap_or(self.confidence_threshold - 0.1);
        let needs_human = parse_review_marker(&verdict)
            .unwrap_or(confidence < self.confidence_threshold);
        (confidence, needs_human)
    }

    async fn escalation_message(&self, context: &ConversationContext, confidence: f32) -> String {
        let reason = if confidence == 0.0 {
            "Failed to generate or evaluate a response".to_string()
        } else {
            format!("Response confidence score ({confidence}) is below threshold")
        };
        let prompt = HUMAN_ESCALATION_PROMPT
            .replace("{user_query}", context.last_user_message())
            .replace("{escalation_reason}", &reason);
        match self.llm.complete(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(error) => {
                tracing::warn!(error = %error, "escalation message composition failed");
                ESCALATION_FALLBACK.to_string()
            }
        }
    }
}

#[async_trait]
impl ConversationalEngine for LlmWorkflow {
    async fn respond(&self, context: &ConversationContext) -> EngineResponse {
        let analysis = match self.llm.complete(&self.transcript_prompt(context)).await {
            Ok(analysis) => analysis,
            Err(error) => {
                tracing::warn!(error = %error, "request analysis failed, degrading to handoff");
                return EngineResponse::degraded(PROCESSING_APOLOGY);
            }
        };

        let (response_text, tool_invocations) = match parse_tool_plan(&analysis) {
            Some(plan) => {
                let invocations = self.execute_plan(plan).await;
                match self.compose_from_tools(context, &invocations).await {
                    Some(text) => (text, invocations),
                    None => {
                        let mut degraded = EngineResponse::degraded(GENERATION_APOLOGY);
                        degraded.tool_invocations = invocations;
                        return degraded;
                    }
                }
            }
            None => (analysis.trim().to_string(), Vec::new()),
        };

        let (confidence, needs_human) = self.evaluate(context, &response_text).await;

        let response_text = if needs_human {
            self.escalation_message(context, confidence).await
        } else {
            response_text
        };

        EngineResponse {
            response_text,
            confidence_score: Some(confidence),
            tool_invocations,
            needs_human_intervention: needs_human,
        }
    }
}

fn parse_tool_plan(reply: &str) -> Option<ToolCallPlan> {
    let trimmed = reply.trim();
    let candidate = trimmed
        .strip_prefix("```")
        .map(|rest| {
            rest.strip_prefix("json")
                .unwrap_or(rest)
                .trim_start_matches(['\r', '\n'])
                .trim_end_matches('`')
                .trim()
        })
        .unwrap_or(trimmed);
    let plan: ToolCallPlan = serde_json::from_str(candidate).ok()?;
    if plan.tool_calls.is_empty() {
        return None;
    }
    Some(plan)
}

/// Pull the number following `Overall confidence score:` out of the
/// evaluator's free-text verdict.
fn parse_confidence_marker(verdict: &str) -> Option<f32> {
    let lowered = verdict.to_lowercase();
    let start = lowered.find("overall confidence score")?;
    let tail = &lowered[start..];
    let digits_at = tail.find(|c: char| c.is_ascii_digit())?;
    let number: String = tail[digits_at..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse::<f32>().ok().filter(|score| (0.0..=1.0).contains(score))
}

/// Looks for the `(Yes/No)` answer after the human-review question.
fn parse_review_marker(verdict: &str) -> Option<bool> {
    let lowered = verdict.to_lowercase();
    let question_at = lowered.find("require human review")?;
    let tail = &lowered[question_at..];
    let answer_at = tail.find("(yes/no)")? + "(yes/no)".len();
    let answer = tail[answer_at..].trim_start();
    if answer.starts_with("yes") {
        Some(true)
    } else if answer.starts_with("no") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use helpdesk_core::domain::ids::{SessionId, UserId};
    use helpdesk_core::domain::message::{ChatMessage, MessageRole};

    use super::{
        parse_confidence_marker, parse_review_marker, ConversationContext, ConversationalEngine,
        LlmWorkflow, ESCALATION_FALLBACK, PROCESSING_APOLOGY,
    };
    use crate::llm::LlmClient;
    use crate::tools::{CalculatorTool, ToolRegistry};

    struct ScriptedLlm {
        replies: Vec<Result<String>>,
        cursor: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self { replies, cursor: AtomicUsize::new(0), prompts: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let index = self.cursor.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(index) {
                Some(Ok(reply)) => Ok(reply.clone()),
                Some(Err(error)) => Err(anyhow!("{error}")),
                None => Err(anyhow!("no scripted reply left")),
            }
        }
    }

    fn context(last_user_message: &str) -> ConversationContext {
        let session_id = SessionId("s-1".to_string());
        let user_id = UserId("u-1".to_string());
        ConversationContext {
            session_id: session_id.clone(),
            user_id: user_id.clone(),
            history: vec![ChatMessage::new(
                session_id,
                user_id,
                MessageRole::User,
                last_user_message,
            )],
        }
    }

    fn workflow(llm: Arc<ScriptedLlm>) -> LlmWorkflow {
        let mut tools = ToolRegistry::default();
        tools.register(CalculatorTool);
        LlmWorkflow::new(llm, tools, 0.7)
    }

    const CONFIDENT_VERDICT: &str = "Overall confidence score: 0.9\n\n\
         Does this response require human review? (Yes/No)\nNo";

    #[tokio::test]
    async fn plain_answer_with_high_confidence_needs_no_human() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("You can reset your password from the account page.".to_string()),
            Ok(CONFIDENT_VERDICT.to_string()),
        ]));
        let workflow = workflow(llm.clone());

        let response = workflow.respond(&context("how do I reset my password?")).await;

        assert!(!response.needs_human_intervention);
        assert_eq!(response.confidence_score, Some(0.9));
        assert!(response.response_text.contains("reset your password"));
        assert!(response.tool_invocations.is_empty());
    }

    #[tokio::test]
    async fn tool_plan_is_executed_before_composing_the_reply() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(r#"{"tool_calls": [{"tool": "calculator", "input": {"expression": "19.99*3"}}]}"#
                .to_string()),
            Ok("Three licenses come to 59.97.".to_string()),
            Ok(CONFIDENT_VERDICT.to_string()),
        ]));
        let workflow = workflow(llm.clone());

        let response = workflow.respond(&context("what do three 19.99 licenses cost?")).await;

        assert!(!response.needs_human_intervention);
        assert_eq!(response.tool_invocations.len(), 1);
        assert_eq!(response.tool_invocations[0].tool, "calculator");
        assert!(response.tool_invocations[0].outcome.success);
        assert_eq!(response.response_text, "Three licenses come to 59.97.");

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[1].contains("Tool results"), "composition prompt carries tool output");
    }

    #[tokio::test]
    async fn unparseable_verdict_lands_just_below_threshold_and_escalates() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("Some answer.".to_string()),
            Ok("I think it is fine.".to_string()),
            Ok("Let me bring in a colleague who can help with this.".to_string()),
        ]));
        let workflow = workflow(llm);

        let response = workflow.respond(&context("hello")).await;

        assert!(response.needs_human_intervention);
        let confidence = response.confidence_score.expect("confidence set");
        assert!((confidence - 0.6).abs() < 1e-6);
        assert_eq!(response.response_text, "Let me bring in a colleague who can help with this.");
    }

    #[tokio::test]
    async fn analysis_failure_degrades_to_apology_and_handoff() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(anyhow!("boom"))]));
        let workflow = workflow(llm);

        let response = workflow.respond(&context("hello")).await;

        assert!(response.needs_human_intervention);
        assert_eq!(response.confidence_score, Some(0.0));
        assert_eq!(response.response_text, PROCESSING_APOLOGY);
    }

    #[tokio::test]
    async fn evaluation_failure_uses_fixed_escalation_fallback() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("Some answer.".to_string()),
            Err(anyhow!("eval backend down")),
            Err(anyhow!("still down")),
        ]));
        let workflow = workflow(llm);

        let response = workflow.respond(&context("hello")).await;

        assert!(response.needs_human_intervention);
        assert_eq!(response.confidence_score, Some(0.0));
        assert_eq!(response.response_text, ESCALATION_FALLBACK);
    }

    #[tokio::test]
    async fn explicit_review_flag_overrides_a_passing_score() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("Some answer.".to_string()),
            Ok("Overall confidence score: 0.8\n\n\
                Does this response require human review? (Yes/No)\nYes"
                .to_string()),
            Ok("Connecting you with a specialist now.".to_string()),
        ]));
        let workflow = workflow(llm);

        let response = workflow.respond(&context("hello")).await;

        assert!(response.needs_human_intervention);
        assert_eq!(response.confidence_score, Some(0.8));
    }

    #[test]
    fn confidence_marker_parsing() {
        assert_eq!(parse_confidence_marker("Overall confidence score: 0.85"), Some(0.85));
        assert_eq!(parse_confidence_marker("overall CONFIDENCE score: 1.0 done"), Some(1.0));
        assert_eq!(parse_confidence_marker("no marker here"), None);
        assert_eq!(parse_confidence_marker("Overall confidence score: fine"), None);
        // Out-of-range values are treated as a parse miss.
        assert_eq!(parse_confidence_marker("Overall confidence score: 42"), None);
    }

    #[test]
    fn review_marker_parsing() {
        assert_eq!(
            parse_review_marker("Does this response require human review? (Yes/No)\nYes"),
            Some(true)
        );
        assert_eq!(
            parse_review_marker("Does this response require human review? (Yes/No) No"),
            Some(false)
        );
        assert_eq!(parse_review_marker("nothing relevant"), None);
    }
}
