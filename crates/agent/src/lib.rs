//! Conversational runtime for the support agent.
//!
//! This crate turns an incoming user message into either an AI response or a
//! human handoff:
//! 1. **Policy** (`orchestrator`) - active-handoff short-circuit, sensitive
//!    topics, negative sentiment, then the normal workflow
//! 2. **Classification** (`classifier`) - sentiment and sensitive-topic
//!    detection over the opaque LLM seam
//! 3. **Workflow** (`workflow`) - prompt construction, tool execution,
//!    response generation, confidence evaluation
//! 4. **Tools** (`tools`) - named capability providers invoked by the
//!    workflow
//!
//! The LLM is reached only through the `LlmClient` trait; every failure on
//! that seam degrades to a human handoff instead of surfacing an error to
//! the end user.

pub mod classifier;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod tools;
pub mod workflow;

pub use classifier::{Classifier, LlmClassifier, SentimentAnalysis, SentimentCategory, TopicCheck};
pub use llm::{HttpLlmClient, LlmClient};
pub use orchestrator::{
    AgentReply, IncomingMessage, PolicySettings, SupportOrchestrator, TurnDisposition,
};
pub use tools::{CalculatorTool, Tool, ToolOutcome, ToolRegistry};
pub use workflow::{
    ConversationContext, ConversationalEngine, EngineResponse, LlmWorkflow, ToolInvocation,
};
