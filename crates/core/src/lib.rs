pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod handoff;
pub mod memory;

pub use config::{AppConfig, ConfigError, HandoffConfig, LoadOptions, LogFormat};
pub use domain::agent::{AgentStatus, HumanAgent};
pub use domain::handoff::{HandoffRequest, HandoffStatus, Priority};
pub use domain::ids::{AgentId, HandoffId, MessageId, SessionId, UserId};
pub use domain::message::{ChatMessage, MessageMetadata, MessageRole, ToolCallRecord};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use events::{EventSink, HandoffEvent, InMemoryEventSink, NullEventSink, TracingEventSink};
pub use handoff::{AcceptError, HandoffReceipt, HandoffService, HandoffSettings, HandoffTicket};
pub use memory::{ConversationStore, Feedback, StoreError};
