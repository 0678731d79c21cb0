pub mod agent;
pub mod handoff;
pub mod ids;
pub mod message;
