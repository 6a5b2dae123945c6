//! Turn orchestration: block state machine, tool execution, and the agent loop.

pub mod accumulator;
pub mod events;
pub mod executor;
pub mod orchestrator;

pub use events::{StreamEvent, ToolOutput, TurnError};
pub use orchestrator::{Agent, AgentResponse, Turn};
