//! Agent pipeline: convert, describe, retrieve, generate, execute, render.
//!
//! Tools operate on an explicit [`PipelineState`] owned by one turn. The
//! [`Agent`] drives them in fixed order with a single repair pass; the MCP
//! server exposes the same tools to an LLM-driven client.

pub mod agent;
pub mod convert;
pub mod enhance;
pub mod state;
pub mod tools;

pub use agent::{Agent, TurnOutcome, TurnReport};
pub use convert::DwgConverter;
pub use enhance::DescriptionEnhancer;
pub use state::{FailedAttempt, Message, PipelineState, Role, StateUpdate, ToolOutput};
pub use tools::{PipelineTools, MAX_EXECUTIONS_PER_TURN, NO_DRAWING};
