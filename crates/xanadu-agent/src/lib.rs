//! Language-model agent for the xanadu shell.
//!
//! An [`AgentBackend`] answers a conversation. The agent loop parses each
//! reply for tool calls (fenced ```` ```xanadu ```` blocks or
//! `xanadu: <command>` lines), runs them in captured forks of the session,
//! and feeds the output back until the model answers without tools.

pub mod agent;
pub mod backend;
pub mod echo;
pub mod mock;
pub mod parse;
pub mod prompt;

pub use agent::{AGENT_PROVIDER, agent_provider};
pub use backend::{AgentBackend, ChatMessage, ChatResponse, FinishReason, Role};
pub use echo::EchoBackend;
pub use parse::{ReplyParse, Segment, format_tool_block, parse_reply};
