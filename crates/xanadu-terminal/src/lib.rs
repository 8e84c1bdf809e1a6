//! Command interpreter for the xanadu shell.
//!
//! Lines are tokenized into a [`ParsedCommand`], resolved against the
//! [`ProviderRegistry`], and executed in an [`ExecutionContext`]. Commands
//! that need more input install a [`Continuation`]; the [`LineRunner`]
//! drives that protocol identically for the REPL, scripts, macros and
//! agent tool calls.

pub mod cancel;
pub mod capture;
pub mod context;
pub mod continuation;
pub mod macros;
pub mod parser;
pub mod provider;
pub mod registry;
pub mod render;
pub mod repl;
pub mod runner;
pub mod scratch;
pub mod script;
pub mod sink;
pub mod system_commands;
pub mod table;

pub use cancel::CancelToken;
pub use context::ExecutionContext;
pub use continuation::{Continuation, ContinuationResult};
pub use parser::{ParsedCommand, parse_line};
pub use provider::{Command, CommandProvider, CommandStatus};
pub use registry::{ProviderId, ProviderRegistry, ProviderState};
pub use runner::{LineRunner, Outcome, Site, run_lines};
