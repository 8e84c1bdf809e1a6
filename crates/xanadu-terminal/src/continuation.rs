//! Continuation protocol: commands that consume further input lines.

use std::fmt;

use crate::context::ExecutionContext;

/// Handler invoked with each subsequent input line.
pub type ContinuationHandler =
    Box<dyn FnMut(&str, &mut ExecutionContext) -> Option<ContinuationResult>>;

/// A pending request for more input, owned by the command that installed it.
pub struct Continuation {
    owner: String,
    handler: ContinuationHandler,
}

impl Continuation {
    pub fn new<F>(owner: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&str, &mut ExecutionContext) -> Option<ContinuationResult> + 'static,
    {
        Self {
            owner: owner.into(),
            handler: Box::new(handler),
        }
    }

    /// Name of the command that installed this continuation. A `tail` in the
    /// handler's result is re-dispatched as `"<owner> <tail>"`.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Feed one line. `None` means "keep waiting".
    pub fn on_line(&mut self, line: &str, ctx: &mut ExecutionContext) -> Option<ContinuationResult> {
        (self.handler)(line, ctx)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// What the runner should do after a continuation consumed a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationResult {
    /// Text to re-dispatch after the owner's name.
    pub tail: Option<String>,
    /// Keep the continuation installed after this line.
    pub continue_after: bool,
}

impl ContinuationResult {
    /// Line absorbed; keep collecting.
    pub fn continue_without_execution() -> Self {
        Self {
            tail: None,
            continue_after: true,
        }
    }

    /// Run `<owner> <tail>` and keep collecting.
    pub fn execute_and_continue(tail: impl Into<String>) -> Self {
        Self {
            tail: Some(tail.into()),
            continue_after: true,
        }
    }

    /// Run `<owner> <tail>` and finish.
    pub fn execute_and_end(tail: impl Into<String>) -> Self {
        Self {
            tail: Some(tail.into()),
            continue_after: false,
        }
    }

    /// Finish without running anything.
    pub fn end() -> Self {
        Self {
            tail: None,
            continue_after: false,
        }
    }
}
