//! Interactive read-dispatch loop.

use std::io::BufRead;

use xanadu_types::error::Result;

use crate::context::ExecutionContext;
use crate::runner::{DirectExecutor, LineRunner, Outcome};

/// Line-at-a-time driver over any buffered reader.
///
/// A blank line abandons a pending continuation. A failing line clears it.
/// End of input stops cleanly.
pub struct Repl<R: BufRead> {
    input: R,
    prompt: String,
    runner: LineRunner,
}

impl<R: BufRead> Repl<R> {
    pub fn new(input: R, prompt: impl Into<String>) -> Self {
        Self {
            input,
            prompt: prompt.into(),
            runner: LineRunner::new(),
        }
    }

    /// Prompt for the next line: `<owner> <prompt>` while a continuation is
    /// pending.
    pub fn prompt(&self) -> String {
        match self.runner.owner() {
            Some(owner) => format!("{owner} {}", self.prompt),
            None => self.prompt.clone(),
        }
    }

    fn drop_continuation(&mut self, ctx: &mut ExecutionContext) {
        self.runner.clear();
        ctx.clear_continuation();
    }

    /// Run until end of input or an exit command.
    pub fn run(&mut self, ctx: &mut ExecutionContext) -> Result<Outcome> {
        loop {
            if ctx.consume_cancel() {
                self.drop_continuation(ctx);
            }
            ctx.print(self.prompt())?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                ctx.println("")?;
                log::debug!("End of input");
                return Ok(Outcome::Done);
            }
            if ctx.consume_cancel() {
                ctx.warn("Cancelled.");
                self.drop_continuation(ctx);
                continue;
            }

            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                if self.runner.is_active() {
                    log::debug!("Blank line cancels continuation {:?}", self.runner.owner());
                    self.drop_continuation(ctx);
                }
                continue;
            }

            match self.runner.feed(ctx, line, &mut DirectExecutor) {
                Outcome::Exit => return Ok(Outcome::Exit),
                Outcome::Done | Outcome::Failed => {},
            }
        }
    }
}
