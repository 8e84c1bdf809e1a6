//! Line dispatch and the line-sequence runner.
//!
//! Every place that feeds lines to the interpreter (REPL, scripts, macro
//! bodies, agent tool calls) goes through [`LineRunner::feed`], which owns
//! the continuation protocol:
//!
//! - No continuation pending: dispatch the line. Whatever continuation the
//!   command installed becomes the active one.
//! - Continuation pending: hand it the line. If it returns a tail, dispatch
//!   `"<owner> <tail>"` and take over any continuation *that* installs.
//!   Unless the result asks to continue, drop the active continuation.
//!
//! Errors returned by commands are handled the same way everywhere: the
//! error is recorded as the last error, logged as `Command failed: ...`,
//! and the line counts as failed.

use xanadu_types::error::XanaduError;

use crate::context::ExecutionContext;
use crate::continuation::Continuation;
use crate::parser::parse_line;
use crate::provider::CommandStatus;

/// Result of feeding one line or running a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Failed,
    Exit,
}

impl From<Outcome> for CommandStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => CommandStatus::Success,
            Outcome::Failed => CommandStatus::Failure,
            Outcome::Exit => CommandStatus::Exit,
        }
    }
}

/// A dispatched line: its status and any continuation it left behind.
#[derive(Debug)]
pub struct Dispatch {
    pub status: CommandStatus,
    pub continuation: Option<Continuation>,
}

/// Strategy for running a single line.
pub trait LineExecutor {
    /// Run `line` to completion.
    fn execute(&mut self, ctx: &mut ExecutionContext, line: &str) -> Dispatch;

    /// Called before each line is fed, with whether a continuation will
    /// consume it.
    fn before_line(&mut self, _ctx: &mut ExecutionContext, _line: &str, _continuing: bool) {}
}

/// Runs lines directly in the given context.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectExecutor;

impl LineExecutor for DirectExecutor {
    fn execute(&mut self, ctx: &mut ExecutionContext, line: &str) -> Dispatch {
        let status = execute_line(ctx, line);
        Dispatch {
            status,
            continuation: ctx.take_continuation(),
        }
    }
}

/// Parse, resolve and run one line in `ctx`.
///
/// Blank lines succeed without doing anything. Unknown commands are
/// reported and fail.
pub fn execute_line(ctx: &mut ExecutionContext, line: &str) -> CommandStatus {
    let Some(input) = parse_line(line) else {
        return CommandStatus::Success;
    };
    let command = ctx.registry().borrow().resolve(&input);
    let Some(command) = command else {
        ctx.error(&XanaduError::UnknownCommand(input.name).to_string());
        return CommandStatus::Failure;
    };
    ctx.reset_failure();
    match command.execute(ctx) {
        Ok(CommandStatus::Exit) => CommandStatus::Exit,
        Ok(CommandStatus::Success) if !ctx.failed() => CommandStatus::Success,
        Ok(_) => {
            ctx.fail();
            CommandStatus::Failure
        },
        Err(e) => {
            report_error(ctx, &e);
            CommandStatus::Failure
        },
    }
}

/// Record and log an error caught at a dispatch boundary.
pub fn report_error(ctx: &mut ExecutionContext, error: &XanaduError) {
    log::debug!("Command error: {error:?}");
    ctx.record_error(error);
    ctx.error(&format!("Command failed: {error}"));
    ctx.debug(&format!("{error:?}"));
}

// ---------------------------------------------------------------------------
// LineRunner
// ---------------------------------------------------------------------------

/// Continuation-aware line driver. Holds the active continuation between
/// lines, outside any context's slot.
#[derive(Debug, Default)]
pub struct LineRunner {
    active: Option<Continuation>,
}

impl LineRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume with a continuation carried over from an earlier batch.
    pub fn with_active(active: Option<Continuation>) -> Self {
        Self { active }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn owner(&self) -> Option<&str> {
        self.active.as_ref().map(Continuation::owner)
    }

    pub fn take_active(&mut self) -> Option<Continuation> {
        self.active.take()
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    /// Feed one line through the continuation protocol.
    pub fn feed(
        &mut self,
        ctx: &mut ExecutionContext,
        line: &str,
        exec: &mut dyn LineExecutor,
    ) -> Outcome {
        exec.before_line(ctx, line, self.active.is_some());
        let Some(mut current) = self.active.take() else {
            return self.dispatch(ctx, line, exec);
        };
        let Some(result) = current.on_line(line, ctx) else {
            self.active = Some(current);
            return Outcome::Done;
        };
        let mut next = Some(current);
        if let Some(tail) = result.tail {
            let combined = format!("{} {tail}", next.as_ref().map_or("", |c| c.owner()));
            let outcome = self.dispatch(ctx, &combined, exec);
            if outcome != Outcome::Done {
                return outcome;
            }
            next = self.active.take();
        }
        if result.continue_after {
            self.active = next;
        }
        Outcome::Done
    }

    fn dispatch(
        &mut self,
        ctx: &mut ExecutionContext,
        line: &str,
        exec: &mut dyn LineExecutor,
    ) -> Outcome {
        let dispatch = exec.execute(ctx, line);
        match dispatch.status {
            CommandStatus::Success => {
                self.active = dispatch.continuation;
                Outcome::Done
            },
            CommandStatus::Failure => {
                self.active = None;
                Outcome::Failed
            },
            CommandStatus::Exit => {
                self.active = None;
                Outcome::Exit
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Batch runs
// ---------------------------------------------------------------------------

/// Where a batch of lines came from, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    Script,
    Macro,
}

impl Site {
    pub fn label(self) -> &'static str {
        match self {
            Site::Script => "Script",
            Site::Macro => "Macro",
        }
    }
}

/// Run a fixed sequence of lines in `ctx`.
///
/// Stops at the first failing line. A continuation still pending after the
/// last line is a failure. Whatever continuation occupied the context's
/// slot beforehand is back in place on return.
pub fn run_lines<I>(ctx: &mut ExecutionContext, lines: I, site: Site) -> Outcome
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let prior = ctx.take_continuation();
    let outcome = run_batch(ctx, lines, site);
    ctx.replace_continuation(prior);
    outcome
}

fn run_batch<I>(ctx: &mut ExecutionContext, lines: I, site: Site) -> Outcome
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut runner = LineRunner::new();
    let mut exec = DirectExecutor;
    for line in lines {
        match runner.feed(ctx, line.as_ref(), &mut exec) {
            Outcome::Done => {},
            other => return other,
        }
    }
    if runner.is_active() {
        ctx.error(&XanaduError::Incomplete(site.label()).to_string());
        return Outcome::Failed;
    }
    Outcome::Done
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::continuation::ContinuationResult;
    use crate::parser::ParsedCommand;
    use crate::provider::{Command, CommandProvider, command};
    use crate::registry::ProviderRegistry;
    use crate::render::TextGrid;
    use crate::sink::{SharedBuffer, sink};
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    /// `echo`, `fail`, `boom` (returns Err), `show` (renders one word per
    /// row), `bye` (Exit).
    pub(crate) struct BasicProvider;

    impl CommandProvider for BasicProvider {
        fn name(&self) -> &str {
            "basic"
        }
        fn build(&self, input: &ParsedCommand) -> Box<dyn Command> {
            let args = input.args.join(" ");
            match input.name.as_str() {
                "echo" => command(move |ctx| {
                    ctx.println(&args)?;
                    Ok(CommandStatus::Success)
                }),
                "fail" => command(|ctx| {
                    ctx.error("failing on purpose");
                    Ok(CommandStatus::Success)
                }),
                "boom" => command(|_| Err(XanaduError::Command("kaboom".into()))),
                "show" => command(move |ctx| {
                    ctx.render(&TextGrid::from_lines(args.split(' ')))?;
                    Ok(CommandStatus::Success)
                }),
                _ => command(|_| Ok(CommandStatus::Exit)),
            }
        }
        fn names(&self) -> BTreeSet<String> {
            ["echo", "fail", "boom", "show", "bye"]
                .into_iter()
                .map(String::from)
                .collect()
        }
    }

    /// SQL-style statements that continue until a line ends with `;`.
    /// Completed statements are printed as `exec: <statement>`.
    pub(crate) struct StatementProvider;

    impl CommandProvider for StatementProvider {
        fn name(&self) -> &str {
            "statements"
        }
        fn build(&self, input: &ParsedCommand) -> Box<dyn Command> {
            let verb = input.name.clone();
            let body = input.tail().to_string();
            command(move |ctx| {
                if body.trim_end().ends_with(';') {
                    ctx.println(format!("exec: {verb} {body}"))?;
                    return Ok(CommandStatus::Success);
                }
                if !ctx.allow_continuation() {
                    ctx.error("statement must end with ;");
                    return Ok(CommandStatus::Failure);
                }
                let mut buffer = body.clone();
                ctx.continue_with(Continuation::new(verb.clone(), move |line, _ctx| {
                    if !buffer.is_empty() {
                        buffer.push('\n');
                    }
                    buffer.push_str(line);
                    if buffer.trim_end().ends_with(';') {
                        Some(ContinuationResult::execute_and_end(buffer.clone()))
                    } else {
                        Some(ContinuationResult::continue_without_execution())
                    }
                }));
                Ok(CommandStatus::Success)
            })
        }
        fn names(&self) -> BTreeSet<String> {
            BTreeSet::from(["select".to_string()])
        }
    }

    pub(crate) fn make_ctx() -> (ExecutionContext, SharedBuffer) {
        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(BasicProvider));
        registry.register(Box::new(StatementProvider));
        let buf = SharedBuffer::new();
        let ctx = ExecutionContext::new(sink(buf.clone()), Rc::new(RefCell::new(registry)));
        (ctx, buf)
    }

    fn marker() -> Continuation {
        Continuation::new("outer", |_, _| Some(ContinuationResult::end()))
    }

    #[test]
    fn blank_line_is_a_no_op() {
        let (mut ctx, buf) = make_ctx();
        assert_eq!(execute_line(&mut ctx, "   "), CommandStatus::Success);
        assert!(buf.is_empty());
    }

    #[test]
    fn unknown_command_fails() {
        let (mut ctx, buf) = make_ctx();
        assert_eq!(execute_line(&mut ctx, "nope"), CommandStatus::Failure);
        assert!(buf.contents().contains("Unknown command: nope"));
    }

    #[test]
    fn error_flag_means_failure() {
        let (mut ctx, _buf) = make_ctx();
        assert_eq!(execute_line(&mut ctx, "fail"), CommandStatus::Failure);
    }

    #[test]
    fn returned_error_is_caught_and_recorded() {
        let (mut ctx, buf) = make_ctx();
        assert_eq!(execute_line(&mut ctx, "boom"), CommandStatus::Failure);
        assert!(buf.contents().contains("Command failed: command error: kaboom"));
        assert_eq!(
            ctx.last_error().unwrap().message,
            "command error: kaboom"
        );
    }

    #[test]
    fn failure_flag_resets_between_lines() {
        let (mut ctx, _buf) = make_ctx();
        execute_line(&mut ctx, "fail");
        assert_eq!(execute_line(&mut ctx, "echo ok"), CommandStatus::Success);
    }

    #[test]
    fn statement_continuation_joins_lines() {
        let (mut ctx, buf) = make_ctx();
        let mut runner = LineRunner::new();
        let mut exec = DirectExecutor;
        assert_eq!(runner.feed(&mut ctx, "select * from t", &mut exec), Outcome::Done);
        assert_eq!(runner.owner(), Some("select"));
        assert!(buf.is_empty());

        assert_eq!(runner.feed(&mut ctx, "where x=1;", &mut exec), Outcome::Done);
        assert!(!runner.is_active());
        assert_eq!(buf.contents(), "exec: select * from t\nwhere x=1;\n");
    }

    #[test]
    fn script_runs_all_lines() {
        let (mut ctx, buf) = make_ctx();
        let outcome = run_lines(&mut ctx, ["echo one", "", "echo two"], Site::Script);
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(buf.contents(), "one\ntwo\n");
    }

    #[test]
    fn script_stops_at_first_failure() {
        let (mut ctx, buf) = make_ctx();
        let outcome = run_lines(&mut ctx, ["echo one", "nope", "echo two"], Site::Script);
        assert_eq!(outcome, Outcome::Failed);
        assert!(!buf.contents().contains("two"));
    }

    #[test]
    fn returned_error_aborts_script() {
        let (mut ctx, buf) = make_ctx();
        let outcome = run_lines(&mut ctx, ["boom", "echo after"], Site::Script);
        assert_eq!(outcome, Outcome::Failed);
        assert!(!buf.contents().contains("after"));
    }

    #[test]
    fn script_ending_mid_continuation_fails() {
        let (mut ctx, buf) = make_ctx();
        let outcome = run_lines(&mut ctx, ["select a", "from b"], Site::Script);
        assert_eq!(outcome, Outcome::Failed);
        assert!(buf.contents().contains("Script ended before continuation completed."));
    }

    #[test]
    fn exit_propagates_out_of_batch() {
        let (mut ctx, buf) = make_ctx();
        let outcome = run_lines(&mut ctx, ["bye", "echo after"], Site::Macro);
        assert_eq!(outcome, Outcome::Exit);
        assert!(buf.is_empty());
    }

    #[test]
    fn prior_continuation_is_restored() {
        let (mut ctx, _buf) = make_ctx();
        ctx.continue_with(marker());
        run_lines(&mut ctx, ["select a", "from b;"], Site::Script);
        assert_eq!(ctx.continuation_owner(), Some("outer"));
        run_lines(&mut ctx, ["select dangling"], Site::Script);
        assert_eq!(ctx.continuation_owner(), Some("outer"));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn arb_line() -> impl Strategy<Value = String> {
            prop_oneof![
                Just("echo hi".to_string()),
                Just("select a".to_string()),
                Just("from b;".to_string()),
                Just("fail".to_string()),
                Just("boom".to_string()),
                Just("nope".to_string()),
                Just(String::new()),
            ]
        }

        proptest! {
            #[test]
            fn slot_is_unchanged_after_any_batch(
                lines in proptest::collection::vec(arb_line(), 0..12),
                had_prior in any::<bool>(),
            ) {
                let (mut ctx, _buf) = make_ctx();
                if had_prior {
                    ctx.continue_with(marker());
                }
                run_lines(&mut ctx, &lines, Site::Macro);
                let expected = if had_prior { Some("outer") } else { None };
                prop_assert_eq!(ctx.continuation_owner(), expected);
            }
        }
    }
}
