//! Sandboxed execution of one command line with output capture.
//!
//! Used for agent tool calls: the command runs in a fork of the caller's
//! context, its output is shown live (indented) and also captured for the
//! next model turn, and its continuation comes back to the caller instead
//! of landing in the caller's slot.

use xanadu_types::error::XanaduError;
use xanadu_types::level::LogLevel;

use crate::context::ExecutionContext;
use crate::continuation::Continuation;
use crate::parser::parse_line;
use crate::provider::CommandStatus;
use crate::runner::{Dispatch, LineExecutor, report_error};
use crate::sink::{CaptureGate, IndentingWriter, SharedBuffer, SinkWriter, TeeWriter, sink};

const ANSI_CYAN: &str = "\u{1b}[36m";
const ANSI_RESET: &str = "\u{1b}[0m";

/// Marker that tags tool calls in model output and names the tool.
pub const TOOL_NAME: &str = "xanadu";

/// Outcome of one captured execution.
#[derive(Debug)]
pub struct ToolResult {
    /// Everything the command printed, plus unclipped renders.
    pub output: String,
    pub success: bool,
    /// Continuation the command installed, if any.
    pub continuation: Option<Continuation>,
}

impl ToolResult {
    fn failure(message: String) -> Self {
        Self {
            output: message,
            success: false,
            continuation: None,
        }
    }
}

/// `size * num / den`, kept at one or more when `size` is bounded.
fn scaled(size: usize, num: usize, den: usize) -> usize {
    if size == 0 {
        return 0;
    }
    (size * num / den).max(1)
}

/// Run exactly one command line in a fork of `ctx`.
///
/// The fork gets three quarters of the parent's width and half its height,
/// with clipping on. Errors returned by the command are caught and turned
/// into a failed result; they never propagate to the caller.
pub fn run_captured(
    ctx: &ExecutionContext,
    line: &str,
    allow_continuation: bool,
    indent: usize,
) -> ToolResult {
    let Some(input) = parse_line(line) else {
        return ToolResult::failure("No command provided.".to_string());
    };
    let command = ctx.registry().borrow().resolve(&input);
    let Some(command) = command else {
        return ToolResult::failure(XanaduError::UnknownCommand(input.name).to_string());
    };

    let capture = SharedBuffer::new();
    let gate = CaptureGate::new();
    let screen = IndentingWriter::new(SinkWriter(std::rc::Rc::clone(ctx.out())), indent);
    let tee = TeeWriter::new(screen, capture.clone(), gate.clone());

    let mut child = ctx.fork(sink(tee));
    child.set_size(scaled(ctx.width(), 3, 4), scaled(ctx.height(), 1, 2));
    child.set_clip(true);
    child.set_render_tap(sink(capture.clone()), 0, 0, false);
    child.set_capture_gate(gate);
    child.set_allow_continuation(allow_continuation);
    child.reset_failure();

    match command.execute(&mut child) {
        Ok(CommandStatus::Success) => {},
        Ok(CommandStatus::Failure) => child.fail(),
        Ok(CommandStatus::Exit) => child.error("exit is not available to tool calls"),
        Err(e) => report_error(&mut child, &e),
    }

    ToolResult {
        output: capture.contents(),
        success: !child.failed(),
        continuation: child.take_continuation(),
    }
}

/// [`LineExecutor`] that runs each line through [`run_captured`] and keeps
/// a transcript of calls and their output for the model.
pub struct ToolExecutor {
    allow_continuation: bool,
    indent: usize,
    transcript: String,
    cancelled: bool,
}

impl ToolExecutor {
    pub fn new(allow_continuation: bool, indent: usize) -> Self {
        Self {
            allow_continuation,
            indent,
            transcript: String::new(),
            cancelled: false,
        }
    }

    /// `Command: <line>` followed by its output, per executed line.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn into_transcript(self) -> String {
        self.transcript
    }

    /// Whether a cancellation request stopped execution.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }
}

impl LineExecutor for ToolExecutor {
    fn before_line(&mut self, ctx: &mut ExecutionContext, line: &str, continuing: bool) {
        if continuing {
            ctx.log_continuation(LogLevel::Info, &format!("{ANSI_CYAN}  {line}{ANSI_RESET}"));
        } else {
            ctx.info(&format!("{ANSI_CYAN}> {line}{ANSI_RESET}"));
        }
    }

    fn execute(&mut self, ctx: &mut ExecutionContext, line: &str) -> Dispatch {
        if ctx.consume_cancel() {
            ctx.warn("Agent chat cancelled.");
            self.cancelled = true;
            return Dispatch {
                status: CommandStatus::Failure,
                continuation: None,
            };
        }
        let result = run_captured(ctx, line, self.allow_continuation, self.indent);
        self.transcript.push_str("Command: ");
        self.transcript.push_str(line);
        self.transcript.push('\n');
        self.transcript.push_str(&result.output);
        self.transcript.push('\n');
        if !result.success {
            ctx.warn("Tool failed; stopping further tool calls.");
            return Dispatch {
                status: CommandStatus::Failure,
                continuation: None,
            };
        }
        Dispatch {
            status: CommandStatus::Success,
            continuation: result.continuation,
        }
    }
}

/// One-line description of the tool for the model.
pub fn tool_description(ctx: &ExecutionContext) -> String {
    let names = ctx.registry().borrow().command_names();
    if names.is_empty() {
        return format!("Execute a {TOOL_NAME} command line.");
    }
    format!(
        "Execute {TOOL_NAME} command lines. Available commands: {}. \
         Command output is shown to the user automatically, so do not repeat it unless asked.",
        names.into_iter().collect::<Vec<_>>().join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::make_ctx;
    use crate::runner::{LineRunner, Outcome};

    #[test]
    fn captures_output_and_indents_screen() {
        let (ctx, screen) = make_ctx();
        let result = run_captured(&ctx, "echo hi", true, 6);
        assert!(result.success);
        assert_eq!(result.output, "hi\n");
        assert_eq!(screen.contents(), "      hi\n");
        assert!(result.continuation.is_none());
    }

    #[test]
    fn unknown_command_is_failure_record() {
        let (ctx, screen) = make_ctx();
        let result = run_captured(&ctx, "nope", true, 6);
        assert!(!result.success);
        assert_eq!(result.output, "Unknown command: nope");
        assert!(screen.is_empty());
    }

    #[test]
    fn returned_error_becomes_failure() {
        let (ctx, _screen) = make_ctx();
        let result = run_captured(&ctx, "boom", true, 0);
        assert!(!result.success);
        assert!(result.output.contains("Command failed: command error: kaboom"));
        assert!(ctx.last_error().is_some());
    }

    #[test]
    fn exit_is_refused() {
        let (ctx, _screen) = make_ctx();
        let result = run_captured(&ctx, "bye", true, 0);
        assert!(!result.success);
        assert!(result.output.contains("exit is not available"));
    }

    #[test]
    fn continuation_is_returned_not_installed() {
        let (ctx, _screen) = make_ctx();
        let result = run_captured(&ctx, "select a", true, 0);
        assert!(result.success);
        assert_eq!(result.continuation.as_ref().map(|c| c.owner()), Some("select"));
        assert!(ctx.continuation_owner().is_none());
    }

    #[test]
    fn continuation_can_be_refused() {
        let (ctx, _screen) = make_ctx();
        let result = run_captured(&ctx, "select a", false, 0);
        assert!(!result.success);
        assert!(result.continuation.is_none());
    }

    #[test]
    fn renders_are_clipped_on_screen_but_captured_whole() {
        let (mut ctx, screen) = make_ctx();
        ctx.set_size(8, 4);
        let result = run_captured(&ctx, "show abcdefghij klm nop", true, 2);
        assert!(result.success);
        // Fork is 6 wide and 2 tall.
        assert_eq!(screen.contents(), "  abcdef\n  klm\n");
        assert_eq!(result.output, "abcdefghij\nklm\nnop\n");
    }

    #[test]
    fn tiny_parent_keeps_fork_bounded() {
        let (mut ctx, screen) = make_ctx();
        ctx.set_size(1, 1);
        let result = run_captured(&ctx, "show abc def", true, 0);
        assert!(result.success);
        assert_eq!(screen.contents(), "a\n");
        assert_eq!(result.output, "abc\ndef\n");
        assert_eq!(scaled(0, 3, 4), 0);
    }

    #[test]
    fn tool_executor_builds_transcript() {
        let (mut ctx, _screen) = make_ctx();
        let mut exec = ToolExecutor::new(true, 6);
        let mut runner = LineRunner::new();
        for line in ["echo one", "select a", "from b;"] {
            assert_eq!(runner.feed(&mut ctx, line, &mut exec), Outcome::Done);
        }
        assert!(!runner.is_active());
        assert_eq!(
            exec.transcript(),
            "Command: echo one\none\n\nCommand: select a\n\n\
             Command: select a\nfrom b;\nexec: select a\nfrom b;\n\n"
        );
    }

    #[test]
    fn tool_executor_stops_on_cancel() {
        let (mut ctx, _screen) = make_ctx();
        ctx.cancel_token().cancel();
        let mut exec = ToolExecutor::new(true, 6);
        let mut runner = LineRunner::new();
        assert_eq!(runner.feed(&mut ctx, "echo one", &mut exec), Outcome::Failed);
        assert!(exec.cancelled());
        assert!(exec.transcript().is_empty());
    }

    #[test]
    fn description_lists_commands() {
        let (ctx, _screen) = make_ctx();
        let text = tool_description(&ctx);
        assert!(text.starts_with("Execute xanadu command lines. Available commands: boom, bye, echo,"));
        assert!(text.ends_with("do not repeat it unless asked."));
    }
}
