//! Execution context: everything a running command can see and touch.

use std::cell::{RefCell, RefMut};
use std::io::Write;
use std::rc::Rc;

use xanadu_types::error::{Result, XanaduError};
use xanadu_types::level::LogLevel;

use crate::cancel::CancelToken;
use crate::continuation::Continuation;
use crate::registry::ProviderRegistry;
use crate::render::{self, Grid};
use crate::scratch::{Scratch, StateKey};
use crate::sink::{CaptureGate, Sink, SinkWriter};

const ANSI_RESET: &str = "\u{1b}[0m";
const ANSI_RED: &str = "\u{1b}[31m";
const ANSI_YELLOW: &str = "\u{1b}[33m";

const LOG_PREFIX: &str = "  - ";
const CONTINUATION_PREFIX: &str = "    ";

/// Most recent error caught at a dispatch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub message: String,
    pub detail: String,
}

/// Scratch slot holding the last caught error. Shared with forks.
pub const LAST_ERROR: StateKey<ErrorRecord> = StateKey::new("shell.last_error");

/// Secondary output that receives renders verbatim.
#[derive(Clone)]
struct RenderTap {
    sink: Sink,
    width: usize,
    height: usize,
    clip: bool,
}

/// Per-session (or per-fork) state passed to every command.
///
/// The registry, scratch store and cancel token are shared with forks. The
/// output sink, continuation slot and failure flag belong to one context.
pub struct ExecutionContext {
    out: Sink,
    registry: Rc<RefCell<ProviderRegistry>>,
    scratch: Rc<RefCell<Scratch>>,
    cancel: CancelToken,
    continuation: Option<Continuation>,
    log_level: LogLevel,
    failed: bool,
    allow_continuation: bool,
    width: usize,
    height: usize,
    clip: bool,
    render_tap: Option<RenderTap>,
    capture_gate: Option<CaptureGate>,
}

impl ExecutionContext {
    /// Top-level session context with an empty scratch store.
    pub fn new(out: Sink, registry: Rc<RefCell<ProviderRegistry>>) -> Self {
        Self {
            out,
            registry,
            scratch: Rc::new(RefCell::new(Scratch::new())),
            cancel: CancelToken::new(),
            continuation: None,
            log_level: LogLevel::default(),
            failed: false,
            allow_continuation: true,
            width: 0,
            height: 0,
            clip: true,
            render_tap: None,
            capture_gate: None,
        }
    }

    /// Child context writing to `out`.
    ///
    /// Shares registry, scratch and cancel token. Starts with no
    /// continuation, a clear failure flag and no render tap; inherits log
    /// level, size and clipping.
    pub fn fork(&self, out: Sink) -> Self {
        Self {
            out,
            registry: Rc::clone(&self.registry),
            scratch: Rc::clone(&self.scratch),
            cancel: self.cancel.clone(),
            continuation: None,
            log_level: self.log_level,
            failed: false,
            allow_continuation: self.allow_continuation,
            width: self.width,
            height: self.height,
            clip: self.clip,
            render_tap: None,
            capture_gate: None,
        }
    }

    // -- Output --

    pub fn out(&self) -> &Sink {
        &self.out
    }

    /// Write one line to the output sink.
    pub fn println(&self, text: impl AsRef<str>) -> Result<()> {
        let mut out = self.out.borrow_mut();
        writeln!(out, "{}", text.as_ref())?;
        out.flush()?;
        Ok(())
    }

    /// Write text without a trailing newline.
    pub fn print(&self, text: impl AsRef<str>) -> Result<()> {
        let mut out = self.out.borrow_mut();
        write!(out, "{}", text.as_ref())?;
        out.flush()?;
        Ok(())
    }

    /// Render a grid: clipped to the context size on screen, and verbatim
    /// into the render tap when one is attached.
    pub fn render(&self, grid: &dyn Grid) -> Result<()> {
        if let Some(gate) = &self.capture_gate {
            gate.set_open(false);
        }
        let screen = {
            let mut out = SinkWriter(Rc::clone(&self.out));
            render::dump(grid, &mut out, self.width, self.height, self.clip)
                .and_then(|()| out.flush())
        };
        if let Some(gate) = &self.capture_gate {
            gate.set_open(true);
        }
        screen?;
        if let Some(tap) = &self.render_tap {
            let mut out = SinkWriter(Rc::clone(&tap.sink));
            render::dump(grid, &mut out, tap.width, tap.height, tap.clip)?;
        }
        Ok(())
    }

    // -- User-visible log --

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.log_level = level;
    }

    /// Write a prefixed log line if `level` passes the context's filter.
    pub fn log(&self, level: LogLevel, message: &str) {
        self.write_log(LOG_PREFIX, level, message);
    }

    /// Like [`log`](Self::log), indented to sit under a continuation owner.
    pub fn log_continuation(&self, level: LogLevel, message: &str) {
        self.write_log(CONTINUATION_PREFIX, level, message);
    }

    fn write_log(&self, prefix: &str, level: LogLevel, message: &str) {
        if !self.log_level.allows(level) {
            return;
        }
        let line = match level {
            LogLevel::Error => format!("{ANSI_RED}{prefix}{message}{ANSI_RESET}"),
            LogLevel::Warn => format!("{ANSI_YELLOW}{prefix}{message}{ANSI_RESET}"),
            LogLevel::Info | LogLevel::Debug => format!("{prefix}{message}"),
        };
        if let Err(e) = self.println(line) {
            log::warn!("Failed to write log line: {e}");
        }
    }

    /// Log an error and mark the current command as failed.
    pub fn error(&mut self, message: &str) {
        self.failed = true;
        self.log(LogLevel::Error, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    // -- Failure tracking --

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn fail(&mut self) {
        self.failed = true;
    }

    pub fn reset_failure(&mut self) {
        self.failed = false;
    }

    /// Remember `error` as the last error and mark the command failed.
    pub fn record_error(&mut self, error: &XanaduError) {
        self.failed = true;
        let record = ErrorRecord {
            message: error.to_string(),
            detail: format!("{error:?}"),
        };
        self.scratch.borrow_mut().insert(&LAST_ERROR, record);
    }

    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.scratch.borrow().get(&LAST_ERROR).cloned()
    }

    // -- Continuation slot --

    /// Install a continuation, replacing any pending one.
    pub fn continue_with(&mut self, continuation: Continuation) {
        self.continuation = Some(continuation);
    }

    pub fn take_continuation(&mut self) -> Option<Continuation> {
        self.continuation.take()
    }

    /// Put `continuation` in the slot, returning what was there.
    pub fn replace_continuation(
        &mut self,
        continuation: Option<Continuation>,
    ) -> Option<Continuation> {
        std::mem::replace(&mut self.continuation, continuation)
    }

    pub fn clear_continuation(&mut self) {
        self.continuation = None;
    }

    pub fn continuation_owner(&self) -> Option<&str> {
        self.continuation.as_ref().map(Continuation::owner)
    }

    pub fn allow_continuation(&self) -> bool {
        self.allow_continuation
    }

    pub fn set_allow_continuation(&mut self, allow: bool) {
        self.allow_continuation = allow;
    }

    // -- Cancellation --

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Share `token` with this context (and its future forks).
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    /// Test-and-clear the cancellation flag.
    pub fn consume_cancel(&self) -> bool {
        self.cancel.consume()
    }

    // -- Shared state --

    pub fn registry(&self) -> &Rc<RefCell<ProviderRegistry>> {
        &self.registry
    }

    /// Borrow the scratch store. Do not hold the borrow across a nested
    /// dispatch.
    pub fn state(&self) -> RefMut<'_, Scratch> {
        self.scratch.borrow_mut()
    }

    // -- Geometry --

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn set_size(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
    }

    pub fn clip(&self) -> bool {
        self.clip
    }

    pub fn set_clip(&mut self, clip: bool) {
        self.clip = clip;
    }

    /// Copy every render into `sink` as well, laid out with its own limits.
    pub fn set_render_tap(&mut self, sink: Sink, width: usize, height: usize, clip: bool) {
        self.render_tap = Some(RenderTap {
            sink,
            width,
            height,
            clip,
        });
    }

    /// Gate to close while the clipped render is written to `out`.
    pub fn set_capture_gate(&mut self, gate: CaptureGate) {
        self.capture_gate = Some(gate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::ContinuationResult;
    use crate::render::TextGrid;
    use crate::sink::{SharedBuffer, TeeWriter, sink};

    fn make_ctx() -> (ExecutionContext, SharedBuffer) {
        let buf = SharedBuffer::new();
        let registry = Rc::new(RefCell::new(ProviderRegistry::new()));
        (ExecutionContext::new(sink(buf.clone()), registry), buf)
    }

    #[test]
    fn log_lines_are_prefixed_and_filtered() {
        let (mut ctx, buf) = make_ctx();
        ctx.info("hello");
        ctx.debug("hidden");
        ctx.log_continuation(LogLevel::Info, "more");
        assert_eq!(buf.contents(), "  - hello\n    more\n");
        ctx.set_log_level(LogLevel::Debug);
        ctx.debug("shown");
        assert!(buf.contents().ends_with("  - shown\n"));
    }

    #[test]
    fn error_is_red_and_sets_failure() {
        let (mut ctx, buf) = make_ctx();
        assert!(!ctx.failed());
        ctx.error("boom");
        assert!(ctx.failed());
        assert_eq!(buf.contents(), "\u{1b}[31m  - boom\u{1b}[0m\n");
        ctx.reset_failure();
        assert!(!ctx.failed());
    }

    #[test]
    fn warn_is_yellow_and_keeps_success() {
        let (mut ctx, buf) = make_ctx();
        ctx.set_log_level(LogLevel::Warn);
        ctx.warn("careful");
        ctx.info("quiet");
        assert!(!ctx.failed());
        assert_eq!(buf.contents(), "\u{1b}[33m  - careful\u{1b}[0m\n");
    }

    #[test]
    fn fork_shares_state_but_not_continuation() {
        let (mut ctx, _buf) = make_ctx();
        ctx.set_log_level(LogLevel::Debug);
        ctx.continue_with(Continuation::new("sql", |_, _| {
            Some(ContinuationResult::end())
        }));
        ctx.fail();
        let child_buf = SharedBuffer::new();
        let mut child = ctx.fork(sink(child_buf.clone()));
        assert!(child.continuation_owner().is_none());
        assert!(!child.failed());
        assert_eq!(child.log_level(), LogLevel::Debug);

        child.record_error(&XanaduError::Command("inner".into()));
        assert_eq!(
            ctx.last_error().map(|e| e.message),
            Some("command error: inner".to_string())
        );
        assert_eq!(ctx.continuation_owner(), Some("sql"));
    }

    #[test]
    fn fork_shares_cancel_token() {
        let (ctx, _buf) = make_ctx();
        let child = ctx.fork(sink(SharedBuffer::new()));
        child.cancel_token().cancel();
        assert!(ctx.consume_cancel());
        assert!(!child.consume_cancel());
    }

    #[test]
    fn render_clips_screen_and_taps_verbatim() {
        let screen = SharedBuffer::new();
        let capture = SharedBuffer::new();
        let gate = CaptureGate::new();
        let tee = TeeWriter::new(screen.clone(), capture.clone(), gate.clone());
        let registry = Rc::new(RefCell::new(ProviderRegistry::new()));
        let mut ctx = ExecutionContext::new(sink(tee), registry);
        ctx.set_size(3, 1);
        ctx.set_clip(true);
        ctx.set_capture_gate(gate);
        ctx.set_render_tap(sink(capture.clone()), 0, 0, false);

        ctx.render(&TextGrid::from_text("abcdef\nghijkl")).unwrap();
        assert_eq!(screen.contents(), "abc\n");
        assert_eq!(capture.contents(), "abcdef\nghijkl\n");
    }
}
