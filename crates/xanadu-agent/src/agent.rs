//! `agent` and `chat` commands and the conversation loop behind them.

use std::collections::BTreeMap;
use std::rc::Rc;

use xanadu_terminal::capture::ToolExecutor;
use xanadu_terminal::render::TextGrid;
use xanadu_terminal::scratch::StateKey;
use xanadu_terminal::table::{Args, Entry, Param, TableProvider};
use xanadu_terminal::{
    CommandStatus, Continuation, ContinuationResult, ExecutionContext, LineRunner, Outcome,
    ParsedCommand,
};
use xanadu_types::config::AgentConfig;
use xanadu_types::error::Result;

use crate::backend::{AgentBackend, ChatMessage, FinishReason};
use crate::parse::{Segment, parse_reply};
use crate::prompt::system_prompt;

pub const AGENT_PROVIDER: &str = "agent";

const AGENT: &str = "agent";
const CHAT: &str = "chat";
const CONTINUE: &str = "continue";
/// Tool turn for a batch that only fed lines to a pending continuation.
const INPUT_ACCEPTED: &str = "Input accepted.\n";

const BACKEND_KEY: StateKey<String> = StateKey::new("agent.backend");
const MODEL_KEY: StateKey<String> = StateKey::new("agent.model");
/// Conversation per lowercased backend id.
const HISTORY_KEY: StateKey<BTreeMap<String, Vec<ChatMessage>>> = StateKey::new("agent.history");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Keeps history and may carry continuations across turns.
    Chat,
    /// Fresh history, continuations disabled.
    Delegate,
}

type AgentHandler = fn(&Agent, &mut ExecutionContext, &ParsedCommand, &Args) -> Result<CommandStatus>;

struct Agent {
    backends: Vec<Rc<dyn AgentBackend>>,
    config: AgentConfig,
}

/// Build the `agent`/`chat` command table over `backends`.
pub fn agent_provider(backends: Vec<Rc<dyn AgentBackend>>, config: AgentConfig) -> TableProvider {
    let agent = Rc::new(Agent { backends, config });
    let row = |params: &[Param], handler: AgentHandler| {
        let agent = Rc::clone(&agent);
        Entry::new(AGENT, params, move |ctx, input, args| handler(&agent, ctx, input, args))
    };
    let prompt: &[Param] = &[Param::rest("prompt")];

    let chat_agent = Rc::clone(&agent);
    let chat_row = move |params: &[Param]| {
        let agent = Rc::clone(&chat_agent);
        Entry::new(CHAT, params, move |ctx, input, args| agent.chat(ctx, input, args))
    };

    TableProvider::new(AGENT_PROVIDER)
        .entry(row(&[], Agent::show_usage))
        .entry(row(&[], Agent::chat).sub("chat").usage("agent chat"))
        .entry(row(prompt, Agent::chat).sub("chat").usage("agent chat <prompt>"))
        .entry(row(prompt, Agent::delegate).sub("delegate").usage("agent delegate <prompt>"))
        .entry(row(&[], Agent::show_model).sub("model"))
        .entry(
            row(&[Param::str("name")], Agent::set_model)
                .sub("model")
                .usage("agent model <name|backend:name>"),
        )
        .entry(row(&[], Agent::list_models).sub("models"))
        .entry(row(&[], Agent::show_prompt).sub("showprompt"))
        .entry(row(&[], Agent::reset).sub("reset"))
        .entry(row(&[], Agent::show_history).sub("history"))
        .entry(chat_row(&[]).usage("chat"))
        .entry(chat_row(prompt).usage("chat <prompt>"))
}

/// Continuation that turns every following line into another prompt until
/// a blank line.
fn chat_continuation(owner: &'static str) -> Continuation {
    Continuation::new(owner, move |line, _ctx| {
        if line.trim().is_empty() {
            return Some(ContinuationResult::end());
        }
        let tail = if owner == AGENT {
            format!("chat {line}")
        } else {
            line.to_string()
        };
        Some(ContinuationResult::execute_and_continue(tail))
    })
}

/// Prompt text as typed, or `None` when no prompt was given.
///
/// Uses the raw line so quotes and apostrophes reach the model unchanged.
fn prompt_of(input: &ParsedCommand, skip_sub: bool, args: &Args) -> Result<Option<String>> {
    if args.is_empty() {
        return Ok(None);
    }
    let mut text = input.tail();
    if skip_sub {
        text = text
            .split_once(char::is_whitespace)
            .map_or("", |(_, rest)| rest.trim());
    }
    if text.is_empty() {
        return Ok(Some(args.str(0)?.to_string()));
    }
    Ok(Some(text.to_string()))
}

/// Render reply text indented by two columns, wrapped to the context width.
fn render_text(ctx: &ExecutionContext, text: &str) -> Result<()> {
    let width = if ctx.width() > 0 {
        ctx.width().saturating_sub(2).max(1)
    } else {
        0
    };
    ctx.render(&TextGrid::wrapped(text, width).padded(2))?;
    ctx.println("")
}

/// What running one reply's tool segments produced.
struct ToolRun {
    transcript: String,
    success: bool,
    continuation: Option<Continuation>,
}

/// Render text segments and feed tool lines through a line runner whose
/// executor runs each line in a captured fork.
fn run_segments(
    ctx: &mut ExecutionContext,
    segments: &[Segment],
    carried: Option<Continuation>,
    allow_continuation: bool,
    indent: usize,
) -> Result<ToolRun> {
    let mut runner = LineRunner::with_active(carried);
    let mut exec = ToolExecutor::new(allow_continuation, indent);
    for segment in segments {
        match segment {
            Segment::Text(text) => render_text(ctx, text)?,
            Segment::Tools(lines) => {
                for line in lines {
                    if runner.feed(ctx, line, &mut exec) != Outcome::Done {
                        return Ok(ToolRun {
                            continuation: runner.take_active(),
                            transcript: exec.into_transcript(),
                            success: false,
                        });
                    }
                }
            },
        }
    }
    Ok(ToolRun {
        continuation: runner.take_active(),
        transcript: exec.into_transcript(),
        success: true,
    })
}

impl Agent {
    fn backend(&self, id: &str) -> Option<&Rc<dyn AgentBackend>> {
        self.backends.iter().find(|b| b.id().eq_ignore_ascii_case(id))
    }

    fn current_backend_id(&self, ctx: &ExecutionContext) -> String {
        ctx.state()
            .get(&BACKEND_KEY)
            .filter(|id| !id.is_empty())
            .cloned()
            .unwrap_or_else(|| self.config.backend.clone())
    }

    fn current_model(&self, ctx: &ExecutionContext) -> String {
        ctx.state()
            .get(&MODEL_KEY)
            .filter(|m| !m.is_empty())
            .cloned()
            .unwrap_or_else(|| self.config.model.clone())
    }

    /// The selected backend, if it exists and is configured. Reports why not.
    fn ready_backend(&self, ctx: &mut ExecutionContext) -> Option<Rc<dyn AgentBackend>> {
        let id = self.current_backend_id(ctx);
        let Some(backend) = self.backend(&id) else {
            ctx.error(&format!("No agent backend named {id} is available."));
            return None;
        };
        if !backend.is_configured() {
            ctx.error(&backend.missing_config_message());
            return None;
        }
        Some(Rc::clone(backend))
    }

    fn history_key(backend: &dyn AgentBackend) -> String {
        backend.id().to_ascii_lowercase()
    }

    /// Stored conversation with `backend`, seeded with the system prompt.
    fn history(&self, ctx: &ExecutionContext, backend: &dyn AgentBackend) -> Vec<ChatMessage> {
        let key = Self::history_key(backend);
        let stored = ctx
            .state()
            .get(&HISTORY_KEY)
            .and_then(|all| all.get(&key))
            .cloned();
        stored.unwrap_or_else(|| vec![ChatMessage::system(system_prompt(ctx, false))])
    }

    fn save_history(
        ctx: &ExecutionContext,
        backend: &dyn AgentBackend,
        messages: Vec<ChatMessage>,
    ) -> Result<()> {
        ctx.state()
            .get_or_insert_with(&HISTORY_KEY, BTreeMap::new)?
            .insert(Self::history_key(backend), messages);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn show_usage(&self, ctx: &mut ExecutionContext, _input: &ParsedCommand, _args: &Args) -> Result<CommandStatus> {
        let usage = ctx.registry().borrow().usage(AGENT);
        ctx.println("Usage:")?;
        for line in usage {
            ctx.println(format!("  {line}"))?;
        }
        Ok(CommandStatus::Success)
    }

    fn chat(&self, ctx: &mut ExecutionContext, input: &ParsedCommand, args: &Args) -> Result<CommandStatus> {
        let owner = if input.name.eq_ignore_ascii_case(CHAT) {
            CHAT
        } else {
            AGENT
        };
        let Some(prompt) = prompt_of(input, owner == AGENT, args)? else {
            if ctx.allow_continuation() {
                ctx.continue_with(chat_continuation(owner));
                ctx.debug("Entering chat mode.");
                return Ok(CommandStatus::Success);
            }
            let usage = if owner == AGENT { "agent chat" } else { CHAT };
            ctx.error(&format!("Usage: {usage} <prompt>"));
            return Ok(CommandStatus::Failure);
        };
        let Some(backend) = self.ready_backend(ctx) else {
            return Ok(CommandStatus::Failure);
        };
        if ctx.allow_continuation() {
            ctx.continue_with(chat_continuation(owner));
        }
        ctx.debug(&format!("Starting agent chat with {}.", backend.display_name()));

        let mut messages = self.history(ctx, backend.as_ref());
        messages.push(ChatMessage::user(prompt));
        let status = self.converse(ctx, backend.as_ref(), &mut messages, Mode::Chat);
        Self::save_history(ctx, backend.as_ref(), messages)?;
        status
    }

    fn delegate(&self, ctx: &mut ExecutionContext, input: &ParsedCommand, args: &Args) -> Result<CommandStatus> {
        let Some(prompt) = prompt_of(input, true, args)? else {
            ctx.error("Usage: agent delegate <prompt>");
            return Ok(CommandStatus::Failure);
        };
        let Some(backend) = self.ready_backend(ctx) else {
            return Ok(CommandStatus::Failure);
        };
        ctx.debug(&format!("Delegating to {}.", backend.display_name()));
        let mut messages = vec![
            ChatMessage::system(system_prompt(ctx, true)),
            ChatMessage::user(prompt),
        ];
        self.converse(ctx, backend.as_ref(), &mut messages, Mode::Delegate)
    }

    fn show_model(&self, ctx: &mut ExecutionContext, _input: &ParsedCommand, _args: &Args) -> Result<CommandStatus> {
        let label = format!("{}:{}", self.current_backend_id(ctx), self.current_model(ctx));
        ctx.println(label)?;
        Ok(CommandStatus::Success)
    }

    /// First configured backend that lists `model`.
    fn backend_for_model(&self, model: &str) -> Option<String> {
        self.backends
            .iter()
            .filter(|b| b.is_configured())
            .find(|b| match b.list_models() {
                Ok(models) => models.iter().any(|m| m.eq_ignore_ascii_case(model)),
                Err(e) => {
                    log::warn!("Could not list models from {}: {e}", b.display_name());
                    false
                },
            })
            .map(|b| b.id().to_string())
    }

    fn set_model(&self, ctx: &mut ExecutionContext, _input: &ParsedCommand, args: &Args) -> Result<CommandStatus> {
        let raw = args.str(0)?;
        let (backend_id, model) = match raw.split_once(':') {
            Some((backend, model)) if !backend.is_empty() => {
                let model = if model.is_empty() {
                    self.current_model(ctx)
                } else {
                    model.to_string()
                };
                (Some(backend.to_string()), model)
            },
            Some((_, model)) => (None, model.to_string()),
            None => (None, raw.to_string()),
        };

        let backend_id = match backend_id {
            Some(id) => {
                if self.backend(&id).is_none() {
                    ctx.warn(&format!("Unknown backend: {id}"));
                }
                id
            },
            None => match self.backend_for_model(&model) {
                Some(id) => id,
                None => {
                    ctx.warn(&format!("No backend found for model: {model}"));
                    self.current_backend_id(ctx)
                },
            },
        };

        log::info!("Agent model set to {backend_id}:{model}");
        {
            let mut state = ctx.state();
            state.insert(&BACKEND_KEY, backend_id.clone());
            state.insert(&MODEL_KEY, model.clone());
        }
        ctx.println(format!("Model set to {backend_id}:{model}"))?;
        Ok(CommandStatus::Success)
    }

    fn list_models(&self, ctx: &mut ExecutionContext, _input: &ParsedCommand, _args: &Args) -> Result<CommandStatus> {
        for backend in &self.backends {
            if !backend.is_configured() {
                ctx.warn(&backend.missing_config_message());
                continue;
            }
            ctx.debug(&format!("Fetching model list from {}.", backend.display_name()));
            let models = match backend.list_models() {
                Ok(models) => models,
                Err(e) => {
                    ctx.warn(&format!("Could not list models from {}: {e}", backend.display_name()));
                    continue;
                },
            };
            if models.is_empty() {
                ctx.println(format!("No models returned from {}.", backend.display_name()))?;
            }
            for model in models {
                ctx.println(format!("{}:{model}", backend.id()))?;
            }
        }
        Ok(CommandStatus::Success)
    }

    fn show_prompt(&self, ctx: &mut ExecutionContext, _input: &ParsedCommand, _args: &Args) -> Result<CommandStatus> {
        ctx.println(system_prompt(ctx, false))?;
        Ok(CommandStatus::Success)
    }

    fn reset(&self, ctx: &mut ExecutionContext, _input: &ParsedCommand, _args: &Args) -> Result<CommandStatus> {
        let id = self.current_backend_id(ctx);
        if let Some(all) = ctx.state().get_mut(&HISTORY_KEY) {
            all.remove(&id.to_ascii_lowercase());
        }
        match self.backend(&id) {
            Some(backend) => {
                ctx.println(format!("Agent history cleared for {}.", backend.display_name()))?
            },
            None => ctx.println("Agent history cleared.")?,
        }
        Ok(CommandStatus::Success)
    }

    fn show_history(&self, ctx: &mut ExecutionContext, _input: &ParsedCommand, _args: &Args) -> Result<CommandStatus> {
        let key = self.current_backend_id(ctx).to_ascii_lowercase();
        let stored = ctx
            .state()
            .get(&HISTORY_KEY)
            .and_then(|all| all.get(&key))
            .cloned();
        match stored {
            Some(messages) => ctx.println(serde_json::to_string_pretty(&messages)?)?,
            None => ctx.println("No conversation history.")?,
        }
        Ok(CommandStatus::Success)
    }

    // -----------------------------------------------------------------------
    // Conversation loop
    // -----------------------------------------------------------------------

    /// Talk to `backend` until it answers without tool calls, a tool fails,
    /// or a stop condition hits. `messages` holds the whole conversation and
    /// grows in place.
    fn converse(
        &self,
        ctx: &mut ExecutionContext,
        backend: &dyn AgentBackend,
        messages: &mut Vec<ChatMessage>,
        mode: Mode,
    ) -> Result<CommandStatus> {
        let name = backend.display_name();
        let model = self.current_model(ctx);
        let allow_continuation = mode == Mode::Chat && ctx.allow_continuation();

        let mut last_calls: Vec<String> = Vec::new();
        let mut last_succeeded = true;
        let mut pending_text: Option<String> = None;
        let mut pending: Option<Continuation> = None;

        for _ in 0..self.config.max_turns {
            if ctx.consume_cancel() {
                ctx.warn("Agent chat cancelled.");
                return Ok(CommandStatus::Failure);
            }

            ctx.debug(&format!("Sending request to {name}."));
            let response = match backend.chat(messages, &model) {
                Ok(response) if !response.text.trim().is_empty() => response,
                Ok(_) => {
                    ctx.error(&format!("No response from {name}."));
                    return Ok(CommandStatus::Failure);
                },
                Err(e) => {
                    log::warn!("{name} request failed: {e}");
                    ctx.debug(&e.to_string());
                    ctx.error(&format!("No response from {name}."));
                    return Ok(CommandStatus::Failure);
                },
            };
            messages.push(ChatMessage::assistant(response.text.clone()));

            let normalized = backend.normalize_response(&response.text);
            let combined = match pending_text.take() {
                Some(earlier) => format!("{earlier}\n{normalized}"),
                None => normalized,
            };
            let parsed = parse_reply(&combined);
            if parsed.incomplete {
                log::debug!("{name} reply ended inside a tool block; asking to continue");
                pending_text = Some(combined);
                messages.push(ChatMessage::user(CONTINUE));
                continue;
            }

            if !parsed.has_tool_calls() {
                ctx.debug(&format!("Received response from {name}."));
                render_text(ctx, &combined)?;
                if response.finish == FinishReason::Length {
                    messages.push(ChatMessage::user(CONTINUE));
                    continue;
                }
                return Ok(CommandStatus::Success);
            }

            if parsed.tool_calls == last_calls && last_succeeded {
                ctx.warn(&format!("{name} repeated the same tool call; stopping."));
                return Ok(CommandStatus::Success);
            }
            ctx.debug(&format!(
                "{name} requested {} tool call(s).",
                parsed.tool_calls.len()
            ));
            last_calls = parsed.tool_calls.clone();

            let run = run_segments(
                ctx,
                &parsed.segments,
                pending.take(),
                allow_continuation,
                self.config.tool_indent,
            )?;
            if !run.success {
                if !run.transcript.is_empty() {
                    messages.push(ChatMessage::user(run.transcript));
                }
                return Ok(CommandStatus::Failure);
            }

            // Every tool batch answers with exactly one user turn.
            let mut turn = run.transcript;
            match run.continuation {
                Some(waiting) if mode == Mode::Delegate => {
                    ctx.error(&format!(
                        "Delegated agent left {} waiting for more input.",
                        waiting.owner()
                    ));
                    return Ok(CommandStatus::Failure);
                },
                Some(waiting) => {
                    log::debug!("Tool {} waits for more lines from {name}", waiting.owner());
                    turn.push_str(&format!("Waiting for more input for {}.\n", waiting.owner()));
                    messages.push(ChatMessage::user(turn));
                    messages.push(ChatMessage::user(CONTINUE));
                    pending = Some(waiting);
                    last_succeeded = false;
                },
                None => {
                    if turn.is_empty() {
                        turn.push_str(INPUT_ACCEPTED);
                    }
                    messages.push(ChatMessage::user(turn));
                    last_succeeded = true;
                },
            }
        }

        ctx.warn(&format!(
            "{name} did not finish within {} turns; stopping.",
            self.config.max_turns
        ));
        Ok(CommandStatus::Success)
    }
}
