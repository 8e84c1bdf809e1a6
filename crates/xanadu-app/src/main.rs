//! xanadu entry point.
//!
//! `xanadu <script>` runs the script and exits non-zero if it fails.
//! Without arguments the interactive shell reads from stdin until end of
//! input or `quit`. Ctrl+C cancels the running agent chat or pending
//! continuation instead of killing the process.

use std::cell::RefCell;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{Context, Result};

use xanadu_agent::{AgentBackend, EchoBackend, agent_provider};
use xanadu_terminal::macros::MacroProvider;
use xanadu_terminal::repl::Repl;
use xanadu_terminal::script::run_script;
use xanadu_terminal::sink::{Sink, sink};
use xanadu_terminal::system_commands::register_system_commands;
use xanadu_terminal::{ExecutionContext, Outcome, ProviderRegistry};
use xanadu_types::config::ShellConfig;

/// Compiled-in providers in discovery order.
fn build_registry(config: &ShellConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    register_system_commands(&mut registry);
    registry.register(Box::new(MacroProvider::new()));
    let echo: Rc<dyn AgentBackend> = Rc::new(EchoBackend);
    registry.register(Box::new(agent_provider(vec![echo], config.agent.clone())));
    registry
}

fn build_context(config: &ShellConfig, out: Sink) -> Result<ExecutionContext> {
    let registry = Rc::new(RefCell::new(build_registry(config)));
    let mut ctx = ExecutionContext::new(out, registry);
    ctx.set_size(config.width, config.height);
    ctx.set_log_level(config.log_level()?);
    Ok(ctx)
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = ShellConfig::load().context("failed to load configuration")?;
    log::info!("Starting xanadu ({}x{})", config.width, config.height);

    let mut ctx = build_context(&config, sink(io::stdout()))?;
    let token = ctx.cancel_token().clone();
    ctrlc::set_handler(move || token.cancel()).context("failed to set Ctrl+C handler")?;

    let outcome = match std::env::args_os().nth(1) {
        Some(path) => {
            let path = PathBuf::from(path);
            run_script(&mut ctx, &path).with_context(|| format!("failed to run {}", path.display()))?
        },
        None => {
            let stdin = io::stdin();
            Repl::new(stdin.lock(), config.prompt.clone()).run(&mut ctx)?
        },
    };

    log::info!("xanadu finished: {outcome:?}");
    Ok(match outcome {
        Outcome::Failed => ExitCode::FAILURE,
        Outcome::Done | Outcome::Exit => ExitCode::SUCCESS,
    })
}
