//! Built-in shell commands: help, provider overlays, log level, last error,
//! echo, script runs and quit.

use std::path::Path;

use xanadu_types::error::Result;
use xanadu_types::level::LogLevel;

use crate::context::ExecutionContext;
use crate::parser::ParsedCommand;
use crate::provider::CommandStatus;
use crate::registry::{ProviderId, ProviderRegistry};
use crate::script::run_script;
use crate::table::{Args, Entry, Param, TableProvider};

/// Provider name of the built-in commands.
pub const SYSTEM_PROVIDER: &str = "system";

/// Build the built-in command table.
pub fn system_provider() -> TableProvider {
    TableProvider::new(SYSTEM_PROVIDER)
        .entry(Entry::new("help", &[], help_all))
        .entry(Entry::new("help", &[Param::str("command")], help_command))
        .entry(Entry::new(
            "help",
            &[Param::str("command"), Param::str("subcommand")],
            help_command,
        ))
        .entry(Entry::new("enable", &[Param::str("provider")], enable))
        .entry(Entry::new("disable", &[Param::str("provider")], disable))
        .entry(Entry::new("loglevel", &[], show_log_level))
        .entry(Entry::new("loglevel", &[Param::str("level")], set_log_level))
        .entry(Entry::new("lasterror", &[], last_error))
        .entry(Entry::new("echo", &[], |ctx, _, _| {
            ctx.println("")?;
            Ok(CommandStatus::Success)
        }))
        .entry(Entry::new("echo", &[Param::rest("text")], |ctx, _, args| {
            ctx.println(args.str(0)?)?;
            Ok(CommandStatus::Success)
        }))
        .entry(Entry::new("run", &[Param::str("path")], run))
        .entry(Entry::new("quit", &[], quit))
        .entry(Entry::new("q", &[], quit))
}

/// Register the built-in commands in the default search order.
pub fn register_system_commands(registry: &mut ProviderRegistry) -> ProviderId {
    registry.register(Box::new(system_provider()))
}

fn quit(_ctx: &mut ExecutionContext, _input: &ParsedCommand, _args: &Args) -> Result<CommandStatus> {
    Ok(CommandStatus::Exit)
}

fn run(ctx: &mut ExecutionContext, _input: &ParsedCommand, args: &Args) -> Result<CommandStatus> {
    let outcome = run_script(ctx, Path::new(args.str(0)?))?;
    Ok(outcome.into())
}

// ---------------------------------------------------------------------------
// help
// ---------------------------------------------------------------------------

/// Signature lines of one command: `name sub` per subcommand, then usage,
/// without duplicates.
fn signatures(registry: &ProviderRegistry, id: ProviderId, name: &str) -> Vec<String> {
    let Some(provider) = registry.get(id) else {
        return Vec::new();
    };
    let mut lines: Vec<String> = Vec::new();
    let candidates = provider
        .subcommands(name)
        .into_iter()
        .map(|sub| format!("{name} {sub}"))
        .chain(provider.usage(name));
    for line in candidates {
        if !lines.contains(&line) {
            lines.push(line);
        }
    }
    lines
}

fn help_all(ctx: &mut ExecutionContext, _input: &ParsedCommand, _args: &Args) -> Result<CommandStatus> {
    let mut lines = vec!["Commands:".to_string()];
    {
        let registry = ctx.registry().borrow();
        for id in registry.ordered() {
            let Some(provider) = registry.get(id) else {
                continue;
            };
            lines.push(format!("  [{}] {}", registry.state(id), provider.name()));
            for name in provider.names() {
                for signature in signatures(&registry, id, &name) {
                    lines.push(format!("    {signature}"));
                }
            }
        }
    }
    for line in lines {
        ctx.println(line)?;
    }
    Ok(CommandStatus::Success)
}

/// Canonical spelling of `name` as some reachable provider declares it.
fn owned_name(registry: &ProviderRegistry, name: &str) -> Option<String> {
    if registry.provider_for_command(name).is_some() {
        return Some(name.to_string());
    }
    let lower = name.to_ascii_lowercase();
    registry.provider_for_command(&lower).map(|_| lower)
}

fn help_command(ctx: &mut ExecutionContext, _input: &ParsedCommand, args: &Args) -> Result<CommandStatus> {
    let requested = args.str(0)?;
    let sub = if args.len() > 1 { Some(args.str(1)?) } else { None };

    let (name, usage, subcommands) = {
        let registry = ctx.registry().borrow();
        let Some(name) = owned_name(&registry, requested) else {
            drop(registry);
            ctx.error(&format!("Unknown command: {requested}"));
            return Ok(CommandStatus::Failure);
        };
        let usage = registry.usage(&name);
        let subcommands = registry.subcommands(&name);
        (name, usage, subcommands)
    };

    let mut shown = usage.clone();
    if let Some(sub) = sub {
        let prefix = format!("{name} {sub}").to_ascii_lowercase();
        let matching: Vec<String> = usage
            .iter()
            .filter(|line| line.to_ascii_lowercase().starts_with(&prefix))
            .cloned()
            .collect();
        if matching.is_empty() {
            ctx.warn(&format!("No detailed usage for {name} {sub}"));
        } else {
            shown = matching;
        }
    }

    ctx.println("Usage:")?;
    for line in &shown {
        ctx.println(format!("  {line}"))?;
    }
    if !subcommands.is_empty() {
        ctx.println("")?;
        ctx.println("Subcommands:")?;
        for sub in &subcommands {
            ctx.println(format!("  {name} {sub}"))?;
        }
    }
    Ok(CommandStatus::Success)
}

// ---------------------------------------------------------------------------
// Provider overlays
// ---------------------------------------------------------------------------

fn enable(ctx: &mut ExecutionContext, _input: &ParsedCommand, args: &Args) -> Result<CommandStatus> {
    set_provider(ctx, args.str(0)?, true)
}

fn disable(ctx: &mut ExecutionContext, _input: &ParsedCommand, args: &Args) -> Result<CommandStatus> {
    set_provider(ctx, args.str(0)?, false)
}

fn set_provider(ctx: &mut ExecutionContext, name: &str, enabled: bool) -> Result<CommandStatus> {
    let changed = {
        let mut registry = ctx.registry().borrow_mut();
        registry.find_by_name(name).and_then(|id| {
            if enabled {
                registry.enable(id);
            } else {
                registry.disable(id);
            }
            registry.get(id).map(|p| p.name().to_string())
        })
    };
    let Some(provider) = changed else {
        ctx.error(&format!("No provider named: {name}"));
        return Ok(CommandStatus::Failure);
    };
    log::info!("Provider {provider} {}", if enabled { "enabled" } else { "disabled" });
    if enabled {
        ctx.println(format!("Enabled: {provider}"))?;
    } else {
        ctx.println(format!("Disabled: {provider}"))?;
    }
    Ok(CommandStatus::Success)
}

// ---------------------------------------------------------------------------
// Log level and last error
// ---------------------------------------------------------------------------

fn show_log_level(ctx: &mut ExecutionContext, _input: &ParsedCommand, _args: &Args) -> Result<CommandStatus> {
    ctx.println(format!("Log level: {}", ctx.log_level()))?;
    Ok(CommandStatus::Success)
}

fn set_log_level(ctx: &mut ExecutionContext, _input: &ParsedCommand, args: &Args) -> Result<CommandStatus> {
    let requested = args.str(0)?;
    match requested.parse::<LogLevel>() {
        Ok(level) => {
            ctx.set_log_level(level);
            ctx.println(format!("Log level set to {level}"))?;
            Ok(CommandStatus::Success)
        },
        Err(_) => {
            ctx.error(&format!("Unknown log level: {requested}"));
            ctx.println(format!("Available levels: {}", LogLevel::available()))?;
            Ok(CommandStatus::Failure)
        },
    }
}

fn last_error(ctx: &mut ExecutionContext, _input: &ParsedCommand, _args: &Args) -> Result<CommandStatus> {
    match ctx.last_error() {
        None => ctx.println("No error recorded.")?,
        Some(record) => {
            ctx.println(&record.message)?;
            if ctx.log_level().allows(LogLevel::Debug) {
                ctx.println(&record.detail)?;
            } else {
                ctx.info("Set loglevel debug to see details.");
            }
        },
    }
    Ok(CommandStatus::Success)
}
