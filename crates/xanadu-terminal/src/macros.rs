//! User-defined macros: `def`, `undef`, `macros`, and invocation.
//!
//! A macro is a list of template lines. `$1`..`$N` are replaced by
//! positional arguments (missing ones become empty) and `$@` by the raw
//! argument text. Expanded lines run as a batch through the line runner.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use xanadu_types::error::{Result, XanaduError};

use crate::context::ExecutionContext;
use crate::continuation::{Continuation, ContinuationResult};
use crate::parser::ParsedCommand;
use crate::provider::{Command, CommandProvider, CommandStatus, command};
use crate::runner::{Site, run_lines};

pub const MACRO_PROVIDER: &str = "macros";

const DEF: &str = "def";
const UNDEF: &str = "undef";
const LIST: &str = "macros";
const DEF_USAGE: &str = "def <name> ... end";
const UNDEF_USAGE: &str = "undef <name>";

static PARAM_PATTERN: OnceLock<Regex> = OnceLock::new();
static INLINE_BODY_PATTERN: OnceLock<Regex> = OnceLock::new();

fn cached_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex> {
    if let Some(re) = cell.get() {
        return Ok(re);
    }
    let re = Regex::new(pattern).map_err(|e| XanaduError::Command(e.to_string()))?;
    Ok(cell.get_or_init(|| re))
}

fn param_pattern() -> Result<&'static Regex> {
    cached_regex(&PARAM_PATTERN, r"\$(\d+|@)")
}

/// Text before a trailing standalone `end`.
fn inline_body_pattern() -> Result<&'static Regex> {
    cached_regex(&INLINE_BODY_PATTERN, r"(?s)^(.*)\bend\b\s*$")
}

/// A stored macro body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    lines: Vec<String>,
    required_args: usize,
}

impl Macro {
    /// Build a macro, counting the highest positional placeholder used.
    pub fn new(lines: Vec<String>) -> Result<Self> {
        let pattern = param_pattern()?;
        let required_args = lines
            .iter()
            .flat_map(|line| pattern.captures_iter(line))
            .filter_map(|caps| caps[1].parse::<usize>().ok())
            .max()
            .unwrap_or(0);
        Ok(Self {
            lines,
            required_args,
        })
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn required_args(&self) -> usize {
        self.required_args
    }

    /// Substitute placeholders in every line.
    pub fn expand(&self, args: &[String], raw_args: &str) -> Result<Vec<String>> {
        let pattern = param_pattern()?;
        let expanded = self
            .lines
            .iter()
            .map(|line| {
                pattern
                    .replace_all(line, |caps: &Captures<'_>| {
                        if &caps[1] == "@" {
                            return raw_args.to_string();
                        }
                        caps[1]
                            .parse::<usize>()
                            .ok()
                            .and_then(|n| n.checked_sub(1))
                            .and_then(|i| args.get(i))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .into_owned()
            })
            .collect();
        Ok(expanded)
    }
}

type MacroTable = Rc<RefCell<BTreeMap<String, Macro>>>;

/// Provider for macro definition and invocation.
///
/// `def`, `undef` and `macros` match case-insensitively; macro names are
/// case-sensitive.
#[derive(Default)]
pub struct MacroProvider {
    macros: MacroTable,
}

impl MacroProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn builtin(name: &str) -> Option<&'static str> {
        [DEF, UNDEF, LIST]
            .into_iter()
            .find(|b| b.eq_ignore_ascii_case(name))
    }
}

impl CommandProvider for MacroProvider {
    fn name(&self) -> &str {
        MACRO_PROVIDER
    }

    fn supports(&self, input: &ParsedCommand) -> bool {
        Self::builtin(&input.name).is_some() || self.macros.borrow().contains_key(&input.name)
    }

    fn build(&self, input: &ParsedCommand) -> Box<dyn Command> {
        let input = input.clone();
        let macros = Rc::clone(&self.macros);
        match Self::builtin(&input.name) {
            Some(DEF) => command(move |ctx| define(ctx, &input, &macros)),
            Some(UNDEF) => command(move |ctx| undefine(ctx, &input, &macros)),
            Some(_) => command(move |ctx| list(ctx, &macros)),
            None => {
                let found = self.macros.borrow().get(&input.name).cloned();
                match found {
                    Some(body) => command(move |ctx| invoke(ctx, &input, &body)),
                    None => command(move |ctx| {
                        ctx.error(&format!("Unknown macro: {}", input.name));
                        Ok(CommandStatus::Failure)
                    }),
                }
            },
        }
    }

    fn names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = [DEF, UNDEF, LIST].into_iter().map(String::from).collect();
        names.extend(self.macros.borrow().keys().cloned());
        names
    }

    fn usage(&self, name: &str) -> Vec<String> {
        match name {
            DEF => vec![DEF_USAGE.to_string()],
            UNDEF => vec![UNDEF_USAGE.to_string()],
            _ => vec![name.to_string()],
        }
    }
}

/// Text after the macro name in a `def` line.
fn remainder_after_name<'a>(input: &'a ParsedCommand, name: &str) -> &'a str {
    let tail = input.tail();
    tail.strip_prefix(name).map_or(tail, str::trim)
}

fn store(ctx: &mut ExecutionContext, macros: &MacroTable, name: &str, lines: Vec<String>) {
    match Macro::new(lines) {
        Ok(body) => {
            log::debug!("Defined macro {name} ({} lines)", body.lines().len());
            macros.borrow_mut().insert(name.to_string(), body);
        },
        Err(e) => ctx.error(&format!("Could not define macro {name}: {e}")),
    }
}

fn define(ctx: &mut ExecutionContext, input: &ParsedCommand, macros: &MacroTable) -> Result<CommandStatus> {
    let Some(name) = input.arg(0) else {
        ctx.error(&format!("Usage: {DEF_USAGE}"));
        return Ok(CommandStatus::Failure);
    };
    let name = name.to_string();
    let remainder = remainder_after_name(input, &name).trim();

    if let Some(caps) = inline_body_pattern()?.captures(remainder) {
        let body = caps[1].trim();
        let lines = if body.is_empty() {
            Vec::new()
        } else {
            vec![body.to_string()]
        };
        store(ctx, macros, &name, lines);
        return Ok(CommandStatus::Success);
    }

    if !ctx.allow_continuation() {
        ctx.error(&format!("Macro {name} must be closed with end on the same line here."));
        return Ok(CommandStatus::Failure);
    }

    let mut lines: Vec<String> = Vec::new();
    if !remainder.is_empty() {
        lines.push(remainder.to_string());
    }
    let macros = Rc::clone(macros);
    ctx.continue_with(Continuation::new(DEF, move |line, ctx| {
        if line.trim() == "end" {
            store(ctx, &macros, &name, std::mem::take(&mut lines));
            return Some(ContinuationResult::end());
        }
        lines.push(line.to_string());
        Some(ContinuationResult::continue_without_execution())
    }));
    Ok(CommandStatus::Success)
}

fn undefine(ctx: &mut ExecutionContext, input: &ParsedCommand, macros: &MacroTable) -> Result<CommandStatus> {
    let Some(name) = input.arg(0) else {
        ctx.error(&format!("Usage: {UNDEF_USAGE}"));
        return Ok(CommandStatus::Failure);
    };
    if macros.borrow_mut().remove(name).is_none() {
        ctx.warn(&format!("Macro not found: {name}"));
    }
    Ok(CommandStatus::Success)
}

fn list(ctx: &mut ExecutionContext, macros: &MacroTable) -> Result<CommandStatus> {
    let names: Vec<String> = macros.borrow().keys().cloned().collect();
    if names.is_empty() {
        ctx.println("No macros defined.")?;
    }
    for name in names {
        ctx.println(name)?;
    }
    Ok(CommandStatus::Success)
}

fn invoke(ctx: &mut ExecutionContext, input: &ParsedCommand, body: &Macro) -> Result<CommandStatus> {
    let required = body.required_args();
    if input.args.len() < required {
        ctx.error(&format!("Macro requires at least {required} arguments."));
        return Ok(CommandStatus::Failure);
    }
    let lines = body.expand(&input.args, input.tail())?;
    Ok(run_lines(ctx, lines, Site::Macro).into())
}
