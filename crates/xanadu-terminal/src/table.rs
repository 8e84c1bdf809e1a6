//! Table-driven command providers.
//!
//! A [`TableProvider`] is a list of [`Entry`] rows, each mapping a command
//! name (plus optional subcommand) and a typed parameter list to a handler.
//! Overloads are separate rows; the first row whose shape and argument
//! coercion both fit wins.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use xanadu_types::error::{Result, XanaduError};

use crate::context::ExecutionContext;
use crate::parser::ParsedCommand;
use crate::provider::{Command, CommandProvider, CommandStatus, command};

/// Declared type of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
    Float,
    Bool,
    /// Every remaining argument joined with single spaces. Must be last;
    /// needs at least one argument.
    Rest,
}

/// A named, typed parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
}

impl Param {
    pub const fn str(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Str,
        }
    }

    pub const fn int(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Int,
        }
    }

    pub const fn float(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Float,
        }
    }

    pub const fn bool(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Bool,
        }
    }

    pub const fn rest(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Rest,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParamKind::Rest => write!(f, "<{}...>", self.name),
            _ => write!(f, "<{}>", self.name),
        }
    }
}

/// A coerced argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    fn coerce(kind: ParamKind, raw: &str) -> Option<Self> {
        match kind {
            ParamKind::Str | ParamKind::Rest => Some(Value::Str(raw.to_string())),
            ParamKind::Int => raw.parse().ok().map(Value::Int),
            ParamKind::Float => raw.parse().ok().map(Value::Float),
            ParamKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
        }
    }
}

/// Coerced arguments handed to a handler, in parameter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<Value>,
}

impl Args {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn str(&self, index: usize) -> Result<&str> {
        match self.values.get(index) {
            Some(Value::Str(s)) => Ok(s.as_str()),
            other => Err(mismatch(index, "string", other)),
        }
    }

    pub fn int(&self, index: usize) -> Result<i64> {
        match self.values.get(index) {
            Some(Value::Int(n)) => Ok(*n),
            other => Err(mismatch(index, "integer", other)),
        }
    }

    pub fn float(&self, index: usize) -> Result<f64> {
        match self.values.get(index) {
            Some(Value::Float(n)) => Ok(*n),
            other => Err(mismatch(index, "number", other)),
        }
    }

    pub fn bool(&self, index: usize) -> Result<bool> {
        match self.values.get(index) {
            Some(Value::Bool(b)) => Ok(*b),
            other => Err(mismatch(index, "boolean", other)),
        }
    }
}

fn mismatch(index: usize, wanted: &str, found: Option<&Value>) -> XanaduError {
    XanaduError::Command(format!(
        "argument {index}: expected {wanted}, found {found:?}"
    ))
}

/// Handler invoked with the context, the parsed line and coerced arguments.
pub type Handler = Rc<dyn Fn(&mut ExecutionContext, &ParsedCommand, &Args) -> Result<CommandStatus>>;

/// One row of a command table.
#[derive(Clone)]
pub struct Entry {
    name: &'static str,
    sub: Option<&'static str>,
    params: Vec<Param>,
    usage: Option<&'static str>,
    handler: Handler,
}

impl Entry {
    pub fn new<F>(name: &'static str, params: &[Param], handler: F) -> Self
    where
        F: Fn(&mut ExecutionContext, &ParsedCommand, &Args) -> Result<CommandStatus> + 'static,
    {
        Self {
            name,
            sub: None,
            params: params.to_vec(),
            usage: None,
            handler: Rc::new(handler),
        }
    }

    /// Require `sub` as the first argument.
    pub fn sub(mut self, sub: &'static str) -> Self {
        self.sub = Some(sub);
        self
    }

    /// Override the generated usage line.
    pub fn usage(mut self, usage: &'static str) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn usage_line(&self) -> String {
        if let Some(usage) = self.usage {
            return usage.to_string();
        }
        let mut line = self.name.to_string();
        if let Some(sub) = self.sub {
            line.push(' ');
            line.push_str(sub);
        }
        for param in &self.params {
            line.push_str(&format!(" {param}"));
        }
        line
    }

    /// Coerce `args` against this row, or `None` if the shape does not fit.
    fn bind(&self, input: &ParsedCommand) -> Option<Args> {
        if !self.name.eq_ignore_ascii_case(&input.name) {
            return None;
        }
        let mut args: &[String] = &input.args;
        if let Some(sub) = self.sub {
            let (first, rest) = args.split_first()?;
            if !first.eq_ignore_ascii_case(sub) {
                return None;
            }
            args = rest;
        }

        let rest_last = matches!(self.params.last(), Some(p) if p.kind == ParamKind::Rest);
        let fixed = if rest_last {
            self.params.len() - 1
        } else {
            self.params.len()
        };
        if rest_last {
            if args.len() <= fixed {
                return None;
            }
        } else if args.len() != fixed {
            return None;
        }

        let mut values = Vec::with_capacity(self.params.len());
        for (param, raw) in self.params[..fixed].iter().zip(args) {
            values.push(Value::coerce(param.kind, raw)?);
        }
        if rest_last {
            values.push(Value::Str(args[fixed..].join(" ")));
        }
        Some(Args { values })
    }
}

/// Provider backed by a table of [`Entry`] rows.
pub struct TableProvider {
    name: String,
    entries: Vec<Entry>,
}

impl TableProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn rows_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.name.eq_ignore_ascii_case(name))
    }
}

impl CommandProvider for TableProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, input: &ParsedCommand) -> bool {
        self.rows_for(&input.name).next().is_some()
    }

    fn build(&self, input: &ParsedCommand) -> Box<dyn Command> {
        let input = input.clone();
        let name = input.name.clone();
        for entry in self.rows_for(&name) {
            if let Some(args) = entry.bind(&input) {
                let handler = Rc::clone(&entry.handler);
                return command(move |ctx| handler(ctx, &input, &args));
            }
        }
        let usage: Vec<String> = self.rows_for(&name).map(Entry::usage_line).collect();
        command(move |ctx| {
            ctx.error(&format!("Invalid arguments for {}.", input.name));
            ctx.println("Usage:")?;
            for line in &usage {
                ctx.println(format!("  {line}"))?;
            }
            Ok(CommandStatus::Failure)
        })
    }

    fn names(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.name.to_string()).collect()
    }

    fn subcommands(&self, name: &str) -> Vec<String> {
        let mut subs: Vec<String> = Vec::new();
        for sub in self.rows_for(name).filter_map(|e| e.sub) {
            if !subs.iter().any(|s| s == sub) {
                subs.push(sub.to_string());
            }
        }
        subs
    }

    fn usage(&self, name: &str) -> Vec<String> {
        self.rows_for(name).map(Entry::usage_line).collect()
    }
}
