//! Command and provider contracts.

use std::collections::BTreeSet;

use xanadu_types::error::Result;

use crate::context::ExecutionContext;
use crate::parser::ParsedCommand;

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure,
    /// End the session. Propagates through scripts and macros to the driver.
    Exit,
}

/// A resolved, ready-to-run command.
pub trait Command {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<CommandStatus>;
}

impl<F> Command for F
where
    F: Fn(&mut ExecutionContext) -> Result<CommandStatus>,
{
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<CommandStatus> {
        self(ctx)
    }
}

/// Box a closure as a [`Command`].
pub fn command<F>(f: F) -> Box<dyn Command>
where
    F: Fn(&mut ExecutionContext) -> Result<CommandStatus> + 'static,
{
    Box::new(f)
}

/// A family of commands.
///
/// Providers are registered once at startup. `supports` decides whether a
/// parsed line belongs to this provider; `build` turns it into a
/// [`Command`]. The remaining methods feed `help` and the agent prompt.
pub trait CommandProvider {
    /// Provider name, used by `enable`/`disable`.
    fn name(&self) -> &str;

    fn supports(&self, input: &ParsedCommand) -> bool {
        self.names().contains(&input.name)
    }

    fn build(&self, input: &ParsedCommand) -> Box<dyn Command>;

    /// Every command name this provider answers to.
    fn names(&self) -> BTreeSet<String>;

    fn subcommands(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Usage lines for `name`, most general first.
    fn usage(&self, name: &str) -> Vec<String> {
        vec![name.to_string()]
    }
}
