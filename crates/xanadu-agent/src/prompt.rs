//! System prompt describing the shell's commands and the tool-call format.

use xanadu_terminal::ExecutionContext;
use xanadu_terminal::capture::{TOOL_NAME, tool_description};

/// Build the system prompt from the commands currently registered.
///
/// `delegated` adds the instruction that no follow-up turn will come.
pub fn system_prompt(ctx: &ExecutionContext, delegated: bool) -> String {
    let mut prompt = tool_description(ctx);
    prompt.push_str(
        " You may interleave text with tool calls, but avoid it unless you need to explain something.",
    );
    prompt.push_str(
        " If you do explain, keep it brief and place it immediately before the relevant tool call.",
    );
    prompt.push_str(&format!(
        " To run commands, reply with a fenced block: ```{TOOL_NAME}\\n<command line>\\n```."
    ));
    prompt.push_str(&format!(
        " A single command can also be written on its own line as `{TOOL_NAME}: <command line>`."
    ));
    prompt.push_str(
        " When the command name is also the first word of what it runs, such as a SQL verb, write it once.",
    );
    prompt.push_str(" Example: `select * from users` (not `select SELECT * from users`).");
    prompt.push_str(" End SQL statements with a semicolon.");
    prompt.push_str(&format!(
        " To delegate a task, use: ```{TOOL_NAME}\\nagent delegate <prompt>\\n```."
    ));
    prompt.push_str(" Delegated agents start fresh and cannot use continuation.");
    prompt.push_str(" Use one command per line inside the fenced block.");
    prompt.push_str(
        " If a command needs continuation (e.g., multi-line SQL), put the next line(s) immediately after it.",
    );
    prompt.push_str(
        " You can define macros with `def <name> ... end`, list them with `macros`, and delete them with `undef <name>`.",
    );
    if delegated {
        prompt.push_str(" This is a delegated task with no follow-up; avoid leading questions at the end.");
    }

    let usage = ctx.registry().borrow().detailed_usage();
    if !usage.is_empty() {
        prompt.push_str("\n\nCommand usage:\n");
        prompt.push_str(&usage.join("\n"));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use xanadu_terminal::ProviderRegistry;
    use xanadu_terminal::macros::MacroProvider;
    use xanadu_terminal::sink::{SharedBuffer, sink};
    use xanadu_terminal::system_commands::register_system_commands;

    fn ctx(with_commands: bool) -> ExecutionContext {
        let mut registry = ProviderRegistry::new();
        if with_commands {
            register_system_commands(&mut registry);
            registry.register(Box::new(MacroProvider::new()));
        }
        ExecutionContext::new(sink(SharedBuffer::new()), Rc::new(RefCell::new(registry)))
    }

    #[test]
    fn lists_commands_and_usage() {
        let prompt = system_prompt(&ctx(true), false);
        assert!(prompt.starts_with("Execute xanadu command lines. Available commands: def, disable, echo,"));
        assert!(prompt.contains("```xanadu\\n<command line>\\n```"));
        let usage = prompt.split("\n\nCommand usage:\n").nth(1).unwrap();
        assert!(usage.lines().any(|l| l == "loglevel <level>"));
        assert!(usage.lines().any(|l| l == "def <name> ... end"));
        assert!(!prompt.contains("delegated task"));
    }

    #[test]
    fn delegated_prompt_forbids_follow_up() {
        let prompt = system_prompt(&ctx(true), true);
        assert!(prompt.contains("This is a delegated task with no follow-up"));
    }

    #[test]
    fn empty_registry_has_no_usage_section() {
        let prompt = system_prompt(&ctx(false), false);
        assert!(prompt.starts_with("Execute a xanadu command line."));
        assert!(!prompt.contains("Command usage:"));
    }
}
