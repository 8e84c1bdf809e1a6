//! Provider registry and command resolution.
//!
//! Providers live in an arena and are referenced by [`ProviderId`]. Three
//! views over the arena decide lookup:
//!
//! - `enabled`: priority overlay, searched first in insertion order.
//! - `base`: default discovery order.
//! - `disabled`: exclusion overlay; never resolved.
//!
//! `enable`/`disable` only move ids between the overlays. `base` is never
//! modified after registration.

use std::collections::BTreeSet;
use std::fmt;

use crate::parser::ParsedCommand;
use crate::provider::{Command, CommandProvider};

/// Stable identity of a registered provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(usize);

/// How a provider currently participates in lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Enabled,
    Default,
    Disabled,
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderState::Enabled => "enabled",
            ProviderState::Default => "default",
            ProviderState::Disabled => "disabled",
        })
    }
}

/// Registry of command providers.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn CommandProvider>>,
    base: Vec<ProviderId>,
    enabled: Vec<ProviderId>,
    disabled: Vec<ProviderId>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the arena without making it discoverable.
    ///
    /// It can still be reached through `enable`.
    pub fn add(&mut self, provider: Box<dyn CommandProvider>) -> ProviderId {
        let id = ProviderId(self.providers.len());
        log::debug!("Added provider {} as {id:?}", provider.name());
        self.providers.push(provider);
        id
    }

    /// Add a provider and append it to the default search order.
    pub fn register(&mut self, provider: Box<dyn CommandProvider>) -> ProviderId {
        let id = self.add(provider);
        self.base.push(id);
        id
    }

    pub fn get(&self, id: ProviderId) -> Option<&dyn CommandProvider> {
        self.providers.get(id.0).map(|p| p.as_ref())
    }

    /// Move a provider into the priority overlay.
    pub fn enable(&mut self, id: ProviderId) {
        if !self.enabled.contains(&id) {
            self.enabled.push(id);
        }
        self.disabled.retain(|d| *d != id);
    }

    /// Move a provider into the exclusion overlay.
    pub fn disable(&mut self, id: ProviderId) {
        if !self.disabled.contains(&id) {
            self.disabled.push(id);
        }
        self.enabled.retain(|e| *e != id);
    }

    pub fn state(&self, id: ProviderId) -> ProviderState {
        if self.disabled.contains(&id) {
            ProviderState::Disabled
        } else if self.enabled.contains(&id) {
            ProviderState::Enabled
        } else {
            ProviderState::Default
        }
    }

    /// Look up a provider by name, case-insensitively.
    pub fn find_by_name(&self, name: &str) -> Option<ProviderId> {
        self.providers
            .iter()
            .position(|p| p.name().eq_ignore_ascii_case(name))
            .map(ProviderId)
    }

    /// Ids in resolution order, skipping disabled providers.
    fn search_order(&self) -> impl Iterator<Item = ProviderId> + '_ {
        let overlay = self
            .enabled
            .iter()
            .filter(|id| !self.disabled.contains(id));
        let base = self
            .base
            .iter()
            .filter(|id| !self.enabled.contains(id) && !self.disabled.contains(id));
        overlay.chain(base).copied()
    }

    /// First provider whose `supports` accepts `input`.
    pub fn find(&self, input: &ParsedCommand) -> Option<ProviderId> {
        self.search_order()
            .find(|id| self.providers[id.0].supports(input))
    }

    /// Resolve `input` to a runnable command.
    pub fn resolve(&self, input: &ParsedCommand) -> Option<Box<dyn Command>> {
        let id = self.find(input)?;
        log::debug!("Resolved {} via {}", input.name, self.providers[id.0].name());
        Some(self.providers[id.0].build(input))
    }

    /// Every provider once: enabled, then base, then disabled.
    pub fn ordered(&self) -> Vec<ProviderId> {
        let mut seen = Vec::with_capacity(self.providers.len());
        for id in self
            .enabled
            .iter()
            .chain(self.base.iter())
            .chain(self.disabled.iter())
        {
            if !seen.contains(id) {
                seen.push(*id);
            }
        }
        seen
    }

    /// Sorted command names across enabled and base providers.
    pub fn command_names(&self) -> BTreeSet<String> {
        self.search_order()
            .flat_map(|id| self.providers[id.0].names())
            .collect()
    }

    /// The reachable provider that declares `name` as one of its commands.
    pub fn provider_for_command(&self, name: &str) -> Option<ProviderId> {
        self.search_order()
            .find(|id| self.providers[id.0].names().contains(name))
    }

    /// Subcommands of `name` from whichever provider owns it.
    pub fn subcommands(&self, name: &str) -> Vec<String> {
        self.provider_for_command(name)
            .map(|id| self.providers[id.0].subcommands(name))
            .unwrap_or_default()
    }

    /// Usage lines of `name` from whichever provider owns it.
    pub fn usage(&self, name: &str) -> Vec<String> {
        self.provider_for_command(name)
            .map(|id| self.providers[id.0].usage(name))
            .unwrap_or_default()
    }

    /// Usage lines of every command, walking providers in `ordered()` order.
    pub fn detailed_usage(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for id in self.ordered() {
            let provider = &self.providers[id.0];
            for name in provider.names() {
                lines.extend(provider.usage(&name));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::parser::parse_line;
    use crate::provider::{CommandStatus, command};
    use crate::sink::{SharedBuffer, sink};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Answers to a fixed name and prints its own tag when run.
    struct Tagged {
        tag: &'static str,
        command: &'static str,
    }

    impl CommandProvider for Tagged {
        fn name(&self) -> &str {
            self.tag
        }
        fn build(&self, _input: &ParsedCommand) -> Box<dyn Command> {
            let tag = self.tag;
            command(move |ctx| {
                ctx.println(tag)?;
                Ok(CommandStatus::Success)
            })
        }
        fn names(&self) -> BTreeSet<String> {
            BTreeSet::from([self.command.to_string()])
        }
    }

    fn tagged(tag: &'static str, command: &'static str) -> Box<dyn CommandProvider> {
        Box::new(Tagged { tag, command })
    }

    fn run(registry: ProviderRegistry, line: &str) -> String {
        let buf = SharedBuffer::new();
        let registry = Rc::new(RefCell::new(registry));
        let mut ctx = ExecutionContext::new(sink(buf.clone()), Rc::clone(&registry));
        let input = parse_line(line).unwrap();
        let cmd = registry.borrow().resolve(&input).unwrap();
        cmd.execute(&mut ctx).unwrap();
        buf.contents()
    }

    #[test]
    fn disabled_provider_is_never_resolved() {
        let mut reg = ProviderRegistry::new();
        let id = reg.register(tagged("hidden", "go"));
        reg.disable(id);
        let input = parse_line("go").unwrap();
        assert!(reg.find(&input).is_none());

        reg.enable(id);
        assert_eq!(reg.find(&input), Some(id));
        assert_eq!(reg.state(id), ProviderState::Enabled);
    }

    #[test]
    fn disabled_wins_over_enabled_when_both_listed() {
        let mut reg = ProviderRegistry::new();
        let id = reg.register(tagged("p", "go"));
        reg.enable(id);
        reg.disable(id);
        assert!(reg.find(&parse_line("go").unwrap()).is_none());
        assert_eq!(reg.state(id), ProviderState::Disabled);
    }

    #[test]
    fn base_order_is_stable() {
        let mut reg = ProviderRegistry::new();
        let first = reg.register(tagged("first", "go"));
        reg.register(tagged("second", "go"));
        let input = parse_line("go").unwrap();
        for _ in 0..5 {
            assert_eq!(reg.find(&input), Some(first));
        }
    }

    #[test]
    fn enabled_overlay_takes_priority() {
        let mut reg = ProviderRegistry::new();
        reg.register(tagged("first", "go"));
        let second = reg.register(tagged("second", "go"));
        reg.enable(second);
        assert_eq!(run(reg, "go"), "second\n");
    }

    #[test]
    fn added_provider_needs_enable() {
        let mut reg = ProviderRegistry::new();
        let id = reg.add(tagged("extra", "go"));
        assert!(reg.find(&parse_line("go").unwrap()).is_none());
        reg.enable(id);
        assert_eq!(run(reg, "go"), "extra\n");
    }

    #[test]
    fn ordered_lists_each_provider_once() {
        let mut reg = ProviderRegistry::new();
        let a = reg.register(tagged("a", "x"));
        let b = reg.register(tagged("b", "y"));
        let c = reg.add(tagged("c", "z"));
        reg.enable(b);
        reg.disable(c);
        assert_eq!(reg.ordered(), vec![b, a, c]);
    }

    #[test]
    fn find_by_name_ignores_case() {
        let mut reg = ProviderRegistry::new();
        let id = reg.register(tagged("System", "help"));
        assert_eq!(reg.find_by_name("system"), Some(id));
        assert!(reg.find_by_name("nope").is_none());
    }

    #[test]
    fn command_names_skip_disabled() {
        let mut reg = ProviderRegistry::new();
        reg.register(tagged("a", "alpha"));
        let b = reg.register(tagged("b", "beta"));
        reg.disable(b);
        assert_eq!(
            reg.command_names().into_iter().collect::<Vec<_>>(),
            vec!["alpha"]
        );
    }
}
