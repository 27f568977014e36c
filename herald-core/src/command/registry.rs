use std::collections::HashMap;
use std::slice;
use std::sync::Arc;

use super::{Category, Command};
use crate::context::InvocationContext;

fn normalize(name: &str, case_sensitive: bool) -> String {
    if case_sensitive { name.to_owned() } else { name.to_lowercase() }
}

/// One level of the command tree: the root, or the sub-commands of a command.
///
/// Commands are kept in registration order. Every trigger and alias maps to the positions of the
/// commands answering to it, so commands sharing a name become overload siblings.
#[derive(Default)]
pub struct CommandLevel {
    commands: Vec<Arc<Command>>,
    index: HashMap<String, Vec<usize>>,
}

impl CommandLevel {
    pub fn insert(&mut self, command: Arc<Command>) {
        let position = self.commands.len();

        let mut keys = command
            .names()
            .map(|n| normalize(n, command.case_sensitive))
            .collect::<Vec<_>>();
        keys.sort();
        keys.dedup();

        for key in keys {
            self.index.entry(key).or_default().push(position);
        }
        self.commands.push(command);
    }

    /// Commands answering to `token`, in registration order.
    pub fn candidates(&self, token: &str) -> Vec<&Arc<Command>> {
        let lower = token.to_lowercase();
        let mut positions = Vec::new();

        if let Some(exact) = self.index.get(token) {
            positions.extend(exact.iter().copied());
        }

        if lower != token {
            if let Some(folded) = self.index.get(&lower) {
                positions.extend(folded.iter().copied().filter(|&i| !self.commands[i].case_sensitive));
            }
        }

        positions.sort_unstable();
        positions.dedup();
        positions.into_iter().map(|i| &self.commands[i]).collect()
    }

    pub fn iter(&self) -> slice::Iter<'_, Arc<Command>> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// The command tree. Built during setup and read-only during dispatch.
#[derive(Default)]
pub struct Registry {
    root: CommandLevel,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a top-level command. A command sharing a trigger or alias with an existing one becomes
    /// its overload sibling and is tried after it.
    pub fn register(&mut self, command: Command) -> Arc<Command> {
        let command = Arc::new(command);
        self.root.insert(command.clone());
        command
    }

    /// Adds a top-level command and sets its category back-reference.
    pub fn register_in(&mut self, category: &Arc<Category>, command: Command) -> Arc<Command> {
        command.set_category(category);
        self.register(command)
    }

    pub fn root(&self) -> &CommandLevel {
        &self.root
    }

    /// Top-level commands in registration order.
    pub fn iter(&self) -> slice::Iter<'_, Arc<Command>> {
        self.root.iter()
    }

    /// Number of top-level commands.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Finds all commands at a space-separated trigger path, e.g. `channel create`.
    pub fn find(&self, path: &str) -> Vec<Arc<Command>> {
        let mut tokens = path.split_whitespace();
        let Some(first) = tokens.next() else {
            return Vec::new();
        };

        let mut found = self.root.candidates(first).into_iter().cloned().collect::<Vec<_>>();
        for token in tokens {
            found = found
                .iter()
                .flat_map(|c| c.subcommands.candidates(token))
                .cloned()
                .collect();
        }

        found
    }

    /// Every command visible to the caller, recursively, in registration order.
    ///
    /// Hidden commands (and everything below them) are left out, as are developer-only commands for
    /// non-developers and commands that cannot be triggered in this location. Permissions and
    /// cooldowns are not considered.
    pub fn visible_to(&self, ctx: &InvocationContext, developer: bool) -> Vec<Arc<Command>> {
        let mut out = Vec::new();
        collect_visible(&self.root, ctx, developer, &mut out);
        out
    }
}

fn collect_visible(level: &CommandLevel, ctx: &InvocationContext, developer: bool, out: &mut Vec<Arc<Command>>) {
    for command in level.iter() {
        if command.hidden || (command.developer_only && !developer) || !command.is_triggerable_in(ctx) {
            continue;
        }

        if command.is_invocable() {
            out.push(command.clone());
        }
        collect_visible(&command.subcommands, ctx, developer, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandEvent, Completion};
    use crate::context::{Author, Location};

    async fn noop(_: CommandEvent) -> anyhow::Result<Completion> {
        Ok(Completion::Done)
    }

    fn command(trigger: &str) -> crate::command::CommandBuilder {
        Command::builder(trigger).handler(noop)
    }

    #[test]
    fn overload_siblings_keep_registration_order() {
        let mut registry = Registry::new();
        let first = registry.register(command("add").description("first").build().unwrap());
        let second = registry.register(command("plus").alias("add").description("second").build().unwrap());

        let found = registry.find("add");
        assert_eq!(found.len(), 2);
        assert!(Arc::ptr_eq(&found[0], &first));
        assert!(Arc::ptr_eq(&found[1], &second));
    }

    #[test]
    fn case_sensitivity() {
        let mut registry = Registry::new();
        registry.register(command("Ping").case_sensitive(true).build().unwrap());
        registry.register(command("pong").build().unwrap());

        assert_eq!(registry.find("Ping").len(), 1);
        assert!(registry.find("ping").is_empty());
        assert_eq!(registry.find("PONG").len(), 1);
        assert_eq!(registry.find("pong").len(), 1);
    }

    #[test]
    fn find_by_path() {
        let mut registry = Registry::new();
        registry.register(
            Command::builder("channel")
                .subcommand(command("create"))
                .subcommand(command("delete").alias("remove"))
                .build()
                .unwrap(),
        );

        assert_eq!(registry.find("channel remove")[0].path(), "channel delete");
        assert!(registry.find("channel rename").is_empty());
        assert!(registry.find("").is_empty());
    }

    #[test]
    fn visibility_listing() {
        let mut registry = Registry::new();
        let misc = Category::new("misc", "");
        registry.register_in(&misc, command("ping").build().unwrap());
        registry.register(command("secret").hidden().build().unwrap());
        registry.register(command("eval").developer_only().build().unwrap());
        registry.register(command("ban").private_triggerable(false).build().unwrap());
        registry.register(
            Command::builder("channel")
                .subcommand(command("create"))
                .build()
                .unwrap(),
        );

        let guild = InvocationContext::new(Author::default(), Location {
            channel_id: 1,
            guild_id: Some(1),
        });
        let private = InvocationContext::default();

        let paths = |list: Vec<Arc<Command>>| list.iter().map(|c| c.path().to_owned()).collect::<Vec<_>>();

        assert_eq!(paths(registry.visible_to(&guild, false)), ["ping", "ban", "channel create"]);
        assert_eq!(paths(registry.visible_to(&private, false)), ["ping", "channel create"]);
        assert_eq!(paths(registry.visible_to(&guild, true)), ["ping", "eval", "ban", "channel create"]);
        assert_eq!(registry.find("ping")[0].category().unwrap().name, "misc");
    }
}
