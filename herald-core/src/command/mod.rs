//! The command system.
//!
//! The key things that make up the command system are:
//!
//! - [`Command`]: an immutable description of one invocable signature (trigger, aliases, ordered
//!   [`arguments::ArgumentSpec`]s, [`flags::OptionSpec`]s, gating flags and a handler). Commands are
//!   put together with a [`CommandBuilder`], which rejects invalid argument layouts up front.
//!
//!   Several commands may share a trigger. They are then *overloads* of each other, and the first
//!   one (in registration order) whose arguments verify against a message wins. See
//!   [`overload`].
//!
//! - The [`CommandHandler`] trait: defines the `execute` method which runs the actual command. Any
//!   `Fn(CommandEvent) -> impl Future<Output = anyhow::Result<Completion>>` implements it.
//!
//! - The argument pipeline: [`arguments::verify`] splits the remaining message text into tokens and
//!   hands them to the resolvers in a [`resolvers::ResolverRegistry`].
//!
//! - The registry: [`registry::Registry`] holds the command tree, keyed by trigger and alias.

use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use self::arguments::{ArgumentSpec, Value};
use self::errors::CommandBuildError;
use self::flags::{OptionSpec, OverflowPolicy, ParsedOptions, UnknownOptionPolicy};
use self::registry::CommandLevel;
use crate::context::{InvocationContext, Permission};
use crate::cooldowns::Cooldown;

pub mod arguments;
pub mod errors;
pub mod flags;
pub mod overload;
pub mod registry;
pub mod resolvers;

/// A named group of commands, used by help hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub description: String,
}

impl Category {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            description: description.into(),
        })
    }
}

/// How a handler finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Done,
    /// The handler decided not to go through with the command, e.g. because the user declined a
    /// confirmation prompt.
    Cancelled,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, event: CommandEvent) -> anyhow::Result<Completion>;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(CommandEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Completion>> + Send + 'static,
{
    async fn execute(&self, event: CommandEvent) -> anyhow::Result<Completion> {
        self(event).await
    }
}

/// Computes the key that scheduled invocations are serialized by. Invocations with equal keys run
/// one after another, in dispatch order.
pub type OrderingKey = Arc<dyn Fn(&CommandEvent) -> String + Send + Sync>;

/// Per-message state gathered while parsing. Discarded after dispatch.
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// The full message text.
    pub original: String,
    /// The prefix the message was invoked with. Empty for unprefixed private messages.
    pub prefix: String,
    /// The trigger path as typed, e.g. `channel create`.
    pub trigger: String,
    pub start: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionTimings {
    /// Total time spent stripping the prefix.
    pub prefix: Duration,
    /// Total time spent resolving the command and its arguments.
    pub parse: Duration,
    /// Total time spent on gating checks.
    pub gating: Duration,
    /// Instant full message processing started.
    pub processing_start: Instant,
}

/// A fully resolved invocation, handed to the command handler.
#[derive(Clone)]
pub struct CommandEvent {
    pub command: Arc<Command>,
    /// One value per declared argument, in declaration order.
    pub arguments: Vec<Value>,
    /// The text each argument was parsed from. Empty for defaulted arguments.
    pub raw_arguments: Vec<String>,
    pub options: ParsedOptions,
    pub context: InvocationContext,
    pub parse: ParseContext,
    pub timings: ExecutionTimings,
}

impl CommandEvent {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.arguments.get(index)
    }

    pub fn arg_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.command.arguments.iter().position(|a| a.name == name)?;
        self.arguments.get(index)
    }

    /// Whether the option was given, with or without a value.
    pub fn has_option(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    pub fn option_value(&self, name: &str) -> Option<&str> {
        self.options.get(name)?.as_deref()
    }
}

impl Debug for CommandEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEvent")
            .field("command", &self.command.path())
            .field("arguments", &self.arguments)
            .field("options", &self.options)
            .field("context", &self.context)
            .field("parse", &self.parse)
            .finish()
    }
}

/// Identifies one built command. Overload siblings share a path but never an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandId(u64);

impl CommandId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A command that can be executed. Immutable once built, except for its category.
pub struct Command {
    pub trigger: String,
    pub aliases: Vec<String>,
    pub case_sensitive: bool,
    pub description: String,
    pub examples: Vec<String>,
    pub arguments: Vec<ArgumentSpec>,
    pub options: Vec<OptionSpec>,
    pub subcommands: CommandLevel,
    pub caller_permissions: Vec<Permission>,
    pub agent_permissions: Vec<Permission>,
    pub developer_only: bool,
    pub hidden: bool,
    pub guild_triggerable: bool,
    pub private_triggerable: bool,
    pub bot_triggerable: bool,
    pub cooldown: Option<Cooldown>,
    pub overflow: OverflowPolicy,
    pub unknown_options: UnknownOptionPolicy,
    pub usage: String,
    id: CommandId,
    path: String,
    handler: Option<Arc<dyn CommandHandler>>,
    ordering_key: Option<OrderingKey>,
    category: OnceLock<Arc<Category>>,
}

impl Command {
    pub fn builder(trigger: impl Into<String>) -> CommandBuilder {
        CommandBuilder::new(trigger)
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    /// The space-separated trigger path, e.g. `channel create` for a sub-command.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handler(&self) -> Option<&Arc<dyn CommandHandler>> {
        self.handler.as_ref()
    }

    /// Whether this command can be invoked on its own, rather than only through a sub-command.
    pub fn is_invocable(&self) -> bool {
        self.handler.is_some()
    }

    pub fn ordering_key(&self, event: &CommandEvent) -> Option<String> {
        self.ordering_key.as_ref().map(|f| f(event))
    }

    pub fn category(&self) -> Option<&Arc<Category>> {
        self.category.get()
    }

    /// Sets the category back-reference of this command and all of its sub-commands. Only the
    /// first call has an effect.
    pub(crate) fn set_category(&self, category: &Arc<Category>) {
        let _ = self.category.set(category.clone());
        for sub in self.subcommands.iter() {
            sub.set_category(category);
        }
    }

    pub fn is_triggerable_in(&self, ctx: &InvocationContext) -> bool {
        if ctx.location.is_private() {
            self.private_triggerable
        } else {
            self.guild_triggerable
        }
    }

    /// All triggers this command answers to.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.trigger.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("path", &self.path)
            .field("aliases", &self.aliases)
            .field("arguments", &self.arguments)
            .field("options", &self.options)
            .field("subcommands", &self.subcommands.len())
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

pub struct CommandBuilder {
    trigger: String,
    aliases: Vec<String>,
    case_sensitive: bool,
    description: String,
    examples: Vec<String>,
    arguments: Vec<ArgumentSpec>,
    options: Vec<OptionSpec>,
    subcommands: Vec<CommandBuilder>,
    caller_permissions: Vec<Permission>,
    agent_permissions: Vec<Permission>,
    developer_only: bool,
    hidden: bool,
    guild_triggerable: bool,
    private_triggerable: bool,
    bot_triggerable: bool,
    cooldown: Option<Cooldown>,
    overflow: OverflowPolicy,
    unknown_options: UnknownOptionPolicy,
    handler: Option<Arc<dyn CommandHandler>>,
    ordering_key: Option<OrderingKey>,
}

impl CommandBuilder {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            aliases: Vec::new(),
            case_sensitive: false,
            description: String::new(),
            examples: Vec::new(),
            arguments: Vec::new(),
            options: Vec::new(),
            subcommands: Vec::new(),
            caller_permissions: Vec::new(),
            agent_permissions: Vec::new(),
            developer_only: false,
            hidden: false,
            guild_triggerable: true,
            private_triggerable: true,
            bot_triggerable: false,
            cooldown: None,
            overflow: OverflowPolicy::Fail,
            unknown_options: UnknownOptionPolicy::Fail,
            handler: None,
            ordering_key: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    pub fn argument(mut self, argument: ArgumentSpec) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    pub fn subcommand(mut self, subcommand: CommandBuilder) -> Self {
        self.subcommands.push(subcommand);
        self
    }

    pub fn caller_permission(mut self, permission: impl Into<Permission>) -> Self {
        self.caller_permissions.push(permission.into());
        self
    }

    pub fn agent_permission(mut self, permission: impl Into<Permission>) -> Self {
        self.agent_permissions.push(permission.into());
        self
    }

    pub fn developer_only(mut self) -> Self {
        self.developer_only = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn guild_triggerable(mut self, triggerable: bool) -> Self {
        self.guild_triggerable = triggerable;
        self
    }

    pub fn private_triggerable(mut self, triggerable: bool) -> Self {
        self.private_triggerable = triggerable;
        self
    }

    pub fn bot_triggerable(mut self, triggerable: bool) -> Self {
        self.bot_triggerable = triggerable;
        self
    }

    pub fn cooldown(mut self, cooldown: Cooldown) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    pub fn unknown_options(mut self, policy: UnknownOptionPolicy) -> Self {
        self.unknown_options = policy;
        self
    }

    pub fn handler(mut self, handler: impl CommandHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn ordering_key<F>(mut self, key: F) -> Self
    where
        F: Fn(&CommandEvent) -> String + Send + Sync + 'static,
    {
        self.ordering_key = Some(Arc::new(key));
        self
    }

    fn validate(&self) -> Result<(), CommandBuildError> {
        if self.trigger.is_empty() {
            return Err(CommandBuildError::EmptyTrigger);
        }

        for name in std::iter::once(&self.trigger).chain(&self.aliases) {
            if name.is_empty() {
                return Err(CommandBuildError::EmptyTrigger);
            }
            if name.chars().any(char::is_whitespace) {
                return Err(CommandBuildError::WhitespaceInTrigger(name.clone()));
            }
        }

        if self.arguments.iter().filter(|a| a.is_endless()).count() > 1 {
            return Err(CommandBuildError::MultipleEndless);
        }

        let last = self.arguments.len().saturating_sub(1);
        if let Some((_, endless)) = self
            .arguments
            .iter()
            .enumerate()
            .find(|(i, a)| a.is_endless() && *i != last)
        {
            return Err(CommandBuildError::EndlessNotLast(endless.name.clone()));
        }

        let mut defaulted: Option<&ArgumentSpec> = None;
        for argument in &self.arguments {
            match (argument.default.is_some(), defaulted) {
                (true, None) => defaulted = Some(argument),
                (false, Some(d)) if !argument.is_endless() => {
                    return Err(CommandBuildError::RequiredAfterDefault {
                        required: argument.name.clone(),
                        defaulted: d.name.clone(),
                    });
                },
                _ => {},
            }
        }

        if self.handler.is_none() && self.subcommands.is_empty() {
            return Err(CommandBuildError::MissingHandler(self.trigger.clone()));
        }

        Ok(())
    }

    fn build_under(self, parent: Option<&str>) -> Result<Command, CommandBuildError> {
        self.validate()?;

        let path = match parent {
            Some(parent) => format!("{parent} {}", self.trigger),
            None => self.trigger.clone(),
        };

        let mut subcommands = CommandLevel::default();
        for sub in self.subcommands {
            subcommands.insert(Arc::new(sub.build_under(Some(&path))?));
        }

        let mut usage = path.clone();
        for argument in &self.arguments {
            usage.push(' ');
            usage.push_str(&argument.usage());
        }

        Ok(Command {
            trigger: self.trigger,
            aliases: self.aliases,
            case_sensitive: self.case_sensitive,
            description: self.description,
            examples: self.examples,
            arguments: self.arguments,
            options: self.options,
            subcommands,
            caller_permissions: self.caller_permissions,
            agent_permissions: self.agent_permissions,
            developer_only: self.developer_only,
            hidden: self.hidden,
            guild_triggerable: self.guild_triggerable,
            private_triggerable: self.private_triggerable,
            bot_triggerable: self.bot_triggerable,
            cooldown: self.cooldown,
            overflow: self.overflow,
            unknown_options: self.unknown_options,
            usage,
            id: CommandId::next(),
            path,
            handler: self.handler,
            ordering_key: self.ordering_key,
            category: OnceLock::new(),
        })
    }

    /// Validates the command and its sub-commands.
    pub fn build(self) -> Result<Command, CommandBuildError> {
        self.build_under(None)
    }
}
