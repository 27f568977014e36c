//! The dispatch pipeline: from an inbound message to a handler invocation.
//!
//! Steps, the first failure short-circuits:
//! 1. strip the prefix ([`prefix::PrefixSet`])
//! 2. resolve the trigger and overloads, including options and overflow
//!    ([`crate::command::overload`])
//! 3. gating: triggerability, bot authors, developer-only, caller permissions, agent permissions
//! 4. cooldown check-then-stamp
//! 5. invoke the handler, inline or through the [`OrderedExecutor`]
//!
//! Every message produces exactly one [`Outcome`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use herald_common::config::{ExecutionMode, HeraldConfig};
use tracing::{debug, error, info};

use self::outcome::{ErrorSeverity, Outcome};
use self::prefix::{Prefix, PrefixSet};
use crate::command::errors::{ExecutionError, ExecutionFailure};
use crate::command::overload::{self, OverloadMatch, ResolveCtxt};
use crate::command::registry::Registry;
use crate::command::resolvers::ResolverRegistry;
use crate::command::{Command, CommandEvent, Completion, ExecutionTimings, ParseContext};
use crate::context::{GrantedPermissions, InboundMessage, InvocationContext, PermissionModel};
use crate::cooldowns::CommandCooldowns;
use crate::executor::OrderedExecutor;

pub mod outcome;
pub mod prefix;

pub struct Dispatcher {
    registry: Arc<Registry>,
    resolvers: Arc<ResolverRegistry>,
    config: Arc<HeraldConfig>,
    prefixes: PrefixSet,
    permissions: Arc<dyn PermissionModel>,
    cooldowns: CommandCooldowns,
    executor: OrderedExecutor,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, resolvers: Arc<ResolverRegistry>, config: Arc<HeraldConfig>) -> Self {
        Self {
            registry,
            resolvers,
            prefixes: PrefixSet::from_config(&config.prefix),
            permissions: Arc::new(GrantedPermissions),
            cooldowns: CommandCooldowns::new(config.dispatch.cooldown_capacity),
            executor: OrderedExecutor::new(),
            config,
        }
    }

    pub fn with_permission_model(mut self, model: impl PermissionModel + 'static) -> Self {
        self.permissions = Arc::new(model);
        self
    }

    /// Adds a prefix on top of the configured ones.
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefixes = self.prefixes.with(prefix);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<HeraldConfig> {
        &self.config
    }

    pub fn cooldowns(&self) -> &CommandCooldowns {
        &self.cooldowns
    }

    /// Commands the author of `ctx` may see, for help listings.
    pub fn visible_commands(&self, ctx: &InvocationContext) -> Vec<Arc<Command>> {
        self.registry.visible_to(ctx, self.config.is_developer(ctx.author.id))
    }

    /// Returns the first failing gate, if any.
    fn check_gates(&self, command: &Arc<Command>, ctx: &InvocationContext, developer: bool) -> Option<Outcome> {
        if !command.is_triggerable_in(ctx) {
            return Some(Outcome::NotTriggerableHere {
                command: command.clone(),
            });
        }

        if ctx.author.bot && !command.bot_triggerable {
            return Some(Outcome::BotAuthorRejected {
                command: command.clone(),
            });
        }

        if command.developer_only && !developer {
            return Some(Outcome::DeveloperOnly {
                command: command.clone(),
            });
        }

        let missing = self.permissions.missing_caller(ctx, &command.caller_permissions);
        if !missing.is_empty() {
            return Some(Outcome::MissingCallerPermissions {
                command: command.clone(),
                missing,
            });
        }

        let missing = self.permissions.missing_agent(ctx, &command.agent_permissions);
        if !missing.is_empty() {
            return Some(Outcome::MissingAgentPermissions {
                command: command.clone(),
                missing,
            });
        }

        None
    }

    /// Parses, gates and executes one message.
    pub async fn dispatch(&self, message: InboundMessage) -> Outcome {
        let outcome = self.dispatch_inner(message).await;

        match outcome.get_severity() {
            ErrorSeverity::High => error!("{outcome}"),
            ErrorSeverity::Low => debug!("dispatch: {outcome}"),
        }

        outcome
    }

    async fn dispatch_inner(&self, message: InboundMessage) -> Outcome {
        let processing_start = Instant::now();
        let InboundMessage { text, context } = message;

        let Some((prefix, rest)) = self.prefixes.strip(&text, &context) else {
            return Outcome::NoCommandMatch;
        };
        let prefix_time = processing_start.elapsed();

        let developer = self.config.is_developer(context.author.id);
        let parse_start = Instant::now();
        let resolved = {
            let ctxt = ResolveCtxt {
                context: &context,
                resolvers: &self.resolvers,
                developer,
            };

            match overload::resolve(self.registry.root(), rest, &ctxt) {
                OverloadMatch::Matched(resolved) => resolved,
                OverloadMatch::Invalid(command) => return Outcome::InvalidArguments { command },
                OverloadMatch::NoMatch => return Outcome::NoCommandMatch,
            }
        };
        let parse_time = parse_start.elapsed();

        let gating_start = Instant::now();
        let command = resolved.command;
        if let Some(outcome) = self.check_gates(&command, &context, developer) {
            return outcome;
        }

        if let Some(cooldown) = &command.cooldown {
            if let Err(remaining) = self.cooldowns.check_and_stamp(command.id(), cooldown, &context) {
                return Outcome::OnCooldown {
                    command: command.clone(),
                    remaining,
                };
            }
        }

        let event = CommandEvent {
            command: command.clone(),
            arguments: resolved.arguments,
            raw_arguments: resolved.raw_arguments,
            options: resolved.options,
            parse: ParseContext {
                original: text.clone(),
                prefix: prefix.to_owned(),
                trigger: resolved.trigger,
                start: processing_start,
            },
            context,
            timings: ExecutionTimings {
                prefix: prefix_time,
                parse: parse_time,
                gating: gating_start.elapsed(),
                processing_start,
            },
        };

        match self.config.dispatch.execution {
            ExecutionMode::Inline => run_handler(event).await,
            ExecutionMode::Scheduled => {
                let key = command.ordering_key(&event);
                let arguments = event.arguments.clone();

                match self.executor.submit(key, run_handler(event)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::ExecutionError(ExecutionError {
                        command: command.path().to_owned(),
                        arguments,
                        cause: ExecutionFailure::Panicked("scheduled handler was dropped".to_owned()),
                    }),
                }
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Runs the handler of `event.command`, converting errors and panics into outcomes.
async fn run_handler(event: CommandEvent) -> Outcome {
    let command = event.command.clone();
    let Some(handler) = command.handler().cloned() else {
        return Outcome::InvalidArguments { command };
    };

    info!("running command {}", command.path());
    let arguments = event.arguments.clone();

    match AssertUnwindSafe(handler.execute(event)).catch_unwind().await {
        Ok(Ok(Completion::Done)) => Outcome::Success { command },
        Ok(Ok(Completion::Cancelled)) => Outcome::Cancelled { command },
        Ok(Err(cause)) => Outcome::ExecutionError(ExecutionError {
            command: command.path().to_owned(),
            arguments,
            cause: ExecutionFailure::Failed(cause),
        }),
        Err(payload) => Outcome::ExecutionError(ExecutionError {
            command: command.path().to_owned(),
            arguments,
            cause: ExecutionFailure::Panicked(panic_message(payload.as_ref())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::anyhow;

    use super::*;
    use crate::command::arguments::{ArgumentSpec, ArgumentType, Value};
    use crate::command::CommandBuilder;
    use crate::context::{Author, Location};
    use crate::cooldowns::{Cooldown, CooldownScope};

    async fn noop(_: CommandEvent) -> anyhow::Result<Completion> {
        Ok(Completion::Done)
    }

    fn dispatcher(commands: Vec<CommandBuilder>, config: HeraldConfig) -> Dispatcher {
        let mut registry = Registry::new();
        for command in commands {
            registry.register(command.build().unwrap());
        }
        Dispatcher::new(
            Arc::new(registry),
            Arc::new(ResolverRegistry::with_defaults()),
            Arc::new(config),
        )
    }

    fn guild_ctx(user: u64) -> InvocationContext {
        InvocationContext::new(
            Author {
                id: user,
                ..Default::default()
            },
            Location {
                channel_id: 10,
                guild_id: Some(20),
            },
        )
    }

    fn msg(text: &str) -> InboundMessage {
        InboundMessage::new(text, guild_ctx(1))
    }

    #[tokio::test]
    async fn success_binds_arguments_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));

        let handler = {
            let calls = calls.clone();
            let seen = seen.clone();
            move |event: CommandEvent| {
                let calls = calls.clone();
                let seen = seen.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    *seen.lock().unwrap() = Some((
                        event.arg_by_name("a").cloned(),
                        event.parse.trigger.clone(),
                        event.parse.prefix.clone(),
                    ));
                    anyhow::Ok(Completion::Done)
                }
            }
        };

        let dispatcher = dispatcher(
            vec![
                Command::builder("add")
                    .argument(ArgumentSpec::new("a", ArgumentType::Integer))
                    .argument(ArgumentSpec::new("b", ArgumentType::Integer))
                    .handler(handler),
            ],
            HeraldConfig::default(),
        );

        let outcome = dispatcher.dispatch(msg("-add 1 2")).await;
        assert!(outcome.is_success(), "{outcome}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some((Some(Value::Integer(1)), "add".to_owned(), "-".to_owned()))
        );
    }

    #[tokio::test]
    async fn unmatched_messages() {
        let dispatcher = dispatcher(
            vec![Command::builder("ping").handler(noop)],
            HeraldConfig::default(),
        );

        assert!(matches!(dispatcher.dispatch(msg("ping")).await, Outcome::NoCommandMatch));
        assert!(matches!(dispatcher.dispatch(msg("-pong")).await, Outcome::NoCommandMatch));
        assert!(matches!(
            dispatcher.dispatch(msg("-ping extra")).await,
            Outcome::InvalidArguments { .. }
        ));
    }

    #[tokio::test]
    async fn gating_order() {
        let mut config = HeraldConfig::default();
        config.dev.admin_users = vec![99];

        let dispatcher = dispatcher(
            vec![
                Command::builder("eval").developer_only().private_triggerable(false).handler(noop),
                Command::builder("kick")
                    .caller_permission("kick")
                    .agent_permission("kick")
                    .handler(noop),
                Command::builder("relay").bot_triggerable(true).handler(noop),
            ],
            config,
        );

        // triggerability is checked before developer status
        let private = InvocationContext::new(Author::default(), Location::default());
        assert!(matches!(
            dispatcher.dispatch(InboundMessage::new("-eval", private)).await,
            Outcome::NotTriggerableHere { .. }
        ));

        let mut bot = guild_ctx(5);
        bot.author.bot = true;
        assert!(matches!(
            dispatcher.dispatch(InboundMessage::new("-eval", bot.clone())).await,
            Outcome::BotAuthorRejected { .. }
        ));
        assert!(dispatcher.dispatch(InboundMessage::new("-relay", bot)).await.is_success());

        assert!(matches!(dispatcher.dispatch(msg("-eval")).await, Outcome::DeveloperOnly { .. }));
        assert!(
            dispatcher
                .dispatch(InboundMessage::new("-eval", guild_ctx(99)))
                .await
                .is_success()
        );

        match dispatcher.dispatch(msg("-kick")).await {
            Outcome::MissingCallerPermissions { missing, .. } => assert_eq!(missing, vec!["kick".to_owned()]),
            other => panic!("unexpected outcome {other}"),
        }

        let mut moderator = guild_ctx(2);
        moderator.author.permissions.insert("kick".to_owned());
        match dispatcher.dispatch(InboundMessage::new("-kick", moderator.clone())).await {
            Outcome::MissingAgentPermissions { missing, .. } => assert_eq!(missing, vec!["kick".to_owned()]),
            other => panic!("unexpected outcome {other}"),
        }

        let moderator = moderator.with_agent_permissions(["kick"]);
        assert!(dispatcher.dispatch(InboundMessage::new("-kick", moderator)).await.is_success());
    }

    #[tokio::test]
    async fn cooldown_is_stamped_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = calls.clone();
            move |_: CommandEvent| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Completion, _>(anyhow!("always fails"))
                }
            }
        };

        let dispatcher = dispatcher(
            vec![
                Command::builder("daily")
                    .cooldown(Cooldown::new(Duration::from_secs(60), CooldownScope::User))
                    .handler(handler),
            ],
            HeraldConfig::default(),
        );

        assert!(matches!(
            dispatcher.dispatch(msg("-daily")).await,
            Outcome::ExecutionError(_)
        ));

        // the stamp is kept even though the handler failed
        match dispatcher.dispatch(msg("-daily")).await {
            Outcome::OnCooldown { remaining, .. } => assert!(remaining <= Duration::from_secs(60)),
            other => panic!("unexpected outcome {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(matches!(
            dispatcher.dispatch(InboundMessage::new("-daily", guild_ctx(2))).await,
            Outcome::ExecutionError(_)
        ));
    }

    #[tokio::test]
    async fn overloads_keep_separate_cooldowns() {
        let dispatcher = dispatcher(
            vec![
                Command::builder("add")
                    .argument(ArgumentSpec::new("n", ArgumentType::Integer))
                    .cooldown(Cooldown::new(Duration::from_secs(60), CooldownScope::User))
                    .handler(noop),
                Command::builder("add")
                    .argument(ArgumentSpec::new("word", ArgumentType::Word))
                    .handler(noop),
                Command::builder("add")
                    .argument(ArgumentSpec::new("flag", ArgumentType::Boolean))
                    .argument(ArgumentSpec::new("word", ArgumentType::Word))
                    .cooldown(Cooldown::new(Duration::from_secs(5), CooldownScope::User))
                    .handler(noop),
            ],
            HeraldConfig::default(),
        );

        assert!(dispatcher.dispatch(msg("-add 1")).await.is_success());
        assert!(dispatcher.dispatch(msg("-add word")).await.is_success());
        assert!(dispatcher.dispatch(msg("-add yes x")).await.is_success());

        match dispatcher.dispatch(msg("-add yes x")).await {
            Outcome::OnCooldown { remaining, .. } => {
                assert!(remaining > Duration::ZERO && remaining <= Duration::from_secs(5));
            },
            other => panic!("unexpected outcome {other}"),
        }
        match dispatcher.dispatch(msg("-add 2")).await {
            Outcome::OnCooldown { remaining, .. } => assert!(remaining > Duration::from_secs(5)),
            other => panic!("unexpected outcome {other}"),
        }
    }

    #[tokio::test]
    async fn panics_and_cancellation() {
        async fn panics(_: CommandEvent) -> anyhow::Result<Completion> {
            panic!("handler exploded")
        }

        async fn cancels(_: CommandEvent) -> anyhow::Result<Completion> {
            Ok(Completion::Cancelled)
        }

        let dispatcher = dispatcher(
            vec![
                Command::builder("boom")
                    .argument(ArgumentSpec::new("x", ArgumentType::Word))
                    .handler(panics),
                Command::builder("maybe").handler(cancels),
            ],
            HeraldConfig::default(),
        );

        match dispatcher.dispatch(msg("-boom now")).await {
            Outcome::ExecutionError(e) => {
                assert_eq!(e.command, "boom");
                assert_eq!(e.arguments, vec![Value::from("now")]);
                assert!(matches!(e.cause, ExecutionFailure::Panicked(ref m) if m == "handler exploded"));
            },
            other => panic!("unexpected outcome {other}"),
        }

        assert!(matches!(
            dispatcher.dispatch(msg("-maybe")).await,
            Outcome::Cancelled { .. }
        ));
    }

    #[tokio::test]
    async fn scheduled_execution_is_ordered_by_key() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let log = log.clone();
            move |event: CommandEvent| {
                let log = log.clone();
                async move {
                    let delay = event.arg(0).and_then(Value::as_integer).unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(delay as u64)).await;
                    log.lock().unwrap().push(delay);
                    anyhow::Ok(Completion::Done)
                }
            }
        };

        let mut config = HeraldConfig::default();
        config.dispatch.execution = ExecutionMode::Scheduled;

        let dispatcher = Arc::new(dispatcher(
            vec![
                Command::builder("wait")
                    .argument(ArgumentSpec::new("ms", ArgumentType::Integer))
                    .ordering_key(|event| event.context.location.channel_id.to_string())
                    .handler(handler),
            ],
            config,
        ));

        let slow = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(msg("-wait 40")).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let fast = dispatcher.dispatch(msg("-wait 1")).await;

        assert!(fast.is_success());
        assert!(slow.await.unwrap().is_success());
        assert_eq!(*log.lock().unwrap(), vec![40, 1]);
    }

    #[tokio::test]
    async fn mention_and_unprefixed_private() {
        let mut config = HeraldConfig::default();
        config.prefix.mention_bot_id = Some(42);
        config.prefix.allow_unprefixed_private = true;

        let dispatcher = dispatcher(vec![Command::builder("ping").handler(noop)], config);

        assert!(dispatcher.dispatch(msg("<@!42> ping")).await.is_success());
        assert!(
            dispatcher
                .dispatch(InboundMessage::new("ping", InvocationContext::default()))
                .await
                .is_success()
        );
        assert!(matches!(dispatcher.dispatch(msg("ping")).await, Outcome::NoCommandMatch));
    }
}
