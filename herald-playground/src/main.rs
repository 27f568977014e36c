//! A stdin-driven host for trying out commands locally.
//!
//! Every line is a message. Prefix a line with `as <user id>` to send it as another user, and/or
//! with `dm` to send it as a private message, e.g. `as 2 dm -ping`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, bail};
use herald_common::config::{CONFIG_LOCATION, HeraldConfig};
use herald_common::util::format_time;
use herald_common::{ok_or_break, ok_or_continue, tracing_init};
use herald_core::command::Category;
use herald_core::command::flags::OptionSpec;
use herald_core::context::{Author, Location};
use herald_core::cooldowns::{Cooldown, CooldownScope};
use herald_core::timeout::TimeoutScheduler;
use herald_core::timeout::pages::{PageSession, TimeoutAction};
use herald_core::timeout::waiter::EventWaiter;
use herald_core::{
    ArgumentSpec, ArgumentType, Command, CommandEvent, Completion, Dispatcher, InboundMessage, InvocationContext,
    Outcome, Registry, ResolverRegistry, Value,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const PLAYGROUND_CHANNEL: u64 = 100;
const PLAYGROUND_GUILD: u64 = 200;

/// A line typed into the playground, as seen by the event waiter.
#[derive(Clone, Debug)]
struct Reply {
    author: u64,
    text: String,
}

/// Shared state the demo commands reach into.
struct Services {
    scheduler: TimeoutScheduler,
    waiter: EventWaiter<Reply>,
    config: Arc<HeraldConfig>,
    pages: Mutex<Option<PageSession<String>>>,
}

fn parse_line(line: &str) -> anyhow::Result<InboundMessage> {
    let mut rest = line.trim();
    let mut author = 1;
    let mut guild_id = Some(PLAYGROUND_GUILD);

    if let Some(stripped) = rest.strip_prefix("as ") {
        let (id, after) = stripped.split_once(' ').unwrap_or((stripped, ""));
        author = id.parse::<u64>().with_context(|| format!("{id} is not a user id"))?;
        rest = after;
    }

    if let Some(after) = rest.strip_prefix("dm ") {
        guild_id = None;
        rest = after;
    }

    let context = InvocationContext::new(
        Author {
            id: author,
            bot: false,
            permissions: ["manage_channels".to_owned()].into_iter().collect(),
        },
        Location {
            channel_id: PLAYGROUND_CHANNEL,
            guild_id,
        },
    )
    .with_agent_permissions(["manage_channels", "send_messages"]);

    Ok(InboundMessage::new(rest, context))
}

async fn ping(_: CommandEvent) -> anyhow::Result<Completion> {
    println!("pong!");
    Ok(Completion::Done)
}

async fn add_integers(event: CommandEvent) -> anyhow::Result<Completion> {
    let (Some(a), Some(b)) = (
        event.arg(0).and_then(Value::as_integer),
        event.arg(1).and_then(Value::as_integer),
    ) else {
        bail!("expected two integers");
    };

    match a.checked_add(b) {
        Some(sum) => println!("{sum}"),
        None => bail!("{a} + {b} overflows"),
    }
    Ok(Completion::Done)
}

async fn add_floats(event: CommandEvent) -> anyhow::Result<Completion> {
    let a = event.arg(0).and_then(Value::as_float).unwrap_or_default();
    let b = event.arg(1).and_then(Value::as_float).unwrap_or_default();
    println!("{}", a + b);
    Ok(Completion::Done)
}

async fn sum(event: CommandEvent) -> anyhow::Result<Completion> {
    let numbers = event.arg(0).and_then(Value::as_array).unwrap_or_default();
    let total = numbers.iter().filter_map(Value::as_integer).sum::<i64>();
    println!("{total}");
    Ok(Completion::Done)
}

async fn say(event: CommandEvent) -> anyhow::Result<Completion> {
    let text = event.arg_by_name("text").and_then(Value::as_str).unwrap_or_default();
    if event.has_option("upper") {
        println!("{}", text.to_uppercase());
    } else {
        println!("{text}");
    }
    Ok(Completion::Done)
}

async fn channel_create(event: CommandEvent) -> anyhow::Result<Completion> {
    let name = event.arg(0).and_then(Value::as_str).unwrap_or_default();
    let topic = event.option_value("topic").unwrap_or("no topic");
    println!("created #{name} ({topic})");
    Ok(Completion::Done)
}

async fn channel_delete(event: CommandEvent) -> anyhow::Result<Completion> {
    let name = event.arg(0).and_then(Value::as_str).unwrap_or_default();
    println!("deleted #{name}");
    Ok(Completion::Done)
}

async fn panic_command(_: CommandEvent) -> anyhow::Result<Completion> {
    panic!("the panic command panicked")
}

fn build_registry(services: &Arc<Services>) -> anyhow::Result<Registry> {
    let mut registry = Registry::new();
    let misc = Category::new("misc", "Miscellaneous commands");
    let admin = Category::new("admin", "Server administration");

    registry.register_in(
        &misc,
        Command::builder("ping").description("ping the bot").handler(ping).build()?,
    );

    registry.register_in(
        &misc,
        Command::builder("add")
            .description("add two integers")
            .argument(ArgumentSpec::new("a", ArgumentType::Integer))
            .argument(ArgumentSpec::new("b", ArgumentType::Integer))
            .handler(add_integers)
            .build()?,
    );
    registry.register_in(
        &misc,
        Command::builder("add")
            .description("add two numbers")
            .argument(ArgumentSpec::new("a", ArgumentType::Float))
            .argument(ArgumentSpec::new("b", ArgumentType::Float))
            .handler(add_floats)
            .build()?,
    );

    registry.register_in(
        &misc,
        Command::builder("sum")
            .description("add between 2 and 10 integers")
            .argument(ArgumentSpec::new("numbers", ArgumentType::Integer).endless(2, 10))
            .handler(sum)
            .build()?,
    );

    registry.register_in(
        &misc,
        Command::builder("say")
            .alias("echo")
            .description("repeat some text")
            .argument(ArgumentSpec::new("text", ArgumentType::Text))
            .option(OptionSpec::new("upper").alias("u").description("shout it"))
            .handler(say)
            .build()?,
    );

    registry.register_in(
        &admin,
        Command::builder("channel")
            .description("manage channels")
            .private_triggerable(false)
            .subcommand(
                Command::builder("create")
                    .argument(ArgumentSpec::new("name", ArgumentType::Word))
                    .option(OptionSpec::new("topic").with_value())
                    .caller_permission("manage_channels")
                    .agent_permission("manage_channels")
                    .handler(channel_create),
            )
            .subcommand(
                Command::builder("delete")
                    .alias("remove")
                    .argument(ArgumentSpec::new("name", ArgumentType::Word))
                    .caller_permission("manage_channels")
                    .handler(channel_delete),
            )
            .build()?,
    );

    let remind = {
        let services = services.clone();
        move |event: CommandEvent| {
            let services = services.clone();
            async move {
                let Some(delay) = event.arg(0).and_then(Value::as_duration) else {
                    bail!("expected a time");
                };
                let text = event.arg(1).and_then(Value::as_str).unwrap_or_default().to_owned();
                let user = event.context.author.id;

                services.scheduler.schedule(delay, move || {
                    println!("reminder for {user}: {text}");
                });
                println!("reminding you in {}", format_time(delay));
                anyhow::Ok(Completion::Done)
            }
        }
    };
    registry.register_in(
        &misc,
        Command::builder("remind")
            .description("remind yourself of something")
            .example("remind 1m30s take the pizza out")
            .argument(ArgumentSpec::new("time", ArgumentType::Time))
            .argument(ArgumentSpec::new("text", ArgumentType::Text).default_value("something"))
            .cooldown(Cooldown::new(Duration::from_secs(5), CooldownScope::User))
            .ordering_key(|event| event.context.author.id.to_string())
            .handler(remind)
            .build()?,
    );

    let confirm = {
        let services = services.clone();
        move |event: CommandEvent| {
            let services = services.clone();
            async move {
                let user = event.context.author.id;
                println!("are you sure? (yes/no)");

                let answer = services
                    .waiter
                    .wait_for(move |reply: &Reply| reply.author == user, None)
                    .await;

                match answer {
                    Some(reply) if reply.text.eq_ignore_ascii_case("yes") => {
                        println!("confirmed");
                        anyhow::Ok(Completion::Done)
                    },
                    Some(_) => anyhow::Ok(Completion::Cancelled),
                    None => {
                        println!("timed out waiting for an answer");
                        anyhow::Ok(Completion::Cancelled)
                    },
                }
            }
        }
    };
    registry.register_in(
        &misc,
        Command::builder("confirm")
            .description("ask for confirmation")
            .handler(confirm)
            .build()?,
    );

    let pages = {
        let services = services.clone();
        move |event: CommandEvent| {
            let services = services.clone();
            async move {
                let mut session = services
                    .pages
                    .lock()
                    .map_err(|_| anyhow::anyhow!("page session lock poisoned"))?;

                let page = match event.arg(0).and_then(Value::as_str).unwrap_or("first") {
                    "open" => {
                        let lines = (1..=5).map(|i| format!("page {i} of 5")).collect::<Vec<_>>();
                        let new = PageSession::from_config(
                            lines,
                            &services.scheduler,
                            &services.config,
                            TimeoutAction::LeaveVisible,
                            |action| println!("page session expired ({action:?})"),
                        );
                        let page = new.current();
                        *session = Some(new);
                        page
                    },
                    direction => {
                        let Some(current) = session.as_ref() else {
                            bail!("no page session is open, use `pages open`");
                        };
                        match direction {
                            "next" => current.next(),
                            "prev" => current.previous(),
                            "first" => current.first(),
                            "last" => current.last(),
                            other => match other.parse::<usize>() {
                                Ok(n) if n > 0 => current.goto(n - 1),
                                _ => bail!("unknown page {other}"),
                            },
                        }
                    },
                };

                match page {
                    Some(page) => println!("{page}"),
                    None => println!("(no page)"),
                }
                anyhow::Ok(Completion::Done)
            }
        }
    };
    registry.register_in(
        &misc,
        Command::builder("pages")
            .description("page through a listing")
            .argument(ArgumentSpec::new("direction", ArgumentType::Word).default_value("first"))
            .handler(pages)
            .build()?,
    );

    registry.register(
        Command::builder("panic")
            .description("panic inside a handler")
            .developer_only()
            .hidden()
            .handler(panic_command)
            .build()?,
    );

    Ok(registry)
}

fn describe(outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::NoCommandMatch | Outcome::Success { .. } => None,
        other => Some(other.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match HeraldConfig::load(CONFIG_LOCATION) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}, using the default configuration");
            HeraldConfig::default()
        },
    };
    tracing_init!(&config.logging.level);
    let config = Arc::new(config);

    let scheduler = TimeoutScheduler::new();
    let services = Arc::new(Services {
        waiter: EventWaiter::from_config(&scheduler, &config),
        scheduler: scheduler.clone(),
        config: config.clone(),
        pages: Mutex::new(None),
    });

    let registry = build_registry(&services)?;
    info!("registered {} commands", registry.len());

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(registry),
        Arc::new(ResolverRegistry::with_defaults()),
        config.clone(),
    ));

    println!("prefix is {:?}, try `{0}help`", config.prefix.default);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = ok_or_break!(lines.next_line().await) else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = ok_or_continue!(parse_line(&line).inspect_err(|e| eprintln!("{e:#}")));

        // a pending `confirm` gets the line instead of the dispatcher
        let reply = Reply {
            author: message.context.author.id,
            text: message.text.clone(),
        };
        if services.waiter.dispatch(&reply) > 0 {
            continue;
        }

        if message.text.trim_start() == format!("{}help", config.prefix.default) {
            for command in dispatcher.visible_commands(&message.context) {
                let category = command.category().map_or("none", |c| c.name.as_str());
                println!("[{category}] {}: {}", command.usage, command.description);
            }
            continue;
        }

        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.dispatch(message).await;
            if let Some(description) = describe(&outcome) {
                println!("{description}");
            }
        });
    }

    warn!("stdin closed, shutting down");
    scheduler.shutdown();
    Ok(())
}
