//! Overload resolution: picking the command a message targets.
//!
//! Candidates sharing a trigger are tried in registration order and the first one that fully
//! verifies wins. Sub-commands are attempted before their parents, so `channel create x` prefers
//! the `create` sub-command of `channel` over a `channel` overload taking two words.

use std::sync::Arc;

use tracing::debug;

use super::arguments::{Value, Verified, verify};
use super::flags::{OverflowPolicy, ParsedOptions, first_option_offset, options_from_str};
use super::registry::CommandLevel;
use super::resolvers::ResolverRegistry;
use super::Command;
use crate::context::InvocationContext;

/// A candidate whose arguments and options fully verified.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub command: Arc<Command>,
    /// The trigger path as typed.
    pub trigger: String,
    pub arguments: Vec<Value>,
    pub raw_arguments: Vec<String>,
    pub options: ParsedOptions,
}

#[derive(Debug)]
pub enum OverloadMatch {
    Matched(Resolved),
    /// A trigger matched but none of its candidates verified. Holds the candidate to report,
    /// preferring the deepest one that matched a trigger.
    Invalid(Arc<Command>),
    NoMatch,
}

/// Everything needed to verify candidates.
pub struct ResolveCtxt<'a> {
    pub context: &'a InvocationContext,
    pub resolvers: &'a ResolverRegistry,
    /// Whether developer-only options are available.
    pub developer: bool,
}

fn split_trigger(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], text[idx..].trim_start()),
        None => (text, ""),
    }
}

/// The text consumed between `before` and its suffix `after`.
fn consumed<'a>(before: &'a str, after: &str) -> &'a str {
    let before = before.trim_start();
    before[..before.len().saturating_sub(after.len())].trim_end()
}

/// Attempts to bind `text` to the arguments and options of `command`.
pub fn try_candidate(command: &Arc<Command>, trigger: &str, text: &str, ctxt: &ResolveCtxt<'_>) -> Option<Resolved> {
    if !command.is_invocable() {
        return None;
    }

    let (positional, option_tail) = match first_option_offset(text, &command.options) {
        Some(offset) => text.split_at(offset),
        None => (text, ""),
    };

    let mut rest = positional;
    let mut arguments = Vec::with_capacity(command.arguments.len());
    let mut raw_arguments = Vec::with_capacity(command.arguments.len());
    let mut ended = false;

    for spec in &command.arguments {
        if ended || rest.trim().is_empty() {
            if let Some(default) = &spec.default {
                arguments.push(default(ctxt.context));
                raw_arguments.push(String::new());
                continue;
            }
            if ended {
                debug!("{}: argument {} has no input left", command.path(), spec.name);
                return None;
            }
        }

        match verify(spec, rest, ctxt.context, ctxt.resolvers) {
            Verified::Invalid => {
                debug!("{}: argument {} did not verify", command.path(), spec.name);
                return None;
            },
            Verified::Valid(value, leftover) => {
                raw_arguments.push(consumed(rest, leftover).to_owned());
                arguments.push(value);
                rest = leftover;
            },
            Verified::EndNow(value, leftover) => {
                raw_arguments.push(consumed(rest, leftover).to_owned());
                arguments.push(value);
                rest = leftover;
                ended = true;
            },
        }
    }

    let remaining = format!("{} {}", rest.trim(), option_tail.trim());
    let (options, overflow) = match options_from_str(
        &remaining,
        &command.options,
        command.unknown_options,
        ctxt.developer,
    ) {
        Ok(x) => x,
        Err(e) => {
            debug!("{}: {e}", command.path());
            return None;
        },
    };

    if !overflow.trim().is_empty() && command.overflow == OverflowPolicy::Fail {
        debug!("{}: unconsumed input {overflow:?}", command.path());
        return None;
    }

    Some(Resolved {
        command: command.clone(),
        trigger: trigger.to_owned(),
        arguments,
        raw_arguments,
        options,
    })
}

fn resolve_at(level: &CommandLevel, text: &str, typed: Option<&str>, ctxt: &ResolveCtxt<'_>) -> OverloadMatch {
    let (token, rest) = split_trigger(text);
    if token.is_empty() {
        return OverloadMatch::NoMatch;
    }

    let candidates = level.candidates(token);
    let Some(first) = candidates.first() else {
        return OverloadMatch::NoMatch;
    };

    let trigger = match typed {
        Some(parent) => format!("{parent} {token}"),
        None => token.to_owned(),
    };

    let mut reported: Option<Arc<Command>> = None;
    for candidate in &candidates {
        if candidate.subcommands.is_empty() {
            continue;
        }

        match resolve_at(&candidate.subcommands, rest, Some(&trigger), ctxt) {
            OverloadMatch::Matched(resolved) => return OverloadMatch::Matched(resolved),
            OverloadMatch::Invalid(deeper) => {
                reported.get_or_insert(deeper);
            },
            OverloadMatch::NoMatch => {},
        }
    }

    for candidate in &candidates {
        if let Some(resolved) = try_candidate(candidate, &trigger, rest, ctxt) {
            return OverloadMatch::Matched(resolved);
        }
    }

    OverloadMatch::Invalid(reported.unwrap_or_else(|| (*first).clone()))
}

/// Resolves `text` (with the prefix already stripped) against `level`.
///
/// Deterministic: the same registry and input always select the same candidate.
pub fn resolve(level: &CommandLevel, text: &str, ctxt: &ResolveCtxt<'_>) -> OverloadMatch {
    resolve_at(level, text, None, ctxt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::arguments::{ArgumentSpec, ArgumentType};
    use crate::command::flags::{OptionSpec, UnknownOptionPolicy};
    use crate::command::registry::Registry;
    use crate::command::{CommandBuilder, CommandEvent, Completion};

    async fn noop(_: CommandEvent) -> anyhow::Result<Completion> {
        Ok(Completion::Done)
    }

    fn command(trigger: &str) -> CommandBuilder {
        Command::builder(trigger).handler(noop)
    }

    fn run(registry: &Registry, text: &str) -> OverloadMatch {
        let context = InvocationContext::default();
        let resolvers = ResolverRegistry::with_defaults();
        let ctxt = ResolveCtxt {
            context: &context,
            resolvers: &resolvers,
            developer: false,
        };
        resolve(registry.root(), text, &ctxt)
    }

    fn matched(result: OverloadMatch) -> Resolved {
        match result {
            OverloadMatch::Matched(r) => r,
            other => panic!("expected a match, got {other:?}"),
        }
    }

    fn add_overloads() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            command("add")
                .description("integers")
                .argument(ArgumentSpec::new("a", ArgumentType::Integer))
                .argument(ArgumentSpec::new("b", ArgumentType::Integer))
                .build()
                .unwrap(),
        );
        registry.register(
            command("add")
                .description("floats")
                .argument(ArgumentSpec::new("a", ArgumentType::Float))
                .argument(ArgumentSpec::new("b", ArgumentType::Float))
                .build()
                .unwrap(),
        );
        registry
    }

    #[test]
    fn overload_determinism() {
        let registry = add_overloads();

        for _ in 0..10 {
            let ints = matched(run(&registry, "add 1 2"));
            assert_eq!(ints.command.description, "integers");
            assert_eq!(ints.arguments, vec![Value::Integer(1), Value::Integer(2)]);

            let floats = matched(run(&registry, "add 1.5 2"));
            assert_eq!(floats.command.description, "floats");
            assert_eq!(floats.arguments, vec![Value::Float(1.5), Value::Float(2.0)]);
        }
    }

    #[test]
    fn invalid_reports_first_candidate() {
        let registry = add_overloads();

        match run(&registry, "add one two") {
            OverloadMatch::Invalid(command) => assert_eq!(command.description, "integers"),
            other => panic!("expected invalid, got {other:?}"),
        }
        assert!(matches!(run(&registry, "subtract 1 2"), OverloadMatch::NoMatch));
        assert!(matches!(run(&registry, "   "), OverloadMatch::NoMatch));
    }

    #[test]
    fn subcommand_precedence() {
        let mut registry = Registry::new();
        registry.register(
            command("channel")
                .description("two words")
                .argument(ArgumentSpec::new("a", ArgumentType::Word))
                .argument(ArgumentSpec::new("b", ArgumentType::Word))
                .subcommand(
                    command("create")
                        .description("create")
                        .argument(ArgumentSpec::new("size", ArgumentType::Integer)),
                )
                .build()
                .unwrap(),
        );

        let deeper = matched(run(&registry, "channel create 5"));
        assert_eq!(deeper.command.path(), "channel create");
        assert_eq!(deeper.trigger, "channel create");
        assert_eq!(deeper.arguments, vec![Value::Integer(5)]);

        let deeper = matched(run(&registry, "Channel CREATE 5"));
        assert_eq!(deeper.trigger, "Channel CREATE");

        // the sub-command does not verify, so the parent is tried
        let parent = matched(run(&registry, "channel create big"));
        assert_eq!(parent.command.description, "two words");
        assert_eq!(parent.arguments, vec![Value::from("create"), Value::from("big")]);

        let parent = matched(run(&registry, "channel a b"));
        assert_eq!(parent.arguments, vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn deeper_invalid_is_reported() {
        let mut registry = Registry::new();
        registry.register(
            Command::builder("channel")
                .subcommand(command("create").argument(ArgumentSpec::new("name", ArgumentType::Word)))
                .build()
                .unwrap(),
        );

        match run(&registry, "channel create") {
            OverloadMatch::Invalid(command) => assert_eq!(command.path(), "channel create"),
            other => panic!("expected invalid, got {other:?}"),
        }
        // the group itself has no handler
        assert!(matches!(run(&registry, "channel"), OverloadMatch::Invalid(_)));
    }

    #[test]
    fn defaults_fill_missing_input() {
        let mut registry = Registry::new();
        registry.register(
            command("roll")
                .argument(ArgumentSpec::new("sides", ArgumentType::Integer).default_value(6))
                .argument(ArgumentSpec::new("times", ArgumentType::Integer).default_value(1))
                .build()
                .unwrap(),
        );

        let resolved = matched(run(&registry, "roll"));
        assert_eq!(resolved.arguments, vec![Value::Integer(6), Value::Integer(1)]);
        assert_eq!(resolved.raw_arguments, vec![String::new(), String::new()]);

        let resolved = matched(run(&registry, "roll 20"));
        assert_eq!(resolved.arguments, vec![Value::Integer(20), Value::Integer(1)]);
        assert_eq!(resolved.raw_arguments[0], "20");
    }

    #[test]
    fn overflow_policy() {
        let mut registry = Registry::new();
        registry.register(
            command("strict")
                .argument(ArgumentSpec::new("word", ArgumentType::Word))
                .build()
                .unwrap(),
        );
        registry.register(
            command("lenient")
                .argument(ArgumentSpec::new("word", ArgumentType::Word))
                .overflow(OverflowPolicy::Ignore)
                .build()
                .unwrap(),
        );

        assert!(matches!(run(&registry, "strict a b"), OverloadMatch::Invalid(_)));
        assert!(matches!(run(&registry, "strict a"), OverloadMatch::Matched(_)));

        let resolved = matched(run(&registry, "lenient a b c"));
        assert_eq!(resolved.arguments, vec![Value::from("a")]);
    }

    #[test]
    fn options_after_rest_argument() {
        let mut registry = Registry::new();
        registry.register(
            command("ban")
                .argument(ArgumentSpec::new("user", ArgumentType::Word))
                .argument(ArgumentSpec::new("reason", ArgumentType::Text).default_value("no reason"))
                .option(OptionSpec::new("silent").alias("s"))
                .option(OptionSpec::new("days").with_value())
                .build()
                .unwrap(),
        );

        let resolved = matched(run(&registry, "ban bob being rude -s --days 7"));
        assert_eq!(resolved.arguments, vec![Value::from("bob"), Value::from("being rude")]);
        assert!(resolved.options.contains_key("silent"));
        assert_eq!(resolved.options.get("days"), Some(&Some("7".to_owned())));

        let resolved = matched(run(&registry, "ban bob -s"));
        assert_eq!(resolved.arguments[1], Value::from("no reason"));

        assert!(matches!(run(&registry, "ban bob --days"), OverloadMatch::Invalid(_)));
    }

    #[test]
    fn quoted_option_text_is_positional() {
        let mut registry = Registry::new();
        registry.register(
            command("echo")
                .argument(ArgumentSpec::new("word", ArgumentType::Word))
                .option(OptionSpec::new("s"))
                .build()
                .unwrap(),
        );

        let resolved = matched(run(&registry, r#"echo "-s""#));
        assert_eq!(resolved.arguments, vec![Value::from("-s")]);
        assert!(resolved.options.is_empty());

        let resolved = matched(run(&registry, r#"echo "-s" -s"#));
        assert_eq!(resolved.arguments, vec![Value::from("-s")]);
        assert!(resolved.options.contains_key("s"));
    }

    #[test]
    fn unknown_option_policy() {
        let mut registry = Registry::new();
        registry.register(
            command("echo")
                .argument(ArgumentSpec::new("word", ArgumentType::Word))
                .option(OptionSpec::new("loud"))
                .unknown_options(UnknownOptionPolicy::Include)
                .overflow(OverflowPolicy::Ignore)
                .build()
                .unwrap(),
        );
        registry.register(
            command("say")
                .argument(ArgumentSpec::new("word", ArgumentType::Word))
                .option(OptionSpec::new("loud"))
                .build()
                .unwrap(),
        );

        assert!(matches!(run(&registry, "echo hi -quiet"), OverloadMatch::Matched(_)));
        assert!(matches!(run(&registry, "say hi -quiet"), OverloadMatch::Invalid(_)));
        assert!(matches!(run(&registry, "say hi -loud"), OverloadMatch::Matched(_)));
    }

    #[test]
    fn endless_candidate() {
        let mut registry = Registry::new();
        registry.register(
            command("sum")
                .argument(ArgumentSpec::new("numbers", ArgumentType::Integer).endless(2, 10))
                .build()
                .unwrap(),
        );

        let resolved = matched(run(&registry, "sum 1 2 3"));
        assert_eq!(
            resolved.arguments,
            vec![Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])]
        );
        assert!(matches!(run(&registry, "sum 1"), OverloadMatch::Invalid(_)));
    }
}
