use std::sync::Arc;

use herald_common::config::Prefixes;
use herald_common::util::leading_user_mention;
use tracing::debug;

use crate::context::InvocationContext;

/// Returns the byte length of the prefix at the start of the text, if there is one.
pub type PrefixPredicate = Arc<dyn Fn(&str, &InvocationContext) -> Option<usize> + Send + Sync>;

#[derive(Clone)]
pub enum Prefix {
    Literal(String),
    /// For prefixes that depend on the context, e.g. per-guild prefixes held by the host.
    Predicate(PrefixPredicate),
}

impl Prefix {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str, &InvocationContext) -> Option<usize> + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    fn match_len(&self, text: &str, ctx: &InvocationContext) -> Option<usize> {
        match self {
            Self::Literal(p) if !p.is_empty() && text.starts_with(p.as_str()) => Some(p.len()),
            Self::Literal(_) => None,
            Self::Predicate(f) => f(text, ctx).filter(|&len| text.is_char_boundary(len)),
        }
    }
}

impl std::fmt::Debug for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(p) => f.debug_tuple("Literal").field(p).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// All prefixes a message may be invoked with.
///
/// Precedence:
/// 1. a mention of the bot, if a bot id is configured
/// 2. the configured prefixes, in the order they were added
/// 3. no prefix at all, in private messages, if allowed
#[derive(Clone, Debug, Default)]
pub struct PrefixSet {
    prefixes: Vec<Prefix>,
    mention_bot_id: Option<u64>,
    allow_unprefixed_private: bool,
}

impl PrefixSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Prefixes) -> Self {
        Self {
            prefixes: vec![Prefix::Literal(config.default.clone())],
            mention_bot_id: config.mention_bot_id,
            allow_unprefixed_private: config.allow_unprefixed_private,
        }
    }

    pub fn with(mut self, prefix: Prefix) -> Self {
        self.prefixes.push(prefix);
        self
    }

    /// Splits the matched prefix off `text`, returning `(prefix, rest)`.
    pub fn strip<'a>(&self, text: &'a str, ctx: &InvocationContext) -> Option<(&'a str, &'a str)> {
        if let (Some(bot_id), Some((id, len))) = (self.mention_bot_id, leading_user_mention(text)) {
            if id == bot_id {
                return Some(text.split_at(len));
            }
        }

        if let Some(len) = self.prefixes.iter().find_map(|p| p.match_len(text, ctx)) {
            return Some(text.split_at(len));
        }

        if self.allow_unprefixed_private && ctx.location.is_private() {
            return Some(("", text));
        }

        debug!("parser: message not prefixed");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Author, Location};

    fn guild() -> InvocationContext {
        InvocationContext::new(Author::default(), Location {
            channel_id: 1,
            guild_id: Some(2),
        })
    }

    #[test]
    fn literal_and_mention() {
        let prefixes = PrefixSet::from_config(&Prefixes {
            default: "-".to_owned(),
            allow_unprefixed_private: false,
            mention_bot_id: Some(42),
        });

        assert_eq!(prefixes.strip("-ping", &guild()), Some(("-", "ping")));
        assert_eq!(prefixes.strip("<@42> ping", &guild()), Some(("<@42>", " ping")));
        assert_eq!(prefixes.strip("<@!42>ping", &guild()), Some(("<@!42>", "ping")));
        assert_eq!(prefixes.strip("<@43> ping", &guild()), None);
        assert_eq!(prefixes.strip("ping", &guild()), None);
    }

    #[test]
    fn unprefixed_private() {
        let prefixes = PrefixSet::from_config(&Prefixes {
            allow_unprefixed_private: true,
            ..Default::default()
        });

        assert_eq!(prefixes.strip("ping", &InvocationContext::default()), Some(("", "ping")));
        assert_eq!(prefixes.strip("-ping", &InvocationContext::default()), Some(("-", "ping")));
        assert_eq!(prefixes.strip("ping", &guild()), None);
    }

    #[test]
    fn predicate_prefix() {
        let prefixes = PrefixSet::new().with(Prefix::predicate(|text, ctx| {
            (ctx.location.guild_id == Some(2) && text.starts_with("g!")).then_some(2)
        }));

        assert_eq!(prefixes.strip("g!ping", &guild()), Some(("g!", "ping")));
        assert_eq!(prefixes.strip("g!ping", &InvocationContext::default()), None);
    }
}
