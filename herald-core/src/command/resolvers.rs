use std::collections::HashMap;
use std::sync::Arc;

use herald_common::util::parse_duration;

use super::arguments::{ArgumentType, Value};
use crate::context::InvocationContext;

/// What a resolver made of a token.
#[derive(Debug, PartialEq)]
pub enum Resolution {
    Invalid,
    Valid(Value),
    /// The value absorbed the remaining input; no further positional arguments may follow.
    EndNow(Value),
}

/// Converts a raw token into a typed [`Value`].
///
/// Resolvers must treat malformed input as [`Resolution::Invalid`] and never panic. Hosts register
/// their own resolvers for platform entities (users, channels, roles) under
/// [`ArgumentType::Custom`].
pub trait Resolver: Send + Sync {
    fn resolve(&self, ctx: &InvocationContext, token: &str) -> Resolution;
}

impl<F> Resolver for F
where
    F: Fn(&InvocationContext, &str) -> Resolution + Send + Sync,
{
    fn resolve(&self, ctx: &InvocationContext, token: &str) -> Resolution {
        self(ctx, token)
    }
}

fn resolve_word(_: &InvocationContext, token: &str) -> Resolution {
    Resolution::Valid(Value::from(token))
}

fn resolve_text(_: &InvocationContext, token: &str) -> Resolution {
    Resolution::EndNow(Value::from(token))
}

fn resolve_integer(_: &InvocationContext, token: &str) -> Resolution {
    match token.parse::<i64>() {
        Ok(x) => Resolution::Valid(Value::Integer(x)),
        Err(_) => Resolution::Invalid,
    }
}

fn resolve_float(_: &InvocationContext, token: &str) -> Resolution {
    match token.parse::<f64>() {
        Ok(x) if x.is_finite() => Resolution::Valid(Value::Float(x)),
        _ => Resolution::Invalid,
    }
}

fn resolve_boolean(_: &InvocationContext, token: &str) -> Resolution {
    match token.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Resolution::Valid(Value::Boolean(true)),
        "false" | "no" | "off" | "0" => Resolution::Valid(Value::Boolean(false)),
        _ => Resolution::Invalid,
    }
}

fn resolve_time(_: &InvocationContext, token: &str) -> Resolution {
    match parse_duration(token) {
        Ok(x) => Resolution::Valid(Value::Time(x)),
        Err(_) => Resolution::Invalid,
    }
}

/// Maps argument types to their resolvers. Populated during setup and read-only afterwards.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<ArgumentType, Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    /// An empty registry. Every argument will be invalid until resolvers are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with resolvers for every built-in [`ArgumentType`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ArgumentType::Word, resolve_word);
        registry.register(ArgumentType::Text, resolve_text);
        registry.register(ArgumentType::Integer, resolve_integer);
        registry.register(ArgumentType::Float, resolve_float);
        registry.register(ArgumentType::Boolean, resolve_boolean);
        registry.register(ArgumentType::Time, resolve_time);
        registry
    }

    /// Registers `resolver` for `r#type`, replacing any previous one.
    pub fn register(&mut self, r#type: ArgumentType, resolver: impl Resolver + 'static) -> &mut Self {
        self.resolvers.insert(r#type, Arc::new(resolver));
        self
    }

    pub fn get(&self, r#type: ArgumentType) -> Option<&Arc<dyn Resolver>> {
        self.resolvers.get(&r#type)
    }

    pub fn contains(&self, r#type: ArgumentType) -> bool {
        self.resolvers.contains_key(&r#type)
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.resolvers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn resolve(r#type: ArgumentType, token: &str) -> Resolution {
        let registry = ResolverRegistry::with_defaults();
        let resolver = registry.get(r#type).unwrap();
        resolver.resolve(&InvocationContext::default(), token)
    }

    #[test]
    fn builtin_resolvers() {
        assert_eq!(resolve(ArgumentType::Integer, "-42"), Resolution::Valid(Value::Integer(-42)));
        assert_eq!(resolve(ArgumentType::Integer, "4.2"), Resolution::Invalid);
        assert_eq!(resolve(ArgumentType::Float, "4.2"), Resolution::Valid(Value::Float(4.2)));
        assert_eq!(resolve(ArgumentType::Float, "NaN"), Resolution::Invalid);
        assert_eq!(resolve(ArgumentType::Boolean, "Yes"), Resolution::Valid(Value::Boolean(true)));
        assert_eq!(resolve(ArgumentType::Boolean, "maybe"), Resolution::Invalid);
        assert_eq!(
            resolve(ArgumentType::Time, "1m30s"),
            Resolution::Valid(Value::Time(Duration::from_secs(90)))
        );
        assert_eq!(resolve(ArgumentType::Time, "soon"), Resolution::Invalid);
        assert_eq!(resolve(ArgumentType::Text, "a b"), Resolution::EndNow(Value::from("a b")));
    }

    #[test]
    fn custom_resolver() {
        #[derive(Debug, PartialEq)]
        struct Colour(u32);

        let mut registry = ResolverRegistry::with_defaults();
        registry.register(ArgumentType::Custom("colour"), |_: &InvocationContext, token: &str| {
            match u32::from_str_radix(token.trim_start_matches('#'), 16) {
                Ok(x) => Resolution::Valid(Value::custom(Colour(x))),
                Err(_) => Resolution::Invalid,
            }
        });

        let resolver = registry.get(ArgumentType::Custom("colour")).unwrap();
        let Resolution::Valid(value) = resolver.resolve(&InvocationContext::default(), "#ff0000") else {
            panic!("expected a colour");
        };
        assert_eq!(value.downcast::<Colour>(), Some(&Colour(0xff0000)));
        assert!(!registry.contains(ArgumentType::Custom("user")));
    }
}
