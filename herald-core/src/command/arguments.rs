use std::any::Any;
use std::borrow::Cow;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::resolvers::{Resolution, ResolverRegistry};
use crate::context::InvocationContext;

const QUOTE: char = '"';
const ESCAPE: char = '\\';

/// The target type of an argument. Each type is converted by the resolver registered for it in
/// the [`ResolverRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgumentType {
    /// A single 'word'. Words are separated by whitespace, or enclosed in quotes.
    Word,
    /// The rest of the message from this point onwards.
    Text,
    /// A whole number, parsed as an i64.
    Integer,
    /// A floating-point number, parsed as an f64.
    Float,
    /// `true`/`false`, `yes`/`no`, `on`/`off` or `1`/`0`.
    Boolean,
    /// A time such as `1h20m30s`.
    Time,
    /// A type resolved by a host-provided resolver, e.g. a user or channel lookup.
    Custom(&'static str),
}

impl Display for ArgumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Word => f.write_str("word"),
            Self::Text => f.write_str("text"),
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::Time => f.write_str("time"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// An argument after parsing.
#[derive(Clone)]
pub enum Value {
    /// Produced by `Word` and `Text` arguments.
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Time(Duration),
    /// The elements of an endless argument, in input order.
    Array(Vec<Value>),
    /// Produced by host resolvers.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Value {
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Self::Text(x) = self { Some(x) } else { None }
    }

    pub fn as_integer(&self) -> Option<i64> {
        if let Self::Integer(x) = self { Some(*x) } else { None }
    }

    pub fn as_float(&self) -> Option<f64> {
        if let Self::Float(x) = self { Some(*x) } else { None }
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Self::Boolean(x) = self { Some(*x) } else { None }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        if let Self::Time(x) = self { Some(*x) } else { None }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        if let Self::Array(x) = self { Some(x) } else { None }
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        if let Self::Custom(x) = self { x.downcast_ref::<T>() } else { None }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(x) => write!(f, "Text({x:?})"),
            Self::Integer(x) => write!(f, "Integer({x})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::Boolean(x) => write!(f, "Boolean({x})"),
            Self::Time(x) => write!(f, "Time({x:?})"),
            Self::Array(x) => f.debug_tuple("Array").field(x).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Duration> for Value {
    fn from(value: Duration) -> Self {
        Self::Time(value)
    }
}

/// Computes a default value for an argument that was not supplied.
pub type DefaultSupplier = Arc<dyn Fn(&InvocationContext) -> Value + Send + Sync>;

/// Element count bounds of an endless argument. A `max` of 0 means unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Endless {
    pub min: usize,
    pub max: usize,
}

/// Arguments are declared on commands in the order in which they must appear in a message.
#[derive(Clone)]
pub struct ArgumentSpec {
    /// Used in usage strings and for looking up values by name.
    pub name: String,
    pub description: String,
    pub r#type: ArgumentType,
    /// Set for greedy array arguments. Only the last argument of a command may be endless.
    pub endless: Option<Endless>,
    /// Whether `"quoted text"` counts as a single token.
    pub accept_quote: bool,
    /// Whether the resolver is invoked with an empty token when no text remains.
    pub accept_empty: bool,
    /// Whether the whole remaining text is handed to the resolver as one token.
    pub rest: bool,
    pub default: Option<DefaultSupplier>,
}

impl ArgumentSpec {
    pub fn new(name: impl Into<String>, r#type: ArgumentType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            r#type,
            endless: None,
            accept_quote: true,
            accept_empty: false,
            rest: r#type == ArgumentType::Text,
            default: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Makes this a greedy array argument of between `min` and `max` elements (`max` of 0 is
    /// unbounded).
    pub fn endless(mut self, min: usize, max: usize) -> Self {
        self.endless = Some(Endless { min, max });
        self
    }

    pub fn accept_quote(mut self, accept: bool) -> Self {
        self.accept_quote = accept;
        self
    }

    pub fn accept_empty(mut self, accept: bool) -> Self {
        self.accept_empty = accept;
        self
    }

    pub fn rest(mut self, rest: bool) -> Self {
        self.rest = rest;
        self
    }

    pub fn default_value(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default_with(move |_| value.clone())
    }

    pub fn default_with<F>(mut self, supplier: F) -> Self
    where
        F: Fn(&InvocationContext) -> Value + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(supplier));
        self
    }

    pub fn is_endless(&self) -> bool {
        self.endless.is_some()
    }

    /// Renders this argument for a usage string: `<name>` when required, `[name]` when it has a
    /// default, and with a `...` suffix when endless.
    pub fn usage(&self) -> String {
        let optional = self.default.is_some() || self.endless.is_some_and(|e| e.min == 0);
        let suffix = if self.endless.is_some() { "..." } else { "" };

        if optional {
            format!("[{}{suffix}]", self.name)
        } else {
            format!("<{}{suffix}>", self.name)
        }
    }
}

impl Debug for ArgumentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgumentSpec")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("endless", &self.endless)
            .field("accept_quote", &self.accept_quote)
            .field("accept_empty", &self.accept_empty)
            .field("rest", &self.rest)
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// The outcome of verifying a single argument against the remaining message text.
#[derive(Debug, PartialEq)]
pub enum Verified<'a> {
    Invalid,
    /// The value was parsed and verification continues with the leftover text.
    Valid(Value, &'a str),
    /// The value was parsed and no further positional arguments may be attempted.
    EndNow(Value, &'a str),
}

impl Verified<'_> {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

/// A token split off the front of some text.
#[derive(Debug, PartialEq)]
pub struct Token<'a> {
    pub value: Cow<'a, str>,
    /// Text after the token, without the separating whitespace.
    pub leftover: &'a str,
    /// Whether the token was enclosed in a closed pair of quotes.
    pub quoted: bool,
    /// Set when the text opened a quote that was never closed. The token then falls back to
    /// whitespace splitting.
    pub unterminated_quote: bool,
}

fn is_escaped(text: &str, idx: usize) -> bool {
    text[..idx].ends_with(ESCAPE)
}

/// Removes backslashes that escape whitespace or quotes.
fn unescape(raw: &str) -> Cow<'_, str> {
    if !raw.contains(ESCAPE) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ESCAPE && chars.peek().is_some_and(|&next| next == QUOTE || next.is_whitespace()) {
            continue;
        }
        out.push(c);
    }

    Cow::Owned(out)
}

fn split_whitespace_token(text: &str) -> (Cow<'_, str>, &str) {
    let split = text
        .char_indices()
        .find(|&(idx, c)| c.is_whitespace() && !is_escaped(text, idx));

    match split {
        Some((idx, _)) => (unescape(&text[..idx]), text[idx..].trim_start()),
        None => (unescape(text), ""),
    }
}

/// Splits the next token off `text`. Leading whitespace is skipped.
pub fn split_token(text: &str, accept_quote: bool) -> Token<'_> {
    let text = text.trim_start();

    if accept_quote && text.starts_with(QUOTE) {
        let closing = text
            .char_indices()
            .skip(1)
            .find(|&(idx, c)| c == QUOTE && !is_escaped(text, idx));

        if let Some((idx, _)) = closing {
            let inner = &text[1..idx];
            let value = if inner.contains("\\\"") {
                Cow::Owned(inner.replace("\\\"", "\""))
            } else {
                Cow::Borrowed(inner)
            };

            return Token {
                value,
                leftover: text[idx + 1..].trim_start(),
                quoted: true,
                unterminated_quote: false,
            };
        }

        let (value, leftover) = split_whitespace_token(text);
        return Token {
            value,
            leftover,
            quoted: false,
            unterminated_quote: true,
        };
    }

    let (value, leftover) = split_whitespace_token(text);
    Token {
        value,
        leftover,
        quoted: false,
        unterminated_quote: false,
    }
}

fn resolve<'a>(
    spec: &ArgumentSpec,
    token: &str,
    leftover: &'a str,
    ctx: &InvocationContext,
    resolvers: &ResolverRegistry,
) -> Verified<'a> {
    let Some(resolver) = resolvers.get(spec.r#type) else {
        warn!("no resolver registered for argument type {} ({})", spec.r#type, spec.name);
        return Verified::Invalid;
    };

    match resolver.resolve(ctx, token) {
        Resolution::Invalid => Verified::Invalid,
        Resolution::Valid(value) => Verified::Valid(value, leftover),
        Resolution::EndNow(value) => Verified::EndNow(value, leftover),
    }
}

/// Verifies one value of `spec`, ignoring its endless bounds. In `strict` mode an unterminated
/// quote is invalid instead of falling back to whitespace splitting.
fn verify_single<'a>(
    spec: &ArgumentSpec,
    text: &'a str,
    ctx: &InvocationContext,
    resolvers: &ResolverRegistry,
    strict: bool,
) -> Verified<'a> {
    let text = text.trim_start();

    if text.is_empty() {
        return if spec.accept_empty {
            resolve(spec, "", "", ctx, resolvers)
        } else {
            Verified::Invalid
        };
    }

    if spec.rest {
        return resolve(spec, text.trim_end(), "", ctx, resolvers);
    }

    let token = split_token(text, spec.accept_quote);
    if strict && token.unterminated_quote {
        return Verified::Invalid;
    }

    resolve(spec, &token.value, token.leftover, ctx, resolvers)
}

fn verify_endless<'a>(
    spec: &ArgumentSpec,
    bounds: Endless,
    text: &'a str,
    ctx: &InvocationContext,
    resolvers: &ResolverRegistry,
) -> Verified<'a> {
    let mut values = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        if bounds.max > 0 && values.len() == bounds.max {
            break;
        }

        match verify_single(spec, rest, ctx, resolvers, true) {
            Verified::Invalid => return Verified::Invalid,
            Verified::Valid(value, leftover) => {
                values.push(value);
                rest = leftover.trim_start();
            },
            Verified::EndNow(value, leftover) => {
                values.push(value);
                rest = leftover.trim_start();
                break;
            },
        }
    }

    if values.len() < bounds.min || !rest.is_empty() {
        return Verified::Invalid;
    }

    Verified::EndNow(Value::Array(values), "")
}

/// Verifies `text` against `spec`, converting the leading token(s) with the resolver registered
/// for the argument's type.
///
/// This never fails in any other way than returning [`Verified::Invalid`].
pub fn verify<'a>(
    spec: &ArgumentSpec,
    text: &'a str,
    ctx: &InvocationContext,
    resolvers: &ResolverRegistry,
) -> Verified<'a> {
    match spec.endless {
        Some(bounds) => verify_endless(spec, bounds, text, ctx, resolvers),
        None => verify_single(spec, text, ctx, resolvers, false),
    }
}
