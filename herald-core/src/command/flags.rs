use std::collections::HashMap;
use std::fmt::Display;

use lazy_static::lazy_static;
use regex::Regex;

use super::arguments::{Token, split_token};

lazy_static! {
    static ref OPTION_TOKEN: Regex = Regex::new(r"^--?([A-Za-z][\w-]*)$").unwrap();
}

/// Parsed options, keyed by canonical option name. Value-less options map to `None`.
pub type ParsedOptions = HashMap<String, Option<String>>;

/// A flag-style option such as `-silent` or `--reason "being rude"`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    /// Whether the option consumes the following token as its value.
    pub takes_value: bool,
    pub hidden: bool,
    /// Developer-only options are treated as unknown for everyone else.
    pub developer_only: bool,
}

impl OptionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_value(mut self) -> Self {
        self.takes_value = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn developer_only(mut self) -> Self {
        self.developer_only = true;
        self
    }

    fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

/// What happens to option-looking tokens that no declared option matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownOptionPolicy {
    /// The candidate fails verification.
    #[default]
    Fail,
    /// The token is kept as ordinary leftover text.
    Include,
}

/// What happens to text left over after all positional arguments and options were consumed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// The candidate fails verification.
    #[default]
    Fail,
    /// The text is discarded.
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    Unrecognised(String),
    MissingValue(String),
}

impl Display for OptionsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrecognised(name) => write!(f, "unrecognised option: {name}"),
            Self::MissingValue(name) => write!(f, "option {name} expects a value, but none was provided"),
        }
    }
}
impl std::error::Error for OptionsError {}

/// Returns the option name if `token` looks like an option (`-name` or `--name`). Quoted tokens are
/// always plain text.
fn option_name<'a>(token: &'a Token<'_>) -> Option<&'a str> {
    if token.quoted {
        return None;
    }
    OPTION_TOKEN.captures(&token.value).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn find_spec<'a>(specs: &'a [OptionSpec], name: &str, developer: bool) -> Option<&'a OptionSpec> {
    specs
        .iter()
        .find(|s| s.matches(name) && (developer || !s.developer_only))
}

/// Byte offset of the first token in `text` that names one of `specs`, if any.
///
/// Positional arguments are verified against the text before this offset, so that arguments which
/// consume the rest of a message leave trailing options alone.
pub fn first_option_offset(text: &str, specs: &[OptionSpec]) -> Option<usize> {
    if specs.is_empty() {
        return None;
    }

    let mut rest = text;
    loop {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            return None;
        }

        let offset = text.len() - trimmed.len();
        let token = split_token(trimmed, true);
        if option_name(&token).is_some_and(|name| specs.iter().any(|s| s.matches(name))) {
            return Some(offset);
        }

        rest = token.leftover;
    }
}

/// Extracts declared options from `input`.
///
/// Returns the parsed options and whatever text was not consumed by them, with tokens joined by
/// single spaces.
pub fn options_from_str(
    input: &str,
    specs: &[OptionSpec],
    unknown: UnknownOptionPolicy,
    developer: bool,
) -> Result<(ParsedOptions, String), OptionsError> {
    let mut entries = ParsedOptions::new();
    let mut leftover: Vec<String> = Vec::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let token = split_token(rest, true);
        rest = token.leftover;

        let Some(name) = option_name(&token) else {
            leftover.push(token.value.into_owned());
            continue;
        };

        match find_spec(specs, name, developer) {
            Some(spec) if spec.takes_value => {
                let value = split_token(rest, true);
                if rest.is_empty() || option_name(&value).is_some() {
                    return Err(OptionsError::MissingValue(spec.name.clone()));
                }

                rest = value.leftover;
                entries.insert(spec.name.clone(), Some(value.value.into_owned()));
            },
            Some(spec) => {
                entries.insert(spec.name.clone(), None);
            },
            None => match unknown {
                UnknownOptionPolicy::Fail => return Err(OptionsError::Unrecognised(name.to_owned())),
                UnknownOptionPolicy::Include => leftover.push(token.value.into_owned()),
            },
        }
    }

    Ok((entries, leftover.join(" ")))
}
