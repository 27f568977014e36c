use std::fmt::Display;

use super::arguments::Value;

/// A command definition that violates the argument ordering rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandBuildError {
    EmptyTrigger,
    /// The command has neither a handler nor sub-commands.
    MissingHandler(String),
    /// Triggers and aliases are single tokens; use sub-commands for multi-word paths.
    WhitespaceInTrigger(String),
    MultipleEndless,
    /// The endless argument is not the last positional argument.
    EndlessNotLast(String),
    /// An argument without a default follows one with a default.
    RequiredAfterDefault { required: String, defaulted: String },
}

impl Display for CommandBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTrigger => f.write_str("a command trigger cannot be empty"),
            Self::MissingHandler(t) => write!(f, "command {t} has neither a handler nor sub-commands"),
            Self::WhitespaceInTrigger(t) => write!(f, "trigger or alias {t:?} contains whitespace"),
            Self::MultipleEndless => f.write_str("a command may have at most one endless argument"),
            Self::EndlessNotLast(name) => write!(f, "endless argument {name} must be the last argument"),
            Self::RequiredAfterDefault { required, defaulted } => write!(
                f,
                "argument {required} has no default but follows argument {defaulted}, which does"
            ),
        }
    }
}
impl std::error::Error for CommandBuildError {}

/// Why a handler did not complete.
#[derive(Debug)]
pub enum ExecutionFailure {
    /// The handler returned an error.
    Failed(anyhow::Error),
    /// The handler panicked; holds the panic message if it was a string.
    Panicked(String),
}

impl Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{e:#}"),
            Self::Panicked(message) => write!(f, "handler panicked: {message}"),
        }
    }
}

/// A handler failure, along with the invocation that caused it.
#[derive(Debug)]
pub struct ExecutionError {
    /// Space-separated trigger path of the command.
    pub command: String,
    pub arguments: Vec<Value>,
    pub cause: ExecutionFailure,
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "command {} failed: {}", self.command, self.cause)
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            ExecutionFailure::Failed(e) => Some(&**e),
            ExecutionFailure::Panicked(_) => None,
        }
    }
}
