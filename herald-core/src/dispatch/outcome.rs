use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use herald_common::util::format_time;

use crate::command::errors::ExecutionError;
use crate::command::Command;
use crate::context::Permission;

/// The result of dispatching one message. Only [`Outcome::ExecutionError`] represents a fault;
/// everything else is a normal, typed result for the host to render (or ignore).
#[derive(Debug)]
pub enum Outcome {
    /// The message was not prefixed, or no trigger matched.
    NoCommandMatch,
    /// A trigger matched but no candidate's arguments verified.
    InvalidArguments { command: Arc<Command> },
    MissingCallerPermissions {
        command: Arc<Command>,
        missing: Vec<Permission>,
    },
    MissingAgentPermissions {
        command: Arc<Command>,
        missing: Vec<Permission>,
    },
    /// The command cannot be used in a guild, or in private messages.
    NotTriggerableHere { command: Arc<Command> },
    BotAuthorRejected { command: Arc<Command> },
    DeveloperOnly { command: Arc<Command> },
    OnCooldown {
        command: Arc<Command>,
        remaining: Duration,
    },
    ExecutionError(ExecutionError),
    /// The handler ran and returned [`crate::command::Completion::Cancelled`].
    Cancelled { command: Arc<Command> },
    Success { command: Arc<Command> },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorSeverity {
    Low,
    High,
}

impl Outcome {
    pub fn get_severity(&self) -> ErrorSeverity {
        match self {
            Self::ExecutionError(_) => ErrorSeverity::High,
            _ => ErrorSeverity::Low,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The command the outcome concerns, if one was resolved.
    pub fn command(&self) -> Option<&Arc<Command>> {
        match self {
            Self::NoCommandMatch | Self::ExecutionError(_) => None,
            Self::InvalidArguments { command }
            | Self::MissingCallerPermissions { command, .. }
            | Self::MissingAgentPermissions { command, .. }
            | Self::NotTriggerableHere { command }
            | Self::BotAuthorRejected { command }
            | Self::DeveloperOnly { command }
            | Self::OnCooldown { command, .. }
            | Self::Cancelled { command }
            | Self::Success { command } => Some(command),
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCommandMatch => f.write_str("no command matched"),
            Self::InvalidArguments { command } => write!(f, "invalid arguments, usage: {}", command.usage),
            Self::MissingCallerPermissions { command, missing } => write!(
                f,
                "{} requires permissions the caller lacks: {}",
                command.path(),
                missing.join(", ")
            ),
            Self::MissingAgentPermissions { command, missing } => write!(
                f,
                "{} requires permissions the bot lacks: {}",
                command.path(),
                missing.join(", ")
            ),
            Self::NotTriggerableHere { command } => write!(f, "{} cannot be used here", command.path()),
            Self::BotAuthorRejected { command } => write!(f, "{} cannot be used by bots", command.path()),
            Self::DeveloperOnly { command } => write!(f, "{} is developer-only", command.path()),
            Self::OnCooldown { command, remaining } => write!(
                f,
                "{} is on cooldown for {}",
                command.path(),
                format_time(*remaining)
            ),
            Self::ExecutionError(e) => write!(f, "{e}"),
            Self::Cancelled { command } => write!(f, "{} was cancelled", command.path()),
            Self::Success { command } => write!(f, "{} succeeded", command.path()),
        }
    }
}
