//! The command engine: turns free-text chat messages into validated, typed handler invocations.
//!
//! A host builds a [`command::registry::Registry`] of commands and a
//! [`command::resolvers::ResolverRegistry`] of argument resolvers, hands both to a
//! [`dispatch::Dispatcher`], and feeds it every inbound message. Each message yields exactly one
//! [`dispatch::outcome::Outcome`]; rendering it is left to the host.
//!
//! [`timeout`] holds the shared timer facility used by follow-up interactions (waiting for a reply,
//! paging through results).

pub mod command;
pub mod context;
pub mod cooldowns;
pub mod dispatch;
pub mod executor;
pub mod timeout;

pub use command::arguments::{ArgumentSpec, ArgumentType, Value};
pub use command::registry::Registry;
pub use command::resolvers::ResolverRegistry;
pub use command::{Command, CommandEvent, Completion};
pub use context::{InboundMessage, InvocationContext};
pub use dispatch::outcome::Outcome;
pub use dispatch::Dispatcher;
