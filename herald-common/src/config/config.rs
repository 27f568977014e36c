// See config.toml in herald-playground for an annotated example of every field here.

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct HeraldConfig {
    pub prefix: Prefixes,
    pub dev: DevAttributes,
    pub dispatch: Dispatch,
    pub timeouts: Timeouts,
    pub logging: Logging,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Prefixes {
    pub default: String,
    /// Messages sent outside of a guild may omit the prefix entirely.
    pub allow_unprefixed_private: bool,
    /// If set, mentioning this user at the start of a message acts as a prefix.
    pub mention_bot_id: Option<u64>,
}

impl Default for Prefixes {
    fn default() -> Self {
        Self {
            default: "-".to_owned(),
            allow_unprefixed_private: false,
            mention_bot_id: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DevAttributes {
    pub admin_users: Vec<u64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Handlers run on the dispatching task.
    #[default]
    Inline,
    /// Handlers are handed to the ordered executor.
    Scheduled,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Dispatch {
    pub execution: ExecutionMode,
    /// Maximum number of live cooldown entries.
    pub cooldown_capacity: u64,
}

impl Default for Dispatch {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::Inline,
            cooldown_capacity: 10_000,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Timeouts {
    pub waiter_default_secs: u64,
    /// Zero disables auto-expiry of paged sessions.
    pub pages_default_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            waiter_default_secs: 30,
            pages_default_secs: 120,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Logging {
    /// An `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}
