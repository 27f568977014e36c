pub mod config;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tracing::warn;

pub use crate::config::config::{DevAttributes, Dispatch, ExecutionMode, HeraldConfig, Logging, Prefixes, Timeouts};

pub static CONFIG_LOCATION: &str = "./config.toml";

impl HeraldConfig {
    /// Reads and parses the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let config = toml::from_str::<HeraldConfig>(raw)?;
        if config.prefix.default.is_empty() {
            warn!("the default prefix is empty, every guild message will be parsed as a command");
        }
        Ok(config)
    }

    pub fn is_developer(&self, user_id: u64) -> bool {
        self.dev.admin_users.contains(&user_id)
    }

    pub fn waiter_default_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.waiter_default_secs)
    }

    /// `None` when paged sessions should never expire.
    pub fn pages_default_timeout(&self) -> Option<Duration> {
        match self.timeouts.pages_default_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
