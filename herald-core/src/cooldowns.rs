use std::time::Duration;

use moka::sync::Cache;
use tokio::time::Instant;

use crate::command::CommandId;
use crate::context::InvocationContext;

/// Who shares a cooldown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CooldownScope {
    #[default]
    User,
    /// Everyone in a guild. Falls back to the user in private messages.
    Guild,
    Channel,
    /// Everyone, everywhere.
    Global,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cooldown {
    pub duration: Duration,
    pub scope: CooldownScope,
}

impl Cooldown {
    pub fn new(duration: Duration, scope: CooldownScope) -> Self {
        Self { duration, scope }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum ScopeKey {
    User(u64),
    Guild(u64),
    Channel(u64),
    Global,
}

impl ScopeKey {
    fn of(scope: CooldownScope, ctx: &InvocationContext) -> Self {
        match scope {
            CooldownScope::User => Self::User(ctx.author.id),
            CooldownScope::Guild => ctx
                .location
                .guild_id
                .map_or(Self::User(ctx.author.id), Self::Guild),
            CooldownScope::Channel => Self::Channel(ctx.location.channel_id),
            CooldownScope::Global => Self::Global,
        }
    }
}

/// All live cooldowns, in the format <(command id, scope key) => expiry>.
///
/// Keyed by command id rather than path, so overloads sharing a trigger keep separate windows.
///
/// Entries are created on first use and pruned when they are checked after expiry. The cache
/// capacity bounds memory; evicting an entry early only shortens a cooldown.
pub struct CommandCooldowns(Cache<(CommandId, ScopeKey), Instant>);

impl CommandCooldowns {
    pub fn new(capacity: u64) -> Self {
        Self(Cache::builder().max_capacity(capacity).build())
    }

    /// Time until the cooldown of `command` expires for this context, if it is live.
    pub fn remaining(&self, command: CommandId, cooldown: &Cooldown, ctx: &InvocationContext) -> Option<Duration> {
        let key = (command, ScopeKey::of(cooldown.scope, ctx));
        let expiry = self.0.get(&key)?;
        let now = Instant::now();

        if expiry > now {
            Some(expiry - now)
        } else {
            self.0.invalidate(&key);
            None
        }
    }

    /// Returns the remaining time if the cooldown is live. Otherwise starts a new cooldown window.
    pub fn check_and_stamp(
        &self,
        command: CommandId,
        cooldown: &Cooldown,
        ctx: &InvocationContext,
    ) -> Result<(), Duration> {
        if cooldown.duration.is_zero() {
            return Ok(());
        }

        if let Some(remaining) = self.remaining(command, cooldown, ctx) {
            return Err(remaining);
        }

        let key = (command, ScopeKey::of(cooldown.scope, ctx));
        self.0.insert(key, Instant::now() + cooldown.duration);
        Ok(())
    }

    /// Clears the cooldown of `command` for this context.
    pub fn reset(&self, command: CommandId, cooldown: &Cooldown, ctx: &InvocationContext) {
        self.0.invalidate(&(command, ScopeKey::of(cooldown.scope, ctx)));
    }
}

impl Default for CommandCooldowns {
    fn default() -> Self {
        Self::new(10_000)
    }
}
