use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

/// An opaque permission node, such as `"ban_members"` or `"music.skip"`.
///
/// The engine never interprets these; satisfying them is up to the [`PermissionModel`].
pub type Permission = String;

/// The user (or bot, or webhook) that sent a message.
#[derive(Clone, Debug, Default)]
pub struct Author {
    pub id: u64,
    /// Whether the author is an automated agent.
    pub bot: bool,
    /// Permission nodes granted to the author in the current location.
    pub permissions: BTreeSet<Permission>,
}

/// Where a message was sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub channel_id: u64,
    /// `None` for private (direct) messages.
    pub guild_id: Option<u64>,
}

impl Location {
    pub fn is_private(&self) -> bool {
        self.guild_id.is_none()
    }
}

/// Everything about an inbound message other than its text.
///
/// Only the author, location and agent permissions are read during gating. The `payload` is
/// never touched and is handed to resolvers and handlers as-is.
#[derive(Clone, Default)]
pub struct InvocationContext {
    pub author: Author,
    pub location: Location,
    /// Permission nodes granted to the executing agent (the bot itself) in this location.
    pub agent_permissions: BTreeSet<Permission>,
    pub payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl InvocationContext {
    pub fn new(author: Author, location: Location) -> Self {
        Self {
            author,
            location,
            agent_permissions: BTreeSet::new(),
            payload: None,
        }
    }

    pub fn with_agent_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.agent_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_payload<T: Any + Send + Sync>(mut self, payload: T) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Returns the host payload if it is of type `T`.
    pub fn payload<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_deref()?.downcast_ref::<T>()
    }
}

impl Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("author", &self.author)
            .field("location", &self.location)
            .field("agent_permissions", &self.agent_permissions)
            .field("payload", &self.payload.as_ref().map(|_| ".."))
            .finish()
    }
}

/// An inbound message as seen by the dispatcher.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub text: String,
    pub context: InvocationContext,
}

impl InboundMessage {
    pub fn new(text: impl Into<String>, context: InvocationContext) -> Self {
        Self {
            text: text.into(),
            context,
        }
    }
}

/// Decides whether the caller and the agent hold the permissions a command requires.
///
/// Hosts with a richer permission system (role hierarchies, channel overwrites) implement this
/// themselves. Both methods return the permissions that are **missing**; an empty vector means the
/// requirement is satisfied.
pub trait PermissionModel: Send + Sync {
    fn missing_caller(&self, ctx: &InvocationContext, required: &[Permission]) -> Vec<Permission>;
    fn missing_agent(&self, ctx: &InvocationContext, required: &[Permission]) -> Vec<Permission>;
}

/// Checks required nodes against the sets carried by the [`InvocationContext`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GrantedPermissions;

fn missing_from(granted: &BTreeSet<Permission>, required: &[Permission]) -> Vec<Permission> {
    required.iter().filter(|p| !granted.contains(*p)).cloned().collect()
}

impl PermissionModel for GrantedPermissions {
    fn missing_caller(&self, ctx: &InvocationContext, required: &[Permission]) -> Vec<Permission> {
        missing_from(&ctx.author.permissions, required)
    }

    fn missing_agent(&self, ctx: &InvocationContext, required: &[Permission]) -> Vec<Permission> {
        missing_from(&ctx.agent_permissions, required)
    }
}
