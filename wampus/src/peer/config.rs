use std::{
    sync::Arc,
    time::Duration,
};

use anyhow::{
    Error,
    Result,
};

use crate::{
    core::{
        hash::HashSet,
        id::{
            IdAllocator,
            SequentialIdAllocator,
        },
        roles::PeerRole,
        types::Dictionary,
        uri::Uri,
    },
    peer::auth::Authenticator,
};

pub(crate) const DEFAULT_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Customizes HELLO details after the defaults are filled in.
pub type HelloDetailsCustomizer = Arc<dyn Fn(&mut Dictionary) + Send + Sync>;

/// Configuration for a [`crate::peer::Session`].
pub struct SessionConfig {
    /// Name of the session, mostly for logging.
    pub name: String,
    /// The realm to join.
    pub realm: Uri,
    /// Agent name, communicated to the router.
    pub agent: String,
    /// Roles implemented by the session.
    pub roles: HashSet<PeerRole>,
    /// How long to wait for the router to accept or reject the session.
    pub handshake_timeout: Duration,
    /// How long to wait for the router to answer GOODBYE.
    pub close_timeout: Duration,
    pub hello_details: Option<HelloDetailsCustomizer>,
    /// Answers authentication challenges during the handshake.
    pub authenticator: Option<Arc<dyn Authenticator>>,
    /// Generates request IDs for the session.
    pub id_allocator: Arc<dyn IdAllocator>,
}

impl SessionConfig {
    /// Creates a configuration for joining the given realm, with defaults for everything else.
    pub fn new(realm: Uri) -> Self {
        Self {
            realm,
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.realm.is_empty() {
            return Err(Error::msg("realm is required"));
        }
        if self.roles.is_empty() {
            return Err(Error::msg("at least one role is required"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::msg("handshake timeout must be positive"));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT.to_owned(),
            realm: Uri::default(),
            agent: DEFAULT_AGENT.to_owned(),
            roles: HashSet::from_iter([
                PeerRole::Callee,
                PeerRole::Caller,
                PeerRole::Publisher,
                PeerRole::Subscriber,
            ]),
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
            hello_details: None,
            authenticator: None,
            id_allocator: Arc::new(SequentialIdAllocator::default()),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("name", &self.name)
            .field("realm", &self.realm)
            .field("agent", &self.agent)
            .field("roles", &self.roles)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("close_timeout", &self.close_timeout)
            .field("hello_details", &self.hello_details.is_some())
            .field(
                "authenticator",
                &self
                    .authenticator
                    .as_ref()
                    .map(|authenticator| authenticator.auth_method().to_owned()),
            )
            .finish_non_exhaustive()
    }
}
