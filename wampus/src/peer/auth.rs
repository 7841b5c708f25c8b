use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;

use crate::{
    core::types::{
        Dictionary,
        List,
        Value,
    },
    message::message::{
        AuthenticateMessage,
        ChallengeMessage,
        WelcomeMessage,
    },
};

/// Client side of an authentication method, answering the router's CHALLENGE during the
/// handshake.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// The authentication method name, as advertised in HELLO.
    fn auth_method(&self) -> &str;

    /// The identity to authenticate as.
    fn auth_id(&self) -> Option<&str> {
        None
    }

    /// Adds authentication details to HELLO.
    fn hello(&self, details: &mut Dictionary) {
        details.insert(
            "authmethods".to_owned(),
            Value::List(List::from_iter([Value::String(
                self.auth_method().to_owned(),
            )])),
        );
        if let Some(auth_id) = self.auth_id() {
            details.insert("authid".to_owned(), Value::String(auth_id.to_owned()));
        }
    }

    /// Answers a challenge from the router.
    async fn handle_challenge(&self, challenge: &ChallengeMessage) -> Result<AuthenticateMessage>;

    /// Verifies the router's WELCOME after authentication.
    async fn verify_welcome(&self, welcome: &WelcomeMessage) -> Result<()> {
        let _ = welcome;
        Ok(())
    }
}

/// Ticket-based authentication, which sends a static secret in answer to the challenge.
#[derive(Debug, Clone)]
pub struct TicketAuthenticator {
    id: String,
    ticket: String,
}

impl TicketAuthenticator {
    pub fn new<S, T>(id: S, ticket: T) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            id: id.into(),
            ticket: ticket.into(),
        }
    }
}

#[async_trait]
impl Authenticator for TicketAuthenticator {
    fn auth_method(&self) -> &str {
        "ticket"
    }

    fn auth_id(&self) -> Option<&str> {
        Some(&self.id)
    }

    async fn handle_challenge(&self, challenge: &ChallengeMessage) -> Result<AuthenticateMessage> {
        if challenge.auth_method != self.auth_method() {
            return Err(Error::msg(format!(
                "unsupported authentication method: {}",
                challenge.auth_method
            )));
        }
        Ok(AuthenticateMessage {
            signature: self.ticket.clone(),
            extra: Dictionary::default(),
        })
    }

    async fn verify_welcome(&self, welcome: &WelcomeMessage) -> Result<()> {
        match welcome.details.get("authid").and_then(Value::string) {
            Some(auth_id) if auth_id != self.id => Err(Error::msg(format!(
                "router authenticated the session as {auth_id}, not {}",
                self.id
            ))),
            _ => Ok(()),
        }
    }
}
