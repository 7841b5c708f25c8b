use log::{
    debug,
    warn,
};
use tokio::{
    runtime::Handle,
    sync::mpsc,
};

use crate::{
    core::{
        error::{
            ErrorKind,
            Operation,
            WampusResult,
            error_from_reply,
        },
        id::Id,
        uri::WildcardUri,
    },
    message::message::{
        Message,
        UnregisterMessage,
        tag,
    },
    peer::{
        core::{
            FollowUp,
            PendingInvocation,
            RouteTarget,
            SessionLink,
        },
        state::SessionState,
    },
    routing::{
        key::RouteKey,
        router::RouteHandle,
    },
    ticket::invocation::InvocationTicket,
};

fn unregister_keys(request: Id) -> Vec<RouteKey> {
    Vec::from_iter([
        RouteKey::reply(tag::UNREGISTERED, request),
        RouteKey::error(tag::UNREGISTER, request),
    ])
}

/// A registered procedure.
///
/// Produces an invocation ticket for each call routed to the registration until it is closed.
/// Dropping an open registration unregisters it in the background.
#[derive(Debug)]
pub struct RegistrationTicket {
    id: Id,
    procedure: WildcardUri,
    route: RouteHandle,
    invocation_rx: mpsc::UnboundedReceiver<PendingInvocation>,
    link: SessionLink,
    closed: bool,
}

impl RegistrationTicket {
    pub(crate) fn new(
        id: Id,
        procedure: WildcardUri,
        route: RouteHandle,
        invocation_rx: mpsc::UnboundedReceiver<PendingInvocation>,
        link: SessionLink,
    ) -> Self {
        Self {
            id,
            procedure,
            route,
            invocation_rx,
            link,
            closed: false,
        }
    }

    /// The registration ID assigned by the router.
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn procedure(&self) -> &WildcardUri {
        &self.procedure
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Waits for the next invocation of the procedure.
    ///
    /// Returns `None` once the registration is gone, either because it was closed or because the
    /// session closed. Invocations that arrived before the router confirmed the unregistration are
    /// still returned.
    pub async fn next_invocation(&mut self) -> Option<InvocationTicket> {
        let pending = self.invocation_rx.recv().await?;
        Some(InvocationTicket::new(
            pending,
            self.procedure.clone(),
            self.link.clone(),
        ))
    }

    /// Unregisters the procedure.
    ///
    /// Succeeds if the registration is already gone, including when the session is closed.
    pub async fn close(&mut self) -> WampusResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.link.state() != SessionState::Established {
            return Ok(());
        }

        let request = self.link.next_id().await;
        let reply = self
            .link
            .request_reply(
                Message::Unregister(UnregisterMessage {
                    request,
                    registered_registration: self.id,
                }),
                unregister_keys(request),
                Some(FollowUp::Remove(self.route)),
            )
            .await;
        // Whatever the router says, nothing may be routed to this registration anymore.
        self.link.remove_route(self.route);

        match reply {
            Ok(reply) => match reply.message {
                Message::Unregistered(_) => {
                    debug!(
                        "Session {} unregistered procedure {}",
                        self.link.name(),
                        self.procedure
                    );
                    Ok(())
                }
                Message::Error(error) if error.error.as_ref() == "wamp.error.no_such_registration" => {
                    warn!(
                        "Session {} unregistered procedure {}, which the router had already removed",
                        self.link.name(),
                        self.procedure
                    );
                    Ok(())
                }
                message => Err(error_from_reply(
                    Operation::Unregister,
                    self.procedure.as_ref(),
                    &message,
                )),
            },
            Err(err)
                if err.kind() == ErrorKind::Network
                    && self.link.state() == SessionState::Closed =>
            {
                Ok(())
            }
            Err(err) => Err(err.with_operation(Operation::Unregister, self.procedure.as_ref())),
        }
    }
}

impl Drop for RegistrationTicket {
    fn drop(&mut self) {
        if self.closed || self.link.state() != SessionState::Established {
            return;
        }
        warn!(
            "Session {} dropped open registration for {}, unregistering",
            self.link.name(),
            self.procedure
        );
        let link = self.link.clone();
        let registration = self.id;
        let route = self.route;
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let request = link.next_id().await;
                    link.request_detached(
                        Message::Unregister(UnregisterMessage {
                            request,
                            registered_registration: registration,
                        }),
                        unregister_keys(request),
                        RouteTarget::Reply {
                            tx: None,
                            follow_up: Some(FollowUp::Remove(route)),
                        },
                    );
                });
            }
            Err(_) => link.remove_route(route),
        }
    }
}
