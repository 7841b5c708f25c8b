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
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::{
            Uri,
            WildcardUri,
        },
    },
    message::message::{
        EventMessage,
        Message,
        UnsubscribeMessage,
        tag,
    },
    peer::{
        core::{
            FollowUp,
            RouteTarget,
            SessionLink,
        },
        state::SessionState,
    },
    routing::{
        key::RouteKey,
        router::RouteHandle,
    },
};

/// An event received for a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub publication: Id,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
    pub details: Dictionary,
    /// The concrete topic the event was published to, if known.
    ///
    /// Pattern subscriptions receive it from the router; exact subscriptions use their own topic.
    pub topic: Option<Uri>,
}

fn unsubscribe_keys(request: Id) -> Vec<RouteKey> {
    Vec::from_iter([
        RouteKey::reply(tag::UNSUBSCRIBED, request),
        RouteKey::error(tag::UNSUBSCRIBE, request),
    ])
}

/// A subscription to a topic.
///
/// Produces every event published to the topic until it is closed. Dropping an open subscription
/// unsubscribes in the background.
#[derive(Debug)]
pub struct SubscriptionTicket {
    id: Id,
    topic: WildcardUri,
    route: RouteHandle,
    event_rx: mpsc::UnboundedReceiver<EventMessage>,
    link: SessionLink,
    closed: bool,
}

impl SubscriptionTicket {
    pub(crate) fn new(
        id: Id,
        topic: WildcardUri,
        route: RouteHandle,
        event_rx: mpsc::UnboundedReceiver<EventMessage>,
        link: SessionLink,
    ) -> Self {
        Self {
            id,
            topic,
            route,
            event_rx,
            link,
            closed: false,
        }
    }

    /// The subscription ID assigned by the router.
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn topic(&self) -> &WildcardUri {
        &self.topic
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    fn event_topic(&self, details: &Dictionary) -> Option<Uri> {
        match details.get("topic").and_then(Value::string) {
            Some(topic) => Uri::try_from(topic).ok(),
            None => Uri::try_from(self.topic.clone()).ok(),
        }
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the subscription is gone, either because it was closed or because the
    /// session closed.
    pub async fn next_event(&mut self) -> Option<Event> {
        let message = self.event_rx.recv().await?;
        Some(Event {
            publication: message.published_publication,
            topic: self.event_topic(&message.details),
            arguments: message.publish_arguments,
            arguments_keyword: message.publish_arguments_keyword,
            details: message.details,
        })
    }

    /// Unsubscribes from the topic.
    ///
    /// Succeeds if the subscription is already gone, including when the session is closed.
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
                Message::Unsubscribe(UnsubscribeMessage {
                    request,
                    subscribed_subscription: self.id,
                }),
                unsubscribe_keys(request),
                Some(FollowUp::Remove(self.route)),
            )
            .await;
        self.link.remove_route(self.route);

        match reply {
            Ok(reply) => match reply.message {
                Message::Unsubscribed(_) => {
                    debug!(
                        "Session {} unsubscribed from topic {}",
                        self.link.name(),
                        self.topic
                    );
                    Ok(())
                }
                Message::Error(error) if error.error.as_ref() == "wamp.error.no_such_subscription" => {
                    warn!(
                        "Session {} unsubscribed from topic {}, which the router had already removed",
                        self.link.name(),
                        self.topic
                    );
                    Ok(())
                }
                message => Err(error_from_reply(
                    Operation::Unsubscribe,
                    self.topic.as_ref(),
                    &message,
                )),
            },
            Err(err)
                if err.kind() == ErrorKind::Network
                    && self.link.state() == SessionState::Closed =>
            {
                Ok(())
            }
            Err(err) => Err(err.with_operation(Operation::Unsubscribe, self.topic.as_ref())),
        }
    }
}

impl Drop for SubscriptionTicket {
    fn drop(&mut self) {
        if self.closed || self.link.state() != SessionState::Established {
            return;
        }
        warn!(
            "Session {} dropped open subscription to {}, unsubscribing",
            self.link.name(),
            self.topic
        );
        let link = self.link.clone();
        let subscription = self.id;
        let route = self.route;
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let request = link.next_id().await;
                    link.request_detached(
                        Message::Unsubscribe(UnsubscribeMessage {
                            request,
                            subscribed_subscription: subscription,
                        }),
                        unsubscribe_keys(request),
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
