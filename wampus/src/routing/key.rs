use crate::{
    core::{
        id::Id,
        types::Integer,
    },
    message::message::{
        Message,
        tag,
    },
};

/// The first level of a [`RouteKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// A message of the given type.
    Message(Integer),
    /// An ERROR reply to a request of the given type.
    Error(Integer),
}

/// A key for matching inbound messages to their waiters.
///
/// A key without an ID matches every message of its kind. A key with an ID only matches messages
/// of its kind carrying that ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub kind: RouteKind,
    pub id: Option<Id>,
}

impl RouteKey {
    /// Matches every message of the type.
    pub fn of_type(message_type: Integer) -> Self {
        Self {
            kind: RouteKind::Message(message_type),
            id: None,
        }
    }

    /// Matches messages of the type correlated to the ID.
    pub fn reply(message_type: Integer, id: Id) -> Self {
        Self {
            kind: RouteKind::Message(message_type),
            id: Some(id),
        }
    }

    /// Matches ERROR replies to the request of the given type and ID.
    pub fn error(request_type: Integer, request: Id) -> Self {
        Self {
            kind: RouteKind::Error(request_type),
            id: Some(request),
        }
    }

    /// Matches every ERROR reply to requests of the given type.
    pub fn errors(request_type: Integer) -> Self {
        Self {
            kind: RouteKind::Error(request_type),
            id: None,
        }
    }

    /// The key an inbound message is dispatched under.
    ///
    /// INVOCATION is keyed by the registration it targets and EVENT by its subscription, rather
    /// than by the first ID on the wire.
    pub fn for_message(message: &Message) -> Self {
        match message {
            Message::Invocation(message) => {
                Self::reply(tag::INVOCATION, message.registered_registration)
            }
            Message::Event(message) => Self::reply(tag::EVENT, message.subscribed_subscription),
            Message::Error(message) => Self::error(message.request_type, message.request),
            message => match message.request_id() {
                Some(id) => Self::reply(message.tag(), id),
                None => Self::of_type(message.tag()),
            },
        }
    }

    /// Checks if a route registered under this key receives messages dispatched under `key`.
    pub fn matches(&self, key: &RouteKey) -> bool {
        self.kind == key.kind && (self.id.is_none() || self.id == key.id)
    }
}
