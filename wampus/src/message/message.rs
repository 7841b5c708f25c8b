use serde::{
    Deserialize,
    Serialize,
    de::Error as _,
};
use thiserror::Error;

use crate::core::{
    id::Id,
    types::{
        Dictionary,
        Integer,
        List,
        Value,
    },
    uri::{
        Uri,
        WildcardUri,
    },
};

/// Message type codes, fixed by the WAMP protocol.
pub mod tag {
    use crate::core::types::Integer;

    pub const HELLO: Integer = 1;
    pub const WELCOME: Integer = 2;
    pub const ABORT: Integer = 3;
    pub const CHALLENGE: Integer = 4;
    pub const AUTHENTICATE: Integer = 5;
    pub const GOODBYE: Integer = 6;
    pub const ERROR: Integer = 8;
    pub const PUBLISH: Integer = 16;
    pub const PUBLISHED: Integer = 17;
    pub const SUBSCRIBE: Integer = 32;
    pub const SUBSCRIBED: Integer = 33;
    pub const UNSUBSCRIBE: Integer = 34;
    pub const UNSUBSCRIBED: Integer = 35;
    pub const EVENT: Integer = 36;
    pub const CALL: Integer = 48;
    pub const CANCEL: Integer = 49;
    pub const RESULT: Integer = 50;
    pub const REGISTER: Integer = 64;
    pub const REGISTERED: Integer = 65;
    pub const UNREGISTER: Integer = 66;
    pub const UNREGISTERED: Integer = 67;
    pub const INVOCATION: Integer = 68;
    pub const INTERRUPT: Integer = 69;
    pub const YIELD: Integer = 70;
}

/// A HELLO message for a peer to initiate a WAMP session in a realm.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HelloMessage {
    pub realm: Uri,
    pub details: Dictionary,
}

/// A WELCOME message for a router to confirm a peer's WAMP session in a realm.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WelcomeMessage {
    pub session: Id,
    pub details: Dictionary,
}

/// An ABORT message for quickly terminating a WAMP session.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AbortMessage {
    pub details: Dictionary,
    pub reason: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A CHALLENGE message for the router to request authentication.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChallengeMessage {
    pub auth_method: String,
    pub extra: Dictionary,
}

/// An AUTHENTICATE message for the peer to answer a CHALLENGE.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AuthenticateMessage {
    pub signature: String,
    pub extra: Dictionary,
}

/// A GOODBYE message for ending a WAMP session with a two-way handshake.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GoodbyeMessage {
    pub details: Dictionary,
    pub reason: Uri,
}

/// An ERROR message for communicating an error in response to a single request.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ErrorMessage {
    pub request_type: Integer,
    pub request: Id,
    pub details: Dictionary,
    pub error: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A PUBLISH message for publishing an event to a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A PUBLISHED message for confirming an event was published.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishedMessage {
    pub publish_request: Id,
    pub publication: Id,
}

/// A SUBSCRIBE message for subscribing to a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SubscribeMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: WildcardUri,
}

/// A SUBSCRIBED message for confirming a peer has subscribed to a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SubscribedMessage {
    pub subscribe_request: Id,
    pub subscription: Id,
}

/// An UNSUBSCRIBE message for unsubscribing from a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnsubscribeMessage {
    pub request: Id,
    pub subscribed_subscription: Id,
}

/// An UNSUBSCRIBED message for confirming a peer has unsubscribed from a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnsubscribedMessage {
    pub unsubscribe_request: Id,
}

/// An EVENT message for relaying a published event to subscribers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventMessage {
    pub subscribed_subscription: Id,
    pub published_publication: Id,
    pub details: Dictionary,
    pub publish_arguments: List,
    pub publish_arguments_keyword: Dictionary,
}

/// A CALL message for invoking a procedure.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CallMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A CANCEL message for canceling an in-flight call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CancelMessage {
    pub call_request: Id,
    pub options: Dictionary,
}

/// A RESULT message for sending the result of a procedure call to the caller.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResultMessage {
    pub call_request: Id,
    pub details: Dictionary,
    pub yield_arguments: List,
    pub yield_arguments_keyword: Dictionary,
}

/// A REGISTER message for registering a procedure in the realm.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RegisterMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: WildcardUri,
}

/// A REGISTERED message for confirming a procedure has been registered.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RegisteredMessage {
    pub register_request: Id,
    pub registration: Id,
}

/// An UNREGISTER message for unregistering a procedure in the realm.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnregisterMessage {
    pub request: Id,
    pub registered_registration: Id,
}

/// An UNREGISTERED message for confirming a procedure has been unregistered.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnregisteredMessage {
    pub unregister_request: Id,
}

/// An INVOCATION message for invoking a procedure on its callee.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InvocationMessage {
    pub request: Id,
    pub registered_registration: Id,
    pub details: Dictionary,
    pub call_arguments: List,
    pub call_arguments_keyword: Dictionary,
}

/// An INTERRUPT message for telling a callee that an invocation was canceled.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InterruptMessage {
    pub invocation_request: Id,
    pub options: Dictionary,
}

/// A YIELD message for yielding the result of an invocation from the callee.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct YieldMessage {
    pub invocation_request: Id,
    pub options: Dictionary,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A message of a type this crate does not model, kept as raw fields.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnknownMessage {
    pub message_type: Integer,
    pub fields: List,
}

/// A WAMP message.
///
/// Serializes to and deserializes from the positional array form `[type, ...fields]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(HelloMessage),
    Welcome(WelcomeMessage),
    Abort(AbortMessage),
    Challenge(ChallengeMessage),
    Authenticate(AuthenticateMessage),
    Goodbye(GoodbyeMessage),
    Error(ErrorMessage),
    Publish(PublishMessage),
    Published(PublishedMessage),
    Subscribe(SubscribeMessage),
    Subscribed(SubscribedMessage),
    Unsubscribe(UnsubscribeMessage),
    Unsubscribed(UnsubscribedMessage),
    Event(EventMessage),
    Call(CallMessage),
    Cancel(CancelMessage),
    Result(ResultMessage),
    Register(RegisterMessage),
    Registered(RegisteredMessage),
    Unregister(UnregisterMessage),
    Unregistered(UnregisteredMessage),
    Invocation(InvocationMessage),
    Interrupt(InterruptMessage),
    Yield(YieldMessage),
    Unknown(UnknownMessage),
}

/// Error for a positional array that does not describe a valid message.
#[derive(Debug, Error)]
pub enum InvalidMessage {
    #[error("message is empty")]
    Empty,
    #[error("message type must be an unsigned integer")]
    InvalidType,
    #[error("{message} message is missing {field}")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },
    #[error("{message} message has an invalid {field}")]
    InvalidField {
        message: &'static str,
        field: &'static str,
    },
}

struct FieldReader {
    message: &'static str,
    fields: std::vec::IntoIter<Value>,
}

impl FieldReader {
    fn new(message: &'static str, fields: std::vec::IntoIter<Value>) -> Self {
        Self { message, fields }
    }

    fn missing(&self, field: &'static str) -> InvalidMessage {
        InvalidMessage::MissingField {
            message: self.message,
            field,
        }
    }

    fn invalid(&self, field: &'static str) -> InvalidMessage {
        InvalidMessage::InvalidField {
            message: self.message,
            field,
        }
    }

    fn next(&mut self, field: &'static str) -> Result<Value, InvalidMessage> {
        self.fields.next().ok_or_else(|| self.missing(field))
    }

    fn integer(&mut self, field: &'static str) -> Result<Integer, InvalidMessage> {
        self.next(field)?
            .integer()
            .ok_or_else(|| self.invalid(field))
    }

    fn id(&mut self, field: &'static str) -> Result<Id, InvalidMessage> {
        let value = self.integer(field)?;
        Id::try_from(value).map_err(|_| self.invalid(field))
    }

    fn string(&mut self, field: &'static str) -> Result<String, InvalidMessage> {
        match self.next(field)? {
            Value::String(value) => Ok(value),
            _ => Err(self.invalid(field)),
        }
    }

    fn uri(&mut self, field: &'static str) -> Result<Uri, InvalidMessage> {
        let value = self.string(field)?;
        Uri::try_from(value).map_err(|_| self.invalid(field))
    }

    fn wildcard_uri(&mut self, field: &'static str) -> Result<WildcardUri, InvalidMessage> {
        let value = self.string(field)?;
        WildcardUri::try_from(value).map_err(|_| self.invalid(field))
    }

    fn dictionary(&mut self, field: &'static str) -> Result<Dictionary, InvalidMessage> {
        match self.next(field)? {
            Value::Dictionary(value) => Ok(value),
            _ => Err(self.invalid(field)),
        }
    }

    fn optional_dictionary(&mut self, field: &'static str) -> Result<Dictionary, InvalidMessage> {
        match self.fields.next() {
            None => Ok(Dictionary::default()),
            Some(Value::Dictionary(value)) => Ok(value),
            Some(_) => Err(self.invalid(field)),
        }
    }

    fn optional_list(&mut self, field: &'static str) -> Result<List, InvalidMessage> {
        match self.fields.next() {
            None => Ok(List::default()),
            Some(Value::List(value)) => Ok(value),
            Some(_) => Err(self.invalid(field)),
        }
    }
}

fn push_arguments(fields: &mut List, arguments: &List, arguments_keyword: &Dictionary) {
    if arguments.is_empty() && arguments_keyword.is_empty() {
        return;
    }
    // Keyword arguments are positional too, so an empty list holds their place.
    fields.push(Value::List(arguments.clone()));
    if !arguments_keyword.is_empty() {
        fields.push(Value::Dictionary(arguments_keyword.clone()));
    }
}

fn id_value(id: Id) -> Value {
    Value::Integer(id.value())
}

fn uri_value<S>(uri: &S) -> Value
where
    S: AsRef<str>,
{
    Value::String(uri.as_ref().to_owned())
}

impl Message {
    /// The message type code.
    pub fn tag(&self) -> Integer {
        match self {
            Self::Hello(_) => tag::HELLO,
            Self::Welcome(_) => tag::WELCOME,
            Self::Abort(_) => tag::ABORT,
            Self::Challenge(_) => tag::CHALLENGE,
            Self::Authenticate(_) => tag::AUTHENTICATE,
            Self::Goodbye(_) => tag::GOODBYE,
            Self::Error(_) => tag::ERROR,
            Self::Publish(_) => tag::PUBLISH,
            Self::Published(_) => tag::PUBLISHED,
            Self::Subscribe(_) => tag::SUBSCRIBE,
            Self::Subscribed(_) => tag::SUBSCRIBED,
            Self::Unsubscribe(_) => tag::UNSUBSCRIBE,
            Self::Unsubscribed(_) => tag::UNSUBSCRIBED,
            Self::Event(_) => tag::EVENT,
            Self::Call(_) => tag::CALL,
            Self::Cancel(_) => tag::CANCEL,
            Self::Result(_) => tag::RESULT,
            Self::Register(_) => tag::REGISTER,
            Self::Registered(_) => tag::REGISTERED,
            Self::Unregister(_) => tag::UNREGISTER,
            Self::Unregistered(_) => tag::UNREGISTERED,
            Self::Invocation(_) => tag::INVOCATION,
            Self::Interrupt(_) => tag::INTERRUPT,
            Self::Yield(_) => tag::YIELD,
            Self::Unknown(message) => message.message_type,
        }
    }

    /// The message name, mostly for logging.
    pub fn message_name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "HELLO",
            Self::Welcome(_) => "WELCOME",
            Self::Abort(_) => "ABORT",
            Self::Challenge(_) => "CHALLENGE",
            Self::Authenticate(_) => "AUTHENTICATE",
            Self::Goodbye(_) => "GOODBYE",
            Self::Error(_) => "ERROR",
            Self::Publish(_) => "PUBLISH",
            Self::Published(_) => "PUBLISHED",
            Self::Subscribe(_) => "SUBSCRIBE",
            Self::Subscribed(_) => "SUBSCRIBED",
            Self::Unsubscribe(_) => "UNSUBSCRIBE",
            Self::Unsubscribed(_) => "UNSUBSCRIBED",
            Self::Event(_) => "EVENT",
            Self::Call(_) => "CALL",
            Self::Cancel(_) => "CANCEL",
            Self::Result(_) => "RESULT",
            Self::Register(_) => "REGISTER",
            Self::Registered(_) => "REGISTERED",
            Self::Unregister(_) => "UNREGISTER",
            Self::Unregistered(_) => "UNREGISTERED",
            Self::Invocation(_) => "INVOCATION",
            Self::Interrupt(_) => "INTERRUPT",
            Self::Yield(_) => "YIELD",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    /// The request ID on the message.
    pub fn request_id(&self) -> Option<Id> {
        match self {
            Self::Error(message) => Some(message.request),
            Self::Publish(message) => Some(message.request),
            Self::Published(message) => Some(message.publish_request),
            Self::Subscribe(message) => Some(message.request),
            Self::Subscribed(message) => Some(message.subscribe_request),
            Self::Unsubscribe(message) => Some(message.request),
            Self::Unsubscribed(message) => Some(message.unsubscribe_request),
            Self::Call(message) => Some(message.request),
            Self::Cancel(message) => Some(message.call_request),
            Self::Result(message) => Some(message.call_request),
            Self::Register(message) => Some(message.request),
            Self::Registered(message) => Some(message.register_request),
            Self::Unregister(message) => Some(message.request),
            Self::Unregistered(message) => Some(message.unregister_request),
            Self::Invocation(message) => Some(message.request),
            Self::Interrupt(message) => Some(message.invocation_request),
            Self::Yield(message) => Some(message.invocation_request),
            _ => None,
        }
    }

    /// The details dictionary on the message.
    pub fn details(&self) -> Option<&Dictionary> {
        match self {
            Self::Hello(message) => Some(&message.details),
            Self::Welcome(message) => Some(&message.details),
            Self::Abort(message) => Some(&message.details),
            Self::Goodbye(message) => Some(&message.details),
            Self::Error(message) => Some(&message.details),
            Self::Event(message) => Some(&message.details),
            Self::Result(message) => Some(&message.details),
            Self::Invocation(message) => Some(&message.details),
            _ => None,
        }
    }

    /// The error reason on the message.
    pub fn reason(&self) -> Option<&Uri> {
        match self {
            Self::Abort(message) => Some(&message.reason),
            Self::Goodbye(message) => Some(&message.reason),
            Self::Error(message) => Some(&message.error),
            _ => None,
        }
    }

    /// Encodes the message into its positional array form.
    pub fn encode(&self) -> List {
        let mut fields = List::from_iter([Value::Integer(self.tag())]);
        match self {
            Self::Hello(message) => {
                fields.push(uri_value(&message.realm));
                fields.push(Value::Dictionary(message.details.clone()));
            }
            Self::Welcome(message) => {
                fields.push(id_value(message.session));
                fields.push(Value::Dictionary(message.details.clone()));
            }
            Self::Abort(message) => {
                fields.push(Value::Dictionary(message.details.clone()));
                fields.push(uri_value(&message.reason));
                push_arguments(&mut fields, &message.arguments, &message.arguments_keyword);
            }
            Self::Challenge(message) => {
                fields.push(Value::String(message.auth_method.clone()));
                fields.push(Value::Dictionary(message.extra.clone()));
            }
            Self::Authenticate(message) => {
                fields.push(Value::String(message.signature.clone()));
                fields.push(Value::Dictionary(message.extra.clone()));
            }
            Self::Goodbye(message) => {
                fields.push(Value::Dictionary(message.details.clone()));
                fields.push(uri_value(&message.reason));
            }
            Self::Error(message) => {
                fields.push(Value::Integer(message.request_type));
                fields.push(id_value(message.request));
                fields.push(Value::Dictionary(message.details.clone()));
                fields.push(uri_value(&message.error));
                push_arguments(&mut fields, &message.arguments, &message.arguments_keyword);
            }
            Self::Publish(message) => {
                fields.push(id_value(message.request));
                fields.push(Value::Dictionary(message.options.clone()));
                fields.push(uri_value(&message.topic));
                push_arguments(&mut fields, &message.arguments, &message.arguments_keyword);
            }
            Self::Published(message) => {
                fields.push(id_value(message.publish_request));
                fields.push(id_value(message.publication));
            }
            Self::Subscribe(message) => {
                fields.push(id_value(message.request));
                fields.push(Value::Dictionary(message.options.clone()));
                fields.push(uri_value(&message.topic));
            }
            Self::Subscribed(message) => {
                fields.push(id_value(message.subscribe_request));
                fields.push(id_value(message.subscription));
            }
            Self::Unsubscribe(message) => {
                fields.push(id_value(message.request));
                fields.push(id_value(message.subscribed_subscription));
            }
            Self::Unsubscribed(message) => {
                fields.push(id_value(message.unsubscribe_request));
            }
            Self::Event(message) => {
                fields.push(id_value(message.subscribed_subscription));
                fields.push(id_value(message.published_publication));
                fields.push(Value::Dictionary(message.details.clone()));
                push_arguments(
                    &mut fields,
                    &message.publish_arguments,
                    &message.publish_arguments_keyword,
                );
            }
            Self::Call(message) => {
                fields.push(id_value(message.request));
                fields.push(Value::Dictionary(message.options.clone()));
                fields.push(uri_value(&message.procedure));
                push_arguments(&mut fields, &message.arguments, &message.arguments_keyword);
            }
            Self::Cancel(message) => {
                fields.push(id_value(message.call_request));
                fields.push(Value::Dictionary(message.options.clone()));
            }
            Self::Result(message) => {
                fields.push(id_value(message.call_request));
                fields.push(Value::Dictionary(message.details.clone()));
                push_arguments(
                    &mut fields,
                    &message.yield_arguments,
                    &message.yield_arguments_keyword,
                );
            }
            Self::Register(message) => {
                fields.push(id_value(message.request));
                fields.push(Value::Dictionary(message.options.clone()));
                fields.push(uri_value(&message.procedure));
            }
            Self::Registered(message) => {
                fields.push(id_value(message.register_request));
                fields.push(id_value(message.registration));
            }
            Self::Unregister(message) => {
                fields.push(id_value(message.request));
                fields.push(id_value(message.registered_registration));
            }
            Self::Unregistered(message) => {
                fields.push(id_value(message.unregister_request));
            }
            Self::Invocation(message) => {
                fields.push(id_value(message.request));
                fields.push(id_value(message.registered_registration));
                fields.push(Value::Dictionary(message.details.clone()));
                push_arguments(
                    &mut fields,
                    &message.call_arguments,
                    &message.call_arguments_keyword,
                );
            }
            Self::Interrupt(message) => {
                fields.push(id_value(message.invocation_request));
                fields.push(Value::Dictionary(message.options.clone()));
            }
            Self::Yield(message) => {
                fields.push(id_value(message.invocation_request));
                fields.push(Value::Dictionary(message.options.clone()));
                push_arguments(&mut fields, &message.arguments, &message.arguments_keyword);
            }
            Self::Unknown(message) => {
                fields.extend(message.fields.iter().cloned());
            }
        }
        fields
    }

    /// Decodes a message from its positional array form.
    ///
    /// Unrecognized message types decode to [`Message::Unknown`]. Trailing fields beyond the ones
    /// defined for a message type are ignored.
    pub fn decode(fields: List) -> Result<Self, InvalidMessage> {
        let mut fields = fields.into_iter();
        let message_type = match fields.next() {
            Some(value) => value.integer().ok_or(InvalidMessage::InvalidType)?,
            None => return Err(InvalidMessage::Empty),
        };
        let message = match message_type {
            tag::HELLO => {
                let mut reader = FieldReader::new("HELLO", fields);
                Self::Hello(HelloMessage {
                    realm: reader.uri("realm")?,
                    details: reader.optional_dictionary("details")?,
                })
            }
            tag::WELCOME => {
                let mut reader = FieldReader::new("WELCOME", fields);
                Self::Welcome(WelcomeMessage {
                    session: reader.id("session")?,
                    details: reader.optional_dictionary("details")?,
                })
            }
            tag::ABORT => {
                let mut reader = FieldReader::new("ABORT", fields);
                Self::Abort(AbortMessage {
                    details: reader.dictionary("details")?,
                    reason: reader.uri("reason")?,
                    arguments: reader.optional_list("arguments")?,
                    arguments_keyword: reader.optional_dictionary("arguments_keyword")?,
                })
            }
            tag::CHALLENGE => {
                let mut reader = FieldReader::new("CHALLENGE", fields);
                Self::Challenge(ChallengeMessage {
                    auth_method: reader.string("auth_method")?,
                    extra: reader.optional_dictionary("extra")?,
                })
            }
            tag::AUTHENTICATE => {
                let mut reader = FieldReader::new("AUTHENTICATE", fields);
                Self::Authenticate(AuthenticateMessage {
                    signature: reader.string("signature")?,
                    extra: reader.optional_dictionary("extra")?,
                })
            }
            tag::GOODBYE => {
                let mut reader = FieldReader::new("GOODBYE", fields);
                Self::Goodbye(GoodbyeMessage {
                    details: reader.dictionary("details")?,
                    reason: reader.uri("reason")?,
                })
            }
            tag::ERROR => {
                let mut reader = FieldReader::new("ERROR", fields);
                Self::Error(ErrorMessage {
                    request_type: reader.integer("request_type")?,
                    request: reader.id("request")?,
                    details: reader.dictionary("details")?,
                    error: reader.uri("error")?,
                    arguments: reader.optional_list("arguments")?,
                    arguments_keyword: reader.optional_dictionary("arguments_keyword")?,
                })
            }
            tag::PUBLISH => {
                let mut reader = FieldReader::new("PUBLISH", fields);
                Self::Publish(PublishMessage {
                    request: reader.id("request")?,
                    options: reader.dictionary("options")?,
                    topic: reader.uri("topic")?,
                    arguments: reader.optional_list("arguments")?,
                    arguments_keyword: reader.optional_dictionary("arguments_keyword")?,
                })
            }
            tag::PUBLISHED => {
                let mut reader = FieldReader::new("PUBLISHED", fields);
                Self::Published(PublishedMessage {
                    publish_request: reader.id("publish_request")?,
                    publication: reader.id("publication")?,
                })
            }
            tag::SUBSCRIBE => {
                let mut reader = FieldReader::new("SUBSCRIBE", fields);
                Self::Subscribe(SubscribeMessage {
                    request: reader.id("request")?,
                    options: reader.dictionary("options")?,
                    topic: reader.wildcard_uri("topic")?,
                })
            }
            tag::SUBSCRIBED => {
                let mut reader = FieldReader::new("SUBSCRIBED", fields);
                Self::Subscribed(SubscribedMessage {
                    subscribe_request: reader.id("subscribe_request")?,
                    subscription: reader.id("subscription")?,
                })
            }
            tag::UNSUBSCRIBE => {
                let mut reader = FieldReader::new("UNSUBSCRIBE", fields);
                Self::Unsubscribe(UnsubscribeMessage {
                    request: reader.id("request")?,
                    subscribed_subscription: reader.id("subscribed_subscription")?,
                })
            }
            tag::UNSUBSCRIBED => {
                let mut reader = FieldReader::new("UNSUBSCRIBED", fields);
                Self::Unsubscribed(UnsubscribedMessage {
                    unsubscribe_request: reader.id("unsubscribe_request")?,
                })
            }
            tag::EVENT => {
                let mut reader = FieldReader::new("EVENT", fields);
                Self::Event(EventMessage {
                    subscribed_subscription: reader.id("subscribed_subscription")?,
                    published_publication: reader.id("published_publication")?,
                    details: reader.dictionary("details")?,
                    publish_arguments: reader.optional_list("publish_arguments")?,
                    publish_arguments_keyword: reader
                        .optional_dictionary("publish_arguments_keyword")?,
                })
            }
            tag::CALL => {
                let mut reader = FieldReader::new("CALL", fields);
                Self::Call(CallMessage {
                    request: reader.id("request")?,
                    options: reader.dictionary("options")?,
                    procedure: reader.uri("procedure")?,
                    arguments: reader.optional_list("arguments")?,
                    arguments_keyword: reader.optional_dictionary("arguments_keyword")?,
                })
            }
            tag::CANCEL => {
                let mut reader = FieldReader::new("CANCEL", fields);
                Self::Cancel(CancelMessage {
                    call_request: reader.id("call_request")?,
                    options: reader.optional_dictionary("options")?,
                })
            }
            tag::RESULT => {
                let mut reader = FieldReader::new("RESULT", fields);
                Self::Result(ResultMessage {
                    call_request: reader.id("call_request")?,
                    details: reader.dictionary("details")?,
                    yield_arguments: reader.optional_list("yield_arguments")?,
                    yield_arguments_keyword: reader
                        .optional_dictionary("yield_arguments_keyword")?,
                })
            }
            tag::REGISTER => {
                let mut reader = FieldReader::new("REGISTER", fields);
                Self::Register(RegisterMessage {
                    request: reader.id("request")?,
                    options: reader.dictionary("options")?,
                    procedure: reader.wildcard_uri("procedure")?,
                })
            }
            tag::REGISTERED => {
                let mut reader = FieldReader::new("REGISTERED", fields);
                Self::Registered(RegisteredMessage {
                    register_request: reader.id("register_request")?,
                    registration: reader.id("registration")?,
                })
            }
            tag::UNREGISTER => {
                let mut reader = FieldReader::new("UNREGISTER", fields);
                Self::Unregister(UnregisterMessage {
                    request: reader.id("request")?,
                    registered_registration: reader.id("registered_registration")?,
                })
            }
            tag::UNREGISTERED => {
                let mut reader = FieldReader::new("UNREGISTERED", fields);
                Self::Unregistered(UnregisteredMessage {
                    unregister_request: reader.id("unregister_request")?,
                })
            }
            tag::INVOCATION => {
                let mut reader = FieldReader::new("INVOCATION", fields);
                Self::Invocation(InvocationMessage {
                    request: reader.id("request")?,
                    registered_registration: reader.id("registered_registration")?,
                    details: reader.dictionary("details")?,
                    call_arguments: reader.optional_list("call_arguments")?,
                    call_arguments_keyword: reader.optional_dictionary("call_arguments_keyword")?,
                })
            }
            tag::INTERRUPT => {
                let mut reader = FieldReader::new("INTERRUPT", fields);
                Self::Interrupt(InterruptMessage {
                    invocation_request: reader.id("invocation_request")?,
                    options: reader.optional_dictionary("options")?,
                })
            }
            tag::YIELD => {
                let mut reader = FieldReader::new("YIELD", fields);
                Self::Yield(YieldMessage {
                    invocation_request: reader.id("invocation_request")?,
                    options: reader.dictionary("options")?,
                    arguments: reader.optional_list("arguments")?,
                    arguments_keyword: reader.optional_dictionary("arguments_keyword")?,
                })
            }
            message_type => Self::Unknown(UnknownMessage {
                message_type,
                fields: fields.collect(),
            }),
        };
        Ok(message)
    }
}

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.encode().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fields = List::deserialize(deserializer)?;
        Message::decode(fields).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod message_test {
    use crate::{
        core::{
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
            AbortMessage,
            AuthenticateMessage,
            CallMessage,
            CancelMessage,
            ChallengeMessage,
            ErrorMessage,
            EventMessage,
            GoodbyeMessage,
            HelloMessage,
            InterruptMessage,
            InvalidMessage,
            InvocationMessage,
            Message,
            PublishMessage,
            PublishedMessage,
            RegisterMessage,
            RegisteredMessage,
            ResultMessage,
            SubscribeMessage,
            SubscribedMessage,
            UnknownMessage,
            UnregisterMessage,
            UnregisteredMessage,
            UnsubscribeMessage,
            UnsubscribedMessage,
            WelcomeMessage,
            YieldMessage,
            tag,
        },
    };

    fn call(arguments: List, arguments_keyword: Dictionary) -> Message {
        Message::Call(CallMessage {
            request: Id::try_from(7814135).unwrap(),
            options: Dictionary::default(),
            procedure: Uri::try_from("com.myapp.add2").unwrap(),
            arguments,
            arguments_keyword,
        })
    }

    #[test]
    fn omits_empty_trailing_arguments() {
        assert_eq!(
            call(List::default(), Dictionary::default()).encode(),
            List::from_iter([
                Value::Integer(tag::CALL),
                Value::Integer(7814135),
                Value::Dictionary(Dictionary::default()),
                Value::String("com.myapp.add2".to_owned()),
            ])
        );
    }

    #[test]
    fn emits_argument_placeholder_for_keyword_arguments() {
        let arguments_keyword = Dictionary::from_iter([("a".to_owned(), Value::Integer(1))]);
        assert_eq!(
            call(List::default(), arguments_keyword.clone()).encode(),
            List::from_iter([
                Value::Integer(tag::CALL),
                Value::Integer(7814135),
                Value::Dictionary(Dictionary::default()),
                Value::String("com.myapp.add2".to_owned()),
                Value::List(List::default()),
                Value::Dictionary(arguments_keyword),
            ])
        );
        assert_matches::assert_matches!(
            serde_json::to_string(&call(
                List::default(),
                Dictionary::from_iter([("a".to_owned(), Value::Integer(1))]),
            )),
            Ok(serialized) => {
                assert_eq!(serialized, r#"[48,7814135,{},"com.myapp.add2",[],{"a":1}]"#);
            }
        );
    }

    #[test]
    fn emits_arguments_without_keyword_arguments() {
        assert_matches::assert_matches!(
            serde_json::to_string(&call(
                List::from_iter([Value::Integer(23), Value::Integer(7)]),
                Dictionary::default(),
            )),
            Ok(serialized) => {
                assert_eq!(serialized, r#"[48,7814135,{},"com.myapp.add2",[23,7]]"#);
            }
        );
    }

    #[test]
    fn decodes_call_fields_in_protocol_order() {
        assert_matches::assert_matches!(serde_json::from_str(r#"
            [48, 7814135, {}, "com.myapp.user.new", ["Johnny"], {
                "firstname": "John",
                "surname": "Doe"
            }]
        "#), Ok(Message::Call(message)) => {
            pretty_assertions::assert_eq!(message, CallMessage {
                request: Id::try_from(7814135).unwrap(),
                options: Dictionary::default(),
                procedure: Uri::try_from("com.myapp.user.new").unwrap(),
                arguments: List::from_iter([
                    Value::String("Johnny".to_owned()),
                ]),
                arguments_keyword: Dictionary::from_iter([
                    ("firstname".to_owned(), Value::String("John".to_owned())),
                    ("surname".to_owned(), Value::String("Doe".to_owned())),
                ]),
            })
        });
    }

    #[test]
    fn decodes_invocation_with_registration_second() {
        assert_matches::assert_matches!(serde_json::from_str(r#"
            [68, 7, 42, {}, [2, 3]]
        "#), Ok(Message::Invocation(message)) => {
            pretty_assertions::assert_eq!(message, InvocationMessage {
                request: Id::try_from(7).unwrap(),
                registered_registration: Id::try_from(42).unwrap(),
                details: Dictionary::default(),
                call_arguments: List::from_iter([Value::Integer(2), Value::Integer(3)]),
                call_arguments_keyword: Dictionary::default(),
            })
        });
    }

    #[test]
    fn decodes_error_reply() {
        assert_matches::assert_matches!(serde_json::from_str(r#"
            [8, 48, 12, {}, "wamp.error.no_such_procedure"]
        "#), Ok(Message::Error(message)) => {
            pretty_assertions::assert_eq!(message, ErrorMessage {
                request_type: tag::CALL,
                request: Id::try_from(12).unwrap(),
                details: Dictionary::default(),
                error: Uri::try_from("wamp.error.no_such_procedure").unwrap(),
                arguments: List::default(),
                arguments_keyword: Dictionary::default(),
            })
        });
    }

    #[test]
    fn decodes_unknown_message_type() {
        assert_matches::assert_matches!(serde_json::from_str(r#"[99, 1, "a"]"#), Ok(Message::Unknown(message)) => {
            pretty_assertions::assert_eq!(message, UnknownMessage {
                message_type: 99,
                fields: List::from_iter([Value::Integer(1), Value::String("a".to_owned())]),
            });
        });
    }

    #[test]
    fn rejects_malformed_messages() {
        assert_matches::assert_matches!(Message::decode(List::default()), Err(InvalidMessage::Empty));
        assert_matches::assert_matches!(
            Message::decode(List::from_iter([Value::String("CALL".to_owned())])),
            Err(InvalidMessage::InvalidType)
        );
        assert_matches::assert_matches!(
            Message::decode(List::from_iter([Value::Integer(tag::WELCOME)])),
            Err(InvalidMessage::MissingField { message: "WELCOME", field: "session" })
        );
        assert_matches::assert_matches!(
            Message::decode(List::from_iter([Value::Integer(tag::WELCOME), Value::Integer(0)])),
            Err(InvalidMessage::InvalidField { message: "WELCOME", field: "session" })
        );
        assert_matches::assert_matches!(serde_json::from_str::<Message>(r#"[50, 1, {}, "oops"]"#), Err(err) => {
            assert!(err.to_string().contains("RESULT message has an invalid yield_arguments"));
        });
    }

    fn id(value: u64) -> Id {
        Id::try_from(value).unwrap()
    }

    fn uri(value: &str) -> Uri {
        Uri::try_from(value).unwrap()
    }

    fn details(key: &str, value: Value) -> Dictionary {
        Dictionary::from_iter([(key.to_owned(), value)])
    }

    /// Every combination of positional and keyword arguments, including the keyword-only case that
    /// needs an empty list in front.
    fn argument_combinations() -> Vec<(List, Dictionary)> {
        let arguments = List::from_iter([
            Value::Integer(1),
            Value::SignedInteger(-1),
            Value::String("two".to_owned()),
        ]);
        let arguments_keyword = Dictionary::from_iter([
            ("total".to_owned(), Value::Float(1.5)),
            ("ok".to_owned(), Value::Bool(true)),
        ]);
        Vec::from_iter([
            (List::default(), Dictionary::default()),
            (arguments.clone(), Dictionary::default()),
            (List::default(), arguments_keyword.clone()),
            (arguments, arguments_keyword),
        ])
    }

    fn messages_without_arguments() -> Vec<Message> {
        Vec::from_iter([
            Message::Hello(HelloMessage {
                realm: uri("com.myapp"),
                details: details(
                    "roles",
                    Value::Dictionary(details("caller", Value::Dictionary(Dictionary::default()))),
                ),
            }),
            Message::Welcome(WelcomeMessage {
                session: id(9007199254740992),
                details: details("authid", Value::String("user".to_owned())),
            }),
            Message::Challenge(ChallengeMessage {
                auth_method: "ticket".to_owned(),
                extra: Dictionary::default(),
            }),
            Message::Authenticate(AuthenticateMessage {
                signature: "secret".to_owned(),
                extra: Dictionary::default(),
            }),
            Message::Goodbye(GoodbyeMessage {
                details: Dictionary::default(),
                reason: uri("wamp.close.close_realm"),
            }),
            Message::Published(PublishedMessage {
                publish_request: id(2),
                publication: id(3),
            }),
            Message::Subscribe(SubscribeMessage {
                request: id(4),
                options: details("match", Value::String("wildcard".to_owned())),
                topic: WildcardUri::try_from("com.myapp..update").unwrap(),
            }),
            Message::Subscribed(SubscribedMessage {
                subscribe_request: id(4),
                subscription: id(5),
            }),
            Message::Unsubscribe(UnsubscribeMessage {
                request: id(6),
                subscribed_subscription: id(5),
            }),
            Message::Unsubscribed(UnsubscribedMessage {
                unsubscribe_request: id(6),
            }),
            Message::Cancel(CancelMessage {
                call_request: id(7),
                options: details("mode", Value::String("kill".to_owned())),
            }),
            Message::Register(RegisterMessage {
                request: id(8),
                options: details("invoke", Value::String("roundrobin".to_owned())),
                procedure: WildcardUri::try_from("com.myapp.add").unwrap(),
            }),
            Message::Registered(RegisteredMessage {
                register_request: id(8),
                registration: id(9),
            }),
            Message::Unregister(UnregisterMessage {
                request: id(10),
                registered_registration: id(9),
            }),
            Message::Unregistered(UnregisteredMessage {
                unregister_request: id(10),
            }),
            Message::Interrupt(InterruptMessage {
                invocation_request: id(11),
                options: details("mode", Value::String("killnowait".to_owned())),
            }),
            Message::Unknown(UnknownMessage {
                message_type: 99,
                fields: List::from_iter([Value::Integer(1), Value::String("a".to_owned())]),
            }),
        ])
    }

    fn messages_with_arguments(arguments: List, arguments_keyword: Dictionary) -> Vec<Message> {
        Vec::from_iter([
            Message::Abort(AbortMessage {
                details: details("message", Value::String("bye".to_owned())),
                reason: uri("wamp.error.no_such_realm"),
                arguments: arguments.clone(),
                arguments_keyword: arguments_keyword.clone(),
            }),
            Message::Error(ErrorMessage {
                request_type: tag::CALL,
                request: id(12),
                details: Dictionary::default(),
                error: uri("com.myapp.error.overflow"),
                arguments: arguments.clone(),
                arguments_keyword: arguments_keyword.clone(),
            }),
            Message::Publish(PublishMessage {
                request: id(13),
                options: details("acknowledge", Value::Bool(true)),
                topic: uri("com.myapp.topic"),
                arguments: arguments.clone(),
                arguments_keyword: arguments_keyword.clone(),
            }),
            Message::Event(EventMessage {
                subscribed_subscription: id(5),
                published_publication: id(14),
                details: details("topic", Value::String("com.myapp.topic".to_owned())),
                publish_arguments: arguments.clone(),
                publish_arguments_keyword: arguments_keyword.clone(),
            }),
            call(arguments.clone(), arguments_keyword.clone()),
            Message::Result(ResultMessage {
                call_request: id(15),
                details: details("progress", Value::Bool(true)),
                yield_arguments: arguments.clone(),
                yield_arguments_keyword: arguments_keyword.clone(),
            }),
            Message::Invocation(InvocationMessage {
                request: id(16),
                registered_registration: id(9),
                details: details("caller", Value::Integer(77)),
                call_arguments: arguments.clone(),
                call_arguments_keyword: arguments_keyword.clone(),
            }),
            Message::Yield(YieldMessage {
                invocation_request: id(16),
                options: Dictionary::default(),
                arguments,
                arguments_keyword,
            }),
        ])
    }

    #[test]
    fn decodes_what_it_encodes() {
        let mut messages = messages_without_arguments();
        for (arguments, arguments_keyword) in argument_combinations() {
            messages.extend(messages_with_arguments(arguments, arguments_keyword));
        }
        for message in messages {
            assert_matches::assert_matches!(Message::decode(message.encode()), Ok(decoded) => {
                pretty_assertions::assert_eq!(decoded, message);
            });
            let serialized = serde_json::to_string(&message).unwrap();
            assert_matches::assert_matches!(serde_json::from_str::<Message>(&serialized), Ok(decoded) => {
                pretty_assertions::assert_eq!(decoded, message);
            });
            let serialized = rmp_serde::to_vec(&message).unwrap();
            assert_matches::assert_matches!(rmp_serde::from_slice::<Message>(&serialized), Ok(decoded) => {
                pretty_assertions::assert_eq!(decoded, message);
            });
        }
    }
}
