use std::fmt::Display;

use thiserror::Error;

use crate::{
    core::{
        hash::HashMap,
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::Uri,
    },
    message::message::Message,
};

/// The four kinds of failure a session or ticket can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport failed, the session is closed, or the peer violated the protocol.
    Network,
    /// The router rejected a well-formed request, or the operation is not allowed locally.
    IllegalOperation,
    /// The callee of a procedure call replied with an application error.
    Invocation,
    /// The procedure call was canceled or timed out.
    InvocationCanceled,
}

impl Into<&'static str> for ErrorKind {
    fn into(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::IllegalOperation => "illegal operation",
            Self::Invocation => "invocation",
            Self::InvocationCanceled => "invocation canceled",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Into::<&'static str>::into(*self).fmt(f)
    }
}

/// The operation that was in flight when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Join,
    Call,
    Cancel,
    Register,
    Unregister,
    Subscribe,
    Unsubscribe,
    Publish,
    Yield,
    Close,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Call => "call",
            Self::Cancel => "cancel",
            Self::Register => "register",
            Self::Unregister => "unregister",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Publish => "publish",
            Self::Yield => "yield",
            Self::Close => "close",
        }
    }

    /// Describes the attempted operation on the target, for error messages.
    pub fn attempt(&self, target: &str) -> String {
        match self {
            Self::Join => format!("tried to join realm {target}"),
            Self::Call => format!("tried to call procedure {target}"),
            Self::Cancel => format!("tried to cancel call to procedure {target}"),
            Self::Register => format!("tried to register procedure {target}"),
            Self::Unregister => format!("tried to unregister procedure {target}"),
            Self::Subscribe => format!("tried to subscribe to topic {target}"),
            Self::Unsubscribe => format!("tried to unsubscribe from topic {target}"),
            Self::Publish => format!("tried to publish to topic {target}"),
            Self::Yield => format!("tried to answer invocation of procedure {target}"),
            Self::Close => format!("tried to close session {target}"),
        }
    }
}

/// An error produced by a session or one of its tickets.
///
/// Carries the kind, a human-readable message, the error URI reported by the peer (if any), the
/// protocol message that caused the error (if any), and string context describing what was being
/// attempted.
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct WampusError {
    kind: ErrorKind,
    message: String,
    reason: Option<Uri>,
    source_message: Option<Box<Message>>,
    context: HashMap<String, String>,
}

/// Type alias for results of session and ticket operations.
pub type WampusResult<T> = Result<T, WampusError>;

impl WampusError {
    pub fn new<S>(kind: ErrorKind, message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind,
            message: message.into(),
            reason: None,
            source_message: None,
            context: HashMap::default(),
        }
    }

    pub fn network<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(ErrorKind::Network, message)
    }

    pub fn illegal_operation<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(ErrorKind::IllegalOperation, message)
    }

    pub fn invocation<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(ErrorKind::Invocation, message)
    }

    pub fn invocation_canceled<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(ErrorKind::InvocationCanceled, message)
    }

    /// The error for any operation attempted on a session that is not established.
    pub fn session_closed() -> Self {
        Self::network("session is closed")
    }

    pub fn with_reason(mut self, reason: Uri) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_source_message(mut self, message: Message) -> Self {
        self.source_message = Some(Box::new(message));
        self
    }

    pub fn with_context<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Records the operation and target, without overwriting context set closer to the failure.
    pub fn with_operation(mut self, operation: Operation, target: &str) -> Self {
        self.context
            .entry("operation".to_owned())
            .or_insert_with(|| operation.name().to_owned());
        self.context
            .entry("target".to_owned())
            .or_insert_with(|| target.to_owned());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn reason(&self) -> Option<&Uri> {
        self.reason.as_ref()
    }

    pub fn source_message(&self) -> Option<&Message> {
        self.source_message.as_deref()
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }

    /// Positional arguments of the ERROR or ABORT message that caused the error.
    pub fn arguments(&self) -> Option<&List> {
        match self.source_message.as_deref() {
            Some(Message::Error(message)) => Some(&message.arguments),
            Some(Message::Abort(message)) => Some(&message.arguments),
            _ => None,
        }
    }

    /// Keyword arguments of the ERROR or ABORT message that caused the error.
    pub fn arguments_keyword(&self) -> Option<&Dictionary> {
        match self.source_message.as_deref() {
            Some(Message::Error(message)) => Some(&message.arguments_keyword),
            Some(Message::Abort(message)) => Some(&message.arguments_keyword),
            _ => None,
        }
    }
}

/// Extracts the peer's human-readable explanation from an ERROR or ABORT message.
fn explanation(message: &Message) -> Option<String> {
    let from_details = message
        .details()
        .and_then(|details| details.get("message"))
        .and_then(Value::string);
    let from_arguments = match message {
        Message::Error(message) => message.arguments.first().and_then(Value::string),
        Message::Abort(message) => message.arguments.first().and_then(Value::string),
        _ => None,
    };
    from_details.or(from_arguments).map(|s| s.to_owned())
}

fn append_explanation(description: String, message: &Message) -> String {
    match explanation(message) {
        Some(explanation) => format!("{description}: {explanation}"),
        None => description,
    }
}

/// Translates an ERROR reply to a request into a [`WampusError`].
///
/// Unexpected reply types are protocol violations, reported as network errors.
pub fn error_from_reply(operation: Operation, target: &str, message: &Message) -> WampusError {
    let attempt = operation.attempt(target);
    let reason = match message {
        Message::Error(error) => error.error.clone(),
        _ => {
            return WampusError::network(format!(
                "{attempt}, but the peer replied with an unexpected {} message",
                message.message_name()
            ))
            .with_source_message(message.clone())
            .with_operation(operation, target);
        }
    };

    let (kind, description) = match (operation, reason.as_ref()) {
        (Operation::Call, "wamp.error.canceled") => (
            ErrorKind::InvocationCanceled,
            "the call was canceled".to_owned(),
        ),
        (Operation::Call, "wamp.error.timeout") => (
            ErrorKind::InvocationCanceled,
            "the call timed out".to_owned(),
        ),
        (_, "wamp.error.no_such_procedure") => (
            ErrorKind::IllegalOperation,
            "the procedure does not exist".to_owned(),
        ),
        (_, "wamp.error.procedure_already_exists") => (
            ErrorKind::IllegalOperation,
            "the procedure is already registered".to_owned(),
        ),
        (_, "wamp.error.no_such_registration") => (
            ErrorKind::IllegalOperation,
            "the registration does not exist".to_owned(),
        ),
        (_, "wamp.error.no_such_subscription") => (
            ErrorKind::IllegalOperation,
            "the subscription does not exist".to_owned(),
        ),
        (_, "wamp.error.invalid_uri") => (
            ErrorKind::IllegalOperation,
            "the URI is invalid".to_owned(),
        ),
        (_, "wamp.error.not_authorized") => (
            ErrorKind::IllegalOperation,
            "the session is not authorized".to_owned(),
        ),
        (_, "wamp.error.authorization_failed") => (
            ErrorKind::IllegalOperation,
            "authorization failed".to_owned(),
        ),
        (_, "wamp.error.no_eligible_callee") => (
            ErrorKind::IllegalOperation,
            "no eligible callee exists".to_owned(),
        ),
        (_, "wamp.error.option_not_allowed") => (
            ErrorKind::IllegalOperation,
            "an option is not allowed".to_owned(),
        ),
        (_, uri) if uri.starts_with("wamp.error.option_disallowed.") => (
            ErrorKind::IllegalOperation,
            format!("an option is not allowed ({uri})"),
        ),
        (_, "wamp.error.protocol_violation") => (
            ErrorKind::Network,
            "the peer reported a protocol violation".to_owned(),
        ),
        (Operation::Call, uri) => (
            ErrorKind::Invocation,
            format!("the callee replied with {uri}"),
        ),
        (_, uri) => (
            ErrorKind::IllegalOperation,
            format!("the peer replied with {uri}"),
        ),
    };

    WampusError::new(
        kind,
        append_explanation(format!("{attempt}, but {description}"), message),
    )
    .with_reason(reason)
    .with_source_message(message.clone())
    .with_operation(operation, target)
}

/// Translates an ABORT received while joining a realm into a [`WampusError`].
pub fn error_from_abort(realm: &str, message: &Message) -> WampusError {
    let reason = match message.reason() {
        Some(reason) => reason.clone(),
        None => {
            return WampusError::network(format!(
                "handshake failed: unexpected {} message",
                message.message_name()
            ))
            .with_source_message(message.clone())
            .with_operation(Operation::Join, realm);
        }
    };
    let error = match reason.as_ref() {
        "wamp.error.no_such_realm" => WampusError::illegal_operation("realm does not exist"),
        "wamp.error.protocol_violation" => WampusError::network(append_explanation(
            "protocol violation".to_owned(),
            message,
        )),
        _ => WampusError::illegal_operation(append_explanation(
            format!("unrecognized abort ({reason})"),
            message,
        )),
    };
    error
        .with_reason(reason)
        .with_source_message(message.clone())
        .with_operation(Operation::Join, realm)
}
