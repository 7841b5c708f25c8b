use crate::{
    core::{
        close::CloseReason,
        types::{
            Dictionary,
            Value,
        },
        uri::Uri,
    },
    message::message::{
        AbortMessage,
        GoodbyeMessage,
        Message,
    },
};

/// Builds an ABORT message with a human-readable explanation.
pub fn abort_message(reason: Uri, message: &str) -> Message {
    Message::Abort(AbortMessage {
        details: Dictionary::from_iter([("message".to_owned(), Value::String(message.to_owned()))]),
        reason,
        ..Default::default()
    })
}

pub fn goodbye_with_close_reason(close_reason: CloseReason) -> Message {
    Message::Goodbye(GoodbyeMessage {
        details: Dictionary::default(),
        reason: close_reason.uri(),
    })
}

pub fn goodbye_and_out() -> Message {
    goodbye_with_close_reason(CloseReason::GoodbyeAndOut)
}

/// Well-known error URIs.
pub mod error_uri {
    use crate::core::uri::Uri;

    pub fn protocol_violation() -> Uri {
        Uri::from_known("wamp.error.protocol_violation")
    }

    pub fn authentication_failed() -> Uri {
        Uri::from_known("wamp.error.authentication_failed")
    }

    pub fn no_such_registration() -> Uri {
        Uri::from_known("wamp.error.no_such_registration")
    }

    pub fn runtime_error() -> Uri {
        Uri::from_known("wamp.error.runtime_error")
    }

    pub fn canceled() -> Uri {
        Uri::from_known("wamp.error.canceled")
    }
}
