use log::warn;
use tokio::sync::watch;

use crate::{
    core::{
        cancel::CallCancelMode,
        error::{
            Operation,
            WampusError,
            WampusResult,
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
    message::{
        common::error_uri,
        message::{
            ErrorMessage,
            InvocationMessage,
            Message,
            YieldMessage,
            tag,
        },
    },
    peer::{
        core::{
            PendingInvocation,
            SessionLink,
        },
        state::SessionState,
    },
};

/// A result yielded by a callee.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RpcYield {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// An application-level error returned by a callee instead of a result.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ApplicationError {
    pub reason: Uri,
    pub details: Dictionary,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

impl ApplicationError {
    pub fn new(reason: Uri) -> Self {
        Self {
            reason,
            ..Default::default()
        }
    }

    /// The response for honoring a cancellation.
    pub fn canceled() -> Self {
        Self::new(error_uri::canceled())
    }

    /// Attaches a human-readable explanation.
    pub fn with_message<S>(mut self, message: S) -> Self
    where
        S: Into<String>,
    {
        self.details
            .insert("message".to_owned(), Value::String(message.into()));
        self
    }
}

/// A single invocation of a registered procedure, waiting for the callee's answer.
///
/// Settled by exactly one call to [`Self::return_result`] or [`Self::error`], optionally preceded
/// by progressive results. Dropping a pending invocation answers the caller with a runtime error.
#[derive(Debug)]
pub struct InvocationTicket {
    message: InvocationMessage,
    registered_procedure: WildcardUri,
    cancel_rx: watch::Receiver<Option<CallCancelMode>>,
    link: SessionLink,
    handled: bool,
}

impl InvocationTicket {
    pub(crate) fn new(
        pending: PendingInvocation,
        registered_procedure: WildcardUri,
        link: SessionLink,
    ) -> Self {
        Self {
            message: pending.message,
            registered_procedure,
            cancel_rx: pending.cancel_rx,
            link,
            handled: false,
        }
    }

    /// The request ID of the invocation.
    pub fn id(&self) -> Id {
        self.message.request
    }

    pub fn registration(&self) -> Id {
        self.message.registered_registration
    }

    pub fn arguments(&self) -> &List {
        &self.message.call_arguments
    }

    pub fn arguments_keyword(&self) -> &Dictionary {
        &self.message.call_arguments_keyword
    }

    pub fn details(&self) -> &Dictionary {
        &self.message.details
    }

    /// The procedure that was called.
    ///
    /// Differs from the registered procedure for pattern registrations.
    pub fn procedure(&self) -> Option<Uri> {
        match self.message.details.get("procedure").and_then(Value::string) {
            Some(procedure) => Uri::try_from(procedure).ok(),
            None => Uri::try_from(self.registered_procedure.clone()).ok(),
        }
    }

    /// The caller's session ID, if disclosed.
    pub fn caller(&self) -> Option<Id> {
        self.message
            .details
            .get("caller")
            .and_then(Value::integer)
            .and_then(|caller| Id::try_from(caller).ok())
    }

    /// Returns true if the caller accepts progressive results.
    pub fn receive_progress(&self) -> bool {
        self.message
            .details
            .get("receive_progress")
            .and_then(Value::bool)
            .unwrap_or(false)
    }

    pub fn handled(&self) -> bool {
        self.handled
    }

    /// The cancellation requested by the caller, if any.
    pub fn canceled(&self) -> Option<CallCancelMode> {
        *self.cancel_rx.borrow()
    }

    /// Waits for the caller to cancel the call.
    ///
    /// Returns `None` if the invocation can no longer be canceled, because it was answered or the
    /// session closed.
    pub async fn cancellation(&self) -> Option<CallCancelMode> {
        let mut cancel_rx = self.cancel_rx.clone();
        let mode = match cancel_rx.wait_for(Option::is_some).await {
            Ok(mode) => *mode,
            Err(_) => None,
        };
        mode
    }

    fn operation_target(&self) -> String {
        match self.procedure() {
            Some(procedure) => procedure.into(),
            None => self.registered_procedure.to_string(),
        }
    }

    fn ensure_pending(&self) -> WampusResult<()> {
        if self.handled {
            return Err(WampusError::illegal_operation("result already sent")
                .with_operation(Operation::Yield, &self.operation_target()));
        }
        Ok(())
    }

    async fn send(&self, message: Message) -> WampusResult<()> {
        self.link
            .send(message)
            .await
            .map_err(|err| err.with_operation(Operation::Yield, &self.operation_target()))
    }

    /// Sends the final result to the caller.
    pub async fn return_result(&mut self, result: RpcYield) -> WampusResult<()> {
        self.ensure_pending()?;
        self.handled = true;
        self.send(Message::Yield(YieldMessage {
            invocation_request: self.id(),
            options: Dictionary::default(),
            arguments: result.arguments,
            arguments_keyword: result.arguments_keyword,
        }))
        .await
    }

    /// Sends a progressive result to the caller, keeping the invocation pending.
    pub async fn progress(&mut self, result: RpcYield) -> WampusResult<()> {
        self.ensure_pending()?;
        if !self.receive_progress() {
            return Err(WampusError::illegal_operation(
                "caller did not request progressive results",
            )
            .with_operation(Operation::Yield, &self.operation_target()));
        }
        self.send(Message::Yield(YieldMessage {
            invocation_request: self.id(),
            options: Dictionary::from_iter([("progress".to_owned(), Value::Bool(true))]),
            arguments: result.arguments,
            arguments_keyword: result.arguments_keyword,
        }))
        .await
    }

    /// Answers the caller with an error.
    pub async fn error(&mut self, error: ApplicationError) -> WampusResult<()> {
        self.ensure_pending()?;
        self.handled = true;
        self.send(Message::Error(ErrorMessage {
            request_type: tag::INVOCATION,
            request: self.id(),
            details: error.details,
            error: error.reason,
            arguments: error.arguments,
            arguments_keyword: error.arguments_keyword,
        }))
        .await
    }
}

impl Drop for InvocationTicket {
    fn drop(&mut self) {
        if self.handled || self.link.state() != SessionState::Established {
            return;
        }
        warn!(
            "Session {} dropped invocation {} of {} without a result",
            self.link.name(),
            self.id(),
            self.operation_target()
        );
        self.link.send_detached(Message::Error(ErrorMessage {
            request_type: tag::INVOCATION,
            request: self.id(),
            details: Dictionary::from_iter([(
                "message".to_owned(),
                Value::String("invocation dropped without a result".to_owned()),
            )]),
            error: error_uri::runtime_error(),
            ..Default::default()
        }));
    }
}
