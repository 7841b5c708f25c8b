use futures_util::{
    Stream,
    StreamExt,
};
use log::debug;
use tokio::sync::mpsc;

use crate::{
    core::{
        cancel::CallCancelMode,
        error::{
            Operation,
            WampusError,
            WampusResult,
            error_from_reply,
        },
        id::Id,
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::Uri,
    },
    message::message::{
        CancelMessage,
        Message,
    },
    peer::core::SessionLink,
    routing::router::RouteHandle,
};

/// A result of a procedure call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RpcResult {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
    pub details: Dictionary,
    /// More results will follow.
    pub progress: bool,
}

/// A pending procedure call.
///
/// Produces zero or more progressive results followed by exactly one final result or error,
/// after which the call is settled.
#[derive(Debug)]
pub struct CallTicket {
    id: Id,
    procedure: Uri,
    route: RouteHandle,
    result_rx: mpsc::UnboundedReceiver<WampusResult<Message>>,
    link: SessionLink,
    settled: bool,
    cancel_sent: bool,
}

impl CallTicket {
    pub(crate) fn new(
        id: Id,
        procedure: Uri,
        route: RouteHandle,
        result_rx: mpsc::UnboundedReceiver<WampusResult<Message>>,
        link: SessionLink,
    ) -> Self {
        Self {
            id,
            procedure,
            route,
            result_rx,
            link,
            settled: false,
            cancel_sent: false,
        }
    }

    /// The request ID of the call.
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn procedure(&self) -> &Uri {
        &self.procedure
    }

    /// Returns true if the call has received its final result or error.
    pub fn settled(&self) -> bool {
        self.settled
    }

    /// Waits for the next result of the call.
    ///
    /// Returns `None` once the call is settled.
    pub async fn next_result(&mut self) -> Option<WampusResult<RpcResult>> {
        if self.settled {
            return None;
        }
        let next = match self.result_rx.recv().await {
            Some(next) => next,
            None => Err(WampusError::session_closed()),
        };
        let result = match next {
            Ok(Message::Result(message)) => {
                let progress = message
                    .details
                    .get("progress")
                    .and_then(Value::bool)
                    .unwrap_or(false);
                Ok(RpcResult {
                    arguments: message.yield_arguments,
                    arguments_keyword: message.yield_arguments_keyword,
                    details: message.details,
                    progress,
                })
            }
            Ok(message) => Err(error_from_reply(
                Operation::Call,
                self.procedure.as_ref(),
                &message,
            )),
            Err(err) => Err(err.with_operation(Operation::Call, self.procedure.as_ref())),
        };
        self.settled = !matches!(&result, Ok(result) if result.progress);
        Some(result)
    }

    /// Waits for the final result of the call, skipping progressive results.
    pub async fn result(mut self) -> WampusResult<RpcResult> {
        loop {
            match self.next_result().await {
                Some(Ok(result)) if result.progress => continue,
                Some(result) => return result,
                None => {
                    return Err(WampusError::illegal_operation("call is already settled")
                        .with_operation(Operation::Call, self.procedure.as_ref()));
                }
            }
        }
    }

    /// Asks the router to cancel the call.
    ///
    /// The outcome is still read from [`Self::next_result`]. Does nothing if the call is settled
    /// or was already canceled.
    pub async fn cancel(&mut self, mode: CallCancelMode) -> WampusResult<()> {
        if self.settled || self.cancel_sent {
            return Ok(());
        }
        self.cancel_sent = true;
        debug!(
            "Session {} canceling call {} to {} ({})",
            self.link.name(),
            self.id,
            self.procedure,
            Into::<&'static str>::into(mode)
        );
        self.link
            .send(Message::Cancel(CancelMessage {
                call_request: self.id,
                options: Dictionary::from_iter([(
                    "mode".to_owned(),
                    Value::String(mode.into()),
                )]),
            }))
            .await
            .map_err(|err| err.with_operation(Operation::Cancel, self.procedure.as_ref()))
    }

    /// Wraps the call as a stream of results, finished after the final result or error.
    pub fn into_stream(self) -> impl Stream<Item = WampusResult<RpcResult>> {
        futures_util::stream::unfold(self, |mut ticket| async move {
            ticket.next_result().await.map(|result| (result, ticket))
        })
        .boxed()
    }
}

impl Drop for CallTicket {
    fn drop(&mut self) {
        if !self.settled {
            self.link.remove_route(self.route);
        }
    }
}
