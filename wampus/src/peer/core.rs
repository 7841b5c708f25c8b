use std::{
    sync::Arc,
    time::Duration,
};

use futures_util::{
    SinkExt,
    StreamExt,
};
use log::{
    debug,
    error,
    info,
    trace,
    warn,
};
use tokio::{
    sync::{
        broadcast,
        mpsc,
        oneshot,
        watch,
    },
    time::Instant,
};

use crate::{
    core::{
        cancel::CallCancelMode,
        close::CloseReason,
        error::{
            WampusError,
            WampusResult,
        },
        hash::HashMap,
        id::{
            Id,
            IdAllocator,
        },
        stream::{
            MessageStream,
            StreamMessage,
        },
        types::{
            Dictionary,
            Value,
        },
    },
    message::{
        common::{
            abort_message,
            error_uri,
            goodbye_and_out,
            goodbye_with_close_reason,
        },
        message::{
            ErrorMessage,
            EventMessage,
            InvocationMessage,
            Message,
            tag,
        },
    },
    peer::state::SessionState,
    routing::{
        key::RouteKey,
        router::{
            MessageRouter,
            RouteDisposition,
            RouteHandle,
        },
    },
};

/// An inbound message the session could not attribute to any pending operation.
#[derive(Debug, Clone)]
pub struct ProtocolAnomaly {
    pub message: Message,
    pub description: String,
}

/// The reply to a request, with the persistent route installed for it, if any.
#[derive(Debug)]
pub(crate) struct Reply {
    pub message: Message,
    pub route: Option<RouteHandle>,
}

/// An inbound INVOCATION, with the channel its INTERRUPT will arrive on.
#[derive(Debug)]
pub(crate) struct PendingInvocation {
    pub message: InvocationMessage,
    pub cancel_rx: watch::Receiver<Option<CallCancelMode>>,
}

/// Route changes applied when a request's reply arrives, before the next inbound message is
/// read.
pub(crate) enum FollowUp {
    /// Installs a persistent route under the registration or subscription ID of a successful
    /// REGISTERED or SUBSCRIBED reply.
    Install(Box<RouteTarget>),
    /// Removes a persistent route once the peer confirms it is gone.
    Remove(RouteHandle),
}

/// The receiving end of a route.
pub(crate) enum RouteTarget {
    /// Waits for exactly one reply.
    Reply {
        tx: Option<oneshot::Sender<WampusResult<Reply>>>,
        follow_up: Option<FollowUp>,
    },
    /// Receives progressive results until the final RESULT or ERROR.
    Call {
        tx: mpsc::UnboundedSender<WampusResult<Message>>,
    },
    Invocations {
        tx: mpsc::UnboundedSender<PendingInvocation>,
    },
    Events {
        tx: mpsc::UnboundedSender<EventMessage>,
    },
    Interrupt {
        tx: watch::Sender<Option<CallCancelMode>>,
    },
}

enum Deferred {
    Complete {
        tx: Option<oneshot::Sender<WampusResult<Reply>>>,
        message: Message,
        follow_up: Option<FollowUp>,
    },
    TrackInvocation {
        request: Id,
        cancel_tx: watch::Sender<Option<CallCancelMode>>,
    },
    RejectInvocation {
        request: Id,
    },
}

fn is_progress(details: &Dictionary) -> bool {
    details
        .get("progress")
        .and_then(Value::bool)
        .unwrap_or(false)
}

impl RouteTarget {
    fn deliver(&mut self, message: &Message, deferred: &mut Vec<Deferred>) -> RouteDisposition {
        match self {
            Self::Reply { tx, follow_up } => {
                deferred.push(Deferred::Complete {
                    tx: tx.take(),
                    message: message.clone(),
                    follow_up: follow_up.take(),
                });
                RouteDisposition::Remove
            }
            Self::Call { tx } => {
                let last = match message {
                    Message::Result(result) => !is_progress(&result.details),
                    _ => true,
                };
                if tx.send(Ok(message.clone())).is_err() || last {
                    RouteDisposition::Remove
                } else {
                    RouteDisposition::Keep
                }
            }
            Self::Invocations { tx } => {
                if let Message::Invocation(invocation) = message {
                    let (cancel_tx, cancel_rx) = watch::channel(None);
                    let request = invocation.request;
                    match tx.send(PendingInvocation {
                        message: invocation.clone(),
                        cancel_rx,
                    }) {
                        Ok(()) => deferred.push(Deferred::TrackInvocation { request, cancel_tx }),
                        Err(_) => deferred.push(Deferred::RejectInvocation { request }),
                    }
                }
                RouteDisposition::Keep
            }
            Self::Events { tx } => {
                if let Message::Event(event) = message {
                    tx.send(event.clone()).ok();
                }
                RouteDisposition::Keep
            }
            Self::Interrupt { tx } => {
                if let Message::Interrupt(interrupt) = message {
                    let mode = interrupt
                        .options
                        .get("mode")
                        .and_then(Value::string)
                        .and_then(|mode| CallCancelMode::try_from(mode).ok())
                        .unwrap_or(CallCancelMode::Kill);
                    tx.send_replace(Some(mode));
                }
                RouteDisposition::Keep
            }
        }
    }

    fn close(&mut self, error: &WampusError) {
        match self {
            Self::Reply { tx, .. } => {
                if let Some(tx) = tx.take() {
                    tx.send(Err(error.clone())).ok();
                }
            }
            Self::Call { tx } => {
                tx.send(Err(error.clone())).ok();
            }
            // Sequences end when their senders are dropped.
            Self::Invocations { .. } | Self::Events { .. } | Self::Interrupt { .. } => (),
        }
    }
}

/// A command from a session handle or ticket to the session loop.
pub(crate) enum Command {
    Send {
        message: Message,
        reply: Option<oneshot::Sender<WampusResult<()>>>,
    },
    /// Installs a route, then sends the request it waits on.
    Request {
        message: Message,
        keys: Vec<RouteKey>,
        target: RouteTarget,
        reply: Option<oneshot::Sender<WampusResult<RouteHandle>>>,
    },
    RemoveRoute {
        handle: RouteHandle,
    },
    Close {
        reply: Option<oneshot::Sender<WampusResult<()>>>,
    },
}

pub(crate) fn transition_state(
    name: &str,
    state_tx: &watch::Sender<SessionState>,
    next: SessionState,
) {
    let current = *state_tx.borrow();
    if !current.allowed_state_transition(&next) {
        warn!("Session {name} ignored invalid state transition from {current:?} to {next:?}");
        return;
    }
    debug!("Session {name} transitioned from {current:?} to {next:?}");
    state_tx.send_replace(next);
}

/// The ID a persistent route is keyed by, for replies that create one.
fn persistent_route_key(message: &Message) -> Option<RouteKey> {
    match message {
        Message::Registered(registered) => Some(RouteKey::reply(
            tag::INVOCATION,
            registered.registration,
        )),
        Message::Subscribed(subscribed) => {
            Some(RouteKey::reply(tag::EVENT, subscribed.subscription))
        }
        _ => None,
    }
}

/// Whether a reply confirms that a registration or subscription no longer exists on the peer.
fn confirms_removal(message: &Message) -> bool {
    match message {
        Message::Unregistered(_) | Message::Unsubscribed(_) => true,
        Message::Error(error) => matches!(
            error.error.as_ref(),
            "wamp.error.no_such_registration" | "wamp.error.no_such_subscription"
        ),
        _ => false,
    }
}

/// The invocation a callee's outgoing message settles, if any.
fn settled_invocation(message: &Message) -> Option<Id> {
    match message {
        Message::Yield(message) if !is_progress(&message.options) => {
            Some(message.invocation_request)
        }
        Message::Error(message) if message.request_type == tag::INVOCATION => Some(message.request),
        _ => None,
    }
}

fn invocation_error(request: Id) -> Message {
    Message::Error(ErrorMessage {
        request_type: tag::INVOCATION,
        request,
        details: Dictionary::default(),
        error: error_uri::no_such_registration(),
        ..Default::default()
    })
}

/// The single serialized context of a session.
///
/// Owns the stream and the router. Every inbound message is fully dispatched, including the
/// route changes it causes, before the next one is read.
pub(crate) struct SessionCore {
    name: String,
    stream: Box<dyn MessageStream>,
    router: MessageRouter<RouteTarget>,
    interrupts: HashMap<Id, RouteHandle>,
    state_tx: watch::Sender<SessionState>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    commands_closed: bool,
    anomaly_tx: broadcast::Sender<ProtocolAnomaly>,
    close_timeout: Duration,
    closing_deadline: Option<Instant>,
    close_replies: Vec<oneshot::Sender<WampusResult<()>>>,
}

impl SessionCore {
    pub fn new(
        name: String,
        stream: Box<dyn MessageStream>,
        state_tx: watch::Sender<SessionState>,
        command_rx: mpsc::UnboundedReceiver<Command>,
        anomaly_tx: broadcast::Sender<ProtocolAnomaly>,
        close_timeout: Duration,
    ) -> Self {
        Self {
            name,
            stream,
            router: MessageRouter::default(),
            interrupts: HashMap::default(),
            state_tx,
            command_rx,
            commands_closed: false,
            anomaly_tx,
            close_timeout,
            closing_deadline: None,
            close_replies: Vec::new(),
        }
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, next: SessionState) {
        transition_state(&self.name, &self.state_tx, next);
    }

    /// Runs until the session is closed.
    pub async fn run(mut self) {
        while self.state() != SessionState::Closed {
            let closing_deadline = self.closing_deadline;
            tokio::select! {
                next = self.stream.next() => self.handle_stream_event(next).await,
                command = self.command_rx.recv(), if !self.commands_closed => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            // Every handle is gone, so nobody can observe the session anymore.
                            self.commands_closed = true;
                            self.begin_close(None).await;
                        }
                    }
                }
                _ = tokio::time::sleep_until(closing_deadline.unwrap_or_else(Instant::now)), if closing_deadline.is_some() => {
                    warn!("Session {} did not receive GOODBYE in time", self.name);
                    self.finish(WampusError::session_closed()).await;
                }
            }
        }
        debug!("Session {} loop exited", self.name);
    }

    async fn handle_stream_event(&mut self, next: Option<anyhow::Result<StreamMessage>>) {
        match next {
            Some(Ok(StreamMessage::Message(message))) => self.handle_message(message).await,
            Some(Ok(StreamMessage::Ping(data))) => {
                if let Err(err) = self.stream.send(StreamMessage::Ping(data)).await {
                    debug!("Session {} failed to answer ping: {err:#}", self.name);
                }
            }
            Some(Err(err)) => {
                error!("Session {} transport failed: {err:#}", self.name);
                let description = format!("{err:#}");
                self.stream
                    .send(StreamMessage::Message(abort_message(
                        error_uri::protocol_violation(),
                        &description,
                    )))
                    .await
                    .ok();
                self.finish(WampusError::network(format!("transport failed: {description}")))
                    .await;
            }
            None => {
                info!("Session {} transport closed", self.name);
                self.finish(WampusError::network("transport closed")).await;
            }
        }
    }

    async fn handle_message(&mut self, message: Message) {
        trace!(
            "Session {} received {} message",
            self.name,
            message.message_name()
        );
        match (self.state(), message) {
            (SessionState::Established, Message::Goodbye(goodbye)) => {
                info!("Session {} closed by peer ({})", self.name, goodbye.reason);
                let error = WampusError::network(format!("session closed by peer ({})", goodbye.reason))
                    .with_reason(goodbye.reason.clone())
                    .with_source_message(Message::Goodbye(goodbye));
                self.set_state(SessionState::Closing);
                trace!("Session {} sending GOODBYE message", self.name);
                if let Err(err) = self
                    .stream
                    .send(StreamMessage::Message(goodbye_and_out()))
                    .await
                {
                    debug!("Session {} could not answer GOODBYE: {err:#}", self.name);
                }
                self.finish(error).await;
            }
            (SessionState::Closing, Message::Goodbye(_)) => {
                self.finish(WampusError::session_closed()).await;
            }
            (_, Message::Abort(abort)) => {
                warn!("Session {} aborted by peer ({})", self.name, abort.reason);
                let error = WampusError::network(format!("session aborted by peer ({})", abort.reason))
                    .with_reason(abort.reason.clone())
                    .with_source_message(Message::Abort(abort));
                self.finish(error).await;
            }
            (
                _,
                message @ (Message::Hello(_)
                | Message::Welcome(_)
                | Message::Challenge(_)
                | Message::Authenticate(_)),
            ) => {
                self.report_anomaly(message, "session message received after the handshake");
            }
            (_, message) => self.dispatch(message).await,
        }
    }

    async fn dispatch(&mut self, message: Message) {
        let key = RouteKey::for_message(&message);
        let mut deferred = Vec::new();
        let matched = self
            .router
            .dispatch(&key, |_, target| target.deliver(&message, &mut deferred));
        for action in deferred {
            self.apply(action).await;
        }
        if !matched {
            if let Message::Invocation(invocation) = &message {
                // The remote caller would otherwise wait forever.
                self.send_or_fail(invocation_error(invocation.request)).await.ok();
            }
            self.report_anomaly(message, "no pending operation matched the message");
        }
    }

    async fn apply(&mut self, action: Deferred) {
        match action {
            Deferred::Complete {
                tx,
                message,
                follow_up,
            } => {
                let route = match follow_up {
                    Some(FollowUp::Install(target)) => persistent_route_key(&message)
                        .map(|key| self.router.add_route(Vec::from_iter([key]), *target)),
                    Some(FollowUp::Remove(handle)) => {
                        if confirms_removal(&message) {
                            self.router.remove_route(handle);
                        }
                        None
                    }
                    None => None,
                };
                if let Some(tx) = tx {
                    if tx.send(Ok(Reply { message, route })).is_err() {
                        // The requester gave up, so nothing will consume the new route.
                        if let Some(route) = route {
                            self.router.remove_route(route);
                        }
                    }
                }
            }
            Deferred::TrackInvocation { request, cancel_tx } => {
                let handle = self.router.add_route(
                    Vec::from_iter([RouteKey::reply(tag::INTERRUPT, request)]),
                    RouteTarget::Interrupt { tx: cancel_tx },
                );
                if let Some(previous) = self.interrupts.insert(request, handle) {
                    self.router.remove_route(previous);
                }
            }
            Deferred::RejectInvocation { request } => {
                warn!(
                    "Session {} rejected invocation {request} for a dropped registration",
                    self.name
                );
                self.send_or_fail(invocation_error(request)).await.ok();
            }
        }
    }

    fn report_anomaly(&self, message: Message, description: &str) {
        warn!(
            "Session {} received unexpected {} message: {description}",
            self.name,
            message.message_name()
        );
        self.anomaly_tx
            .send(ProtocolAnomaly {
                message,
                description: description.to_owned(),
            })
            .ok();
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { message, reply } => {
                let result = match self.state() {
                    SessionState::Established | SessionState::Closing => {
                        self.send_or_fail(message).await
                    }
                    _ => Err(WampusError::session_closed()),
                };
                if let Some(reply) = reply {
                    reply.send(result).ok();
                }
            }
            Command::Request {
                message,
                keys,
                target,
                reply,
            } => {
                if self.state() != SessionState::Established {
                    if let Some(reply) = reply {
                        reply.send(Err(WampusError::session_closed())).ok();
                    }
                    return;
                }
                let handle = self.router.add_route(keys, target);
                let result = match self.send_or_fail(message).await {
                    Ok(()) => Ok(handle),
                    Err(err) => {
                        self.router.remove_route(handle);
                        Err(err)
                    }
                };
                if let Some(reply) = reply {
                    reply.send(result).ok();
                }
            }
            Command::RemoveRoute { handle } => {
                self.router.remove_route(handle);
            }
            Command::Close { reply } => self.begin_close(reply).await,
        }
    }

    async fn begin_close(&mut self, reply: Option<oneshot::Sender<WampusResult<()>>>) {
        match self.state() {
            SessionState::Established => {
                info!("Session {} is closing", self.name);
                self.close_replies.extend(reply);
                self.set_state(SessionState::Closing);
                self.closing_deadline = Some(Instant::now() + self.close_timeout);
                self.send_or_fail(goodbye_with_close_reason(CloseReason::CloseRealm))
                    .await
                    .ok();
            }
            SessionState::Closing => self.close_replies.extend(reply),
            _ => {
                if let Some(reply) = reply {
                    reply.send(Ok(())).ok();
                }
            }
        }
    }

    /// Sends a message, failing the whole session if the transport cannot take it.
    async fn send_or_fail(&mut self, message: Message) -> WampusResult<()> {
        let message_name = message.message_name();
        if let Some(request) = settled_invocation(&message) {
            if let Some(handle) = self.interrupts.remove(&request) {
                self.router.remove_route(handle);
            }
        }
        trace!("Session {} sending {message_name} message", self.name);
        match self.stream.send(StreamMessage::Message(message)).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(
                    "Session {} failed to send {message_name} message: {err:#}",
                    self.name
                );
                let error =
                    WampusError::network(format!("failed to send {message_name} message: {err:#}"));
                self.finish(error.clone()).await;
                Err(error)
            }
        }
    }

    /// Moves the session to its terminal state, failing every pending route.
    async fn finish(&mut self, error: WampusError) {
        if self.state() == SessionState::Closed {
            return;
        }
        let pending = self.router.len();
        self.router.broadcast_all(|_, target| target.close(&error));
        self.router.clear();
        self.interrupts.clear();
        self.closing_deadline = None;
        self.set_state(SessionState::Closed);
        for reply in self.close_replies.drain(..) {
            reply.send(Ok(())).ok();
        }
        if let Err(err) = self.stream.close().await {
            debug!("Session {} failed to close stream: {err:#}", self.name);
        }
        info!(
            "Session {} closed ({}), failing {pending} pending route(s)",
            self.name,
            error.message()
        );
    }
}

/// A cloneable handle to a running [`SessionCore`], held by the session and its tickets.
#[derive(Clone)]
pub(crate) struct SessionLink {
    name: Arc<str>,
    command_tx: mpsc::UnboundedSender<Command>,
    id_allocator: Arc<dyn IdAllocator>,
    state_rx: watch::Receiver<SessionState>,
}

impl std::fmt::Debug for SessionLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLink")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionLink {
    pub fn new(
        name: &str,
        command_tx: mpsc::UnboundedSender<Command>,
        id_allocator: Arc<dyn IdAllocator>,
        state_rx: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            command_tx,
            id_allocator,
            state_rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn ensure_established(&self) -> WampusResult<()> {
        match self.state() {
            SessionState::Established => Ok(()),
            _ => Err(WampusError::session_closed()),
        }
    }

    pub async fn next_id(&self) -> Id {
        self.id_allocator.generate_id().await
    }

    pub async fn send(&self, message: Message) -> WampusResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send {
                message,
                reply: Some(reply_tx),
            })
            .map_err(|_| WampusError::session_closed())?;
        reply_rx.await.map_err(|_| WampusError::session_closed())?
    }

    pub fn send_detached(&self, message: Message) {
        self.command_tx
            .send(Command::Send {
                message,
                reply: None,
            })
            .ok();
    }

    pub async fn request(
        &self,
        message: Message,
        keys: Vec<RouteKey>,
        target: RouteTarget,
    ) -> WampusResult<RouteHandle> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Request {
                message,
                keys,
                target,
                reply: Some(reply_tx),
            })
            .map_err(|_| WampusError::session_closed())?;
        reply_rx.await.map_err(|_| WampusError::session_closed())?
    }

    /// Sends a request and waits for its single reply.
    pub async fn request_reply(
        &self,
        message: Message,
        keys: Vec<RouteKey>,
        follow_up: Option<FollowUp>,
    ) -> WampusResult<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(
            message,
            keys,
            RouteTarget::Reply {
                tx: Some(reply_tx),
                follow_up,
            },
        )
        .await?;
        reply_rx.await.map_err(|_| WampusError::session_closed())?
    }

    pub fn request_detached(&self, message: Message, keys: Vec<RouteKey>, target: RouteTarget) {
        self.command_tx
            .send(Command::Request {
                message,
                keys,
                target,
                reply: None,
            })
            .ok();
    }

    pub fn remove_route(&self, handle: RouteHandle) {
        self.command_tx.send(Command::RemoveRoute { handle }).ok();
    }

    pub async fn close(&self) -> WampusResult<()> {
        if self.state() == SessionState::Closed {
            return Ok(());
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Close {
                reply: Some(reply_tx),
            })
            .is_err()
        {
            return Ok(());
        }
        reply_rx.await.unwrap_or(Ok(()))
    }

    pub fn close_detached(&self) {
        self.command_tx.send(Command::Close { reply: None }).ok();
    }

    /// Waits for the session to reach its terminal state.
    pub async fn closed(&self) {
        let mut state_rx = self.state_rx.clone();
        state_rx
            .wait_for(|state| *state == SessionState::Closed)
            .await
            .ok();
    }
}
