use std::time::Duration;

use futures_util::SinkExt;
use log::{
    debug,
    info,
    warn,
};
use tokio::sync::{
    broadcast,
    mpsc,
    watch,
};

use crate::{
    core::{
        error::{
            Operation,
            WampusError,
            WampusResult,
            error_from_reply,
        },
        id::Id,
        invocation_policy::InvocationPolicy,
        match_style::MatchStyle,
        stream::MessageStream,
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
        CallMessage,
        Message,
        PublishMessage,
        RegisterMessage,
        SubscribeMessage,
        tag,
    },
    peer::{
        config::SessionConfig,
        connector::Connector,
        core::{
            FollowUp,
            ProtocolAnomaly,
            RouteTarget,
            SessionCore,
            SessionLink,
            transition_state,
        },
        handshake::handshake,
        state::SessionState,
    },
    routing::key::RouteKey,
    ticket::{
        CallTicket,
        RegistrationTicket,
        RpcResult,
        SubscriptionTicket,
    },
};

/// A procedure call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RpcCall {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
    /// Asks the router to cancel the call after the given duration.
    pub timeout: Option<Duration>,
}

/// Options for registering a procedure.
#[derive(Debug, Default, Clone)]
pub struct ProcedureOptions {
    /// How the procedure should be matched for procedure calls.
    pub match_style: Option<MatchStyle>,
    /// How a callee should be selected for invocations.
    pub invocation_policy: Option<InvocationPolicy>,
    /// The caller's identity should be disclosed.
    pub disclose_caller: bool,
}

/// Options for subscribing to a topic.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionOptions {
    /// How the subscription should be matched for published events.
    pub match_style: Option<MatchStyle>,
}

/// Options for publishing an event.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishOptions {
    /// Wait for the router to acknowledge the publication.
    pub acknowledge: bool,
    /// Should the publisher be excluded from receiving the event?
    pub exclude_me: Option<bool>,
    /// Blocked session IDs.
    pub exclude: Vec<Id>,
    /// Allowed session IDs.
    pub eligible: Vec<Id>,
}

/// An event to publish to a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishedEvent {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
    pub options: PublishOptions,
}

fn id_list(ids: &[Id]) -> Value {
    Value::List(ids.iter().map(|id| Value::Integer(id.value())).collect())
}

impl PublishOptions {
    fn to_dictionary(&self) -> Dictionary {
        let mut options = Dictionary::default();
        if self.acknowledge {
            options.insert("acknowledge".to_owned(), Value::Bool(true));
        }
        if let Some(exclude_me) = self.exclude_me {
            options.insert("exclude_me".to_owned(), Value::Bool(exclude_me));
        }
        if !self.exclude.is_empty() {
            options.insert("exclude".to_owned(), id_list(&self.exclude));
        }
        if !self.eligible.is_empty() {
            options.insert("eligible".to_owned(), id_list(&self.eligible));
        }
        options
    }
}

impl ProcedureOptions {
    fn to_dictionary(&self) -> Dictionary {
        let mut options = Dictionary::default();
        if let Some(match_style) = self.match_style {
            options.insert("match".to_owned(), Value::String(match_style.into()));
        }
        if let Some(invocation_policy) = self.invocation_policy {
            options.insert("invoke".to_owned(), Value::String(invocation_policy.into()));
        }
        if self.disclose_caller {
            options.insert("disclose_caller".to_owned(), Value::Bool(true));
        }
        options
    }
}

impl SubscriptionOptions {
    fn to_dictionary(&self) -> Dictionary {
        let mut options = Dictionary::default();
        if let Some(match_style) = self.match_style {
            options.insert("match".to_owned(), Value::String(match_style.into()));
        }
        options
    }
}

fn invalid_config(config: &SessionConfig, err: anyhow::Error) -> WampusError {
    WampusError::illegal_operation(format!("invalid session configuration: {err:#}"))
        .with_operation(Operation::Join, config.realm.as_ref())
}

/// A WAMP session joined to a realm.
///
/// The session runs in a background task for as long as it is established. Every operation
/// fails immediately with a network error once the session leaves the established state.
/// Dropping the session closes it.
#[derive(Debug)]
pub struct Session {
    id: Id,
    realm: Uri,
    welcome_details: Dictionary,
    link: SessionLink,
    anomaly_tx: broadcast::Sender<ProtocolAnomaly>,
}

impl Session {
    /// Connects to a router and joins the configured realm.
    pub async fn connect(config: SessionConfig, connector: &dyn Connector) -> WampusResult<Self> {
        config
            .validate()
            .map_err(|err| invalid_config(&config, err))?;
        info!("Session {} connecting", config.name);
        let stream = connector.connect().await.map_err(|err| {
            WampusError::network(format!("failed to connect: {err:#}"))
                .with_operation(Operation::Join, config.realm.as_ref())
        })?;
        Self::establish(config, stream).await
    }

    /// Joins the configured realm over an already-connected stream.
    pub async fn establish(
        config: SessionConfig,
        mut stream: Box<dyn MessageStream>,
    ) -> WampusResult<Self> {
        config
            .validate()
            .map_err(|err| invalid_config(&config, err))?;

        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        transition_state(&config.name, &state_tx, SessionState::Handshaking);
        let welcome = match handshake(&config, &mut stream).await {
            Ok(welcome) => welcome,
            Err(err) => {
                warn!("Session {} failed to join realm {}: {err}", config.name, config.realm);
                transition_state(&config.name, &state_tx, SessionState::Closed);
                if let Err(err) = stream.close().await {
                    debug!("Session {} failed to close stream: {err:#}", config.name);
                }
                return Err(err);
            }
        };
        transition_state(&config.name, &state_tx, SessionState::Established);
        info!(
            "Session {} joined realm {} with session ID {}",
            config.name, config.realm, welcome.session
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (anomaly_tx, _) = broadcast::channel(64);
        let core = SessionCore::new(
            config.name.clone(),
            stream,
            state_tx,
            command_rx,
            anomaly_tx.clone(),
            config.close_timeout,
        );
        tokio::spawn(core.run());

        Ok(Self {
            id: welcome.session,
            realm: config.realm,
            welcome_details: welcome.details,
            link: SessionLink::new(&config.name, command_tx, config.id_allocator, state_rx),
            anomaly_tx,
        })
    }

    /// The session ID assigned by the router.
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn realm(&self) -> &Uri {
        &self.realm
    }

    /// Details of the router's WELCOME, such as the router's roles.
    pub fn welcome_details(&self) -> &Dictionary {
        &self.welcome_details
    }

    pub fn state(&self) -> SessionState {
        self.link.state()
    }

    /// Waits for the session to close, for whatever reason.
    pub async fn closed(&self) {
        self.link.closed().await
    }

    /// Receives protocol anomalies: inbound messages that no operation was waiting for.
    pub fn anomaly_rx(&self) -> broadcast::Receiver<ProtocolAnomaly> {
        self.anomaly_tx.subscribe()
    }

    /// Leaves the realm, failing all pending operations.
    ///
    /// Waits for the router's GOODBYE up to the configured close timeout. Closing an already
    /// closed session succeeds.
    pub async fn close(&self) -> WampusResult<()> {
        self.link
            .close()
            .await
            .map_err(|err| err.with_operation(Operation::Close, self.link.name()))
    }

    async fn initiate_call(
        &self,
        procedure: Uri,
        rpc_call: RpcCall,
        receive_progress: bool,
    ) -> WampusResult<CallTicket> {
        self.link
            .ensure_established()
            .map_err(|err| err.with_operation(Operation::Call, procedure.as_ref()))?;
        let request = self.link.next_id().await;
        let mut options = Dictionary::default();
        if receive_progress {
            options.insert("receive_progress".to_owned(), Value::Bool(true));
        }
        if let Some(timeout) = rpc_call.timeout {
            let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            options.insert("timeout".to_owned(), Value::Integer(millis));
        }

        debug!(
            "Session {} calling procedure {procedure} with request {request}",
            self.link.name()
        );
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let route = self
            .link
            .request(
                Message::Call(CallMessage {
                    request,
                    options,
                    procedure: procedure.clone(),
                    arguments: rpc_call.arguments,
                    arguments_keyword: rpc_call.arguments_keyword,
                }),
                Vec::from_iter([
                    RouteKey::reply(tag::RESULT, request),
                    RouteKey::error(tag::CALL, request),
                ]),
                RouteTarget::Call { tx: result_tx },
            )
            .await
            .map_err(|err| err.with_operation(Operation::Call, procedure.as_ref()))?;
        Ok(CallTicket::new(
            request,
            procedure,
            route,
            result_rx,
            self.link.clone(),
        ))
    }

    /// Calls a procedure, expecting one result.
    pub async fn call(&self, procedure: Uri, rpc_call: RpcCall) -> WampusResult<CallTicket> {
        self.initiate_call(procedure, rpc_call, false).await
    }

    /// Calls a procedure, expecting one or more progressive results.
    pub async fn call_with_progress(
        &self,
        procedure: Uri,
        rpc_call: RpcCall,
    ) -> WampusResult<CallTicket> {
        self.initiate_call(procedure, rpc_call, true).await
    }

    /// Calls a procedure and waits for its result.
    pub async fn call_and_wait(&self, procedure: Uri, rpc_call: RpcCall) -> WampusResult<RpcResult> {
        self.call(procedure, rpc_call).await?.result().await
    }

    /// Registers a procedure.
    pub async fn register(&self, procedure: Uri) -> WampusResult<RegistrationTicket> {
        self.register_with_options(procedure.into(), ProcedureOptions::default())
            .await
    }

    /// Registers a procedure, possibly matching by pattern.
    pub async fn register_with_options(
        &self,
        procedure: WildcardUri,
        options: ProcedureOptions,
    ) -> WampusResult<RegistrationTicket> {
        self.link
            .ensure_established()
            .map_err(|err| err.with_operation(Operation::Register, procedure.as_ref()))?;
        let request = self.link.next_id().await;
        let (invocation_tx, invocation_rx) = mpsc::unbounded_channel();
        let reply = self
            .link
            .request_reply(
                Message::Register(RegisterMessage {
                    request,
                    options: options.to_dictionary(),
                    procedure: procedure.clone(),
                }),
                Vec::from_iter([
                    RouteKey::reply(tag::REGISTERED, request),
                    RouteKey::error(tag::REGISTER, request),
                ]),
                Some(FollowUp::Install(Box::new(RouteTarget::Invocations {
                    tx: invocation_tx,
                }))),
            )
            .await
            .map_err(|err| err.with_operation(Operation::Register, procedure.as_ref()))?;
        match (reply.message, reply.route) {
            (Message::Registered(registered), Some(route)) => {
                info!(
                    "Session {} registered procedure {procedure} with registration {}",
                    self.link.name(),
                    registered.registration
                );
                Ok(RegistrationTicket::new(
                    registered.registration,
                    procedure,
                    route,
                    invocation_rx,
                    self.link.clone(),
                ))
            }
            (message, _) => Err(error_from_reply(
                Operation::Register,
                procedure.as_ref(),
                &message,
            )),
        }
    }

    /// Subscribes to a topic.
    pub async fn subscribe(&self, topic: Uri) -> WampusResult<SubscriptionTicket> {
        self.subscribe_with_options(topic.into(), SubscriptionOptions::default())
            .await
    }

    /// Subscribes to a topic, possibly matching by pattern.
    pub async fn subscribe_with_options(
        &self,
        topic: WildcardUri,
        options: SubscriptionOptions,
    ) -> WampusResult<SubscriptionTicket> {
        self.link
            .ensure_established()
            .map_err(|err| err.with_operation(Operation::Subscribe, topic.as_ref()))?;
        let request = self.link.next_id().await;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let reply = self
            .link
            .request_reply(
                Message::Subscribe(SubscribeMessage {
                    request,
                    options: options.to_dictionary(),
                    topic: topic.clone(),
                }),
                Vec::from_iter([
                    RouteKey::reply(tag::SUBSCRIBED, request),
                    RouteKey::error(tag::SUBSCRIBE, request),
                ]),
                Some(FollowUp::Install(Box::new(RouteTarget::Events {
                    tx: event_tx,
                }))),
            )
            .await
            .map_err(|err| err.with_operation(Operation::Subscribe, topic.as_ref()))?;
        match (reply.message, reply.route) {
            (Message::Subscribed(subscribed), Some(route)) => {
                info!(
                    "Session {} subscribed to topic {topic} with subscription {}",
                    self.link.name(),
                    subscribed.subscription
                );
                Ok(SubscriptionTicket::new(
                    subscribed.subscription,
                    topic,
                    route,
                    event_rx,
                    self.link.clone(),
                ))
            }
            (message, _) => Err(error_from_reply(
                Operation::Subscribe,
                topic.as_ref(),
                &message,
            )),
        }
    }

    /// Publishes an event to a topic.
    ///
    /// Returns the publication ID if the publication was acknowledged.
    pub async fn publish(&self, topic: Uri, event: PublishedEvent) -> WampusResult<Option<Id>> {
        self.link
            .ensure_established()
            .map_err(|err| err.with_operation(Operation::Publish, topic.as_ref()))?;
        let request = self.link.next_id().await;
        let message = Message::Publish(PublishMessage {
            request,
            options: event.options.to_dictionary(),
            topic: topic.clone(),
            arguments: event.arguments,
            arguments_keyword: event.arguments_keyword,
        });

        if !event.options.acknowledge {
            self.link
                .send(message)
                .await
                .map_err(|err| err.with_operation(Operation::Publish, topic.as_ref()))?;
            return Ok(None);
        }

        let reply = self
            .link
            .request_reply(
                message,
                Vec::from_iter([
                    RouteKey::reply(tag::PUBLISHED, request),
                    RouteKey::error(tag::PUBLISH, request),
                ]),
                None,
            )
            .await
            .map_err(|err| err.with_operation(Operation::Publish, topic.as_ref()))?;
        match reply.message {
            Message::Published(published) => Ok(Some(published.publication)),
            message => Err(error_from_reply(
                Operation::Publish,
                topic.as_ref(),
                &message,
            )),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.link.close_detached();
    }
}
