use futures_util::{
    SinkExt,
    StreamExt,
};
use log::{
    debug,
    trace,
    warn,
};
use tokio::time::Instant;

use crate::{
    core::{
        error::{
            Operation,
            WampusError,
            WampusResult,
            error_from_abort,
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
        },
        message::{
            HelloMessage,
            Message,
            WelcomeMessage,
        },
    },
    peer::config::SessionConfig,
};

fn role_details(config: &SessionConfig) -> Dictionary {
    config
        .roles
        .iter()
        .map(|role| {
            let features = role
                .features()
                .iter()
                .map(|feature| ((*feature).to_owned(), Value::Bool(true)));
            let details = Dictionary::from_iter([(
                "features".to_owned(),
                Value::Dictionary(Dictionary::from_iter(features)),
            )]);
            (Into::<String>::into(*role), Value::Dictionary(details))
        })
        .collect()
}

fn hello_details(config: &SessionConfig) -> Dictionary {
    let mut details = Dictionary::from_iter([
        ("roles".to_owned(), Value::Dictionary(role_details(config))),
        ("agent".to_owned(), Value::String(config.agent.clone())),
    ]);
    if let Some(authenticator) = &config.authenticator {
        authenticator.hello(&mut details);
    }
    if let Some(customize) = &config.hello_details {
        customize(&mut details);
    }
    details
}

fn handshake_failed(config: &SessionConfig, reason: &str) -> WampusError {
    WampusError::network(format!("handshake failed: {reason}"))
        .with_operation(Operation::Join, config.realm.as_ref())
}

async fn send(
    config: &SessionConfig,
    stream: &mut Box<dyn MessageStream>,
    message: Message,
) -> WampusResult<()> {
    trace!("Session {} sending {} message", config.name, message.message_name());
    let name = message.message_name();
    stream
        .send(StreamMessage::Message(message))
        .await
        .map_err(|err| handshake_failed(config, &format!("failed to send {name}: {err:#}")))
}

/// Best effort: the transport may already be unusable.
async fn abort(config: &SessionConfig, stream: &mut Box<dyn MessageStream>, message: Message) {
    if let Err(err) = send(config, stream, message).await {
        debug!("Session {} could not send ABORT: {err}", config.name);
    }
}

/// Joins the configured realm over the stream, returning the router's WELCOME.
///
/// Fails if the router aborts, challenges without an authenticator being configured, replies with
/// anything unexpected, closes the transport, or does not answer within the handshake timeout.
pub(crate) async fn handshake(
    config: &SessionConfig,
    stream: &mut Box<dyn MessageStream>,
) -> WampusResult<WelcomeMessage> {
    let deadline = Instant::now() + config.handshake_timeout;
    send(
        config,
        stream,
        Message::Hello(HelloMessage {
            realm: config.realm.clone(),
            details: hello_details(config),
        }),
    )
    .await?;

    loop {
        let next = match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                abort(
                    config,
                    stream,
                    abort_message(error_uri::protocol_violation(), "handshake timed out"),
                )
                .await;
                return Err(handshake_failed(config, "timed out"));
            }
        };
        let message = match next {
            Some(Ok(StreamMessage::Message(message))) => message,
            Some(Ok(StreamMessage::Ping(data))) => {
                stream.send(StreamMessage::Ping(data)).await.ok();
                continue;
            }
            Some(Err(err)) => return Err(handshake_failed(config, &format!("{err:#}"))),
            None => return Err(handshake_failed(config, "transport closed")),
        };
        trace!(
            "Session {} received {} message",
            config.name,
            message.message_name()
        );

        match message {
            Message::Welcome(welcome) => {
                if let Some(authenticator) = &config.authenticator {
                    if let Err(err) = authenticator.verify_welcome(&welcome).await {
                        let description = format!("authentication failed: {err:#}");
                        abort(
                            config,
                            stream,
                            abort_message(error_uri::authentication_failed(), &description),
                        )
                        .await;
                        return Err(WampusError::illegal_operation(description)
                            .with_source_message(Message::Welcome(welcome))
                            .with_operation(Operation::Join, config.realm.as_ref()));
                    }
                }
                return Ok(welcome);
            }
            message @ Message::Abort(_) => {
                return Err(error_from_abort(config.realm.as_ref(), &message));
            }
            Message::Challenge(challenge) => {
                let authenticator = match &config.authenticator {
                    Some(authenticator) => authenticator,
                    None => {
                        let description = "authentication required but no authenticator configured";
                        abort(
                            config,
                            stream,
                            abort_message(error_uri::authentication_failed(), description),
                        )
                        .await;
                        return Err(WampusError::illegal_operation(description)
                            .with_source_message(Message::Challenge(challenge))
                            .with_operation(Operation::Join, config.realm.as_ref()));
                    }
                };
                let authenticate = match authenticator.handle_challenge(&challenge).await {
                    Ok(authenticate) => authenticate,
                    Err(err) => {
                        let description = format!("authentication failed: {err:#}");
                        abort(
                            config,
                            stream,
                            abort_message(error_uri::authentication_failed(), &description),
                        )
                        .await;
                        return Err(WampusError::illegal_operation(description)
                            .with_source_message(Message::Challenge(challenge))
                            .with_operation(Operation::Join, config.realm.as_ref()));
                    }
                };
                send(config, stream, Message::Authenticate(authenticate)).await?;
            }
            message => {
                warn!(
                    "Session {} received unexpected {} message during handshake",
                    config.name,
                    message.message_name()
                );
                let description = format!("unexpected {} message", message.message_name());
                abort(
                    config,
                    stream,
                    abort_message(error_uri::protocol_violation(), &description),
                )
                .await;
                return Err(handshake_failed(config, &description).with_source_message(message));
            }
        }
    }
}
