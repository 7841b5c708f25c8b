use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{
    SinkExt,
    StreamExt,
};
use wampus::{
    core::{
        error::ErrorKind,
        id::Id,
        stream::{
            DirectMessageStream,
            MessageStream,
            StreamMessage,
            direct_message_stream_pair,
        },
        types::Dictionary,
        uri::Uri,
    },
    message::message::{
        AbortMessage,
        GoodbyeMessage,
        Message,
        ResultMessage,
        WelcomeMessage,
    },
    peer::{
        Connector,
        RpcCall,
        Session,
        SessionConfig,
        SessionState,
    },
};

const REALM: &str = "com.wampus.test";

fn id(value: u64) -> Id {
    Id::try_from(value).unwrap()
}

fn uri(value: &str) -> Uri {
    Uri::try_from(value).unwrap()
}

async fn send(router: &mut DirectMessageStream, message: Message) {
    router.send(StreamMessage::Message(message)).await.unwrap();
}

async fn receive(router: &mut DirectMessageStream) -> Message {
    match router.next().await {
        Some(Ok(StreamMessage::Message(message))) => message,
        other => panic!("expected message, got {other:?}"),
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        name: "session".to_owned(),
        ..SessionConfig::new(uri(REALM))
    }
}

async fn join_with_config(config: SessionConfig) -> (Session, DirectMessageStream) {
    let (local, mut router) = direct_message_stream_pair();
    send(
        &mut router,
        Message::Welcome(WelcomeMessage {
            session: id(1),
            details: Dictionary::default(),
        }),
    )
    .await;
    let session = Session::establish(config, Box::new(local)).await.unwrap();
    assert_matches::assert_matches!(receive(&mut router).await, Message::Hello(_));
    (session, router)
}

async fn join() -> (Session, DirectMessageStream) {
    join_with_config(config()).await
}

#[tokio::test]
async fn transport_closure_fails_all_pending_operations() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let call = session.call(uri("add"), RpcCall::default()).await.unwrap();
    assert_matches::assert_matches!(receive(&mut router).await, Message::Call(_));

    let (registration, subscription, ()) = tokio::join!(
        session.register(uri("com.myapp.procedure")),
        session.subscribe(uri("com.myapp.topic")),
        async {
            let mut received = Vec::new();
            received.push(receive(&mut router).await);
            received.push(receive(&mut router).await);
            assert!(received.iter().any(|message| matches!(message, Message::Register(_))));
            assert!(received.iter().any(|message| matches!(message, Message::Subscribe(_))));
            router.close().await.unwrap();
        }
    );

    assert_matches::assert_matches!(registration, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::Network);
    });
    assert_matches::assert_matches!(subscription, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::Network);
    });
    assert_matches::assert_matches!(call.result().await, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::Network);
    });

    session.closed().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn operations_fail_immediately_after_close() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let (result, ()) = tokio::join!(session.close(), async {
        assert_matches::assert_matches!(receive(&mut router).await, Message::Goodbye(goodbye) => {
            assert_eq!(goodbye.reason.as_ref(), "wamp.close.close_realm");
        });
        send(
            &mut router,
            Message::Goodbye(GoodbyeMessage {
                details: Dictionary::default(),
                reason: uri("wamp.close.goodbye_and_out"),
            }),
        )
        .await;
    });
    assert_matches::assert_matches!(result, Ok(()));
    assert_eq!(session.state(), SessionState::Closed);

    assert_matches::assert_matches!(session.call(uri("add"), RpcCall::default()).await, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.message().contains("session is closed"), "{err}");
    });
    assert_matches::assert_matches!(session.subscribe(uri("com.myapp.topic")).await, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::Network);
    });

    // Closing again succeeds.
    assert_matches::assert_matches!(session.close().await, Ok(()));
}

#[tokio::test]
async fn close_gives_up_after_timeout() {
    test_utils::setup::setup_test_environment();

    let mut config = config();
    config.close_timeout = Duration::from_millis(50);
    let (session, mut router) = join_with_config(config).await;

    assert_matches::assert_matches!(session.close().await, Ok(()));
    assert_eq!(session.state(), SessionState::Closed);
    assert_matches::assert_matches!(receive(&mut router).await, Message::Goodbye(_));
}

#[tokio::test]
async fn answers_goodbye_from_router() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let call = session.call(uri("add"), RpcCall::default()).await.unwrap();
    assert_matches::assert_matches!(receive(&mut router).await, Message::Call(_));

    send(
        &mut router,
        Message::Goodbye(GoodbyeMessage {
            details: Dictionary::default(),
            reason: uri("wamp.close.system_shutdown"),
        }),
    )
    .await;

    assert_matches::assert_matches!(receive(&mut router).await, Message::Goodbye(goodbye) => {
        assert_eq!(goodbye.reason.as_ref(), "wamp.close.goodbye_and_out");
    });
    session.closed().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert_matches::assert_matches!(call.result().await, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.message().contains("wamp.close.system_shutdown"), "{err}");
    });
}

#[tokio::test]
async fn closes_on_abort() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    send(
        &mut router,
        Message::Abort(AbortMessage {
            reason: uri("wamp.error.protocol_violation"),
            ..Default::default()
        }),
    )
    .await;
    session.closed().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn reports_unrouted_messages_without_closing() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let mut anomaly_rx = session.anomaly_rx();

    let call = session.call(uri("add"), RpcCall::default()).await.unwrap();
    let request = receive(&mut router).await.request_id().unwrap();
    let result = Message::Result(ResultMessage {
        call_request: request,
        ..Default::default()
    });
    send(&mut router, result.clone()).await;
    assert_matches::assert_matches!(call.result().await, Ok(_));

    // The call is settled, so a repeated result goes nowhere.
    send(&mut router, result.clone()).await;
    assert_matches::assert_matches!(anomaly_rx.recv().await, Ok(anomaly) => {
        assert_eq!(anomaly.message, result);
    });

    send(
        &mut router,
        Message::Welcome(WelcomeMessage {
            session: id(2),
            details: Dictionary::default(),
        }),
    )
    .await;
    assert_matches::assert_matches!(anomaly_rx.recv().await, Ok(anomaly) => {
        assert_matches::assert_matches!(anomaly.message, Message::Welcome(_));
    });

    assert_eq!(session.state(), SessionState::Established);
}

#[tokio::test]
async fn dropping_session_says_goodbye() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    drop(session);
    assert_matches::assert_matches!(receive(&mut router).await, Message::Goodbye(goodbye) => {
        assert_eq!(goodbye.reason.as_ref(), "wamp.close.close_realm");
    });
}

struct FailingConnector;

#[async_trait]
impl Connector for FailingConnector {
    async fn connect(&self) -> Result<Box<dyn MessageStream>> {
        Err(anyhow::Error::msg("connection refused"))
    }
}

#[tokio::test]
async fn connection_failure_is_network_error() {
    test_utils::setup::setup_test_environment();

    assert_matches::assert_matches!(Session::connect(config(), &FailingConnector).await, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.message().contains("connection refused"), "{err}");
    });
}
