use futures_util::{
    SinkExt,
    StreamExt,
};
use wampus::{
    core::{
        cancel::CallCancelMode,
        error::ErrorKind,
        id::Id,
        stream::{
            DirectMessageStream,
            StreamMessage,
            direct_message_stream_pair,
        },
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
        ErrorMessage,
        InterruptMessage,
        InvocationMessage,
        Message,
        RegisteredMessage,
        ResultMessage,
        UnregisteredMessage,
        WelcomeMessage,
        tag,
    },
    peer::{
        ProcedureOptions,
        RpcCall,
        Session,
        SessionConfig,
    },
    ticket::{
        ApplicationError,
        RegistrationTicket,
        RpcYield,
    },
};

const REALM: &str = "com.wampus.test";

fn id(value: u64) -> Id {
    Id::try_from(value).unwrap()
}

fn uri(value: &str) -> Uri {
    Uri::try_from(value).unwrap()
}

fn integers(values: &[u64]) -> List {
    values.iter().map(|value| Value::Integer(*value)).collect()
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

async fn join() -> (Session, DirectMessageStream) {
    let (local, mut router) = direct_message_stream_pair();
    send(
        &mut router,
        Message::Welcome(WelcomeMessage {
            session: id(1),
            details: Dictionary::default(),
        }),
    )
    .await;
    let config = SessionConfig {
        name: "rpc".to_owned(),
        ..SessionConfig::new(uri(REALM))
    };
    let session = Session::establish(config, Box::new(local)).await.unwrap();
    assert_matches::assert_matches!(receive(&mut router).await, Message::Hello(_));
    (session, router)
}

async fn register(
    session: &Session,
    router: &mut DirectMessageStream,
    procedure: &str,
    registration: u64,
) -> RegistrationTicket {
    let (registration, ()) = tokio::join!(session.register(uri(procedure)), async {
        let message = receive(router).await;
        assert_matches::assert_matches!(&message, Message::Register(register) => {
            assert_eq!(register.procedure.as_ref(), procedure);
        });
        send(
            router,
            Message::Registered(RegisteredMessage {
                register_request: message.request_id().unwrap(),
                registration: id(registration),
            }),
        )
        .await;
    });
    registration.unwrap()
}

fn invocation_message(request: u64, registration: u64, details: Dictionary) -> Message {
    Message::Invocation(InvocationMessage {
        request: id(request),
        registered_registration: id(registration),
        details,
        call_arguments: integers(&[2, 3]),
        call_arguments_keyword: Dictionary::default(),
    })
}

#[tokio::test]
async fn call_settles_with_result() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let call = session
        .call(
            uri("add"),
            RpcCall {
                arguments: integers(&[2, 3]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let request = assert_matches::assert_matches!(receive(&mut router).await, Message::Call(message) => {
        assert_eq!(message.procedure.as_ref(), "add");
        assert_eq!(message.arguments, integers(&[2, 3]));
        assert!(message.options.get("receive_progress").is_none());
        message.request
    });
    assert_eq!(call.id(), request);
    send(
        &mut router,
        Message::Result(ResultMessage {
            call_request: request,
            details: Dictionary::default(),
            yield_arguments: integers(&[5]),
            yield_arguments_keyword: Dictionary::default(),
        }),
    )
    .await;

    assert_matches::assert_matches!(call.result().await, Ok(result) => {
        assert_eq!(result.arguments, integers(&[5]));
        assert!(!result.progress);
    });
}

#[tokio::test]
async fn call_fails_for_missing_procedure() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let call = session.call(uri("add"), RpcCall::default()).await.unwrap();
    let request = receive(&mut router).await.request_id().unwrap();
    send(
        &mut router,
        Message::Error(ErrorMessage {
            request_type: tag::CALL,
            request,
            details: Dictionary::default(),
            error: uri("wamp.error.no_such_procedure"),
            ..Default::default()
        }),
    )
    .await;

    assert_matches::assert_matches!(call.result().await, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::IllegalOperation);
        assert!(err.message().contains("add"), "{err}");
        assert_eq!(
            err.context().get("operation").map(|operation| operation.as_str()),
            Some("call")
        );
    });
}

#[tokio::test]
async fn callee_error_is_invocation_error() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let call = session.call(uri("divide"), RpcCall::default()).await.unwrap();
    let request = receive(&mut router).await.request_id().unwrap();
    send(
        &mut router,
        Message::Error(ErrorMessage {
            request_type: tag::CALL,
            request,
            details: Dictionary::default(),
            error: uri("com.myapp.divide_by_zero"),
            arguments: List::from_iter([Value::String("cannot divide by zero".to_owned())]),
            ..Default::default()
        }),
    )
    .await;

    assert_matches::assert_matches!(call.result().await, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::Invocation);
        assert!(err.message().contains("cannot divide by zero"), "{err}");
        assert_eq!(
            err.arguments(),
            Some(&List::from_iter([Value::String("cannot divide by zero".to_owned())]))
        );
    });
}

#[tokio::test]
async fn delivers_progress_results_in_order() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let mut call = session
        .call_with_progress(uri("count"), RpcCall::default())
        .await
        .unwrap();
    let request = assert_matches::assert_matches!(receive(&mut router).await, Message::Call(message) => {
        assert_eq!(message.options.get("receive_progress"), Some(&Value::Bool(true)));
        message.request
    });

    for (value, progress) in [(1, true), (2, true), (3, false)] {
        let details = match progress {
            true => Dictionary::from_iter([("progress".to_owned(), Value::Bool(true))]),
            false => Dictionary::default(),
        };
        send(
            &mut router,
            Message::Result(ResultMessage {
                call_request: request,
                details,
                yield_arguments: integers(&[value]),
                yield_arguments_keyword: Dictionary::default(),
            }),
        )
        .await;
    }

    for (value, progress) in [(1, true), (2, true), (3, false)] {
        assert_matches::assert_matches!(call.next_result().await, Some(Ok(result)) => {
            assert_eq!(result.arguments, integers(&[value]));
            assert_eq!(result.progress, progress);
        });
    }
    assert!(call.settled());
    assert_matches::assert_matches!(call.next_result().await, None);
}

#[tokio::test]
async fn cancels_call() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let mut call = session.call(uri("slow"), RpcCall::default()).await.unwrap();
    let request = receive(&mut router).await.request_id().unwrap();

    assert_matches::assert_matches!(call.cancel(CallCancelMode::Kill).await, Ok(()));
    assert_matches::assert_matches!(receive(&mut router).await, Message::Cancel(cancel) => {
        assert_eq!(cancel.call_request, request);
        assert_eq!(cancel.options.get("mode"), Some(&Value::String("kill".to_owned())));
    });
    // A second cancel is not sent.
    assert_matches::assert_matches!(call.cancel(CallCancelMode::Kill).await, Ok(()));

    send(
        &mut router,
        Message::Error(ErrorMessage {
            request_type: tag::CALL,
            request,
            details: Dictionary::default(),
            error: uri("wamp.error.canceled"),
            ..Default::default()
        }),
    )
    .await;
    assert_matches::assert_matches!(call.next_result().await, Some(Err(err)) => {
        assert_eq!(err.kind(), ErrorKind::InvocationCanceled);
    });
    assert!(call.settled());
    assert_matches::assert_matches!(call.cancel(CallCancelMode::Skip).await, Ok(()));
}

#[tokio::test]
async fn sends_call_timeout_in_milliseconds() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let _call = session
        .call(
            uri("slow"),
            RpcCall {
                timeout: Some(std::time::Duration::from_secs(2)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_matches::assert_matches!(receive(&mut router).await, Message::Call(message) => {
        assert_eq!(message.options.get("timeout"), Some(&Value::Integer(2000)));
    });
}

#[tokio::test]
async fn returns_invocation_result_once() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let mut registration = register(&session, &mut router, "add", 42).await;
    assert_eq!(registration.id(), id(42));

    send(&mut router, invocation_message(7, 42, Dictionary::default())).await;
    let mut invocation = registration.next_invocation().await.unwrap();
    assert_eq!(invocation.id(), id(7));
    assert_eq!(invocation.arguments(), &integers(&[2, 3]));
    assert_eq!(invocation.procedure(), Some(uri("add")));

    assert_matches::assert_matches!(
        invocation
            .return_result(RpcYield {
                arguments: integers(&[5]),
                ..Default::default()
            })
            .await,
        Ok(())
    );
    assert_matches::assert_matches!(receive(&mut router).await, Message::Yield(message) => {
        assert_eq!(message.invocation_request, id(7));
        assert_eq!(message.arguments, integers(&[5]));
    });

    assert_matches::assert_matches!(invocation.return_result(RpcYield::default()).await, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::IllegalOperation);
        assert!(err.message().contains("result already sent"), "{err}");
    });
    assert_matches::assert_matches!(
        invocation.error(ApplicationError::new(uri("com.myapp.error"))).await,
        Err(err) => {
            assert_eq!(err.kind(), ErrorKind::IllegalOperation);
        }
    );
}

#[tokio::test]
async fn sends_progress_only_when_requested() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let mut registration = register(&session, &mut router, "count", 3).await;

    send(&mut router, invocation_message(1, 3, Dictionary::default())).await;
    let mut invocation = registration.next_invocation().await.unwrap();
    assert_matches::assert_matches!(invocation.progress(RpcYield::default()).await, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::IllegalOperation);
    });
    invocation.return_result(RpcYield::default()).await.unwrap();
    assert_matches::assert_matches!(receive(&mut router).await, Message::Yield(_));

    send(
        &mut router,
        invocation_message(2, 3, Dictionary::from_iter([(
            "receive_progress".to_owned(),
            Value::Bool(true),
        )])),
    )
    .await;
    let mut invocation = registration.next_invocation().await.unwrap();
    assert!(invocation.receive_progress());
    invocation
        .progress(RpcYield {
            arguments: integers(&[1]),
            ..Default::default()
        })
        .await
        .unwrap();
    invocation.return_result(RpcYield::default()).await.unwrap();
    assert_matches::assert_matches!(receive(&mut router).await, Message::Yield(message) => {
        assert_eq!(message.options.get("progress"), Some(&Value::Bool(true)));
        assert_eq!(message.arguments, integers(&[1]));
    });
    assert_matches::assert_matches!(receive(&mut router).await, Message::Yield(message) => {
        assert!(message.options.get("progress").is_none());
    });
}

#[tokio::test]
async fn surfaces_interrupt_to_invocation() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let mut registration = register(&session, &mut router, "slow", 8).await;

    send(&mut router, invocation_message(11, 8, Dictionary::default())).await;
    let mut invocation = registration.next_invocation().await.unwrap();
    assert_eq!(invocation.canceled(), None);

    send(
        &mut router,
        Message::Interrupt(InterruptMessage {
            invocation_request: id(11),
            options: Dictionary::from_iter([(
                "mode".to_owned(),
                Value::String("killnowait".to_owned()),
            )]),
        }),
    )
    .await;
    assert_eq!(
        invocation.cancellation().await,
        Some(CallCancelMode::KillNoWait)
    );

    invocation.error(ApplicationError::canceled()).await.unwrap();
    assert_matches::assert_matches!(receive(&mut router).await, Message::Error(error) => {
        assert_eq!(error.request_type, tag::INVOCATION);
        assert_eq!(error.request, id(11));
        assert_eq!(error.error.as_ref(), "wamp.error.canceled");
    });
}

#[tokio::test]
async fn answers_dropped_invocation_with_runtime_error() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let mut registration = register(&session, &mut router, "add", 42).await;

    send(&mut router, invocation_message(3, 42, Dictionary::default())).await;
    drop(registration.next_invocation().await.unwrap());

    assert_matches::assert_matches!(receive(&mut router).await, Message::Error(error) => {
        assert_eq!(error.request_type, tag::INVOCATION);
        assert_eq!(error.request, id(3));
        assert_eq!(error.error.as_ref(), "wamp.error.runtime_error");
    });
}

#[tokio::test]
async fn exposes_disclosed_caller_and_pattern_procedure() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let (registration, ()) = tokio::join!(
        session.register_with_options(
            WildcardUri::try_from("com.myapp..add").unwrap(),
            ProcedureOptions {
                match_style: Some(wampus::core::match_style::MatchStyle::Wildcard),
                disclose_caller: true,
                ..Default::default()
            },
        ),
        async {
            let message = receive(&mut router).await;
            assert_matches::assert_matches!(&message, Message::Register(register) => {
                assert_eq!(register.options.get("match"), Some(&Value::String("wildcard".to_owned())));
                assert_eq!(register.options.get("disclose_caller"), Some(&Value::Bool(true)));
            });
            send(
                &mut router,
                Message::Registered(RegisteredMessage {
                    register_request: message.request_id().unwrap(),
                    registration: id(9),
                }),
            )
            .await;
        }
    );
    let mut registration = registration.unwrap();

    send(
        &mut router,
        invocation_message(
            4,
            9,
            Dictionary::from_iter([
                ("caller".to_owned(), Value::Integer(77)),
                (
                    "procedure".to_owned(),
                    Value::String("com.myapp.math.add".to_owned()),
                ),
            ]),
        ),
    )
    .await;
    let mut invocation = registration.next_invocation().await.unwrap();
    assert_eq!(invocation.caller(), Some(id(77)));
    assert_eq!(invocation.procedure(), Some(uri("com.myapp.math.add")));
    invocation.return_result(RpcYield::default()).await.unwrap();
}

#[tokio::test]
async fn unregisters_and_stops_producing_invocations() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let mut registration = register(&session, &mut router, "add", 42).await;

    let (result, ()) = tokio::join!(registration.close(), async {
        let message = receive(&mut router).await;
        assert_matches::assert_matches!(&message, Message::Unregister(unregister) => {
            assert_eq!(unregister.registered_registration, id(42));
        });
        send(
            &mut router,
            Message::Unregistered(UnregisteredMessage {
                unregister_request: message.request_id().unwrap(),
            }),
        )
        .await;
    });
    assert_matches::assert_matches!(result, Ok(()));
    assert!(registration.closed());
    assert_matches::assert_matches!(registration.next_invocation().await, None);

    // Closing again does nothing.
    assert_matches::assert_matches!(registration.close().await, Ok(()));

    // A late invocation is rejected.
    send(&mut router, invocation_message(5, 42, Dictionary::default())).await;
    assert_matches::assert_matches!(receive(&mut router).await, Message::Error(error) => {
        assert_eq!(error.request, id(5));
        assert_eq!(error.error.as_ref(), "wamp.error.no_such_registration");
    });
}

#[tokio::test]
async fn answers_invocation_received_while_unregistering() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let mut registration = register(&session, &mut router, "add", 42).await;

    let (result, ()) = tokio::join!(registration.close(), async {
        let request = receive(&mut router).await.request_id().unwrap();
        send(&mut router, invocation_message(9, 42, Dictionary::default())).await;
        send(
            &mut router,
            Message::Unregistered(UnregisteredMessage {
                unregister_request: request,
            }),
        )
        .await;
    });
    assert_matches::assert_matches!(result, Ok(()));

    let mut invocation = registration.next_invocation().await.unwrap();
    assert_eq!(invocation.id(), id(9));
    invocation
        .return_result(RpcYield {
            arguments: integers(&[5]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_matches::assert_matches!(receive(&mut router).await, Message::Yield(message) => {
        assert_eq!(message.invocation_request, id(9));
        assert_eq!(message.arguments, integers(&[5]));
    });

    assert_matches::assert_matches!(registration.next_invocation().await, None);
}

#[tokio::test]
async fn fails_registration_for_existing_procedure() {
    test_utils::setup::setup_test_environment();

    let (session, mut router) = join().await;
    let (registration, ()) = tokio::join!(session.register(uri("add")), async {
        let request = receive(&mut router).await.request_id().unwrap();
        send(
            &mut router,
            Message::Error(ErrorMessage {
                request_type: tag::REGISTER,
                request,
                details: Dictionary::default(),
                error: uri("wamp.error.procedure_already_exists"),
                ..Default::default()
            }),
        )
        .await;
    });
    assert_matches::assert_matches!(registration, Err(err) => {
        assert_eq!(err.kind(), ErrorKind::IllegalOperation);
        assert!(err.message().contains("tried to register procedure add"), "{err}");
    });
}
