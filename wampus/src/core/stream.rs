use std::{
    pin::Pin,
    task,
};

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    Sink,
    SinkExt,
    Stream,
    StreamExt,
};
use tokio::sync::mpsc::{
    UnboundedReceiver,
    UnboundedSender,
    unbounded_channel,
};

use crate::{
    message::message::Message,
    serializer::serializer::Serializer,
    transport::transport::{
        Transport,
        TransportData,
    },
};

/// An item flowing over a [`MessageStream`].
#[derive(Debug)]
pub enum StreamMessage {
    /// A health check that should be echoed back.
    Ping(Vec<u8>),
    Message(Message),
}

/// A bidirectional stream of WAMP messages, which a session consumes for its whole lifetime.
///
/// `Some(Ok(_))` is a received message, `Some(Err(_))` is a transport error, and `None` means the
/// transport closed.
pub trait MessageStream:
    Send + Stream<Item = Result<StreamMessage>> + Sink<StreamMessage, Error = Error> + Unpin
{
}

/// A [`MessageStream`] over a [`Transport`], using a [`Serializer`] for the wire format.
pub struct TransportMessageStream {
    transport: Box<dyn Transport>,
    serializer: Box<dyn Serializer>,
}

impl TransportMessageStream {
    pub fn new(transport: Box<dyn Transport>, serializer: Box<dyn Serializer>) -> Self {
        Self {
            transport,
            serializer,
        }
    }
}

impl MessageStream for TransportMessageStream {}

impl Stream for TransportMessageStream {
    type Item = Result<StreamMessage>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        match futures_util::ready!(self.transport.poll_next_unpin(cx)) {
            Some(Ok(TransportData::Ping(data))) => {
                task::Poll::Ready(Some(Ok(StreamMessage::Ping(data))))
            }
            Some(Ok(TransportData::Message(data))) => {
                let message = self.serializer.deserialize(&data);
                task::Poll::Ready(Some(message.map(StreamMessage::Message)))
            }
            Some(Err(err)) => task::Poll::Ready(Some(Err(err))),
            None => task::Poll::Ready(None),
        }
    }
}

impl Sink<StreamMessage> for TransportMessageStream {
    type Error = Error;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.transport.poll_ready_unpin(cx)
    }

    fn start_send(
        mut self: Pin<&mut Self>,
        item: StreamMessage,
    ) -> std::result::Result<(), Self::Error> {
        let data = match item {
            StreamMessage::Ping(data) => TransportData::Ping(data),
            StreamMessage::Message(message) => {
                TransportData::Message(self.serializer.serialize(&message)?)
            }
        };
        self.transport.start_send_unpin(data)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.transport.poll_flush_unpin(cx)
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.transport.poll_close_unpin(cx)
    }
}

/// A [`MessageStream`] over in-process channels, skipping serialization entirely.
///
/// Closing one side ends the stream on the other side.
pub struct DirectMessageStream {
    message_tx: Option<UnboundedSender<Message>>,
    message_rx: UnboundedReceiver<Message>,
}

impl DirectMessageStream {
    pub fn new(
        message_tx: UnboundedSender<Message>,
        message_rx: UnboundedReceiver<Message>,
    ) -> Self {
        Self {
            message_tx: Some(message_tx),
            message_rx,
        }
    }
}

/// Creates two connected [`DirectMessageStream`]s.
pub fn direct_message_stream_pair() -> (DirectMessageStream, DirectMessageStream) {
    let (a_tx, a_rx) = unbounded_channel();
    let (b_tx, b_rx) = unbounded_channel();
    (
        DirectMessageStream::new(a_tx, b_rx),
        DirectMessageStream::new(b_tx, a_rx),
    )
}

impl MessageStream for DirectMessageStream {}

impl Stream for DirectMessageStream {
    type Item = Result<StreamMessage>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        self.message_rx
            .poll_recv(cx)
            .map(|message| message.map(|message| Ok(StreamMessage::Message(message))))
    }
}

impl Sink<StreamMessage> for DirectMessageStream {
    type Error = Error;

    fn poll_ready(
        self: Pin<&mut Self>,
        _: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn start_send(
        self: Pin<&mut Self>,
        item: StreamMessage,
    ) -> std::result::Result<(), Self::Error> {
        let message = match item {
            // No transport underneath to answer.
            StreamMessage::Ping(_) => return Ok(()),
            StreamMessage::Message(message) => message,
        };
        match &self.message_tx {
            Some(message_tx) => message_tx
                .send(message)
                .map_err(|_| Error::msg("direct stream peer is gone")),
            None => Err(Error::msg("direct stream is closed")),
        }
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        _: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        _: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.message_tx.take();
        task::Poll::Ready(Ok(()))
    }
}
