use std::{
    pin::Pin,
    str,
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
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream,
    WebSocketStream,
    tungstenite::Message as WebSocketMessage,
};

use crate::{
    serializer::serializer::SerializerType,
    transport::transport::{
        Transport,
        TransportData,
    },
};

/// A transport over a client WebSocket connection.
///
/// Text frames carry JSON; binary frames carry MessagePack. Pings are surfaced so the session can
/// answer them with pongs.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    binary: bool,
}

impl WebSocketTransport {
    pub fn new(
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        serializer_type: SerializerType,
    ) -> Self {
        Self {
            stream,
            binary: serializer_type.binary(),
        }
    }
}

impl Transport for WebSocketTransport {}

impl Stream for WebSocketTransport {
    type Item = Result<TransportData>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        loop {
            let message = match futures_util::ready!(self.stream.poll_next_unpin(cx)) {
                Some(Ok(message)) => message,
                Some(Err(err)) => return task::Poll::Ready(Some(Err(err.into()))),
                None => return task::Poll::Ready(None),
            };
            let data = match message {
                WebSocketMessage::Ping(data) => Ok(TransportData::Ping(data.to_vec())),
                WebSocketMessage::Pong(_) | WebSocketMessage::Frame(_) => continue,
                WebSocketMessage::Close(_) => return task::Poll::Ready(None),
                WebSocketMessage::Text(_) if self.binary => Err(Error::msg("expected binary")),
                WebSocketMessage::Binary(_) if !self.binary => Err(Error::msg("expected text")),
                WebSocketMessage::Text(text) => {
                    Ok(TransportData::Message(text.as_str().as_bytes().to_vec()))
                }
                WebSocketMessage::Binary(data) => Ok(TransportData::Message(data.to_vec())),
            };
            return task::Poll::Ready(Some(data));
        }
    }
}

impl Sink<TransportData> for WebSocketTransport {
    type Error = Error;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.stream.poll_ready_unpin(cx).map_err(Error::new)
    }

    fn start_send(
        mut self: Pin<&mut Self>,
        item: TransportData,
    ) -> std::result::Result<(), Self::Error> {
        let message = match item {
            TransportData::Ping(data) => WebSocketMessage::Pong(data.into()),
            TransportData::Message(data) => {
                if self.binary {
                    WebSocketMessage::Binary(data.into())
                } else {
                    WebSocketMessage::Text(str::from_utf8(&data)?.to_owned().into())
                }
            }
        };
        self.stream.start_send_unpin(message).map_err(Error::new)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.stream.poll_flush_unpin(cx).map_err(Error::new)
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.stream.poll_close_unpin(cx).map_err(Error::new)
    }
}
