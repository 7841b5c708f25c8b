use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use log::debug;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        ClientRequestBuilder,
        http::header::SEC_WEBSOCKET_PROTOCOL,
    },
};

use crate::{
    core::{
        hash::HashMap,
        stream::{
            MessageStream,
            TransportMessageStream,
        },
    },
    peer::{
        config::DEFAULT_AGENT,
        connector::connector::Connector,
    },
    serializer::serializer::{
        SerializerType,
        new_serializer,
    },
    transport::web_socket_transport::WebSocketTransport,
};

/// Configuration for WebSocket connections.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// The router's address, such as `ws://127.0.0.1:8080`.
    pub uri: String,
    /// Allowed serializers, in order of preference.
    ///
    /// The actual serializer is selected by the router during the WebSocket handshake.
    pub serializers: Vec<SerializerType>,
    /// Additional headers to include in the WebSocket handshake request.
    pub headers: HashMap<String, String>,
    /// Sent as the `User-Agent` header.
    pub agent: String,
}

impl WebSocketConfig {
    pub fn new<S>(uri: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            uri: uri.into(),
            serializers: Vec::from_iter([SerializerType::Json, SerializerType::MessagePack]),
            headers: HashMap::default(),
            agent: DEFAULT_AGENT.to_owned(),
        }
    }
}

/// A [`Connector`] for WebSocket connections.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn MessageStream>> {
        if self.config.serializers.is_empty() {
            return Err(Error::msg("at least one serializer is required"));
        }

        let mut request = ClientRequestBuilder::new(self.config.uri.as_str().try_into()?);
        if !self.config.agent.is_empty() {
            request = request.with_header("User-Agent", &self.config.agent);
        }
        for serializer in &self.config.serializers {
            request = request.with_sub_protocol(serializer.uri().to_string());
        }
        for (key, value) in &self.config.headers {
            request = request.with_header(key, value);
        }

        let (stream, response) = connect_async(request).await?;
        let serializer_type = match response.headers().get(SEC_WEBSOCKET_PROTOCOL) {
            Some(protocol) => SerializerType::try_from(protocol.to_str()?).map_err(Error::msg)?,
            None => return Err(Error::msg("handshake did not produce a sub-protocol")),
        };
        debug!(
            "Connected to {} using {}",
            self.config.uri,
            serializer_type.uri()
        );

        Ok(Box::new(TransportMessageStream::new(
            Box::new(WebSocketTransport::new(stream, serializer_type)),
            new_serializer(serializer_type),
        )))
    }
}
