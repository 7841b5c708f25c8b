use std::fmt::Debug;

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    Sink,
    Stream,
};

/// Data received from or sent to a [`Transport`].
#[derive(Debug)]
pub enum TransportData {
    /// A health check that should be answered immediately.
    Ping(Vec<u8>),
    /// A serialized WAMP message.
    Message(Vec<u8>),
}

/// A transport, over which serialized WAMP messages are sent and received.
///
/// The stream ends when the underlying connection closes.
pub trait Transport:
    Send + Stream<Item = Result<TransportData>> + Sink<TransportData, Error = Error> + Unpin + Debug
{
}
