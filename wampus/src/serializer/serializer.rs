use std::fmt::Debug;

use anyhow::Result;

use crate::{
    core::uri::Uri,
    message::message::Message,
    serializer::{
        json::JsonSerializer,
        message_pack::MessagePackSerializer,
    },
};

/// The type of serializer to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SerializerType {
    /// Serializes messages to and from JavaScript Object Notation.
    Json,
    /// Serializes messages to and from the MessagePack format.
    MessagePack,
}

impl SerializerType {
    /// The short identifier, as used in sub-protocol negotiation.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MessagePack => "msgpack",
        }
    }

    /// The sub-protocol URI advertised during negotiation.
    pub fn uri(&self) -> Uri {
        Uri::from_known(format!("wamp.2.{}", self.id()))
    }

    /// Messages are sent as binary frames.
    pub fn binary(&self) -> bool {
        *self == Self::MessagePack
    }
}

impl TryFrom<&str> for SerializerType {
    type Error = &'static str;
    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "wamp.2.json" => Ok(Self::Json),
            "wamp.2.msgpack" => Ok(Self::MessagePack),
            _ => Err("unsupported serializer"),
        }
    }
}

/// A serializer, which serializes and deserializes WAMP messages to a well-known format that can be
/// passed over wire.
///
/// Does not implement message batching.
pub trait Serializer: Send + Debug {
    /// The type of the serializer.
    fn serializer_type(&self) -> SerializerType;

    /// Serializes the given message to bytes.
    fn serialize(&self, value: &Message) -> Result<Vec<u8>>;

    /// Deserializes bytes to a message.
    fn deserialize(&self, bytes: &[u8]) -> Result<Message>;
}

/// Creates a new [`Serializer`] for the given type.
pub fn new_serializer(serializer_type: SerializerType) -> Box<dyn Serializer> {
    match serializer_type {
        SerializerType::Json => Box::new(JsonSerializer::default()),
        SerializerType::MessagePack => Box::new(MessagePackSerializer::default()),
    }
}

#[cfg(test)]
mod serializer_test {
    use crate::{
        core::{
            id::Id,
            types::{
                Dictionary,
                List,
                Value,
            },
        },
        message::message::{
            Message,
            ResultMessage,
        },
        serializer::serializer::{
            SerializerType,
            new_serializer,
        },
    };

    fn result_message() -> Message {
        Message::Result(ResultMessage {
            call_request: Id::try_from(5).unwrap(),
            details: Dictionary::default(),
            yield_arguments: List::from_iter([Value::Integer(5)]),
            yield_arguments_keyword: Dictionary::default(),
        })
    }

    #[test]
    fn negotiates_by_uri() {
        for serializer_type in [SerializerType::Json, SerializerType::MessagePack] {
            assert_eq!(
                SerializerType::try_from(serializer_type.uri().as_ref()),
                Ok(serializer_type)
            );
        }
        assert_matches::assert_matches!(SerializerType::try_from("wamp.2.cbor"), Err(_));
    }

    #[test]
    fn json_serializer_writes_positional_arrays() {
        let serializer = new_serializer(SerializerType::Json);
        assert_eq!(serializer.serializer_type(), SerializerType::Json);
        assert_matches::assert_matches!(serializer.serialize(&result_message()), Ok(bytes) => {
            assert_eq!(bytes, br#"[50,5,{},[5]]"#);
        });
        assert_matches::assert_matches!(serializer.deserialize(br#"[50,5,{},[5]]"#), Ok(message) => {
            assert_eq!(message, result_message());
        });
        assert_matches::assert_matches!(serializer.deserialize(br#"{"type":50}"#), Err(_));
    }

    #[test]
    fn message_pack_serializer_reads_what_it_writes() {
        let serializer = new_serializer(SerializerType::MessagePack);
        let bytes = serializer.serialize(&result_message()).unwrap();
        assert_matches::assert_matches!(serializer.deserialize(&bytes), Ok(message) => {
            assert_eq!(message, result_message());
        });
    }
}
