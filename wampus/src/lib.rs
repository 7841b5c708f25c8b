pub mod core;
pub mod message;
pub mod peer;
pub mod routing;
pub mod serializer;
pub mod ticket;
pub mod transport;
