mod connector;
mod web_socket_connector;

pub use connector::Connector;
pub use web_socket_connector::{
    WebSocketConfig,
    WebSocketConnector,
};
