mod auth;
mod config;
mod connector;
pub(crate) mod core;
mod handshake;
mod session;
pub(crate) mod state;

pub use auth::{
    Authenticator,
    TicketAuthenticator,
};
pub use config::{
    HelloDetailsCustomizer,
    SessionConfig,
};
pub use connector::{
    Connector,
    WebSocketConfig,
    WebSocketConnector,
};
pub use self::core::ProtocolAnomaly;
pub use session::{
    ProcedureOptions,
    PublishOptions,
    PublishedEvent,
    RpcCall,
    Session,
    SubscriptionOptions,
};
pub use state::SessionState;
