use anyhow::Result;
use async_trait::async_trait;

use crate::core::stream::MessageStream;

/// A type for opening a connection to a router, producing the stream a session runs over.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn MessageStream>>;
}
