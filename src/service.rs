use crate::client::ConnectError;
use crate::socket::SocketError;
use async_trait::async_trait;
use bytes::Bytes;
use pushcore::iproto::{ProtocolError, ServerError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single remote request.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed while waiting for the response")]
    Disconnected,
    #[error("socket error: {0}")]
    Socket(#[from] SocketError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("no {kind} named {name:?}")]
    UnknownName { kind: &'static str, name: String },
    #[error("reconnect failed: {0}")]
    Reconnect(Box<ConnectError>),
}

impl From<ConnectError> for CallError {
    fn from(err: ConnectError) -> Self {
        CallError::Reconnect(Box::new(err))
    }
}

/// The database as seen by the procedure model: named procedure calls and
/// index lookups. Arguments and keys are msgpack arrays; results are the raw
/// DATA value of the response (an array of tuples).
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn call(&self, function: &str, args: Vec<u8>) -> Result<Bytes, CallError>;

    async fn select(
        &self,
        space: &str,
        index: &str,
        key: Vec<u8>,
        offset: u32,
        limit: u32,
    ) -> Result<Bytes, CallError>;
}

#[async_trait]
impl<T: RemoteService + ?Sized> RemoteService for Arc<T> {
    async fn call(&self, function: &str, args: Vec<u8>) -> Result<Bytes, CallError> {
        (**self).call(function, args).await
    }

    async fn select(
        &self,
        space: &str,
        index: &str,
        key: Vec<u8>,
        offset: u32,
        limit: u32,
    ) -> Result<Bytes, CallError> {
        (**self).select(space, index, key, offset, limit).await
    }
}
