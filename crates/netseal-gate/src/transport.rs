//! Scheme handlers behind the session.

use async_trait::async_trait;
use netseal_core::{ResourceRequest, ResourceResponse};
use tokio::io::{AsyncRead, AsyncWrite};

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed resource URL: {0}")]
    Malformed(String),

    #[error("unsupported scheme: {0}")]
    Unsupported(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bidirectional byte stream opened by [`Transport::connect`].
pub trait SocketStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> SocketStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A boxed socket stream.
pub type BoxedSocket = Box<dyn SocketStream>;

/// Handler for one or more URL schemes.
///
/// Transports see requests only after the gate has allowed them and never
/// follow redirects themselves.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a resource.
    async fn send(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError>;

    /// Open a socket to the request target.
    async fn connect(&self, request: &ResourceRequest) -> Result<BoxedSocket, TransportError> {
        Err(TransportError::Unsupported(request.url.scheme().to_string()))
    }
}
