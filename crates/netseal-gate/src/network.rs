//! The real network. Reachable only through an allowing gate.

use std::time::Duration;

use async_trait::async_trait;
use netseal_core::{ResourceRequest, ResourceResponse};
use tokio::net::TcpStream;

use crate::transport::{BoxedSocket, Transport, TransportError};

/// Network timeout configuration.
#[derive(Debug, Clone, Copy)]
pub struct NetworkTimeouts {
    /// Connection establishment timeout.
    pub connect: Duration,
    /// Total request timeout.
    pub total: Duration,
}

impl Default for NetworkTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            total: Duration::from_secs(30),
        }
    }
}

/// HTTP(S) and socket transport.
///
/// Redirects are returned to the session rather than followed, so every hop
/// goes back through the gate.
#[derive(Debug, Clone)]
pub struct NetworkTransport {
    client: reqwest::Client,
    timeouts: NetworkTimeouts,
}

impl NetworkTransport {
    pub fn new(timeouts: NetworkTimeouts) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.total)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { client, timeouts })
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    async fn send(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
        match request.url.scheme() {
            "http" | "https" => {}
            other => return Err(TransportError::Unsupported(other.to_string())),
        }

        let response = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(request.url.to_string())
                } else {
                    TransportError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(ResourceResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    async fn connect(&self, request: &ResourceRequest) -> Result<BoxedSocket, TransportError> {
        let host = request
            .url
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransportError::Malformed(request.url.to_string()))?;
        let port = request
            .url
            .port()
            .ok_or_else(|| TransportError::Malformed(request.url.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();

        let stream = tokio::time::timeout(self.timeouts.connect, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout(request.url.to_string()))??;
        Ok(Box::new(stream))
    }
}
