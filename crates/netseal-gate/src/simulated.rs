//! A network that always answers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netseal_core::{ResourceKind, ResourceRequest, ResourceResponse};

use crate::transport::{BoxedSocket, Transport, TransportError};

/// Smallest valid PNG: a single transparent pixel.
const PIXEL_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Answer,
    Hang,
}

/// Stand-in for the internet in verification runs and tests.
///
/// Every request that reaches it succeeds (or, when hanging, never settles),
/// so a probe can only be blocked by the layers in front of it. Attempts
/// are counted to show whether anything got through.
#[derive(Debug, Clone)]
pub struct SimulatedNetwork {
    behavior: Behavior,
    latency: Duration,
    attempts: Arc<AtomicUsize>,
}

impl SimulatedNetwork {
    /// A network that answers every request.
    pub fn reachable() -> Self {
        Self {
            behavior: Behavior::Answer,
            latency: Duration::ZERO,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A network that accepts requests and never answers.
    pub fn hanging() -> Self {
        Self {
            behavior: Behavior::Hang,
            ..Self::reachable()
        }
    }

    /// Delay every answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Requests and connections that reached this network.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    async fn arrive(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.behavior == Behavior::Hang {
            std::future::pending::<()>().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl Transport for SimulatedNetwork {
    async fn send(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
        self.arrive().await;
        tracing::debug!(url = %request.url, "simulated network answered");
        Ok(match request.kind {
            ResourceKind::Image => ResourceResponse::ok(PIXEL_PNG.to_vec(), "image/png"),
            _ => ResourceResponse::ok(b"{\"ok\":true}".to_vec(), "application/json"),
        })
    }

    async fn connect(&self, request: &ResourceRequest) -> Result<BoxedSocket, TransportError> {
        self.arrive().await;
        tracing::debug!(url = %request.url, "simulated network accepted connection");
        let (local, _remote) = tokio::io::duplex(1024);
        Ok(Box::new(local))
    }
}
