//! Sessions: the gate plus scheme routing.

use std::collections::HashMap;
use std::sync::Arc;

use netseal_core::{is_network_scheme, ResourceRequest, ResourceResponse, UrlError, NETWORK_SCHEMES};
use netseal_security::Decision;

use crate::gate::RequestGate;
use crate::local::{BlobStore, LocalTransport};
use crate::transport::{BoxedSocket, Transport, TransportError};

/// Default redirect hop limit.
pub const DEFAULT_MAX_REDIRECTS: u32 = 20;

/// Errors from loading a resource through a session.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("blocked by request gate: {url} (redirect hop {hop})")]
    Blocked { url: String, hop: u32 },

    #[error("too many redirects (limit {limit}) starting from {url}")]
    TooManyRedirects { url: String, limit: u32 },

    #[error("invalid redirect target: {0}")]
    InvalidRedirect(#[from] UrlError),

    #[error("no transport for scheme: {0}")]
    NoTransport(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl LoadError {
    /// Whether the gate stopped the load.
    pub fn is_blocked(&self) -> bool {
        matches!(self, LoadError::Blocked { .. })
    }
}

/// Errors from session construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("network scheme {0} can only be served by the network transport")]
    NetworkScheme(String),
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    blobs: BlobStore,
    transports: HashMap<String, Arc<dyn Transport>>,
    max_redirects: u32,
}

impl SessionBuilder {
    /// Start a session that serves `file:`, `data:` and `blob:` locally and
    /// has no network transport.
    pub fn new() -> Self {
        let blobs = BlobStore::new();
        let local: Arc<dyn Transport> = Arc::new(LocalTransport::new(blobs.clone()));
        let transports = ["file", "data", "blob"]
            .into_iter()
            .map(|scheme| (scheme.to_string(), local.clone()))
            .collect();
        Self {
            blobs,
            transports,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Serve network schemes with `transport`.
    pub fn network(mut self, transport: Arc<dyn Transport>) -> Self {
        for scheme in NETWORK_SCHEMES {
            self.transports.insert(scheme.to_string(), transport.clone());
        }
        self
    }

    /// Serve an additional local scheme.
    pub fn register_scheme(
        mut self,
        scheme: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, SessionError> {
        let scheme = scheme.to_ascii_lowercase();
        if is_network_scheme(&scheme) {
            return Err(SessionError::NetworkScheme(scheme));
        }
        self.transports.insert(scheme, transport);
        Ok(self)
    }

    /// Set the redirect hop limit.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn build(self) -> Session {
        Session {
            gate: RequestGate::new(),
            blobs: self.blobs,
            transports: self.transports,
            max_redirects: self.max_redirects,
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A browsing session: every load and connection passes through its gate.
pub struct Session {
    gate: RequestGate,
    blobs: BlobStore,
    transports: HashMap<String, Arc<dyn Transport>>,
    max_redirects: u32,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// The session's gate.
    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// Blobs addressable from this session.
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Load a resource, following redirects.
    ///
    /// The gate decides every hop independently, so a local request that
    /// redirects to a network URL is stopped at that hop.
    pub async fn load(&self, request: ResourceRequest) -> Result<ResourceResponse, LoadError> {
        let origin_url = request.url.to_string();
        let mut request = request;

        loop {
            self.admit(&request)?;

            let transport = self.transport_for(&request)?;
            let response = transport.send(&request).await?;

            if response.is_redirect() {
                if request.redirect_hop >= self.max_redirects {
                    return Err(LoadError::TooManyRedirects {
                        url: origin_url,
                        limit: self.max_redirects,
                    });
                }
                let location = response.location().unwrap_or_default();
                let next = request.url.join(location)?;
                tracing::debug!(
                    id = %request.id,
                    from = %request.url,
                    to = %next,
                    status = response.status.as_u16(),
                    "following redirect"
                );
                request = request.redirected_to(next, response.status);
                continue;
            }

            let headers = self.gate.filter_response(&request.url, &response.headers);
            return Ok(ResourceResponse { headers, ..response });
        }
    }

    /// Open a socket to the request target.
    pub async fn connect(&self, request: ResourceRequest) -> Result<BoxedSocket, LoadError> {
        self.admit(&request)?;
        let transport = self.transport_for(&request)?;
        Ok(transport.connect(&request).await?)
    }

    fn admit(&self, request: &ResourceRequest) -> Result<(), LoadError> {
        match self.gate.check(request) {
            Decision::Allow => {
                tracing::trace!(id = %request.id, url = %request.url, "request allowed");
                Ok(())
            }
            Decision::Deny => {
                tracing::info!(
                    id = %request.id,
                    url = %request.url,
                    kind = request.kind.as_str(),
                    hop = request.redirect_hop,
                    "request blocked"
                );
                Err(LoadError::Blocked {
                    url: request.url.to_string(),
                    hop: request.redirect_hop,
                })
            }
        }
    }

    fn transport_for(&self, request: &ResourceRequest) -> Result<&Arc<dyn Transport>, LoadError> {
        self.transports
            .get(request.url.scheme())
            .ok_or_else(|| LoadError::NoTransport(request.url.scheme().to_string()))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.transports.keys().collect();
        schemes.sort();
        f.debug_struct("Session")
            .field("gate", &self.gate)
            .field("schemes", &schemes)
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use http::StatusCode;
    use netseal_core::{ResourceKind, ResourceUrl};
    use netseal_security::{Policy, PolicyEngine};

    use super::*;
    use crate::simulated::SimulatedNetwork;

    /// Serves `app://` URLs from a fixed route table.
    struct Routes(Vec<(&'static str, ResourceResponse)>);

    #[async_trait]
    impl Transport for Routes {
        async fn send(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
            self.0
                .iter()
                .find(|(path, _)| *path == request.url.as_str())
                .map(|(_, response)| response.clone())
                .ok_or_else(|| TransportError::NotFound(request.url.to_string()))
        }
    }

    fn engine() -> Arc<PolicyEngine> {
        Arc::new(PolicyEngine::new(Arc::new(Policy::offline())))
    }

    fn request(url: &str, kind: ResourceKind) -> ResourceRequest {
        ResourceRequest::new(ResourceUrl::parse(url).unwrap(), kind)
    }

    fn session_with(routes: Routes, network: &SimulatedNetwork) -> Session {
        let session = Session::builder()
            .network(Arc::new(network.clone()))
            .register_scheme("app", Arc::new(routes))
            .unwrap()
            .build();
        session.gate().install(engine()).unwrap();
        session
    }

    #[tokio::test]
    async fn test_network_request_never_reaches_network() {
        let network = SimulatedNetwork::reachable();
        let session = session_with(Routes(vec![]), &network);

        let err = session
            .load(request("https://example.com", ResourceKind::Fetch))
            .await
            .unwrap_err();
        assert!(err.is_blocked());
        assert_eq!(network.attempts(), 0);
    }

    #[tokio::test]
    async fn test_redirect_to_network_blocked_at_hop() {
        let network = SimulatedNetwork::reachable();
        let routes = Routes(vec![(
            "app://bundle/start",
            ResourceResponse::redirect(StatusCode::FOUND, "https://example.com/x"),
        )]);
        let session = session_with(routes, &network);

        let err = session
            .load(request("app://bundle/start", ResourceKind::Fetch))
            .await
            .unwrap_err();
        match err {
            LoadError::Blocked { url, hop } => {
                assert_eq!(url, "https://example.com/x");
                assert_eq!(hop, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(network.attempts(), 0);
    }

    #[tokio::test]
    async fn test_local_redirect_followed_and_headers_applied() {
        let routes = Routes(vec![
            (
                "app://bundle/old",
                ResourceResponse::redirect(StatusCode::MOVED_PERMANENTLY, "/new"),
            ),
            ("app://bundle/new", ResourceResponse::ok(b"ok".to_vec(), "text/plain")),
        ]);
        let session = session_with(routes, &SimulatedNetwork::reachable());

        let response = session
            .load(request("app://bundle/old", ResourceKind::Document))
            .await
            .unwrap();
        assert_eq!(response.text(), "ok");
        assert_eq!(
            response.headers.get(http::header::CONTENT_SECURITY_POLICY).unwrap(),
            netseal_security::OFFLINE_HEADER
        );
    }

    #[tokio::test]
    async fn test_redirect_loop_bounded() {
        let routes = Routes(vec![(
            "app://bundle/loop",
            ResourceResponse::redirect(StatusCode::FOUND, "app://bundle/loop"),
        )]);
        let network = SimulatedNetwork::reachable();
        let session = Session::builder()
            .network(Arc::new(network))
            .register_scheme("app", Arc::new(routes))
            .unwrap()
            .max_redirects(3)
            .build();
        session.gate().install(engine()).unwrap();

        let err = session
            .load(request("app://bundle/loop", ResourceKind::Fetch))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::TooManyRedirects { limit: 3, .. }));
    }

    #[tokio::test]
    async fn test_uninstalled_gate_fails_closed() {
        let session = Session::builder().build();
        let err = session
            .load(request("data:,hello", ResourceKind::Fetch))
            .await
            .unwrap_err();
        assert!(err.is_blocked());
        assert!(session.gate().install(engine()).is_err());
    }

    #[tokio::test]
    async fn test_socket_blocked_before_connect() {
        let network = SimulatedNetwork::reachable();
        let session = session_with(Routes(vec![]), &network);
        let result = session
            .connect(request("wss://echo.websocket.events", ResourceKind::Socket))
            .await;
        assert!(matches!(result, Err(LoadError::Blocked { hop: 0, .. })));
        assert_eq!(network.attempts(), 0);
    }

    #[test]
    fn test_network_scheme_registration_rejected() {
        let result = Session::builder().register_scheme("HTTPS", Arc::new(Routes(vec![])));
        assert!(matches!(result, Err(SessionError::NetworkScheme(s)) if s == "https"));
    }
}
