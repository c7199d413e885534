//! The content window: the only handle bundle script receives.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use http::Method;
use netseal_core::{first_of, Race, ResourceKind, ResourceRequest, ResourceResponse, ResourceUrl};
use netseal_gate::{Blob, BoxedSocket, LoadError, Session};
use netseal_security::{Decision, EnforcementLayer, FetchDirective, Violation};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::document::Document;
use crate::error::PrimitiveError;

/// Shared record of blocked attempts.
pub(crate) type ViolationLog = Arc<Mutex<Vec<Violation>>>;

struct WindowContext {
    session: Arc<Session>,
    document: RwLock<Arc<Document>>,
    violations: ViolationLog,
}

/// Script-facing view of a loaded document.
///
/// Every primitive checks the document's content policy, then issues its
/// request through the session, where the request gate decides again. The
/// window holds no other capability.
#[derive(Clone)]
pub struct ContentWindow {
    inner: Arc<WindowContext>,
}

impl ContentWindow {
    pub(crate) fn new(session: Arc<Session>, document: Document, violations: ViolationLog) -> Self {
        Self {
            inner: Arc::new(WindowContext {
                session,
                document: RwLock::new(Arc::new(document)),
                violations,
            }),
        }
    }

    /// The current document.
    pub fn document(&self) -> Arc<Document> {
        self.inner
            .document
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// URL of the current document.
    pub fn location(&self) -> ResourceUrl {
        self.document().url().clone()
    }

    /// One-shot data fetch. Rejects on any blocked or failed load.
    pub async fn fetch(&self, url: &str) -> Result<ResourceResponse, PrimitiveError> {
        let url = self.resolve(url)?;
        self.admit(FetchDirective::Connect, &url)?;
        self.load(ResourceRequest::new(url, ResourceKind::Fetch)).await
    }

    /// Open an event-driven request object.
    ///
    /// Fails synchronously only for a malformed URL; everything else is
    /// reported through the event [`RequestObject::send`] resolves to.
    pub fn request(&self, method: Method, url: &str) -> Result<RequestObject, PrimitiveError> {
        let url = self.resolve(url)?;
        Ok(RequestObject {
            window: self.clone(),
            method,
            url,
            timeout: None,
        })
    }

    /// Load an image, as an `<img src>` assignment would.
    pub async fn load_image(&self, src: &str) -> ImageEvent {
        let url = match self.resolve(src) {
            Ok(url) => url,
            Err(_) => return ImageEvent::Error,
        };
        if self.admit(FetchDirective::Img, &url).is_err() {
            return ImageEvent::Error;
        }

        match self.load(ResourceRequest::new(url, ResourceKind::Image)).await {
            Ok(response)
                if response.status.is_success()
                    && response
                        .content_type()
                        .map_or(false, |t| t.starts_with("image/")) =>
            {
                ImageEvent::Load {
                    bytes: response.body.len(),
                }
            }
            _ => ImageEvent::Error,
        }
    }

    /// Open a persistent socket.
    ///
    /// Only `ws:` and `wss:` URLs are accepted; anything else throws at
    /// construction. The connection attempt starts immediately and its
    /// outcome arrives through [`Socket::wait_open`].
    pub fn open_socket(&self, target: &str) -> Result<Socket, PrimitiveError> {
        let syntax = || PrimitiveError::Syntax(target.to_string());
        let url = ResourceUrl::parse(target).map_err(|_| syntax())?;
        if !matches!(url.scheme(), "ws" | "wss") || url.as_str().contains('#') {
            return Err(syntax());
        }

        let window = self.clone();
        let (tx, rx) = oneshot::channel();
        let target = url.clone();
        let task = tokio::spawn(async move {
            let result = match window.admit(FetchDirective::Connect, &target) {
                Ok(()) => window.connect(target).await,
                Err(e) => Err(e),
            };
            let _ = tx.send(result);
        });

        Ok(Socket {
            url,
            state: SocketState::Connecting(rx),
            task,
        })
    }

    /// Register an in-memory object and return its `blob:` URL.
    pub fn create_object_url(&self, data: impl Into<Vec<u8>>, content_type: &str) -> String {
        let origin = self.document().origin().clone();
        self.inner
            .session
            .blobs()
            .create(&origin, Blob::new(data, content_type))
    }

    /// Revoke a URL from [`create_object_url`](Self::create_object_url).
    pub fn revoke_object_url(&self, url: &str) -> bool {
        self.inner.session.blobs().revoke(url)
    }

    /// Navigate the window. Only local documents may be navigated to.
    pub async fn navigate(&self, url: &str) -> Result<(), PrimitiveError> {
        let url = self.resolve(url)?;
        if self.inner.session.gate().check_navigation(&url) == Decision::Deny {
            tracing::warn!(url = %url, "attempted external navigation refused");
            self.record(EnforcementLayer::Navigation, "local-only", &url);
            return Err(PrimitiveError::NavigationBlocked(url.to_string()));
        }

        let response = self
            .load(ResourceRequest::new(url.clone(), ResourceKind::Document))
            .await?;
        let policies = netseal_security::EnforcedPolicies::from_headers(&response.headers);
        let document = Document::new(url, policies, &response.text());
        *self
            .inner
            .document
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Arc::new(document);
        Ok(())
    }

    /// Load a markup-referenced resource under `directive`.
    pub(crate) async fn load_subresource(
        &self,
        reference: &str,
        kind: ResourceKind,
        directive: FetchDirective,
    ) -> Result<(), PrimitiveError> {
        let url = self.resolve(reference)?;
        self.admit(directive, &url)?;
        self.load(ResourceRequest::new(url, kind)).await.map(|_| ())
    }

    fn resolve(&self, reference: &str) -> Result<ResourceUrl, PrimitiveError> {
        self.document()
            .url()
            .join(reference)
            .map_err(|_| PrimitiveError::Syntax(reference.to_string()))
    }

    /// Content-policy check for a load from the current document.
    fn admit(&self, directive: FetchDirective, url: &ResourceUrl) -> Result<(), PrimitiveError> {
        let document = self.document();
        if document.policies().allows(directive, url, document.origin()) {
            return Ok(());
        }
        tracing::debug!(url = %url, directive = directive.name(), "refused by content policy");
        self.record(EnforcementLayer::ContentPolicy, directive.name(), url);
        Err(PrimitiveError::Network {
            url: url.to_string(),
        })
    }

    async fn load(&self, request: ResourceRequest) -> Result<ResourceResponse, PrimitiveError> {
        let url = request.url.clone();
        self.inner
            .session
            .load(request)
            .await
            .map_err(|e| self.load_failed(&url, e))
    }

    async fn connect(&self, url: ResourceUrl) -> Result<BoxedSocket, PrimitiveError> {
        self.inner
            .session
            .connect(ResourceRequest::new(url.clone(), ResourceKind::Socket))
            .await
            .map_err(|e| self.load_failed(&url, e))
    }

    fn load_failed(&self, url: &ResourceUrl, err: LoadError) -> PrimitiveError {
        match &err {
            LoadError::Blocked { url: blocked, .. } => {
                self.inner
                    .violations
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(Violation {
                        layer: EnforcementLayer::RequestGate,
                        rule: "network-scheme".to_string(),
                        url: blocked.clone(),
                    });
            }
            other => tracing::debug!(url = %url, error = %other, "load failed"),
        }
        PrimitiveError::Network {
            url: url.to_string(),
        }
    }

    fn record(&self, layer: EnforcementLayer, rule: &str, url: &ResourceUrl) {
        self.inner
            .violations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Violation {
                layer,
                rule: rule.to_string(),
                url: url.to_string(),
            });
    }
}

impl std::fmt::Debug for ContentWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentWindow")
            .field("location", &self.location().as_str())
            .finish()
    }
}

/// Terminal event of a request object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestEvent {
    Load { status: u16, body: String },
    Error,
    Timeout,
}

/// Event-driven request, configured before it is sent.
#[derive(Debug)]
pub struct RequestObject {
    window: ContentWindow,
    method: Method,
    url: ResourceUrl,
    timeout: Option<Duration>,
}

impl RequestObject {
    /// Fire [`RequestEvent::Timeout`] if no response arrives within `timeout`.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout).filter(|t| !t.is_zero());
    }

    pub async fn send(self) -> RequestEvent {
        let window = self.window;
        let url = self.url;
        let method = self.method;
        let attempt = async {
            window.admit(FetchDirective::Connect, &url)?;
            window
                .load(ResourceRequest::new(url.clone(), ResourceKind::XmlHttpRequest).with_method(method))
                .await
        };

        let result = match self.timeout {
            Some(timeout) => match first_of(attempt, timeout).await {
                Race::Settled(result) => result,
                Race::Deadline(_) => return RequestEvent::Timeout,
            },
            None => attempt.await,
        };

        match result {
            Ok(response) => RequestEvent::Load {
                status: response.status.as_u16(),
                body: response.text(),
            },
            Err(_) => RequestEvent::Error,
        }
    }
}

/// Terminal event of an image load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEvent {
    Load { bytes: usize },
    Error,
}

/// Connection events of a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Error(String),
    Closed,
}

enum SocketState {
    Connecting(oneshot::Receiver<Result<BoxedSocket, PrimitiveError>>),
    Open(BoxedSocket),
    Failed(String),
    Closed,
}

/// A persistent bidirectional socket.
pub struct Socket {
    url: ResourceUrl,
    state: SocketState,
    task: JoinHandle<()>,
}

impl Socket {
    pub fn url(&self) -> &ResourceUrl {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SocketState::Open(_))
    }

    /// Wait for the connection attempt to settle.
    pub async fn wait_open(&mut self) -> SocketEvent {
        if let SocketState::Connecting(rx) = &mut self.state {
            self.state = match rx.await {
                Ok(Ok(stream)) => SocketState::Open(stream),
                Ok(Err(e)) => SocketState::Failed(e.to_string()),
                Err(_) => SocketState::Failed("connection attempt dropped".to_string()),
            };
        }

        match &self.state {
            SocketState::Open(_) => SocketEvent::Open,
            SocketState::Failed(reason) => SocketEvent::Error(reason.clone()),
            SocketState::Closed | SocketState::Connecting(_) => SocketEvent::Closed,
        }
    }

    /// Send bytes on an open socket.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), PrimitiveError> {
        let stream = self.stream()?;
        stream
            .write_all(data)
            .await
            .map_err(|e| PrimitiveError::InvalidState(e.to_string()))
    }

    /// Receive the next chunk; empty once the peer has closed.
    pub async fn recv(&mut self) -> Result<Vec<u8>, PrimitiveError> {
        let stream = self.stream()?;
        let mut buf = vec![0u8; 4096];
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| PrimitiveError::InvalidState(e.to_string()))?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Close the socket, abandoning a pending connection attempt.
    pub fn close(&mut self) {
        self.task.abort();
        self.state = SocketState::Closed;
    }

    fn stream(&mut self) -> Result<&mut BoxedSocket, PrimitiveError> {
        match &mut self.state {
            SocketState::Open(stream) => Ok(stream),
            _ => Err(PrimitiveError::InvalidState("socket is not open".to_string())),
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("url", &self.url.as_str())
            .field("open", &self.is_open())
            .finish()
    }
}
