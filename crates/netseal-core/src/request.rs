//! Resource requests and responses flowing through the request gate.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::location::ResourceUrl;

/// Unique request identifier for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Allocate the next process-wide request ID.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// What kind of resource a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Top-level entry document.
    Document,
    Script,
    Style,
    Image,
    Font,
    /// One-shot data fetch.
    Fetch,
    /// Event-driven request object.
    XmlHttpRequest,
    /// Persistent bidirectional socket.
    Socket,
    Other,
}

impl ResourceKind {
    /// Stable name for logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Script => "script",
            Self::Style => "style",
            Self::Image => "image",
            Self::Font => "font",
            Self::Fetch => "fetch",
            Self::XmlHttpRequest => "xhr",
            Self::Socket => "socket",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound resource request.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    /// Request identifier, shared by every redirect hop.
    pub id: RequestId,
    /// Target URL of this hop.
    pub url: ResourceUrl,
    /// Resource kind.
    pub kind: ResourceKind,
    /// HTTP method.
    pub method: Method,
    /// Number of redirects already followed (0 for the original request).
    pub redirect_hop: u32,
}

impl ResourceRequest {
    /// Create a GET request.
    pub fn new(url: ResourceUrl, kind: ResourceKind) -> Self {
        Self {
            id: RequestId::next(),
            url,
            kind,
            method: Method::GET,
            redirect_hop: 0,
        }
    }

    /// Set the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// The request for the next redirect hop.
    ///
    /// 303 responses, and 301/302 responses to POST, switch to GET.
    pub fn redirected_to(&self, url: ResourceUrl, status: StatusCode) -> Self {
        let method = match status {
            StatusCode::SEE_OTHER => Method::GET,
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND if self.method == Method::POST => {
                Method::GET
            }
            _ => self.method.clone(),
        };

        Self {
            id: self.id,
            url,
            kind: self.kind,
            method,
            redirect_hop: self.redirect_hop + 1,
        }
    }
}

/// A response delivered back towards content.
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl ResourceResponse {
    /// A 200 response with the given content type.
    pub fn ok(body: Vec<u8>, content_type: &str) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
        Self {
            status: StatusCode::OK,
            headers,
            body,
        }
    }

    /// A redirect response pointing at `location`.
    pub fn redirect(status: StatusCode, location: &str) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(location) {
            headers.insert(LOCATION, value);
        }
        Self {
            status,
            headers,
            body: Vec::new(),
        }
    }

    /// Whether this is a redirect carrying a `Location` header.
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection() && self.location().is_some()
    }

    /// The `Location` header, if present and valid UTF-8.
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    /// The `Content-Type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
