//! Network probes.

use std::fmt;
use std::time::Duration;

use http::Method;
use netseal_core::{first_of, Race};
use netseal_host::{ContentWindow, ImageEvent, RequestEvent, Script, ScriptError, SocketEvent};
use serde::Serialize;
use serde_json::{json, Value};

use crate::harness::HarnessError;

/// Default per-probe budget.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Headroom left between a primitive's own timeout and the probe budget.
const TIMEOUT_MARGIN: Duration = Duration::from_millis(100);

pub const DATA_FETCH_TARGET: &str = "https://example.com";
pub const REQUEST_OBJECT_TARGET: &str = "https://api.github.com";
pub const IMAGE_TARGET: &str = "https://example.com/x.png";
pub const SOCKET_TARGET: &str = "wss://echo.websocket.events";

/// Which primitive a probe exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    /// One-shot data fetch.
    DataFetch,
    /// Event-driven request object with its own timeout.
    RequestObject,
    /// Implicit load through an image source.
    ImageLoad,
    /// Persistent bidirectional socket.
    Socket,
    /// Caller-supplied script.
    Custom,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataFetch => write!(f, "data-fetch"),
            Self::RequestObject => write!(f, "request-object"),
            Self::ImageLoad => write!(f, "image-load"),
            Self::Socket => write!(f, "socket"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// A scripted network attempt.
///
/// The script settles with `{"ok": bool, "err"?: string}`; `ok` is true only
/// when the primitive's success signal fired.
#[derive(Debug, Clone)]
pub struct Probe {
    name: String,
    kind: ProbeKind,
    target: String,
    timeout: Duration,
    script: Script,
}

impl Probe {
    /// Build a probe from its parts.
    pub fn new(
        name: impl Into<String>,
        kind: ProbeKind,
        target: impl Into<String>,
        timeout: Duration,
        script: Script,
    ) -> Result<Self, HarnessError> {
        let name = name.into();
        if timeout.is_zero() {
            return Err(HarnessError::InvalidProbe {
                name,
                reason: "timeout must be greater than 0".to_string(),
            });
        }
        Ok(Self {
            name,
            kind,
            target: target.into(),
            timeout,
            script,
        })
    }

    /// Fetch [`DATA_FETCH_TARGET`] once.
    pub fn data_fetch(timeout: Duration) -> Result<Self, HarnessError> {
        let script = Script::new("data-fetch", |window: ContentWindow| async move {
            Ok::<_, ScriptError>(match window.fetch(DATA_FETCH_TARGET).await {
                Ok(_) => json!({ "ok": true }),
                Err(e) => blocked(e.to_string()),
            })
        });
        Self::new("data fetch blocked", ProbeKind::DataFetch, DATA_FETCH_TARGET, timeout, script)
    }

    /// Send a request object to [`REQUEST_OBJECT_TARGET`] with an internal
    /// timeout just inside the probe's.
    pub fn request_object(timeout: Duration) -> Result<Self, HarnessError> {
        let inner = inner_timeout(timeout);
        let script = Script::new("request-object", move |window: ContentWindow| async move {
            let mut request = match window.request(Method::GET, REQUEST_OBJECT_TARGET) {
                Ok(request) => request,
                Err(e) => return Ok(blocked(e.to_string())),
            };
            request.set_timeout(inner);
            Ok::<_, ScriptError>(match request.send().await {
                RequestEvent::Load { .. } => json!({ "ok": true }),
                RequestEvent::Error => blocked("error"),
                RequestEvent::Timeout => blocked("timeout"),
            })
        });
        Self::new(
            "request object blocked",
            ProbeKind::RequestObject,
            REQUEST_OBJECT_TARGET,
            timeout,
            script,
        )
    }

    /// Point an image at [`IMAGE_TARGET`].
    pub fn image_load(timeout: Duration) -> Result<Self, HarnessError> {
        let inner = inner_timeout(timeout);
        let script = Script::new("image-load", move |window: ContentWindow| async move {
            Ok::<_, ScriptError>(match first_of(window.load_image(IMAGE_TARGET), inner).await {
                Race::Settled(ImageEvent::Load { .. }) => json!({ "ok": true }),
                Race::Settled(ImageEvent::Error) => blocked("error"),
                Race::Deadline(_) => blocked("timeout"),
            })
        });
        Self::new("external image blocked", ProbeKind::ImageLoad, IMAGE_TARGET, timeout, script)
    }

    /// Open a socket to [`SOCKET_TARGET`]; passes unless it opens in time.
    pub fn socket(timeout: Duration) -> Result<Self, HarnessError> {
        let inner = inner_timeout(timeout);
        let script = Script::new("socket", move |window: ContentWindow| async move {
            let mut socket = match window.open_socket(SOCKET_TARGET) {
                Ok(socket) => socket,
                Err(e) => return Ok(blocked(e.to_string())),
            };
            let event = first_of(socket.wait_open(), inner).await;
            socket.close();
            Ok::<_, ScriptError>(match event {
                Race::Settled(SocketEvent::Open) => json!({ "ok": true }),
                Race::Settled(SocketEvent::Error(reason)) => blocked(reason),
                Race::Settled(SocketEvent::Closed) => blocked("closed"),
                Race::Deadline(_) => blocked("timeout"),
            })
        });
        Self::new("socket blocked", ProbeKind::Socket, SOCKET_TARGET, timeout, script)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn script(&self) -> &Script {
        &self.script
    }
}

/// The fixed probe battery, in run order.
pub fn battery(timeout: Duration) -> Result<Vec<Probe>, HarnessError> {
    Ok(vec![
        Probe::data_fetch(timeout)?,
        Probe::request_object(timeout)?,
        Probe::image_load(timeout)?,
        Probe::socket(timeout)?,
    ])
}

/// Deadline for a primitive inside a probe of budget `timeout`, so the
/// primitive's own timeout fires before the evaluation deadline.
fn inner_timeout(timeout: Duration) -> Duration {
    let margin = TIMEOUT_MARGIN.min(timeout / 10);
    timeout.saturating_sub(margin).max(Duration::from_millis(1))
}

fn blocked(reason: impl Into<String>) -> Value {
    json!({ "ok": false, "err": reason.into() })
}
