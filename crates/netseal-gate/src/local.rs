//! Local resources: files on disk, embedded data and in-memory blobs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use netseal_core::{Origin, ResourceRequest, ResourceResponse};
use percent_encoding::percent_decode_str;

use crate::transport::{Transport, TransportError};

const DEFAULT_DATA_TYPE: &str = "text/plain;charset=US-ASCII";

/// An in-memory object addressed by a `blob:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl Blob {
    pub fn new(data: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }
}

/// Registry of live `blob:` URLs, shared between content and the session.
#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    blobs: Arc<RwLock<HashMap<String, Blob>>>,
    next_id: Arc<AtomicU64>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blob and return its URL, scoped to `origin`.
    pub fn create(&self, origin: &Origin, blob: Blob) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let url = format!("blob:{}/{:016x}", origin, id);
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.clone(), blob);
        url
    }

    /// Look up a live blob.
    pub fn get(&self, url: &str) -> Option<Blob> {
        self.blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
    }

    /// Revoke a blob URL. Returns whether it was live.
    pub fn revoke(&self, url: &str) -> bool {
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(url)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transport for `file:`, `data:` and `blob:` URLs.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    blobs: BlobStore,
}

impl LocalTransport {
    pub fn new(blobs: BlobStore) -> Self {
        Self { blobs }
    }

    async fn read_file(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
        let path = request
            .url
            .to_file_path()
            .ok_or_else(|| TransportError::Malformed(request.url.to_string()))?;

        match tokio::fs::read(&path).await {
            Ok(body) => Ok(ResourceResponse::ok(body, content_type_for(&path))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TransportError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn read_blob(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
        let blob = self
            .blobs
            .get(request.url.as_str())
            .ok_or_else(|| TransportError::NotFound(request.url.to_string()))?;
        Ok(ResourceResponse::ok(blob.data, &blob.content_type))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
        tracing::trace!(url = %request.url, kind = request.kind.as_str(), "local load");
        match request.url.scheme() {
            "file" => self.read_file(request).await,
            "data" => {
                let (content_type, body) = decode_data_url(request.url.rest())?;
                Ok(ResourceResponse::ok(body, &content_type))
            }
            "blob" => self.read_blob(request),
            other => Err(TransportError::Unsupported(other.to_string())),
        }
    }
}

/// Decode the part of a `data:` URL after the scheme.
pub fn decode_data_url(rest: &str) -> Result<(String, Vec<u8>), TransportError> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| TransportError::Malformed(format!("data:{}", rest)))?;
    let payload = payload.split('#').next().unwrap_or_default();

    let (media_type, is_base64) = match meta.strip_suffix(";base64") {
        Some(media_type) => (media_type, true),
        None => (meta, false),
    };
    let content_type = if media_type.trim().is_empty() {
        DEFAULT_DATA_TYPE.to_string()
    } else {
        media_type.trim().to_string()
    };

    let decoded: Vec<u8> = percent_decode_str(payload).collect();
    let body = if is_base64 {
        let compact: Vec<u8> = decoded
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        STANDARD
            .decode(compact)
            .map_err(|e| TransportError::Malformed(format!("base64 payload: {}", e)))?
    } else {
        decoded
    };

    Ok((content_type, body))
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("wasm") => "application/wasm",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
