//! Bundle script: asynchronous code run against a content window.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::PrimitiveError;
use crate::window::ContentWindow;

/// Future produced by running a script.
pub type ScriptFuture = BoxFuture<'static, Result<Value, ScriptError>>;

type ScriptBody = dyn Fn(ContentWindow) -> ScriptFuture + Send + Sync;

/// An error raised by bundle script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ScriptError {
    pub name: String,
    pub message: String,
}

impl ScriptError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<PrimitiveError> for ScriptError {
    fn from(err: PrimitiveError) -> Self {
        Self::new(err.name(), err.to_string())
    }
}

/// A script that can be evaluated any number of times.
#[derive(Clone)]
pub struct Script {
    name: String,
    body: Arc<ScriptBody>,
}

impl Script {
    /// Wrap an async closure as a script.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(ContentWindow) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ScriptError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(move |window| Box::pin(body(window))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run(&self, window: ContentWindow) -> ScriptFuture {
        (self.body)(window)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script").field("name", &self.name).finish()
    }
}
