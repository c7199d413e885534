//! Execution context for bundle script.

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::{EvalError, HostError};

type Job = BoxFuture<'static, ()>;

/// Where bundle script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererMode {
    /// A dedicated thread with its own single-threaded runtime.
    Dedicated,
    /// The runtime the host was built on.
    Shared,
}

/// Runs script jobs away from the controller's task.
#[derive(Debug)]
pub(crate) enum Renderer {
    Dedicated(mpsc::UnboundedSender<Job>),
    Shared(Handle),
}

impl Renderer {
    /// Start a renderer thread. The thread exits once the renderer is dropped;
    /// jobs still pending at that point are cancelled.
    pub fn dedicated() -> Result<Self, HostError> {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| HostError::Renderer(e.to_string()))?;

        std::thread::Builder::new()
            .name("netseal-renderer".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(job) = queue.recv().await {
                        tokio::spawn(job);
                    }
                });
                tracing::debug!("renderer thread stopped");
            })
            .map_err(|e| HostError::Renderer(e.to_string()))?;

        Ok(Renderer::Dedicated(jobs))
    }

    /// Use the current runtime.
    pub fn shared() -> Result<Self, HostError> {
        Handle::try_current()
            .map(Renderer::Shared)
            .map_err(|e| HostError::Renderer(e.to_string()))
    }

    pub fn mode(&self) -> RendererMode {
        match self {
            Renderer::Dedicated(_) => RendererMode::Dedicated,
            Renderer::Shared(_) => RendererMode::Shared,
        }
    }

    pub fn spawn(&self, job: Job) -> Result<(), EvalError> {
        match self {
            Renderer::Dedicated(jobs) => jobs.send(job).map_err(|_| EvalError::RendererGone),
            Renderer::Shared(handle) => {
                handle.spawn(job);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_dedicated_runs_off_controller_thread() {
        let renderer = Renderer::dedicated().unwrap();
        let controller = std::thread::current().id();
        let (tx, rx) = oneshot::channel();
        renderer
            .spawn(Box::pin(async move {
                let _ = tx.send(std::thread::current().id());
            }))
            .unwrap();
        assert_ne!(rx.await.unwrap(), controller);
        assert_eq!(renderer.mode(), RendererMode::Dedicated);
    }

    #[tokio::test]
    async fn test_shared_uses_current_runtime() {
        let renderer = Renderer::shared().unwrap();
        let (tx, rx) = oneshot::channel();
        renderer
            .spawn(Box::pin(async move {
                let _ = tx.send(7);
            }))
            .unwrap();
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[test]
    fn test_shared_outside_runtime_fails() {
        assert!(matches!(Renderer::shared(), Err(HostError::Renderer(_))));
    }
}
