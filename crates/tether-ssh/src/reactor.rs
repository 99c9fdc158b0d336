//! Shared I/O reactor
//!
//! All sessions run their network I/O on one tokio runtime owned by the top
//! level. Components receive a [`Reactor`] (a cheap handle) instead of
//! reaching for a global runtime.

use std::future::Future;
use std::io;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Handle to the runtime that drives session I/O
#[derive(Debug, Clone)]
pub struct Reactor {
    handle: Handle,
}

impl Reactor {
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Reactor for the runtime the caller is running on, if any
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::from_handle)
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// Owned multi-threaded runtime for the reactor
pub struct ReactorRuntime {
    runtime: Runtime,
}

impl ReactorRuntime {
    /// Build a runtime with `threads` workers (at least one)
    pub fn new(threads: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("tether-reactor")
            .enable_all()
            .build()?;

        tracing::debug!("Started reactor with {} worker thread(s)", threads.max(1));
        Ok(Self { runtime })
    }

    pub fn reactor(&self) -> Reactor {
        Reactor::from_handle(self.runtime.handle().clone())
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
