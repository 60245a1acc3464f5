//! Execution engine.
//!
//! A single Tokio multi-thread runtime is the shared reactor; its worker
//! threads pick up completions for any connection. Each connection runs as
//! one task, so its steps are strictly sequential while different
//! connections proceed in parallel.
//!
//! `Shutdown` is the stop signal shared by the OS signal handler and the
//! session tracker. Connection I/O races against it, and an operation that
//! loses the race finishes as cancelled rather than failed.

use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Cloneable, level-triggered stop signal.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Request a stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once a stop has been requested.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Trigger this signal on SIGINT or SIGTERM.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn listen_for_signals(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            let mut waiter = shutdown.clone();
            tokio::select! {
                _ = os_signal() => {
                    info!("Stop signal received");
                    shutdown.trigger();
                }
                _ = waiter.wait() => {}
            }
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn os_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// The shared reactor and the worker pool that drives it.
pub struct Engine {
    runtime: tokio::runtime::Runtime,
    shutdown: Shutdown,
    workers: usize,
}

impl Engine {
    /// Build a reactor pumped by `workers` threads.
    pub fn new(workers: usize) -> io::Result<Self> {
        let workers = workers.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("filebench-worker")
            .enable_all()
            .build()?;

        debug!(workers, "Engine started");

        Ok(Self {
            runtime,
            shutdown: Shutdown::new(),
            workers,
        })
    }

    /// Stop signal for everything running on this engine.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `future` to completion with OS signals wired to the stop signal.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(async {
            self.shutdown.listen_for_signals();
            future.await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_after_trigger() {
        let mut shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clones_observe_trigger() {
        let shutdown = Shutdown::new();
        let mut waiter = shutdown.clone();

        let task = tokio::spawn(async move {
            waiter.wait().await;
        });

        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_engine_runs_on_workers() {
        let engine = Engine::new(2).unwrap();
        assert_eq!(engine.workers(), 2);

        let name = engine.block_on(async {
            tokio::spawn(async { std::thread::current().name().map(str::to_string) })
                .await
                .unwrap()
        });
        assert_eq!(name.as_deref(), Some("filebench-worker"));
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let engine = Engine::new(0).unwrap();
        assert_eq!(engine.workers(), 1);
    }
}
