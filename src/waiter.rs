//! Supervisor / waiter (C9): concurrent task lifecycle under one root token.

use std::future::Future;
use std::pin::Pin;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{AppError, Result};

type Task = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Owns the root cancellation token and every task registered against it.
/// `wait()` cancels the token on the first task error or on `SIGINT`/
/// `SIGTERM`, then waits for every remaining task to return before handing
/// back the first error observed (if any).
pub struct Waiter {
    cancel: CancellationToken,
    tasks: Vec<Task>,
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register a task. Build the future already closed over a clone of
    /// `token()` so it can observe cancellation.
    pub fn add<F>(&mut self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.push(Box::pin(task));
    }

    pub async fn wait(self) -> Result<()> {
        let cancel = self.cancel;
        let mut handles: FuturesUnordered<JoinHandle<Result<()>>> =
            self.tasks.into_iter().map(tokio::spawn).collect();
        let mut signal = Box::pin(wait_for_signal());

        let mut outcome: Result<()> = Ok(());
        let mut cancelled = false;

        loop {
            if handles.is_empty() {
                break;
            }

            tokio::select! {
                next = handles.next() => {
                    match next {
                        Some(Ok(Ok(()))) => {}
                        Some(Ok(Err(err))) => {
                            if !cancelled {
                                cancelled = true;
                                cancel.cancel();
                                outcome = Err(err);
                            }
                        }
                        Some(Err(join_err)) => {
                            if !cancelled {
                                cancelled = true;
                                cancel.cancel();
                                outcome = Err(AppError::InitFatal(join_err.to_string()));
                            }
                        }
                        None => break,
                    }
                }
                _ = &mut signal, if !cancelled => {
                    info!("shutdown signal received");
                    cancelled = true;
                    cancel.cancel();
                }
            }
        }

        outcome
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
