//! Supervised restart of critical background tasks.
//!
//! # Responsibilities
//! - Run a task built by a factory and watch its `JoinHandle`
//! - Report panics and unexpected returns as a typed `TaskFailure`
//! - Restart within a budget, otherwise shut the process down
//!
//! # Design Decisions
//! - The watcher task only reports; the restart decision lives in `run`
//! - A task that returns after shutdown was triggered is not a failure

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};

use crate::config::schema::SupervisorConfig;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Restarts allowed within `window`.
    pub max_restarts: u32,
    pub window: Duration,
    /// Delay before each restart.
    pub backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for RestartPolicy {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            max_restarts: config.max_restarts,
            window: Duration::from_secs(config.window_secs),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskFailure {
    #[error("task '{task}' panicked: {message}")]
    Panicked { task: String, message: String },

    #[error("task '{task}' exited unexpectedly")]
    Exited { task: String },
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("giving up after {restarts} restarts within {window:?}: {last}")]
    Fatal {
        restarts: u32,
        window: Duration,
        last: TaskFailure,
    },
}

pub struct Supervisor {
    name: String,
    policy: RestartPolicy,
    shutdown: Arc<Shutdown>,
}

impl Supervisor {
    pub fn new(name: impl Into<String>, policy: RestartPolicy, shutdown: Arc<Shutdown>) -> Self {
        Self {
            name: name.into(),
            policy,
            shutdown,
        }
    }

    /// Keep the task built by `factory` running until shutdown.
    ///
    /// On an exhausted restart budget, triggers shutdown and returns
    /// `SupervisorError::Fatal`.
    pub async fn run<F, Fut>(self, mut factory: F) -> Result<(), SupervisorError>
    where
        F: FnMut(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (failures_tx, mut failures_rx) = mpsc::channel::<TaskFailure>(1);
        let mut shutdown = self.shutdown.subscribe();
        let mut restarts: VecDeque<Instant> = VecDeque::new();

        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            self.spawn(&mut factory, failures_tx.clone());

            let failure = tokio::select! {
                biased;
                _ = shutdown.recv() => return Ok(()),
                failure = failures_rx.recv() => match failure {
                    Some(failure) => failure,
                    None => return Ok(()),
                },
            };

            if self.shutdown.is_triggered() {
                return Ok(());
            }

            let now = Instant::now();
            while restarts
                .front()
                .is_some_and(|at| now.duration_since(*at) > self.policy.window)
            {
                restarts.pop_front();
            }

            if restarts.len() >= self.policy.max_restarts as usize {
                tracing::error!(
                    task = %self.name,
                    error = %failure,
                    restarts = restarts.len(),
                    "Restart budget exhausted, shutting down"
                );
                self.shutdown.trigger();
                return Err(SupervisorError::Fatal {
                    restarts: self.policy.max_restarts,
                    window: self.policy.window,
                    last: failure,
                });
            }

            restarts.push_back(now);
            metrics::record_supervisor_restart(&self.name);
            tracing::error!(
                task = %self.name,
                error = %failure,
                backoff = ?self.policy.backoff,
                "Supervised task failed, restarting"
            );

            tokio::select! {
                _ = time::sleep(self.policy.backoff) => {}
                _ = shutdown.recv() => return Ok(()),
            }
        }
    }

    fn spawn<F, Fut>(&self, factory: &mut F, failures: mpsc::Sender<TaskFailure>)
    where
        F: FnMut(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(factory(self.shutdown.subscribe()));
        let task = self.name.clone();

        tokio::spawn(async move {
            let failure = match handle.await {
                Ok(()) => TaskFailure::Exited { task },
                Err(e) if e.is_panic() => TaskFailure::Panicked {
                    task,
                    message: panic_message(e.into_panic()),
                },
                Err(_) => TaskFailure::Exited { task },
            };
            let _ = failures.send(failure).await;
        });
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
