//! Named Worker Pool
//!
//! A `JobExecutor` owns a bounded queue and a fixed number of tokio workers draining it.
//! Submission never waits: a full queue is reported back to the caller.
//!
//! ## Responsibilities
//! - **Bounding**: at most `queue_size` units wait, at most `threads` run at once.
//! - **Isolation**: each unit runs in its own tokio task, so a panicking job is logged
//!   and the worker keeps going.
//! - **Accounting**: completed and failed counters for inspection.

use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::error::SchedulerError;

type WorkFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A queued unit of work and the label it is logged under.
struct Work {
    label: String,
    future: WorkFuture,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExecutorStats {
    pub name: String,
    pub threads: usize,
    pub completed: u64,
    pub failed: u64,
}

pub struct JobExecutor {
    name: String,
    threads: usize,
    sender: Mutex<Option<mpsc::Sender<Work>>>,
    receiver: Mutex<Option<mpsc::Receiver<Work>>>,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl JobExecutor {
    pub fn new(name: impl Into<String>, threads: usize, queue_size: usize) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        Arc::new(Self {
            name: name.into(),
            threads: threads.max(1),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawns the workers on the current tokio runtime. Later calls are no-ops.
    pub fn start(self: &Arc<Self>) {
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for worker_id in 0..self.threads {
            let executor = self.clone();
            let receiver = receiver.clone();
            tokio::spawn(async move {
                executor.worker_loop(worker_id, receiver).await;
            });
        }

        tracing::info!("Executor '{}' started with {} workers", self.name, self.threads);
    }

    async fn worker_loop(&self, worker_id: usize, receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Work>>>) {
        loop {
            // Hold the lock only while waiting for the next unit.
            let next = receiver.lock().await.recv().await;
            let Some(work) = next else {
                break;
            };

            tracing::trace!("Executor '{}' worker {} running {}", self.name, worker_id, work.label);
            match tokio::spawn(work.future).await {
                Ok(Ok(())) => {
                    self.completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Executor '{}': {} failed: {:#}", self.name, work.label, e);
                }
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("Executor '{}': {} panicked: {}", self.name, work.label, e);
                }
            }
        }

        tracing::debug!("Executor '{}' worker {} stopped", self.name, worker_id);
    }

    /// Queues `future` without waiting for space.
    pub fn try_dispatch<F>(&self, label: impl Into<String>, future: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let guard = self.sender.lock();
        let sender = guard
            .as_ref()
            .ok_or_else(|| SchedulerError::Closed(self.name.clone()))?;

        let work = Work {
            label: label.into(),
            future: Box::pin(future),
        };
        sender.try_send(work).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SchedulerError::Saturated(self.name.clone()),
            mpsc::error::TrySendError::Closed(_) => SchedulerError::Closed(self.name.clone()),
        })
    }

    /// Refuses new work. Queued units still run.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            tracing::info!("Executor '{}' shut down", self.name);
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            name: self.name.clone(),
            threads: self.threads,
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
