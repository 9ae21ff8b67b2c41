//! Job Handler Registry
//!
//! Maps handler names (e.g., "compact_partition") to async closures, so jobs can
//! travel between nodes as plain data and be resolved to code on arrival.

use super::types::*;

use anyhow::Result;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for a thread-safe, asynchronous job handler function.
pub type JobHandlerFn =
    Arc<dyn Fn(Job) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Registry holding the mapping between handler names and their implementation.
pub struct JobHandlerRegistry {
    handlers: DashMap<String, JobHandlerFn>,
}

impl JobHandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `handler` under `handler_name`, replacing any previous one.
    pub fn register<F, Fut>(&self, handler_name: &str, handler: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // Box::pin erases the concrete future type so one map holds every handler.
        let handler_fn: JobHandlerFn = Arc::new(move |job: Job| {
            Box::pin(handler(job)) as Pin<Box<dyn Future<Output = Result<()>> + Send>>
        });

        self.handlers.insert(handler_name.to_string(), handler_fn);

        tracing::info!("Registered job handler: {}", handler_name);
    }

    /// Runs the handler named by `job`.
    ///
    /// # Returns
    /// * `Ok(())` if the handler executed successfully.
    /// * `Err` if the handler failed or if no handler exists for the given name.
    pub async fn execute(&self, job: Job) -> Result<()> {
        let handler_fn = self
            .handlers
            .get(&job.handler)
            .map(|entry| entry.value().clone());

        match handler_fn {
            Some(handler_fn) => {
                tracing::debug!("Executing job {} with handler '{}'", job.id.0, job.handler);
                handler_fn(job).await
            }
            None => {
                let error = format!("Unknown job handler: {}", job.handler);
                tracing::error!("{}", error);
                Err(anyhow::anyhow!(error))
            }
        }
    }

    pub fn list_handlers(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn has_handler(&self, handler_name: &str) -> bool {
        self.handlers.contains_key(handler_name)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for JobHandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}
