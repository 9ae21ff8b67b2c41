//! Job routing across the cluster.
//!
//! `DistributedJobScheduler` decides *where* a job runs, not how. Unkeyed jobs run on a
//! local executor. Keyed jobs run where the key's partition has its primary: locally if
//! that is this node, otherwise the job is sent to the primary over the engine and run
//! there by its registry. Ownership is read at submission time, so routing follows the
//! latest view without any coordination.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};

use super::executor::{ExecutorStats, JobExecutor};
use super::registry::JobHandlerRegistry;
use super::types::{Job, JobRoute};
use crate::config::ExecutorConfig;
use crate::engine::{Codec, DistributedEngine, JsonCodec, SharedMessage};
use crate::error::{EngineError, SchedulerError};

/// Topic forwarded jobs travel on.
pub const JOB_TOPIC: &str = "devastator.jobs";

pub struct DistributedJobScheduler {
    engine: Arc<DistributedEngine>,
    registry: Arc<JobHandlerRegistry>,
    executors: HashMap<String, Arc<JobExecutor>>,
    default_executor: String,
}

impl DistributedJobScheduler {
    /// Builds and starts the configured executors and starts accepting forwarded jobs.
    /// Must be called from within a tokio runtime.
    pub fn new(
        engine: Arc<DistributedEngine>,
        registry: Arc<JobHandlerRegistry>,
        config: &ExecutorConfig,
    ) -> Arc<Self> {
        let executors: HashMap<String, Arc<JobExecutor>> = config
            .executors
            .iter()
            .map(|executor| {
                let pool = JobExecutor::new(&executor.name, executor.threads, config.message_queue_size);
                pool.start();
                (executor.name.clone(), pool)
            })
            .collect();

        let scheduler = Arc::new(Self {
            engine: engine.clone(),
            registry,
            executors,
            default_executor: config.default_executor.clone(),
        });

        let weak: Weak<Self> = Arc::downgrade(&scheduler);
        engine.register_handler(JOB_TOPIC, move |message| {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.on_forwarded(message);
            }
        });

        scheduler
    }

    pub fn registry(&self) -> &Arc<JobHandlerRegistry> {
        &self.registry
    }

    pub fn executor(&self, name: &str) -> Option<&Arc<JobExecutor>> {
        self.executors.get(name)
    }

    pub fn executor_stats(&self) -> Vec<ExecutorStats> {
        let mut stats: Vec<ExecutorStats> = self.executors.values().map(|e| e.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Runs `future` on the executor called `executor_name`.
    pub fn execute<F>(&self, executor_name: &str, future: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let executor = self
            .executors
            .get(executor_name)
            .ok_or_else(|| SchedulerError::UnknownExecutor(executor_name.to_string()))?;
        executor.try_dispatch(format!("task on '{executor_name}'"), future)
    }

    /// Routes `job` by key affinity.
    pub fn submit(&self, job: Job) -> Result<JobRoute, SchedulerError> {
        let Some(key) = job.key.as_deref() else {
            return self.run_local(job);
        };

        let cluster = self.engine.cluster();
        let partition = cluster.metadata().partition_of(key);
        let primary = cluster
            .metadata()
            .primary(partition)
            .map(|node| node.id)
            .ok_or(EngineError::NoOwner(partition))?;

        if cluster.is_local(&primary) {
            return self.run_local(job);
        }

        self.engine
            .send_object(&JsonCodec, JOB_TOPIC, &job, Some(&primary))?;
        tracing::debug!(
            "Forwarded job {} (partition {}) to primary {}",
            job.id.0,
            partition,
            primary
        );
        Ok(JobRoute::Forwarded(primary))
    }

    fn run_local(&self, job: Job) -> Result<JobRoute, SchedulerError> {
        if !self.registry.has_handler(&job.handler) {
            return Err(SchedulerError::UnknownHandler(job.handler));
        }

        let executor_name = job
            .executor
            .clone()
            .unwrap_or_else(|| self.default_executor.clone());
        let executor = self
            .executors
            .get(&executor_name)
            .ok_or_else(|| SchedulerError::UnknownExecutor(executor_name.clone()))?;

        let label = format!("job {} ({})", job.id.0, job.handler);
        let registry = self.registry.clone();
        executor.try_dispatch(label, async move { registry.execute(job).await })?;

        Ok(JobRoute::Local {
            executor: executor_name,
        })
    }

    /// Forwarded jobs always run here, even if ownership moved meanwhile, so a job is
    /// never bounced between nodes that disagree on the view.
    fn on_forwarded(&self, message: SharedMessage) {
        let job: Job = match JsonCodec.decode(message.payload()) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!("Dropping undecodable job from {:?}: {}", message.source(), e);
                return;
            }
        };

        let job_id = job.id.0.clone();
        match self.run_local(job) {
            Ok(_) => tracing::debug!("Accepted forwarded job {} from {:?}", job_id, message.source()),
            Err(e) => tracing::warn!("Rejected forwarded job {}: {}", job_id, e),
        }
    }

    /// Stops every executor from accepting work.
    pub fn shutdown(&self) {
        self.engine.unregister_handler(JOB_TOPIC);
        for executor in self.executors.values() {
            executor.shutdown();
        }
    }
}
