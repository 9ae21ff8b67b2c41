//! Distributed Job Scheduling Module
//!
//! Routes internal jobs to named executors with partition affinity.
//!
//! ## Architecture Overview
//! 1. **Submission**: `DistributedJobScheduler::submit` hashes the job key to a partition and
//!    looks up its primary in the current ownership table.
//! 2. **Local execution**: If this node is the primary (or the job has no key), the job is
//!    queued on a named `JobExecutor`, a bounded pool of tokio workers.
//! 3. **Forwarding**: Otherwise the job is JSON-encoded and sent to the primary on a
//!    dedicated engine topic; the primary resolves it through its `JobHandlerRegistry`.
//!
//! Execution semantics (retries, persistence, results) are the handler's business.
//!
//! ## Submodules
//! - **`types`**: `Job`, `JobId` and `JobRoute`.
//! - **`registry`**: Maps handler names to executable Rust code.
//! - **`executor`**: Named bounded worker pools.
//! - **`scheduler`**: Affinity routing over the engine.

pub mod executor;
pub mod registry;
pub mod scheduler;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor};
pub use registry::{JobHandlerFn, JobHandlerRegistry};
pub use scheduler::{DistributedJobScheduler, JOB_TOPIC};
pub use types::{Job, JobId, JobRoute};
