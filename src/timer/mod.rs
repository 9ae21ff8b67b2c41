//! Hashed Wheel Timer Module
//!
//! Schedules one-shot, time-based internal work (retries, lease checks, delayed sends)
//! without a per-task OS timer.
//!
//! ## Core Mechanisms
//! 1. **Ring of buckets**: A single timer thread advances one bucket per tick. A task due
//!    `n` ticks from now sits in bucket `n & mask` with `n / wheel_size` remaining rounds.
//! 2. **Lock-free submission**: `new_timeout` pushes onto a bounded MPSC queue; the timer
//!    thread drains it at the start of each tick, so submitters never touch the wheel.
//! 3. **Decoupled execution**: Expired tasks run on a bounded worker pool. A saturated pool
//!    rejects the task (state `Exception`) instead of stalling the tick.
//! 4. **Lifecycle**: `start`/`stop` are idempotent and block until the timer thread is
//!    running or gone. Threads owned by the timer may not call either.
//!
//! The timer is an ordinary value: construct one per component that needs it.
//!
//! ## Submodules
//! - **`task`**: Task state machine and the `Timeout` handle.
//! - **`wheel`**: The timer thread, the wheel and the execution pool.

pub mod task;
pub mod wheel;

pub use task::{TaskState, Timeout, TimerJob};
pub use wheel::HashedWheelTimer;

#[cfg(test)]
mod tests;
