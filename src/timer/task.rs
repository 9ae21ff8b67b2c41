use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Work run when a timeout expires.
pub type TimerJob = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Lifecycle of a scheduled task.
///
/// `Init -> Executing -> Finish | Exception`, or `Init -> Cancelled`. No other
/// transition is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Init = 0,
    Executing = 1,
    Finish = 2,
    Exception = 3,
    Cancelled = 4,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Init,
            1 => Self::Executing,
            2 => Self::Finish,
            3 => Self::Exception,
            _ => Self::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish | Self::Exception | Self::Cancelled)
    }
}

pub(crate) struct TimerTask {
    id: u64,
    deadline: u64,
    remaining_rounds: AtomicU64,
    state: AtomicU8,
    job: Mutex<Option<TimerJob>>,
    cause: OnceLock<String>,
}

impl TimerTask {
    pub(crate) fn new(id: u64, deadline: u64, job: TimerJob) -> Self {
        Self {
            id,
            deadline,
            remaining_rounds: AtomicU64::new(0),
            state: AtomicU8::new(TaskState::Init as u8),
            job: Mutex::new(Some(job)),
            cause: OnceLock::new(),
        }
    }

    pub(crate) fn deadline(&self) -> u64 {
        self.deadline
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    // Written only by the timer thread.
    pub(crate) fn remaining_rounds(&self) -> u64 {
        self.remaining_rounds.load(Ordering::Relaxed)
    }

    pub(crate) fn set_remaining_rounds(&self, rounds: u64) {
        self.remaining_rounds.store(rounds, Ordering::Relaxed);
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn cancel(&self) -> bool {
        if self.transition(TaskState::Init, TaskState::Cancelled) {
            self.job.lock().take();
            return true;
        }
        false
    }

    /// Runs the job if the task is still `Init`. Failures and panics are recorded on the
    /// task and never escape.
    pub(crate) fn run(&self) {
        if !self.transition(TaskState::Init, TaskState::Executing) {
            return;
        }
        let Some(job) = self.job.lock().take() else {
            self.fail("job already taken".to_string());
            return;
        };

        match catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => {
                self.state.store(TaskState::Finish as u8, Ordering::Release);
            }
            Ok(Err(e)) => {
                tracing::warn!("Timer task {} failed: {:#}", self.id, e);
                self.fail(format!("{e:#}"));
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Timer task {} panicked: {}", self.id, message);
                self.fail(message);
            }
        }
    }

    /// Fails a task that could not be handed to the execution pool.
    pub(crate) fn reject(&self, reason: &str) {
        if self.transition(TaskState::Init, TaskState::Executing) {
            self.job.lock().take();
            self.fail(reason.to_string());
        }
    }

    fn fail(&self, cause: String) {
        let _ = self.cause.set(cause);
        self.state.store(TaskState::Exception as u8, Ordering::Release);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Handle on a scheduled task.
#[derive(Clone)]
pub struct Timeout {
    task: Arc<TimerTask>,
}

impl Timeout {
    pub(crate) fn new(task: Arc<TimerTask>) -> Self {
        Self { task }
    }

    pub fn id(&self) -> u64 {
        self.task.id
    }

    /// Nanoseconds since the timer started at which the task becomes due.
    pub fn deadline_nanos(&self) -> u64 {
        self.task.deadline()
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    /// Cancels the task. Succeeds only while it has not started executing.
    pub fn cancel(&self) -> bool {
        self.task.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.state() == TaskState::Cancelled
    }

    /// Error message or panic payload of a failed task.
    pub fn cause(&self) -> Option<&str> {
        self.task.cause.get().map(String::as_str)
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("id", &self.task.id)
            .field("deadline", &self.task.deadline)
            .field("state", &self.task.state())
            .finish()
    }
}
