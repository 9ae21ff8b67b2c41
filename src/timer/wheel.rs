//! Hashed wheel timer.
//!
//! One dedicated thread owns a ring of `wheel_size` buckets and advances one bucket per
//! tick. Submitters push tasks onto a bounded lock-free MPSC queue; at the start of each
//! tick the timer thread moves queued tasks into bucket `deadline_ticks & mask` with
//! `remaining_rounds = (deadline_ticks - current_tick) / wheel_size`, then expires the
//! current bucket. Due tasks are handed to a separate bounded thread pool, so a slow
//! task never delays the tick.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use crossbeam_queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering, fence};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use super::task::{Timeout, TimerJob, TimerTask};
use crate::config::TimerConfig;
use crate::error::TimerError;

const STATE_INIT: u8 = 0;
const STATE_STARTED: u8 = 1;
const STATE_SHUTDOWN: u8 = 2;

/// Cap on queued tasks moved into the wheel per tick, so a submission burst cannot
/// stall expiry.
const MAX_TRANSFER_PER_TICK: usize = 100_000;

/// Longest single sleep, bounding how late the thread notices a stop request.
const MAX_SLEEP: Duration = Duration::from_millis(10);

/// One-shot gate: `wait` blocks until `open` has been called.
struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    fn new() -> Self {
        Self {
            open: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

struct TimerShared {
    tick_nanos: u64,
    mask: u64,
    wheel_size: usize,
    worker_threads: usize,
    execution_queue_size: usize,
    queue: ArrayQueue<Arc<TimerTask>>,
    state: AtomicU8,
    start_time: OnceLock<Instant>,
    started: Latch,
    stopped: Latch,
    owned_threads: Mutex<HashSet<ThreadId>>,
    pending: AtomicUsize,
    next_id: AtomicU64,
}

impl TimerShared {
    fn register_current_thread(&self) {
        self.owned_threads.lock().insert(thread::current().id());
    }

    fn is_owned_thread(&self) -> bool {
        self.owned_threads.lock().contains(&thread::current().id())
    }

    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_STARTED
    }

    /// Decrements `pending`, never below zero; the timer thread resets it on exit.
    fn release_pending(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }
}

pub struct HashedWheelTimer {
    shared: Arc<TimerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HashedWheelTimer {
    /// Builds a stopped timer. `wheel_size` is rounded up to a power of two.
    pub fn new(config: &TimerConfig) -> Self {
        let wheel_size = config.wheel_size.max(1).next_power_of_two();
        let tick_nanos = u64::try_from(config.tick_duration.as_nanos())
            .unwrap_or(u64::MAX)
            .max(1);

        Self {
            shared: Arc::new(TimerShared {
                tick_nanos,
                mask: (wheel_size - 1) as u64,
                wheel_size,
                worker_threads: config.worker_threads.max(1),
                execution_queue_size: config.execution_queue_size.max(1),
                queue: ArrayQueue::new(config.max_pending.max(1)),
                state: AtomicU8::new(STATE_INIT),
                start_time: OnceLock::new(),
                started: Latch::new(),
                stopped: Latch::new(),
                owned_threads: Mutex::new(HashSet::new()),
                pending: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(self.shared.tick_nanos)
    }

    pub fn wheel_size(&self) -> usize {
        self.shared.wheel_size
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Tasks submitted but not yet fired, cancelled-and-removed or discarded.
    pub fn pending_timeouts(&self) -> usize {
        self.shared.pending.load(Ordering::Relaxed)
    }

    /// Starts the timer thread and blocks until it is ticking. Calling it again while
    /// running is a no-op.
    pub fn start(&self) -> Result<(), TimerError> {
        if self.shared.is_owned_thread() {
            return Err(TimerError::SelfLifecycle);
        }

        match self.shared.state.compare_exchange(
            STATE_INIT,
            STATE_STARTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                let shared = self.shared.clone();
                let spawned = thread::Builder::new()
                    .name("devastator-timer".to_string())
                    .spawn(move || run_timer(shared));
                match spawned {
                    Ok(handle) => {
                        *self.worker.lock() = Some(handle);
                    }
                    Err(e) => {
                        self.shared.state.store(STATE_SHUTDOWN, Ordering::Release);
                        self.shared.started.open();
                        self.shared.stopped.open();
                        return Err(TimerError::Spawn(e.to_string()));
                    }
                }
            }
            Err(STATE_STARTED) => {}
            Err(_) => return Err(TimerError::Terminated),
        }

        self.shared.started.wait();
        Ok(())
    }

    /// Stops the timer and blocks until its thread and execution pool have exited.
    /// Tasks that had not fired are cancelled. Idempotent.
    pub fn stop(&self) -> Result<(), TimerError> {
        if self.shared.is_owned_thread() {
            return Err(TimerError::SelfLifecycle);
        }

        let stopped_here = self
            .shared
            .state
            .compare_exchange(STATE_STARTED, STATE_SHUTDOWN, Ordering::SeqCst, Ordering::Acquire)
            .is_ok();

        if !stopped_here
            && self
                .shared
                .state
                .compare_exchange(STATE_INIT, STATE_SHUTDOWN, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            // Never started: nothing to wait for.
            self.shared.started.open();
            self.shared.stopped.open();
            return Ok(());
        }

        self.shared.stopped.wait();
        if let Some(handle) = self.worker.lock().take()
            && handle.join().is_err()
        {
            tracing::error!("Timer thread panicked during shutdown");
        }
        if stopped_here {
            tracing::info!("Hashed wheel timer stopped");
        }
        Ok(())
    }

    /// Schedules `job` to run once `delay` has elapsed.
    pub fn new_timeout<F>(&self, delay: Duration, job: F) -> Result<Timeout, TimerError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        if !self.shared.is_running() {
            return Err(TimerError::NotRunning);
        }
        let start = self.shared.start_time.get().ok_or(TimerError::NotRunning)?;

        let deadline = start
            .elapsed()
            .saturating_add(delay)
            .as_nanos()
            .min(u128::from(u64::MAX)) as u64;
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let task = Arc::new(TimerTask::new(id, deadline, Box::new(job) as TimerJob));

        self.shared.pending.fetch_add(1, Ordering::Relaxed);
        if self.shared.queue.push(task.clone()).is_err() {
            self.shared.release_pending();
            return Err(TimerError::QueueFull {
                capacity: self.shared.queue.capacity(),
            });
        }

        // A stop that won the race may already have drained the queue.
        fence(Ordering::SeqCst);
        if self.shared.state.load(Ordering::SeqCst) != STATE_STARTED {
            task.cancel();
            self.shared.release_pending();
            return Err(TimerError::NotRunning);
        }

        tracing::trace!("Scheduled timer task {} at +{:?}", id, delay);
        Ok(Timeout::new(task))
    }
}

impl Drop for HashedWheelTimer {
    fn drop(&mut self) {
        if self.shared.is_running()
            && !self.shared.is_owned_thread()
            && let Err(e) = self.stop()
        {
            tracing::warn!("Failed to stop timer on drop: {}", e);
        }
    }
}

/// Bounded pool running expired tasks off the timer thread.
struct ExecutionPool {
    sender: Option<Sender<Arc<TimerTask>>>,
    workers: Vec<JoinHandle<()>>,
}

impl ExecutionPool {
    fn start(shared: &Arc<TimerShared>) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(shared.execution_queue_size);
        let mut workers = Vec::with_capacity(shared.worker_threads);

        for worker_id in 0..shared.worker_threads {
            let receiver: Receiver<Arc<TimerTask>> = receiver.clone();
            let shared = shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("devastator-timer-exec-{worker_id}"))
                .spawn(move || {
                    shared.register_current_thread();
                    while let Ok(task) = receiver.recv() {
                        task.run();
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => tracing::error!("Failed to spawn timer worker {}: {}", worker_id, e),
            }
        }

        Self {
            sender: Some(sender),
            workers,
        }
    }

    fn dispatch(&self, task: Arc<TimerTask>) {
        let Some(sender) = self.sender.as_ref() else {
            task.reject("execution pool is shut down");
            return;
        };
        match sender.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(task)) => {
                tracing::warn!("Timer execution pool saturated, rejecting task");
                task.reject("execution pool saturated");
            }
            Err(TrySendError::Disconnected(task)) => {
                task.reject("execution pool is shut down");
            }
        }
    }

    /// Lets queued executions finish, then joins the workers.
    fn shutdown(mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Timer worker thread panicked");
            }
        }
    }
}

fn run_timer(shared: Arc<TimerShared>) {
    shared.register_current_thread();
    let pool = ExecutionPool::start(&shared);
    let start = Instant::now();
    let _ = shared.start_time.set(start);

    let mut wheel: Vec<Vec<Arc<TimerTask>>> = (0..shared.wheel_size).map(|_| Vec::new()).collect();
    let mut tick: u64 = 0;

    tracing::info!(
        "Hashed wheel timer started: tick={:?}, wheel_size={}, workers={}",
        Duration::from_nanos(shared.tick_nanos),
        shared.wheel_size,
        shared.worker_threads
    );
    shared.started.open();

    while wait_for_tick(&shared, start, tick) {
        transfer_queued(&shared, &mut wheel, tick);
        let bucket = &mut wheel[(tick & shared.mask) as usize];
        expire_bucket(&shared, bucket, &pool);
        tick += 1;
    }

    let mut cancelled = 0usize;
    for task in wheel.into_iter().flatten() {
        if task.cancel() {
            cancelled += 1;
        }
    }
    while let Some(task) = shared.queue.pop() {
        if task.cancel() {
            cancelled += 1;
        }
    }
    shared.pending.store(0, Ordering::Relaxed);

    pool.shutdown();
    tracing::debug!("Timer thread exiting after {} ticks, {} tasks cancelled", tick, cancelled);
    shared.stopped.open();
}

/// Sleeps until the end of `tick`. Returns `false` once a stop was requested.
fn wait_for_tick(shared: &TimerShared, start: Instant, tick: u64) -> bool {
    let deadline = shared.tick_nanos.saturating_mul(tick + 1);
    loop {
        if !shared.is_running() {
            return false;
        }
        let elapsed = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        if elapsed >= deadline {
            return true;
        }
        thread::sleep(Duration::from_nanos(deadline - elapsed).min(MAX_SLEEP));
    }
}

fn transfer_queued(shared: &TimerShared, wheel: &mut [Vec<Arc<TimerTask>>], tick: u64) {
    for _ in 0..MAX_TRANSFER_PER_TICK {
        let Some(task) = shared.queue.pop() else {
            break;
        };
        if task.state().is_terminal() {
            shared.release_pending();
            continue;
        }

        let deadline_ticks = task.deadline() / shared.tick_nanos;
        let rounds = deadline_ticks.saturating_sub(tick) / shared.wheel_size as u64;
        task.set_remaining_rounds(rounds);

        // Already overdue tasks go into the current bucket.
        let slot = deadline_ticks.max(tick) & shared.mask;
        wheel[slot as usize].push(task);
    }
}

fn expire_bucket(shared: &TimerShared, bucket: &mut Vec<Arc<TimerTask>>, pool: &ExecutionPool) {
    let mut idx = 0;
    while idx < bucket.len() {
        let task = &bucket[idx];
        if task.state().is_terminal() {
            bucket.swap_remove(idx);
            shared.release_pending();
            continue;
        }

        let rounds = task.remaining_rounds();
        if rounds == 0 {
            let task = bucket.swap_remove(idx);
            shared.release_pending();
            pool.dispatch(task);
        } else {
            task.set_remaining_rounds(rounds - 1);
            idx += 1;
        }
    }
}
