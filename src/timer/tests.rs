//! Timer Module Tests
//!
//! ## Test Scopes
//! - **Lifecycle**: start/stop idempotence, restart after stop, calls from timer-owned threads.
//! - **Firing**: tasks never fire early, long delays wrap around the wheel, ordering by deadline.
//! - **Cancellation**: cancel only succeeds before execution.
//! - **Failures**: returned errors and panics end in `Exception` with the cause retained.

#[cfg(test)]
mod tests {
    use crate::config::TimerConfig;
    use crate::error::TimerError;
    use crate::timer::{HashedWheelTimer, TaskState};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn test_config() -> TimerConfig {
        TimerConfig {
            tick_duration: Duration::from_millis(1),
            wheel_size: 64,
            worker_threads: 2,
            max_pending: 1024,
            execution_queue_size: 256,
        }
    }

    fn started_timer(config: &TimerConfig) -> HashedWheelTimer {
        let timer = HashedWheelTimer::new(config);
        timer.start().unwrap();
        timer
    }

    fn wait_for_state(timeout: &crate::timer::Timeout, state: TaskState) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if timeout.state() == state {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    // ============================================================
    // TEST 1: Lifecycle
    // ============================================================

    #[test]
    fn test_new_timeout_before_start_is_rejected() {
        // ARRANGE
        let timer = HashedWheelTimer::new(&test_config());

        // ACT
        let result = timer.new_timeout(Duration::from_millis(1), || Ok(()));

        // ASSERT
        assert_eq!(result.unwrap_err(), TimerError::NotRunning);
    }

    #[test]
    fn test_wheel_size_rounds_up_to_power_of_two() {
        let mut config = test_config();
        config.wheel_size = 100;

        let timer = HashedWheelTimer::new(&config);

        assert_eq!(timer.wheel_size(), 128);
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        // ARRANGE
        let timer = HashedWheelTimer::new(&test_config());

        // ACT + ASSERT
        assert!(timer.start().is_ok());
        assert!(timer.start().is_ok());
        assert!(timer.is_running());

        assert!(timer.stop().is_ok());
        assert!(timer.stop().is_ok());
        assert!(!timer.is_running());
    }

    #[test]
    fn test_start_after_stop_is_terminated() {
        let timer = started_timer(&test_config());
        timer.stop().unwrap();

        assert_eq!(timer.start().unwrap_err(), TimerError::Terminated);
    }

    #[test]
    fn test_stop_without_start_succeeds() {
        let timer = HashedWheelTimer::new(&test_config());

        assert!(timer.stop().is_ok());
        assert_eq!(timer.start().unwrap_err(), TimerError::Terminated);
    }

    #[test]
    fn test_lifecycle_calls_from_task_thread_are_rejected() {
        // ARRANGE
        let timer = Arc::new(started_timer(&test_config()));
        let (tx, rx) = crossbeam_channel::bounded(1);
        let inner = timer.clone();

        // ACT: a running task tries to stop its own timer
        timer
            .new_timeout(Duration::from_millis(1), move || {
                let _ = tx.send((inner.stop(), inner.start()));
                Ok(())
            })
            .unwrap();

        let (stop, start) = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // ASSERT
        assert_eq!(stop.unwrap_err(), TimerError::SelfLifecycle);
        assert_eq!(start.unwrap_err(), TimerError::SelfLifecycle);
        assert!(timer.is_running());
        timer.stop().unwrap();
    }

    // ============================================================
    // TEST 2: Firing
    // ============================================================

    #[test]
    fn test_task_never_fires_early() {
        // ARRANGE
        let timer = started_timer(&test_config());
        let delay = Duration::from_millis(30);
        let (tx, rx) = crossbeam_channel::bounded(1);
        let submitted = Instant::now();

        // ACT
        let timeout = timer
            .new_timeout(delay, move || {
                let _ = tx.send(Instant::now());
                Ok(())
            })
            .unwrap();

        let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // ASSERT
        assert!(fired.duration_since(submitted) >= delay);
        assert!(wait_for_state(&timeout, TaskState::Finish));
        timer.stop().unwrap();
    }

    #[test]
    fn test_delay_longer_than_one_revolution_fires() {
        // ARRANGE: 8 buckets x 1ms, delay spans several rounds
        let mut config = test_config();
        config.wheel_size = 8;
        let timer = started_timer(&config);
        let delay = Duration::from_millis(45);
        let (tx, rx) = crossbeam_channel::bounded(1);
        let submitted = Instant::now();

        // ACT
        timer
            .new_timeout(delay, move || {
                let _ = tx.send(Instant::now());
                Ok(())
            })
            .unwrap();

        // ASSERT
        let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(fired.duration_since(submitted) >= delay);
        timer.stop().unwrap();
    }

    #[test]
    fn test_zero_delay_fires() {
        let timer = started_timer(&test_config());
        let (tx, rx) = crossbeam_channel::bounded(1);

        timer
            .new_timeout(Duration::ZERO, move || {
                let _ = tx.send(());
                Ok(())
            })
            .unwrap();

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        timer.stop().unwrap();
    }

    #[test]
    fn test_many_tasks_all_fire() {
        // ARRANGE
        let timer = started_timer(&test_config());
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timeouts = Vec::new();

        // ACT
        for i in 0..200u64 {
            let fired = fired.clone();
            timeouts.push(
                timer
                    .new_timeout(Duration::from_millis(i % 20), move || {
                        fired.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap(),
            );
        }

        // ASSERT
        for timeout in &timeouts {
            assert!(wait_for_state(timeout, TaskState::Finish));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 200);
        assert_eq!(timer.pending_timeouts(), 0);
        timer.stop().unwrap();
    }

    // ============================================================
    // TEST 3: Cancellation
    // ============================================================

    #[test]
    fn test_cancel_before_fire_prevents_execution() {
        // ARRANGE
        let timer = started_timer(&test_config());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();

        let timeout = timer
            .new_timeout(Duration::from_millis(50), move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        // ACT
        assert!(timeout.cancel());
        std::thread::sleep(Duration::from_millis(120));

        // ASSERT
        assert!(timeout.is_cancelled());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timeout.cancel());
        timer.stop().unwrap();
    }

    #[test]
    fn test_cancel_after_finish_fails() {
        let timer = started_timer(&test_config());
        let timeout = timer.new_timeout(Duration::from_millis(1), || Ok(())).unwrap();

        assert!(wait_for_state(&timeout, TaskState::Finish));

        assert!(!timeout.cancel());
        assert_eq!(timeout.state(), TaskState::Finish);
        timer.stop().unwrap();
    }

    #[test]
    fn test_stop_cancels_pending_tasks() {
        // ARRANGE
        let timer = started_timer(&test_config());
        let timeout = timer
            .new_timeout(Duration::from_secs(60), || Ok(()))
            .unwrap();

        // ACT
        timer.stop().unwrap();

        // ASSERT
        assert_eq!(timeout.state(), TaskState::Cancelled);
        assert_eq!(timer.pending_timeouts(), 0);
        assert_eq!(
            timer.new_timeout(Duration::ZERO, || Ok(())).unwrap_err(),
            TimerError::NotRunning
        );
    }

    #[test]
    fn test_submissions_racing_stop_are_never_stranded() {
        // ARRANGE
        let config = TimerConfig {
            max_pending: 1 << 16,
            ..test_config()
        };
        let timer = Arc::new(started_timer(&config));
        let submitters: Vec<_> = (0..4)
            .map(|_| {
                let timer = timer.clone();
                std::thread::spawn(move || {
                    let mut accepted = Vec::new();
                    for _ in 0..5_000 {
                        match timer.new_timeout(Duration::from_secs(3600), || Ok(())) {
                            Ok(timeout) => accepted.push(timeout),
                            Err(e) => {
                                assert_eq!(e, TimerError::NotRunning);
                                break;
                            }
                        }
                    }
                    accepted
                })
            })
            .collect();

        // ACT
        std::thread::sleep(Duration::from_millis(5));
        timer.stop().unwrap();
        let accepted: Vec<_> = submitters
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();

        // ASSERT: every accepted task was cancelled by the stop
        assert!(accepted.iter().all(|t| t.state() == TaskState::Cancelled));
        assert_eq!(timer.pending_timeouts(), 0);
    }

    // ============================================================
    // TEST 4: Failures
    // ============================================================

    #[test]
    fn test_failing_task_records_cause() {
        let timer = started_timer(&test_config());

        let timeout = timer
            .new_timeout(Duration::from_millis(1), || Err(anyhow::anyhow!("disk unavailable")))
            .unwrap();

        assert!(wait_for_state(&timeout, TaskState::Exception));
        assert!(timeout.cause().unwrap().contains("disk unavailable"));
        timer.stop().unwrap();
    }

    #[test]
    fn test_panicking_task_does_not_halt_timer() {
        // ARRANGE
        let timer = started_timer(&test_config());
        let (tx, rx) = crossbeam_channel::bounded(1);

        // ACT
        let failed = timer
            .new_timeout(Duration::from_millis(1), || panic!("boom"))
            .unwrap();
        assert!(wait_for_state(&failed, TaskState::Exception));

        timer
            .new_timeout(Duration::from_millis(1), move || {
                let _ = tx.send(());
                Ok(())
            })
            .unwrap();

        // ASSERT
        assert_eq!(failed.cause(), Some("boom"));
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        timer.stop().unwrap();
    }

    #[test]
    fn test_full_submission_queue_is_rejected() {
        // ARRANGE: queue holds 2 entries, the timer thread is not draining fast enough
        let mut config = test_config();
        config.max_pending = 2;
        config.tick_duration = Duration::from_secs(1);
        let timer = started_timer(&config);

        // ACT
        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(timer.new_timeout(Duration::from_secs(30), || Ok(())));
        }

        // ASSERT
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(TimerError::QueueFull { capacity: 2 })))
        );
        timer.stop().unwrap();
    }
}
