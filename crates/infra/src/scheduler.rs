//! Periodic task runner.
//!
//! Each task runs on its own tokio task: one tick after `initial_delay`, then
//! one tick every `interval`. Ticks never overlap; a slow tick delays the next
//! one instead of queueing a burst. Task logic reads time from its injected
//! [`celestia_core::Clock`], never from the runner.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Work performed on every tick.
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One bounded unit of work. Errors are logged; the task keeps running.
    async fn tick(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Schedule {
    pub fn new(initial_delay: Duration, interval: Duration) -> Self {
        Self {
            initial_delay,
            interval,
        }
    }
}

/// Runner statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStats {
    pub ticks: u64,
    pub errors: u64,
}

/// Handle to control a running periodic task.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<TaskStats>>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> TaskStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Stop scheduling new ticks and wait for an in-flight tick to finish.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.join.await {
            warn!(task = self.name, error = %e, "periodic task ended abnormally");
        }
    }
}

/// Spawn `task` on the current tokio runtime.
pub fn spawn_periodic<T: PeriodicTask>(task: Arc<T>, schedule: Schedule) -> TaskHandle {
    let name = task.name();
    let shutdown = Arc::new(Notify::new());
    let stats = Arc::new(Mutex::new(TaskStats::default()));

    let join = tokio::spawn(run_loop(task, schedule, shutdown.clone(), stats.clone()));

    TaskHandle {
        name,
        shutdown,
        join,
        stats,
    }
}

async fn run_loop<T: PeriodicTask>(
    task: Arc<T>,
    schedule: Schedule,
    shutdown: Arc<Notify>,
    stats: Arc<Mutex<TaskStats>>,
) {
    let name = task.name();
    info!(
        task = name,
        initial_delay_secs = schedule.initial_delay.as_secs(),
        interval_secs = schedule.interval.as_secs(),
        "periodic task started"
    );

    let start = time::Instant::now() + schedule.initial_delay;
    let mut ticker = time::interval_at(start, schedule.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {
                let result = task.tick().await;
                if let Ok(mut s) = stats.lock() {
                    s.ticks += 1;
                    if result.is_err() {
                        s.errors += 1;
                    }
                }
                match result {
                    Ok(()) => debug!(task = name, "tick finished"),
                    Err(e) => warn!(task = name, error = %e, "tick failed"),
                }
            }
        }
    }

    info!(task = name, "periodic task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct Counting {
        ticks: AtomicU64,
        fail: bool,
    }

    #[async_trait]
    impl PeriodicTask for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn tick(&self) -> Result<(), StoreError> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Unavailable("down".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_after_initial_delay_then_every_interval() {
        let task = Arc::new(Counting::default());
        let handle = spawn_periodic(
            task.clone(),
            Schedule::new(Duration::from_secs(5), Duration::from_secs(300)),
        );

        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(task.ticks.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(task.ticks.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_secs(300)).await;
        assert_eq!(task.ticks.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_counted_and_do_not_stop_the_task() {
        let task = Arc::new(Counting {
            ticks: AtomicU64::new(0),
            fail: true,
        });
        let handle = spawn_periodic(
            task.clone(),
            Schedule::new(Duration::ZERO, Duration::from_secs(60)),
        );

        time::sleep(Duration::from_secs(125)).await;
        let stats = handle.stats();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.errors, 3);

        handle.shutdown().await;
    }
}
