// "Retry later" without blocking the caller: a one-shot scheduler boundary.
//
// Production wiring uses the tokio timer; tests use the manual scheduler to
// drain deferred work deterministically.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

pub type ScheduledTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`. Never blocks the caller.
    fn schedule_once(&self, delay: Duration, task: ScheduledTask);
}

/// Timer-backed scheduler: spawns the task onto the runtime after a sleep.
#[derive(Debug, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}

/// Queue-backed scheduler for tests: deferred tasks accumulate until the
/// test drains them, so "retry later" becomes a deterministic step.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<Vec<(Duration, ScheduledTask)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Run every currently queued task (tasks queued by those runs are left
    /// for the next drain). Returns how many ran.
    pub async fn drain(&self) -> usize {
        let tasks: Vec<_> = std::mem::take(&mut *self.queue.lock().unwrap());
        let count = tasks.len();
        for (delay, task) in tasks {
            debug!(delay_ms = delay.as_millis() as u64, "Running deferred task");
            task.await;
        }
        count
    }

    /// Drain repeatedly until no deferred work remains or `max_rounds` is
    /// reached. Returns total tasks run.
    pub async fn drain_all(&self, max_rounds: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_rounds {
            let ran = self.drain().await;
            if ran == 0 {
                break;
            }
            total += ran;
        }
        total
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) {
        self.queue.lock().unwrap().push((delay, task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn manual_scheduler_defers_until_drained() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicU32::new(0));

        let c = counter.clone();
        scheduler.schedule_once(
            Duration::from_secs(60),
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 1);

        let ran = scheduler.drain().await;
        assert_eq!(ran, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn tokio_scheduler_runs_after_delay() {
        let counter = Arc::new(AtomicU32::new(0));
        let scheduler = TokioScheduler;

        let c = counter.clone();
        scheduler.schedule_once(
            Duration::from_millis(5),
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
