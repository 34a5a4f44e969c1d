//! Delayed Task Scheduling
//!
//! Deferred work (synthetic payment resolution) is submitted through
//! [`TaskScheduler`] so the executor can change without touching callers.
//! Scheduled tasks are detached from whoever submitted them: dropping the
//! returned [`ScheduledTask`] does not cancel the work, only [`ScheduledTask::cancel`] does.

use futures::future::BoxFuture;
use std::time::Duration;

/// Unit of deferred work
pub type Task = BoxFuture<'static, ()>;

/// Executor for delayed tasks
pub trait TaskScheduler: Send + Sync {
    /// Run `task` after `delay`
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask;
}

/// Handle to a submitted task
#[derive(Debug)]
pub struct ScheduledTask {
    abort: Option<tokio::task::AbortHandle>,
}

impl ScheduledTask {
    /// Handle for a task that cannot be cancelled
    pub fn detached() -> Self {
        Self { abort: None }
    }
    
    /// Cancel the task if it has not run yet
    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }
    
    pub fn is_finished(&self) -> bool {
        self.abort.as_ref().map_or(true, tokio::task::AbortHandle::is_finished)
    }
}

/// Schedules tasks on the ambient tokio runtime
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        
        ScheduledTask {
            abort: Some(handle.abort_handle()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_after_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        
        let handle = TokioScheduler.schedule(
            Duration::from_secs(3),
            Box::pin(async move { flag.store(true, Ordering::SeqCst) }),
        );
        drop(handle);
        
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!ran.load(Ordering::SeqCst));
        
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        
        let handle = TokioScheduler.schedule(
            Duration::from_secs(3),
            Box::pin(async move { flag.store(true, Ordering::SeqCst) }),
        );
        handle.cancel();
        
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}
