//! Bounded-concurrency execution of independent sub-tasks.
//!
//! [`BoundedConcurrencyExecutor::run`] runs every task, at most `limit` at a
//! time, and returns one result per task at the task's input index. A
//! failing task produces a [`RunError`] at its slot; it never cancels or
//! short-circuits its siblings. Completion order is not observable through
//! the result.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, instrument, warn};

use crate::domain::{EvalOrchError, Result, RunError};
use crate::obs;

/// Code recorded for a task that panicked.
pub const TASK_PANIC_CODE: i32 = 500;

/// Outcome of one sub-task.
pub type TaskResult<O> = std::result::Result<O, RunError>;

/// Fixed-size pool for running one operation over many inputs.
#[derive(Debug, Clone)]
pub struct BoundedConcurrencyExecutor {
    limit: usize,
}

impl BoundedConcurrencyExecutor {
    /// Create a pool allowing at most `limit` concurrent tasks.
    ///
    /// A zero limit is an [`EvalOrchError::Infrastructure`] error: such a
    /// pool could never run anything.
    pub fn new(limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(EvalOrchError::Infrastructure(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        Ok(Self { limit })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `op(index, task)` for every task and wait for all of them.
    ///
    /// The returned vector has exactly `tasks.len()` entries and entry `i`
    /// belongs to `tasks[i]`. There is no per-task timeout: a task that never
    /// finishes holds up the whole call.
    #[instrument(skip_all, fields(tasks = tasks.len(), limit = self.limit))]
    pub async fn run<T, O, F, Fut>(&self, tasks: Vec<T>, op: F) -> Vec<TaskResult<O>>
    where
        T: Send + 'static,
        O: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult<O>> + Send + 'static,
    {
        let started = Instant::now();
        let total = tasks.len();
        let op = Arc::new(op);
        let sem = Arc::new(Semaphore::new(self.limit));

        // One slot per input; each task writes only its own slot.
        let slots: Arc<Mutex<Vec<Option<TaskResult<O>>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));

        let mut handles = Vec::with_capacity(total);
        for (index, task) in tasks.into_iter().enumerate() {
            let op = Arc::clone(&op);
            let sem = Arc::clone(&sem);
            let slots = Arc::clone(&slots);

            handles.push(tokio::spawn(async move {
                // The semaphore is never closed, so acquisition only fails
                // if that invariant is broken; run unthrottled in that case.
                let _permit = sem.acquire_owned().await.ok();

                let result = op(index, task).await;
                slots.lock().await[index] = Some(result);
            }));
        }

        for (index, joined) in futures::future::join_all(handles)
            .await
            .into_iter()
            .enumerate()
        {
            if let Err(e) = joined {
                warn!(index, error = %e, "sub-task did not complete");
            }
        }

        let results: Vec<TaskResult<O>> = std::mem::take(&mut *slots.lock().await)
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(RunError::new(TASK_PANIC_CODE, "task panicked"))))
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(total, failed, "bounded batch complete");
        obs::emit_batch_finished(total, failed, started.elapsed().as_millis() as u64);

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_limit_is_infrastructure_error() {
        assert!(matches!(
            BoundedConcurrencyExecutor::new(0),
            Err(EvalOrchError::Infrastructure(_))
        ));
        assert_eq!(BoundedConcurrencyExecutor::new(3).unwrap().limit(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_returns_empty() {
        let pool = BoundedConcurrencyExecutor::new(2).unwrap();
        let out = pool
            .run(Vec::<u32>::new(), |_, x| async move { Ok::<_, RunError>(x) })
            .await;
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_caps_active_tasks() {
        let pool = BoundedConcurrencyExecutor::new(3).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let out = pool
            .run((0..20).collect::<Vec<u64>>(), move |_, x| {
                let active = Arc::clone(&a);
                let peak = Arc::clone(&p);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, RunError>(x)
                }
            })
            .await;

        assert_eq!(out.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_panicking_task_is_captured_at_its_index() {
        let pool = BoundedConcurrencyExecutor::new(2).unwrap();
        let out = pool
            .run(vec![1u32, 2, 3], |_, x| async move {
                if x == 2 {
                    panic!("bad row");
                }
                Ok::<_, RunError>(x * 10)
            })
            .await;

        assert_eq!(out[0], Ok(10));
        assert_eq!(out[1], Err(RunError::new(TASK_PANIC_CODE, "task panicked")));
        assert_eq!(out[2], Ok(30));
    }
}
