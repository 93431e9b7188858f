//! Process-wide fairness queue bounding concurrent agent runs.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    tokio::sync::Semaphore,
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use parley_metrics::{command as command_metrics, gauge, histogram};

use crate::exec::{CommandFailure, CommandResult};

/// One queued agent invocation.
pub type QueueTask = Pin<Box<dyn Future<Output = CommandResult> + Send>>;

/// Called with `(waited_ms, tasks_ahead)` when a task had to wait.
pub type WaitCallback = Box<dyn Fn(u64, usize) + Send + Sync>;

/// Schedules agent invocations. The queue decides ordering and concurrency;
/// callers only supply the task and a wait observer.
#[async_trait]
pub trait CommandQueue: Send + Sync {
    async fn enqueue(&self, task: QueueTask, on_wait: Option<WaitCallback>) -> CommandResult;
}

/// FIFO queue backed by a tokio [`Semaphore`].
pub struct SemaphoreQueue {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    warn_after: Duration,
}

impl SemaphoreQueue {
    pub fn new(max_concurrent: usize, warn_after: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            warn_after,
        }
    }

    pub fn from_config(cfg: &parley_config::QueueConfig) -> Self {
        Self::new(cfg.max_concurrent, Duration::from_millis(cfg.warn_after_ms))
    }

    /// Tasks currently waiting or running.
    pub fn depth(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the depth counter even if the caller is cancelled mid-wait.
struct DepthGuard(Arc<AtomicUsize>);

impl DepthGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> (Self, usize) {
        let ahead = counter.fetch_add(1, Ordering::SeqCst);
        #[cfg(feature = "metrics")]
        gauge!(command_metrics::QUEUE_DEPTH).set((ahead + 1) as f64);
        (Self(Arc::clone(counter)), ahead)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        let _remaining = self.0.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        #[cfg(feature = "metrics")]
        gauge!(command_metrics::QUEUE_DEPTH).set(_remaining as f64);
    }
}

#[async_trait]
impl CommandQueue for SemaphoreQueue {
    async fn enqueue(&self, task: QueueTask, on_wait: Option<WaitCallback>) -> CommandResult {
        let (_depth, ahead) = DepthGuard::enter(&self.in_flight);
        let started = Instant::now();
        let _permit = self.permits.acquire().await.map_err(|e| {
            CommandFailure::Io(std::io::Error::other(format!("command queue closed: {e}")))
        })?;
        let waited = started.elapsed();

        #[cfg(feature = "metrics")]
        histogram!(command_metrics::QUEUE_WAIT_SECONDS).record(waited.as_secs_f64());

        if waited >= self.warn_after {
            let waited_ms = waited.as_millis() as u64;
            info!(waited_ms, ahead, "agent command waited in queue");
            if let Some(on_wait) = on_wait {
                on_wait(waited_ms, ahead);
            }
        } else {
            debug!(ahead, "agent command dequeued");
        }

        task.await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::exec::CommandOutput,
        std::sync::Mutex,
        tokio::sync::oneshot,
    };

    fn ok_task(stdout: &str) -> QueueTask {
        let stdout = stdout.to_string();
        Box::pin(async move {
            Ok(CommandOutput {
                stdout,
                exit_code: Some(0),
                ..CommandOutput::default()
            })
        })
    }

    #[tokio::test]
    async fn runs_task_without_wait_report() {
        let queue = SemaphoreQueue::new(1, Duration::from_secs(2));
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let out = queue
            .enqueue(
                ok_task("hi"),
                Some(Box::new(move |ms, ahead| {
                    *sink.lock().unwrap() = Some((ms, ahead));
                })),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout, "hi");
        assert!(seen.lock().unwrap().is_none());
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn second_task_waits_and_reports() {
        let queue = Arc::new(SemaphoreQueue::new(1, Duration::ZERO));
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let first_queue = Arc::clone(&queue);
        let first = tokio::spawn(async move {
            first_queue
                .enqueue(
                    Box::pin(async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok(CommandOutput::default())
                    }),
                    None,
                )
                .await
        });
        started_rx.await.unwrap();
        assert_eq!(queue.depth(), 1);

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let second_queue = Arc::clone(&queue);
        let second = tokio::spawn(async move {
            second_queue
                .enqueue(
                    ok_task("second"),
                    Some(Box::new(move |ms, ahead| {
                        *sink.lock().unwrap() = Some((ms, ahead));
                    })),
                )
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        release_tx.send(()).unwrap();
        first.await.unwrap().unwrap();
        let out = second.await.unwrap().unwrap();

        assert_eq!(out.stdout, "second");
        let (_, ahead) = seen.lock().unwrap().expect("wait reported");
        assert_eq!(ahead, 1);
        assert_eq!(queue.depth(), 0);
    }
}
