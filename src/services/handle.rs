//! Handles for work scheduled off the calling task.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::metrics::{MetricsSink, ASYNC_FAILED};

/// Eventual result of an asynchronous store operation.
///
/// Await it directly, bound the wait with [`OperationHandle::wait_timeout`],
/// poll [`OperationHandle::is_finished`], or attach a callback with
/// [`OperationHandle::on_complete`]. Dropping the handle does not cancel the
/// work; failures are logged and counted whether or not anyone awaits them.
///
/// Work is scheduled on the current Tokio runtime. Outside a runtime nothing
/// runs and the handle resolves to [`AppError::Internal`].
#[must_use = "dropping the handle detaches the operation; await it to observe the result"]
pub struct OperationHandle<T> {
    operation: &'static str,
    task: Task<T>,
}

enum Task<T> {
    Running {
        join: JoinHandle<Result<T, AppError>>,
        runtime: Handle,
    },
    Rejected(Option<AppError>),
}

impl<T> OperationHandle<T>
where
    T: Send + 'static,
{
    pub(crate) fn spawn<F>(operation: &'static str, metrics: Arc<dyn MetricsSink>, work: F) -> Self
    where
        F: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                metrics.increment(ASYNC_FAILED);
                tracing::error!("Async operation '{}' not started: {}", operation, e);
                return Self {
                    operation,
                    task: Task::Rejected(Some(AppError::Internal(format!(
                        "{} requires a Tokio runtime: {}",
                        operation, e
                    )))),
                };
            }
        };

        let join = runtime.spawn(async move {
            let result = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(AppError::TaskFailed(format!(
                    "{} panicked: {}",
                    operation,
                    panic_message(panic.as_ref())
                ))),
            };

            if let Err(e) = &result {
                metrics.increment(ASYNC_FAILED);
                tracing::error!("Async operation '{}' failed: {}", operation, e);
            }

            result
        });

        Self {
            operation,
            task: Task::Running { join, runtime },
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn is_finished(&self) -> bool {
        match &self.task {
            Task::Running { join, .. } => join.is_finished(),
            Task::Rejected(_) => true,
        }
    }

    /// Waits at most `timeout`. Expiry only stops the wait: the operation keeps
    /// running and anything it already wrote stays written.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<T, AppError> {
        let operation = self.operation;
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Stopped waiting for '{}' after {:?}", operation, timeout);
                Err(AppError::Timeout(timeout))
            }
        }
    }

    /// Runs `callback` with the result once the operation completes. A handle
    /// that never started invokes it immediately.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(Result<T, AppError>) + Send + 'static,
    {
        let runtime = match &self.task {
            Task::Running { runtime, .. } => Some(runtime.clone()),
            Task::Rejected(_) => None,
        };

        match runtime {
            // detached; the callback owns the result
            Some(runtime) => drop(runtime.spawn(async move { callback(self.await) })),
            None => {
                if let Some(result) = self.now_or_never() {
                    callback(result);
                }
            }
        }
    }
}

impl<T> Future for OperationHandle<T> {
    type Output = Result<T, AppError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let operation = self.operation;
        match &mut self.task {
            Task::Running { join, .. } => match Pin::new(join).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(join_error)) => Poll::Ready(Err(AppError::TaskFailed(format!(
                    "{}: {}",
                    operation, join_error
                )))),
                Poll::Pending => Poll::Pending,
            },
            Task::Rejected(error) => Poll::Ready(Err(error.take().unwrap_or_else(|| {
                AppError::Internal(format!("{} polled after completion", operation))
            }))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemoryMetrics;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn sink() -> Arc<InMemoryMetrics> {
        Arc::new(InMemoryMetrics::new())
    }

    #[tokio::test]
    async fn test_await_returns_result() {
        let handle = OperationHandle::spawn("answer", sink(), async { Ok(42) });
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_failure_is_counted_without_awaiting() {
        let metrics = sink();
        let handle: OperationHandle<()> = OperationHandle::spawn("broken", metrics.clone(), async {
            Err(AppError::Internal("boom".to_string()))
        });

        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        drop(handle);

        assert_eq!(metrics.snapshot().counter(ASYNC_FAILED), 1);
    }

    #[tokio::test]
    async fn test_panic_surfaces_as_task_failed() {
        let metrics = sink();
        let handle: OperationHandle<()> =
            OperationHandle::spawn("panicky", metrics.clone(), async {
                if true {
                    panic!("kaboom");
                }
                Ok(())
            });

        let err = handle.await.unwrap_err();
        assert!(matches!(err, AppError::TaskFailed(ref msg) if msg.contains("kaboom")));
        assert_eq!(metrics.snapshot().counter(ASYNC_FAILED), 1);
    }

    #[tokio::test]
    async fn test_timeout_does_not_cancel() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        let handle = OperationHandle::spawn("slow", sink(), async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let err = handle.wait_timeout(Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_on_complete_callback() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = OperationHandle::spawn("callback", sink(), async { Ok("done") });

        handle.on_complete(move |result| {
            let _ = tx.send(result.unwrap());
        });

        assert_eq!(rx.await.unwrap(), "done");
    }

    #[test]
    fn test_outside_runtime_resolves_to_internal_error() {
        let metrics = sink();
        let handle = OperationHandle::spawn("orphan", metrics.clone(), async { Ok(1) });

        assert!(handle.is_finished());
        let err = futures::executor::block_on(handle).unwrap_err();
        assert!(matches!(err, AppError::Internal(ref msg) if msg.contains("orphan")));
        assert_eq!(metrics.snapshot().counter(ASYNC_FAILED), 1);
    }

    #[test]
    fn test_on_complete_outside_runtime_runs_immediately() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let handle = OperationHandle::spawn("orphan", sink(), async { Ok(()) });

        handle.on_complete(move |result| {
            assert!(result.is_err());
            flag.store(true, Ordering::SeqCst);
        });

        assert!(called.load(Ordering::SeqCst));
    }
}
