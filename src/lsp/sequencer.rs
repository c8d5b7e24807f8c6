//! Single-lane task queue
//!
//! Every interaction with the language server goes through one
//! [`Sequencer`]. Jobs run strictly in submission order and never overlap:
//! the worker awaits a job's settlement before it dequeues the next one.
//! A failing (or panicking) job is reported to its own caller and logged,
//! and the queue moves on.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::{BridgeError, Result};

/// Receives "is a connection available?" at the job's turn
type Job = Box<dyn FnOnce(bool) -> BoxFuture<'static, ()> + Send>;

/// Decides whether the connection exists, evaluated when a job starts
pub type ConnectionGate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Strict FIFO executor with at most one job in flight
#[derive(Clone)]
pub struct Sequencer {
    jobs: mpsc::UnboundedSender<Job>,
}

impl Sequencer {
    /// Create a sequencer and spawn its worker on the current runtime.
    pub fn new(gate: ConnectionGate) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::worker(rx, gate));
        Self { jobs }
    }

    async fn worker(mut rx: mpsc::UnboundedReceiver<Job>, gate: ConnectionGate) {
        let mut seq: u64 = 0;
        while let Some(job) = rx.recv().await {
            seq += 1;
            let connected = gate();
            // The spawned task's completion is the settle signal; a panic
            // inside it surfaces as a JoinError instead of killing the worker.
            if let Err(e) = tokio::spawn(job(connected)).await {
                tracing::error!("Sequencer job #{} aborted: {}", seq, e);
            }
        }
        tracing::debug!("Sequencer worker stopped after {} jobs", seq);
    }

    /// Submit a task.
    ///
    /// The task is queued before this returns, so call order is execution
    /// order even if the returned future is awaited later (or never). When
    /// `requires_connection` is set and no connection exists at the task's
    /// turn, it settles with [`BridgeError::NotConnected`] without running.
    pub fn enqueue<F, Fut, T>(
        &self,
        task: F,
        requires_connection: bool,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move |connected| {
            async move {
                let result = if requires_connection && !connected {
                    Err(BridgeError::NotConnected)
                } else {
                    task().await
                };
                if let Err(e) = &result {
                    tracing::error!("Language client task failed: {}", e);
                }
                // Caller may have stopped listening
                let _ = tx.send(result);
            }
            .boxed()
        });

        let submitted = self.jobs.send(job).is_ok();
        if !submitted {
            tracing::error!("Sequencer worker is gone; task dropped");
        }

        async move {
            if !submitted {
                return Err(BridgeError::TaskAborted);
            }
            rx.await.unwrap_or(Err(BridgeError::TaskAborted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn always_connected() -> Sequencer {
        Sequencer::new(Arc::new(|| true))
    }

    #[tokio::test]
    async fn test_runs_in_submission_order() {
        let seq = always_connected();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut pending = Vec::new();
        for i in 0..10u64 {
            let log = log.clone();
            pending.push(seq.enqueue(
                move || async move {
                    // Earlier tasks sleep longer; order must still hold
                    tokio::time::sleep(Duration::from_millis(10 - i)).await;
                    log.lock().unwrap().push(i);
                    Ok(i)
                },
                true,
            ));
        }

        let results = futures::future::join_all(pending).await;
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..10).collect::<Vec<_>>());
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_at_most_one_in_flight() {
        let seq = always_connected();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let pending: Vec<_> = (0..8)
            .map(|_| {
                let in_flight = in_flight.clone();
                let max_seen = max_seen.clone();
                seq.enqueue(
                    move || async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    },
                    true,
                )
            })
            .collect();

        futures::future::join_all(pending).await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_queue() {
        let seq = always_connected();

        let first = seq.enqueue(
            || async { Err::<(), _>(BridgeError::Protocol("boom".into())) },
            true,
        );
        let second = seq.enqueue(|| async { Ok(42) }, true);

        assert!(matches!(first.await, Err(BridgeError::Protocol(_))));
        assert_eq!(second.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_panicking_task_settles_as_aborted() {
        let seq = always_connected();

        let first = seq.enqueue(
            || async {
                if true {
                    panic!("task blew up");
                }
                Ok::<(), BridgeError>(())
            },
            true,
        );
        let second = seq.enqueue(|| async { Ok("still running") }, true);

        assert!(matches!(first.await, Err(BridgeError::TaskAborted)));
        assert_eq!(second.await.unwrap(), "still running");
    }

    #[tokio::test]
    async fn test_gate_rejects_without_running_body() {
        let seq = Sequencer::new(Arc::new(|| false));
        let ran = Arc::new(AtomicBool::new(false));

        let ran_clone = ran.clone();
        let gated = seq.enqueue(
            move || async move {
                ran_clone.store(true, Ordering::SeqCst);
                Ok(())
            },
            true,
        );
        let ungated = seq.enqueue(|| async { Ok("connecting") }, false);

        assert!(matches!(gated.await, Err(BridgeError::NotConnected)));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(ungated.await.unwrap(), "connecting");
    }

    #[tokio::test]
    async fn test_gate_is_checked_at_task_turn() {
        let connected = Arc::new(AtomicBool::new(false));
        let gate_flag = connected.clone();
        let seq = Sequencer::new(Arc::new(move || gate_flag.load(Ordering::SeqCst)));

        // The first task establishes the "connection"; the second was
        // submitted before that happened but must still see it.
        let flag = connected.clone();
        let connect = seq.enqueue(
            move || async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            false,
        );
        let after = seq.enqueue(|| async { Ok(()) }, true);

        connect.await.unwrap();
        assert!(after.await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_future_still_runs() {
        let seq = always_connected();
        let ran = Arc::new(AtomicBool::new(false));

        let ran_clone = ran.clone();
        drop(seq.enqueue(
            move || async move {
                ran_clone.store(true, Ordering::SeqCst);
                Ok(())
            },
            true,
        ));

        seq.enqueue(|| async { Ok(()) }, true).await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
