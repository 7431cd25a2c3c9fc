//! Asynchronous `copy`/`backup`/`restore` (spec.md §4.1, §5): a bounded
//! `tokio::sync::mpsc` work queue drained by a fixed pool of worker tasks,
//! grounded in `wormhole/src/bin/server/main.rs`'s `JoinSet`-based task
//! fan-out and in `gruel`'s preference for explicit shutdown signaling over
//! ad hoc `Option<JoinHandle>` bookkeeping. Each submitted job returns a
//! `WaitHandle` that `wait_for_copy`/`wait_for_backup`/`wait_for_restore`
//! poll, exactly as SPEC_FULL.md §4.1 describes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fam_common::{FamError, FamResult};
use fam_rpc::messages::JobStatusWire;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

type BoxedJob = Pin<Box<dyn Future<Output = FamResult<()>> + Send>>;

struct JobState {
    status: JobStatusWire,
    error: Option<String>,
}

pub struct WaitHandle {
    id: u64,
    state: Mutex<JobState>,
}

impl WaitHandle {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(WaitHandle {
            id,
            state: Mutex::new(JobState {
                status: JobStatusWire::Pending,
                error: None,
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> JobStatusWire {
        self.state.lock().status
    }

    fn mark_running(&self) {
        self.state.lock().status = JobStatusWire::Running;
    }

    fn complete(&self, result: FamResult<()>) {
        let mut state = self.state.lock();
        match result {
            Ok(()) => state.status = JobStatusWire::Done,
            Err(e) => {
                state.status = JobStatusWire::Failed;
                state.error = Some(e.message());
            }
        }
    }

    /// Polls until the job is `Done` or `Failed`. The background workers
    /// never wake a waiter directly; this mirrors the "wait_for_*ed call
    /// surfaces it" propagation policy in spec.md §7 rather than adding a
    /// signaling channel the spec never asked for.
    pub async fn wait(&self) -> FamResult<()> {
        loop {
            {
                let state = self.state.lock();
                match state.status {
                    JobStatusWire::Done => return Ok(()),
                    JobStatusWire::Failed => {
                        return Err(FamError::Resource(
                            state.error.clone().unwrap_or_else(|| "job failed".to_string()),
                        ))
                    }
                    JobStatusWire::Pending | JobStatusWire::Running => {}
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

struct Submission {
    handle: Arc<WaitHandle>,
    job: BoxedJob,
}

pub struct AsyncJobQueue {
    sender: mpsc::Sender<Submission>,
    next_id: AtomicU64,
    handles: RwLock<HashMap<u64, Arc<WaitHandle>>>,
    enabled: bool,
}

impl AsyncJobQueue {
    pub fn new(num_consumers: usize, queue_depth: usize, enabled: bool) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let queue = Arc::new(AsyncJobQueue {
            sender,
            next_id: AtomicU64::new(1),
            handles: RwLock::new(HashMap::new()),
            enabled,
        });

        for _ in 0..num_consumers {
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    let submission = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    match submission {
                        Some(Submission { handle, job }) => {
                            handle.mark_running();
                            let result = job.await;
                            handle.complete(result);
                        }
                        None => break,
                    }
                }
            });
        }

        queue
    }

    /// Submits `job` for background execution, returning the handle used by
    /// `wait_for_*`. Fails with `AtlNotEnabled`/`AtlQueueFull`/`AtlQueueInsert`
    /// per spec.md §7, never blocks the caller.
    pub fn submit<F>(&self, job: F) -> FamResult<Arc<WaitHandle>>
    where
        F: Future<Output = FamResult<()>> + Send + 'static,
    {
        if !self.enabled {
            return Err(FamError::AtlNotEnabled(
                "async copy/backup/restore queue is disabled".to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = WaitHandle::new(id);
        self.handles.write().insert(id, handle.clone());

        self.sender
            .try_send(Submission {
                handle: handle.clone(),
                job: Box::pin(job),
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    FamError::AtlQueueFull("async job queue is full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    FamError::AtlQueueInsert("async job queue is closed".to_string())
                }
            })?;

        Ok(handle)
    }

    pub fn get(&self, id: u64) -> FamResult<Arc<WaitHandle>> {
        self.handles
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| FamError::NotFound(format!("job handle {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submitted_job_completes_and_is_waitable() {
        let queue = AsyncJobQueue::new(2, 16, true);
        let handle = queue.submit(async { Ok(()) }).unwrap();
        handle.wait().await.unwrap();
        assert_eq!(handle.status(), JobStatusWire::Done);
    }

    #[tokio::test]
    async fn failed_job_surfaces_error_on_wait() {
        let queue = AsyncJobQueue::new(1, 16, true);
        let handle = queue
            .submit(async { Err(FamError::Fabric("peer unreachable".to_string())) })
            .unwrap();
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, FamError::Resource(_)));
    }

    #[tokio::test]
    async fn disabled_queue_rejects_submission() {
        let queue = AsyncJobQueue::new(1, 16, false);
        let err = queue.submit(async { Ok(()) }).unwrap_err();
        assert!(matches!(err, FamError::AtlNotEnabled(_)));
    }

    #[tokio::test]
    async fn full_queue_rejects_submission() {
        let queue = AsyncJobQueue::new(0, 1, true);
        // no consumers drain the channel, so the buffered slot of 1 fills
        // immediately and the next submission overflows it.
        let _h1 = queue.submit(async { Ok(()) }).unwrap();
        let err = queue.submit(async { Ok(()) }).unwrap_err();
        assert!(matches!(err, FamError::AtlQueueFull(_)));
    }
}
