//! Durable replay queue for mutations attempted while offline.
//!
//! ## Task lifecycle
//!
//! ```text
//! enqueue ──► Pending ──► InFlight ──► Completed (removed from the queue)
//!                ▲            │
//!                │            ├─ retryable, retries exhausted ──► Pending (run stops)
//!                │            └─ terminal ──► Failed (queue halts)
//!                └──────────── retry_failed(id)
//!                              acknowledge(id) removes a Failed task
//! ```
//!
//! Tasks replay strictly in creation order, one at a time. A `Failed` task
//! at the head blocks everything behind it until the caller acknowledges or
//! re-queues it. The whole queue is persisted to the [`LocalStore`] after
//! every transition; tasks found `InFlight` on open were interrupted by a
//! crash and go back to `Pending`. Replays carry the task's idempotency key so
//! the server can discard a duplicate delivery.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kisan_store::{LocalStore, LocalStoreExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::classify::ClassifiedError;
use crate::remote::{fetch_bounded, RemoteFetch, RemoteRequest};
use crate::retry::RetryPolicy;
use crate::{CoreError, UtcDateTime, ValidationError};

/// Store key holding the serialized queue.
pub const QUEUE_STATE_KEY: &str = "offline_queue/state";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// The deferred mutation: a POST body for an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub endpoint: String,
    pub body: Value,
}

impl SyncPayload {
    pub fn new(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: u64,
    pub idempotency_key: String,
    pub payload: SyncPayload,
    pub created_at: UtcDateTime,
    pub attempts: u32,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ClassifiedError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueState {
    next_id: u64,
    tasks: Vec<SyncTask>,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            next_id: 1,
            tasks: Vec::new(),
        }
    }
}

/// Outcome of one `sync()` run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Tasks delivered in this run, in replay order.
    pub completed: Vec<SyncTask>,
    /// Head task that kept failing with a retryable error and was put back.
    pub requeued: Option<SyncTask>,
    /// Terminally failed task blocking the queue.
    pub halted_on: Option<SyncTask>,
    /// Tasks still queued after the run.
    pub remaining: usize,
}

pub type ReplayFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ClassifiedError>> + Send + 'a>>;

/// Delivers one queued task.
pub trait SyncHandler: Send + Sync {
    fn replay<'a>(&'a self, task: &'a SyncTask) -> ReplayFuture<'a>;
}

/// Replays tasks as POSTs through a [`RemoteFetch`], sending the
/// idempotency key as a header.
#[derive(Debug)]
pub struct RemoteReplay<R> {
    remote: R,
    timeout: Duration,
}

impl<R: RemoteFetch> RemoteReplay<R> {
    pub fn new(remote: R, timeout: Duration) -> Self {
        Self { remote, timeout }
    }
}

impl<R: RemoteFetch> SyncHandler for RemoteReplay<R> {
    fn replay<'a>(&'a self, task: &'a SyncTask) -> ReplayFuture<'a> {
        Box::pin(async move {
            let request = RemoteRequest::post(&task.payload.endpoint, task.payload.body.clone())
                .with_idempotency_key(&task.idempotency_key)
                .with_timeout(self.timeout);
            fetch_bounded(&self.remote, request).await.map(|_| ())
        })
    }
}

pub struct OfflineSyncQueue {
    store: Arc<dyn LocalStore>,
    handler: Arc<dyn SyncHandler>,
    retry: RetryPolicy,
    state: Mutex<QueueState>,
    // Held for a whole sync run so runs never interleave; `state` is only
    // held for individual transitions so enqueue stays responsive.
    sync_gate: Mutex<()>,
}

impl OfflineSyncQueue {
    /// Load the queue from `store`, returning interrupted tasks to `Pending`.
    pub fn open(
        store: Arc<dyn LocalStore>,
        handler: Arc<dyn SyncHandler>,
        retry: RetryPolicy,
    ) -> Result<Self, CoreError> {
        let mut state = store
            .get_json::<QueueState>(QUEUE_STATE_KEY)?
            .unwrap_or_default();

        let recovered = recover(&mut state);
        if recovered > 0 {
            warn!(recovered, "returned interrupted sync tasks to pending");
            store.put_json(QUEUE_STATE_KEY, &state)?;
        }
        debug!(tasks = state.tasks.len(), "opened offline queue");

        Ok(Self {
            store,
            handler,
            retry,
            state: Mutex::new(state),
            sync_gate: Mutex::new(()),
        })
    }

    /// Queue a mutation. If a task with the same key is still `Pending` or
    /// `InFlight`, that task is returned and nothing new is queued.
    pub async fn enqueue(
        &self,
        idempotency_key: &str,
        payload: SyncPayload,
    ) -> Result<SyncTask, ClassifiedError> {
        let idempotency_key = idempotency_key.trim();
        if idempotency_key.is_empty() {
            return Err(ValidationError::EmptyIdempotencyKey.into());
        }

        let mut state = self.state.lock().await;
        if let Some(existing) = state.tasks.iter().find(|task| {
            task.idempotency_key == idempotency_key
                && matches!(task.status, SyncStatus::Pending | SyncStatus::InFlight)
        }) {
            debug!(id = existing.id, key = idempotency_key, "collapsed duplicate enqueue");
            return Ok(existing.clone());
        }

        let task = SyncTask {
            id: state.next_id,
            idempotency_key: idempotency_key.to_owned(),
            payload,
            created_at: UtcDateTime::now(),
            attempts: 0,
            status: SyncStatus::Pending,
            last_error: None,
        };
        state.next_id += 1;
        state.tasks.push(task.clone());

        if let Err(error) = self.persist(&state) {
            state.tasks.pop();
            state.next_id -= 1;
            return Err(error);
        }

        info!(id = task.id, key = idempotency_key, endpoint = %task.payload.endpoint, "queued mutation for replay");
        Ok(task)
    }

    /// Replay pending tasks in creation order until the queue is empty, a
    /// task fails terminally, or a task exhausts its retries.
    pub async fn sync(&self) -> Result<SyncReport, ClassifiedError> {
        let _run = self.sync_gate.lock().await;
        let mut report = SyncReport::default();

        loop {
            let Some(task) = self.begin_next(&mut report).await? else {
                break;
            };

            debug!(id = task.id, key = %task.idempotency_key, "replaying task");
            let attempts = AtomicU32::new(0);
            let outcome = self
                .retry
                .retry(|| {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    self.handler.replay(&task)
                })
                .await;

            let keep_going = self
                .finish(task.id, attempts.into_inner(), outcome, &mut report)
                .await?;
            if !keep_going {
                break;
            }
        }

        report.remaining = self.state.lock().await.tasks.len();
        Ok(report)
    }

    /// Marks the head task `InFlight` and returns it, or `None` when there is
    /// nothing to replay.
    async fn begin_next(&self, report: &mut SyncReport) -> Result<Option<SyncTask>, ClassifiedError> {
        let mut state = self.state.lock().await;
        let Some(head) = state.tasks.first_mut() else {
            return Ok(None);
        };

        if head.status == SyncStatus::Failed {
            warn!(id = head.id, "queue blocked by failed task");
            report.halted_on = Some(head.clone());
            return Ok(None);
        }

        let previous = head.status;
        head.status = SyncStatus::InFlight;
        let task = head.clone();

        if let Err(error) = self.persist(&state) {
            if let Some(head) = state.tasks.first_mut() {
                head.status = previous;
            }
            return Err(error);
        }
        Ok(Some(task))
    }

    async fn finish(
        &self,
        id: u64,
        attempts: u32,
        outcome: Result<(), ClassifiedError>,
        report: &mut SyncReport,
    ) -> Result<bool, ClassifiedError> {
        let mut state = self.state.lock().await;
        let Some(index) = state.tasks.iter().position(|task| task.id == id) else {
            return Ok(true);
        };

        let task = &mut state.tasks[index];
        task.attempts = task.attempts.saturating_add(attempts);

        let keep_going = match outcome {
            Ok(()) => {
                let mut task = state.tasks.remove(index);
                task.status = SyncStatus::Completed;
                task.last_error = None;
                info!(id, attempts = task.attempts, "replayed task");
                report.completed.push(task);
                true
            }
            Err(error) if error.retryable() => {
                warn!(id, kind = %error.kind(), "replay still failing, will retry on next sync");
                task.status = SyncStatus::Pending;
                task.last_error = Some(error);
                report.requeued = Some(task.clone());
                false
            }
            Err(error) => {
                warn!(id, kind = %error.kind(), error = %error, "replay failed terminally, halting queue");
                task.status = SyncStatus::Failed;
                task.last_error = Some(error);
                report.halted_on = Some(task.clone());
                false
            }
        };

        self.persist(&state)?;
        Ok(keep_going)
    }

    /// Remove a terminally failed task, unblocking the queue.
    pub async fn acknowledge(&self, id: u64) -> Result<SyncTask, ClassifiedError> {
        let mut state = self.state.lock().await;
        let index = find_failed(&state, id)?;
        let task = state.tasks.remove(index);
        if let Err(error) = self.persist(&state) {
            state.tasks.insert(index, task);
            return Err(error);
        }
        info!(id, "acknowledged failed task");
        Ok(task)
    }

    /// Put a terminally failed task back to `Pending` at its original position.
    pub async fn retry_failed(&self, id: u64) -> Result<SyncTask, ClassifiedError> {
        let mut state = self.state.lock().await;
        let index = find_failed(&state, id)?;
        state.tasks[index].status = SyncStatus::Pending;
        if let Err(error) = self.persist(&state) {
            state.tasks[index].status = SyncStatus::Failed;
            return Err(error);
        }
        info!(id, "re-queued failed task");
        Ok(state.tasks[index].clone())
    }

    /// Snapshot of all queued tasks in replay order.
    pub async fn list(&self) -> Vec<SyncTask> {
        self.state.lock().await.tasks.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.state
            .lock()
            .await
            .tasks
            .iter()
            .filter(|task| task.status == SyncStatus::Pending)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.tasks.is_empty()
    }

    fn persist(&self, state: &QueueState) -> Result<(), ClassifiedError> {
        self.store.put_json(QUEUE_STATE_KEY, state)?;
        Ok(())
    }
}

impl std::fmt::Debug for OfflineSyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineSyncQueue")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn recover(state: &mut QueueState) -> usize {
    let mut recovered = 0;
    for task in &mut state.tasks {
        if task.status == SyncStatus::InFlight {
            task.status = SyncStatus::Pending;
            recovered += 1;
        }
    }
    recovered
}

fn find_failed(state: &QueueState, id: u64) -> Result<usize, ClassifiedError> {
    let Some(index) = state.tasks.iter().position(|task| task.id == id) else {
        return Err(ClassifiedError::not_found(format!("no queued task with id {id}")));
    };
    let status = state.tasks[index].status;
    if status != SyncStatus::Failed {
        return Err(ClassifiedError::validation(format!(
            "task {id} is {}, only failed tasks can be acknowledged or retried",
            status.as_str()
        )));
    }
    Ok(index)
}
