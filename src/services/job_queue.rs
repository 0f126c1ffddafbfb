//! Job queue abstraction
//!
//! Callers submit payloads with `add` and get back a `JobHandle` they can
//! inspect or await; the unit of work is registered once with `process`.
//! Callers must not assume anything about when the handler runs, so the
//! in-process worker pool and the JetStream-backed queue are interchangeable.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_nats::jetstream::{self, Context as JsContext};
use async_nats::Client;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Finished records kept for introspection before the oldest are evicted
pub const DEFAULT_RETAINED_JOBS: usize = 200;

/// A unit of work that can travel through a queue
pub trait QueuePayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Queue-wide identifier of the job
    fn job_id(&self) -> Uuid;
    /// User allowed to remove the job while it waits
    fn owner_id(&self) -> Uuid;
}

/// Handler invoked for each dequeued payload
pub type JobFn<P> = Arc<
    dyn Fn(P, ProgressReporter) -> BoxFuture<'static, anyhow::Result<serde_json::Value>>
        + Send
        + Sync,
>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job {0} is already queued")]
    Duplicate(Uuid),
    #[error("job belongs to a different user")]
    NotOwner,
    #[error("job is {0:?} and can no longer be removed")]
    NotWaiting(QueueState),
    #[error("a handler is already registered")]
    HandlerAlreadyRegistered,
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("broker error: {0}")]
    Broker(String),
}

impl QueueError {
    fn broker(err: impl std::fmt::Display) -> Self {
        QueueError::Broker(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl QueueState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueState::Completed | QueueState::Failed)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "waiting" | "queued" | "pending" => Some(QueueState::Waiting),
            "active" | "processing" => Some(QueueState::Active),
            "completed" => Some(QueueState::Completed),
            "failed" => Some(QueueState::Failed),
            _ => None,
        }
    }
}

/// Introspectable state of one queued job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueJobRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub state: QueueState,
    /// 0-100
    pub progress: u8,
    pub added_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub result: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
}

impl QueueJobRecord {
    fn waiting(id: Uuid, owner_id: Uuid) -> Self {
        Self {
            id,
            owner_id,
            state: QueueState::Waiting,
            progress: 0,
            added_at: Utc::now(),
            started_at: None,
            finished_at: None,
            attempts: 0,
            result: None,
            failure_reason: None,
        }
    }
}

/// Reports handler progress; values above 100 are clamped
#[derive(Clone)]
pub struct ProgressReporter {
    tx: Option<Arc<watch::Sender<QueueJobRecord>>>,
}

impl ProgressReporter {
    /// Reporter not attached to any queue (direct runs, previews, tests)
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, percent: u32) {
        let percent = percent.min(100) as u8;
        if let Some(tx) = &self.tx {
            tx.send_modify(|record| record.progress = percent);
        }
    }

    pub fn current(&self) -> u8 {
        self.tx.as_ref().map_or(0, |tx| tx.borrow().progress)
    }
}

/// Caller-side view of a queued job
#[derive(Clone)]
pub struct JobHandle {
    id: Uuid,
    rx: watch::Receiver<QueueJobRecord>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> QueueJobRecord {
        self.rx.borrow().clone()
    }

    /// Resolves once the job is completed or failed
    pub async fn wait(mut self) -> QueueJobRecord {
        loop {
            {
                let record = self.rx.borrow_and_update();
                if record.state.is_terminal() {
                    return record.clone();
                }
            }
            if self.rx.changed().await.is_err() {
                // Record evicted; the last value is final
                return self.rx.borrow().clone();
            }
        }
    }
}

#[async_trait]
pub trait JobQueue<P: QueuePayload>: Send + Sync {
    /// Durable submission; returns before or after the handler runs
    async fn add(&self, payload: P) -> Result<JobHandle, QueueError>;

    /// Register the unit-of-work function and start consuming
    async fn process(&self, handler: JobFn<P>) -> Result<(), QueueError>;

    fn get_job(&self, id: Uuid) -> Option<JobHandle>;

    fn list(&self, state: QueueState) -> Vec<QueueJobRecord>;

    /// Remove a waiting job. `Ok(false)` when the id is unknown.
    fn remove(&self, id: Uuid, caller: Uuid) -> Result<bool, QueueError>;
}

// ==========================================================================
// Shared job table
// ==========================================================================

#[derive(Default)]
struct TableState {
    entries: HashMap<Uuid, Arc<watch::Sender<QueueJobRecord>>>,
    finished: VecDeque<Uuid>,
}

struct JobTable {
    state: Mutex<TableState>,
    retain_finished: usize,
}

impl JobTable {
    fn new(retain_finished: usize) -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            retain_finished: retain_finished.max(1),
        }
    }

    fn insert_waiting(&self, id: Uuid, owner_id: Uuid) -> Result<JobHandle, QueueError> {
        let mut state = self.state.lock();
        if state.entries.contains_key(&id) {
            return Err(QueueError::Duplicate(id));
        }
        let (tx, rx) = watch::channel(QueueJobRecord::waiting(id, owner_id));
        state.entries.insert(id, Arc::new(tx));
        Ok(JobHandle { id, rx })
    }

    /// Known entry, or a fresh waiting one (jobs added by another instance)
    fn ensure(&self, id: Uuid, owner_id: Uuid) {
        let mut state = self.state.lock();
        state.entries.entry(id).or_insert_with(|| {
            let (tx, _rx) = watch::channel(QueueJobRecord::waiting(id, owner_id));
            Arc::new(tx)
        });
    }

    fn sender(&self, id: Uuid) -> Option<Arc<watch::Sender<QueueJobRecord>>> {
        self.state.lock().entries.get(&id).cloned()
    }

    fn handle(&self, id: Uuid) -> Option<JobHandle> {
        self.sender(id).map(|tx| JobHandle {
            id,
            rx: tx.subscribe(),
        })
    }

    fn snapshot(&self, id: Uuid) -> Option<QueueJobRecord> {
        self.sender(id).map(|tx| tx.borrow().clone())
    }

    fn reporter(&self, id: Uuid) -> ProgressReporter {
        ProgressReporter {
            tx: self.sender(id),
        }
    }

    fn list(&self, state: QueueState) -> Vec<QueueJobRecord> {
        let table = self.state.lock();
        let mut records: Vec<QueueJobRecord> = table
            .entries
            .values()
            .map(|tx| tx.borrow().clone())
            .filter(|r| r.state == state)
            .collect();
        records.sort_by_key(|r| r.added_at);
        records
    }

    /// Waiting -> Active. Returns false when the job is not waiting.
    fn activate(&self, id: Uuid) -> bool {
        let Some(tx) = self.sender(id) else {
            return false;
        };
        let mut activated = false;
        tx.send_modify(|record| {
            if record.state == QueueState::Waiting {
                record.state = QueueState::Active;
                record.started_at = Some(Utc::now());
                record.attempts += 1;
                activated = true;
            }
        });
        activated
    }

    fn finish(&self, id: Uuid, outcome: Result<serde_json::Value, String>) {
        let Some(tx) = self.sender(id) else {
            return;
        };
        tx.send_modify(|record| {
            record.finished_at = Some(Utc::now());
            match outcome {
                Ok(value) => {
                    record.state = QueueState::Completed;
                    record.progress = 100;
                    record.result = Some(value);
                }
                Err(reason) => {
                    record.state = QueueState::Failed;
                    record.failure_reason = Some(reason);
                }
            }
        });

        let mut state = self.state.lock();
        state.finished.push_back(id);
        while state.finished.len() > self.retain_finished {
            if let Some(evicted) = state.finished.pop_front() {
                state.entries.remove(&evicted);
            }
        }
    }

    /// Owner-checked removal of a waiting job; marks its record failed
    fn remove_waiting(&self, id: Uuid, caller: Uuid) -> Result<bool, QueueError> {
        let Some(record) = self.snapshot(id) else {
            return Ok(false);
        };
        if record.owner_id != caller {
            return Err(QueueError::NotOwner);
        }
        if record.state != QueueState::Waiting {
            return Err(QueueError::NotWaiting(record.state));
        }
        self.finish(id, Err("removed from queue".to_string()));
        Ok(true)
    }
}

/// Run the handler on its own task so a panic fails only this job
async fn run_handler<P: QueuePayload>(
    handler: JobFn<P>,
    payload: P,
    reporter: ProgressReporter,
) -> Result<serde_json::Value, String> {
    match tokio::spawn(handler(payload, reporter)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(join) => Err(format!("handler panicked: {}", join)),
    }
}

// ==========================================================================
// In-process queue
// ==========================================================================

struct InProcessInner<P> {
    table: JobTable,
    waiting: Mutex<VecDeque<(Uuid, P)>>,
    notify: Notify,
    shutdown: CancellationToken,
    handler: Mutex<Option<JobFn<P>>>,
}

/// Single-process queue: a FIFO drained by a fixed number of tokio workers
pub struct InProcessQueue<P> {
    inner: Arc<InProcessInner<P>>,
    concurrency: usize,
}

impl<P: QueuePayload> InProcessQueue<P> {
    pub fn new(concurrency: usize) -> Self {
        Self::with_retention(concurrency, DEFAULT_RETAINED_JOBS)
    }

    pub fn with_retention(concurrency: usize, retain_finished: usize) -> Self {
        Self {
            inner: Arc::new(InProcessInner {
                table: JobTable::new(retain_finished),
                waiting: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                shutdown: CancellationToken::new(),
                handler: Mutex::new(None),
            }),
            concurrency: concurrency.max(1),
        }
    }

    /// Stop the workers after their current job
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    async fn worker(inner: Arc<InProcessInner<P>>, handler: JobFn<P>, worker_id: usize) {
        debug!("Queue worker {} started", worker_id);
        loop {
            if inner.shutdown.is_cancelled() {
                break;
            }
            let next = inner.waiting.lock().pop_front();
            let Some((id, payload)) = next else {
                tokio::select! {
                    _ = inner.notify.notified() => continue,
                    _ = inner.shutdown.cancelled() => break,
                }
            };

            if !inner.table.activate(id) {
                continue;
            }
            let reporter = inner.table.reporter(id);
            let outcome = run_handler(handler.clone(), payload, reporter).await;
            if let Err(reason) = &outcome {
                warn!("Queued job {} failed: {}", id, reason);
            }
            inner.table.finish(id, outcome);
        }
        debug!("Queue worker {} stopped", worker_id);
    }
}

#[async_trait]
impl<P: QueuePayload> JobQueue<P> for InProcessQueue<P> {
    async fn add(&self, payload: P) -> Result<JobHandle, QueueError> {
        let id = payload.job_id();
        let handle = self.inner.table.insert_waiting(id, payload.owner_id())?;
        self.inner.waiting.lock().push_back((id, payload));
        self.inner.notify.notify_one();
        Ok(handle)
    }

    async fn process(&self, handler: JobFn<P>) -> Result<(), QueueError> {
        {
            let mut registered = self.inner.handler.lock();
            if registered.is_some() {
                return Err(QueueError::HandlerAlreadyRegistered);
            }
            *registered = Some(handler.clone());
        }

        for worker_id in 0..self.concurrency {
            tokio::spawn(Self::worker(self.inner.clone(), handler.clone(), worker_id));
        }
        // Wake workers for anything added before registration
        for _ in 0..self.inner.waiting.lock().len() {
            self.inner.notify.notify_one();
        }
        info!("In-process queue started with {} workers", self.concurrency);
        Ok(())
    }

    fn get_job(&self, id: Uuid) -> Option<JobHandle> {
        self.inner.table.handle(id)
    }

    fn list(&self, state: QueueState) -> Vec<QueueJobRecord> {
        self.inner.table.list(state)
    }

    fn remove(&self, id: Uuid, caller: Uuid) -> Result<bool, QueueError> {
        let mut waiting = self.inner.waiting.lock();
        let removed = self.inner.table.remove_waiting(id, caller)?;
        if removed {
            waiting.retain(|(queued, _)| *queued != id);
        }
        Ok(removed)
    }
}

// ==========================================================================
// JetStream queue
// ==========================================================================

/// Stream, consumer and subject names of a JetStream-backed queue
#[derive(Debug, Clone)]
pub struct JetStreamNames {
    pub stream: String,
    pub consumer: String,
    pub subject: String,
    pub status_prefix: String,
}

/// Queue backed by a JetStream work-queue stream. Status changes are also
/// published to `{status_prefix}.{job_id}`.
pub struct JetStreamQueue<P> {
    client: Client,
    js: JsContext,
    names: JetStreamNames,
    concurrency: usize,
    table: Arc<JobTable>,
    shutdown: CancellationToken,
    _payload: std::marker::PhantomData<fn() -> P>,
}

impl<P: QueuePayload> JetStreamQueue<P> {
    /// Create the queue, initializing the JetStream stream
    pub async fn new(
        client: Client,
        names: JetStreamNames,
        concurrency: usize,
    ) -> Result<Self, QueueError> {
        let js = jetstream::new(client.clone());

        let stream_config = jetstream::stream::Config {
            name: names.stream.clone(),
            subjects: vec![names.subject.clone()],
            max_messages: 10_000,
            max_bytes: 64 * 1024 * 1024,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };
        js.get_or_create_stream(stream_config)
            .await
            .map_err(QueueError::broker)?;
        info!("JetStream stream '{}' ready", names.stream);

        Ok(Self {
            client,
            js,
            names,
            concurrency: concurrency.max(1),
            table: Arc::new(JobTable::new(DEFAULT_RETAINED_JOBS)),
            shutdown: CancellationToken::new(),
            _payload: std::marker::PhantomData,
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Forward every record change of one job to its status subject
    fn spawn_status_publisher(&self, id: Uuid) {
        let Some(tx) = self.table.sender(id) else {
            return;
        };
        let mut rx = tx.subscribe();
        drop(tx);
        let client = self.client.clone();
        let subject = format!("{}.{}", self.names.status_prefix, id);

        tokio::spawn(async move {
            loop {
                let record = rx.borrow_and_update().clone();
                match serde_json::to_vec(&record) {
                    Ok(payload) => {
                        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                            warn!("Failed to publish status for job {}: {}", id, e);
                        }
                    }
                    Err(e) => error!("Failed to serialize status for job {}: {}", id, e),
                }
                if record.state.is_terminal() || rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    async fn consume(
        self_table: Arc<JobTable>,
        messages: jetstream::consumer::pull::Stream,
        handler: JobFn<P>,
        concurrency: usize,
        shutdown: CancellationToken,
    ) {
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut messages = messages;

        loop {
            let next = tokio::select! {
                next = messages.next() => next,
                _ = shutdown.cancelled() => break,
            };
            let Some(msg) = next else {
                break;
            };
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    error!("Error receiving queued job: {}", e);
                    continue;
                }
            };

            let payload: P = match serde_json::from_slice(&msg.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Dropping undecodable queued job: {}", e);
                    if let Err(e) = msg.ack().await {
                        error!("Failed to ack undecodable job: {:?}", e);
                    }
                    continue;
                }
            };

            let id = payload.job_id();
            self_table.ensure(id, payload.owner_id());
            if !self_table.activate(id) {
                // Removed while waiting, or a redelivery of a finished job
                debug!("Skipping queued job {} (not waiting)", id);
                if let Err(e) = msg.ack().await {
                    error!("Failed to ack skipped job {}: {:?}", id, e);
                }
                continue;
            }

            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let table = self_table.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let reporter = table.reporter(id);
                let outcome = run_handler(handler, payload, reporter).await;
                if let Err(reason) = &outcome {
                    warn!("Queued job {} failed: {}", id, reason);
                }
                table.finish(id, outcome);
                // Ack failures too; the handler records permanent failures itself
                if let Err(e) = msg.ack().await {
                    error!("Failed to ack job {}: {:?}", id, e);
                }
                drop(permit);
            });
        }
        info!("JetStream consumer stopped");
    }
}

#[async_trait]
impl<P: QueuePayload> JobQueue<P> for JetStreamQueue<P> {
    async fn add(&self, payload: P) -> Result<JobHandle, QueueError> {
        let id = payload.job_id();
        let bytes = serde_json::to_vec(&payload)?;
        let handle = self.table.insert_waiting(id, payload.owner_id())?;
        self.spawn_status_publisher(id);

        let publish = async {
            self.js
                .publish(self.names.subject.clone(), bytes.into())
                .await
                .map_err(QueueError::broker)?
                .await
                .map_err(QueueError::broker)
        };
        if let Err(e) = publish.await {
            self.table.finish(id, Err(e.to_string()));
            return Err(e);
        }

        info!("Job {} published to '{}'", id, self.names.subject);
        Ok(handle)
    }

    async fn process(&self, handler: JobFn<P>) -> Result<(), QueueError> {
        let stream = self
            .js
            .get_stream(&self.names.stream)
            .await
            .map_err(QueueError::broker)?;

        let consumer_config = jetstream::consumer::pull::Config {
            durable_name: Some(self.names.consumer.clone()),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            max_deliver: 3,
            filter_subject: self.names.subject.clone(),
            ..Default::default()
        };
        let consumer = stream
            .get_or_create_consumer(&self.names.consumer, consumer_config)
            .await
            .map_err(QueueError::broker)?;
        info!("JetStream consumer '{}' ready", self.names.consumer);

        let messages = consumer.messages().await.map_err(QueueError::broker)?;
        tokio::spawn(Self::consume(
            self.table.clone(),
            messages,
            handler,
            self.concurrency,
            self.shutdown.clone(),
        ));
        Ok(())
    }

    fn get_job(&self, id: Uuid) -> Option<JobHandle> {
        self.table.handle(id)
    }

    fn list(&self, state: QueueState) -> Vec<QueueJobRecord> {
        self.table.list(state)
    }

    fn remove(&self, id: Uuid, caller: Uuid) -> Result<bool, QueueError> {
        // The message stays in the stream; the consumer acks and skips it
        self.table.remove_waiting(id, caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Task {
        id: Uuid,
        owner: Uuid,
        value: u32,
    }

    impl QueuePayload for Task {
        fn job_id(&self) -> Uuid {
            self.id
        }
        fn owner_id(&self) -> Uuid {
            self.owner
        }
    }

    fn task(value: u32) -> Task {
        Task {
            id: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            value,
        }
    }

    fn doubling_handler() -> JobFn<Task> {
        Arc::new(|task: Task, progress: ProgressReporter| {
            async move {
                progress.report(50);
                if task.value == 0 {
                    anyhow::bail!("zero is not allowed");
                }
                Ok(serde_json::json!({ "doubled": task.value * 2 }))
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_add_then_wait_returns_result() {
        let queue = InProcessQueue::new(2);
        queue.process(doubling_handler()).await.unwrap();

        let handle = queue.add(task(21)).await.unwrap();
        let record = handle.wait().await;

        assert_eq!(record.state, QueueState::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.attempts, 1);
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_some());
        assert_eq!(record.result, Some(serde_json::json!({ "doubled": 42 })));
    }

    #[tokio::test]
    async fn test_handler_error_marks_failed() {
        let queue = InProcessQueue::new(1);
        queue.process(doubling_handler()).await.unwrap();

        let record = queue.add(task(0)).await.unwrap().wait().await;
        assert_eq!(record.state, QueueState::Failed);
        assert_eq!(record.failure_reason.as_deref(), Some("zero is not allowed"));
        assert_eq!(record.progress, 50);
    }

    #[tokio::test]
    async fn test_jobs_added_before_process_are_run() {
        let queue = InProcessQueue::new(1);
        let handle = queue.add(task(1)).await.unwrap();
        assert_eq!(handle.snapshot().state, QueueState::Waiting);
        assert_eq!(queue.list(QueueState::Waiting).len(), 1);

        queue.process(doubling_handler()).await.unwrap();
        let record = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
        assert_eq!(record.state, QueueState::Completed);
        assert!(queue.list(QueueState::Waiting).is_empty());
        assert_eq!(queue.list(QueueState::Completed).len(), 1);
    }

    #[tokio::test]
    async fn test_remove_waiting_job_checks_owner() {
        let queue: InProcessQueue<Task> = InProcessQueue::new(1);
        let job = task(5);
        let handle = queue.add(job.clone()).await.unwrap();
        let mut waiter = tokio_test::task::spawn(handle.wait());
        assert_pending!(waiter.poll());

        assert!(matches!(
            queue.remove(job.id, Uuid::new_v4()),
            Err(QueueError::NotOwner)
        ));
        assert_pending!(waiter.poll());
        assert!(queue.remove(job.id, job.owner).unwrap());
        assert!(!queue.remove(Uuid::new_v4(), job.owner).unwrap());

        // Removal wakes whoever waits on the job
        assert!(waiter.is_woken());
        let record = assert_ready!(waiter.poll());
        assert_eq!(record.state, QueueState::Failed);
        assert_eq!(record.attempts, 0);

        // The removed payload never reaches the handler
        queue.process(doubling_handler()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.list(QueueState::Completed).is_empty());
    }

    #[tokio::test]
    async fn test_active_job_cannot_be_removed() {
        let queue = InProcessQueue::new(1);
        let release = Arc::new(Notify::new());
        let gate = release.clone();
        let handler: JobFn<Task> = Arc::new(move |_task: Task, _progress: ProgressReporter| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok::<_, anyhow::Error>(serde_json::Value::Null)
            }
            .boxed()
        });
        queue.process(handler).await.unwrap();

        let job = task(1);
        let handle = queue.add(job.clone()).await.unwrap();
        while handle.snapshot().state != QueueState::Active {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(matches!(
            queue.remove(job.id, job.owner),
            Err(QueueError::NotWaiting(QueueState::Active))
        ));
        release.notify_one();
        assert_eq!(handle.wait().await.state, QueueState::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected_and_second_handler_refused() {
        let queue = InProcessQueue::new(1);
        let job = task(3);
        queue.add(job.clone()).await.unwrap();
        assert!(matches!(
            queue.add(job).await,
            Err(QueueError::Duplicate(_))
        ));

        queue.process(doubling_handler()).await.unwrap();
        assert!(matches!(
            queue.process(doubling_handler()).await,
            Err(QueueError::HandlerAlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn test_finished_records_are_bounded() {
        let queue = InProcessQueue::with_retention(1, 2);
        queue.process(doubling_handler()).await.unwrap();

        let mut ids = vec![];
        for value in 1..=3 {
            let handle = queue.add(task(value)).await.unwrap();
            ids.push(handle.id());
            handle.wait().await;
        }

        assert!(queue.get_job(ids[0]).is_none());
        assert!(queue.get_job(ids[2]).is_some());
        assert_eq!(queue.list(QueueState::Completed).len(), 2);
    }

    #[test]
    fn test_progress_reporter_clamps() {
        let (tx, _rx) = watch::channel(QueueJobRecord::waiting(Uuid::new_v4(), Uuid::new_v4()));
        let reporter = ProgressReporter {
            tx: Some(Arc::new(tx)),
        };
        reporter.report(250);
        assert_eq!(reporter.current(), 100);
        ProgressReporter::detached().report(10);
    }

    #[test]
    fn test_queue_state_parse() {
        assert_eq!(QueueState::parse("Pending"), Some(QueueState::Waiting));
        assert_eq!(QueueState::parse("active"), Some(QueueState::Active));
        assert_eq!(QueueState::parse("unknown"), None);
    }
}
