//! Batch jobs submitted over HTTP.
//!
//! Jobs go onto a bounded queue drained by a single worker task, so at most
//! one batch talks to the Work API at any time. Job state is kept in a
//! cache; a job never expires while it is queued or running, and finished
//! jobs stay available for polling and export for [`JOB_TTL`].

use crate::batch::{BatchLookupWorkflow, BatchOutcome, ProgressObserver};
use crate::cpf::Cpf;
use crate::errors::AppError;
use crate::models::{BatchJobView, JobStatus, LookupRecord, Progress};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How long a job stays queryable after it finished.
pub const JOB_TTL: Duration = Duration::from_secs(60 * 60);

struct JobState {
    status: JobStatus,
    progress: Progress,
    finished_at: Option<DateTime<Utc>>,
    results: Vec<LookupRecord>,
}

/// One submitted batch. Only the worker writes to it.
pub struct BatchJob {
    id: Uuid,
    created_at: DateTime<Utc>,
    cancel: CancellationToken,
    state: RwLock<JobState>,
}

impl BatchJob {
    fn new(total: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            cancel: CancellationToken::new(),
            state: RwLock::new(JobState {
                status: JobStatus::Queued,
                progress: Progress { current: 0, total },
                finished_at: None,
                results: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.read(|s| s.status)
    }

    pub fn results(&self) -> Vec<LookupRecord> {
        self.read(|s| s.results.clone())
    }

    pub fn is_finished(&self) -> bool {
        self.read(|s| s.finished_at.is_some())
    }

    /// Requests cancellation; the worker stops before the next CPF.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn view(&self) -> BatchJobView {
        self.read(|s| BatchJobView {
            id: self.id,
            status: s.status,
            progress: s.progress,
            created_at: self.created_at,
            finished_at: s.finished_at,
            results: s.results.clone(),
        })
    }

    fn read<T>(&self, f: impl FnOnce(&JobState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, f: impl FnOnce(&mut JobState)) {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner))
    }

    fn mark_running(&self) {
        self.write(|s| s.status = JobStatus::Running);
    }

    fn set_progress(&self, current: usize, total: usize) {
        self.write(|s| s.progress = Progress { current, total });
    }

    fn push_result(&self, record: &LookupRecord) {
        self.write(|s| s.results.push(record.clone()));
    }

    fn finish(&self, outcome: BatchOutcome) {
        self.write(|s| {
            s.status = if outcome.cancelled {
                JobStatus::Cancelled
            } else {
                JobStatus::Completed
            };
            s.results = outcome.records;
            s.finished_at = Some(Utc::now());
        });
    }
}

/// Starts a job's expiry clock only once it has finished.
struct JobExpiry {
    ttl: Duration,
}

impl JobExpiry {
    fn remaining(&self, job: &BatchJob) -> Option<Duration> {
        job.is_finished().then_some(self.ttl)
    }
}

impl Expiry<Uuid, Arc<BatchJob>> for JobExpiry {
    fn expire_after_create(
        &self,
        _id: &Uuid,
        job: &Arc<BatchJob>,
        _created_at: Instant,
    ) -> Option<Duration> {
        self.remaining(job)
    }

    fn expire_after_update(
        &self,
        _id: &Uuid,
        job: &Arc<BatchJob>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        self.remaining(job)
    }
}

/// Job lookup by id. Finished jobs expire `ttl` after completion.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Cache<Uuid, Arc<BatchJob>>,
}

impl JobRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: Cache::builder()
                .max_capacity(10_000)
                .expire_after(JobExpiry { ttl })
                .build(),
        }
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<BatchJob>> {
        self.jobs.get(id).await
    }

    async fn insert(&self, job: Arc<BatchJob>) {
        self.jobs.insert(job.id, job).await;
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(JOB_TTL)
    }
}

struct QueuedBatch {
    job: Arc<BatchJob>,
    cpfs: Vec<Cpf>,
}

/// Submission side of the batch queue.
#[derive(Clone)]
pub struct BatchQueue {
    sender: mpsc::Sender<QueuedBatch>,
    registry: JobRegistry,
}

impl BatchQueue {
    /// Creates the queue and spawns its single worker.
    pub fn start(
        workflow: BatchLookupWorkflow,
        capacity: usize,
        registry: JobRegistry,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let handle = tokio::spawn(run_worker(workflow, receiver, registry.clone()));
        (Self { sender, registry }, handle)
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Registers a job for `cpfs` and queues it, waiting while the queue is full.
    pub async fn submit(&self, cpfs: Vec<Cpf>) -> Result<Arc<BatchJob>, AppError> {
        let total = cpfs.len();
        let job = Arc::new(BatchJob::new(total));
        self.registry.insert(job.clone()).await;

        self.sender
            .send(QueuedBatch {
                job: job.clone(),
                cpfs,
            })
            .await
            .map_err(|_| AppError::InternalError("Batch worker is not running".to_string()))?;

        tracing::info!("Queued batch job {} ({} CPF(s))", job.id, total);
        Ok(job)
    }

    /// Cancels a job; returns `None` when the id is unknown or expired.
    pub async fn cancel(&self, id: &Uuid) -> Option<Arc<BatchJob>> {
        let job = self.registry.get(id).await?;
        job.cancel();
        tracing::info!("Cancellation requested for batch job {}", id);
        Some(job)
    }
}

/// Mirrors a running batch into its job so polls see partial results.
struct JobObserver<'a>(&'a BatchJob);

impl ProgressObserver for JobObserver<'_> {
    fn on_progress(&self, current: usize, total: usize) {
        self.0.set_progress(current, total);
    }

    fn on_record(&self, record: &LookupRecord) {
        self.0.push_result(record);
    }
}

async fn run_worker(
    workflow: BatchLookupWorkflow,
    mut receiver: mpsc::Receiver<QueuedBatch>,
    registry: JobRegistry,
) {
    tracing::info!("Batch worker started");

    while let Some(QueuedBatch { job, cpfs }) = receiver.recv().await {
        job.mark_running();
        tracing::info!("Running batch job {}", job.id);

        let outcome = workflow
            .run_prepared(cpfs, &JobObserver(&job), &job.cancel)
            .await;
        job.finish(outcome);
        // Re-insert so the expiry clock starts now
        registry.insert(job.clone()).await;

        tracing::info!("Batch job {} finished as {:?}", job.id, job.status());
    }

    tracing::info!("Batch worker stopped: queue closed");
}
