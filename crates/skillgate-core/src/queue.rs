//! Priority job queue and bounded worker pool.
//!
//! A single dispatcher task pulls jobs highest-priority-first (FIFO within a
//! priority) and hands each to a worker task once a concurrency permit is
//! free. No queue lock is held while a job executes.
//!
//! Every job is written to the [`JobStore`] before it becomes visible to the
//! dispatcher, and the dispatcher re-queues whatever the store still holds
//! as unfinished before it takes its first job.
//!
//! Retryable failures are re-queued after the job's backoff; every other
//! outcome is terminal and is recorded in bounded retention rings so that
//! `status` can answer for recently finished jobs.
//!
//! Shutdown is a drain: `close` stops new enqueues, queued and in-flight jobs
//! run to completion, and the dispatcher exits once nothing is left. Pending
//! retry sleeps are abandoned when the pool's cancellation token fires; their
//! waiters see the last error and the store keeps the job for the next start.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skillgate_contracts::{
    error::{GovernanceError, GovernanceResult},
    job::{Job, JobId, JobStatus},
};

use crate::lock;
use crate::traits::JobStore;

/// Final result of a job, delivered to synchronous waiters.
pub type JobOutcome = GovernanceResult<Value>;

/// Runs one attempt of a job. Implemented by the kernel.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> JobOutcome;
}

struct QueuedJob {
    priority: u8,
    seq: u64,
    job: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    // Max-heap: higher priority first, then lower sequence number.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedJob>,
    next_seq: u64,
    statuses: HashMap<JobId, JobStatus>,
    completed: VecDeque<JobId>,
    failed: VecDeque<JobId>,
}

pub struct JobQueue {
    state: Mutex<QueueState>,
    waiters: Mutex<HashMap<JobId, oneshot::Sender<JobOutcome>>>,
    store: Arc<dyn JobStore>,
    notify: Notify,
    accepting: AtomicBool,
    running: AtomicUsize,
    /// Jobs sleeping before a retry.
    delayed: AtomicUsize,
    retain_completed: usize,
    retain_failed: usize,
}

impl JobQueue {
    pub fn new(retain_completed: usize, retain_failed: usize, store: Arc<dyn JobStore>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            waiters: Mutex::new(HashMap::new()),
            store,
            notify: Notify::new(),
            accepting: AtomicBool::new(true),
            running: AtomicUsize::new(0),
            delayed: AtomicUsize::new(0),
            retain_completed,
            retain_failed,
        }
    }

    /// Persist the job, then make it visible to the dispatcher.
    ///
    /// # Errors
    ///
    /// `QueueClosed` once `close` was called, `JobStoreFailed` if the job
    /// could not be persisted. In both cases the job will never run.
    pub async fn enqueue(&self, job: Job) -> GovernanceResult<JobId> {
        if !self.is_accepting() {
            return Err(GovernanceError::QueueClosed);
        }
        self.store.save(&job).await?;
        let id = job.id.clone();
        debug!(job_id = %id, skill_id = %job.skill_id, priority = job.priority, "job queued");
        self.push_new(job);
        Ok(id)
    }

    /// Re-queue every job the store holds as unfinished. Returns how many
    /// were added; jobs this queue already knows are skipped.
    pub async fn restore(&self) -> GovernanceResult<usize> {
        let jobs = self.store.load_unfinished().await?;
        Ok(jobs.into_iter().filter(|job| self.push_new(job.clone())).count())
    }

    /// Register interest in a job's final outcome. Call before `enqueue`.
    pub fn subscribe(&self, job_id: &JobId) -> oneshot::Receiver<JobOutcome> {
        let (tx, rx) = oneshot::channel();
        lock(&self.waiters).insert(job_id.clone(), tx);
        rx
    }

    pub fn unsubscribe(&self, job_id: &JobId) {
        lock(&self.waiters).remove(job_id);
    }

    pub fn status(&self, job_id: &JobId) -> JobStatus {
        lock(&self.state).statuses.get(job_id).cloned().unwrap_or(JobStatus::Unknown)
    }

    /// Jobs waiting to run, including those sleeping before a retry.
    pub fn pending(&self) -> usize {
        lock(&self.state).heap.len() + self.delayed.load(AtomicOrdering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(AtomicOrdering::SeqCst)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(AtomicOrdering::SeqCst)
    }

    /// Stop accepting new jobs. Already queued jobs still run.
    pub fn close(&self) {
        self.accepting.store(false, AtomicOrdering::SeqCst);
        self.notify.notify_one();
    }

    /// Queue a job seen for the first time. Returns false if it is already known.
    fn push_new(&self, job: Job) -> bool {
        {
            let mut state = lock(&self.state);
            if state.statuses.contains_key(&job.id) {
                return false;
            }
            Self::push_locked(&mut state, job);
        }
        self.notify.notify_one();
        true
    }

    fn push(&self, job: Job) {
        Self::push_locked(&mut lock(&self.state), job);
        self.notify.notify_one();
    }

    fn push_locked(state: &mut QueueState, job: Job) {
        let seq = state.next_seq;
        state.next_seq += 1;
        state.statuses.insert(job.id.clone(), JobStatus::Queued);
        state.heap.push(QueuedJob { priority: job.priority, seq, job });
    }

    fn pop(&self) -> Option<Job> {
        lock(&self.state).heap.pop().map(|queued| queued.job)
    }

    fn is_drained(&self) -> bool {
        !self.is_accepting()
            && self.running() == 0
            && self.delayed.load(AtomicOrdering::SeqCst) == 0
            && lock(&self.state).heap.is_empty()
    }

    fn mark_running(&self, job: &Job) {
        self.running.fetch_add(1, AtomicOrdering::SeqCst);
        lock(&self.state)
            .statuses
            .insert(job.id.clone(), JobStatus::Running { attempt: job.attempts_made });
    }

    fn mark_stopped(&self) {
        self.running.fetch_sub(1, AtomicOrdering::SeqCst);
        self.notify.notify_one();
    }

    /// Record the terminal outcome and wake any synchronous waiter.
    fn finish(&self, job_id: &JobId, outcome: JobOutcome) {
        let finished_at = Utc::now();
        {
            let mut state = lock(&self.state);
            let (status, limit) = match &outcome {
                Ok(_) => (JobStatus::Completed { finished_at }, self.retain_completed),
                Err(err) => (
                    JobStatus::Failed { finished_at, error: err.to_string() },
                    self.retain_failed,
                ),
            };
            state.statuses.insert(job_id.clone(), status);

            let QueueState { statuses, completed, failed, .. } = &mut *state;
            let ring = if outcome.is_ok() { completed } else { failed };
            ring.push_back(job_id.clone());
            while ring.len() > limit {
                if let Some(evicted) = ring.pop_front() {
                    statuses.remove(&evicted);
                }
            }
        }

        if let Some(tx) = lock(&self.waiters).remove(job_id) {
            if tx.send(outcome).is_err() {
                debug!(job_id = %job_id, "waiter already gone");
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, job: Job, delay: Duration, err: GovernanceError, cancel: CancellationToken) {
        self.delayed.fetch_add(1, AtomicOrdering::SeqCst);
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    queue.push(job);
                }
                _ = cancel.cancelled() => {
                    warn!(job_id = %job.id, "retry abandoned on shutdown, kept in job store");
                    queue.finish(&job.id, Err(err));
                }
            }
            queue.delayed.fetch_sub(1, AtomicOrdering::SeqCst);
            queue.notify.notify_one();
        });
    }
}

/// The dispatcher and its workers.
pub struct WorkerPool;

impl WorkerPool {
    /// Spawn the dispatcher. It first re-queues unfinished jobs from the
    /// store; the returned handle completes once the queue is closed and
    /// drained.
    pub fn spawn(
        queue: Arc<JobQueue>,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let concurrency = concurrency.max(1);
        tokio::spawn(async move {
            match queue.restore().await {
                Ok(0) => {}
                Ok(restored) => info!(restored, "restored unfinished jobs"),
                Err(e) => warn!(error = %e, "could not restore unfinished jobs"),
            }
            info!(concurrency, "worker pool started");
            let semaphore = Arc::new(Semaphore::new(concurrency));
            let mut workers = JoinSet::new();

            loop {
                while let Some(joined) = workers.try_join_next() {
                    if let Err(e) = joined {
                        warn!(error = %e, "worker task aborted");
                    }
                }

                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };

                let next = loop {
                    if let Some(job) = queue.pop() {
                        break Some(job);
                    }
                    if queue.is_drained() {
                        break None;
                    }
                    queue.notify.notified().await;
                };
                let Some(job) = next else {
                    break;
                };

                let queue = Arc::clone(&queue);
                let handler = Arc::clone(&handler);
                let cancel = cancel.clone();
                workers.spawn(async move {
                    let _permit = permit;
                    run_job(queue, handler, job, cancel).await;
                });
            }

            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "worker task aborted");
                }
            }
            info!("worker pool drained");
        })
    }
}

async fn run_job(queue: Arc<JobQueue>, handler: Arc<dyn JobHandler>, mut job: Job, cancel: CancellationToken) {
    job.attempts_made += 1;
    queue.mark_running(&job);
    debug!(job_id = %job.id, skill_id = %job.skill_id, attempt = job.attempts_made, "job started");
    if let Err(e) = queue.store.mark_running(&job.id, job.attempts_made).await {
        warn!(job_id = %job.id, error = %e, "job store update failed");
    }

    // A panicking handler must still leave the running set.
    let attempt = {
        let handler = Arc::clone(&handler);
        let job = job.clone();
        tokio::spawn(async move { handler.handle(&job).await })
    };
    let outcome = attempt.await.unwrap_or_else(|e| {
        warn!(job_id = %job.id, skill_id = %job.skill_id, error = %e, "job handler aborted");
        Err(GovernanceError::execution(&job.skill_id, "job handler aborted"))
    });

    match outcome {
        Err(err) if err.is_retryable() && job.attempts_made < job.attempts && !cancel.is_cancelled() => {
            let delay = job.backoff.delay_for(job.attempts_made);
            warn!(
                job_id = %job.id,
                skill_id = %job.skill_id,
                attempt = job.attempts_made,
                max_attempts = job.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "job failed, retrying"
            );
            if let Err(e) = queue.store.save(&job).await {
                warn!(job_id = %job.id, error = %e, "job store update failed");
            }
            // Count as delayed before leaving the running set so the queue never looks drained in between.
            queue.schedule_retry(job, delay, err, cancel);
            queue.mark_stopped();
        }
        outcome => {
            match &outcome {
                Ok(_) => debug!(job_id = %job.id, skill_id = %job.skill_id, "job completed"),
                Err(err) => warn!(job_id = %job.id, skill_id = %job.skill_id, error = %err, "job failed"),
            }
            let error = outcome.as_ref().err().map(ToString::to_string);
            if let Err(e) = queue.store.finish(&job.id, error.as_deref()).await {
                warn!(job_id = %job.id, error = %e, "job store update failed");
            }
            // Leave the running set before waking a waiter.
            queue.mark_stopped();
            queue.finish(&job.id, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use serde_json::json;

    use skillgate_contracts::{
        context::{ExecutionContext, UserRole},
        job::{BackoffKind, BackoffPolicy},
    };

    use super::*;
    use crate::store::InMemoryJobStore;

    fn memory() -> Arc<dyn JobStore> {
        Arc::new(InMemoryJobStore::new())
    }

    fn job(skill_id: &str, priority: u8, attempts: u32) -> Job {
        Job {
            id: JobId::new(),
            skill_id: skill_id.to_string(),
            skill_name: skill_id.to_string(),
            input: json!({}),
            context: ExecutionContext::new("u", UserRole::Customer),
            priority,
            attempts,
            attempts_made: 0,
            backoff: BackoffPolicy { kind: BackoffKind::Fixed, delay_ms: 1 },
            created_at: Utc::now(),
        }
    }

    /// Records the order jobs ran in; fails the first `fail_first` attempts.
    struct MockHandler {
        order: Arc<Mutex<Vec<String>>>,
        calls: AtomicU32,
        fail_first: u32,
        error: GovernanceError,
    }

    impl MockHandler {
        fn new(fail_first: u32, error: GovernanceError) -> Arc<Self> {
            Arc::new(Self {
                order: Arc::new(Mutex::new(Vec::new())),
                calls: AtomicU32::new(0),
                fail_first,
                error,
            })
        }
    }

    #[async_trait]
    impl JobHandler for MockHandler {
        async fn handle(&self, job: &Job) -> JobOutcome {
            self.order.lock().unwrap().push(job.skill_id.clone());
            let n = self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if n < self.fail_first {
                return Err(self.error.clone());
            }
            Ok(json!({ "attempt": job.attempts_made }))
        }
    }

    async fn drain(queue: &Arc<JobQueue>, handler: Arc<MockHandler>, concurrency: usize) {
        let pool = WorkerPool::spawn(Arc::clone(queue), handler, concurrency, CancellationToken::new());
        queue.close();
        pool.await.unwrap();
    }

    // ── Ordering ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn higher_priority_first_then_fifo() {
        let queue = Arc::new(JobQueue::new(100, 50, memory()));
        queue.enqueue(job("low-1", 0, 1)).await.unwrap();
        queue.enqueue(job("low-2", 0, 1)).await.unwrap();
        queue.enqueue(job("admin", 10, 1)).await.unwrap();
        queue.enqueue(job("low-3", 0, 1)).await.unwrap();

        let handler = MockHandler::new(0, GovernanceError::QueueClosed);
        drain(&queue, Arc::clone(&handler), 1).await;

        assert_eq!(*handler.order.lock().unwrap(), vec!["admin", "low-1", "low-2", "low-3"]);
    }

    // ── Outcomes ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn waiter_receives_outcome() {
        let queue = Arc::new(JobQueue::new(100, 50, memory()));
        let j = job("s", 0, 1);
        let rx = queue.subscribe(&j.id);
        let id = queue.enqueue(j).await.unwrap();

        drain(&queue, MockHandler::new(0, GovernanceError::QueueClosed), 2).await;

        assert_eq!(rx.await.unwrap().unwrap(), json!({ "attempt": 1 }));
        assert!(matches!(queue.status(&id), JobStatus::Completed { .. }));
    }

    #[tokio::test]
    async fn retryable_failure_is_retried_until_success() {
        let queue = Arc::new(JobQueue::new(100, 50, memory()));
        let j = job("flaky", 0, 3);
        let rx = queue.subscribe(&j.id);
        queue.enqueue(j).await.unwrap();

        let handler = MockHandler::new(2, GovernanceError::execution("flaky", "transient"));
        drain(&queue, Arc::clone(&handler), 1).await;

        assert_eq!(rx.await.unwrap().unwrap(), json!({ "attempt": 3 }));
        assert_eq!(handler.calls.load(AtomicOrdering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_stop_at_attempt_limit() {
        let queue = Arc::new(JobQueue::new(100, 50, memory()));
        let j = job("broken", 0, 2);
        let rx = queue.subscribe(&j.id);
        let id = queue.enqueue(j).await.unwrap();

        let handler = MockHandler::new(u32::MAX, GovernanceError::execution("broken", "down"));
        drain(&queue, Arc::clone(&handler), 1).await;

        assert!(rx.await.unwrap().is_err());
        assert_eq!(handler.calls.load(AtomicOrdering::SeqCst), 2);
        assert!(matches!(queue.status(&id), JobStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn non_retryable_failure_is_terminal() {
        let queue = Arc::new(JobQueue::new(100, 50, memory()));
        queue.enqueue(job("bad-input", 0, 3)).await.unwrap();

        let err = GovernanceError::Validation {
            skill_id: "bad-input".into(),
            stage: skillgate_contracts::error::ValidationStage::Input,
            reason: "nope".into(),
        };
        let handler = MockHandler::new(u32::MAX, err);
        drain(&queue, Arc::clone(&handler), 1).await;

        assert_eq!(handler.calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_handler_fails_job_and_leaves_running_set() {
        struct PanicHandler;

        #[async_trait]
        impl JobHandler for PanicHandler {
            async fn handle(&self, _job: &Job) -> JobOutcome {
                panic!("handler bug")
            }
        }

        let queue = Arc::new(JobQueue::new(100, 50, memory()));
        let j = job("s", 0, 1);
        let rx = queue.subscribe(&j.id);
        let id = queue.enqueue(j).await.unwrap();

        let pool = WorkerPool::spawn(Arc::clone(&queue), Arc::new(PanicHandler), 1, CancellationToken::new());
        queue.close();
        tokio::time::timeout(Duration::from_secs(3), pool).await.unwrap().unwrap();

        assert_eq!(rx.await.unwrap().unwrap_err().code(), "EXECUTION_FAILED");
        assert_eq!(queue.running(), 0);
        assert!(matches!(queue.status(&id), JobStatus::Failed { .. }));
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn new_queue_restores_unfinished_jobs() {
        let store = Arc::new(InMemoryJobStore::new());
        let first = JobQueue::new(100, 50, store.clone());
        first.enqueue(job("a", 0, 1)).await.unwrap();
        first.enqueue(job("b", 0, 1)).await.unwrap();
        drop(first);
        assert_eq!(store.len(), 2);

        let queue = Arc::new(JobQueue::new(100, 50, store.clone()));
        let handler = MockHandler::new(0, GovernanceError::QueueClosed);
        drain(&queue, Arc::clone(&handler), 1).await;

        assert_eq!(*handler.order.lock().unwrap(), vec!["a", "b"]);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn restore_skips_jobs_already_queued() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(JobQueue::new(100, 50, store.clone()));
        queue.enqueue(job("s", 0, 1)).await.unwrap();

        assert_eq!(queue.restore().await.unwrap(), 0);
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn abandoned_retry_stays_in_store() {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(JobQueue::new(100, 50, store.clone()));
        let mut j = job("slow-retry", 0, 3);
        j.backoff.delay_ms = 60_000;
        let rx = queue.subscribe(&j.id);
        queue.enqueue(j).await.unwrap();

        let handler = MockHandler::new(u32::MAX, GovernanceError::execution("slow-retry", "down"));
        let cancel = CancellationToken::new();
        let pool = WorkerPool::spawn(Arc::clone(&queue), handler.clone(), 1, cancel.clone());
        while handler.calls.load(AtomicOrdering::SeqCst) == 0 || queue.running() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        queue.close();
        cancel.cancel();
        pool.await.unwrap();

        assert!(rx.await.unwrap().is_err());
        let kept = store.load_unfinished().await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].attempts_made, 1);
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn closed_queue_rejects_enqueue() {
        let queue = JobQueue::new(100, 50, memory());
        queue.close();
        let err = queue.enqueue(job("s", 0, 1)).await.unwrap_err();
        assert_eq!(err.code(), "QUEUE_CLOSED");
    }

    #[tokio::test]
    async fn retention_evicts_oldest_completed() {
        let queue = Arc::new(JobQueue::new(2, 2, memory()));
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(queue.enqueue(job("s", 0, 1)).await.unwrap());
        }

        drain(&queue, MockHandler::new(0, GovernanceError::QueueClosed), 1).await;

        assert_eq!(queue.status(&ids[0]), JobStatus::Unknown);
        assert!(matches!(queue.status(&ids[2]), JobStatus::Completed { .. }));
    }

    #[tokio::test]
    async fn queued_job_reports_queued_and_counts_pending() {
        let queue = JobQueue::new(100, 50, memory());
        let id = queue.enqueue(job("s", 0, 1)).await.unwrap();
        assert_eq!(queue.status(&id), JobStatus::Queued);
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.status(&JobId::new()), JobStatus::Unknown);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded() {
        struct SlowHandler {
            active: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait]
        impl JobHandler for SlowHandler {
            async fn handle(&self, _job: &Job) -> JobOutcome {
                let now = self.active.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                self.peak.fetch_max(now, AtomicOrdering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.active.fetch_sub(1, AtomicOrdering::SeqCst);
                Ok(Value::Null)
            }
        }

        let queue = Arc::new(JobQueue::new(100, 50, memory()));
        for _ in 0..8 {
            queue.enqueue(job("s", 0, 1)).await.unwrap();
        }
        let handler = Arc::new(SlowHandler { active: AtomicUsize::new(0), peak: AtomicUsize::new(0) });
        let pool = WorkerPool::spawn(Arc::clone(&queue), handler.clone(), 2, CancellationToken::new());
        queue.close();
        pool.await.unwrap();

        assert_eq!(handler.peak.load(AtomicOrdering::SeqCst), 2);
    }
}
