//! Process-local job store.
//!
//! The default store for a kernel that was not given a durable one. It keeps
//! unfinished jobs only, so it survives a kernel being rebuilt inside the
//! same process but not the process itself.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use skillgate_contracts::{
    error::GovernanceResult,
    job::{Job, JobId},
};

use crate::lock;
use crate::traits::JobStore;

struct StoredJob {
    seq: u64,
    job: Job,
    running_attempt: Option<u32>,
}

#[derive(Default)]
struct StoreState {
    next_seq: u64,
    jobs: HashMap<JobId, StoredJob>,
}

#[derive(Default)]
pub struct InMemoryJobStore {
    state: Mutex<StoreState>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unfinished jobs currently held.
    pub fn len(&self) -> usize {
        lock(&self.state).jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The attempt a job was last marked running with, if it is running.
    pub fn running_attempt(&self, job_id: &JobId) -> Option<u32> {
        lock(&self.state).jobs.get(job_id).and_then(|stored| stored.running_attempt)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: &Job) -> GovernanceResult<()> {
        let mut state = lock(&self.state);
        let seq = match state.jobs.get(&job.id) {
            Some(existing) => existing.seq,
            None => {
                state.next_seq += 1;
                state.next_seq
            }
        };
        state
            .jobs
            .insert(job.id.clone(), StoredJob { seq, job: job.clone(), running_attempt: None });
        Ok(())
    }

    async fn mark_running(&self, job_id: &JobId, attempt: u32) -> GovernanceResult<()> {
        if let Some(stored) = lock(&self.state).jobs.get_mut(job_id) {
            stored.running_attempt = Some(attempt);
        }
        Ok(())
    }

    async fn finish(&self, job_id: &JobId, _error: Option<&str>) -> GovernanceResult<()> {
        lock(&self.state).jobs.remove(job_id);
        Ok(())
    }

    async fn load_unfinished(&self) -> GovernanceResult<Vec<Job>> {
        let state = lock(&self.state);
        let mut stored: Vec<_> = state.jobs.values().collect();
        stored.sort_by_key(|s| s.seq);
        Ok(stored.into_iter().map(|s| s.job.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use skillgate_contracts::{
        context::{ExecutionContext, UserRole},
        job::BackoffPolicy,
    };

    use super::*;

    fn job(skill_id: &str) -> Job {
        Job {
            id: JobId::new(),
            skill_id: skill_id.to_string(),
            skill_name: skill_id.to_string(),
            input: json!({ "n": 1 }),
            context: ExecutionContext::new("u", UserRole::Customer),
            priority: 0,
            attempts: 3,
            attempts_made: 0,
            backoff: BackoffPolicy::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unfinished_jobs_load_oldest_first() {
        let store = InMemoryJobStore::new();
        let (a, b, c) = (job("a"), job("b"), job("c"));
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();
        store.save(&c).await.unwrap();
        store.finish(&b.id, None).await.unwrap();

        let loaded: Vec<_> = store.load_unfinished().await.unwrap().into_iter().map(|j| j.skill_id).collect();
        assert_eq!(loaded, ["a", "c"]);
    }

    #[tokio::test]
    async fn resave_keeps_position_and_updates_attempts() {
        let store = InMemoryJobStore::new();
        let mut first = job("first");
        store.save(&first).await.unwrap();
        store.save(&job("second")).await.unwrap();

        store.mark_running(&first.id, 1).await.unwrap();
        assert_eq!(store.running_attempt(&first.id), Some(1));

        first.attempts_made = 1;
        store.save(&first).await.unwrap();
        assert_eq!(store.running_attempt(&first.id), None);

        let loaded = store.load_unfinished().await.unwrap();
        assert_eq!(loaded[0].skill_id, "first");
        assert_eq!(loaded[0].attempts_made, 1);
    }

    #[tokio::test]
    async fn finished_job_is_forgotten() {
        let store = InMemoryJobStore::new();
        let j = job("s");
        store.save(&j).await.unwrap();
        store.finish(&j.id, Some("boom")).await.unwrap();
        assert!(store.is_empty());
    }
}
