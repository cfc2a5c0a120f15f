//! Process-wide registry of jobs.

use super::{Job, JobId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// In-memory map from [`JobId`] to [`Job`].
///
/// Entries are created on submission and kept for the life of the process
/// unless [`JobStore::purge_finished`] evicts them. The map lock is only
/// held to insert, remove or clone an `Arc`; job state has its own locks.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and return the shared handle.
    pub fn insert(&self, job: Job) -> Arc<Job> {
        let job = Arc::new(job);
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.id().clone(), Arc::clone(&job));
        job
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<Job>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &JobId) -> Option<Arc<Job>> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Drop jobs that reached a terminal state more than `ttl` ago.
    ///
    /// In-progress jobs are never evicted. Returns how many were removed.
    pub fn purge_finished(&self, ttl: Duration) -> usize {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, job| !job.finished_longer_than(ttl));
        let removed = before - jobs.len();
        if removed > 0 {
            debug!("Evicted {} finished jobs older than {:?}", removed, ttl);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, Page};

    #[test]
    fn insert_get_remove() {
        let store = JobStore::new();
        assert!(store.is_empty());
        let job = store.insert(Job::new(JobId::new(), vec![Page::new(1, "a")], 1));
        let id = job.id().clone();

        assert_eq!(store.len(), 1);
        assert_eq!(store.ids(), vec![id.clone()]);
        assert!(Arc::ptr_eq(&store.get(&id).unwrap(), &job));
        assert!(store.get(&JobId::new()).is_none());

        assert!(store.remove(&id).is_some());
        assert!(store.get(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_keeps_running_and_recent_jobs() {
        let store = JobStore::new();
        let running = store.insert(Job::new(JobId::new(), vec![Page::new(1, "a")], 1));
        let old = store.insert(Job::failed(JobId::new(), "gone"));

        tokio::time::advance(Duration::from_secs(120)).await;
        let recent = store.insert(Job::new(JobId::new(), Vec::new(), 1));
        recent.finish(JobStatus::Completed, None, None);

        assert_eq!(store.purge_finished(Duration::from_secs(60)), 1);
        assert!(store.get(old.id()).is_none());
        assert!(store.get(running.id()).is_some());
        assert!(store.get(recent.id()).is_some());
    }
}
