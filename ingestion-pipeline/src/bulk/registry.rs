use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::types::job::{JobId, JobRecord, JobState},
};
use tokio::sync::{watch, RwLock};
use tracing::debug;

const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

struct Entry {
    record: JobRecord,
    state_tx: watch::Sender<JobState>,
    finished_at: Option<Instant>,
}

/// In-memory view of the bulk jobs started by this process.
///
/// Every state change is broadcast, so callers can await a job reaching a terminal
/// state instead of polling. Finished jobs are forgotten once `retention` has
/// passed; their directories stay on disk and report as unknown.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, Entry>>>,
    retention: Duration,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: Arc::default(),
            retention,
        }
    }

    /// Registers a new job, evicting finished jobs past their retention.
    pub async fn insert(&self, record: JobRecord) {
        let (state_tx, _) = watch::channel(record.state);
        let mut jobs = self.jobs.write().await;

        let before = jobs.len();
        jobs.retain(|_, entry| {
            !matches!(entry.finished_at, Some(finished) if finished.elapsed() >= self.retention)
        });
        if jobs.len() < before {
            debug!(evicted = before - jobs.len(), "Evicted finished bulk jobs");
        }

        jobs.insert(
            record.id,
            Entry {
                record,
                state_tx,
                finished_at: None,
            },
        );
    }

    pub async fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|entry| entry.record.clone())
    }

    /// Applies `change` to the job's record and publishes the resulting state.
    pub async fn update<F>(&self, job_id: &JobId, change: F) -> Result<JobState, AppError>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), AppError>,
    {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| AppError::JobNotFound(job_id.to_string()))?;

        change(&mut entry.record)?;
        let state = entry.record.state;
        if state.is_terminal() && entry.finished_at.is_none() {
            entry.finished_at = Some(Instant::now());
        }
        entry.state_tx.send_replace(state);
        Ok(state)
    }

    /// Resolves once the job is completed or failed.
    pub async fn wait_for_terminal(&self, job_id: &JobId) -> Result<JobState, AppError> {
        let mut rx = {
            let jobs = self.jobs.read().await;
            jobs.get(job_id)
                .ok_or_else(|| AppError::JobNotFound(job_id.to_string()))?
                .state_tx
                .subscribe()
        };

        let state = rx
            .wait_for(JobState::is_terminal)
            .await
            .map_err(|_| AppError::InternalError(format!("job {job_id} registry entry dropped")))?;
        Ok(*state)
    }
}
