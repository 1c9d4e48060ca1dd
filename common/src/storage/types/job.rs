use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::Serialize;
use state_machines::state_machine;
use uuid::Uuid;

use crate::error::AppError;

/// Identifier of a bulk ingestion job. Doubles as the job's directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a client supplied id. Anything that is not a UUID cannot name a job.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| AppError::JobNotFound(raw.to_string()))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum JobTransition {
    Start,
    Complete,
    Fail,
}

impl JobTransition {
    fn as_str(&self) -> &'static str {
        match self {
            JobTransition::Start => "start",
            JobTransition::Complete => "complete",
            JobTransition::Fail => "fail",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: JobLifecycleMachine,
        initial: Pending,
        states: [Pending, Running, Completed, Failed],
        events {
            start {
                transition: { from: Pending, to: Running }
            }
            complete {
                transition: { from: Running, to: Completed }
            }
            fail {
                transition: { from: Pending, to: Failed }
                transition: { from: Running, to: Failed }
            }
        }
    }

    pub(super) fn pending() -> JobLifecycleMachine<(), Pending> {
        JobLifecycleMachine::new(())
    }
}

fn invalid_transition(state: JobState, event: JobTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid job transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

fn compute_next_state(state: JobState, event: JobTransition) -> Result<JobState, AppError> {
    use lifecycle::pending;
    match (state, event) {
        (JobState::Pending, JobTransition::Start) => pending()
            .start()
            .map(|_| JobState::Running)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Pending, JobTransition::Fail) => pending()
            .fail()
            .map(|_| JobState::Failed)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Running, JobTransition::Complete) => pending()
            .start()
            .map_err(|_| invalid_transition(state, event))?
            .complete()
            .map(|_| JobState::Completed)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Running, JobTransition::Fail) => pending()
            .start()
            .map_err(|_| invalid_transition(state, event))?
            .fail()
            .map(|_| JobState::Failed)
            .map_err(|_| invalid_transition(state, event)),
        _ => Err(invalid_transition(state, event)),
    }
}

/// In-process bookkeeping for one bulk job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub file_names: Vec<String>,
    pub num_files: usize,
    pub state: JobState,
    /// Per-file OCR failures of either pass, keyed by stored file name.
    pub failed_files: BTreeMap<String, String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            file_names: Vec::new(),
            num_files: 0,
            state: JobState::Pending,
            failed_files: BTreeMap::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_file(&mut self, file_name: String) {
        self.file_names.push(file_name);
        self.num_files = self.file_names.len();
        self.updated_at = Utc::now();
    }

    /// Records an OCR failure for one file without changing the job state.
    pub fn record_failure(&mut self, file_name: String, reason: String) {
        self.failed_files.insert(file_name, reason);
        self.updated_at = Utc::now();
    }

    pub fn start(&mut self) -> Result<(), AppError> {
        self.apply(JobTransition::Start)
    }

    pub fn complete(&mut self, failed_files: BTreeMap<String, String>) -> Result<(), AppError> {
        self.apply(JobTransition::Complete)?;
        self.failed_files.extend(failed_files);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), AppError> {
        self.apply(JobTransition::Fail)?;
        self.error = Some(reason.into());
        Ok(())
    }

    fn apply(&mut self, event: JobTransition) -> Result<(), AppError> {
        self.state = compute_next_state(self.state, event)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(JobId::new())
    }

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        let parsed = JobId::parse(&id.to_string()).expect("valid id");
        assert_eq!(parsed, id);
    }

    #[test]
    fn job_id_rejects_non_uuid_input_as_not_found() {
        let err = JobId::parse("../etc").expect_err("not a uuid");
        assert!(matches!(err, AppError::JobNotFound(raw) if raw == "../etc"));
    }

    #[test]
    fn lifecycle_runs_pending_running_completed() {
        let mut job = record();
        assert_eq!(job.state, JobState::Pending);

        job.start().expect("start");
        assert_eq!(job.state, JobState::Running);

        let mut failures = BTreeMap::new();
        failures.insert("b.png".to_string(), "unreadable".to_string());
        job.complete(failures).expect("complete");

        assert_eq!(job.state, JobState::Completed);
        assert!(job.state.is_terminal());
        assert_eq!(job.failed_files.len(), 1);
    }

    #[test]
    fn pending_job_can_fail_directly() {
        let mut job = record();
        job.fail("sync pass aborted").expect("fail");

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("sync pass aborted"));
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut job = record();
        job.start().expect("start");
        job.complete(BTreeMap::new()).expect("complete");

        assert!(matches!(job.start(), Err(AppError::Validation(_))));
        assert!(matches!(job.fail("late"), Err(AppError::Validation(_))));
        assert_eq!(job.state, JobState::Completed);
    }

    #[test]
    fn pending_job_cannot_complete_without_running() {
        let mut job = record();
        assert!(job.complete(BTreeMap::new()).is_err());
        assert_eq!(job.state, JobState::Pending);
    }

    #[test]
    fn completion_keeps_failures_recorded_earlier() {
        let mut job = record();
        job.record_failure("b.png".into(), "undecodable".into());
        job.start().expect("start");

        let mut later = BTreeMap::new();
        later.insert("c.png".to_string(), "timed out".to_string());
        job.complete(later).expect("complete");

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(
            job.failed_files.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["b.png", "c.png"]
        );
    }

    #[test]
    fn add_file_tracks_count() {
        let mut job = record();
        job.add_file("a.png".into());
        job.add_file("b.png".into());

        assert_eq!(job.num_files, 2);
        assert_eq!(job.file_names, vec!["a.png", "b.png"]);
    }
}
