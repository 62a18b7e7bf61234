//! Job and run bookkeeping
//!
//! A `Job` is one unit of fetch → transcode → publish → dispose work for a
//! single dataset/source(/jurisdiction) combination. Jobs move through a
//! fixed state machine and are mutated only by the worker executing them;
//! after completion they are folded into the `RunSummary`, the sole
//! externally observed result of a run.

use chrono::{DateTime, Utc};
use rede_common::types::JurisdictionCode;
use rede_common::PipelineError;
use serde::Serialize;
use uuid::Uuid;

use crate::config::SourceLocator;
use crate::fetch::FetchAttempt;

/// Job lifecycle states.
///
/// `Pending → Fetching → Transcoding → Publishing → Disposing → Succeeded`,
/// with `Failed` reachable from any non-terminal state and `Skipped` for
/// jobs that never started because the run was cancelled first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Fetching,
    Transcoding,
    Publishing,
    Disposing,
    Succeeded,
    Failed,
    Skipped,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Skipped)
    }
}

/// One pipeline execution unit.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub dataset: String,
    pub locator: SourceLocator,
    /// Set for pre-partitioned sources, where the jurisdiction is derived
    /// from the remote file name; `None` when the transcoder fans out to all
    /// configured jurisdictions.
    pub jurisdiction: Option<JurisdictionCode>,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_read: u64,
    pub records_kept: u64,
    pub malformed: u64,
    pub bytes_fetched: u64,
    pub bytes_published: u64,
    pub fetch_attempts: Vec<FetchAttempt>,
    pub published_keys: Vec<String>,
    pub failure: Option<JobFailure>,
}

/// Why a job failed, surfaced in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub kind: String,
    pub message: String,
}

impl Job {
    pub fn new(
        dataset: impl Into<String>,
        locator: SourceLocator,
        jurisdiction: Option<JurisdictionCode>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset: dataset.into(),
            locator,
            jurisdiction,
            state: JobState::Pending,
            started_at: None,
            completed_at: None,
            records_read: 0,
            records_kept: 0,
            malformed: 0,
            bytes_fetched: 0,
            bytes_published: 0,
            fetch_attempts: Vec::new(),
            published_keys: Vec::new(),
            failure: None,
        }
    }

    /// Advance to a non-terminal working state.
    pub fn advance(&mut self, state: JobState) {
        debug_assert!(!self.state.is_terminal(), "job already terminal");
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.state = state;
    }

    pub fn succeed(&mut self) {
        self.state = JobState::Succeeded;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &PipelineError) {
        self.failure = Some(JobFailure {
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
        self.state = JobState::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn skip(&mut self) {
        self.state = JobState::Skipped;
        self.completed_at = Some(Utc::now());
    }

    /// Label used in logs and staging-directory names.
    pub fn label(&self) -> String {
        match &self.jurisdiction {
            Some(code) => format!("{}_{}", self.dataset, code),
            None => format!("{}_all", self.dataset),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        }
    }
}

/// Aggregate outcome of one orchestrator invocation.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub datasets_attempted: usize,
    pub datasets_disabled: usize,
    pub jobs_succeeded: usize,
    pub jobs_failed: usize,
    pub jobs_skipped: usize,
    pub records_read: u64,
    pub records_kept: u64,
    pub bytes_fetched: u64,
    pub bytes_published: u64,
    pub jobs: Vec<Job>,
}

impl RunSummary {
    pub fn new(datasets_attempted: usize, datasets_disabled: usize) -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            datasets_attempted,
            datasets_disabled,
            jobs_succeeded: 0,
            jobs_failed: 0,
            jobs_skipped: 0,
            records_read: 0,
            records_kept: 0,
            bytes_fetched: 0,
            bytes_published: 0,
            jobs: Vec::new(),
        }
    }

    /// Fold a terminal job into the summary.
    pub fn record(&mut self, job: Job) {
        debug_assert!(job.state.is_terminal(), "job not terminal");
        match job.state {
            JobState::Succeeded => self.jobs_succeeded += 1,
            JobState::Failed => self.jobs_failed += 1,
            _ => self.jobs_skipped += 1,
        }
        self.records_read += job.records_read;
        self.records_kept += job.records_kept;
        self.bytes_fetched += job.bytes_fetched;
        self.bytes_published += job.bytes_published;
        self.jobs.push(job);
    }

    pub fn finalize(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn elapsed_secs(&self) -> f64 {
        match self.completed_at {
            Some(end) => (end - self.started_at).num_milliseconds() as f64 / 1000.0,
            None => 0.0,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.jobs_failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(
            "taxassessor",
            SourceLocator::parse("/Outgoing/TAXASSESSOR_0001.zip"),
            None,
        )
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = job();
        assert_eq!(job.state, JobState::Pending);
        assert!(job.started_at.is_none());
        assert!(job.failure.is_none());
    }

    #[test]
    fn test_advance_stamps_start_time() {
        let mut job = job();
        job.advance(JobState::Fetching);
        assert_eq!(job.state, JobState::Fetching);
        assert!(job.started_at.is_some());
    }

    #[test]
    fn test_fail_records_error_kind() {
        let mut job = job();
        job.advance(JobState::Fetching);
        job.fail(&PipelineError::Transfer {
            locator: "/Outgoing/TAXASSESSOR_0001.zip".to_string(),
            attempts: 3,
            reason: "connection reset".to_string(),
        });

        assert_eq!(job.state, JobState::Failed);
        let failure = job.failure.unwrap();
        assert_eq!(failure.kind, "transfer");
        assert!(failure.message.contains("connection reset"));
    }

    #[test]
    fn test_label_includes_jurisdiction_when_present() {
        let mut job = job();
        assert_eq!(job.label(), "taxassessor_all");
        job.jurisdiction = Some(JurisdictionCode::new("CA").unwrap());
        assert_eq!(job.label(), "taxassessor_CA");
    }

    #[test]
    fn test_summary_tallies_outcomes() {
        let mut summary = RunSummary::new(2, 1);

        let mut ok = job();
        ok.advance(JobState::Fetching);
        ok.records_read = 10;
        ok.records_kept = 4;
        ok.bytes_fetched = 1000;
        ok.succeed();
        summary.record(ok);

        let mut bad = job();
        bad.advance(JobState::Fetching);
        bad.fail(&PipelineError::Cancelled);
        summary.record(bad);

        summary.finalize();

        assert_eq!(summary.jobs_succeeded, 1);
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(summary.records_read, 10);
        assert_eq!(summary.records_kept, 4);
        assert_eq!(summary.bytes_fetched, 1000);
        assert!(summary.has_failures());
        assert!(summary.completed_at.is_some());
    }

    #[test]
    fn test_kept_never_exceeds_read_in_summary() {
        let mut summary = RunSummary::new(1, 0);
        let mut j = job();
        j.advance(JobState::Transcoding);
        j.records_read = 100;
        j.records_kept = 40;
        j.succeed();
        summary.record(j);
        assert!(summary.records_kept <= summary.records_read);
    }
}
