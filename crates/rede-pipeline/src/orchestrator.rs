//! Run orchestration
//!
//! Enumerates jobs from configuration (one per dataset source, or one per
//! discovered remote file for pre-partitioned datasets), drives each through
//! fetch → transcode → publish → dispose, and folds the outcomes into a
//! `RunSummary`. Jobs are isolated: one failure never aborts siblings.
//!
//! Only one run may be in flight at a time. The guard is an explicit atomic
//! flag owned by the orchestrator: set before the run starts, cleared once
//! every job is terminal. An overlapping trigger is skipped and logged, not
//! queued.

use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use rede_common::types::JurisdictionCode;
use rede_common::{PipelineError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{DatasetConfig, PipelineConfig, SourceLocator};
use crate::dispose::dispose;
use crate::fetch::Fetcher;
use crate::job::{Job, JobState, RunSummary};
use crate::publish::{destination_basename, object_key, Publisher};
use crate::transcode::{verify_archive, Transcoder};

/// What a trigger produced: a finished run, or nothing because a prior run
/// was still in flight.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    Skipped,
}

/// Drives one run across all configured datasets and jurisdictions.
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    fetcher: Arc<Fetcher>,
    publisher: Arc<Publisher>,
    transcoder: Transcoder,
    run_in_progress: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: Arc<PipelineConfig>, fetcher: Fetcher, publisher: Publisher) -> Self {
        let transcoder = Transcoder::new(config.filter.column.clone(), config.filter.delimiter);
        Self {
            config,
            fetcher: Arc::new(fetcher),
            publisher: Arc::new(publisher),
            transcoder,
            run_in_progress: AtomicBool::new(false),
        }
    }

    /// Execute one run, unless another run is still in flight.
    pub async fn run(&self, cancel: &CancellationToken) -> RunOutcome {
        if self
            .run_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("a run is already in progress; skipping this trigger");
            return RunOutcome::Skipped;
        }

        let summary = self.run_inner(cancel).await;
        self.run_in_progress.store(false, Ordering::SeqCst);
        RunOutcome::Completed(summary)
    }

    async fn run_inner(&self, cancel: &CancellationToken) -> RunSummary {
        let run_date = Utc::now().date_naive();
        let enabled = self.config.datasets.iter().filter(|d| d.enabled).count();
        let disabled = self.config.datasets.len() - enabled;

        info!(
            datasets = enabled,
            disabled,
            jurisdictions = self.config.jurisdictions.len(),
            "run starting"
        );
        for dataset in self.config.datasets.iter().filter(|d| !d.enabled) {
            info!(dataset = %dataset.name, "dataset disabled, skipping");
        }

        let jobs = self.enumerate_jobs().await;
        let mut summary = RunSummary::new(enabled, disabled);

        let finished: Vec<Job> = futures::stream::iter(
            jobs.into_iter()
                .map(|job| self.execute_job(job, run_date, cancel)),
        )
        .buffer_unordered(self.config.run.max_concurrent_jobs)
        .collect()
        .await;

        for job in finished {
            match job.state {
                JobState::Succeeded => info!(
                    job = %job.label(),
                    records_read = job.records_read,
                    records_kept = job.records_kept,
                    elapsed_secs = job.elapsed_secs(),
                    "job succeeded"
                ),
                JobState::Failed => {
                    let failure = job.failure.as_ref();
                    error!(
                        job = %job.label(),
                        kind = failure.map(|f| f.kind.as_str()).unwrap_or("unknown"),
                        reason = failure.map(|f| f.message.as_str()).unwrap_or(""),
                        "job failed"
                    );
                },
                _ => warn!(job = %job.label(), "job skipped"),
            }
            summary.record(job);
        }

        summary.finalize();
        if let Ok(json) = serde_json::to_string(&summary) {
            tracing::debug!(summary = %json, "run summary");
        }
        info!(
            succeeded = summary.jobs_succeeded,
            failed = summary.jobs_failed,
            skipped = summary.jobs_skipped,
            records_read = summary.records_read,
            records_kept = summary.records_kept,
            bytes_fetched = summary.bytes_fetched,
            bytes_published = summary.bytes_published,
            elapsed_secs = summary.elapsed_secs(),
            "run complete"
        );
        summary
    }

    /// Build the job list for this run.
    ///
    /// Pre-partitioned datasets browse their remote directories here; a
    /// failed listing becomes a pre-failed job so the failure surfaces in
    /// the summary without blocking sibling datasets.
    async fn enumerate_jobs(&self) -> Vec<Job> {
        let mut jobs = Vec::new();

        for dataset in self.config.datasets.iter().filter(|d| d.enabled) {
            if dataset.pre_partitioned {
                for locator in dataset.locators() {
                    self.enumerate_partitioned(dataset, locator, &mut jobs).await;
                }
            } else {
                for locator in dataset.locators() {
                    jobs.push(Job::new(&dataset.name, locator, None));
                }
            }
        }

        info!(jobs = jobs.len(), "jobs enumerated");
        jobs
    }

    async fn enumerate_partitioned(
        &self,
        dataset: &DatasetConfig,
        locator: SourceLocator,
        jobs: &mut Vec<Job>,
    ) {
        let dir = match &locator {
            SourceLocator::Ftp { path } => path.clone(),
            SourceLocator::Http { .. } => {
                let mut job = Job::new(&dataset.name, locator, None);
                job.fail(&PipelineError::Config(
                    "pre-partitioned sources must be FTP directories".to_string(),
                ));
                jobs.push(job);
                return;
            },
        };

        match self
            .fetcher
            .list(&dir, dataset.name_pattern.as_deref())
            .await
        {
            Ok(files) => {
                let mut matched = 0;
                for file in files {
                    if let Some(code) = self.jurisdiction_for(&file.name) {
                        jobs.push(Job::new(
                            &dataset.name,
                            SourceLocator::Ftp { path: file.path },
                            Some(code),
                        ));
                        matched += 1;
                    }
                }
                if matched == 0 {
                    warn!(
                        dataset = %dataset.name,
                        dir = %dir,
                        "no remote files matched the configured jurisdictions"
                    );
                }
            },
            Err(e) => {
                warn!(dataset = %dataset.name, dir = %dir, error = %e, "listing failed");
                let mut job = Job::new(&dataset.name, locator, None);
                job.fail(&e);
                jobs.push(job);
            },
        }
    }

    /// Match a remote file name to a configured jurisdiction.
    ///
    /// The code must appear as a whole token of the file name (delimited by
    /// non-alphanumeric characters), so `CA` matches `TAXASSESSOR_CA_01.zip`
    /// but not `SCAN.zip`.
    fn jurisdiction_for(&self, file_name: &str) -> Option<JurisdictionCode> {
        let tokens: Vec<&str> = file_name
            .split(|c: char| !c.is_ascii_alphanumeric())
            .collect();
        self.config
            .jurisdictions
            .iter()
            .find(|code| tokens.iter().any(|t| *t == code.as_str()))
            .cloned()
    }

    /// Run a single job to a terminal state; never propagates errors.
    async fn execute_job(&self, mut job: Job, run_date: NaiveDate, cancel: &CancellationToken) -> Job {
        if job.state.is_terminal() {
            return job;
        }
        if cancel.is_cancelled() {
            job.skip();
            return job;
        }

        match self.process_job(&mut job, run_date, cancel).await {
            Ok(()) => job.succeed(),
            Err(e) => job.fail(&e),
        }
        job
    }

    async fn process_job(
        &self,
        job: &mut Job,
        run_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let dataset = self
            .config
            .datasets
            .iter()
            .find(|d| d.name == job.dataset)
            .cloned()
            .ok_or_else(|| {
                PipelineError::Config(format!("dataset '{}' vanished from config", job.dataset))
            })?;

        // Each job owns a distinct staging subtree, so concurrent jobs never
        // collide on the shared staging area.
        let id = job.id.simple().to_string();
        let job_key = format!(
            "{}_{}_{}",
            job.label(),
            Utc::now().format("%Y%m%d%H%M%S"),
            &id[..8]
        );
        let download_dir = self.config.staging.download_dir.join(&job_key);
        let filtered_dir = self.config.staging.filtered_dir.join(&job_key);

        job.advance(JobState::Fetching);
        let report = self.fetcher.fetch(&job.locator, &download_dir, cancel).await?;
        job.fetch_attempts = report.attempts;
        job.bytes_fetched = report.bytes_transferred;
        let artifact = report.local_path;

        {
            let path = artifact.clone();
            tokio::task::spawn_blocking(move || verify_archive(&path))
                .await
                .map_err(join_error)??;
        }

        job.advance(JobState::Transcoding);
        let to_publish: Vec<(JurisdictionCode, PathBuf)> = if dataset.pre_partitioned {
            let jurisdiction = job.jurisdiction.clone().ok_or_else(|| {
                PipelineError::Config(
                    "pre-partitioned job has no jurisdiction".to_string(),
                )
            })?;
            // Already split by jurisdiction upstream: republish unchanged.
            vec![(jurisdiction, artifact.clone())]
        } else {
            let targets: Vec<(JurisdictionCode, PathBuf)> = self
                .config
                .jurisdictions
                .iter()
                .map(|code| {
                    let basename = destination_basename(&dataset.name, code, run_date, "zip");
                    (code.clone(), filtered_dir.join(basename))
                })
                .collect();

            let transcoder = self.transcoder.clone();
            let input = artifact.clone();
            let token = cancel.clone();
            let pass_targets = targets.clone();
            let result = tokio::task::spawn_blocking(move || {
                transcoder.transcode(&input, &pass_targets, &token)
            })
            .await
            .map_err(join_error)??;

            job.records_read = result.records_read;
            job.records_kept = result.records_kept();
            job.malformed = result.malformed;
            targets
        };

        job.advance(JobState::Publishing);
        for (jurisdiction, path) in &to_publish {
            let basename =
                destination_basename(&dataset.name, jurisdiction, run_date, artifact_ext(path));
            let key = object_key(dataset.key_prefix.as_deref(), run_date, &basename);
            let object = self.publisher.publish(path, &key).await?;
            job.bytes_published += object.size;
            job.published_keys.push(object.key);
        }

        job.advance(JobState::Disposing);
        if let Err(e) = dispose(
            &artifact,
            dataset.disposition,
            &self.config.staging.processed_dir,
        ) {
            // Housekeeping only: a job that published is not demoted by a
            // local cleanup failure.
            warn!(job = %job.label(), error = %e, "disposition failed");
        }

        // Drop per-job filtered outputs and now-empty staging directories.
        if !dataset.pre_partitioned {
            let _ = std::fs::remove_dir_all(&filtered_dir);
        }
        let _ = std::fs::remove_dir(&download_dir);

        Ok(())
    }
}

fn artifact_ext(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("zip")
}

fn join_error(e: tokio::task::JoinError) -> PipelineError {
    PipelineError::Io(std::io::Error::other(e.to_string()))
}
