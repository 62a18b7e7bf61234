//! Remote source fetching
//!
//! Downloads source archives into the job's staging area with bounded
//! retries and exponential backoff, reporting bytes and elapsed time per
//! attempt. Two transports are supported: paths on the configured FTP server
//! and absolute HTTP(S) URLs. HTTP transfers resume from a partial `.part`
//! file using byte-range continuation; FTP transfers restart from zero on
//! retry.

pub mod ftp;
pub mod http;

pub use ftp::{FtpConfig, RemoteFile};

use rede_common::{PipelineError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SourceLocator;

/// One fetch attempt's accounting, surfaced in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct FetchAttempt {
    pub attempt: u32,
    pub bytes_transferred: u64,
    pub elapsed_ms: u64,
    /// Failure reason; `None` on the successful attempt.
    pub error: Option<String>,
}

/// Result of a completed fetch.
#[derive(Debug, Serialize)]
pub struct FetchReport {
    pub local_path: PathBuf,
    pub bytes_transferred: u64,
    pub attempts: Vec<FetchAttempt>,
}

/// Retry schedule for transfers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt: `base * 2^(attempt-1)`.
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Transport-level failure carrying partial-transfer accounting.
pub(crate) struct TransportError {
    pub reason: String,
    pub bytes_transferred: u64,
    pub cancelled: bool,
}

impl TransportError {
    pub(crate) fn new(reason: impl Into<String>, bytes_transferred: u64) -> Self {
        Self {
            reason: reason.into(),
            bytes_transferred,
            cancelled: false,
        }
    }

    pub(crate) fn cancelled(bytes_transferred: u64) -> Self {
        Self {
            reason: "transfer cancelled".to_string(),
            bytes_transferred,
            cancelled: true,
        }
    }
}

/// Retrieves remote archives into local staging.
#[derive(Debug, Clone)]
pub struct Fetcher {
    ftp: FtpConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(ftp: FtpConfig, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent("rede-fetcher/0.1")
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { ftp, http, retry })
    }

    /// Download `locator` into `dest_dir`, retrying with backoff.
    ///
    /// Exhausted attempts yield a transfer error, fatal for the owning job
    /// only. The report records every attempt's bytes and elapsed time.
    pub async fn fetch(
        &self,
        locator: &SourceLocator,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<FetchReport> {
        tokio::fs::create_dir_all(dest_dir).await?;

        let mut attempts = Vec::new();
        let mut last_reason = String::new();

        for attempt in 1..=self.retry.max_attempts {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let started = Instant::now();
            let outcome = match locator {
                SourceLocator::Http { url } => {
                    http::download(&self.http, url, dest_dir, cancel).await
                },
                SourceLocator::Ftp { path } => {
                    let config = self.ftp.clone();
                    let path = path.clone();
                    let dest = dest_dir.to_path_buf();
                    let token = cancel.clone();
                    match tokio::task::spawn_blocking(move || {
                        ftp::download_sync(&config, &path, &dest, &token)
                    })
                    .await
                    {
                        Ok(res) => res,
                        Err(e) => Err(TransportError::new(
                            format!("FTP task panicked: {}", e),
                            0,
                        )),
                    }
                },
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match outcome {
                Ok((local_path, bytes)) => {
                    attempts.push(FetchAttempt {
                        attempt,
                        bytes_transferred: bytes,
                        elapsed_ms,
                        error: None,
                    });
                    info!(
                        locator = %locator,
                        bytes,
                        elapsed_ms,
                        attempt,
                        "fetch complete"
                    );
                    let bytes_transferred =
                        attempts.iter().map(|a| a.bytes_transferred).sum();
                    return Ok(FetchReport {
                        local_path,
                        bytes_transferred,
                        attempts,
                    });
                },
                Err(e) => {
                    attempts.push(FetchAttempt {
                        attempt,
                        bytes_transferred: e.bytes_transferred,
                        elapsed_ms,
                        error: Some(e.reason.clone()),
                    });
                    if e.cancelled {
                        return Err(PipelineError::Cancelled);
                    }
                    last_reason = e.reason;
                    if attempt < self.retry.max_attempts {
                        let delay = self.retry.delay_after(attempt);
                        warn!(
                            locator = %locator,
                            attempt,
                            max_attempts = self.retry.max_attempts,
                            error = %last_reason,
                            "fetch attempt failed, retrying in {:?}",
                            delay
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {},
                            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                        }
                    }
                },
            }
        }

        Err(PipelineError::Transfer {
            locator: locator.to_string(),
            attempts: self.retry.max_attempts,
            reason: last_reason,
        })
    }

    /// List a remote FTP directory, keeping plain files whose names contain
    /// `pattern` (all files when `pattern` is `None`).
    ///
    /// Used to discover per-jurisdiction source files for pre-partitioned
    /// datasets.
    pub async fn list(
        &self,
        dir_path: &str,
        pattern: Option<&str>,
    ) -> Result<Vec<RemoteFile>> {
        let config = self.ftp.clone();
        let path = dir_path.to_string();

        let mut last_reason = String::new();
        for attempt in 1..=self.retry.max_attempts {
            let result = {
                let config = config.clone();
                let path = path.clone();
                match tokio::task::spawn_blocking(move || ftp::list_sync(&config, &path)).await {
                    Ok(res) => res,
                    Err(e) => Err(format!("FTP task panicked: {}", e)),
                }
            };

            match result {
                Ok(entries) => {
                    let files: Vec<RemoteFile> = entries
                        .into_iter()
                        .filter(|f| pattern.map_or(true, |p| f.name.contains(p)))
                        .collect();
                    info!(path = %dir_path, count = files.len(), "listed remote directory");
                    return Ok(files);
                },
                Err(reason) => {
                    last_reason = reason;
                    if attempt < self.retry.max_attempts {
                        let delay = self.retry.delay_after(attempt);
                        warn!(
                            path = %dir_path,
                            attempt,
                            error = %last_reason,
                            "LIST attempt failed, retrying in {:?}",
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }

        Err(PipelineError::Transfer {
            locator: format!("ftp:{}", dir_path),
            attempts: self.retry.max_attempts,
            reason: last_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }
}
