//! REDE Pipeline Library
//!
//! Streaming transform pipeline for nationwide real-estate data extracts:
//! fetch a compressed extract from its vendor source, keep only the records
//! belonging to the configured jurisdictions, repackage the result, and
//! publish it to object storage for downstream consumers.
//!
//! # Components
//!
//! - [`filter`]: header-driven column location and record filtering
//! - [`transcode`]: single-pass streaming archive filter with per-jurisdiction
//!   fan-out outputs
//! - [`fetch`]: FTP/HTTP retrieval into staging with retries and resume
//! - [`publish`]: object-storage uploads under deterministic keys
//! - [`dispose`]: source-artifact retention policies
//! - [`orchestrator`]: per-run job scheduling, isolation, and summary
//!
//! # Example
//!
//! ```no_run
//! use rede_pipeline::config::PipelineConfig;
//! use rede_pipeline::fetch::{Fetcher, FtpConfig, RetryPolicy};
//! use rede_pipeline::orchestrator::Orchestrator;
//! use rede_pipeline::publish::{Publisher, StorageConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(PipelineConfig::load(std::path::Path::new("rede.toml"))?);
//!     let fetcher = Fetcher::new(FtpConfig::from_env()?, RetryPolicy::default())?;
//!     let publisher = Publisher::new(StorageConfig::from_env()?);
//!
//!     let orchestrator = Orchestrator::new(config, fetcher, publisher);
//!     orchestrator.run(&CancellationToken::new()).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispose;
pub mod fetch;
pub mod filter;
pub mod job;
pub mod orchestrator;
pub mod publish;
pub mod transcode;

// Re-export main types
pub use config::{DatasetConfig, PipelineConfig, SourceLocator};
pub use fetch::{FetchReport, Fetcher, FtpConfig, RetryPolicy};
pub use job::{Job, JobState, RunSummary};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use publish::{Publisher, StorageConfig};
pub use transcode::{TranscodeResult, Transcoder};
