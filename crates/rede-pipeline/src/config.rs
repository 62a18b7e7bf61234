//! Pipeline configuration
//!
//! The pipeline is configured from a TOML file (datasets, jurisdictions,
//! filter settings, staging directories, schedule) plus environment variables
//! for anything secret. Credentials never appear in the config file; the FTP
//! and object-storage clients read them from the environment at startup.

use rede_common::types::{DispositionPolicy, JurisdictionCode};
use rede_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default column holding the jurisdiction token in vendor extracts.
pub const DEFAULT_FILTER_COLUMN: &str = "SitusStateCode";

/// Default field delimiter for vendor extracts (tab-separated).
pub const DEFAULT_DELIMITER: char = '\t';

/// Default number of jobs allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Default number of fetch attempts before a job fails with a transfer error.
pub const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 3;

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Target jurisdiction codes; order is irrelevant, duplicates rejected.
    pub jurisdictions: Vec<JurisdictionCode>,

    /// Datasets to process each run.
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub staging: StagingConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// One logical data product (e.g. tax assessor, recorder, deed extracts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name; becomes part of every destination key.
    pub name: String,

    /// Disabled datasets are skipped (and counted) without creating jobs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Remote source locations. Strings starting with `http://`/`https://`
    /// are HTTP downloads; anything else is a path on the configured FTP
    /// server (a directory path for pre-partitioned datasets).
    pub sources: Vec<String>,

    /// Source files are already split one-per-jurisdiction and are selected
    /// by filename instead of filtered by column value.
    #[serde(default)]
    pub pre_partitioned: bool,

    /// Optional filename substring used when browsing a pre-partitioned
    /// source directory.
    #[serde(default)]
    pub name_pattern: Option<String>,

    /// What happens to the downloaded artifact after the job completes.
    #[serde(default)]
    pub disposition: DispositionPolicy,

    /// Optional prefix prepended to this dataset's destination keys.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl DatasetConfig {
    /// Parsed source locators, in configuration order.
    pub fn locators(&self) -> Vec<SourceLocator> {
        self.sources.iter().map(|s| SourceLocator::parse(s)).collect()
    }
}

/// Record-filter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Header name of the jurisdiction column.
    pub column: String,

    /// Field delimiter; a single character.
    pub delimiter: char,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            column: DEFAULT_FILTER_COLUMN.to_string(),
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

/// Local working directories.
///
/// Each job owns a distinct subtree beneath these, so concurrent jobs never
/// collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Where fetched archives land.
    pub download_dir: PathBuf,

    /// Where filtered output archives are assembled.
    pub filtered_dir: PathBuf,

    /// Where retained artifacts go under the `move`/`copy` dispositions.
    pub processed_dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("data/downloads"),
            filtered_dir: PathBuf::from("data/filtered"),
            processed_dir: PathBuf::from("data/processed"),
        }
    }
}

/// Run-level tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Upper bound on jobs in flight at once.
    pub max_concurrent_jobs: usize,

    /// Fetch attempts per source before the job fails.
    pub fetch_max_attempts: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            fetch_max_attempts: DEFAULT_FETCH_MAX_ATTEMPTS,
        }
    }
}

/// Scheduler settings for `rede schedule`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local time of day for the daily run, `HH:MM`.
    pub daily_time: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_time: "02:00".to_string(),
        }
    }
}

impl ScheduleConfig {
    /// Parse `daily_time` into a NaiveTime, validating the `HH:MM` shape.
    pub fn time(&self) -> Result<chrono::NaiveTime> {
        chrono::NaiveTime::parse_from_str(&self.daily_time, "%H:%M").map_err(|e| {
            PipelineError::Config(format!(
                "invalid schedule.daily_time '{}': {}",
                self.daily_time, e
            ))
        })
    }
}

/// A parsed remote source address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceLocator {
    /// Path on the configured FTP server (file, or directory when browsing).
    Ftp { path: String },
    /// Absolute HTTP(S) URL.
    Http { url: String },
}

impl SourceLocator {
    /// Classify a configured source string.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            SourceLocator::Http {
                url: trimmed.to_string(),
            }
        } else {
            SourceLocator::Ftp {
                path: trimmed.to_string(),
            }
        }
    }

    /// Last path segment, used for staging file names.
    pub fn file_name(&self) -> &str {
        let raw = match self {
            SourceLocator::Ftp { path } => path.as_str(),
            SourceLocator::Http { url } => url.split(['?', '#']).next().unwrap_or(url),
        };
        raw.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(raw)
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Ftp { path } => write!(f, "ftp:{}", path),
            SourceLocator::Http { url } => f.write_str(url),
        }
    }
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = toml::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.jurisdictions.is_empty() {
            return Err(PipelineError::Config(
                "at least one jurisdiction code is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for code in &self.jurisdictions {
            if !seen.insert(code) {
                return Err(PipelineError::Config(format!(
                    "duplicate jurisdiction code '{}'",
                    code
                )));
            }
        }

        let mut names = HashSet::new();
        for dataset in &self.datasets {
            if dataset.name.trim().is_empty() {
                return Err(PipelineError::Config(
                    "dataset name cannot be empty".to_string(),
                ));
            }
            if !names.insert(dataset.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "duplicate dataset name '{}'",
                    dataset.name
                )));
            }
            if dataset.sources.is_empty() {
                return Err(PipelineError::Config(format!(
                    "dataset '{}' has no sources",
                    dataset.name
                )));
            }
        }

        if self.run.max_concurrent_jobs == 0 {
            return Err(PipelineError::Config(
                "run.max_concurrent_jobs must be greater than 0".to_string(),
            ));
        }
        if self.run.fetch_max_attempts == 0 {
            return Err(PipelineError::Config(
                "run.fetch_max_attempts must be greater than 0".to_string(),
            ));
        }

        self.schedule.time()?;

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
jurisdictions = ["CA", "TX"]

[filter]
column = "SitusStateCode"
delimiter = "\t"

[run]
max_concurrent_jobs = 2
fetch_max_attempts = 3

[schedule]
daily_time = "02:00"

[[datasets]]
name = "taxassessor"
sources = ["/Outgoing/TAXASSESSOR_0001.zip"]
disposition = "move"

[[datasets]]
name = "parcel"
sources = ["https://files.example.com/extracts/parcel.zip"]
pre_partitioned = true
name_pattern = "PARCEL_"
key_prefix = "parcel-extracts"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: PipelineConfig = toml::from_str(sample_toml()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.jurisdictions.len(), 2);
        assert_eq!(config.filter.delimiter, '\t');
        assert_eq!(config.datasets.len(), 2);
        assert!(config.datasets[0].enabled);
        assert_eq!(config.datasets[0].disposition, DispositionPolicy::Move);
        assert_eq!(config.datasets[1].disposition, DispositionPolicy::Delete);
        assert!(config.datasets[1].pre_partitioned);
        assert_eq!(config.datasets[1].key_prefix.as_deref(), Some("parcel-extracts"));
    }

    #[test]
    fn test_duplicate_jurisdictions_rejected() {
        let toml = r#"
jurisdictions = ["CA", "CA"]

[[datasets]]
name = "x"
sources = ["/a.zip"]
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate jurisdiction"));
    }

    #[test]
    fn test_empty_jurisdictions_rejected() {
        let config: PipelineConfig = toml::from_str("jurisdictions = []").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_schedule_time_rejected() {
        let toml = r#"
jurisdictions = ["CA"]

[schedule]
daily_time = "25:99"
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dataset_without_sources_rejected() {
        let toml = r#"
jurisdictions = ["CA"]

[[datasets]]
name = "empty"
sources = []
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_locator_classification() {
        assert_eq!(
            SourceLocator::parse("https://files.example.com/a.zip"),
            SourceLocator::Http {
                url: "https://files.example.com/a.zip".to_string()
            }
        );
        assert_eq!(
            SourceLocator::parse("/Outgoing/TAXASSESSOR_0001.zip"),
            SourceLocator::Ftp {
                path: "/Outgoing/TAXASSESSOR_0001.zip".to_string()
            }
        );
    }

    #[test]
    fn test_source_locator_file_name() {
        let ftp = SourceLocator::parse("/Outgoing/TAXASSESSOR_0001.zip");
        assert_eq!(ftp.file_name(), "TAXASSESSOR_0001.zip");

        let http = SourceLocator::parse("https://files.example.com/x/parcel.zip?token=abc");
        assert_eq!(http.file_name(), "parcel.zip");
    }

    #[test]
    fn test_defaults() {
        let config: PipelineConfig = toml::from_str("jurisdictions = [\"WA\"]").unwrap();
        assert_eq!(config.filter.column, DEFAULT_FILTER_COLUMN);
        assert_eq!(config.filter.delimiter, '\t');
        assert_eq!(config.run.max_concurrent_jobs, DEFAULT_MAX_CONCURRENT_JOBS);
        assert_eq!(config.schedule.daily_time, "02:00");
        config.validate().unwrap();
    }
}
