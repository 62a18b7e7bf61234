//! Streaming archive transcoder
//!
//! Consumes a ZIP archive of delimited text files and produces one filtered
//! ZIP archive per target jurisdiction, in a single forward-only read pass.
//! Memory stays bounded at one line plus the compression codec's working
//! set, independent of input size: entries are read line-by-line and matching
//! lines are written straight through to every jurisdiction's open output
//! entry (fan-out write).
//!
//! The header line of each text entry is copied byte-for-byte as the first
//! line of the corresponding output entry, and is written even when no
//! record matches, so downstream consumers always see the file and header
//! shape.

use rede_common::types::JurisdictionCode;
use rede_common::{PipelineError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::filter::{locate_column, split_record, RecordFilter};

/// How often the read loop checks the cancellation token, in records.
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// How often filter progress is logged, in records.
const PROGRESS_LOG_INTERVAL: u64 = 100_000;

/// Outcome of one transcode pass.
#[derive(Debug, Serialize)]
pub struct TranscodeResult {
    /// Data records read across all text entries (header lines excluded).
    pub records_read: u64,

    /// Records skipped as malformed: short records and undecodable lines.
    pub malformed: u64,

    /// Records kept, per jurisdiction.
    pub kept: BTreeMap<JurisdictionCode, u64>,

    /// Finalized output archives, one per jurisdiction.
    pub outputs: Vec<FilteredArchive>,
}

impl TranscodeResult {
    /// Total records kept across all jurisdictions.
    pub fn records_kept(&self) -> u64 {
        self.kept.values().sum()
    }
}

/// One finalized per-jurisdiction output archive.
#[derive(Debug, Serialize)]
pub struct FilteredArchive {
    pub jurisdiction: JurisdictionCode,
    pub path: PathBuf,
}

/// Line-oriented archive filter with fixed column and delimiter settings.
#[derive(Debug, Clone)]
pub struct Transcoder {
    filter_column: String,
    delimiter: char,
}

struct JurisdictionSink {
    jurisdiction: JurisdictionCode,
    filter: RecordFilter,
    writer: ZipWriter<BufWriter<File>>,
    path: PathBuf,
    kept: u64,
}

impl Transcoder {
    pub fn new(filter_column: impl Into<String>, delimiter: char) -> Self {
        Self {
            filter_column: filter_column.into(),
            delimiter,
        }
    }

    /// Filter `input` into one archive per jurisdiction.
    ///
    /// `outputs` maps each target jurisdiction to the path its archive is
    /// written to; the map is materialized into open sink handles before the
    /// read loop begins. The input is read exactly once regardless of how
    /// many jurisdictions are requested.
    pub fn transcode(
        &self,
        input: &Path,
        outputs: &[(JurisdictionCode, PathBuf)],
        cancel: &CancellationToken,
    ) -> Result<TranscodeResult> {
        let file = File::open(input)?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| corrupt(input, &e.to_string()))?;

        let mut sinks = Vec::with_capacity(outputs.len());
        for (jurisdiction, path) in outputs {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            sinks.push(JurisdictionSink {
                jurisdiction: jurisdiction.clone(),
                filter: RecordFilter::new([jurisdiction]),
                writer: ZipWriter::new(BufWriter::new(File::create(path)?)),
                path: path.clone(),
                kept: 0,
            });
        }

        let mut records_read = 0u64;
        let mut malformed = 0u64;

        for index in 0..archive.len() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let entry = archive
                .by_index(index)
                .map_err(|e| corrupt(input, &e.to_string()))?;
            let name = entry.name().to_string();

            if entry.is_dir() || !is_text_entry(&name) {
                warn!(entry = %name, "skipping non-text archive entry");
                continue;
            }

            self.filter_entry(
                input,
                entry,
                &name,
                &mut sinks,
                &mut records_read,
                &mut malformed,
                cancel,
            )?;
        }

        let mut result = TranscodeResult {
            records_read,
            malformed,
            kept: BTreeMap::new(),
            outputs: Vec::with_capacity(sinks.len()),
        };

        for sink in sinks {
            let mut inner = sink
                .writer
                .finish()
                .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;
            inner.flush()?;
            result.kept.insert(sink.jurisdiction.clone(), sink.kept);
            result.outputs.push(FilteredArchive {
                jurisdiction: sink.jurisdiction,
                path: sink.path,
            });
        }

        if malformed > 0 {
            warn!(malformed, input = %input.display(), "skipped malformed records");
        }

        Ok(result)
    }

    /// Filter one text entry into every jurisdiction sink.
    #[allow(clippy::too_many_arguments)]
    fn filter_entry(
        &self,
        input: &Path,
        entry: impl Read,
        name: &str,
        sinks: &mut [JurisdictionSink],
        records_read: &mut u64,
        malformed: &mut u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut reader = BufReader::with_capacity(256 * 1024, entry);
        let mut line: Vec<u8> = Vec::with_capacity(8 * 1024);

        // Header: resolved once per entry, copied byte-identically.
        if read_raw_line(&mut reader, &mut line).map_err(|e| corrupt(input, &e.to_string()))? == 0 {
            warn!(entry = %name, "archive entry is empty, skipping");
            return Ok(());
        }

        let header_text = std::str::from_utf8(trim_line_ending(&line)).map_err(|_| {
            PipelineError::ColumnMissing {
                column: self.filter_column.clone(),
                entry: name.to_string(),
            }
        })?;
        let header_fields = split_record(header_text, self.delimiter);
        let column_index = locate_column(&header_fields, &self.filter_column, name)?;

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(true);

        for sink in sinks.iter_mut() {
            sink.writer
                .start_file(entry_output_name(name, &sink.jurisdiction), options)
                .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;
            sink.writer.write_all(&line)?;
        }

        let mut entry_records = 0u64;
        loop {
            if read_raw_line(&mut reader, &mut line).map_err(|e| corrupt(input, &e.to_string()))? == 0 {
                break;
            }

            *records_read += 1;
            entry_records += 1;

            if entry_records % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if entry_records % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    entry = %name,
                    records = entry_records,
                    "filter progress"
                );
            }

            let text = match std::str::from_utf8(trim_line_ending(&line)) {
                Ok(text) => text,
                Err(_) => {
                    *malformed += 1;
                    continue;
                },
            };
            let fields = split_record(text, self.delimiter);
            if fields.len() <= column_index {
                *malformed += 1;
                continue;
            }

            for sink in sinks.iter_mut() {
                if sink.filter.accepts(&fields, column_index) {
                    sink.writer.write_all(&line)?;
                    sink.kept += 1;
                }
            }
        }

        debug!(entry = %name, records = entry_records, "entry filtered");
        Ok(())
    }
}

/// Check that an archive's entry table and local headers are readable.
///
/// Run after download, before transcoding, so truncated transfers fail fast
/// with a corrupt-archive error instead of partway through a filter pass.
pub fn verify_archive(path: &Path) -> Result<()> {
    let file = File::open(path)?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(path, &e.to_string()))?;
    for index in 0..archive.len() {
        archive
            .by_index(index)
            .map_err(|e| corrupt(path, &e.to_string()))?;
    }
    Ok(())
}

/// Output entry name for one jurisdiction: `{stem}_filtered_{CODE}.{ext}`.
fn entry_output_name(entry_name: &str, jurisdiction: &JurisdictionCode) -> String {
    let base = entry_name.rsplit('/').next().unwrap_or(entry_name);
    match base.rsplit_once('.') {
        Some((stem, ext)) => format!("{}_filtered_{}.{}", stem, jurisdiction, ext),
        None => format!("{}_filtered_{}", base, jurisdiction),
    }
}

fn is_text_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".txt") || lower.ends_with(".csv")
}

/// Read one raw line including its line ending; returns 0 at end of stream.
fn read_raw_line(reader: &mut impl BufRead, line: &mut Vec<u8>) -> std::io::Result<usize> {
    line.clear();
    reader.read_until(b'\n', line)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn corrupt(path: &Path, reason: &str) -> PipelineError {
    PipelineError::CorruptArchive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
