//! FTP transport
//!
//! Synchronous `suppaftp` client driven from a blocking task. Transfers
//! stream straight into the staging file in fixed-size chunks so multi-
//! gigabyte downloads never buffer in memory; the chunk loop observes the
//! cancellation token. All operations use Extended Passive Mode for
//! NAT/firewall compatibility.

use rede_common::{PipelineError, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use suppaftp::FtpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::TransportError;

/// Copy chunk size for FTP data connections.
const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Configuration for the FTP connection.
///
/// Credentials are read from the environment at process start; the rest of
/// the pipeline only ever sees this opaque handle.
#[derive(Debug, Clone, Serialize)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl FtpConfig {
    /// Read connection settings from `REDE_FTP_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("REDE_FTP_HOST")
            .map_err(|_| PipelineError::Config("REDE_FTP_HOST is not set".to_string()))?;
        let port = std::env::var("REDE_FTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(21);
        let username = std::env::var("REDE_FTP_USERNAME")
            .map_err(|_| PipelineError::Config("REDE_FTP_USERNAME is not set".to_string()))?;
        let password = std::env::var("REDE_FTP_PASSWORD")
            .map_err(|_| PipelineError::Config("REDE_FTP_PASSWORD is not set".to_string()))?;
        Ok(Self {
            host,
            port,
            username,
            password,
        })
    }
}

/// A plain file discovered while browsing a remote directory.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteFile {
    /// File name within its directory.
    pub name: String,
    /// Full remote path, usable as an FTP source locator.
    pub path: String,
    /// Size in bytes when the LIST response provides one.
    pub size: Option<u64>,
}

/// Download `remote_path` into `dest_dir`, streaming chunk-by-chunk.
///
/// Returns the final local path and bytes written. On failure the partial
/// file is removed; a retried FTP transfer restarts from zero.
pub(crate) fn download_sync(
    config: &FtpConfig,
    remote_path: &str,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> std::result::Result<(PathBuf, u64), TransportError> {
    let file_name = remote_path
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(remote_path);
    let dest = dest_dir.join(file_name);

    let mut ftp_stream = connect(config)?;

    ftp_stream
        .transfer_type(suppaftp::types::FileType::Binary)
        .map_err(|e| TransportError::new(format!("failed to set binary mode: {}", e), 0))?;

    debug!(path = %remote_path, "downloading file");

    let outcome: std::result::Result<u64, TransportError> = {
        let file = File::create(&dest)
            .map_err(|e| TransportError::new(format!("cannot create {}: {}", dest.display(), e), 0));
        match file {
            Ok(file) => {
                let mut writer = BufWriter::new(file);
                let cancel = cancel.clone();
                let retr = ftp_stream.retr(remote_path, |reader| {
                    copy_stream(reader, &mut writer, &cancel)
                        .map_err(|e| suppaftp::FtpError::ConnectionError(e))
                });
                match retr {
                    Ok(bytes) => writer
                        .flush()
                        .map(|_| bytes)
                        .map_err(|e| TransportError::new(format!("flush failed: {}", e), bytes)),
                    Err(e) => {
                        let cancelled = cancel.is_cancelled();
                        let bytes = std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
                        Err(if cancelled {
                            TransportError::cancelled(bytes)
                        } else {
                            TransportError::new(
                                format!("RETR {} failed: {}", remote_path, e),
                                bytes,
                            )
                        })
                    },
                }
            },
            Err(e) => Err(e),
        }
    };

    if let Err(e) = ftp_stream.quit() {
        warn!("failed to quit FTP session gracefully: {}", e);
    }

    match outcome {
        Ok(bytes) => Ok((dest, bytes)),
        Err(e) => {
            if dest.exists() {
                let _ = std::fs::remove_file(&dest);
            }
            Err(e)
        },
    }
}

/// List a remote directory, returning plain files only.
pub(crate) fn list_sync(
    config: &FtpConfig,
    dir_path: &str,
) -> std::result::Result<Vec<RemoteFile>, String> {
    let mut ftp_stream = connect(config).map_err(|e| e.reason)?;

    debug!(path = %dir_path, "listing directory");
    let lines = ftp_stream
        .list(Some(dir_path))
        .map_err(|e| format!("LIST {} failed: {}", dir_path, e))?;

    let files = lines
        .iter()
        .filter_map(|line| FtpEntry::parse(line))
        .filter(|entry| !entry.is_directory)
        .map(|entry| RemoteFile {
            path: format!("{}/{}", dir_path.trim_end_matches('/'), entry.name),
            name: entry.name,
            size: entry.size,
        })
        .collect();

    if let Err(e) = ftp_stream.quit() {
        warn!("failed to quit FTP session gracefully: {}", e);
    }

    Ok(files)
}

fn connect(config: &FtpConfig) -> std::result::Result<FtpStream, TransportError> {
    debug!(host = %config.host, port = config.port, "connecting to FTP server");

    let mut ftp_stream = FtpStream::connect(format!("{}:{}", config.host, config.port))
        .map_err(|e| TransportError::new(format!("failed to connect: {}", e), 0))?;

    ftp_stream.set_mode(suppaftp::Mode::ExtendedPassive);

    ftp_stream
        .login(&config.username, &config.password)
        .map_err(|e| TransportError::new(format!("FTP login failed: {}", e), 0))?;

    Ok(ftp_stream)
}

/// Chunked copy observing the cancellation token between chunks.
fn copy_stream(
    reader: &mut dyn Read,
    writer: &mut impl Write,
    cancel: &CancellationToken,
) -> std::io::Result<u64> {
    let mut buffer = [0u8; COPY_CHUNK_BYTES];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(std::io::Error::other("transfer cancelled"));
        }
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            return Ok(total);
        }
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }
}

/// Parsed FTP LIST entry.
///
/// LIST output varies by server, but Unix-style listings look like:
/// `-rw-r--r--   1 ftp ftp  123456 Jan 15 12:00 TAXASSESSOR_CA_0001.zip`
#[derive(Debug, Clone)]
struct FtpEntry {
    name: String,
    is_directory: bool,
    size: Option<u64>,
}

impl FtpEntry {
    fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return None;
        }

        let is_directory = parts[0].starts_with('d');
        let name = parts.last()?.to_string();
        let size = if parts.len() >= 5 {
            parts[4].parse().ok()
        } else {
            None
        };

        Some(Self {
            name,
            is_directory,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_entry() {
        let entry = FtpEntry::parse(
            "-rw-r--r--   1 ftp ftp  123456 Jan 15 12:00 TAXASSESSOR_CA_0001.zip",
        )
        .unwrap();
        assert_eq!(entry.name, "TAXASSESSOR_CA_0001.zip");
        assert!(!entry.is_directory);
        assert_eq!(entry.size, Some(123456));
    }

    #[test]
    fn test_parse_directory_entry() {
        let entry = FtpEntry::parse("drwxr-xr-x   2 ftp ftp  4096 Jan 15 12:00 Outgoing").unwrap();
        assert_eq!(entry.name, "Outgoing");
        assert!(entry.is_directory);
    }

    #[test]
    fn test_parse_rejects_short_lines() {
        assert!(FtpEntry::parse("").is_none());
        assert!(FtpEntry::parse("total 12").is_none());
    }

    #[test]
    fn test_copy_stream_counts_bytes() {
        let data = vec![7u8; 100_000];
        let mut out = Vec::new();
        let copied = copy_stream(
            &mut data.as_slice(),
            &mut out,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(copied, 100_000);
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_stream_observes_cancellation() {
        let data = vec![7u8; 10];
        let mut out = Vec::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = copy_stream(&mut data.as_slice(), &mut out, &cancel).unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn test_ftp_config_from_env_requires_host() {
        std::env::remove_var("REDE_FTP_HOST");
        assert!(FtpConfig::from_env().is_err());
    }
}
