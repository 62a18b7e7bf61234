//! HTTP transport
//!
//! Streaming downloads with byte-range resume. Each transfer writes into a
//! `.part` file next to the final name; a retried attempt asks the server to
//! continue from the partial file's length and appends on a `206 Partial
//! Content` response. Servers that ignore the range request answer `200` and
//! the partial file is truncated and rewritten.

use futures::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::TransportError;

/// Download `url` into `dest_dir`, resuming a partial transfer when present.
///
/// Returns the final local path and the bytes transferred by this attempt
/// (excluding any previously-downloaded prefix).
pub(crate) async fn download(
    client: &reqwest::Client,
    url: &str,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> std::result::Result<(PathBuf, u64), TransportError> {
    let file_name = file_name_for(url);
    let dest = dest_dir.join(&file_name);
    let part = dest_dir.join(format!("{}.part", file_name));

    let resume_from = tokio::fs::metadata(&part).await.map(|m| m.len()).unwrap_or(0);

    let mut request = client.get(url);
    if resume_from > 0 {
        debug!(url, resume_from, "resuming partial download");
        request = request.header(RANGE, format!("bytes={}-", resume_from));
    }

    let response = request
        .send()
        .await
        .map_err(|e| TransportError::new(format!("request failed: {}", e), 0))?;

    let status = response.status();
    let (append, total_size) = match status {
        StatusCode::PARTIAL_CONTENT => {
            let total = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.rsplit('/').next())
                .and_then(|v| v.parse::<u64>().ok());
            (true, total)
        },
        StatusCode::OK => (false, response.content_length()),
        _ => {
            return Err(TransportError::new(format!("HTTP error: {}", status), 0));
        },
    };

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(&part)
        .await
        .map_err(|e| TransportError::new(format!("cannot open {}: {}", part.display(), e), 0))?;

    let mut transferred = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            // Keep the partial file so a later attempt can resume.
            let _ = file.flush().await;
            return Err(TransportError::cancelled(transferred));
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = file.flush().await;
                return Err(TransportError::new(
                    format!("stream interrupted: {}", e),
                    transferred,
                ));
            },
        };
        if let Err(e) = file.write_all(&chunk).await {
            return Err(TransportError::new(
                format!("write to {} failed: {}", part.display(), e),
                transferred,
            ));
        }
        transferred += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| TransportError::new(format!("flush failed: {}", e), transferred))?;
    drop(file);

    let final_size = if append { resume_from + transferred } else { transferred };
    if let Some(expected) = total_size {
        if final_size != expected {
            return Err(TransportError::new(
                format!(
                    "download incomplete: expected {} bytes, got {}",
                    expected, final_size
                ),
                transferred,
            ));
        }
    }

    tokio::fs::rename(&part, &dest)
        .await
        .map_err(|e| TransportError::new(format!("rename failed: {}", e), transferred))?;

    info!(url, bytes = final_size, path = %dest.display(), "download complete");
    Ok((dest, transferred))
}

/// Local file name for a URL: the last path segment, or a digest-derived
/// name when the URL has no usable basename.
fn file_name_for(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let base = path.rsplit('/').next().unwrap_or("");
    if !base.is_empty() && base != path && !base.contains(':') {
        return base.to_string();
    }
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    format!("download_{}.zip", &digest[..8])
}
