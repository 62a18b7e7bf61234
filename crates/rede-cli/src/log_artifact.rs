//! Log-artifact publishing
//!
//! After a run, the current log file is uploaded to object storage under
//! `logs/{YYYY-MM-DD}/` so run history survives host rotation. The log
//! publisher is just another consumer of the pipeline's `Publisher`; a
//! failed upload is a warning, never a run failure.

use chrono::Local;
use rede_common::logging::{LogConfig, LogOutput};
use rede_pipeline::publish::Publisher;
use tracing::{info, warn};

/// Upload today's log file, when file logging is enabled and the file exists.
pub async fn publish_current_log(publisher: &Publisher, log_config: &LogConfig) {
    if !matches!(log_config.output, LogOutput::File | LogOutput::Both) {
        return;
    }

    let today = Local::now().date_naive();
    let path = log_config.current_log_path(today);
    if !path.exists() {
        return;
    }

    let file_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_string(),
        None => return,
    };
    let key = format!("logs/{}/{}", today.format("%Y-%m-%d"), file_name);

    match publisher.publish(&path, &key).await {
        Ok(object) => info!(key = %object.key, size = object.size, "log artifact published"),
        Err(e) => warn!(error = %e, "failed to publish log artifact"),
    }
}
