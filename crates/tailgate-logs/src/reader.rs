//! JSON-lines log file reading.
//!
//! Log files hold one JSON-encoded [`LogEntry`] per line. Readers are
//! forgiving: malformed lines are skipped, and a read error in the middle
//! of a file yields the entries collected up to that point. Only failing
//! to open a file at all is reported as an error.

use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{LogEntry, LogFileInfo};

/// Reads every parseable entry from a JSON-lines log file.
///
/// Blank and malformed lines are skipped. An I/O error after the file has
/// been opened ends the read early and returns the partial result.
pub async fn read_log_file(path: impl AsRef<Path>) -> Result<Vec<LogEntry>> {
    let path = path.as_ref();
    let file = fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    Err(_) => skipped += 1,
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!(
                    path = %path.display(),
                    error = %err,
                    parsed = entries.len(),
                    "log file read ended early"
                );
                break;
            }
        }
    }

    if skipped > 0 {
        debug!(path = %path.display(), skipped, "skipped malformed log lines");
    }
    Ok(entries)
}

/// Lists the `.log` files in a directory, newest first by modification time.
///
/// A missing or unreadable directory yields an empty list. Files whose
/// metadata cannot be read are skipped.
pub async fn list_log_files(dir: impl AsRef<Path>) -> Vec<LogFileInfo> {
    let dir = dir.as_ref();
    let mut read_dir = match fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "log directory unavailable");
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    while let Ok(Some(dirent)) = read_dir.next_entry().await {
        let name = dirent.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".log") {
            continue;
        }
        let Ok(metadata) = dirent.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        files.push(LogFileInfo {
            name,
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
        });
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    files
}
