//! Rotating JSON-lines log writer.
//!
//! Entries are appended as one JSON object per line to day-stamped files:
//! `app-YYYY-MM-DD.log` receives everything, `error-YYYY-MM-DD.log`
//! additionally receives error-level entries. Files roll over when the day
//! changes or when they outgrow the size cap, and expired files are removed
//! during rollover.
//!
//! Like [`LogHub::publish`](crate::hub::LogHub::publish), the append path
//! sits underneath the process's own log stream and therefore never logs.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;

use crate::error::Result;
use crate::types::{LogEntry, LogLevel};

/// Default size cap per file: 20 MB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

/// Default retention for application files, in days.
pub const DEFAULT_APP_RETAIN_DAYS: u32 = 14;

/// Default retention for error files, in days.
pub const DEFAULT_ERROR_RETAIN_DAYS: u32 = 30;

/// Tuning knobs for [`RotatingWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Size cap per file before a numbered rollover.
    pub max_file_size: u64,
    /// Days to keep application files.
    pub app_retain_days: u32,
    /// Days to keep error files.
    pub error_retain_days: u32,
}

impl WriterConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            app_retain_days: DEFAULT_APP_RETAIN_DAYS,
            error_retain_days: DEFAULT_ERROR_RETAIN_DAYS,
        }
    }

    /// Set the per-file size cap.
    #[must_use]
    pub const fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Set application file retention.
    #[must_use]
    pub const fn with_app_retain_days(mut self, days: u32) -> Self {
        self.app_retain_days = days;
        self
    }

    /// Set error file retention.
    #[must_use]
    pub const fn with_error_retain_days(mut self, days: u32) -> Self {
        self.error_retain_days = days;
        self
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    App,
    Error,
}

impl Family {
    const fn prefix(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Error => "error",
        }
    }

    const fn retain_days(self, config: &WriterConfig) -> u32 {
        match self {
            Self::App => config.app_retain_days,
            Self::Error => config.error_retain_days,
        }
    }
}

struct OpenLog {
    date: NaiveDate,
    path: PathBuf,
    file: BufWriter<File>,
    bytes: u64,
}

/// Appends log entries to day-stamped JSON-lines files.
///
/// Every write is flushed so the files stay tailable.
pub struct RotatingWriter {
    dir: PathBuf,
    config: WriterConfig,
    app: Mutex<Option<OpenLog>>,
    error: Mutex<Option<OpenLog>>,
}

impl RotatingWriter {
    /// Creates a writer rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, config: WriterConfig) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            config,
            app: Mutex::new(None),
            error: Mutex::new(None),
        })
    }

    /// The directory this writer appends into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends an entry to the application file, and to the error file as
    /// well when it is error level.
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        self.write_family(Family::App, &line)?;
        if entry.level == LogLevel::Error {
            self.write_family(Family::Error, &line)?;
        }
        Ok(())
    }

    fn write_family(&self, family: Family, line: &str) -> Result<()> {
        let today = Utc::now().date_naive();
        let slot = match family {
            Family::App => &self.app,
            Family::Error => &self.error,
        };
        let mut guard = slot.lock();

        if guard.as_ref().is_none_or(|open| open.date != today) {
            *guard = Some(self.open_current(family, today)?);
        }

        let needed = line.len() as u64 + 1;
        // Never roll an empty file, or an oversized single line would roll
        // forever.
        if guard
            .as_ref()
            .is_some_and(|open| open.bytes > 0 && open.bytes + needed > self.config.max_file_size)
        {
            let rolled = guard.take();
            if let Some(open) = rolled {
                self.roll_numbered(family, open)?;
            }
            *guard = Some(self.open_current(family, today)?);
        }

        if let Some(open) = guard.as_mut() {
            open.file.write_all(line.as_bytes())?;
            open.file.write_all(b"\n")?;
            open.file.flush()?;
            open.bytes += needed;
        }
        Ok(())
    }

    fn open_current(&self, family: Family, date: NaiveDate) -> Result<OpenLog> {
        self.sweep_expired(family, date);

        let path = self.dir.join(format!("{}-{date}.log", family.prefix()));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(OpenLog {
            date,
            path,
            file: BufWriter::new(file),
            bytes,
        })
    }

    /// Renames a full file to the next free numbered name for its day.
    fn roll_numbered(&self, family: Family, open: OpenLog) -> Result<()> {
        let mut file = open.file;
        file.flush()?;
        drop(file);

        for n in 1.. {
            let rolled = self
                .dir
                .join(format!("{}-{}.{n}.log", family.prefix(), open.date));
            if !rolled.exists() {
                fs::rename(&open.path, &rolled)?;
                return Ok(());
            }
        }
        Ok(())
    }

    /// Removes files of this family older than its retention window.
    fn sweep_expired(&self, family: Family, today: NaiveDate) {
        let retain = i64::from(family.retain_days(&self.config));
        let prefix = format!("{}-", family.prefix());
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return;
        };

        for dirent in read_dir.flatten() {
            let name = dirent.file_name().to_string_lossy().into_owned();
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            if !name.ends_with(".log") {
                continue;
            }
            let Some(stamp) = rest.get(..10) else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(stamp, "%Y-%m-%d") else {
                continue;
            };
            if (today - date).num_days() > retain {
                let _ = fs::remove_file(dirent.path());
            }
        }
    }
}

impl std::fmt::Debug for RotatingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
