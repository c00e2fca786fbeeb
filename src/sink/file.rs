//! One-file-per-entry log sink.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{LogEntry, LogSink, SinkError, SinkResult};

/// Default directory for error log files.
pub const DEFAULT_LOG_DIR: &str = "errorLogs";

/// Gives up after this many name collisions for the same timestamp.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Writes each entry to its own file in a log directory.
///
/// File names are `<timestamp> - <description>.log`; an existing file is never
/// overwritten, a ` (n)` suffix is added instead.
#[derive(Debug, Clone)]
pub struct FileLogSink {
    dir: PathBuf,
}

impl Default for FileLogSink {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_DIR)
    }
}

impl FileLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File stem for an entry, safe on every platform.
    fn file_stem(entry: &LogEntry) -> String {
        let description: String = entry
            .description
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!(
            "{} - {}",
            entry.timestamp.format("%Y-%m-%dT%H-%M-%S%.3fZ"),
            description
        )
    }
}

#[async_trait]
impl LogSink for FileLogSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn write_log(&self, entry: &LogEntry) -> SinkResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let stem = Self::file_stem(entry);
        let contents = entry.render();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 0 {
                format!("{}.log", stem)
            } else {
                format!("{} ({}).log", stem, attempt)
            };
            let path = self.dir.join(file_name);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(contents.as_bytes()).await?;
                    file.flush().await?;
                    tracing::debug!(path = %path.display(), "wrote error log file");
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(SinkError::Io(e)),
            }
        }

        Err(SinkError::Unavailable(format!(
            "no free log file name for '{}'",
            stem
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn entry(description: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap(),
            description: description.to_string(),
            message: "Invalid _id: invalid_id".to_string(),
            http_status: 400,
            stack: "DatabaseError: Invalid _id: invalid_id".to_string(),
        }
    }

    fn log_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_file_stem_is_filesystem_safe() {
        assert_eq!(
            FileLogSink::file_stem(&entry("DATABASE_ERROR")),
            "2024-03-01T12-30-45.000Z - DATABASE_ERROR"
        );
        assert_eq!(
            FileLogSink::file_stem(&entry("../etc/passwd")),
            "2024-03-01T12-30-45.000Z - ___etc_passwd"
        );
    }

    #[tokio::test]
    async fn test_writes_rendered_entry() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("errorLogs");
        let sink = FileLogSink::new(&dir);

        tokio_test::assert_ok!(sink.write_log(&entry("DATABASE_ERROR")).await);

        let files = log_files(&dir);
        assert_eq!(files, vec!["2024-03-01T12-30-45.000Z - DATABASE_ERROR.log"]);
        let contents = std::fs::read_to_string(dir.join(&files[0])).unwrap();
        assert_eq!(contents, entry("DATABASE_ERROR").render());
    }

    #[tokio::test]
    async fn test_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileLogSink::new(temp_dir.path());

        sink.write_log(&entry("DATABASE_ERROR")).await.unwrap();
        sink.write_log(&entry("DATABASE_ERROR")).await.unwrap();
        sink.write_log(&entry("DATABASE_ERROR")).await.unwrap();

        assert_eq!(
            log_files(temp_dir.path()),
            vec![
                "2024-03-01T12-30-45.000Z - DATABASE_ERROR (1).log",
                "2024-03-01T12-30-45.000Z - DATABASE_ERROR (2).log",
                "2024-03-01T12-30-45.000Z - DATABASE_ERROR.log",
            ]
        );
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file in the way").unwrap();

        let sink = FileLogSink::new(blocker.join("logs"));
        let result = sink.write_log(&entry("DATABASE_ERROR")).await;
        tokio_test::assert_err!(result);
    }

    #[test]
    fn test_default_dir() {
        assert_eq!(FileLogSink::default().dir(), Path::new("errorLogs"));
    }
}
