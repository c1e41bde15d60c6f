//! Output and log sinks.
//!
//! - [`OutputSink`]: the console stream verbose records are echoed to.
//! - [`LogSink`]: the persistent, append-only log. [`LogFile`] writes one
//!   timestamped line per call; [`MemoryLog`] keeps entries in memory.
//!
//! Sink failures never propagate into fault handling. The reporter emits a
//! `tracing` warning and carries on.

use crate::{ReporterError, Result};
use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// `strftime` layout of the log line prefix, e.g. `Mon Mar 04 09:15:02 2024`.
pub const LOG_TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

#[inline]
fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// `[<timestamp>] <message>\n`
pub fn format_log_line(at: &DateTime<Local>, message: &str) -> String {
    format!("[{}] {}\n", at.format(LOG_TIMESTAMP_FORMAT), message)
}

// ============================================================================
// Log Sinks
// ============================================================================

/// Append-only log destination.
pub trait LogSink: Send + Sync {
    /// Append one message.
    ///
    /// # Errors
    ///
    /// Implementation-specific I/O failure.
    fn append(&self, message: &str) -> Result<()>;
}

/// Log file opened in append mode.
pub struct LogFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogFile {
    /// Open (creating if needed) `path` for appending.
    ///
    /// # Errors
    ///
    /// [`ReporterError::LogSink`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(ReporterError::LogSink)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for LogFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogFile").field("path", &self.path).finish()
    }
}

impl LogSink for LogFile {
    fn append(&self, message: &str) -> Result<()> {
        let line = format_log_line(&Local::now(), message);
        let mut file = lock(&self.file);
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// In-memory log keeping bare messages (no timestamp).
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl MemoryLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages appended so far.
    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

impl LogSink for MemoryLog {
    fn append(&self, message: &str) -> Result<()> {
        lock(&self.entries).push(message.to_owned());
        Ok(())
    }
}

// ============================================================================
// Output Sinks
// ============================================================================

/// Console stream.
pub struct OutputSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl OutputSink {
    /// Wrap any writer.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Write `text` verbatim and flush.
    pub fn write_str(&self, text: &str) {
        let mut writer = lock(&self.writer);
        if let Err(error) = writer.write_all(text.as_bytes()).and_then(|()| writer.flush()) {
            tracing::warn!(%error, "output sink write failed");
        }
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OutputSink")
    }
}

/// Shared in-memory writer; clones see the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.buffer)).into_owned()
    }

    /// Discard captured output.
    pub fn clear(&self) {
        lock(&self.buffer).clear();
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.buffer).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn log_line_layout() {
        let at = Local.with_ymd_and_hms(2024, 3, 4, 9, 15, 2).unwrap();
        assert_eq!(
            format_log_line(&at, "disk full"),
            "[Mon Mar 04 09:15:02 2024] disk full\n"
        );
    }

    #[test]
    fn log_file_appends_lines() {
        let path = std::env::temp_dir().join(format!("fault_ring_log_{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let log = LogFile::open(&path).unwrap();
        log.append("first").unwrap();
        log.append("second").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unopenable_log_file_is_an_error() {
        let dir = std::env::temp_dir();
        assert!(matches!(LogFile::open(&dir), Err(ReporterError::LogSink(_))));
    }

    #[test]
    fn memory_sink_is_shared_between_clones() {
        let sink = MemorySink::new();
        let out = OutputSink::new(sink.clone());
        out.write_str("ERROR   : boom\n");
        assert_eq!(sink.contents(), "ERROR   : boom\n");
        sink.clear();
        assert!(sink.contents().is_empty());
    }

    #[test]
    fn memory_log_keeps_entries() {
        let log = MemoryLog::new();
        log.append("a").unwrap();
        log.append("b").unwrap();
        assert_eq!(log.entries(), vec!["a", "b"]);
    }
}
