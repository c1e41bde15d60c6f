//! Outbound notifications for reported faults.
//!
//! The reporter composes a [`Notification`] and hands it to a
//! [`NotificationTransport`]; delivery (mail, paging, chat) is the host's
//! concern. Request context attached to a notification is treated as
//! sensitive: keys and values are zeroized when the snapshot drops, and the
//! composed body is zeroized after dispatch.

use crate::{ExecutionMode, Result, Severity};
use std::fmt::{self, Write as _};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Header added to every notification.
pub const BULK_PRECEDENCE: (&str, &str) = ("Precedence", "bulk");

// ============================================================================
// Request Context
// ============================================================================

/// One key/value pair of a request snapshot.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ContextEntry {
    key: String,
    value: String,
}

impl ContextEntry {
    /// Entry key.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Entry value.
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for ContextEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextEntry")
            .field("key", &self.key)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Labelled, opaque key/value dump (form fields, server environment,
/// authenticated profile) appended to notification bodies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    label: String,
    entries: Vec<ContextEntry>,
}

impl RequestContext {
    /// Empty snapshot with a section label such as `POST` or `SERVER`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: Vec::new(),
        }
    }

    /// Add an entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add an entry in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push(ContextEntry {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Snapshot of the process environment.
    pub fn from_env(label: impl Into<String>) -> Self {
        let mut context = Self::new(label);
        for (key, value) in std::env::vars() {
            context.insert(key, value);
        }
        context
    }

    /// Section label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Whether the snapshot holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn write_dump(&self, out: &mut String) {
        let _ = writeln!(out, "{}:", self.label);
        out.push_str("[\n");
        for entry in &self.entries {
            let _ = writeln!(out, "  '{}' => '{}',", entry.key, entry.value);
        }
        out.push_str("]\n\n");
    }
}

// ============================================================================
// Notification
// ============================================================================

/// Composed outbound report.
#[derive(Clone, PartialEq, Eq)]
pub struct Notification {
    /// Recipient address.
    pub to: String,
    /// `basename(file): method()[:line]`
    pub subject: String,
    /// Host, message, backtrace, mode tag and context dumps.
    pub body: String,
    /// Extra headers; always includes [`BULK_PRECEDENCE`].
    pub headers: Vec<(String, String)>,
}

impl Notification {
    /// Value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("to", &self.to)
            .field("subject", &self.subject)
            .field("body_len", &self.body.len())
            .field("headers", &self.headers)
            .finish()
    }
}

impl Drop for Notification {
    fn drop(&mut self) {
        self.body.zeroize();
    }
}

/// Inputs to [`compose`].
#[derive(Debug, Clone, Copy)]
pub struct NotificationParts<'a> {
    /// Recipient.
    pub to: &'a str,
    /// Fault kind.
    pub severity: Severity,
    /// Fault message.
    pub message: &'a str,
    /// Originating file.
    pub file: Option<&'a str>,
    /// Originating line.
    pub line: Option<u32>,
    /// Resolved caller.
    pub caller: &'a str,
    /// Rendered backtrace.
    pub backtrace: &'a str,
    /// Host display name.
    pub server_name: &'a str,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Request snapshots; dumped only in embedded mode.
    pub context: &'a [RequestContext],
}

/// Build the notification for a fault.
pub fn compose(parts: &NotificationParts<'_>) -> Notification {
    let file = parts.file.unwrap_or_default();
    let basename = Path::new(file)
        .file_name()
        .map_or_else(|| file.to_owned(), |name| name.to_string_lossy().into_owned());

    let mut subject = format!("{}: {}()", basename, parts.caller);
    if let Some(line) = parts.line {
        let _ = write!(subject, ":{}", line);
    }

    let mut body = String::new();
    let _ = write!(
        body,
        "{}:\n\n{}: {} [{}:{}]\n{}\nMODE: {}\n\n---\n",
        parts.server_name,
        parts.severity.display_name(),
        parts.message,
        file,
        parts.line.map_or_else(String::new, |l| l.to_string()),
        parts.backtrace,
        parts.mode.tag(),
    );
    if parts.mode == ExecutionMode::Embedded {
        for context in parts.context {
            context.write_dump(&mut body);
        }
    }

    Notification {
        to: parts.to.to_owned(),
        subject,
        body,
        headers: vec![(BULK_PRECEDENCE.0.to_owned(), BULK_PRECEDENCE.1.to_owned())],
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Delivery channel for notifications.
pub trait NotificationTransport: Send + Sync {
    /// Deliver `notification`.
    ///
    /// # Errors
    ///
    /// Transport-specific delivery failure. The reporter logs it and
    /// continues.
    fn send(&self, notification: &Notification) -> Result<()>;
}

/// Keeps every notification in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingTransport {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notification>> {
        match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Notifications delivered so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    /// Number of notifications delivered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing was delivered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl NotificationTransport for RecordingTransport {
    fn send(&self, notification: &Notification) -> Result<()> {
        self.lock().push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts<'a>(context: &'a [RequestContext], mode: ExecutionMode) -> NotificationParts<'a> {
        NotificationParts {
            to: "ops@example.org",
            severity: Severity::Error,
            message: "disk full",
            file: Some("/srv/app/src/store.rs"),
            line: Some(88),
            caller: "Store::flush",
            backtrace: "0. Store::flush()\n\t[src/store.rs:88]\n",
            server_name: "web-1",
            mode,
            context,
        }
    }

    #[test]
    fn subject_uses_basename_caller_and_line() {
        let n = compose(&parts(&[], ExecutionMode::Console));
        assert_eq!(n.subject, "store.rs: Store::flush():88");
        assert_eq!(n.to, "ops@example.org");
        assert_eq!(n.header("precedence"), Some("bulk"));
    }

    #[test]
    fn body_layout() {
        let n = compose(&parts(&[], ExecutionMode::Console));
        assert!(n.body.starts_with("web-1:\n\nERROR: disk full [/srv/app/src/store.rs:88]\n0. "));
        assert!(n.body.contains("\nMODE: CLI\n\n---\n"));
    }

    #[test]
    fn context_dumped_only_when_embedded() {
        let context = [RequestContext::new("POST").with("user", "alice")];
        let console = compose(&parts(&context, ExecutionMode::Console));
        assert!(!console.body.contains("POST:"));
        let embedded = compose(&parts(&context, ExecutionMode::Embedded));
        assert!(embedded.body.contains("MODE: SAPI"));
        assert!(embedded.body.contains("POST:\n[\n  'user' => 'alice',\n]\n"));
    }

    #[test]
    fn context_debug_redacts_values() {
        let context = RequestContext::new("AUTH").with("token", "s3cret");
        let debug = format!("{:?}", context);
        assert!(debug.contains("token"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn recorder_keeps_notifications() {
        let transport = RecordingTransport::new();
        transport.send(&compose(&parts(&[], ExecutionMode::Console))).unwrap();
        assert_eq!(transport.len(), 1);
        assert_eq!(transport.sent()[0].subject, "store.rs: Store::flush():88");
    }
}
