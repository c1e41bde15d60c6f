//! Per-call-site suppression rules and report filters.
//!
//! A [`SuppressionRule`] vetoes reporting only when every predicate it
//! carries matches. Rules are grouped by call site; a call site without
//! rules always reports.
//!
//! ```text
//! call site ──▶ [rule, rule, ...] ──first full match──▶ veto
//! ```
//!
//! Message patterns are literal substrings. File patterns are shell-style
//! globs (`*`, `?`, `[...]`, `[!...]`) compiled once at registration.

use crate::{FaultView, ReporterError, Result, Severity, SeverityMask};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// File Globs
// ============================================================================

/// Shell-style glob matched against whole file paths.
///
/// `*` and `?` also match `/`, as with `fnmatch` without path mode.
#[derive(Clone)]
pub struct FileGlob {
    pattern: String,
    regex: Regex,
}

impl FileGlob {
    /// Compile `pattern`.
    ///
    /// # Errors
    ///
    /// [`ReporterError::InvalidPattern`] if the translated expression does
    /// not compile (an unterminated `[` class, for instance).
    pub fn new(pattern: &str) -> Result<Self> {
        let translated = glob_to_regex(pattern);
        let regex = Regex::new(&translated).map_err(|source| ReporterError::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self {
            pattern: pattern.to_owned(),
            regex,
        })
    }

    /// Whether `path` matches in full.
    #[inline]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Source pattern.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for FileGlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileGlob").field(&self.pattern).finish()
    }
}

impl PartialEq for FileGlob {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!')) {
                    chars.next();
                    out.push('^');
                }
                // Copy the class body verbatim, escaping only what regex
                // treats specially inside a class.
                for inner in chars.by_ref() {
                    match inner {
                        ']' => {
                            out.push(']');
                            break;
                        }
                        '\\' | '[' | '&' | '~' => {
                            out.push('\\');
                            out.push(inner);
                        }
                        other => out.push(other),
                    }
                }
            }
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    out.push('$');
    out
}

// ============================================================================
// Rules
// ============================================================================

/// One veto predicate. Absent predicates are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct SuppressionRule {
    mask: SeverityMask,
    message: Option<String>,
    file: Option<FileGlob>,
    line: Option<u32>,
}

impl SuppressionRule {
    /// Rule matching every fault whose kind intersects `mask`.
    pub fn new(mask: SeverityMask) -> Self {
        Self {
            mask,
            message: None,
            file: None,
            line: None,
        }
    }

    /// Also require the message to contain `fragment`.
    pub fn with_message(mut self, fragment: impl Into<String>) -> Self {
        self.message = Some(fragment.into());
        self
    }

    /// Also require the file to match `glob`.
    ///
    /// # Errors
    ///
    /// See [`FileGlob::new`].
    pub fn with_file(mut self, glob: &str) -> Result<Self> {
        self.file = Some(FileGlob::new(glob)?);
        Ok(self)
    }

    /// Also require this exact line.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Whether every present predicate matches.
    ///
    /// A file or line predicate never matches a fault without a location.
    pub fn matches(
        &self,
        severity: Severity,
        message: &str,
        file: Option<&str>,
        line: Option<u32>,
    ) -> bool {
        if !self.mask.admits(severity) {
            return false;
        }
        if let Some(fragment) = &self.message {
            if !message.contains(fragment.as_str()) {
                return false;
            }
        }
        if let Some(glob) = &self.file {
            match file {
                Some(path) if glob.is_match(path) => {}
                _ => return false,
            }
        }
        if let Some(wanted) = self.line {
            if line != Some(wanted) {
                return false;
            }
        }
        true
    }
}

/// Registry of suppression rules keyed by call site.
#[derive(Debug, Clone, Default)]
pub struct SuppressionChain {
    rules: HashMap<String, Vec<SuppressionRule>>,
}

impl SuppressionChain {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for `call_site` from its parts.
    ///
    /// # Errors
    ///
    /// [`ReporterError::InvalidPattern`] for a malformed file glob; nothing
    /// is registered in that case.
    pub fn register(
        &mut self,
        call_site: &str,
        mask: SeverityMask,
        message: Option<&str>,
        file_glob: Option<&str>,
        line: Option<u32>,
    ) -> Result<()> {
        let mut rule = SuppressionRule::new(mask);
        if let Some(fragment) = message {
            rule = rule.with_message(fragment);
        }
        if let Some(glob) = file_glob {
            rule = rule.with_file(glob)?;
        }
        if let Some(line) = line {
            rule = rule.at_line(line);
        }
        self.add_rule(call_site, rule);
        Ok(())
    }

    /// Register a prebuilt rule.
    pub fn add_rule(&mut self, call_site: &str, rule: SuppressionRule) {
        tracing::debug!(call_site, mask = rule.mask.bits(), "suppression rule registered");
        self.rules.entry(call_site.to_owned()).or_default().push(rule);
    }

    /// `false` when a rule registered for `call_site` vetoes the fault.
    pub fn should_report(
        &self,
        call_site: &str,
        severity: Severity,
        message: &str,
        file: Option<&str>,
        line: Option<u32>,
    ) -> bool {
        match self.rules.get(call_site) {
            Some(rules) => !rules
                .iter()
                .any(|rule| rule.matches(severity, message, file, line)),
            None => true,
        }
    }

    /// Rules registered for `call_site`.
    pub fn rules_for(&self, call_site: &str) -> &[SuppressionRule] {
        self.rules.get(call_site).map_or(&[], Vec::as_slice)
    }

    /// Total number of rules.
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Whether no rule is registered.
    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }

    /// Drop every rule.
    pub fn clear(&mut self) {
        self.rules.clear();
    }
}

// ============================================================================
// Report Filters
// ============================================================================

/// Host-supplied predicate consulted after the suppression chain.
///
/// Returning `true` drops the fault; it is treated as handled.
pub trait ReportFilter: Send + Sync {
    /// Whether to drop `fault`.
    fn filter(&self, fault: &FaultView<'_>) -> bool;
}

impl<F> ReportFilter for F
where
    F: Fn(&FaultView<'_>) -> bool + Send + Sync,
{
    fn filter(&self, fault: &FaultView<'_>) -> bool {
        self(fault)
    }
}
