//! Bounded, human-readable backtrace rendering.
//!
//! Backtraces end up in log files, notification mails and, outside
//! production, on screen. The renderer therefore has three hard rules:
//!
//! - **No disclosure**: objects render as their type name only. Field values
//!   are never captured and never printed.
//! - **Bounded output**: per frame at most [`MAX_ARG_TOKENS`] values are
//!   rendered and at most [`MAX_ITERATION_STEPS`] nodes are visited; nesting
//!   deeper than [`MAX_NESTING`] collapses to a placeholder.
//! - **Balanced brackets**: however early summarization stops, every `[`
//!   opened in a frame is closed before the frame's `)`.
//!
//! # Format
//!
//! One entry per frame, most recent call first, numbered from 0:
//!
//! ```text
//! 0. Ledger->transfer(42, "EUR", [1, 2, [3, Array]])
//! 	[src/ledger.rs:40]
//! 1. main()
//! 	[n/a]
//! ```

use crate::{ArgValue, Frame, ReporterError, Result};

/// Container nesting rendered with brackets; deeper levels collapse.
pub const MAX_NESTING: usize = 3;

/// Values rendered per frame before summarization stops silently.
pub const MAX_ARG_TOKENS: usize = 20;

/// Nodes visited per frame before summarization stops with `, ...`.
pub const MAX_ITERATION_STEPS: usize = 50;

/// String arguments longer than this are cut in detailed-debug mode.
pub const MAX_DEBUG_STRING_LEN: usize = 512;

/// Frame cap applied when none is configured.
pub const DEFAULT_MAX_FRAMES: usize = 99;

/// Placeholder for containers nested past [`MAX_NESTING`].
pub const NESTING_PLACEHOLDER: &str = "Array";

/// Renders frame snapshots into bounded text.
#[derive(Debug, Clone)]
pub struct BacktraceRenderer {
    detailed_debug: bool,
    install_root: Option<String>,
    max_frames: usize,
}

impl Default for BacktraceRenderer {
    fn default() -> Self {
        Self {
            detailed_debug: cfg!(feature = "trusted_debug"),
            install_root: None,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

impl BacktraceRenderer {
    /// Renderer with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut long string arguments at [`MAX_DEBUG_STRING_LEN`].
    pub fn with_detailed_debug(mut self, enabled: bool) -> Self {
        self.detailed_debug = enabled;
        self
    }

    /// Strip this prefix from frame file paths.
    pub fn with_install_root(mut self, root: Option<String>) -> Self {
        self.install_root = root.filter(|r| !r.is_empty());
        self
    }

    /// Render at most `max` frames (0 restores the default).
    pub fn with_max_frames(mut self, max: usize) -> Self {
        self.max_frames = if max == 0 { DEFAULT_MAX_FRAMES } else { max };
        self
    }

    /// Render every frame (up to the frame cap).
    pub fn render(&self, frames: &[Frame]) -> String {
        self.render_slice(frames)
    }

    /// Render starting at `offset`, renumbering from 0.
    ///
    /// # Errors
    ///
    /// [`ReporterError::InvalidOffset`] when `offset` lies past the end of
    /// the snapshot.
    pub fn render_from(&self, frames: &[Frame], offset: usize) -> Result<String> {
        match frames.get(offset..) {
            Some(tail) => Ok(self.render_slice(tail)),
            None => Err(ReporterError::InvalidOffset {
                offset,
                depth: frames.len(),
            }),
        }
    }

    fn render_slice(&self, frames: &[Frame]) -> String {
        let mut out = String::new();
        for (index, frame) in frames.iter().take(self.max_frames).enumerate() {
            self.write_frame(&mut out, index, frame);
        }
        out
    }

    /// Render a single frame entry, including the trailing newline.
    pub fn render_frame(&self, index: usize, frame: &Frame) -> String {
        let mut out = String::new();
        self.write_frame(&mut out, index, frame);
        out
    }

    fn write_frame(&self, out: &mut String, index: usize, frame: &Frame) {
        out.push_str(&index.to_string());
        out.push_str(". ");
        if let Some(class) = &frame.class {
            out.push_str(class);
            out.push_str(frame.call_type.separator());
        }
        out.push_str(&frame.function);
        out.push('(');
        out.push_str(&self.summarize_args(&frame.args));
        out.push_str(")\n\t");
        match &frame.file {
            Some(file) => {
                out.push('[');
                out.push_str(self.trim_path(file));
                if let Some(line) = frame.line {
                    out.push(':');
                    out.push_str(&line.to_string());
                }
                out.push(']');
            }
            None => out.push_str("[n/a]"),
        }
        out.push('\n');
    }

    fn trim_path<'a>(&self, file: &'a str) -> &'a str {
        match &self.install_root {
            Some(root) => match file.strip_prefix(root.as_str()) {
                Some(rest) => rest.trim_start_matches(['/', '\\']),
                None => file,
            },
            None => file,
        }
    }

    /// Summarize a frame's argument list (without the surrounding parens).
    pub fn summarize_args(&self, args: &[ArgValue]) -> String {
        let mut writer = ArgWriter {
            out: String::new(),
            tokens: 0,
            steps: 0,
            open: 0,
            detailed_debug: self.detailed_debug,
        };
        for (i, arg) in args.iter().enumerate() {
            if writer.visit(None, arg, 0, i == 0) == Flow::Stop {
                break;
            }
        }
        writer.finish()
    }

    /// Summarize one value as it would appear in an argument list.
    pub fn summarize_value(&self, value: &ArgValue) -> String {
        self.summarize_args(std::slice::from_ref(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct ArgWriter {
    out: String,
    tokens: usize,
    steps: usize,
    open: usize,
    detailed_debug: bool,
}

impl ArgWriter {
    fn visit(&mut self, key: Option<&str>, value: &ArgValue, depth: usize, first: bool) -> Flow {
        if self.step() == Flow::Stop {
            return Flow::Stop;
        }
        match value {
            ArgValue::Object { callable: true, .. } => Flow::Stop,
            ArgValue::List(_) | ArgValue::Map(_) => {
                let child_depth = depth + 1;
                if child_depth > MAX_NESTING {
                    if self.token() == Flow::Stop {
                        return Flow::Stop;
                    }
                    self.lead(key, first);
                    self.out.push_str(NESTING_PLACEHOLDER);
                    return self.skip_children(value);
                }
                self.lead(key, first);
                self.out.push('[');
                self.open += 1;
                if self.visit_children(value, child_depth) == Flow::Stop {
                    return Flow::Stop;
                }
                self.out.push(']');
                self.open -= 1;
                Flow::Continue
            }
            scalar => {
                if self.token() == Flow::Stop {
                    return Flow::Stop;
                }
                self.lead(key, first);
                self.write_scalar(scalar);
                Flow::Continue
            }
        }
    }

    fn visit_children(&mut self, container: &ArgValue, depth: usize) -> Flow {
        match container {
            ArgValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if self.visit(None, item, depth, i == 0) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
            }
            ArgValue::Map(entries) => {
                for (i, (key, item)) in entries.iter().enumerate() {
                    if self.visit(Some(key), item, depth, i == 0) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
            }
            _ => {}
        }
        Flow::Continue
    }

    /// Walk a collapsed subtree for step accounting only.
    fn skip_children(&mut self, container: &ArgValue) -> Flow {
        let children: Box<dyn Iterator<Item = &ArgValue>> = match container {
            ArgValue::List(items) => Box::new(items.iter()),
            ArgValue::Map(entries) => Box::new(entries.iter().map(|(_, v)| v)),
            _ => return Flow::Continue,
        };
        for child in children {
            if self.step() == Flow::Stop {
                return Flow::Stop;
            }
            if child.is_container() && self.skip_children(child) == Flow::Stop {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn step(&mut self) -> Flow {
        self.steps += 1;
        if self.steps > MAX_ITERATION_STEPS {
            if !(self.out.is_empty() || self.out.ends_with('[')) {
                self.out.push_str(", ");
            }
            self.out.push_str("...");
            return Flow::Stop;
        }
        Flow::Continue
    }

    fn token(&mut self) -> Flow {
        self.tokens += 1;
        if self.tokens > MAX_ARG_TOKENS {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    fn lead(&mut self, key: Option<&str>, first: bool) {
        if !first {
            self.out.push_str(", ");
        }
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            self.out.push_str(key);
            self.out.push(':');
        }
    }

    fn write_scalar(&mut self, value: &ArgValue) {
        match value {
            ArgValue::Null => self.out.push_str("null"),
            ArgValue::Bool(true) => self.out.push_str("true"),
            ArgValue::Bool(false) => self.out.push_str("false"),
            ArgValue::Int(n) => self.out.push_str(&n.to_string()),
            // saturating, NaN becomes 0
            ArgValue::Float(x) => self.out.push_str(&(*x as i64).to_string()),
            ArgValue::Str(s) => self.write_str(s),
            ArgValue::Object { class, .. } => self.out.push_str(class),
            ArgValue::Resource(tag) if !tag.is_empty() => self.out.push_str(tag),
            _ => self.out.push_str("undefined"),
        }
    }

    fn write_str(&mut self, s: &str) {
        if s.len() > 1 && s.as_bytes()[0] < 0x0A {
            self.out.push_str("<binary>");
            return;
        }
        self.out.push('"');
        if self.detailed_debug && s.len() > MAX_DEBUG_STRING_LEN {
            let mut end = MAX_DEBUG_STRING_LEN;
            while end > 0 && !s.is_char_boundary(end) {
                end -= 1;
            }
            self.out.extend(s[..end].escape_debug());
            self.out.push_str("...");
        } else {
            self.out.extend(s.escape_debug());
        }
        self.out.push('"');
    }

    fn finish(mut self) -> String {
        for _ in 0..self.open {
            self.out.push(']');
        }
        self.out
    }
}
