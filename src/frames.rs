//! Stack frames and the stack-snapshot capability.
//!
//! The reporter never walks the machine stack directly. It asks an injected
//! [`StackSource`] for an ordered snapshot of [`Frame`]s, most recent call
//! first, starting at the innermost frame that does not belong to the
//! reporter itself.
//!
//! Three sources ship with the crate:
//!
//! - [`NativeStack`]: parses `std::backtrace::Backtrace`. Names, files and
//!   lines only; argument values are not observable natively.
//! - [`ShadowStack`]: a thread-local frame stack that instrumented code
//!   pushes onto (with argument values) through [`ShadowStack::enter`].
//! - [`SyntheticStack`]: a fixed list of frames, for tests.
//!
//! [`Cause`] is the explicit "causing object" of Exception and Report
//! faults: a value carrying its own captured frames, so a backtrace exists
//! even when nothing was thrown.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// Argument Values
// ============================================================================

/// A captured argument value, as seen by the backtrace renderer.
///
/// Objects carry only their type name: field values are never captured, so
/// they can never be rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point, rendered integer-coerced.
    Float(f64),
    /// Text (may hold binary data in its leading bytes).
    Str(String),
    /// An object reduced to its type name. `callable` marks closure-like
    /// values.
    Object {
        /// Type name.
        class: String,
        /// Whether the value is itself callable.
        callable: bool,
    },
    /// Ordered container.
    List(Vec<ArgValue>),
    /// Keyed container.
    Map(Vec<(String, ArgValue)>),
    /// Handle-like value, rendered as its type tag.
    Resource(String),
    /// Anything the capture side could not classify.
    Undefined,
}

impl ArgValue {
    /// An object argument reduced to its type name.
    pub fn object(class: impl Into<String>) -> Self {
        Self::Object {
            class: class.into(),
            callable: false,
        }
    }

    /// A closure-like argument.
    pub fn closure(class: impl Into<String>) -> Self {
        Self::Object {
            class: class.into(),
            callable: true,
        }
    }

    /// An object argument named after the Rust type of `value`.
    pub fn of_type<T: ?Sized>(_value: &T) -> Self {
        Self::object(std::any::type_name::<T>())
    }

    /// Whether this value is a container.
    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_))
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ArgValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<usize> for ArgValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<ArgValue>> From<Vec<T>> for ArgValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Frames
// ============================================================================

/// How a frame's function was reached from its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallType {
    /// Associated function / static call, rendered `::`.
    #[default]
    Static,
    /// Method call on an instance, rendered `->`.
    Instance,
}

impl CallType {
    /// Separator placed between class and function in rendered traces.
    #[inline]
    pub const fn separator(self) -> &'static str {
        match self {
            Self::Static => "::",
            Self::Instance => "->",
        }
    }
}

/// One entry of a stack snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    /// Owning class / type path, if any.
    pub class: Option<String>,
    /// Static or instance call.
    pub call_type: CallType,
    /// Function or method name.
    pub function: String,
    /// Call-site file.
    pub file: Option<String>,
    /// Call-site line.
    pub line: Option<u32>,
    /// Captured argument values.
    pub args: Vec<ArgValue>,
}

impl Frame {
    /// A free-function frame.
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            function: name.into(),
            ..Self::default()
        }
    }

    /// A static (associated function) frame.
    pub fn static_method(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            call_type: CallType::Static,
            function: name.into(),
            ..Self::default()
        }
    }

    /// An instance method frame.
    pub fn method(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            call_type: CallType::Instance,
            function: name.into(),
            ..Self::default()
        }
    }

    /// Set the call-site location.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Set the captured arguments.
    pub fn with_args(mut self, args: Vec<ArgValue>) -> Self {
        self.args = args;
        self
    }

    /// Attribution string: `Class::function` or `function`.
    pub fn method_path(&self) -> String {
        match &self.class {
            Some(class) => format!("{}::{}", class, self.function),
            None => self.function.clone(),
        }
    }
}

impl fmt::Display for Frame {
    /// `Class::function():line` (line omitted when unknown).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(class) = &self.class {
            write!(f, "{}::", class)?;
        }
        write!(f, "{}()", self.function)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        Ok(())
    }
}

// ============================================================================
// Stack Sources
// ============================================================================

/// Capability returning the current call stack, most recent call first.
///
/// Implementations must omit frames belonging to the reporter itself, so
/// that index 0 is the code that invoked the reporter.
pub trait StackSource: Send + Sync {
    /// Snapshot the current stack.
    fn capture(&self) -> Vec<Frame>;
}

/// Platform call-stack introspection through `std::backtrace`.
///
/// Symbols are split on their last `::` into class path and function.
/// Leading frames from the backtrace machinery and from this crate are
/// dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeStack;

impl NativeStack {
    /// Parse the textual form of a `std::backtrace::Backtrace`.
    ///
    /// Exposed for hosts that capture backtraces themselves (panic payloads,
    /// error types carrying a `Backtrace`).
    pub fn parse(text: &str) -> Vec<Frame> {
        let mut frames: Vec<Frame> = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some(location) = trimmed.strip_prefix("at ") {
                if let Some(frame) = frames.last_mut() {
                    if frame.file.is_none() {
                        let (file, line) = split_location(location);
                        frame.file = Some(file.to_owned());
                        frame.line = line;
                    }
                }
                continue;
            }
            if let Some((index, symbol)) = trimmed.split_once(": ") {
                if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
                    frames.push(frame_from_symbol(symbol));
                }
            }
        }
        frames
    }

    fn is_internal(frame: &Frame) -> bool {
        let path = frame.method_path();
        path.contains("fault_ring::")
            || path.starts_with("std::backtrace")
            || path.starts_with("backtrace::")
            || path.contains("Backtrace::")
    }
}

impl StackSource for NativeStack {
    fn capture(&self) -> Vec<Frame> {
        let text = Backtrace::force_capture().to_string();
        let mut frames = Self::parse(&text);
        let skip = frames.iter().take_while(|f| Self::is_internal(f)).count();
        frames.drain(..skip);
        frames
    }
}

fn split_location(location: &str) -> (&str, Option<u32>) {
    // file:line:column
    let mut parts = location.rsplitn(3, ':');
    let column = parts.next();
    let line = parts.next();
    match (parts.next(), line, column) {
        (Some(file), Some(line), Some(_)) => (file, line.parse().ok()),
        _ => (location, None),
    }
}

fn frame_from_symbol(symbol: &str) -> Frame {
    let symbol = strip_symbol_hash(symbol.trim());
    match split_symbol(symbol) {
        Some((class, function)) => Frame::static_method(class, function),
        None => Frame::function(symbol),
    }
}

fn strip_symbol_hash(symbol: &str) -> &str {
    match symbol.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.bytes().all(|b| b.is_ascii_hexdigit()) => {
            head
        }
        _ => symbol,
    }
}

/// Split on the last `::` that is not nested inside `<...>`.
fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let bytes = symbol.as_bytes();
    let mut depth = 0i32;
    let mut split = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth -= 1,
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                split = Some(i);
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    split.map(|at| (&symbol[..at], &symbol[at + 2..]))
}

thread_local! {
    static SHADOW_FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Thread-local frame stack maintained by instrumented code.
///
/// ```rust
/// use fault_ring::{ArgValue, Frame, ShadowStack, StackSource};
///
/// fn transfer(amount: i64) {
///     let _frame = ShadowStack::enter(
///         Frame::method("Ledger", "transfer")
///             .at("ledger.rs", 40)
///             .with_args(vec![ArgValue::from(amount)]),
///     );
///     assert_eq!(ShadowStack.capture()[0].function, "transfer");
/// }
/// transfer(10);
/// assert!(ShadowStack.capture().is_empty());
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ShadowStack;

impl ShadowStack {
    /// Push `frame`; it is popped when the returned guard drops.
    #[must_use = "the frame is popped as soon as the guard is dropped"]
    pub fn enter(frame: Frame) -> FrameGuard {
        SHADOW_FRAMES.with(|frames| frames.borrow_mut().push(frame));
        FrameGuard { _private: () }
    }

    /// Current depth on this thread.
    pub fn depth() -> usize {
        SHADOW_FRAMES.with(|frames| frames.borrow().len())
    }
}

impl StackSource for ShadowStack {
    fn capture(&self) -> Vec<Frame> {
        SHADOW_FRAMES.with(|frames| frames.borrow().iter().rev().cloned().collect())
    }
}

/// Pops the frame pushed by [`ShadowStack::enter`].
#[derive(Debug)]
pub struct FrameGuard {
    _private: (),
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        SHADOW_FRAMES.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

/// Fixed frames, replaceable at runtime. Intended for tests.
#[derive(Debug, Default)]
pub struct SyntheticStack {
    frames: Mutex<Vec<Frame>>,
}

impl SyntheticStack {
    /// Frames are given most recent first.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: Mutex::new(frames),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Vec<Frame>> {
        match self.frames.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replace the frames returned by subsequent captures.
    pub fn set_frames(&self, frames: Vec<Frame>) {
        *self.lock() = frames;
    }
}

impl StackSource for SyntheticStack {
    fn capture(&self) -> Vec<Frame> {
        self.lock().clone()
    }
}

impl<S: StackSource + ?Sized> StackSource for std::sync::Arc<S> {
    fn capture(&self) -> Vec<Frame> {
        (**self).capture()
    }
}

// ============================================================================
// Causing Object
// ============================================================================

/// The causing object attached to Exception and Report faults.
///
/// Carries its own frames so the backtrace reflects where the cause was
/// created rather than where it is being handled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cause {
    /// Type name of the cause.
    pub class: String,
    /// Message carried by the cause.
    pub message: String,
    /// Origin file.
    pub file: Option<String>,
    /// Origin line.
    pub line: Option<u32>,
    /// Frames captured when the cause was created, most recent first.
    pub frames: Vec<Frame>,
}

impl Cause {
    /// A cause built from an error value, with `frames` as its trace.
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E, frames: Vec<Frame>) -> Self {
        Self {
            class: std::any::type_name::<E>().to_owned(),
            message: error.to_string(),
            file: None,
            line: None,
            frames,
        }
    }

    /// Synthetic cause for out-of-band reports: no error exists, the frames
    /// are snapshotted from `stack` at construction time.
    pub fn synthetic(message: impl Into<String>, stack: &dyn StackSource) -> Self {
        Self {
            class: "SyntheticCause".to_owned(),
            message: message.into(),
            file: None,
            line: None,
            frames: stack.capture(),
        }
    }

    /// Set the origin location.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
   0: std::backtrace_rs::backtrace::libunwind::trace
             at /rustc/abc/library/std/src/../../backtrace/src/backtrace/libunwind.rs:116:5
   1: std::backtrace::Backtrace::create
             at /rustc/abc/library/std/src/backtrace.rs:331:13
   2: <fault_ring::frames::NativeStack as fault_ring::frames::StackSource>::capture
             at ./src/frames.rs:250:20
   3: billing::invoice::Invoice::total::h0123456789abcdef
             at ./src/invoice.rs:42:9
   4: main
";

    #[test]
    fn parse_reads_symbols_and_locations() {
        let frames = NativeStack::parse(SAMPLE);
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[3].class.as_deref(), Some("billing::invoice::Invoice"));
        assert_eq!(frames[3].function, "total");
        assert_eq!(frames[3].file.as_deref(), Some("./src/invoice.rs"));
        assert_eq!(frames[3].line, Some(42));
        assert_eq!(frames[4].function, "main");
        assert_eq!(frames[4].file, None);
    }

    #[test]
    fn parse_keeps_generic_impl_paths_whole() {
        let frames = NativeStack::parse(SAMPLE);
        assert_eq!(
            frames[2].class.as_deref(),
            Some("<fault_ring::frames::NativeStack as fault_ring::frames::StackSource>")
        );
        assert_eq!(frames[2].function, "capture");
    }

    #[test]
    fn internal_frames_are_recognised() {
        let frames = NativeStack::parse(SAMPLE);
        let skip = frames.iter().take_while(|f| NativeStack::is_internal(f)).count();
        assert_eq!(skip, 3);
    }

    #[test]
    fn shadow_stack_is_most_recent_first() {
        let _outer = ShadowStack::enter(Frame::function("outer"));
        {
            let _inner = ShadowStack::enter(Frame::method("Svc", "inner"));
            let frames = ShadowStack.capture();
            assert_eq!(frames[0].function, "inner");
            assert_eq!(frames[1].function, "outer");
        }
        assert_eq!(ShadowStack::depth(), 1);
    }

    #[test]
    fn method_path_uses_double_colon() {
        assert_eq!(Frame::method("Svc", "run").method_path(), "Svc::run");
        assert_eq!(Frame::function("run").method_path(), "run");
    }

    #[test]
    fn frame_display_includes_line() {
        let frame = Frame::static_method("Svc", "run").at("svc.rs", 7);
        assert_eq!(frame.to_string(), "Svc::run():7");
    }

    #[test]
    fn synthetic_cause_snapshots_stack() {
        let stack = SyntheticStack::new(vec![Frame::function("caller")]);
        let cause = Cause::synthetic("boom", &stack);
        stack.set_frames(Vec::new());
        assert_eq!(cause.frames.len(), 1);
        assert_eq!(cause.class, "SyntheticCause");
    }
}
