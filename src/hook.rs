//! Panic hook installation.
//!
//! Panics are the process-level uncaught faults of a Rust program. Once
//! installed, every panic is re-expressed as an Exception fault and run
//! through [`Reporter::handle_exception`].

use crate::{Cause, Frame, Reporter};
use std::any::Any;
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install `reporter` as the process panic hook.
///
/// Returns `false` without touching the hook if a reporter was already
/// installed.
pub fn install(reporter: Arc<Reporter>) -> bool {
    if INSTALLED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return false;
    }
    panic::set_hook(Box::new(move |info| {
        reporter.handle_exception(panic_cause(info, reporter.capture()));
    }));
    tracing::debug!("panic hook installed");
    true
}

/// Whether [`install`] has run in this process.
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::Acquire)
}

/// Build the cause for a panic: payload text, panic location, and the
/// captured frames with the unwinding machinery dropped from the top.
pub fn panic_cause(info: &PanicHookInfo<'_>, mut frames: Vec<Frame>) -> Cause {
    let skip = frames.iter().take_while(|f| is_panic_machinery(f)).count();
    frames.drain(..skip);
    let mut cause = Cause {
        class: "panic".to_owned(),
        message: payload_message(info.payload()),
        file: None,
        line: None,
        frames,
    };
    if let Some(location) = info.location() {
        cause = cause.at(location.file(), location.line());
    }
    cause
}

/// Text of a panic payload (`&str` or `String`), or a fixed placeholder.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

fn is_panic_machinery(frame: &Frame) -> bool {
    let path = frame.method_path();
    path.starts_with("std::panicking")
        || path.starts_with("core::panicking")
        || path.starts_with("std::panic::")
        || path.starts_with("rust_begin_unwind")
        || path.starts_with("__rustc")
        || path.starts_with("<alloc::boxed::Box<F,A> as core::ops::function::Fn")
        || path.starts_with("std::sys")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_text() {
        let s: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(payload_message(s.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(payload_message(owned.as_ref()), "bang");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(payload_message(other.as_ref()), "Box<dyn Any>");
    }

    #[test]
    fn machinery_frames_are_recognised() {
        assert!(is_panic_machinery(&Frame::static_method("std::panicking", "begin_panic_handler")));
        assert!(is_panic_machinery(&Frame::function("rust_begin_unwind")));
        assert!(!is_panic_machinery(&Frame::static_method("app::orders", "place")));
    }
}
