//! Caller resolution - attributes a fault to the code that raised it.
//!
//! Generic dispatch machinery (closure trampolines, `catch_unwind`
//! wrappers, double-dispatch forwarders) sits between the code that raised
//! a fault and the reporter. Those frames are consumed silently: they count
//! as zero toward the requested depth.

use crate::Frame;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Attribution returned when the stack is too shallow.
pub const UNKNOWN_CALLER: &str = "unknown";

/// Host-supplied frame filter consulted during caller resolution.
///
/// Returning `true` skips the frame.
pub trait FrameFilter: Send + Sync {
    /// Whether `frame` should be skipped.
    fn skip(&self, frame: &Frame) -> bool;
}

impl<F> FrameFilter for F
where
    F: Fn(&Frame) -> bool + Send + Sync,
{
    fn skip(&self, frame: &Frame) -> bool {
        self(frame)
    }
}

/// Recognises a dispatch-machinery frame by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyMarker {
    class: Option<String>,
    function: String,
    span: usize,
}

impl ProxyMarker {
    /// Marker matching a function name in any class.
    pub fn function(function: impl Into<String>) -> Self {
        Self {
            class: None,
            function: function.into(),
            span: 1,
        }
    }

    /// Restrict the match to classes whose path contains `class`.
    pub fn in_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Number of frames consumed on a match (the marker frame included).
    pub fn spanning(mut self, span: usize) -> Self {
        self.span = span.max(1);
        self
    }

    /// Frames consumed on a match.
    #[inline]
    pub fn span(&self) -> usize {
        self.span
    }

    /// Whether `frame` is this marker's dispatch frame.
    pub fn matches(&self, frame: &Frame) -> bool {
        let name_matches = match frame.function.strip_prefix(self.function.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with("{{"),
            None => false,
        };
        if !name_matches {
            return false;
        }
        match (&self.class, &frame.class) {
            (None, _) => true,
            (Some(wanted), Some(class)) => class.contains(wanted.as_str()),
            (Some(_), None) => false,
        }
    }
}

/// Markers for the dispatch frames the reporter knows about.
///
/// The `__call` marker spans two frames: the dispatcher itself and the
/// forwarding frame it invokes.
pub fn default_proxy_markers() -> Vec<ProxyMarker> {
    vec![
        ProxyMarker::function("__call").spanning(2),
        ProxyMarker::function("call_once").in_class("core::ops::function::FnOnce"),
        ProxyMarker::function("call_mut").in_class("core::ops::function::FnMut"),
        ProxyMarker::function("call").in_class("core::ops::function::Fn"),
        ProxyMarker::function("do_call").in_class("std::panicking"),
        ProxyMarker::function("try").in_class("std::panicking"),
        ProxyMarker::function("catch_unwind").in_class("std::panic"),
    ]
}

/// Walks a frame snapshot to find the attributed caller.
#[derive(Clone)]
pub struct CallerResolver {
    markers: Vec<ProxyMarker>,
    filters: Vec<Arc<dyn FrameFilter>>,
}

impl Default for CallerResolver {
    fn default() -> Self {
        Self::new(default_proxy_markers())
    }
}

impl fmt::Debug for CallerResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerResolver")
            .field("markers", &self.markers)
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl CallerResolver {
    /// Resolver with the given proxy markers and no frame filters.
    pub fn new(markers: Vec<ProxyMarker>) -> Self {
        Self {
            markers,
            filters: Vec::new(),
        }
    }

    /// Register a frame filter.
    pub fn add_filter(&mut self, filter: Arc<dyn FrameFilter>) {
        self.filters.push(filter);
    }

    /// Find the frame `depth` real frames above the innermost one.
    ///
    /// Proxy frames, frames whose `Class::function` path matches `exclude`,
    /// and frames skipped by a registered filter are consumed without
    /// counting. Returns `None` when the stack runs out first.
    pub fn resolve_frame<'a>(
        &self,
        frames: &'a [Frame],
        depth: usize,
        exclude: Option<&Regex>,
    ) -> Option<&'a Frame> {
        let mut remaining = depth;
        let mut i = 0;
        while let Some(frame) = frames.get(i) {
            if let Some(marker) = self.markers.iter().find(|m| m.matches(frame)) {
                i += marker.span();
                continue;
            }
            if let Some(pattern) = exclude {
                if pattern.is_match(&frame.method_path()) {
                    i += 1;
                    continue;
                }
            }
            if self.filters.iter().any(|f| f.skip(frame)) {
                i += 1;
                continue;
            }
            if remaining == 0 {
                return Some(frame);
            }
            remaining -= 1;
            i += 1;
        }
        None
    }

    /// Attribution string for the frame at `depth`: `Class::function`,
    /// `function`, or [`UNKNOWN_CALLER`].
    pub fn resolve(&self, frames: &[Frame], depth: usize, exclude: Option<&Regex>) -> String {
        self.resolve_frame(frames, depth, exclude)
            .map_or_else(|| UNKNOWN_CALLER.to_owned(), Frame::method_path)
    }
}
