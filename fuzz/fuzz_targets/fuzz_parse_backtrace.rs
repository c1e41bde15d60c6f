#![no_main]

use fault_ring::{BacktraceRenderer, CallerResolver, NativeStack};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let frames = NativeStack::parse(text);
        let _ = CallerResolver::default().resolve(&frames, 1, None);
        let _ = BacktraceRenderer::new().render(&frames);
    }
});
