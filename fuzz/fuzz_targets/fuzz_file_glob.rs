#![no_main]

use fault_ring::FileGlob;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let (pattern, path) = text.split_once('\n').unwrap_or((text, ""));
    if let Ok(glob) = FileGlob::new(pattern) {
        let _ = glob.is_match(path);
    }
});
