#![no_main]

use fault_ring::{ArgValue, BacktraceRenderer, Frame};
use libfuzzer_sys::fuzz_target;

/// Decode bytes into a nested argument tree. Each byte picks a node kind;
/// containers consume following bytes as children.
fn decode(data: &mut &[u8], depth: usize) -> ArgValue {
    let Some((&tag, rest)) = data.split_first() else {
        return ArgValue::Null;
    };
    *data = rest;
    match tag % 8 {
        0 => ArgValue::Null,
        1 => ArgValue::Bool(tag & 0x80 != 0),
        2 => ArgValue::Int(i64::from(tag)),
        3 => ArgValue::Float(f64::from(tag) / 3.0),
        4 => {
            let len = usize::from(tag >> 3).min(data.len());
            let (text, rest) = data.split_at(len);
            *data = rest;
            ArgValue::Str(String::from_utf8_lossy(text).into_owned())
        }
        5 => ArgValue::object("Handle"),
        6 if depth < 64 => {
            let n = usize::from(tag >> 4);
            ArgValue::List((0..n).map(|_| decode(data, depth + 1)).collect())
        }
        7 if depth < 64 => {
            let n = usize::from(tag >> 4);
            ArgValue::Map((0..n).map(|i| (format!("k{i}"), decode(data, depth + 1))).collect())
        }
        _ => ArgValue::Undefined,
    }
}

fuzz_target!(|data: &[u8]| {
    let mut input = data;
    let mut args = Vec::new();
    while !input.is_empty() && args.len() < 16 {
        args.push(decode(&mut input, 0));
    }

    let renderer = BacktraceRenderer::new().with_detailed_debug(true);
    let summary = renderer.summarize_args(&args);
    // capped tokens and strings keep the summary small
    assert!(summary.len() < 64 * 1024);

    let frame = Frame::function("fuzzed").with_args(args);
    let _ = renderer.render(&[frame]);
});
