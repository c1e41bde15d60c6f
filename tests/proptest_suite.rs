//! Property-based tests for fault_ring
//!
//! These tests use proptest to generate random inputs and verify invariants hold.

use fault_ring::{
    ArgValue, BacktraceRenderer, Frame, MessageRing, Severity, SeverityMask, truncate,
};
use fault_ring::backtrace::MAX_NESTING;
use proptest::prelude::*;

fn severity() -> impl Strategy<Value = Severity> {
    prop::sample::select(Severity::ALL.to_vec())
}

fn ordered_severity() -> impl Strategy<Value = Severity> {
    prop::sample::select(
        Severity::ALL
            .iter()
            .copied()
            .filter(|s| s.is_ordered())
            .collect::<Vec<_>>(),
    )
}

fn arg_value() -> impl Strategy<Value = ArgValue> {
    let leaf = prop_oneof![
        Just(ArgValue::Null),
        any::<bool>().prop_map(ArgValue::Bool),
        any::<i64>().prop_map(ArgValue::Int),
        "[a-z]{0,12}".prop_map(ArgValue::Str),
        "[A-Z][a-z]{0,8}".prop_map(ArgValue::object),
    ];
    leaf.prop_recursive(6, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(ArgValue::List),
            prop::collection::vec(("[a-z]{1,4}", inner), 0..6).prop_map(ArgValue::Map),
        ]
    })
}

fn nesting_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    for c in text.chars() {
        match c {
            '[' => {
                depth += 1;
                max = max.max(depth);
            }
            ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

// ============================================================================
// RING BUFFER PROPERTIES
// ============================================================================

proptest! {
    /// Counters track exactly the appends that were recorded
    #[test]
    fn counters_match_recorded_appends(
        ops in prop::collection::vec((severity(), "[a-c]{1,2}"), 0..64),
    ) {
        let mut ring = MessageRing::new();
        let mut expected = [0usize; 9];
        for (sev, msg) in &ops {
            if ring.append(msg, *sev).is_recorded() {
                let slot = Severity::ALL.iter().position(|s| s == sev).unwrap();
                expected[slot] += 1;
            }
        }
        for (slot, sev) in Severity::ALL.iter().enumerate() {
            prop_assert_eq!(ring.count(*sev), expected[slot]);
        }
        prop_assert_eq!(ring.len(), expected.iter().sum::<usize>());
    }

    /// Back-to-back identical appends leave one record
    #[test]
    fn consecutive_duplicates_collapse(sev in severity(), msg in "\\PC{0,40}", times in 2usize..8) {
        let mut ring = MessageRing::new();
        for _ in 0..times {
            ring.append(&msg, sev);
        }
        prop_assert_eq!(ring.len(), 1);
        prop_assert_eq!(ring.count(sev), 1);
    }

    /// The buffer never holds two adjacent identical records
    #[test]
    fn no_adjacent_duplicates(
        ops in prop::collection::vec((severity(), "[ab]"), 0..64),
    ) {
        let mut ring = MessageRing::new();
        for (sev, msg) in &ops {
            ring.append(msg, *sev);
        }
        for pair in ring.records().windows(2) {
            prop_assert!(pair[0].severity != pair[1].severity || pair[0].message != pair[1].message);
        }
    }

    /// An unfiltered flush resets everything
    #[test]
    fn full_flush_resets(
        ops in prop::collection::vec((severity(), "[a-z]{1,6}"), 0..32),
    ) {
        let mut ring = MessageRing::new();
        for (sev, msg) in &ops {
            ring.append(msg, *sev);
        }
        let before = ring.len();
        prop_assert_eq!(ring.flush(None).len(), before);
        prop_assert!(ring.is_empty());
        prop_assert_eq!(ring.worst_severity(), Severity::Ok);
        prop_assert_eq!(ring.accumulator(), SeverityMask::empty());
    }

    /// A filtered flush splits the buffer by kind and preserves order
    #[test]
    fn filtered_flush_partitions(
        ops in prop::collection::vec((severity(), "[a-z]{1,6}"), 0..32),
        filter_bits in any::<u8>(),
    ) {
        let filter = SeverityMask::from_bits_truncate(filter_bits);
        let mut ring = MessageRing::new();
        for (sev, msg) in &ops {
            ring.append(msg, *sev);
        }
        let all = ring.peek(None);
        let taken = ring.flush(Some(filter));
        let kept = ring.peek(None);

        prop_assert_eq!(taken.len() + kept.len(), all.len());
        prop_assert!(taken.iter().all(|r| filter.admits(r.severity)));
        prop_assert!(kept.iter().all(|r| !filter.admits(r.severity)));
        prop_assert!(!ring.accumulator().intersects(filter));
    }

    /// Downgrade never raises a record and never exceeds the ceiling
    #[test]
    fn downgrade_only_lowers(
        ops in prop::collection::vec((ordered_severity(), "[a-z]{1,6}"), 0..32),
        ceiling in ordered_severity(),
    ) {
        // distinct messages so clamped neighbours cannot collapse
        let mut ring = MessageRing::new();
        for (i, (sev, msg)) in ops.iter().enumerate() {
            ring.append(&format!("{i}:{msg}"), *sev);
        }
        let before = ring.peek(None);
        ring.downgrade(ceiling);
        let after = ring.peek(None);

        prop_assert_eq!(before.len(), after.len());
        for (old, new) in before.iter().zip(&after) {
            prop_assert!(new.severity <= ceiling);
            prop_assert!(new.severity <= old.severity);
            if old.severity <= ceiling {
                prop_assert_eq!(new.severity, old.severity);
            }
        }
    }
}

// ============================================================================
// BACKTRACE RENDERER PROPERTIES
// ============================================================================

proptest! {
    /// Argument summaries stay balanced and bounded in depth
    #[test]
    fn summaries_are_balanced(args in prop::collection::vec(arg_value(), 0..6)) {
        let text = BacktraceRenderer::new().summarize_args(&args);
        let opens = text.matches('[').count();
        let closes = text.matches(']').count();
        prop_assert_eq!(opens, closes, "unbalanced: {}", text);
        prop_assert!(nesting_depth(&text) <= MAX_NESTING);
    }

    /// Rendering never panics and emits one entry per frame up to the cap
    #[test]
    fn render_emits_one_entry_per_frame(
        names in prop::collection::vec("[a-z_]{1,10}", 0..20),
        max in 1usize..10,
    ) {
        let frames: Vec<Frame> = names
            .iter()
            .enumerate()
            .map(|(i, n)| Frame::function(n.as_str()).at("src/lib.rs", i as u32 + 1))
            .collect();
        let out = BacktraceRenderer::new().with_max_frames(max).render(&frames);
        prop_assert_eq!(out.matches("\n\t[").count(), frames.len().min(max));
    }

    /// Offsets past the end are rejected; the rest renumber from zero
    #[test]
    fn render_from_bounds(depth in 0usize..8, offset in 0usize..12) {
        let frames: Vec<Frame> = (0..depth).map(|i| Frame::function(format!("f{i}"))).collect();
        let result = BacktraceRenderer::new().render_from(&frames, offset);
        if offset > depth {
            prop_assert!(result.is_err());
        } else {
            let text = result.unwrap();
            if offset < depth {
                prop_assert!(text.starts_with("0. "));
                let expected = format!("0. f{offset}(");
                prop_assert!(text.starts_with(&expected));
            } else {
                prop_assert!(text.is_empty());
            }
        }
    }
}

// ============================================================================
// TRUNCATION PROPERTIES
// ============================================================================

proptest! {
    /// Truncation keeps the prefix and adds the marker only when needed
    #[test]
    fn truncate_prefix(s in "\\PC{0,200}", len in 0usize..100) {
        let out = truncate(&s, len);
        let chars = s.chars().count();
        if chars <= len {
            prop_assert_eq!(out.as_ref(), s.as_str());
        } else {
            let prefix: String = s.chars().take(len).collect();
            prop_assert_eq!(out.into_owned(), format!("{prefix}..."));
        }
    }
}
