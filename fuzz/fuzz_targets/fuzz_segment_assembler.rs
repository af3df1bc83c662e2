//! Fuzz target: `SegmentAssembler::feed`
//!
//! Splits the input into length-prefixed chunks and feeds each one as a
//! notified segment. The assembler must never panic and never yield more
//! bytes than it was fed.
//!
//! cargo fuzz run fuzz_segment_assembler

#![no_main]

use ghs_peripheral::segment::SegmentAssembler;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut asm = SegmentAssembler::new();
    let mut fed = 0usize;
    let mut rest = data;

    while let Some((&len, tail)) = rest.split_first() {
        let take = usize::from(len).min(tail.len());
        let (chunk, next) = tail.split_at(take);
        rest = next;
        fed += chunk.len();

        if let Ok(Some(message)) = asm.feed(chunk) {
            assert!(message.len() <= fed, "assembler produced bytes it never saw");
        }
    }

    asm.reset();
    assert!(!asm.is_active());
});
