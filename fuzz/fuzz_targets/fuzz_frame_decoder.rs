//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder, split
//! at a fuzzer-chosen point, and asserts that it never panics, never
//! yields an empty or oversize payload, and accepts bytes cleanly again
//! after a reset.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use simlink::rpc::codec::FrameDecoder;

const MAX: usize = 4096;

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::with_max_frame_size(MAX);

    let split = data.first().map_or(0, |&b| usize::from(b)).min(data.len());
    let (head, tail) = data.split_at(split);
    for frame in decoder.feed(head).into_iter().chain(decoder.feed(tail)) {
        assert!(!frame.is_empty(), "decoder must not yield empty payload");
        assert!(frame.len() <= MAX, "payload exceeds max frame size");
    }

    decoder.reset();
    let _ = decoder.feed(data);
});
