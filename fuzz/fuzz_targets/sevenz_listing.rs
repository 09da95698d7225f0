//! Fuzz target for 7z header parsing with arbitrary byte input.
//!
//! Exercises the start header, plain and encoded main headers, and the
//! files-info walk. The goal is to find panics, hangs, or unbounded
//! allocations in the parsing logic.
//!
//! Run with: cargo +nightly fuzz run sevenz_listing

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use torrentsig::ResourceLimits;

fuzz_target!(|data: &[u8]| {
    let limits = ResourceLimits::new()
        .max_entries(10_000)
        .max_header_bytes(1 << 20);

    if let Ok(listing) = torrentsig::sevenz::read_listing(&mut Cursor::new(data), &limits) {
        let _ = listing.is_sorted();
        let _ = listing.total_size();
        for entry in listing.entries() {
            let _ = entry.path.as_str();
            let _ = entry.is_directory();
        }
    }
});
