//! Fuzz target for ZIP central directory reading and trailer synthesis.
//!
//! Run with: cargo +nightly fuzz run zip_central_dir

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use torrentsig::zip::{self, signature};

fuzz_target!(|data: &[u8]| {
    if let Ok(members) = zip::read_members(&mut Cursor::new(data)) {
        let _ = zip::listing(&members);
        let _ = signature::compute_signature(&members, data.len() as u64 > zip::ZIP64_LIMIT);
    }
});
