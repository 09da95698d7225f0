//! torrent7z-style 7z signatures.
//!
//! A torrent7z archive ends with a 38-byte trailer whose CRC covers the
//! head and tail of the archive, its length, and the trailer's own option
//! bits. Unlike the ZIP scheme, nothing is synthesized from the member
//! list; the listing is read only to learn whether the archive holds a
//! single file, which is one of the option bits.
//!
//! # Module Organization
//!
//! - [`header`] - start header and main header parsing for the listing
//! - [`decode`] - unpacking of encoded headers
//! - [`signature`] - computes, reads, writes, strips, and verifies the trailer

pub mod decode;
pub mod header;
pub mod signature;

pub use header::{ResourceLimits, StartHeader, read_listing};
pub use signature::{SevenZipSignature, SignFlags};
