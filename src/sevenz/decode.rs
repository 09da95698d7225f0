//! Decoding of packed (encoded) 7z headers.
//!
//! Archives written with header compression store the real header as a
//! packed stream, usually LZMA. Only single-coder folders are accepted:
//! header filters and header encryption are out of reach of a listing.

use std::io::{Read, Seek, SeekFrom};

use crate::format::{SIGNATURE_HEADER_SIZE, method_id};
use crate::{Error, Result};

use super::header::{Coder, ResourceLimits, StreamsInfo};

/// Unpacks the header described by `streams`.
pub fn decode_header<R: Read + Seek>(
    reader: &mut R,
    streams: &StreamsInfo,
    limits: &ResourceLimits,
) -> Result<Vec<u8>> {
    let folder = match streams.folders.as_slice() {
        [folder] => folder,
        [] => return Err(Error::InvalidFormat("encoded header has no folders".into())),
        _ => {
            return Err(Error::UnsupportedFeature {
                feature: "encoded header spanning several folders",
            });
        }
    };
    let coder = match folder.coders.as_slice() {
        [coder] => coder,
        [] => return Err(Error::InvalidFormat("encoded header folder has no coders".into())),
        _ => {
            return Err(Error::UnsupportedFeature {
                feature: "filtered or encrypted encoded header",
            });
        }
    };

    let pack_size = streams
        .pack_sizes
        .first()
        .copied()
        .ok_or_else(|| Error::InvalidFormat("encoded header missing pack size".into()))?;
    let unpack_size = folder
        .unpack_size()
        .ok_or_else(|| Error::InvalidFormat("encoded header missing unpack size".into()))?;
    limits.check_header_size(pack_size, "packed header")?;
    limits.check_header_size(unpack_size, "unpacked header")?;

    let file_len = reader.seek(SeekFrom::End(0))?;
    let pack_pos = SIGNATURE_HEADER_SIZE
        .checked_add(streams.pack_pos)
        .filter(|pos| pos.checked_add(pack_size).is_some_and(|end| end <= file_len))
        .ok_or_else(|| {
            Error::corrupt_header(
                SIGNATURE_HEADER_SIZE,
                format!(
                    "packed header ({} bytes at {}) lies outside the file",
                    pack_size, streams.pack_pos
                ),
            )
        })?;

    let mut packed = vec![0u8; pack_size as usize];
    reader.seek(SeekFrom::Start(pack_pos))?;
    reader.read_exact(&mut packed)?;

    let decoded = decode_stream(coder, packed, unpack_size)?;
    if decoded.len() as u64 != unpack_size {
        return Err(Error::corrupt_header(
            pack_pos,
            format!(
                "encoded header unpacked to {} bytes, expected {}",
                decoded.len(),
                unpack_size
            ),
        ));
    }

    if let Some(expected) = folder.unpack_crc {
        let actual = crate::checksum::crc32(&decoded);
        if actual != expected {
            return Err(Error::corrupt_header(
                pack_pos,
                format!(
                    "encoded header CRC mismatch: expected {:#010x}, got {:#010x}",
                    expected, actual
                ),
            ));
        }
    }
    Ok(decoded)
}

#[cfg_attr(not(feature = "lzma"), allow(unused_variables))]
fn decode_stream(coder: &Coder, packed: Vec<u8>, unpack_size: u64) -> Result<Vec<u8>> {
    match coder.method() {
        method_id::COPY => Ok(packed),
        #[cfg(feature = "lzma")]
        method_id::LZMA => lzma::decode_lzma(&coder.properties, packed, unpack_size),
        #[cfg(feature = "lzma")]
        method_id::LZMA2 => lzma::decode_lzma2(&coder.properties, packed, unpack_size),
        method_id::AES_256_SHA_256 => Err(Error::UnsupportedFeature {
            feature: "encrypted headers",
        }),
        other => Err(Error::UnsupportedMethod { method_id: other }),
    }
}

#[cfg(feature = "lzma")]
mod lzma {
    use std::io::{self, Cursor, Read};

    use crate::{Error, Result};

    fn invalid_data(e: impl std::fmt::Display) -> Error {
        Error::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }

    pub(super) fn decode_lzma(properties: &[u8], packed: Vec<u8>, unpack_size: u64) -> Result<Vec<u8>> {
        let [props_byte, d0, d1, d2, d3] = properties
            .get(..5)
            .and_then(|p| <[u8; 5]>::try_from(p).ok())
            .ok_or_else(|| Error::InvalidFormat("LZMA properties too short (need 5 bytes)".into()))?;
        let dict_size = u32::from_le_bytes([d0, d1, d2, d3]);

        let reader = lzma_rust2::LzmaReader::new_with_props(
            Cursor::new(packed),
            unpack_size,
            props_byte,
            dict_size,
            None,
        )
        .map_err(invalid_data)?;
        read_all(reader, unpack_size)
    }

    pub(super) fn decode_lzma2(properties: &[u8], packed: Vec<u8>, unpack_size: u64) -> Result<Vec<u8>> {
        let prop = *properties
            .first()
            .ok_or_else(|| Error::InvalidFormat("LZMA2 properties missing".into()))?;
        let reader = lzma_rust2::Lzma2Reader::new(Cursor::new(packed), lzma2_dict_size(prop)?, None);
        read_all(reader, unpack_size)
    }

    fn read_all<R: Read>(reader: R, unpack_size: u64) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(unpack_size as usize);
        reader.take(unpack_size).read_to_end(&mut out)?;
        Ok(out)
    }

    /// Dictionary size encoded by an LZMA2 property byte.
    pub(super) fn lzma2_dict_size(prop: u8) -> Result<u32> {
        match prop {
            40 => Ok(0xFFFF_FFFF),
            p if p > 40 => Err(Error::InvalidFormat(format!(
                "invalid LZMA2 dictionary size property: {}",
                p
            ))),
            p if p % 2 == 0 => Ok(1u32 << (p / 2 + 12)),
            p => Ok(3u32 << (p / 2 + 11)),
        }
    }

}
