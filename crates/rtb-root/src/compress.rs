//! ROOT compression blocks (zlib only).
//!
//! Compressed objects are stored as one or more blocks with a 9-byte header:
//! ```text
//! bytes 0-1:  algorithm tag ("ZL" = zlib)
//! byte  2:    method (8 = deflate)
//! bytes 3-5:  compressed size   (3-byte little-endian)
//! bytes 6-8:  uncompressed size (3-byte little-endian)
//! ```

use std::io::{Read, Write};

use flate2::Compression as ZlibLevel;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::{Result, RootError};

const HEADER_LEN: usize = 9;
/// Largest block size expressible in the 3-byte size fields.
const MAX_BLOCK: usize = 0x00ff_ffff;
const METHOD_DEFLATE: u8 = 8;

/// Decompress ROOT blocks into exactly `expected_len` bytes.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut offset = 0;

    while out.len() < expected_len {
        if offset + HEADER_LEN > src.len() {
            return Err(RootError::Decompression(format!(
                "truncated block header at offset {offset} ({} of {expected_len} bytes decoded)",
                out.len()
            )));
        }
        let tag = &src[offset..offset + 2];
        let c_size = read_le24(&src[offset + 3..offset + 6]);
        let u_size = read_le24(&src[offset + 6..offset + 9]);
        offset += HEADER_LEN;

        let end = offset + c_size;
        if end > src.len() {
            return Err(RootError::Decompression(format!(
                "block claims {c_size} bytes but only {} remain",
                src.len() - offset
            )));
        }
        if tag != b"ZL" {
            return Err(RootError::Decompression(format!(
                "unsupported compression algorithm: {:?}",
                String::from_utf8_lossy(tag)
            )));
        }

        let before = out.len();
        ZlibDecoder::new(&src[offset..end])
            .take(u_size as u64)
            .read_to_end(&mut out)
            .map_err(|e| RootError::Decompression(format!("zlib: {e}")))?;
        if out.len() - before != u_size {
            return Err(RootError::Decompression(format!(
                "expected {u_size} uncompressed bytes, got {}",
                out.len() - before
            )));
        }
        offset = end;
    }

    if out.len() != expected_len {
        return Err(RootError::Decompression(format!(
            "total decompressed length {} != expected {expected_len}",
            out.len()
        )));
    }
    Ok(out)
}

/// Compress `src` into zlib blocks at `level` (1–9).
///
/// Returns `None` when compression does not shrink the payload; ROOT then
/// stores the object uncompressed.
pub fn compress(src: &[u8], level: u32) -> Result<Option<Vec<u8>>> {
    let mut out = Vec::with_capacity(src.len() / 2 + HEADER_LEN);
    for chunk in src.chunks(MAX_BLOCK) {
        let mut enc = ZlibEncoder::new(Vec::new(), ZlibLevel::new(level.clamp(1, 9)));
        enc.write_all(chunk)?;
        let body = enc.finish()?;
        if body.len() > MAX_BLOCK {
            return Ok(None);
        }
        out.extend_from_slice(b"ZL");
        out.push(METHOD_DEFLATE);
        out.extend_from_slice(&write_le24(body.len()));
        out.extend_from_slice(&write_le24(chunk.len()));
        out.extend_from_slice(&body);
    }
    if out.len() >= src.len() { Ok(None) } else { Ok(Some(out)) }
}

fn read_le24(b: &[u8]) -> usize {
    b[0] as usize | (b[1] as usize) << 8 | (b[2] as usize) << 16
}

fn write_le24(v: usize) -> [u8; 3] {
    [(v & 0xff) as u8, ((v >> 8) & 0xff) as u8, ((v >> 16) & 0xff) as u8]
}
