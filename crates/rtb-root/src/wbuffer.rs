//! Growable writer producing ROOT's big-endian serialization format.
//!
//! Mirrors [`RBuffer`](crate::rbuffer::RBuffer): every `write_*` here has a
//! `read_*` counterpart there.

use crate::error::{Result, RootError};
use crate::rbuffer::BYTE_COUNT_MASK;

/// `TObject::kNotDeleted`, the only bit ROOT keeps set on streamed objects.
pub const K_NOT_DELETED: u32 = 0x0200_0000;

/// An append-only big-endian byte buffer.
#[derive(Debug, Default)]
pub struct WBuffer {
    data: Vec<u8>,
}

/// Position of a pending byte-count header opened by [`WBuffer::begin_versioned`].
#[derive(Debug, Clone, Copy)]
#[must_use = "close the object with WBuffer::end_versioned"]
pub struct ByteCountMark(usize);

macro_rules! write_be {
    ($name:ident, $ty:ty) => {
        #[doc = concat!("Append a big-endian `", stringify!($ty), "`.")]
        pub fn $name(&mut self, v: $ty) {
            self.data.extend_from_slice(&v.to_be_bytes());
        }
    };
}

impl WBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append `n` zero bytes.
    pub fn write_zeros(&mut self, n: usize) {
        self.data.resize(self.data.len() + n, 0);
    }

    /// Append one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    write_be!(write_u16, u16);
    write_be!(write_i16, i16);
    write_be!(write_u32, u32);
    write_be!(write_i32, i32);
    write_be!(write_f32, f32);
    write_be!(write_f64, f64);

    /// Overwrite bytes previously written at `pos`.
    pub fn patch_bytes(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        let len = self.data.len();
        let slot = self.data.get_mut(pos..pos + bytes.len()).ok_or_else(|| {
            RootError::Serialization(format!(
                "patch of {} bytes at {pos} outside buffer of {len}",
                bytes.len()
            ))
        })?;
        slot.copy_from_slice(bytes);
        Ok(())
    }

    /// Overwrite a u32 previously written at `pos`.
    pub fn patch_u32(&mut self, pos: usize, v: u32) -> Result<()> {
        self.patch_bytes(pos, &v.to_be_bytes())
    }

    /// Append a `TString`.
    pub fn write_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        if bytes.len() < 255 {
            self.write_u8(bytes.len() as u8);
        } else {
            self.write_u8(255);
            self.write_u32(bytes.len() as u32);
        }
        self.write_bytes(bytes);
    }

    /// Serialized size of a `TString`.
    pub fn string_len(s: &str) -> usize {
        let n = s.len();
        if n < 255 { 1 + n } else { 5 + n }
    }

    /// Open a versioned object: placeholder byte count, then `version`.
    pub fn begin_versioned(&mut self, version: u16) -> ByteCountMark {
        let mark = ByteCountMark(self.data.len());
        self.write_u32(0);
        self.write_u16(version);
        mark
    }

    /// Close an object opened by [`begin_versioned`](Self::begin_versioned).
    pub fn end_versioned(&mut self, mark: ByteCountMark) -> Result<()> {
        let count = self.data.len() - mark.0 - 4;
        let count = u32::try_from(count)
            .ok()
            .filter(|c| c & BYTE_COUNT_MASK == 0)
            .ok_or_else(|| RootError::Serialization(format!("object too large: {count} bytes")))?;
        self.patch_u32(mark.0, count | BYTE_COUNT_MASK)
    }

    /// Append a `TObject` header (version 1, no unique id).
    pub fn write_tobject(&mut self) {
        self.write_u16(1);
        self.write_u32(0);
        self.write_u32(K_NOT_DELETED);
    }

    /// Append a `TNamed`.
    pub fn write_tnamed(&mut self, name: &str, title: &str) -> Result<()> {
        let mark = self.begin_versioned(1);
        self.write_tobject();
        self.write_string(name);
        self.write_string(title);
        self.end_versioned(mark)
    }

    /// Append a `TArrayD`.
    pub fn write_array_f64(&mut self, values: &[f64]) {
        self.write_i32(values.len() as i32);
        for &v in values {
            self.write_f64(v);
        }
    }
}
