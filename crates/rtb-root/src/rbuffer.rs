//! Cursor over ROOT's big-endian serialization format.

use crate::error::{Result, RootError};

/// Flag set on the leading u32 of a streamed object that carries a byte count.
pub const BYTE_COUNT_MASK: u32 = 0x4000_0000;

/// `TObject::kIsReferenced`: a process-id word follows the bits.
const K_IS_REFERENCED: u32 = 1 << 4;

/// A cursor-based reader over a byte slice.
pub struct RBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! read_be {
    ($name:ident, $ty:ty, $n:expr) => {
        #[doc = concat!("Read a big-endian `", stringify!($ty), "`.")]
        pub fn $name(&mut self) -> Result<$ty> {
            let b = self.read_bytes($n)?;
            let mut arr = [0u8; $n];
            arr.copy_from_slice(b);
            Ok(<$ty>::from_be_bytes(arr))
        }
    };
}

impl<'a> RBuffer<'a> {
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Move the cursor to an absolute position.
    pub fn set_pos(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(RootError::BufferUnderflow {
                offset: pos,
                need: 0,
                have: 0,
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Borrow the next `n` bytes and advance.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    read_be!(read_u16, u16, 2);
    read_be!(read_i16, i16, 2);
    read_be!(read_u32, u32, 4);
    read_be!(read_i32, i32, 4);
    read_be!(read_u64, u64, 8);
    read_be!(read_f32, f32, 4);
    read_be!(read_f64, f64, 8);

    /// Read a `TString`: one length byte, or 255 followed by a u32 length.
    pub fn read_string(&mut self) -> Result<String> {
        let first = self.read_u8()?;
        let len = if first == 255 { self.read_u32()? as usize } else { first as usize };
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a streamer version header.
    ///
    /// Returns `(version, end)`: `end` is the absolute position where the
    /// object ends when a byte count is present. The byte count covers
    /// everything after the leading u32, version included.
    pub fn read_version(&mut self) -> Result<(u16, Option<usize>)> {
        let start = self.pos;
        let raw = self.read_u32()?;
        if raw & BYTE_COUNT_MASK != 0 {
            let count = (raw & !BYTE_COUNT_MASK) as usize;
            let version = self.read_u16()?;
            Ok((version, Some(start + 4 + count)))
        } else {
            // No byte count: the first two bytes were the version.
            self.pos = start + 2;
            Ok(((raw >> 16) as u16, None))
        }
    }

    /// Skip a versioned object using its byte count.
    pub fn skip_versioned(&mut self) -> Result<u16> {
        let (version, end) = self.read_version()?;
        match end {
            Some(end) => self.set_pos(end)?,
            None => {
                return Err(RootError::Deserialization(format!(
                    "cannot skip object (version {version}) without byte count at offset {}",
                    self.pos
                )));
            }
        }
        Ok(version)
    }

    /// Read a `TObject` header, returning `(unique_id, bits)`.
    pub fn read_tobject(&mut self) -> Result<(u32, u32)> {
        let _version = self.read_u16()?;
        let unique_id = self.read_u32()?;
        let bits = self.read_u32()?;
        if bits & K_IS_REFERENCED != 0 {
            self.skip(2)?;
        }
        Ok((unique_id, bits))
    }

    /// Read a `TNamed`, returning `(name, title)`.
    pub fn read_tnamed(&mut self) -> Result<(String, String)> {
        let (_version, end) = self.read_version()?;
        self.read_tobject()?;
        let name = self.read_string()?;
        let title = self.read_string()?;
        if let Some(end) = end {
            self.set_pos(end)?;
        }
        Ok((name, title))
    }

    /// Read a `TArrayD`: i32 length then that many f64.
    pub fn read_array_f64(&mut self) -> Result<Vec<f64>> {
        let n = self.read_array_len()?;
        (0..n).map(|_| self.read_f64()).collect()
    }

    /// Read a `TArrayF` widened to f64.
    pub fn read_array_f32(&mut self) -> Result<Vec<f64>> {
        let n = self.read_array_len()?;
        (0..n).map(|_| self.read_f32().map(f64::from)).collect()
    }

    fn read_array_len(&mut self) -> Result<usize> {
        let n = self.read_i32()?;
        usize::try_from(n)
            .map_err(|_| RootError::Deserialization(format!("negative array length {n}")))
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.pos + n > self.data.len() {
            return Err(RootError::BufferUnderflow {
                offset: self.pos,
                need: n,
                have: self.remaining(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_primitives() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x40, 0x09, 0x21, 0xfb, 0x54, 0x44, 0x2d, 0x18];
        let mut r = RBuffer::new(&data);
        assert_eq!(r.read_u32().unwrap(), 0x0102_0304);
        assert!((r.read_f64().unwrap() - std::f64::consts::PI).abs() < 1e-15);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn read_short_and_long_strings() {
        let data = [3, b'a', b'b', b'c'];
        assert_eq!(RBuffer::new(&data).read_string().unwrap(), "abc");

        let long = "x".repeat(300);
        let mut data = vec![255];
        data.extend_from_slice(&300u32.to_be_bytes());
        data.extend_from_slice(long.as_bytes());
        assert_eq!(RBuffer::new(&data).read_string().unwrap(), long);
    }

    #[test]
    fn version_with_byte_count() {
        let mut data = Vec::new();
        data.extend_from_slice(&(BYTE_COUNT_MASK | 16).to_be_bytes());
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&[0u8; 20]);
        let mut r = RBuffer::new(&data);
        let (ver, end) = r.read_version().unwrap();
        assert_eq!(ver, 3);
        assert_eq!(end, Some(20));
        r.set_pos(0).unwrap();
        r.skip_versioned().unwrap();
        assert_eq!(r.pos(), 20);
    }

    #[test]
    fn version_without_byte_count() {
        let data = [0x00, 0x05, 0x00, 0x00];
        let mut r = RBuffer::new(&data);
        let (ver, end) = r.read_version().unwrap();
        assert_eq!(ver, 5);
        assert!(end.is_none());
        assert_eq!(r.pos(), 2);
    }

    #[test]
    fn underflow_is_reported() {
        let data = [0u8; 3];
        let err = RBuffer::new(&data).read_u32().unwrap_err();
        assert!(matches!(err, RootError::BufferUnderflow { need: 4, have: 3, .. }));
    }
}
