//! TKey records: the headers ROOT uses to locate objects in a file.
//!
//! Small-file layout (key version < 1000):
//! ```text
//! nbytes u32 | version u16 | objlen u32 | datime u32 | keylen u16 | cycle u16
//! seek_key u32 | seek_pdir u32 | class TString | name TString | title TString
//! ```
//! Large keys (version > 1000) store both seeks as u64.

use crate::error::{Result, RootError};
use crate::rbuffer::RBuffer;
use crate::wbuffer::WBuffer;

/// Key version written by [`Key::write`] (small seeks).
pub const KEY_VERSION: u16 = 4;

/// Fixed-width part of a small key header.
const KEY_FIXED_LEN: usize = 4 + 2 + 4 + 4 + 2 + 2 + 4 + 4;

/// A parsed TKey record.
#[derive(Debug, Clone)]
pub struct Key {
    /// Key header plus stored (possibly compressed) object bytes.
    pub n_bytes: u32,
    /// Key class version.
    pub version: u16,
    /// Uncompressed object length.
    pub obj_len: u32,
    /// Creation time (packed `TDatime`).
    pub datime: u32,
    /// Length of the key header.
    pub key_len: u16,
    /// Cycle number within the directory.
    pub cycle: u16,
    /// Absolute file position of this key.
    pub seek_key: u64,
    /// Position of the owning directory.
    pub seek_pdir: u64,
    /// Class of the stored object.
    pub class_name: String,
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
}

/// Public description of a key, as returned by `RootFile::list_keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Object name.
    pub name: String,
    /// Class name (e.g. `TH1D`).
    pub class_name: String,
    /// Object title.
    pub title: String,
    /// Cycle number.
    pub cycle: u16,
}

impl From<&Key> for KeyInfo {
    fn from(key: &Key) -> Self {
        Self {
            name: key.name.clone(),
            class_name: key.class_name.clone(),
            title: key.title.clone(),
            cycle: key.cycle,
        }
    }
}

impl Key {
    /// Header length of a small key with these strings.
    pub fn header_len(class_name: &str, name: &str, title: &str) -> usize {
        KEY_FIXED_LEN
            + WBuffer::string_len(class_name)
            + WBuffer::string_len(name)
            + WBuffer::string_len(title)
    }

    /// Read a key at the reader's position.
    pub fn read(r: &mut RBuffer, is_large_file: bool) -> Result<Self> {
        let n_bytes = r.read_u32()?;
        let version = r.read_u16()?;
        let obj_len = r.read_u32()?;
        let datime = r.read_u32()?;
        let key_len = r.read_u16()?;
        let cycle = r.read_u16()?;

        let (seek_key, seek_pdir) = if version > 1000 || is_large_file {
            (r.read_u64()?, r.read_u64()?)
        } else {
            (u64::from(r.read_u32()?), u64::from(r.read_u32()?))
        };

        let class_name = r.read_string()?;
        let name = r.read_string()?;
        let title = r.read_string()?;

        Ok(Key {
            n_bytes,
            version,
            obj_len,
            datime,
            key_len,
            cycle,
            seek_key,
            seek_pdir,
            class_name,
            name,
            title,
        })
    }

    /// Append this key's header in small-key layout.
    pub fn write(&self, w: &mut WBuffer) -> Result<()> {
        let small = |v: u64, what: &str| {
            u32::try_from(v).map_err(|_| {
                RootError::Serialization(format!("{what} {v} does not fit a small key"))
            })
        };
        let start = w.len();
        w.write_u32(self.n_bytes);
        w.write_u16(self.version);
        w.write_u32(self.obj_len);
        w.write_u32(self.datime);
        w.write_u16(self.key_len);
        w.write_u16(self.cycle);
        w.write_u32(small(self.seek_key, "seek_key")?);
        w.write_u32(small(self.seek_pdir, "seek_pdir")?);
        w.write_string(&self.class_name);
        w.write_string(&self.name);
        w.write_string(&self.title);
        debug_assert_eq!(w.len() - start, usize::from(self.key_len));
        Ok(())
    }

    /// Byte range of the stored object, relative to the file start.
    pub fn payload_range(&self) -> Result<std::ops::Range<usize>> {
        let start = self.seek_key as usize + usize::from(self.key_len);
        let stored = (self.n_bytes as usize).checked_sub(usize::from(self.key_len)).ok_or_else(
            || {
                RootError::Deserialization(format!(
                    "key '{}': nbytes {} < keylen {}",
                    self.name, self.n_bytes, self.key_len
                ))
            },
        )?;
        Ok(start..start + stored)
    }
}
