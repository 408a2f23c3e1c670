//! TDirectory key lists.

use crate::error::Result;
use crate::key::Key;
use crate::rbuffer::RBuffer;

/// The ordered keys of one directory.
#[derive(Debug, Clone)]
pub struct Directory {
    keys: Vec<Key>,
}

impl Directory {
    /// Read the key list stored at `seek_keys`.
    ///
    /// The list is itself a keyed record: a key header, a u32 key count,
    /// then one key header per object.
    pub fn read_key_list(file_data: &[u8], seek_keys: usize, is_large_file: bool) -> Result<Self> {
        let mut r = RBuffer::new(file_data);
        r.set_pos(seek_keys)?;

        let _list_key = Key::read(&mut r, is_large_file)?;
        let n_keys = r.read_u32()? as usize;

        let keys =
            (0..n_keys).map(|_| Key::read(&mut r, is_large_file)).collect::<Result<Vec<_>>>()?;
        Ok(Directory { keys })
    }

    /// All keys, in file order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Highest-cycle key with this name.
    pub fn find_key(&self, name: &str) -> Option<&Key> {
        self.keys.iter().filter(|k| k.name == name).max_by_key(|k| k.cycle)
    }
}
