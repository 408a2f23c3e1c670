//! TFile header parsing and the read-side file interface.

use std::fs;
use std::path::{Path, PathBuf};

use crate::compress::decompress;
use crate::directory::Directory;
use crate::error::{Result, RootError};
use crate::histogram::Histogram;
use crate::key::{Key, KeyInfo};
use crate::objects;
use crate::rbuffer::RBuffer;
use crate::writer::ROOT_MAGIC;

/// Smallest byte count that can hold a file header.
const MIN_FILE_LEN: usize = 63;

/// Parsed ROOT file header.
#[derive(Debug, Clone)]
struct FileHeader {
    /// Whether the file uses 64-bit seek pointers (version >= 1000000).
    is_large: bool,
    /// Offset of the top-directory key list.
    seek_keys: u64,
    /// Compression settings recorded in the header.
    compress: u32,
    /// `fEND`.
    end: u64,
    /// Offset and size of the free-segments record.
    seek_free: u64,
    nbytes_free: u32,
    nfree: u32,
    /// Offset of the StreamerInfo key.
    seek_info: u64,
}

/// A ROOT file opened for reading histograms.
pub struct RootFile {
    data: Vec<u8>,
    header: FileHeader,
    directory: Directory,
    path: PathBuf,
}

impl RootFile {
    /// Open and parse a ROOT file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = fs::read(&path)?;
        Self::from_bytes(data, path)
    }

    /// Parse a ROOT file already held in memory.
    pub fn from_bytes(data: Vec<u8>, path: PathBuf) -> Result<Self> {
        if data.len() < MIN_FILE_LEN || &data[0..4] != ROOT_MAGIC {
            return Err(RootError::BadMagic);
        }
        let header = Self::parse_header(&data)?;
        let directory =
            Directory::read_key_list(&data, header.seek_keys as usize, header.is_large)?;
        tracing::trace!(path = %path.display(), keys = directory.keys().len(), "ROOT file opened");
        Ok(Self { data, header, directory, path })
    }

    /// Parse the file header and the embedded top TDirectory.
    ///
    /// ```text
    /// offset  size  field
    ///    0      4   magic "root"
    ///    4      4   fVersion
    ///    8      4   fBEGIN
    ///   12    4/8   fEND
    ///         4/8   fSeekFree
    ///           4   fNbytesFree
    ///           4   nfree
    ///           4   fNbytesName
    ///           1   fUnits
    ///           4   fCompress
    ///         4/8   fSeekInfo
    ///           4   fNbytesInfo
    ///          18   fUUID
    /// ```
    fn parse_header(data: &[u8]) -> Result<FileHeader> {
        let mut r = RBuffer::new(data);
        r.skip(4)?;

        let version = r.read_u32()?;
        let is_large = version >= 1_000_000;
        let begin = r.read_u32()? as usize;
        let (end, seek_free) = if is_large {
            (r.read_u64()?, r.read_u64()?)
        } else {
            (u64::from(r.read_u32()?), u64::from(r.read_u32()?))
        };
        let nbytes_free = r.read_u32()?;
        let nfree = r.read_u32()?;
        let nbytes_name = r.read_u32()? as usize;
        let _units = r.read_u8()?;
        let compress = r.read_u32()?;
        let seek_info = if is_large { r.read_u64()? } else { u64::from(r.read_u32()?) };

        let seek_keys = Self::parse_top_directory(data, begin + nbytes_name)?;
        Ok(FileHeader {
            is_large,
            seek_keys,
            compress,
            end,
            seek_free,
            nbytes_free,
            nfree,
            seek_info,
        })
    }

    /// Read `fSeekKeys` from the TDirectory record at `offset`.
    fn parse_top_directory(data: &[u8], offset: usize) -> Result<u64> {
        if offset >= data.len() {
            return Err(RootError::Deserialization("TDirectory offset past end of file".into()));
        }
        let mut r = RBuffer::new(data);
        r.set_pos(offset)?;

        let dir_version = r.read_u16()?;
        let _datime_c = r.read_u32()?;
        let _datime_m = r.read_u32()?;
        let _nbytes_keys = r.read_u32()?;
        let _nbytes_name = r.read_u32()?;

        if dir_version > 1000 {
            let _seek_dir = r.read_u64()?;
            let _seek_parent = r.read_u64()?;
            r.read_u64()
        } else {
            let _seek_dir = r.read_u32()?;
            let _seek_parent = r.read_u32()?;
            Ok(u64::from(r.read_u32()?))
        }
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `fCompress` from the header (0 when uncompressed).
    pub fn compression_settings(&self) -> u32 {
        self.header.compress
    }

    /// `fEND` from the header.
    pub fn end(&self) -> u64 {
        self.header.end
    }

    /// Free segments recorded in the file, as `(first, last)` byte ranges.
    pub fn free_segments(&self) -> Result<Vec<(u64, u64)>> {
        let h = &self.header;
        if h.nfree == 0 || h.seek_free == 0 {
            return Ok(Vec::new());
        }
        let mut r = RBuffer::new(&self.data);
        r.set_pos(h.seek_free as usize)?;
        let key = Key::read(&mut r, h.is_large)?;
        if key.n_bytes != h.nbytes_free {
            return Err(RootError::Deserialization(format!(
                "free-segments key spans {} bytes, header says {}",
                key.n_bytes, h.nbytes_free
            )));
        }
        r.set_pos(key.payload_range()?.start)?;
        let mut segments = Vec::with_capacity(h.nfree as usize);
        for _ in 0..h.nfree {
            let version = r.read_u16()?;
            let segment = if version > 1000 {
                (r.read_u64()?, r.read_u64()?)
            } else {
                (u64::from(r.read_u32()?), u64::from(r.read_u32()?))
            };
            segments.push(segment);
        }
        Ok(segments)
    }

    /// The StreamerInfo key, if the header points at one.
    pub fn streamer_info(&self) -> Result<Option<KeyInfo>> {
        if self.header.seek_info == 0 {
            return Ok(None);
        }
        let mut r = RBuffer::new(&self.data);
        r.set_pos(self.header.seek_info as usize)?;
        let key = Key::read(&mut r, self.header.is_large)?;
        Ok(Some(KeyInfo::from(&key)))
    }

    /// All keys of the top directory, in file order.
    pub fn list_keys(&self) -> Result<Vec<KeyInfo>> {
        Ok(self.directory.keys().iter().map(KeyInfo::from).collect())
    }

    /// Whether an object with this name exists.
    pub fn has_key(&self, name: &str) -> bool {
        self.directory.find_key(name).is_some()
    }

    /// Read a histogram by name (highest cycle).
    pub fn get_histogram(&self, name: &str) -> Result<Histogram> {
        let key =
            self.directory.find_key(name).ok_or_else(|| RootError::KeyNotFound(name.to_string()))?;
        let payload = self.read_key_payload(key)?;
        objects::read_histogram(&payload, &key.class_name)
    }

    /// Read every TH1D/TH1F in the file, latest cycle only, in key order.
    pub fn histograms(&self) -> Result<Vec<Histogram>> {
        let mut seen = Vec::<&str>::new();
        let mut out = Vec::new();
        for key in self.directory.keys() {
            let is_th1 = matches!(key.class_name.as_str(), "TH1D" | "TH1F");
            if !is_th1 || seen.contains(&key.name.as_str()) {
                continue;
            }
            seen.push(&key.name);
            out.push(self.get_histogram(&key.name)?);
        }
        Ok(out)
    }

    /// Read and, when needed, decompress the payload of a key.
    fn read_key_payload(&self, key: &Key) -> Result<Vec<u8>> {
        let range = key.payload_range()?;
        if range.end > self.data.len() {
            return Err(RootError::BufferUnderflow {
                offset: range.start,
                need: range.len(),
                have: self.data.len().saturating_sub(range.start),
            });
        }
        let stored = &self.data[range];
        if stored.len() != key.obj_len as usize {
            decompress(stored, key.obj_len as usize)
        } else {
            Ok(stored.to_vec())
        }
    }
}
