//! ROOT file writer for histograms.
//!
//! Produces a small-layout ROOT file (32-bit seeks) with all objects keyed in
//! the top directory:
//! ```text
//! 0      file header ("root", version, fBEGIN, fEND, ...), padded to fBEGIN
//! 100    TFile key + name/title + TDirectory record
//! ...    one TKey + (optionally zlib-compressed) payload per object
//! info   StreamerInfo key + empty TList
//! seek   key list: list key, n_keys, key headers
//! free   free-segments key + one TFree [fEND, 2000000000]
//! ```
//! The file is assembled in memory and written on [`RootWriter::finish`].

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::compress::compress;
use crate::error::{Result, RootError};
use crate::histogram::Histogram;
use crate::key::{KEY_VERSION, Key};
use crate::objects::{TH1D_CLASS, TLIST_CLASS, write_empty_tlist, write_th1d};
use crate::wbuffer::WBuffer;

/// ROOT magic.
pub(crate) const ROOT_MAGIC: &[u8; 4] = b"root";
/// Offset of the first record.
pub(crate) const BEGIN: usize = 100;
/// File format version written (ROOT 6.22/06).
const FILE_VERSION: u32 = 62206;
const DIR_VERSION: u16 = 5;
/// TDirectory record: version, two datimes, five u32 fields, UUID, spare room.
const DIR_RECORD_LEN: usize = 2 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 18 + 12;
/// Objects at or below this size are stored uncompressed.
const MIN_COMPRESS_LEN: usize = 256;
/// Name of the streamer-info record.
pub(crate) const STREAMER_INFO: &str = "StreamerInfo";
/// End of the trailing free segment in small files.
pub(crate) const FREE_SEGMENT_END: u32 = 2_000_000_000;
/// TFree record: version, fFirst, fLast.
const FREE_RECORD_LEN: usize = 2 + 4 + 4;
/// Packed `TDatime` for 1995-01-01 00:00:00, fixed so outputs are byte-reproducible.
const DATIME: u32 = (1 << 22) | (1 << 17);

/// Payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Store objects uncompressed.
    None,
    /// zlib at the given level (clamped to 1–9).
    Zlib(u32),
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Zlib(1)
    }
}

impl Compression {
    /// Build from a numeric level: 0 disables compression.
    pub fn from_level(level: u32) -> Self {
        match level {
            0 => Compression::None,
            l => Compression::Zlib(l.min(9)),
        }
    }

    fn level(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Zlib(l) => l.clamp(1, 9),
        }
    }

    /// `fCompress` value: algorithm × 100 + level (zlib = 1).
    fn settings(self) -> u32 {
        match self.level() {
            0 => 0,
            l => 100 + l,
        }
    }
}

/// Writer for a new ROOT file holding histograms.
pub struct RootWriter {
    file: File,
    path: PathBuf,
    file_name: String,
    compression: Compression,
    buf: WBuffer,
    keys: Vec<Key>,
}

impl RootWriter {
    /// Create (truncate) `path`.
    pub fn create(path: impl AsRef<Path>, compression: Compression) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file.root".to_string());

        let mut buf = WBuffer::new();
        buf.write_zeros(BEGIN);
        let (record, _) = file_record(&file_name, 0, 0)?;
        buf.write_bytes(&record);

        Ok(Self { file, path, file_name, compression, buf, keys: Vec::new() })
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a histogram as a TH1D keyed by its name.
    ///
    /// Writing the same name twice stores a new cycle; readers pick the
    /// highest one.
    pub fn put_histogram(&mut self, h: &Histogram) -> Result<()> {
        let payload = write_th1d(h)?;
        self.put_object(TH1D_CLASS, &h.name, &h.title, payload)
    }

    fn put_object(&mut self, class: &str, name: &str, title: &str, payload: Vec<u8>) -> Result<()> {
        let obj_len = to_u32(payload.len(), "object length")?;
        let level = self.compression.level();
        let stored = if level > 0 && payload.len() > MIN_COMPRESS_LEN {
            compress(&payload, level)?.unwrap_or(payload)
        } else {
            payload
        };

        let cycle = self.keys.iter().filter(|k| k.name == name).map(|k| k.cycle).max().unwrap_or(0)
            + 1;
        let key = self.write_record(class, name, title, obj_len, cycle, &stored)?;
        tracing::trace!(name, class, cycle, obj_len, stored = stored.len(), "object written");
        self.keys.push(key);
        Ok(())
    }

    /// Append a key and its stored payload at the current end.
    fn write_record(
        &mut self,
        class: &str,
        name: &str,
        title: &str,
        obj_len: u32,
        cycle: u16,
        stored: &[u8],
    ) -> Result<Key> {
        let key_len = Key::header_len(class, name, title);
        let key = Key {
            n_bytes: to_u32(key_len + stored.len(), "record length")?,
            version: KEY_VERSION,
            obj_len,
            datime: DATIME,
            key_len: u16::try_from(key_len).map_err(|_| {
                RootError::Serialization(format!("key header for '{name}' too long"))
            })?,
            cycle,
            seek_key: self.buf.len() as u64,
            seek_pdir: BEGIN as u64,
            class_name: class.to_string(),
            name: name.to_string(),
            title: title.to_string(),
        };
        key.write(&mut self.buf)?;
        self.buf.write_bytes(stored);
        Ok(key)
    }

    /// Write the streamer info, key list, free segments and header, then
    /// flush the file to disk.
    pub fn finish(mut self) -> Result<()> {
        let info = write_empty_tlist()?;
        let info_len = to_u32(info.len(), "streamer info")?;
        let info_key = self.write_record(TLIST_CLASS, STREAMER_INFO, "", info_len, 1, &info)?;

        let seek_keys = self.buf.len();
        let list_key_len = Key::header_len("TFile", &self.file_name, "");
        let nbytes_keys = list_key_len
            + 4
            + self.keys.iter().map(|k| usize::from(k.key_len)).sum::<usize>();
        let list_key = Key {
            n_bytes: to_u32(nbytes_keys, "key list length")?,
            version: KEY_VERSION,
            obj_len: to_u32(nbytes_keys - list_key_len, "key list length")?,
            datime: DATIME,
            key_len: list_key_len as u16,
            cycle: 1,
            seek_key: seek_keys as u64,
            seek_pdir: BEGIN as u64,
            class_name: "TFile".to_string(),
            name: self.file_name.clone(),
            title: String::new(),
        };
        list_key.write(&mut self.buf)?;
        self.buf.write_u32(self.keys.len() as u32);
        for key in &self.keys {
            key.write(&mut self.buf)?;
        }

        let seek_free = self.buf.len();
        let end = seek_free + Key::header_len("TFile", &self.file_name, "") + FREE_RECORD_LEN;
        let mut free = WBuffer::new();
        free.write_u16(1);
        free.write_u32(to_u32(end, "file length")?);
        free.write_u32(FREE_SEGMENT_END);
        let file_name = self.file_name.clone();
        let free_key =
            self.write_record("TFile", &file_name, "", FREE_RECORD_LEN as u32, 1, free.as_slice())?;
        debug_assert_eq!(self.buf.len(), end);

        let (record, nbytes_name) = file_record(
            &self.file_name,
            to_u32(seek_keys, "seek_keys")?,
            to_u32(nbytes_keys, "key list length")?,
        )?;
        self.buf.patch_bytes(BEGIN, &record)?;

        let header = FileHeaderRecord {
            end: to_u32(end, "file length")?,
            seek_free: to_u32(seek_free, "fSeekFree")?,
            nbytes_free: free_key.n_bytes,
            nbytes_name,
            compress: self.compression.settings(),
            seek_info: to_u32(info_key.seek_key as usize, "fSeekInfo")?,
            nbytes_info: info_key.n_bytes,
        }
        .to_bytes();
        self.buf.patch_bytes(0, &header)?;

        self.file.write_all(self.buf.as_slice())?;
        self.file.flush()?;
        tracing::debug!(
            path = %self.path.display(),
            keys = self.keys.len(),
            bytes = end,
            "ROOT file written"
        );
        Ok(())
    }
}

fn to_u32(v: usize, what: &str) -> Result<u32> {
    u32::try_from(v)
        .map_err(|_| RootError::Serialization(format!("{what} {v} exceeds small-file limits")))
}

/// TFile key, its name/title and the top TDirectory record.
///
/// Returns the record bytes and `fNbytesName`.
fn file_record(file_name: &str, seek_keys: u32, nbytes_keys: u32) -> Result<(Vec<u8>, u32)> {
    let title = "";
    let key_len = Key::header_len("TFile", file_name, title);
    let nbytes_name = key_len + WBuffer::string_len(file_name) + WBuffer::string_len(title);
    let n_bytes = nbytes_name + DIR_RECORD_LEN;
    let key = Key {
        n_bytes: to_u32(n_bytes, "file record")?,
        version: KEY_VERSION,
        obj_len: to_u32(n_bytes - key_len, "file record")?,
        datime: DATIME,
        key_len: u16::try_from(key_len)
            .map_err(|_| RootError::Serialization("file name too long".into()))?,
        cycle: 1,
        seek_key: BEGIN as u64,
        seek_pdir: 0,
        class_name: "TFile".to_string(),
        name: file_name.to_string(),
        title: title.to_string(),
    };

    let mut w = WBuffer::new();
    key.write(&mut w)?;
    w.write_string(file_name);
    w.write_string(title);

    w.write_u16(DIR_VERSION);
    w.write_u32(DATIME); // fDatimeC
    w.write_u32(DATIME); // fDatimeM
    w.write_u32(nbytes_keys);
    w.write_u32(to_u32(nbytes_name, "fNbytesName")?);
    w.write_u32(BEGIN as u32); // fSeekDir
    w.write_u32(0); // fSeekParent
    w.write_u32(seek_keys);
    w.write_u16(1); // UUID version
    w.write_zeros(16);
    w.write_zeros(12);

    debug_assert_eq!(w.len(), n_bytes);
    Ok((w.into_inner(), nbytes_name as u32))
}

/// Fields of the small-file header that depend on the file contents.
struct FileHeaderRecord {
    end: u32,
    seek_free: u32,
    nbytes_free: u32,
    nbytes_name: u32,
    compress: u32,
    seek_info: u32,
    nbytes_info: u32,
}

impl FileHeaderRecord {
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = WBuffer::new();
        w.write_bytes(ROOT_MAGIC);
        w.write_u32(FILE_VERSION);
        w.write_u32(BEGIN as u32);
        w.write_u32(self.end);
        w.write_u32(self.seek_free);
        w.write_u32(self.nbytes_free);
        w.write_u32(1); // nfree
        w.write_u32(self.nbytes_name);
        w.write_u8(4); // fUnits
        w.write_u32(self.compress);
        w.write_u32(self.seek_info);
        w.write_u32(self.nbytes_info);
        w.write_u16(1); // UUID version
        w.write_zeros(16);
        w.into_inner()
    }
}
