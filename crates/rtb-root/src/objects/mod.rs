//! ROOT object (de)serialization dispatch.

mod th1;

use crate::error::{Result, RootError};
use crate::histogram::Histogram;
use crate::wbuffer::WBuffer;

pub use th1::write_th1d;

/// Class name under which [`write_th1d`] payloads are keyed.
pub const TH1D_CLASS: &str = "TH1D";

/// Class of the streamer-info record.
pub const TLIST_CLASS: &str = "TList";
const TLIST_VERSION: u16 = 5;

/// An empty, unnamed `TList`.
pub fn write_empty_tlist() -> Result<Vec<u8>> {
    let mut w = WBuffer::new();
    let list = w.begin_versioned(TLIST_VERSION);
    w.write_tobject();
    w.write_string("");
    w.write_i32(0); // nobjects
    w.end_versioned(list)?;
    Ok(w.into_inner())
}

/// Decode a histogram payload of the given class.
pub fn read_histogram(payload: &[u8], class_name: &str) -> Result<Histogram> {
    match class_name {
        "TH1D" => th1::read_th1(payload, th1::Cells::F64),
        "TH1F" => th1::read_th1(payload, th1::Cells::F32),
        _ => Err(RootError::UnsupportedClass(class_name.to_string())),
    }
}
