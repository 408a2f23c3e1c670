//! # rtb-root
//!
//! Native ROOT histogram I/O for rtb.
//!
//! Writes and reads TH1D histograms stored as keys in the top directory of a
//! `.root` file, uncompressed or zlib-compressed, without requiring ROOT.
//! Also provides the single-pass histogram filler used by plot evaluation.
//!
//! ## Example
//!
//! ```no_run
//! use rtb_root::{Compression, Histogram, RootFile, RootWriter};
//!
//! let mut h = Histogram::uniform("h_count_genweight", "genweight sum", 1, 0.0, 1.0).unwrap();
//! h.fill(0.0, 0.7);
//!
//! let mut w = RootWriter::create("counters.root", Compression::Zlib(1)).unwrap();
//! w.put_histogram(&h).unwrap();
//! w.finish().unwrap();
//!
//! let f = RootFile::open("counters.root").unwrap();
//! for key in f.list_keys().unwrap() {
//!     println!("{} ({})", key.name, key.class_name);
//! }
//! let back = f.get_histogram("h_count_genweight").unwrap();
//! println!("sum: {}", back.bin_content[0]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compress;
pub mod directory;
pub mod error;
pub mod file;
pub mod filler;
pub mod histogram;
pub mod key;
pub mod objects;
pub mod rbuffer;
pub mod wbuffer;
pub mod writer;

pub use error::{Result, RootError};
pub use file::RootFile;
pub use filler::{FlowPolicy, HistogramSpec, fill_histogram};
pub use histogram::Histogram;
pub use key::KeyInfo;
pub use writer::{Compression, RootWriter};
