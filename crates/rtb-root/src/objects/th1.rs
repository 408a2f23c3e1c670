//! TH1D / TH1F streamers.
//!
//! Layout (TH1D v3 wrapping TH1 v8):
//! ```text
//! TH1D
//!   └─ TH1
//!        ├─ TNamed (name, title)
//!        ├─ TAttLine, TAttFill, TAttMarker
//!        ├─ fNcells (i32)
//!        ├─ fXaxis, fYaxis, fZaxis (TAxis)
//!        ├─ fBarOffset, fBarWidth (i16)
//!        ├─ fEntries, fTsumw, fTsumw2, fTsumwx, fTsumwx2 (f64)
//!        ├─ fMaximum, fMinimum, fNormFactor (f64)
//!        ├─ fContour, fSumw2 (TArrayD)
//!        ├─ fOption (TString), fFunctions (TList)
//!        ├─ fBufferSize (i32), fBuffer
//!        └─ fBinStatErrOpt, fStatOverflows (i32)
//!   └─ TArrayD (fNcells cells: underflow, bins, overflow)
//! ```
//! Every embedded object carries a byte count, so the reader skips what it
//! does not need.

use crate::error::{Result, RootError};
use crate::histogram::{Histogram, uniform_edges};
use crate::rbuffer::RBuffer;
use crate::wbuffer::{ByteCountMark, K_NOT_DELETED, WBuffer};

const TH1D_VERSION: u16 = 3;
const TH1_VERSION: u16 = 8;
const TAXIS_VERSION: u16 = 10;
const TLIST_VERSION: u16 = 5;
/// ROOT's "unset" marker for fMaximum / fMinimum.
const UNSET: f64 = -1111.0;
/// `TH1::kNeutral`.
const STAT_OVERFLOWS_NEUTRAL: i32 = 2;

/// Storage type of the trailing bin-content array.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Cells {
    F64,
    F32,
}

/// Decode a TH1D or TH1F payload.
pub(crate) fn read_th1(data: &[u8], cells: Cells) -> Result<Histogram> {
    let mut r = RBuffer::new(data);
    let (version, _end) = r.read_version()?;
    if version < 1 {
        return Err(RootError::Deserialization(format!(
            "unsupported TH1 subclass version {version}"
        )));
    }

    let base = read_th1_base(&mut r)?;

    let raw = match cells {
        Cells::F64 => r.read_array_f64()?,
        Cells::F32 => r.read_array_f32()?,
    };
    if raw.len() != base.n_cells {
        return Err(RootError::Deserialization(format!(
            "'{}': bin array size {} != fNcells {}",
            base.name,
            raw.len(),
            base.n_cells
        )));
    }
    build_histogram(base, raw)
}

struct Th1Base {
    name: String,
    title: String,
    n_cells: usize,
    axis: AxisInfo,
    entries: f64,
    sumw2: Vec<f64>,
}

struct AxisInfo {
    n_bins: usize,
    x_min: f64,
    x_max: f64,
    /// Explicit edges for variable binning, empty when uniform.
    edges: Vec<f64>,
}

fn read_th1_base(r: &mut RBuffer) -> Result<Th1Base> {
    let (version, end) = r.read_version()?;
    let end = end.ok_or_else(|| RootError::Deserialization("TH1 without byte count".into()))?;

    let (name, title) = r.read_tnamed()?;
    // TAttLine, TAttFill, TAttMarker
    for _ in 0..3 {
        r.skip_versioned()?;
    }

    let n_cells = r.read_i32()?;
    let n_cells = usize::try_from(n_cells)
        .map_err(|_| RootError::Deserialization(format!("'{name}': negative fNcells")))?;

    let axis = read_taxis(r)?;
    r.skip_versioned()?; // fYaxis
    r.skip_versioned()?; // fZaxis

    let _bar_offset = r.read_i16()?;
    let _bar_width = r.read_i16()?;
    let entries = r.read_f64()?;
    r.skip(4 * 8)?; // fTsumw, fTsumw2, fTsumwx, fTsumwx2
    if version >= 2 {
        r.skip(2 * 8)?; // fMaximum, fMinimum
    }
    if version >= 3 {
        r.skip(8)?; // fNormFactor
    }
    let _contour = r.read_array_f64()?;
    let sumw2 = r.read_array_f64()?;

    // fOption, fFunctions, fBuffer and the stat options are not needed.
    r.set_pos(end)?;

    Ok(Th1Base { name, title, n_cells, axis, entries, sumw2 })
}

fn read_taxis(r: &mut RBuffer) -> Result<AxisInfo> {
    let (_version, end) = r.read_version()?;
    let end = end.ok_or_else(|| RootError::Deserialization("TAxis without byte count".into()))?;

    r.read_tnamed()?;
    r.skip_versioned()?; // TAttAxis

    let n_bins = r.read_i32()?;
    let x_min = r.read_f64()?;
    let x_max = r.read_f64()?;
    let edges = r.read_array_f64()?;
    r.set_pos(end)?;

    let n_bins = usize::try_from(n_bins)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| RootError::Deserialization(format!("invalid axis bin count {n_bins}")))?;
    Ok(AxisInfo { n_bins, x_min, x_max, edges })
}

fn build_histogram(base: Th1Base, cells: Vec<f64>) -> Result<Histogram> {
    let n_bins = base.axis.n_bins;
    if base.n_cells != n_bins + 2 {
        return Err(RootError::Deserialization(format!(
            "'{}': fNcells {} inconsistent with {} x-axis bins",
            base.name, base.n_cells, n_bins
        )));
    }

    let bin_edges = if base.axis.edges.is_empty() {
        uniform_edges(n_bins, base.axis.x_min, base.axis.x_max)
    } else if base.axis.edges.len() == n_bins + 1 {
        base.axis.edges
    } else {
        return Err(RootError::Deserialization(format!(
            "'{}': {} variable edges for {} bins",
            base.name,
            base.axis.edges.len(),
            n_bins
        )));
    };

    // Without stored sumw2 the histogram was filled with unit weights.
    let sumw2 = if base.sumw2.len() == base.n_cells { base.sumw2 } else { cells.clone() };

    Ok(Histogram {
        name: base.name,
        title: base.title,
        bin_edges,
        bin_content: cells[1..=n_bins].to_vec(),
        sumw2: sumw2[1..=n_bins].to_vec(),
        underflow: cells[0],
        overflow: cells[n_bins + 1],
        underflow_sumw2: sumw2[0],
        overflow_sumw2: sumw2[n_bins + 1],
        entries: base.entries,
    })
}

/// Encode a histogram as a TH1D payload.
pub fn write_th1d(h: &Histogram) -> Result<Vec<u8>> {
    let mut w = WBuffer::new();
    let th1d = w.begin_versioned(TH1D_VERSION);
    write_th1_base(&mut w, h)?;
    w.write_array_f64(&h.content_cells());
    w.end_versioned(th1d)?;
    Ok(w.into_inner())
}

fn write_th1_base(w: &mut WBuffer, h: &Histogram) -> Result<()> {
    let th1 = w.begin_versioned(TH1_VERSION);
    w.write_tnamed(&h.name, &h.title)?;

    // TAttLine: color, style, width
    let att = w.begin_versioned(2);
    w.write_i16(602);
    w.write_i16(1);
    w.write_i16(1);
    w.end_versioned(att)?;
    // TAttFill: color, style
    let att = w.begin_versioned(2);
    w.write_i16(0);
    w.write_i16(1001);
    w.end_versioned(att)?;
    // TAttMarker: color, style, size
    let att = w.begin_versioned(2);
    w.write_i16(1);
    w.write_i16(1);
    w.write_f32(1.0);
    w.end_versioned(att)?;

    w.write_i32((h.n_bins() + 2) as i32);

    let variable_edges: &[f64] = if h.is_uniform() { &[] } else { &h.bin_edges };
    write_taxis(w, "xaxis", h.n_bins(), h.x_min(), h.x_max(), variable_edges)?;
    write_taxis(w, "yaxis", 1, 0.0, 1.0, &[])?;
    write_taxis(w, "zaxis", 1, 0.0, 1.0, &[])?;

    w.write_i16(0); // fBarOffset
    w.write_i16(1000); // fBarWidth
    let stats = InRangeStats::of(h);
    w.write_f64(h.entries);
    w.write_f64(stats.sumw);
    w.write_f64(stats.sumw2);
    w.write_f64(stats.sumwx);
    w.write_f64(stats.sumwx2);
    w.write_f64(UNSET); // fMaximum
    w.write_f64(UNSET); // fMinimum
    w.write_f64(0.0); // fNormFactor
    w.write_array_f64(&[]); // fContour
    w.write_array_f64(&h.sumw2_cells());
    w.write_string(""); // fOption
    write_empty_tlist(w)?;
    w.write_i32(0); // fBufferSize
    w.write_u8(0); // fBuffer (empty, leading marker only)
    w.write_i32(0); // fBinStatErrOpt
    w.write_i32(STAT_OVERFLOWS_NEUTRAL);
    w.end_versioned(th1)
}

fn write_taxis(
    w: &mut WBuffer,
    name: &str,
    n_bins: usize,
    x_min: f64,
    x_max: f64,
    edges: &[f64],
) -> Result<()> {
    let axis = w.begin_versioned(TAXIS_VERSION);
    w.write_tnamed(name, "")?;
    write_att_axis(w)?;
    w.write_i32(n_bins as i32);
    w.write_f64(x_min);
    w.write_f64(x_max);
    w.write_array_f64(edges);
    w.write_i32(0); // fFirst
    w.write_i32(0); // fLast
    w.write_u16(0); // fBits2
    w.write_u8(0); // fTimeDisplay
    w.write_string(""); // fTimeFormat
    w.write_u32(0); // fLabels (null)
    w.write_u32(0); // fModLabs (null)
    w.end_versioned(axis)
}

fn write_att_axis(w: &mut WBuffer) -> Result<()> {
    let att: ByteCountMark = w.begin_versioned(4);
    w.write_i32(510); // fNdivisions
    w.write_i16(1); // fAxisColor
    w.write_i16(1); // fLabelColor
    w.write_i16(42); // fLabelFont
    w.write_f32(0.005); // fLabelOffset
    w.write_f32(0.035); // fLabelSize
    w.write_f32(0.03); // fTickLength
    w.write_f32(1.0); // fTitleOffset
    w.write_f32(0.035); // fTitleSize
    w.write_i16(1); // fTitleColor
    w.write_i16(42); // fTitleFont
    w.end_versioned(att)
}

fn write_empty_tlist(w: &mut WBuffer) -> Result<()> {
    let list = w.begin_versioned(TLIST_VERSION);
    w.write_u16(1);
    w.write_u32(0);
    w.write_u32(K_NOT_DELETED);
    w.write_string(""); // fName
    w.write_i32(0); // nobjects
    w.end_versioned(list)
}

/// In-range moments written to fTsumw..fTsumwx2, from bin centres.
struct InRangeStats {
    sumw: f64,
    sumw2: f64,
    sumwx: f64,
    sumwx2: f64,
}

impl InRangeStats {
    fn of(h: &Histogram) -> Self {
        let mut s = InRangeStats { sumw: 0.0, sumw2: 0.0, sumwx: 0.0, sumwx2: 0.0 };
        for (i, (&c, &e2)) in h.bin_content.iter().zip(&h.sumw2).enumerate() {
            let x = 0.5 * (h.bin_edges[i] + h.bin_edges[i + 1]);
            s.sumw += c;
            s.sumw2 += e2;
            s.sumwx += c * x;
            s.sumwx2 += c * x * x;
        }
        s
    }
}
