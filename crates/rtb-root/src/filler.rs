//! Single-pass histogram filling from per-event columns.

use crate::error::{Result, RootError};
use crate::histogram::Histogram;

/// Under/overflow handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowPolicy {
    /// Keep out-of-range entries in the under/overflow cells.
    #[default]
    Keep,
    /// Fold underflow into the first bin and overflow into the last bin.
    Fold,
}

/// What to fill: name, title, binning and flow policy.
#[derive(Debug, Clone)]
pub struct HistogramSpec {
    /// Histogram name.
    pub name: String,
    /// Histogram title.
    pub title: String,
    /// Bin edges (sorted, length = n_bins + 1).
    pub bin_edges: Vec<f64>,
    /// Under/overflow policy.
    pub flow_policy: FlowPolicy,
}

/// Fill one histogram from per-event `values` and `weights`, keeping events
/// whose `mask` entry is set.
///
/// All three slices must have the same length. NaN values are skipped.
pub fn fill_histogram(
    spec: &HistogramSpec,
    values: &[f64],
    weights: &[f64],
    mask: &[bool],
) -> Result<Histogram> {
    if values.len() != weights.len() || values.len() != mask.len() {
        return Err(RootError::HistogramFill(format!(
            "column length mismatch for '{}' (values={}, weights={}, mask={})",
            spec.name,
            values.len(),
            weights.len(),
            mask.len()
        )));
    }

    let mut h = Histogram::new(spec.name.clone(), spec.title.clone(), spec.bin_edges.clone())?;
    for ((&x, &w), _) in values.iter().zip(weights).zip(mask).filter(|(_, m)| **m) {
        h.fill(x, w);
    }

    if spec.flow_policy == FlowPolicy::Fold {
        let last = h.n_bins() - 1;
        h.bin_content[0] += h.underflow;
        h.sumw2[0] += h.underflow_sumw2;
        h.bin_content[last] += h.overflow;
        h.sumw2[last] += h.overflow_sumw2;
        h.underflow = 0.0;
        h.underflow_sumw2 = 0.0;
        h.overflow = 0.0;
        h.overflow_sumw2 = 0.0;
    }

    tracing::trace!(name = %h.name, entries = h.entries, integral = h.integral(), "filled");
    Ok(h)
}
