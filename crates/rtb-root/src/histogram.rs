//! 1D histogram with explicit under/overflow.

use crate::error::{Result, RootError};

/// A 1D histogram as stored in (and read from) ROOT files.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Histogram name (key name in the file).
    pub name: String,
    /// Histogram title.
    pub title: String,
    /// Bin edges (length = n_bins + 1, strictly increasing).
    pub bin_edges: Vec<f64>,
    /// Sum of weights per bin.
    pub bin_content: Vec<f64>,
    /// Sum of squared weights per bin.
    pub sumw2: Vec<f64>,
    /// Sum of weights below the first edge.
    pub underflow: f64,
    /// Sum of weights at or above the last edge.
    pub overflow: f64,
    /// Sum of squared weights below the first edge.
    pub underflow_sumw2: f64,
    /// Sum of squared weights at or above the last edge.
    pub overflow_sumw2: f64,
    /// Number of fill calls (including under/overflow).
    pub entries: f64,
}

impl Histogram {
    /// Empty histogram with the given edges.
    pub fn new(name: impl Into<String>, title: impl Into<String>, edges: Vec<f64>) -> Result<Self> {
        let name = name.into();
        validate_edges(&name, &edges)?;
        let n_bins = edges.len() - 1;
        Ok(Self {
            name,
            title: title.into(),
            bin_edges: edges,
            bin_content: vec![0.0; n_bins],
            sumw2: vec![0.0; n_bins],
            underflow: 0.0,
            overflow: 0.0,
            underflow_sumw2: 0.0,
            overflow_sumw2: 0.0,
            entries: 0.0,
        })
    }

    /// Empty histogram with `n_bins` equal-width bins on `[lo, hi)`.
    pub fn uniform(
        name: impl Into<String>,
        title: impl Into<String>,
        n_bins: usize,
        lo: f64,
        hi: f64,
    ) -> Result<Self> {
        Self::new(name, title, uniform_edges(n_bins, lo, hi))
    }

    /// Number of in-range bins.
    pub fn n_bins(&self) -> usize {
        self.bin_content.len()
    }

    /// Lower edge of the first bin.
    pub fn x_min(&self) -> f64 {
        self.bin_edges[0]
    }

    /// Upper edge of the last bin.
    pub fn x_max(&self) -> f64 {
        self.bin_edges[self.bin_edges.len() - 1]
    }

    /// Whether the edges are equidistant (within floating-point tolerance).
    pub fn is_uniform(&self) -> bool {
        let n = self.n_bins();
        let width = (self.x_max() - self.x_min()) / n as f64;
        self.bin_edges.iter().enumerate().all(|(i, &e)| {
            let expected = self.x_min() + i as f64 * width;
            (e - expected).abs() <= 1e-9 * width.abs().max(1.0)
        })
    }

    /// In-range bin index of `x`, `None` for under/overflow and NaN.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        find_bin(&self.bin_edges, x)
    }

    /// Add `weight` at `x`.
    pub fn fill(&mut self, x: f64, weight: f64) {
        if x.is_nan() {
            return;
        }
        let w2 = weight * weight;
        self.entries += 1.0;
        if x < self.x_min() {
            self.underflow += weight;
            self.underflow_sumw2 += w2;
        } else if x >= self.x_max() {
            self.overflow += weight;
            self.overflow_sumw2 += w2;
        } else if let Some(b) = self.find_bin(x) {
            self.bin_content[b] += weight;
            self.sumw2[b] += w2;
        }
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }

    /// Per-bin statistical errors, `sqrt(sumw2)`.
    pub fn bin_errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|s| s.sqrt()).collect()
    }

    /// Multiply contents by `factor` (sumw2 by `factor²`), flows included.
    pub fn scale(&mut self, factor: f64) {
        let f2 = factor * factor;
        self.bin_content.iter_mut().for_each(|v| *v *= factor);
        self.sumw2.iter_mut().for_each(|v| *v *= f2);
        self.underflow *= factor;
        self.overflow *= factor;
        self.underflow_sumw2 *= f2;
        self.overflow_sumw2 *= f2;
    }

    /// Bin-by-bin sum with a histogram of identical binning.
    pub fn add(&mut self, other: &Histogram) -> Result<()> {
        if self.bin_edges != other.bin_edges {
            return Err(RootError::HistogramFill(format!(
                "cannot add '{}' to '{}': binning differs",
                other.name, self.name
            )));
        }
        for (a, b) in self.bin_content.iter_mut().zip(&other.bin_content) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.underflow_sumw2 += other.underflow_sumw2;
        self.overflow_sumw2 += other.overflow_sumw2;
        self.entries += other.entries;
        Ok(())
    }

    /// Same histogram under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Contents laid out as ROOT cells: `[underflow, bins.., overflow]`.
    pub fn content_cells(&self) -> Vec<f64> {
        with_flows(self.underflow, &self.bin_content, self.overflow)
    }

    /// Squared weights laid out as ROOT cells.
    pub fn sumw2_cells(&self) -> Vec<f64> {
        with_flows(self.underflow_sumw2, &self.sumw2, self.overflow_sumw2)
    }
}

fn with_flows(under: f64, bins: &[f64], over: f64) -> Vec<f64> {
    let mut cells = Vec::with_capacity(bins.len() + 2);
    cells.push(under);
    cells.extend_from_slice(bins);
    cells.push(over);
    cells
}

/// `n_bins + 1` equidistant edges on `[lo, hi]`.
pub fn uniform_edges(n_bins: usize, lo: f64, hi: f64) -> Vec<f64> {
    let width = (hi - lo) / n_bins as f64;
    (0..=n_bins).map(|i| if i == n_bins { hi } else { lo + i as f64 * width }).collect()
}

fn validate_edges(name: &str, edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(RootError::HistogramFill(format!(
            "histogram '{name}' needs at least 2 bin edges, got {}",
            edges.len()
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(RootError::HistogramFill(format!(
            "histogram '{name}' bin edges must be finite and strictly increasing"
        )));
    }
    Ok(())
}

/// Bin index for `val` given sorted edges; `None` outside `[first, last)`.
pub(crate) fn find_bin(edges: &[f64], val: f64) -> Option<usize> {
    if val.is_nan() || val < edges[0] || val >= edges[edges.len() - 1] {
        return None;
    }
    // First edge strictly greater than `val`; the bin is the one before it.
    let upper = edges.partition_point(|&e| e <= val);
    Some(upper - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_and_flows() {
        let mut h = Histogram::uniform("h", "", 3, 0.0, 3.0).unwrap();
        for (x, w) in [(0.5, 1.0), (1.5, 2.0), (2.5, 1.0), (-1.0, 1.0), (3.0, 4.0), (f64::NAN, 9.0)]
        {
            h.fill(x, w);
        }
        assert_eq!(h.bin_content, vec![1.0, 2.0, 1.0]);
        assert_eq!(h.sumw2, vec![1.0, 4.0, 1.0]);
        assert_eq!(h.underflow, 1.0);
        assert_eq!(h.overflow, 4.0);
        assert_eq!(h.overflow_sumw2, 16.0);
        assert_eq!(h.entries, 5.0);
        assert_eq!(h.integral(), 4.0);
        assert_eq!(h.content_cells(), vec![1.0, 1.0, 2.0, 1.0, 4.0]);
    }

    #[test]
    fn find_bin_edge_cases() {
        let edges = vec![0.0, 1.0, 2.0, 3.0];
        assert_eq!(find_bin(&edges, -0.5), None);
        assert_eq!(find_bin(&edges, 3.0), None);
        assert_eq!(find_bin(&edges, 0.0), Some(0));
        assert_eq!(find_bin(&edges, 1.0), Some(1));
        assert_eq!(find_bin(&edges, 2.99), Some(2));
    }

    #[test]
    fn scale_and_add() {
        let mut a = Histogram::uniform("a", "", 2, 0.0, 2.0).unwrap();
        a.fill(0.5, 2.0);
        a.fill(5.0, 1.0);
        a.scale(3.0);
        assert_eq!(a.bin_content, vec![6.0, 0.0]);
        assert_eq!(a.sumw2, vec![36.0, 0.0]);
        assert_eq!(a.overflow, 3.0);

        let mut b = Histogram::uniform("b", "", 2, 0.0, 2.0).unwrap();
        b.fill(1.5, 1.0);
        a.add(&b).unwrap();
        assert_eq!(a.bin_content, vec![6.0, 1.0]);

        let c = Histogram::uniform("c", "", 3, 0.0, 2.0).unwrap();
        assert!(a.add(&c).is_err());
    }

    #[test]
    fn invalid_edges_rejected() {
        assert!(Histogram::new("h", "", vec![0.0]).is_err());
        assert!(Histogram::new("h", "", vec![0.0, 0.0, 1.0]).is_err());
        assert!(Histogram::new("h", "", vec![0.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn uniformity_detection() {
        assert!(Histogram::uniform("u", "", 10, 0.0, 10.0).unwrap().is_uniform());
        assert!(!Histogram::new("v", "", vec![0.0, 1.0, 5.0]).unwrap().is_uniform());
    }
}
