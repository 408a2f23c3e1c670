//! Output declarations: 1D plots, cut-flow reports and skims.
//!
//! Declarations hold already-computed per-event columns together with the
//! selection they apply to; [`Plot::evaluate`], [`CutFlowReport::evaluate`]
//! and [`Skim::evaluate`] turn them into histograms and tables.

use rtb_core::{Error, Result};
use rtb_root::histogram::uniform_edges;
use rtb_root::{FlowPolicy, Histogram, HistogramSpec, fill_histogram};

use crate::events::{Column, EventFrame, Jagged};
use crate::selection::Selection;

/// Separator between stage titles in a stored cut-flow histogram title.
pub const CUTFLOW_TITLE_SEPARATOR: &str = ";";

// ---------------------------------------------------------------------------
// Binnings
// ---------------------------------------------------------------------------

/// `n_bins` equal-width bins on `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquidistantBinning {
    /// Number of bins.
    pub n_bins: usize,
    /// Lower edge.
    pub lo: f64,
    /// Upper edge.
    pub hi: f64,
}

impl EquidistantBinning {
    /// Shorthand constructor.
    pub fn new(n_bins: usize, lo: f64, hi: f64) -> Self {
        Self { n_bins, lo, hi }
    }
}

/// Bins with explicit edges.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableBinning {
    /// Bin edges, strictly increasing.
    pub edges: Vec<f64>,
}

impl VariableBinning {
    /// Shorthand constructor.
    pub fn new(edges: impl Into<Vec<f64>>) -> Self {
        Self { edges: edges.into() }
    }
}

/// A 1D binning.
#[derive(Debug, Clone, PartialEq)]
pub enum Binning {
    /// Equal-width bins.
    Equidistant(EquidistantBinning),
    /// Explicit edges.
    Variable(VariableBinning),
}

impl Binning {
    /// Bin edges.
    pub fn edges(&self) -> Vec<f64> {
        match self {
            Binning::Equidistant(b) => uniform_edges(b.n_bins, b.lo, b.hi),
            Binning::Variable(b) => b.edges.clone(),
        }
    }
}

impl From<EquidistantBinning> for Binning {
    fn from(b: EquidistantBinning) -> Self {
        Binning::Equidistant(b)
    }
}

impl From<VariableBinning> for Binning {
    fn from(b: VariableBinning) -> Self {
        Binning::Variable(b)
    }
}

// ---------------------------------------------------------------------------
// Plot
// ---------------------------------------------------------------------------

/// A 1D histogram declaration.
#[derive(Debug, Clone)]
pub struct Plot {
    name: String,
    title: String,
    values: Column,
    selection: Selection,
    binning: Binning,
}

impl Plot {
    /// Histogram `values` (one per event, or a jagged column filled once per
    /// element) for the events passing `selection`, with its weights.
    pub fn make_1d(
        name: impl Into<String>,
        values: impl Into<Column>,
        selection: &Selection,
        binning: impl Into<Binning>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            values: values.into(),
            selection: selection.clone(),
            binning: binning.into(),
        }
    }

    /// Plot name (also the histogram key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Selection the plot is filled for.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Fill the histogram.
    pub fn evaluate(&self) -> Result<Histogram> {
        let n = self.selection.n_events();
        if self.values.len() != n {
            return Err(Error::Validation(format!(
                "plot '{}': {} values for {n} events",
                self.name,
                self.values.len()
            )));
        }
        let spec = HistogramSpec {
            name: self.name.clone(),
            title: self.title.clone(),
            bin_edges: self.binning.edges(),
            flow_policy: FlowPolicy::Keep,
        };

        let filled = match &self.values {
            Column::Scalar(v) => {
                fill_histogram(&spec, v, self.selection.weights(), self.selection.mask())
            }
            Column::Jagged(j) => {
                let (values, weights) = expand(j, self.selection.weights(), self.selection.mask());
                fill_histogram(&spec, &values, &weights, &vec![true; values.len()])
            }
        };
        filled.map_err(|e| Error::Computation(format!("plot '{}': {e}", self.name)))
    }
}

fn expand(j: &Jagged, weights: &[f64], mask: &[bool]) -> (Vec<f64>, Vec<f64>) {
    let mut values = Vec::new();
    let mut out_weights = Vec::new();
    for (event, (&w, _)) in weights.iter().zip(mask).enumerate().filter(|(_, (_, m))| **m) {
        let row = j.row(event);
        values.extend_from_slice(row);
        out_weights.extend(std::iter::repeat_n(w, row.len()));
    }
    (values, out_weights)
}

// ---------------------------------------------------------------------------
// Cut-flow report
// ---------------------------------------------------------------------------

/// A list of selections whose weighted yields are reported together.
#[derive(Debug, Clone)]
pub struct CutFlowReport {
    name: String,
    stages: Vec<(Selection, String)>,
}

/// One evaluated cut-flow stage.
#[derive(Debug, Clone, PartialEq)]
pub struct CutFlowStage {
    /// Stage title.
    pub title: String,
    /// Selection name.
    pub selection: String,
    /// Number of passing events.
    pub n_events: usize,
    /// Sum of weights of passing events.
    pub sum_weights: f64,
    /// Sum of squared weights of passing events.
    pub sum_weights2: f64,
}

/// An evaluated cut-flow report.
#[derive(Debug, Clone, PartialEq)]
pub struct CutFlowYields {
    /// Report name.
    pub name: String,
    /// Stages in declaration order.
    pub stages: Vec<CutFlowStage>,
}

impl CutFlowReport {
    /// New empty report.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), stages: Vec::new() }
    }

    /// Report name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a stage.
    pub fn add(&mut self, selection: &Selection, title: impl Into<String>) -> &mut Self {
        self.stages.push((selection.clone(), title.into()));
        self
    }

    /// Compute the yields of every stage.
    pub fn evaluate(&self) -> Result<CutFlowYields> {
        if self.stages.is_empty() {
            return Err(Error::Validation(format!("cut-flow report '{}' has no stages", self.name)));
        }
        let stages = self
            .stages
            .iter()
            .map(|(sel, title)| {
                if title.contains(CUTFLOW_TITLE_SEPARATOR) {
                    return Err(Error::Validation(format!(
                        "cut-flow '{}': stage title '{title}' contains '{CUTFLOW_TITLE_SEPARATOR}'",
                        self.name
                    )));
                }
                let (sum_weights, sum_weights2) = sel.sum_weights();
                Ok(CutFlowStage {
                    title: title.clone(),
                    selection: sel.name().to_string(),
                    n_events: sel.n_passed(),
                    sum_weights,
                    sum_weights2,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CutFlowYields { name: self.name.clone(), stages })
    }
}

impl CutFlowYields {
    /// Store as a histogram: one bin per stage, stage titles joined into the
    /// histogram title.
    pub fn to_histogram(&self) -> Result<Histogram> {
        let title = self
            .stages
            .iter()
            .map(|s| s.title.as_str())
            .collect::<Vec<_>>()
            .join(CUTFLOW_TITLE_SEPARATOR);
        let n = self.stages.len();
        let mut h = Histogram::uniform(self.name.clone(), title, n, 0.0, n as f64)
            .map_err(|e| Error::Computation(format!("cut-flow '{}': {e}", self.name)))?;
        for (i, stage) in self.stages.iter().enumerate() {
            h.bin_content[i] = stage.sum_weights;
            h.sumw2[i] = stage.sum_weights2;
        }
        h.entries = self.stages.iter().map(|s| s.n_events as f64).sum();
        Ok(h)
    }

    /// Stage titles and `(yield, sumw2)` pairs from a stored histogram.
    pub fn stages_from_histogram(h: &Histogram) -> Vec<(String, f64, f64)> {
        let titles: Vec<&str> = h.title.split(CUTFLOW_TITLE_SEPARATOR).collect();
        (0..h.n_bins())
            .map(|i| {
                let title =
                    titles.get(i).map_or_else(|| format!("bin {}", i + 1), |t| t.to_string());
                (title, h.bin_content[i], h.sumw2[i])
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Skim
// ---------------------------------------------------------------------------

/// A per-event table of selected columns, written for the passing events.
#[derive(Debug, Clone)]
pub struct Skim {
    name: String,
    selection: Selection,
    columns: Vec<(String, Column)>,
}

impl Skim {
    /// New skim without columns.
    pub fn new(name: impl Into<String>, selection: &Selection) -> Self {
        Self { name: name.into(), selection: selection.clone(), columns: Vec::new() }
    }

    /// Add a column.
    pub fn column(mut self, name: impl Into<String>, values: impl Into<Column>) -> Self {
        self.columns.push((name.into(), values.into()));
        self
    }

    /// Skim name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table of the passing events.
    pub fn evaluate(&self) -> Result<EventFrame> {
        let mut frame = EventFrame::with_rows(self.selection.n_events());
        for (name, column) in &self.columns {
            frame
                .push_column(name.clone(), column.clone())
                .map_err(|e| e.context(format!("skim '{}'", self.name)))?;
        }
        frame.filter(self.selection.mask())
    }
}

// ---------------------------------------------------------------------------
// Declared outputs
// ---------------------------------------------------------------------------

/// Anything `define_plots` can declare.
#[derive(Debug, Clone)]
pub enum PlotOutput {
    /// A 1D histogram.
    Plot(Plot),
    /// A cut-flow report.
    CutFlow(CutFlowReport),
    /// A skim.
    Skim(Skim),
}

impl PlotOutput {
    /// Name of the declared output.
    pub fn name(&self) -> &str {
        match self {
            PlotOutput::Plot(p) => p.name(),
            PlotOutput::CutFlow(c) => c.name(),
            PlotOutput::Skim(s) => s.name(),
        }
    }
}

impl From<Plot> for PlotOutput {
    fn from(p: Plot) -> Self {
        PlotOutput::Plot(p)
    }
}

impl From<CutFlowReport> for PlotOutput {
    fn from(c: CutFlowReport) -> Self {
        PlotOutput::CutFlow(c)
    }
}

impl From<Skim> for PlotOutput {
    fn from(s: Skim) -> Self {
        PlotOutput::Skim(s)
    }
}
