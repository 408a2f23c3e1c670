//! # rtb-analysis
//!
//! Phase-2 RTB flat-tree analysis for rtb: event tables, tree decoration,
//! selections, plot / cut-flow / skim declarations, the analysis-module hook
//! contract with its sequential driver, and post-processing (sample
//! normalisation, skim concatenation, datacard histograms).
//!
//! ## Example
//!
//! ```no_run
//! use rtb_analysis::{RunOptions, Runner, SnowmassExample, SnowmassOptions};
//! use rtb_core::AnalysisConfig;
//!
//! let config = AnalysisConfig::from_path("analysis.yml").unwrap();
//! let mut module = SnowmassExample::new(SnowmassOptions { mva_skim: true, datacards: true });
//! let summary = Runner::new(&config, RunOptions::new("out")).run(&mut module).unwrap();
//! println!("{} samples, skims: {:?}", summary.samples.len(), summary.post.skims);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod module;
#[cfg(feature = "parquet")]
pub mod parquet_io;
pub mod plots;
pub mod postprocess;
pub mod runner;
pub mod samples;
pub mod selection;
pub mod snowmass;
pub mod tree;

pub use events::{Column, EventFrame, Jagged};
pub use module::{AnalysisModule, GenWeightCounters, PostContext, PostProcessReport};
pub use plots::{
    Binning, CutFlowReport, CutFlowYields, EquidistantBinning, Plot, PlotOutput, Skim,
    VariableBinning,
};
pub use postprocess::{ConcatenatedSkim, YieldsSummary, export_skims, write_datacards};
pub use runner::{RunOptions, RunSummary, Runner};
pub use samples::{SampleInfo, SampleSet};
pub use selection::Selection;
pub use snowmass::{SnowmassExample, SnowmassOptions};
pub use tree::{Collection, EventTree, Object};

/// Whether Parquet support is compiled in.
pub const fn has_parquet() -> bool {
    cfg!(feature = "parquet")
}
