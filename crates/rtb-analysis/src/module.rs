//! The analysis-module contract and the genweight counter shared by Phase-2
//! flat-tree modules.
//!
//! A [`Runner`](crate::runner::Runner) drives a module through its hooks in a
//! fixed order. For each sample it calls `prepare_tree`, then
//! `define_plots`, evaluates the declared outputs and calls
//! `merge_counters`. Once all samples are done it calls `post_process`,
//! which typically loads the per-sample counters through `read_counters`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rtb_core::{AnalysisConfig, Counters, Error, Result, SampleConfig};
use rtb_root::{
    Compression, FlowPolicy, Histogram, HistogramSpec, RootFile, RootWriter, fill_histogram,
};

use crate::events::EventFrame;
use crate::plots::PlotOutput;
use crate::samples::SampleSet;
use crate::selection::Selection;
use crate::tree::EventTree;

/// Everything `post_process` needs once all samples are processed.
#[derive(Debug)]
pub struct PostContext<'a> {
    /// Analysis configuration.
    pub config: &'a AnalysisConfig,
    /// Eras processed in this run.
    pub eras: &'a [String],
    /// Directory holding the per-sample results files.
    pub results_dir: &'a Path,
    /// Run output directory.
    pub output_dir: &'a Path,
    /// Processed samples with their counters and normalisation.
    pub samples: &'a SampleSet,
    /// Compression for ROOT files written during post-processing.
    pub compression: Compression,
}

/// Files written by `post_process`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostProcessReport {
    /// Concatenated skim tables.
    pub skims: Vec<PathBuf>,
    /// Datacard histogram files.
    pub datacards: Vec<PathBuf>,
    /// Cut-flow yield summaries.
    pub yields: Vec<PathBuf>,
}

/// Hooks an analysis implements.
pub trait AnalysisModule {
    /// Module name for logs.
    fn name(&self) -> &str;

    /// Decorate the sample's events and return the tree with its root
    /// selection.
    fn prepare_tree(
        &mut self,
        events: EventFrame,
        sample: &str,
        sample_cfg: &SampleConfig,
    ) -> Result<(EventTree, Selection)>;

    /// Declare the plots, cut-flow reports and skims for one sample.
    fn define_plots(
        &mut self,
        tree: &EventTree,
        no_sel: &Selection,
        sample: &str,
        sample_cfg: &SampleConfig,
    ) -> Result<Vec<PlotOutput>>;

    /// Write the sample's counters to its results file.
    fn merge_counters(&mut self, out: &mut RootWriter, sample: &str) -> Result<()>;

    /// Read counters back from a results file.
    fn read_counters(&self, results: &RootFile) -> Result<Counters>;

    /// Plot names exported as datacard histograms.
    fn datacard_plots(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run once after all samples.
    fn post_process(&mut self, ctx: &PostContext<'_>) -> Result<PostProcessReport>;
}

/// Per-sample `h_count_genweight` booking and readback.
#[derive(Debug, Default)]
pub struct GenWeightCounters {
    booked: BTreeMap<String, Histogram>,
}

impl GenWeightCounters {
    /// Counter histogram name.
    pub const HISTOGRAM: &'static str = "h_count_genweight";
    /// Counter histogram title.
    pub const TITLE: &'static str = "genweight sum";
    /// Counter name returned by [`read_counters`](Self::read_counters).
    pub const SUM_GENWEIGHT: &'static str = "sumgenweight";
    /// Per-event generator weight branch.
    pub const GENWEIGHT_BRANCH: &'static str = "genweight";

    /// Decorate the tree and book the genweight sum for `sample`.
    pub fn prepare_tree(
        &mut self,
        events: EventFrame,
        sample: &str,
    ) -> Result<(EventTree, Selection)> {
        let tree = EventTree::decorate(events)?;
        let genweight = tree.scalar(Self::GENWEIGHT_BRANCH)?;

        let spec = HistogramSpec {
            name: Self::HISTOGRAM.to_string(),
            title: Self::TITLE.to_string(),
            bin_edges: vec![0.0, 1.0],
            flow_policy: FlowPolicy::Keep,
        };
        let h = fill_histogram(&spec, &tree.zeros(), genweight, &vec![true; tree.n_events()])
            .map_err(|e| Error::Computation(format!("sample '{sample}': {e}")))?;
        tracing::debug!(sample, sum = h.bin_content[0], "genweight sum booked");
        self.booked.insert(sample.to_string(), h);

        let no_sel = tree.root_selection();
        Ok((tree, no_sel))
    }

    /// Write the booked histogram for `sample`.
    pub fn merge_counters(&mut self, out: &mut RootWriter, sample: &str) -> Result<()> {
        let h = self.booked.remove(sample).ok_or_else(|| {
            Error::Validation(format!("no genweight counter booked for sample '{sample}'"))
        })?;
        out.put_histogram(&h)
            .map_err(|e| Error::RootFile(format!("{}: {e}", out.path().display())))
    }

    /// `{"sumgenweight": <content of bin 1>}`.
    pub fn read_counters(results: &RootFile) -> Result<Counters> {
        let h = results
            .get_histogram(Self::HISTOGRAM)
            .map_err(|e| Error::RootFile(format!("{}: {e}", results.path().display())))?;
        let sum = h.bin_content.first().copied().ok_or_else(|| {
            Error::RootFile(format!(
                "{}: '{}' has no bins",
                results.path().display(),
                Self::HISTOGRAM
            ))
        })?;
        Ok(Counters::from([(Self::SUM_GENWEIGHT.to_string(), sum)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn genweight_sum_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ttbar.root");
        let events = EventFrame::default().with_scalar("genweight", vec![1.5, -0.5, 2.0]).unwrap();

        let mut counters = GenWeightCounters::default();
        let (tree, no_sel) = counters.prepare_tree(events, "ttbar").unwrap();
        assert_eq!(tree.n_events(), 3);
        assert_eq!(no_sel.n_passed(), 3);

        let mut w = RootWriter::create(&path, Compression::None).unwrap();
        counters.merge_counters(&mut w, "ttbar").unwrap();
        w.finish().unwrap();

        // the booking is consumed by the first merge
        let mut other = RootWriter::create(dir.path().join("x.root"), Compression::None).unwrap();
        assert!(counters.merge_counters(&mut other, "ttbar").is_err());

        let f = RootFile::open(&path).unwrap();
        let h = f.get_histogram(GenWeightCounters::HISTOGRAM).unwrap();
        assert_eq!(h.title, "genweight sum");
        assert_eq!(h.bin_edges, vec![0.0, 1.0]);

        let read = GenWeightCounters::read_counters(&f).unwrap();
        assert_relative_eq!(read["sumgenweight"], 3.0);
    }

    #[test]
    fn missing_genweight_branch_is_an_error() {
        let events = EventFrame::default().with_scalar("weight", vec![1.0]).unwrap();
        let err = GenWeightCounters::default().prepare_tree(events, "data").unwrap_err();
        assert!(err.to_string().contains("genweight"));
    }
}
