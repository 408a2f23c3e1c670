//! Example Phase-2 analysis: two-electron events and their jet multiplicity.

use rtb_core::{Counters, Result, SampleConfig};
use rtb_root::{RootFile, RootWriter};

use crate::events::EventFrame;
use crate::module::{AnalysisModule, GenWeightCounters, PostContext, PostProcessReport};
use crate::plots::{CutFlowReport, EquidistantBinning, Plot, PlotOutput, Skim};
use crate::postprocess::{YieldsSummary, export_skims, write_datacards};
use crate::selection::Selection;
use crate::tree::EventTree;

/// Command-line switches of the example module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnowmassOptions {
    /// Declare the `allevts` skim and export it as Parquet.
    pub mva_skim: bool,
    /// Export datacard histograms.
    pub datacards: bool,
}

/// Electrons with pT > 20 and |eta| < 2.5; at least two of them; the number
/// of PUPPI jets in those events.
#[derive(Debug, Default)]
pub struct SnowmassExample {
    options: SnowmassOptions,
    counters: GenWeightCounters,
}

impl SnowmassExample {
    /// Jet-multiplicity plot.
    pub const PLOT_NJETS: &'static str = "2El_nJets";
    /// Skim declared with `--mvaSkim`.
    pub const SKIM: &'static str = "allevts";
    /// Cut-flow report.
    pub const YIELDS: &'static str = "yields";

    /// Module with the given switches.
    pub fn new(options: SnowmassOptions) -> Self {
        Self { options, counters: GenWeightCounters::default() }
    }

    /// Active switches.
    pub fn options(&self) -> SnowmassOptions {
        self.options
    }
}

impl AnalysisModule for SnowmassExample {
    fn name(&self) -> &str {
        "SnowmassExample"
    }

    fn prepare_tree(
        &mut self,
        events: EventFrame,
        sample: &str,
        _sample_cfg: &SampleConfig,
    ) -> Result<(EventTree, Selection)> {
        self.counters.prepare_tree(events, sample)
    }

    fn define_plots(
        &mut self,
        t: &EventTree,
        no_sel: &Selection,
        _sample: &str,
        _sample_cfg: &SampleConfig,
    ) -> Result<Vec<PlotOutput>> {
        let genweight = t.scalar(GenWeightCounters::GENWEIGHT_BRANCH)?;
        let no_sel = no_sel.refine("withgenweight", None, Some(genweight))?;

        let mut plots: Vec<PlotOutput> = Vec::new();

        let electrons = t
            .collection("elec")?
            .select(|el| Ok(el.get("pt")? > 20.0 && el.get("eta")?.abs() < 2.5))?;
        let n_electrons = electrons.len();

        let two_el: Vec<bool> = n_electrons.iter().map(|&n| n >= 2.0).collect();
        let has_two_el = no_sel.refine("hasElEl", Some(&two_el), None)?;

        plots.push(
            Plot::make_1d(
                Self::PLOT_NJETS,
                t.collection("jetpuppi")?.len(),
                &has_two_el,
                EquidistantBinning::new(10, 0.0, 10.0),
                "nJets",
            )
            .into(),
        );

        if self.options.mva_skim {
            plots.push(
                Skim::new(Self::SKIM, &no_sel)
                    .column("weight", no_sel.weights().to_vec())
                    .column("nElectrons", n_electrons)
                    .column("El_pt", electrons.map("pt")?)
                    .into(),
            );
        }

        let mut yields = CutFlowReport::new(Self::YIELDS);
        yields.add(&no_sel, "Produced").add(&has_two_el, "2 electrons");
        plots.push(yields.into());

        Ok(plots)
    }

    fn merge_counters(&mut self, out: &mut RootWriter, sample: &str) -> Result<()> {
        self.counters.merge_counters(out, sample)
    }

    fn read_counters(&self, results: &RootFile) -> Result<Counters> {
        GenWeightCounters::read_counters(results)
    }

    fn datacard_plots(&self) -> Vec<String> {
        vec![Self::PLOT_NJETS.to_string()]
    }

    fn post_process(&mut self, ctx: &PostContext<'_>) -> Result<PostProcessReport> {
        let mut report = PostProcessReport::default();

        if !ctx.samples.is_empty() {
            let summary = YieldsSummary::collect(ctx.samples, Self::YIELDS)?;
            report.yields.push(summary.write(ctx.output_dir)?);
        }

        if self.options.mva_skim {
            report.skims =
                export_skims(ctx.samples, &[Self::SKIM], ctx.results_dir, ctx.output_dir)?;
        }

        if self.options.datacards {
            report.datacards = write_datacards(
                ctx.samples,
                &self.datacard_plots(),
                ctx.eras,
                ctx.output_dir,
                ctx.compression,
            )?;
        }

        Ok(report)
    }
}
