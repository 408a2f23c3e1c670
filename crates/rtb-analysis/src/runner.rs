//! Sequential per-sample driver.
//!
//! ```text
//! for sample in config (name order, selected eras):
//!     prepare_tree → define_plots → evaluate outputs → merge_counters
//!     → results/<sample>.root (+ results/<sample>_<skim>.arrow)
//! post_process (read_counters on every results file)
//! ```

use std::path::{Path, PathBuf};

use rtb_core::{AnalysisConfig, Error, Result, SampleConfig};
use rtb_root::{Compression, RootWriter};

use crate::events::EventFrame;
use crate::module::{AnalysisModule, PostContext, PostProcessReport};
use crate::plots::PlotOutput;
use crate::postprocess::skim_file;
use crate::samples::{SampleSet, results_file};

/// Subdirectory of the output directory holding per-sample results.
pub const RESULTS_DIR: &str = "results";

/// Run-level options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Output directory.
    pub output_dir: PathBuf,
    /// Eras to process (all when empty).
    pub eras: Vec<String>,
    /// Skip sample processing and post-process existing results.
    pub only_post: bool,
    /// Compression of the ROOT files written.
    pub compression: Compression,
}

impl RunOptions {
    /// Defaults for `output_dir`: all eras, processing enabled, zlib level 1.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            eras: Vec::new(),
            only_post: false,
            compression: Compression::default(),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Samples processed in this run (empty with `only_post`).
    pub processed: Vec<String>,
    /// Samples post-processed.
    pub samples: SampleSet,
    /// Files written by post-processing.
    pub post: PostProcessReport,
}

/// Drives an [`AnalysisModule`] over the samples of a configuration.
pub struct Runner<'a> {
    config: &'a AnalysisConfig,
    options: RunOptions,
}

impl<'a> Runner<'a> {
    /// New runner.
    pub fn new(config: &'a AnalysisConfig, options: RunOptions) -> Self {
        Self { config, options }
    }

    /// Directory of the per-sample results files.
    pub fn results_dir(&self) -> PathBuf {
        self.options.output_dir.join(RESULTS_DIR)
    }

    /// Process every selected sample, then post-process.
    pub fn run(&self, module: &mut dyn AnalysisModule) -> Result<RunSummary> {
        let eras = self.config.selected_eras(&self.options.eras)?;
        let results_dir = self.results_dir();
        std::fs::create_dir_all(&results_dir)?;

        let mut processed = Vec::new();
        if self.options.only_post {
            tracing::info!(module = module.name(), "skipping sample processing (--onlypost)");
        } else {
            for (name, smp) in self.config.samples_for_eras(&eras) {
                self.process_sample(module, name, smp, &results_dir)?;
                processed.push(name.to_string());
            }
        }

        let samples =
            SampleSet::load(self.config, &eras, &results_dir, |f| module.read_counters(f))?;
        let ctx = PostContext {
            config: self.config,
            eras: &eras,
            results_dir: &results_dir,
            output_dir: &self.options.output_dir,
            samples: &samples,
            compression: self.options.compression,
        };
        let post = module.post_process(&ctx)?;
        tracing::info!(
            module = module.name(),
            samples = samples.len(),
            skims = post.skims.len(),
            datacards = post.datacards.len(),
            "post-processing done"
        );

        Ok(RunSummary { processed, samples, post })
    }

    fn process_sample(
        &self,
        module: &mut dyn AnalysisModule,
        name: &str,
        smp: &SampleConfig,
        results_dir: &Path,
    ) -> Result<()> {
        let files: Vec<PathBuf> = smp.files.iter().map(|f| self.config.resolve_path(f)).collect();
        let events = EventFrame::read(&files)
            .map_err(|e| e.context(format!("sample '{name}'")))?;
        tracing::info!(
            sample = name,
            events = events.n_events(),
            files = files.len(),
            "processing sample"
        );

        let (tree, no_sel) = module.prepare_tree(events, name, smp)?;
        let outputs = module.define_plots(&tree, &no_sel, name, smp)?;

        let path = results_file(results_dir, name);
        let root_err = |e: rtb_root::RootError| Error::RootFile(format!("{}: {e}", path.display()));
        let mut out = RootWriter::create(&path, self.options.compression).map_err(root_err)?;

        for output in &outputs {
            match output {
                PlotOutput::Plot(plot) => {
                    out.put_histogram(&plot.evaluate()?).map_err(root_err)?;
                }
                PlotOutput::CutFlow(report) => {
                    let yields = report.evaluate()?;
                    for stage in &yields.stages {
                        tracing::debug!(
                            sample = name,
                            report = %yields.name,
                            stage = %stage.title,
                            events = stage.n_events,
                            sum_weights = stage.sum_weights,
                            "cut-flow"
                        );
                    }
                    out.put_histogram(&yields.to_histogram()?).map_err(root_err)?;
                }
                PlotOutput::Skim(skim) => {
                    let frame = skim.evaluate()?;
                    let skim_path = skim_file(results_dir, name, skim.name());
                    frame.write_ipc(&skim_path)?;
                    tracing::debug!(
                        sample = name,
                        skim = skim.name(),
                        rows = frame.n_events(),
                        "skim written"
                    );
                }
            }
        }

        module.merge_counters(&mut out, name)?;
        out.finish().map_err(root_err)?;
        tracing::debug!(
            sample = name,
            path = %path.display(),
            outputs = outputs.len(),
            "results written"
        );
        Ok(())
    }
}
