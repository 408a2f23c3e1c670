//! Processed samples with their counters and normalisation.

use std::path::{Path, PathBuf};

use serde::Serialize;

use rtb_core::{AnalysisConfig, Counters, Error, Result, SampleNorm};
use rtb_root::RootFile;

/// One processed sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleInfo {
    /// Sample name.
    pub name: String,
    /// Era the sample belongs to.
    pub era: String,
    /// Group label (the sample name when none is configured).
    pub group: String,
    /// Whether the sample is simulation (has a cross-section).
    pub is_mc: bool,
    /// Per-sample results file.
    pub results_file: PathBuf,
    /// Counters read back from the results file.
    pub counters: Counters,
    /// Resolved normalisation.
    pub norm: SampleNorm,
}

impl SampleInfo {
    /// Factor applied to this sample's weights and histograms.
    pub fn scale(&self) -> f64 {
        self.norm.scale
    }
}

/// The samples of a run, in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    samples: Vec<SampleInfo>,
}

impl SampleSet {
    /// Load the counters of every sample of `eras` from
    /// `results_dir/<sample>.root` and resolve their normalisation.
    pub fn load<F>(
        config: &AnalysisConfig,
        eras: &[String],
        results_dir: &Path,
        read_counters: F,
    ) -> Result<Self>
    where
        F: Fn(&RootFile) -> Result<Counters>,
    {
        let mut samples = Vec::new();
        for (name, smp) in config.samples_for_eras(eras) {
            let results_file = results_file(results_dir, name);
            if !results_file.exists() {
                return Err(Error::Validation(format!(
                    "sample '{name}': results file {} not found",
                    results_file.display()
                )));
            }
            let f = RootFile::open(&results_file)
                .map_err(|e| Error::RootFile(format!("{}: {e}", results_file.display())))?;
            let counters = read_counters(&f)?;

            let era = config.eras.get(&smp.era).ok_or_else(|| {
                Error::Validation(format!("sample '{name}': unknown era '{}'", smp.era))
            })?;
            let norm = SampleNorm::resolve(name, smp, era, &counters)?;
            tracing::info!(sample = name, era = %smp.era, scale = norm.scale, "sample normalised");

            samples.push(SampleInfo {
                name: name.to_string(),
                era: smp.era.clone(),
                group: smp.group_or(name).to_string(),
                is_mc: smp.is_mc(),
                results_file,
                counters,
                norm,
            });
        }
        Ok(Self { samples })
    }

    /// Build from already-resolved samples.
    pub fn from_samples(mut samples: Vec<SampleInfo>) -> Self {
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        Self { samples }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples.
    pub fn iter(&self) -> impl Iterator<Item = &SampleInfo> {
        self.samples.iter()
    }

    /// Sample by name.
    pub fn get(&self, name: &str) -> Option<&SampleInfo> {
        self.samples.iter().find(|s| s.name == name)
    }

    /// Samples of one era.
    pub fn for_era<'a>(&'a self, era: &'a str) -> impl Iterator<Item = &'a SampleInfo> + 'a {
        self.samples.iter().filter(move |s| s.era == era)
    }
}

/// `results_dir/<sample>.root`.
pub fn results_file(results_dir: &Path, sample: &str) -> PathBuf {
    results_dir.join(format!("{sample}.root"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rtb_root::{Compression, Histogram, RootWriter};

    const YAML: &str = r#"
eras:
  "2030": { luminosity: 3000.0 }
samples:
  ttbar:
    files: [tt.parquet]
    era: "2030"
    group: top
    cross-section: 800.0
    branching-ratio: 0.5
    generated-events: sumgenweight
  data:
    files: [data.parquet]
    era: "2030"
"#;

    fn write_counter(dir: &Path, sample: &str, sum: f64) {
        let mut h = Histogram::uniform("h_count_genweight", "genweight sum", 1, 0.0, 1.0).unwrap();
        h.fill(0.0, sum);
        let mut w = RootWriter::create(results_file(dir, sample), Compression::None).unwrap();
        w.put_histogram(&h).unwrap();
        w.finish().unwrap();
    }

    fn read(f: &RootFile) -> Result<Counters> {
        let h = f.get_histogram("h_count_genweight").unwrap();
        Ok(Counters::from([("sumgenweight".to_string(), h.bin_content[0])]))
    }

    #[test]
    fn load_resolves_scales() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AnalysisConfig::from_yaml_str(YAML, dir.path()).unwrap();
        write_counter(dir.path(), "ttbar", 1.0e4);
        write_counter(dir.path(), "data", 7.0);

        let set = SampleSet::load(&cfg, &["2030".to_string()], dir.path(), read).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["data", "ttbar"]);

        let tt = set.get("ttbar").unwrap();
        assert_eq!(tt.group, "top");
        assert!(tt.is_mc);
        assert_relative_eq!(tt.scale(), 3000.0 * 800.0 * 0.5 / 1.0e4);

        let data = set.get("data").unwrap();
        assert_eq!(data.group, "data");
        assert!(!data.is_mc);
        assert_relative_eq!(data.scale(), 1.0);
        assert_eq!(set.for_era("2030").count(), 2);
    }

    #[test]
    fn missing_results_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AnalysisConfig::from_yaml_str(YAML, dir.path()).unwrap();
        write_counter(dir.path(), "data", 7.0);
        let err = SampleSet::load(&cfg, &["2030".to_string()], dir.path(), read).unwrap_err();
        assert!(err.to_string().contains("ttbar"));
    }
}
