//! Analysis configuration: eras (luminosities) and samples.
//!
//! The configuration is read from YAML (default) or JSON, chosen by the
//! file extension:
//!
//! ```yaml
//! tree: events
//! eras:
//!   "2030": { luminosity: 3000000.0 }
//! samples:
//!   DYToLL:
//!     files: [dy_0.parquet, dy_1.parquet]
//!     era: "2030"
//!     group: DY
//!     cross-section: 6077.22
//!     branching-ratio: 1.0
//!     generated-events: sumgenweight
//! ```
//!
//! `generated-events` is either a number or the name of a counter read back
//! from the per-sample results file (see `rtb_core::Counters`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Luminosity block of one era.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraConfig {
    /// Integrated luminosity (pb⁻¹).
    pub luminosity: f64,
}

/// Number of generated events: a literal count or a counter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneratedEvents {
    /// Literal (possibly weighted) number of generated events.
    Count(f64),
    /// Name of a counter returned by the module's `read_counters` hook.
    Counter(String),
}

/// One simulated (or data) sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SampleConfig {
    /// Event table files, relative to the configuration file.
    pub files: Vec<PathBuf>,
    /// Era this sample belongs to.
    pub era: String,
    /// Group label (process family) used for summaries.
    #[serde(default)]
    pub group: Option<String>,
    /// Cross-section (pb). Samples without one are not normalised.
    #[serde(default)]
    pub cross_section: Option<f64>,
    /// Branching ratio applied on top of the cross-section.
    #[serde(default = "default_branching_ratio")]
    pub branching_ratio: f64,
    /// Generated-events normalisation.
    #[serde(default)]
    pub generated_events: Option<GeneratedEvents>,
}

fn default_branching_ratio() -> f64 {
    1.0
}

fn default_tree() -> String {
    "events".to_string()
}

impl SampleConfig {
    /// Whether this sample is normalised to luminosity (has a cross-section).
    pub fn is_mc(&self) -> bool {
        self.cross_section.is_some()
    }

    /// Group label, falling back to the sample name.
    pub fn group_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.group.as_deref().unwrap_or(name)
    }
}

/// Full analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Name of the event tree (informational; event tables carry one tree each).
    #[serde(default = "default_tree")]
    pub tree: String,
    /// Eras by name.
    pub eras: BTreeMap<String, EraConfig>,
    /// Samples by name.
    pub samples: BTreeMap<String, SampleConfig>,
    /// Directory relative sample paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl AnalysisConfig {
    /// Read and validate a configuration file (`.json` or YAML).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
        let mut cfg: AnalysisConfig = if ext == "json" {
            serde_json::from_slice(&bytes)?
        } else {
            serde_yaml_ng::from_slice(&bytes)?
        };
        cfg.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        cfg.validate()?;
        tracing::debug!(
            path = %path.display(),
            eras = cfg.eras.len(),
            samples = cfg.samples.len(),
            "configuration loaded"
        );
        Ok(cfg)
    }

    /// Parse a YAML document; relative paths resolve against `base_dir`.
    pub fn from_yaml_str(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut cfg: AnalysisConfig = serde_yaml_ng::from_str(text)?;
        cfg.base_dir = base_dir.into();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Semantic validation (eras referenced, positive luminosities, ...).
    pub fn validate(&self) -> Result<()> {
        if self.samples.is_empty() {
            return Err(Error::Validation("configuration declares no samples".into()));
        }
        for (name, era) in &self.eras {
            if !(era.luminosity.is_finite() && era.luminosity > 0.0) {
                return Err(Error::Validation(format!(
                    "era '{name}': luminosity must be finite and > 0, got {}",
                    era.luminosity
                )));
            }
        }
        for (name, smp) in &self.samples {
            if smp.files.is_empty() {
                return Err(Error::Validation(format!("sample '{name}': no files")));
            }
            if !self.eras.contains_key(&smp.era) {
                return Err(Error::Validation(format!(
                    "sample '{name}': unknown era '{}'",
                    smp.era
                )));
            }
            if let Some(xs) = smp.cross_section
                && !(xs.is_finite() && xs >= 0.0)
            {
                return Err(Error::Validation(format!(
                    "sample '{name}': cross-section must be finite and >= 0, got {xs}"
                )));
            }
            if !(smp.branching_ratio.is_finite() && smp.branching_ratio >= 0.0) {
                return Err(Error::Validation(format!(
                    "sample '{name}': branching-ratio must be finite and >= 0, got {}",
                    smp.branching_ratio
                )));
            }
            match &smp.generated_events {
                Some(GeneratedEvents::Count(n)) if !(n.is_finite() && *n > 0.0) => {
                    return Err(Error::Validation(format!(
                        "sample '{name}': generated-events must be finite and > 0, got {n}"
                    )));
                }
                Some(GeneratedEvents::Counter(c)) if c.trim().is_empty() => {
                    return Err(Error::Validation(format!(
                        "sample '{name}': generated-events counter name is empty"
                    )));
                }
                None if smp.is_mc() => {
                    return Err(Error::Validation(format!(
                        "sample '{name}': cross-section given without generated-events"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Resolve a sample file path against the configuration directory.
    pub fn resolve_path(&self, file: &Path) -> PathBuf {
        if file.is_absolute() { file.to_path_buf() } else { self.base_dir.join(file) }
    }

    /// Eras to process: the requested ones (validated, first occurrence
    /// kept), or all eras.
    pub fn selected_eras(&self, requested: &[String]) -> Result<Vec<String>> {
        if requested.is_empty() {
            return Ok(self.eras.keys().cloned().collect());
        }
        let mut selected: Vec<String> = Vec::with_capacity(requested.len());
        for era in requested {
            if !self.eras.contains_key(era) {
                return Err(Error::Validation(format!("unknown era '{era}'")));
            }
            if !selected.contains(era) {
                selected.push(era.clone());
            }
        }
        Ok(selected)
    }

    /// Samples belonging to one of `eras`, in name order.
    pub fn samples_for_eras<'a>(
        &'a self,
        eras: &'a [String],
    ) -> impl Iterator<Item = (&'a str, &'a SampleConfig)> + 'a {
        self.samples
            .iter()
            .filter(move |(_, smp)| eras.iter().any(|e| *e == smp.era))
            .map(|(name, smp)| (name.as_str(), smp))
    }
}
