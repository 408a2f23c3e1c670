//! Post-processing over all samples of a run: skim concatenation, datacard
//! histograms and cut-flow yield summaries.
//!
//! # Concatenated skim schema
//!
//! | Column       | Arrow type                      | Description                          |
//! |--------------|---------------------------------|--------------------------------------|
//! | skim columns | `Float64` / `List<Float64>`     | as declared; `weight` scaled         |
//! | `process`    | `Dictionary<Int32, Utf8>`       | sample name, first-appearance order  |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, DictionaryArray, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Int32Type, Schema};
use arrow::record_batch::RecordBatch;
use serde::Serialize;

use rtb_core::{Error, Result};
use rtb_root::{Compression, RootFile, RootWriter};

use crate::events::{Column, EventFrame};
use crate::plots::CutFlowYields;
use crate::samples::SampleSet;

/// Name of the categorical column added to concatenated skims.
pub const PROCESS_COLUMN: &str = "process";
/// Skim column rescaled by the sample normalisation.
pub const WEIGHT_COLUMN: &str = "weight";
/// Subdirectory of the output directory holding datacard histograms.
pub const DATACARD_DIR: &str = "datacard_histograms";

/// `results_dir/<sample>_<skim>.arrow`.
pub fn skim_file(results_dir: &Path, sample: &str, skim: &str) -> PathBuf {
    results_dir.join(format!("{sample}_{skim}.arrow"))
}

// ---------------------------------------------------------------------------
// Skims
// ---------------------------------------------------------------------------

/// A skim concatenated over samples, with one process label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatenatedSkim {
    /// Rows of all samples, weights scaled.
    pub frame: EventFrame,
    /// Category labels in first-appearance order.
    pub categories: Vec<String>,
    /// Category index of every row.
    pub codes: Vec<i32>,
}

impl ConcatenatedSkim {
    /// Concatenate labelled per-sample tables. The `weight` column of each
    /// table, if present, is multiplied by the table's scale.
    pub fn build<I>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, f64, EventFrame)>,
    {
        let mut frame: Option<EventFrame> = None;
        let mut categories: Vec<String> = Vec::new();
        let mut codes = Vec::new();

        for (label, scale, mut part) in parts {
            match part.column_mut(WEIGHT_COLUMN) {
                Some(Column::Scalar(w)) => w.iter_mut().for_each(|x| *x *= scale),
                Some(Column::Jagged(_)) => {
                    return Err(Error::Validation(format!(
                        "'{WEIGHT_COLUMN}' column of '{label}' must be scalar"
                    )));
                }
                None => tracing::warn!(process = %label, "skim has no weight column; not rescaled"),
            }

            let code = match categories.iter().position(|c| *c == label) {
                Some(i) => i,
                None => {
                    categories.push(label.clone());
                    categories.len() - 1
                }
            };
            let code = i32::try_from(code)
                .map_err(|_| Error::Computation("too many process categories".into()))?;
            codes.extend(std::iter::repeat_n(code, part.n_events()));

            match frame.as_mut() {
                Some(acc) => acc
                    .append(&part)
                    .map_err(|e| e.context(format!("skim table of '{label}'")))?,
                None => frame = Some(part),
            }
        }

        Ok(Self { frame: frame.unwrap_or_default(), categories, codes })
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.codes.len()
    }

    /// Arrow batch with the `process` dictionary column appended.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let base = self.frame.to_record_batch()?;
        let keys = Int32Array::from(self.codes.clone());
        let values: ArrayRef = Arc::new(StringArray::from(self.categories.clone()));
        let process = DictionaryArray::<Int32Type>::try_new(keys, values)
            .map_err(|e| Error::Columnar(format!("process column: {e}")))?;

        let mut fields: Vec<Field> =
            base.schema().fields().iter().map(|f| f.as_ref().clone()).collect();
        fields.push(Field::new(
            PROCESS_COLUMN,
            DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
            false,
        ));
        let mut columns = base.columns().to_vec();
        columns.push(Arc::new(process));

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .map_err(|e| Error::Columnar(format!("failed to build skim batch: {e}")))
    }
}

/// Concatenate every sample's `<sample>_<skim>.arrow` into
/// `output_dir/<skim>.parquet`.
///
/// Samples without a skim file are skipped with a warning. Without the
/// `parquet` feature the export is skipped and an error is logged.
pub fn export_skims(
    samples: &SampleSet,
    skims: &[&str],
    results_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    if !cfg!(feature = "parquet") {
        tracing::error!(
            "Parquet support is not available in this build; skipping the export of skims {skims:?}"
        );
        return Ok(Vec::new());
    }

    let mut written = Vec::new();
    for &skim in skims {
        let mut parts = Vec::new();
        for smp in samples.iter() {
            let path = skim_file(results_dir, &smp.name, skim);
            if !path.exists() {
                tracing::warn!(
                    sample = %smp.name,
                    skim,
                    path = %path.display(),
                    "skim file missing; sample skipped"
                );
                continue;
            }
            let frame = EventFrame::read_ipc(&path)?;
            tracing::debug!(sample = %smp.name, skim, rows = frame.n_events(), "skim loaded");
            parts.push((smp.name.clone(), smp.scale(), frame));
        }
        if parts.is_empty() {
            tracing::warn!(skim, "no sample produced this skim; nothing written");
            continue;
        }

        let concatenated = ConcatenatedSkim::build(parts)?;
        let out = output_dir.join(format!("{skim}.parquet"));
        write_skim_parquet(&out, &concatenated)?;
        tracing::info!(
            skim,
            rows = concatenated.n_rows(),
            processes = concatenated.categories.len(),
            path = %out.display(),
            "skim exported"
        );
        written.push(out);
    }
    Ok(written)
}

#[cfg(feature = "parquet")]
fn write_skim_parquet(path: &Path, skim: &ConcatenatedSkim) -> Result<()> {
    let batch = skim.to_record_batch()?;
    crate::parquet_io::write_parquet(path, &[batch])
}

#[cfg(not(feature = "parquet"))]
fn write_skim_parquet(path: &Path, _skim: &ConcatenatedSkim) -> Result<()> {
    Err(Error::Columnar(format!("{}: Parquet support is not compiled in", path.display())))
}

// ---------------------------------------------------------------------------
// Datacards
// ---------------------------------------------------------------------------

/// For every plot and era, write `output_dir/datacard_histograms/<plot>_<era>.root`
/// holding one scaled histogram `h_<sample>` per sample of the era.
pub fn write_datacards(
    samples: &SampleSet,
    plots: &[String],
    eras: &[String],
    output_dir: &Path,
    compression: Compression,
) -> Result<Vec<PathBuf>> {
    let dir = output_dir.join(DATACARD_DIR);
    std::fs::create_dir_all(&dir)?;

    let mut written = Vec::new();
    for plot in plots {
        for era in eras {
            let era_samples: Vec<_> = samples.for_era(era).collect();
            if era_samples.is_empty() {
                tracing::debug!(plot = %plot, era = %era, "no samples in era; no datacard");
                continue;
            }

            let path = dir.join(format!("{plot}_{era}.root"));
            let mut out = RootWriter::create(&path, compression).map_err(|e| root_err(&path, e))?;
            for smp in era_samples {
                let f = RootFile::open(&smp.results_file)
                    .map_err(|e| root_err(&smp.results_file, e))?;
                let mut h = f.get_histogram(plot).map_err(|e| root_err(&smp.results_file, e))?;
                h.scale(smp.scale());
                out.put_histogram(&h.renamed(format!("h_{}", smp.name)))
                    .map_err(|e| root_err(&path, e))?;
            }
            out.finish().map_err(|e| root_err(&path, e))?;
            tracing::info!(
                plot = %plot,
                era = %era,
                path = %path.display(),
                "datacard histograms written"
            );
            written.push(path);
        }
    }
    Ok(written)
}

fn root_err(path: &Path, e: rtb_root::RootError) -> Error {
    Error::RootFile(format!("{}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Cut-flow yields
// ---------------------------------------------------------------------------

/// Scaled yields of one cut-flow report over all samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldsSummary {
    /// Report name.
    pub report: String,
    /// Stage titles.
    pub stages: Vec<String>,
    /// Per-sample yields.
    pub samples: BTreeMap<String, StageYields>,
    /// Yields summed per group.
    pub groups: BTreeMap<String, StageYields>,
}

/// Yield and statistical uncertainty per stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageYields {
    /// Era (for samples) or `None` (for groups).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub era: Option<String>,
    /// Scaled sum of weights per stage.
    pub yields: Vec<f64>,
    /// Scaled `sqrt(sumw2)` per stage.
    pub errors: Vec<f64>,
}

impl YieldsSummary {
    /// Collect the report histogram `report` from every sample's results file.
    pub fn collect(samples: &SampleSet, report: &str) -> Result<Self> {
        let mut stages: Option<Vec<String>> = None;
        let mut per_sample = BTreeMap::new();
        let mut sumw2_groups: BTreeMap<String, (Vec<f64>, Vec<f64>)> = BTreeMap::new();

        for smp in samples.iter() {
            let f = RootFile::open(&smp.results_file).map_err(|e| root_err(&smp.results_file, e))?;
            let h = f.get_histogram(report).map_err(|e| root_err(&smp.results_file, e))?;
            let rows = CutFlowYields::stages_from_histogram(&h);
            let titles: Vec<String> = rows.iter().map(|(t, _, _)| t.clone()).collect();
            match &stages {
                Some(s) if *s != titles => {
                    return Err(Error::Validation(format!(
                        "cut-flow '{report}': sample '{}' has stages {titles:?}, expected {s:?}",
                        smp.name
                    )));
                }
                Some(_) => {}
                None => stages = Some(titles),
            }

            let scale = smp.scale();
            let yields: Vec<f64> = rows.iter().map(|(_, w, _)| w * scale).collect();
            let sumw2: Vec<f64> = rows.iter().map(|(_, _, w2)| w2 * scale * scale).collect();

            let group = sumw2_groups
                .entry(smp.group.clone())
                .or_insert_with(|| (vec![0.0; yields.len()], vec![0.0; yields.len()]));
            for (i, (y, e2)) in yields.iter().zip(&sumw2).enumerate() {
                group.0[i] += y;
                group.1[i] += e2;
            }

            per_sample.insert(
                smp.name.clone(),
                StageYields {
                    era: Some(smp.era.clone()),
                    errors: sumw2.iter().map(|x| x.sqrt()).collect(),
                    yields,
                },
            );
        }

        let groups = sumw2_groups
            .into_iter()
            .map(|(g, (yields, sumw2))| {
                let errors = sumw2.iter().map(|x| x.sqrt()).collect();
                (g, StageYields { era: None, yields, errors })
            })
            .collect();

        Ok(Self {
            report: report.to_string(),
            stages: stages.unwrap_or_default(),
            samples: per_sample,
            groups,
        })
    }

    /// Write as pretty JSON to `output_dir/<report>.json`.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(format!("{}.json", self.report));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(report = %self.report, path = %path.display(), "yields written");
        Ok(path)
    }
}
