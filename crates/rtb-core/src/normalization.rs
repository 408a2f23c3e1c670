//! Per-sample luminosity normalisation.
//!
//! A simulated sample is scaled to the era's luminosity with
//! `lumi * cross_section * branching_ratio / generated_events`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{EraConfig, GeneratedEvents, SampleConfig};
use crate::error::{Error, Result};

/// Counters read back from a per-sample results file (e.g. `sumgenweight`).
pub type Counters = BTreeMap<String, f64>;

/// Scale factor `lumi * xsec * br / gen_events`.
///
/// `gen_events` must be finite and strictly positive.
pub fn sample_scale(lumi: f64, xsec: f64, br: f64, gen_events: f64) -> Result<f64> {
    if !(gen_events.is_finite() && gen_events > 0.0) {
        return Err(Error::Validation(format!(
            "generated events must be finite and > 0, got {gen_events}"
        )));
    }
    let scale = lumi * xsec * br / gen_events;
    if !scale.is_finite() {
        return Err(Error::Computation(format!(
            "non-finite scale (lumi={lumi}, xsec={xsec}, br={br}, gen_events={gen_events})"
        )));
    }
    Ok(scale)
}

/// Resolved normalisation of one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleNorm {
    /// Era luminosity (pb⁻¹).
    pub luminosity: f64,
    /// Cross-section (pb); `None` for samples that are not normalised.
    pub cross_section: Option<f64>,
    /// Branching ratio.
    pub branching_ratio: f64,
    /// Resolved number of generated events; `None` when not normalised.
    pub generated_events: Option<f64>,
    /// Final scale factor applied to weights and histograms.
    pub scale: f64,
}

impl SampleNorm {
    /// Resolve the normalisation of `sample`, looking up counter-named
    /// generated events in `counters`.
    pub fn resolve(
        name: &str,
        sample: &SampleConfig,
        era: &EraConfig,
        counters: &Counters,
    ) -> Result<Self> {
        let Some(xsec) = sample.cross_section else {
            return Ok(Self {
                luminosity: era.luminosity,
                cross_section: None,
                branching_ratio: sample.branching_ratio,
                generated_events: None,
                scale: 1.0,
            });
        };

        let gen_events = match &sample.generated_events {
            Some(GeneratedEvents::Count(n)) => *n,
            Some(GeneratedEvents::Counter(key)) => *counters.get(key).ok_or_else(|| {
                Error::Validation(format!(
                    "sample '{name}': counter '{key}' not found (available: {:?})",
                    counters.keys().collect::<Vec<_>>()
                ))
            })?,
            None => {
                return Err(Error::Validation(format!(
                    "sample '{name}': cross-section given without generated-events"
                )));
            }
        };

        let scale = sample_scale(era.luminosity, xsec, sample.branching_ratio, gen_events)
            .map_err(|e| e.context(format!("sample '{name}'")))?;

        Ok(Self {
            luminosity: era.luminosity,
            cross_section: Some(xsec),
            branching_ratio: sample.branching_ratio,
            generated_events: Some(gen_events),
            scale,
        })
    }
}
