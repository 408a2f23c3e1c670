//! # rtb-core
//!
//! Core types for the rtb Phase-2 flat-tree analysis toolkit: the error
//! type shared by the library crates, the analysis configuration (eras and
//! samples) and the per-sample normalisation arithmetic.
//!
//! ## Example
//!
//! ```no_run
//! use rtb_core::{AnalysisConfig, sample_scale};
//!
//! let cfg = AnalysisConfig::from_path("analysis.yml").unwrap();
//! let smp = &cfg.samples["DYToLL"];
//! let lumi = cfg.eras[&smp.era].luminosity;
//! let scale = sample_scale(lumi, 6077.22, 1.0, 1.0e6).unwrap();
//! println!("{scale}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod normalization;

pub use config::{AnalysisConfig, EraConfig, GeneratedEvents, SampleConfig};
pub use error::{Error, Result};
pub use normalization::{Counters, SampleNorm, sample_scale};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
