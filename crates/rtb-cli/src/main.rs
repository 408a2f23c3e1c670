//! rtb CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use rtb_analysis::{RunOptions, Runner, SnowmassExample, SnowmassOptions};
use rtb_core::AnalysisConfig;
use rtb_root::{Compression, RootFile};

#[derive(Parser)]
#[command(name = "rtb")]
#[command(about = "rtb - Phase-2 RTB flat-tree analysis")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the SnowmassExample module over the configured samples
    Run {
        /// Analysis configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory (per-sample results go to `<output>/results`)
        #[arg(short, long)]
        output: PathBuf,

        /// Declare the `allevts` skim and export it as `<output>/allevts.parquet`
        #[arg(long = "mvaSkim", alias = "mva-skim")]
        mva_skim: bool,

        /// Write per-plot, per-era datacard histograms
        #[arg(long)]
        datacards: bool,

        /// Comma-separated eras to process (default: all)
        #[arg(long, value_delimiter = ',')]
        eras: Vec<String>,

        /// Skip sample processing and post-process existing results
        #[arg(long = "onlypost", alias = "only-post")]
        only_post: bool,

        /// zlib level for the ROOT files written (0 = uncompressed)
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(0..=9))]
        compression: u32,
    },

    /// List the keys and histograms of a ROOT file as JSON
    Inspect {
        /// Input ROOT file
        input: PathBuf,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { config, output, mva_skim, datacards, eras, only_post, compression } => {
            cmd_run(
                &config,
                output,
                SnowmassOptions { mva_skim, datacards },
                eras,
                only_post,
                compression,
            )
        }
        Commands::Inspect { input, output } => cmd_inspect(&input, output.as_ref()),
        Commands::Version => {
            println!("rtb {}", rtb_core::VERSION);
            println!("parquet support: {}", rtb_analysis::has_parquet());
            Ok(())
        }
    }
}

fn cmd_run(
    config: &Path,
    output: PathBuf,
    options: SnowmassOptions,
    eras: Vec<String>,
    only_post: bool,
    compression: u32,
) -> Result<()> {
    if output.is_file() {
        anyhow::bail!("output path {} is a file, expected a directory", output.display());
    }
    let cfg = AnalysisConfig::from_path(config)
        .with_context(|| format!("failed to load configuration {}", config.display()))?;

    let run_options = RunOptions {
        output_dir: output,
        eras,
        only_post,
        compression: Compression::from_level(compression),
    };
    let mut module = SnowmassExample::new(options);
    let summary = Runner::new(&cfg, run_options).run(&mut module)?;

    let samples: Vec<serde_json::Value> = summary
        .samples
        .iter()
        .map(|s| {
            serde_json::json!({
                "name": s.name,
                "era": s.era,
                "group": s.group,
                "scale": s.scale(),
                "counters": s.counters,
            })
        })
        .collect();
    let out = serde_json::json!({
        "processed": summary.processed,
        "samples": samples,
        "skims": summary.post.skims,
        "datacards": summary.post.datacards,
        "yields": summary.post.yields,
    });
    write_json(None, out)
}

fn cmd_inspect(input: &Path, output: Option<&PathBuf>) -> Result<()> {
    let f = RootFile::open(input).with_context(|| format!("failed to open {}", input.display()))?;

    let keys: Vec<serde_json::Value> = f
        .list_keys()?
        .into_iter()
        .map(|k| {
            serde_json::json!({
                "name": k.name,
                "class": k.class_name,
                "title": k.title,
                "cycle": k.cycle,
            })
        })
        .collect();

    let histograms: Vec<serde_json::Value> = f
        .histograms()?
        .into_iter()
        .map(|h| {
            serde_json::json!({
                "name": h.name,
                "title": h.title,
                "bin_edges": h.bin_edges,
                "bin_content": h.bin_content,
                "bin_errors": h.bin_errors(),
                "underflow": h.underflow,
                "overflow": h.overflow,
                "entries": h.entries,
                "integral": h.integral(),
            })
        })
        .collect();

    write_json(output, serde_json::json!({ "keys": keys, "histograms": histograms }))
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
