use std::path::Path;

use approx::assert_relative_eq;
use rtb_analysis::{
    EventFrame, GenWeightCounters, Jagged, RunOptions, Runner, SnowmassExample, SnowmassOptions,
};
use rtb_core::AnalysisConfig;
use rtb_root::RootFile;

const CONFIG: &str = r#"
eras:
  "2030": { luminosity: 3000.0 }
samples:
  DYToLL:
    files: [dy.arrow]
    era: "2030"
    group: DY
    cross-section: 2.0
    generated-events: sumgenweight
  data:
    files: [data.arrow]
    era: "2030"
"#;

fn dy_events() -> EventFrame {
    EventFrame::default()
        .with_scalar("genweight", vec![1.0, 2.0, 0.5])
        .unwrap()
        .with_jagged(
            "elec_pt",
            Jagged::from_rows(&[vec![30.0, 25.0, 10.0], vec![50.0, 22.0], vec![45.0]]),
        )
        .unwrap()
        .with_jagged(
            "elec_eta",
            Jagged::from_rows(&[vec![0.5, -1.0, 0.0], vec![2.6, 1.0], vec![0.3]]),
        )
        .unwrap()
        .with_jagged(
            "jetpuppi_pt",
            Jagged::from_rows(&[vec![100.0, 40.0, 30.0], vec![60.0], vec![]]),
        )
        .unwrap()
}

fn data_events() -> EventFrame {
    EventFrame::default()
        .with_scalar("genweight", vec![1.0, 1.0])
        .unwrap()
        .with_jagged("elec_pt", Jagged::from_rows(&[vec![30.0, 40.0], vec![10.0]]))
        .unwrap()
        .with_jagged("elec_eta", Jagged::from_rows(&[vec![0.0, 0.0], vec![0.0]]))
        .unwrap()
        .with_jagged("jetpuppi_pt", Jagged::from_rows(&[vec![80.0, 35.0], vec![]]))
        .unwrap()
}

fn setup(dir: &Path) -> AnalysisConfig {
    dy_events().write_ipc(&dir.join("dy.arrow")).unwrap();
    data_events().write_ipc(&dir.join("data.arrow")).unwrap();
    AnalysisConfig::from_yaml_str(CONFIG, dir).unwrap()
}

fn dy_scale() -> f64 {
    3000.0 * 2.0 / 3.5
}

#[test]
fn genweight_counter_in_every_results_file() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup(tmp.path());
    let out = tmp.path().join("out");

    let mut module = SnowmassExample::new(SnowmassOptions::default());
    let summary = Runner::new(&cfg, RunOptions::new(&out)).run(&mut module).unwrap();
    assert_eq!(summary.processed, ["DYToLL", "data"]);

    let dy = RootFile::open(out.join("results/DYToLL.root")).unwrap();
    let h = dy.get_histogram(GenWeightCounters::HISTOGRAM).unwrap();
    assert_eq!(h.n_bins(), 1);
    assert_relative_eq!(h.bin_content[0], 3.5);

    let data = RootFile::open(out.join("results/data.root")).unwrap();
    let h = data.get_histogram(GenWeightCounters::HISTOGRAM).unwrap();
    assert_relative_eq!(h.bin_content[0], 2.0);

    let info = summary.samples.get("DYToLL").unwrap();
    assert_relative_eq!(info.counters["sumgenweight"], 3.5);
    assert_relative_eq!(info.scale(), dy_scale(), max_relative = 1e-12);
    assert_relative_eq!(summary.samples.get("data").unwrap().scale(), 1.0);
}

#[test]
fn no_switches_no_skim_no_datacards() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup(tmp.path());
    let out = tmp.path().join("out");

    let mut module = SnowmassExample::new(SnowmassOptions::default());
    let summary = Runner::new(&cfg, RunOptions::new(&out)).run(&mut module).unwrap();

    assert!(summary.post.skims.is_empty());
    assert!(summary.post.datacards.is_empty());
    assert!(!out.join("allevts.parquet").exists());
    assert!(!out.join("results/DYToLL_allevts.arrow").exists());
    assert!(!out.join("datacard_histograms").exists());
    assert!(out.join("yields.json").exists());

    let f = RootFile::open(out.join("results/DYToLL.root")).unwrap();
    let h = f.get_histogram("2El_nJets").unwrap();
    assert_eq!(h.title, "nJets");
    assert_relative_eq!(h.bin_content[3], 1.0);
}

#[test]
fn datacards_hold_scaled_sample_histograms() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup(tmp.path());
    let out = tmp.path().join("out");

    let mut module = SnowmassExample::new(SnowmassOptions { mva_skim: false, datacards: true });
    let summary = Runner::new(&cfg, RunOptions::new(&out)).run(&mut module).unwrap();

    let path = out.join("datacard_histograms/2El_nJets_2030.root");
    assert_eq!(summary.post.datacards, vec![path.clone()]);

    let f = RootFile::open(&path).unwrap();
    let names: Vec<String> = f.list_keys().unwrap().into_iter().map(|k| k.name).collect();
    assert_eq!(names, ["h_DYToLL", "h_data"]);

    let dy = f.get_histogram("h_DYToLL").unwrap();
    assert_relative_eq!(dy.bin_content[3], dy_scale(), max_relative = 1e-12);
    assert_relative_eq!(dy.integral(), dy_scale(), max_relative = 1e-12);

    let data = f.get_histogram("h_data").unwrap();
    assert_relative_eq!(data.bin_content[2], 1.0);
    assert_relative_eq!(data.integral(), 1.0);

    assert!(!out.join("allevts.parquet").exists());
}

#[test]
fn repeated_era_writes_one_datacard() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup(tmp.path());
    let out = tmp.path().join("out");

    let mut module = SnowmassExample::new(SnowmassOptions { mva_skim: false, datacards: true });
    let mut opts = RunOptions::new(&out);
    opts.eras = vec!["2030".into(), "2030".into()];
    let summary = Runner::new(&cfg, opts).run(&mut module).unwrap();

    assert_eq!(summary.processed, ["DYToLL", "data"]);
    assert_eq!(summary.post.datacards, vec![out.join("datacard_histograms/2El_nJets_2030.root")]);
}

#[test]
fn yields_summary_groups_samples() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup(tmp.path());
    let out = tmp.path().join("out");

    let mut module = SnowmassExample::new(SnowmassOptions::default());
    Runner::new(&cfg, RunOptions::new(&out)).run(&mut module).unwrap();

    let text = std::fs::read_to_string(out.join("yields.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(v["stages"], serde_json::json!(["Produced", "2 electrons"]));
    let dy = v["groups"]["DY"]["yields"].as_array().unwrap();
    assert_relative_eq!(dy[0].as_f64().unwrap(), 3.5 * dy_scale(), max_relative = 1e-12);
    assert_relative_eq!(dy[1].as_f64().unwrap(), dy_scale(), max_relative = 1e-12);
    assert_relative_eq!(v["samples"]["data"]["yields"][1].as_f64().unwrap(), 1.0);
}

#[test]
fn only_post_reuses_results() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup(tmp.path());
    let out = tmp.path().join("out");

    let mut module = SnowmassExample::new(SnowmassOptions::default());
    Runner::new(&cfg, RunOptions::new(&out)).run(&mut module).unwrap();

    std::fs::remove_file(tmp.path().join("dy.arrow")).unwrap();

    let mut module = SnowmassExample::new(SnowmassOptions { mva_skim: false, datacards: true });
    let mut opts = RunOptions::new(&out);
    opts.only_post = true;
    let summary = Runner::new(&cfg, opts).run(&mut module).unwrap();

    assert!(summary.processed.is_empty());
    assert_eq!(summary.samples.len(), 2);
    assert!(out.join("datacard_histograms/2El_nJets_2030.root").exists());
}

#[test]
fn only_post_without_results_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup(tmp.path());

    let mut module = SnowmassExample::new(SnowmassOptions::default());
    let mut opts = RunOptions::new(tmp.path().join("out"));
    opts.only_post = true;
    assert!(Runner::new(&cfg, opts).run(&mut module).is_err());
}

#[cfg(feature = "parquet")]
#[test]
fn mva_skim_concatenates_samples_with_process_labels() {
    use arrow::array::{Array, DictionaryArray, Float64Array, StringArray};
    use arrow::datatypes::Int32Type;

    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup(tmp.path());
    let out = tmp.path().join("out");

    let mut module = SnowmassExample::new(SnowmassOptions { mva_skim: true, datacards: false });
    let summary = Runner::new(&cfg, RunOptions::new(&out)).run(&mut module).unwrap();

    let path = out.join("allevts.parquet");
    assert_eq!(summary.post.skims, vec![path.clone()]);
    assert!(!out.join("datacard_histograms").exists());

    let batches = rtb_analysis::parquet_io::read_parquet_batches(&path).unwrap();
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 5);

    let mut labels = Vec::new();
    let mut weights = Vec::new();
    for b in &batches {
        let process = b
            .column_by_name("process")
            .unwrap()
            .as_any()
            .downcast_ref::<DictionaryArray<Int32Type>>()
            .unwrap();
        let values = process.values().as_any().downcast_ref::<StringArray>().unwrap();
        for i in 0..process.len() {
            let k = process.keys().value(i) as usize;
            labels.push(values.value(k).to_string());
        }
        let w = b
            .column_by_name("weight")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        weights.extend(w.values().iter().copied());
    }
    assert_eq!(labels, ["DYToLL", "DYToLL", "DYToLL", "data", "data"]);
    assert_relative_eq!(weights[1], 2.0 * dy_scale(), max_relative = 1e-12);
    assert_relative_eq!(weights[4], 1.0);
}

#[cfg(feature = "parquet")]
#[test]
fn zero_event_chunk_in_a_split_sample() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    let empty = dy_events().filter(&[false, false, false]).unwrap();
    empty.write_parquet(&dir.join("dy_0.parquet")).unwrap();
    dy_events().write_parquet(&dir.join("dy_1.parquet")).unwrap();
    empty.write_parquet(&dir.join("zz_0.parquet")).unwrap();

    let cfg = AnalysisConfig::from_yaml_str(
        r#"
eras:
  "2030": { luminosity: 3000.0 }
samples:
  DYToLL:
    files: [dy_0.parquet, dy_1.parquet]
    era: "2030"
    cross-section: 2.0
    generated-events: sumgenweight
  ZZ:
    files: [zz_0.parquet]
    era: "2030"
    cross-section: 1.0
    generated-events: 10.0
"#,
        dir,
    )
    .unwrap();
    let out = dir.join("out");

    let mut module = SnowmassExample::new(SnowmassOptions { mva_skim: false, datacards: true });
    let summary = Runner::new(&cfg, RunOptions::new(&out)).run(&mut module).unwrap();
    assert_eq!(summary.processed, ["DYToLL", "ZZ"]);

    let dy = summary.samples.get("DYToLL").unwrap();
    assert_relative_eq!(dy.counters["sumgenweight"], 3.5);

    let f = RootFile::open(out.join("datacard_histograms/2El_nJets_2030.root")).unwrap();
    let h_dy = f.get_histogram("h_DYToLL").unwrap();
    assert_relative_eq!(h_dy.integral(), dy_scale(), max_relative = 1e-12);
    assert_relative_eq!(f.get_histogram("h_ZZ").unwrap().integral(), 0.0);
}

#[cfg(not(feature = "parquet"))]
#[test]
fn mva_skim_without_parquet_support_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = setup(tmp.path());
    let out = tmp.path().join("out");

    let mut module = SnowmassExample::new(SnowmassOptions { mva_skim: true, datacards: true });
    let summary = Runner::new(&cfg, RunOptions::new(&out)).run(&mut module).unwrap();

    assert!(!rtb_analysis::has_parquet());
    assert!(summary.post.skims.is_empty());
    assert!(!out.join("allevts.parquet").exists());
    assert!(out.join("results/DYToLL_allevts.arrow").exists());
    assert_eq!(summary.post.datacards.len(), 1);
}

#[test]
fn mismatched_chunks_report_one_error_prefix() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    dy_events().write_ipc(&dir.join("dy.arrow")).unwrap();
    EventFrame::default()
        .with_scalar("genweight", vec![1.0])
        .unwrap()
        .write_ipc(&dir.join("data.arrow"))
        .unwrap();
    let cfg = AnalysisConfig::from_yaml_str(
        &CONFIG.replace("files: [data.arrow]", "files: [dy.arrow, data.arrow]"),
        dir,
    )
    .unwrap();

    let mut module = SnowmassExample::new(SnowmassOptions::default());
    let err = Runner::new(&cfg, RunOptions::new(dir.join("out"))).run(&mut module).unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, rtb_core::Error::Validation(_)));
    assert!(msg.starts_with("Validation error: sample 'data': "), "got: {msg}");
    assert!(msg.contains("data.arrow: schema mismatch"), "got: {msg}");
    assert_eq!(msg.matches("Validation error").count(), 1, "got: {msg}");
}
