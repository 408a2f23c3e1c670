use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rtb_analysis::{EventFrame, Jagged};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rtb"))
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn write_inputs(dir: &Path) -> PathBuf {
    EventFrame::default()
        .with_scalar("genweight", vec![1.0, 1.0, 2.0])
        .unwrap()
        .with_jagged(
            "elec_pt",
            Jagged::from_rows(&[vec![30.0, 21.0], vec![25.0], vec![40.0, 35.0]]),
        )
        .unwrap()
        .with_jagged("elec_eta", Jagged::from_rows(&[vec![0.1, 0.2], vec![0.0], vec![-1.0, 1.0]]))
        .unwrap()
        .with_jagged(
            "jetpuppi_pt",
            Jagged::from_rows(&[vec![50.0], vec![], vec![70.0, 60.0, 20.0]]),
        )
        .unwrap()
        .write_ipc(&dir.join("ttbar.arrow"))
        .unwrap();
    EventFrame::default()
        .with_scalar("genweight", vec![1.0])
        .unwrap()
        .with_jagged("elec_pt", Jagged::from_rows(&[vec![30.0, 30.0]]))
        .unwrap()
        .with_jagged("elec_eta", Jagged::from_rows(&[vec![0.0, 0.0]]))
        .unwrap()
        .with_jagged("jetpuppi_pt", Jagged::from_rows(&[vec![]]))
        .unwrap()
        .write_ipc(&dir.join("zz.arrow"))
        .unwrap();

    let cfg = dir.join("analysis.yml");
    std::fs::write(
        &cfg,
        r#"
eras:
  "2030": { luminosity: 100.0 }
samples:
  TTbar:
    files: [ttbar.arrow]
    era: "2030"
    cross-section: 8.0
    generated-events: sumgenweight
  ZZ:
    files: [zz.arrow]
    era: "2030"
    cross-section: 1.0
    generated-events: 10.0
"#,
    )
    .unwrap();
    cfg
}

fn stdout_json(out: &Output) -> serde_json::Value {
    assert!(out.status.success(), "rtb failed, stderr={}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).expect("stdout should be JSON")
}

#[test]
fn version_prints_crate_version() {
    let out = run(&["version"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.starts_with(&format!("rtb {}", rtb_core::VERSION)), "got: {text}");
}

#[test]
fn datacards_only() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = write_inputs(tmp.path());
    let outdir = tmp.path().join("out");

    let v = stdout_json(&run(&[
        "run",
        "--config",
        cfg.to_str().unwrap(),
        "--output",
        outdir.to_str().unwrap(),
        "--datacards",
    ]));
    assert_eq!(v["processed"], serde_json::json!(["TTbar", "ZZ"]));
    assert_eq!(v["skims"], serde_json::json!([]));
    assert_eq!(v["datacards"].as_array().unwrap().len(), 1);
    assert!(!outdir.join("allevts.parquet").exists());

    let card = outdir.join("datacard_histograms/2El_nJets_2030.root");
    let v = stdout_json(&run(&["inspect", card.to_str().unwrap()]));
    let names: Vec<&str> =
        v["keys"].as_array().unwrap().iter().map(|k| k["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["h_TTbar", "h_ZZ"]);

    // TTbar: 100 * 8 / 4 per unit weight; events 0 (1 jet, w=1) and 2 (3 jets, w=2)
    let tt = &v["histograms"][0];
    assert_eq!(tt["name"], "h_TTbar");
    let content = tt["bin_content"].as_array().unwrap();
    assert!((content[1].as_f64().unwrap() - 200.0).abs() < 1e-9);
    assert!((content[3].as_f64().unwrap() - 400.0).abs() < 1e-9);

    let zz = &v["histograms"][1];
    assert!((zz["bin_content"][0].as_f64().unwrap() - 10.0).abs() < 1e-9);
}

#[test]
fn results_file_carries_genweight_counter() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = write_inputs(tmp.path());
    let outdir = tmp.path().join("out");

    let v = stdout_json(&run(&[
        "run",
        "-c",
        cfg.to_str().unwrap(),
        "-o",
        outdir.to_str().unwrap(),
        "--compression",
        "0",
    ]));
    assert!((v["samples"][0]["counters"]["sumgenweight"].as_f64().unwrap() - 4.0).abs() < 1e-12);
    assert!(!outdir.join("datacard_histograms").exists());

    let results = outdir.join("results/TTbar.root");
    let v = stdout_json(&run(&["inspect", results.to_str().unwrap()]));
    let counter = v["histograms"]
        .as_array()
        .unwrap()
        .iter()
        .find(|h| h["name"] == "h_count_genweight")
        .expect("counter histogram");
    assert!((counter["bin_content"][0].as_f64().unwrap() - 4.0).abs() < 1e-12);
}

#[test]
fn unknown_era_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = write_inputs(tmp.path());
    let outdir = tmp.path().join("out");

    let out = run(&[
        "run",
        "--config",
        cfg.to_str().unwrap(),
        "--output",
        outdir.to_str().unwrap(),
        "--eras",
        "2050",
    ]);
    assert!(!out.status.success());
}

#[cfg(feature = "parquet")]
#[test]
fn mva_skim_only() {
    use arrow::array::{Array, DictionaryArray, StringArray};
    use arrow::datatypes::Int32Type;

    let tmp = tempfile::tempdir().unwrap();
    let cfg = write_inputs(tmp.path());
    let outdir = tmp.path().join("out");

    let v = stdout_json(&run(&[
        "run",
        "--config",
        cfg.to_str().unwrap(),
        "--output",
        outdir.to_str().unwrap(),
        "--mvaSkim",
    ]));
    assert_eq!(v["datacards"], serde_json::json!([]));
    assert!(!outdir.join("datacard_histograms").exists());

    let skim = outdir.join("allevts.parquet");
    assert!(skim.exists());
    let batches = rtb_analysis::parquet_io::read_parquet_batches(&skim).unwrap();
    assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 4);

    let mut labels = Vec::new();
    for b in &batches {
        let process = b
            .column_by_name("process")
            .unwrap()
            .as_any()
            .downcast_ref::<DictionaryArray<Int32Type>>()
            .unwrap();
        let values = process.values().as_any().downcast_ref::<StringArray>().unwrap();
        for i in 0..process.len() {
            labels.push(values.value(process.keys().value(i) as usize).to_string());
        }
    }
    assert_eq!(labels, ["TTbar", "TTbar", "TTbar", "ZZ"]);
}
