//! Integration tests: write histograms with `RootWriter` and read them back.

use approx::assert_relative_eq;
use rtb_root::{Compression, Histogram, RootError, RootFile, RootWriter};

fn filled(name: &str, n_bins: usize, n_fills: usize) -> Histogram {
    let mut h = Histogram::uniform(name, "title", n_bins, 0.0, n_bins as f64).unwrap();
    for i in 0..n_fills {
        h.fill((i % (n_bins + 2)) as f64 - 1.0 + 0.5, 0.5 + (i % 3) as f64);
    }
    h
}

#[test]
fn uncompressed_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.root");

    let mut counter =
        Histogram::uniform("h_count_genweight", "genweight sum", 1, 0.0, 1.0).unwrap();
    counter.fill(0.0, 1.5);
    counter.fill(0.0, -0.25);
    let jets = filled("2El_nJets", 10, 40);

    let mut w = RootWriter::create(&path, Compression::None).unwrap();
    w.put_histogram(&counter).unwrap();
    w.put_histogram(&jets).unwrap();
    w.finish().unwrap();

    let f = RootFile::open(&path).unwrap();
    assert_eq!(f.compression_settings(), 0);
    let names: Vec<String> = f.list_keys().unwrap().into_iter().map(|k| k.name).collect();
    assert_eq!(names, vec!["h_count_genweight", "2El_nJets"]);

    let back = f.get_histogram("h_count_genweight").unwrap();
    assert_eq!(back.title, "genweight sum");
    assert_relative_eq!(back.bin_content[0], 1.25);
    assert_relative_eq!(back.sumw2[0], 1.5 * 1.5 + 0.25 * 0.25);
    assert_relative_eq!(back.entries, 2.0);

    let back_jets = f.get_histogram("2El_nJets").unwrap();
    assert_eq!(back_jets, jets);
}

#[test]
fn compressed_round_trip_matches_uncompressed() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("plain.root");
    let zipped = dir.path().join("zipped.root");
    let h = filled("big", 200, 1000);

    for (path, comp) in [(&plain, Compression::None), (&zipped, Compression::Zlib(6))] {
        let mut w = RootWriter::create(path, comp).unwrap();
        w.put_histogram(&h).unwrap();
        w.finish().unwrap();
    }

    let plain_len = std::fs::metadata(&plain).unwrap().len();
    let zipped_len = std::fs::metadata(&zipped).unwrap().len();
    assert!(zipped_len < plain_len, "{zipped_len} !< {plain_len}");

    let f = RootFile::open(&zipped).unwrap();
    assert_eq!(f.compression_settings(), 106);
    assert_eq!(f.get_histogram("big").unwrap(), h);
}

#[test]
fn rewritten_name_reads_latest_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cycles.root");

    let first = filled("h", 4, 3);
    let mut second = first.clone();
    second.scale(2.0);

    let mut w = RootWriter::create(&path, Compression::default()).unwrap();
    w.put_histogram(&first).unwrap();
    w.put_histogram(&second).unwrap();
    w.finish().unwrap();

    let f = RootFile::open(&path).unwrap();
    let cycles: Vec<u16> = f.list_keys().unwrap().iter().map(|k| k.cycle).collect();
    assert_eq!(cycles, vec![1, 2]);
    assert_eq!(f.get_histogram("h").unwrap(), second);
    assert_eq!(f.histograms().unwrap().len(), 1);
}

#[test]
fn variable_binning_survives() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("var.root");
    let mut h = Histogram::new("var", "variable", vec![0.0, 1.0, 5.0, 20.0]).unwrap();
    h.fill(3.0, 2.0);
    h.fill(25.0, 1.0);

    let mut w = RootWriter::create(&path, Compression::None).unwrap();
    w.put_histogram(&h).unwrap();
    w.finish().unwrap();

    let back = RootFile::open(&path).unwrap().get_histogram("var").unwrap();
    assert_eq!(back.bin_edges, vec![0.0, 1.0, 5.0, 20.0]);
    assert_relative_eq!(back.bin_content[1], 2.0);
    assert_relative_eq!(back.overflow, 1.0);
}

#[test]
fn missing_key_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.root");
    RootWriter::create(&path, Compression::None).unwrap().finish().unwrap();

    let f = RootFile::open(&path).unwrap();
    assert!(f.list_keys().unwrap().is_empty());
    assert!(!f.has_key("nope"));
    match f.get_histogram("nope") {
        Err(RootError::KeyNotFound(name)) => assert_eq!(name, "nope"),
        other => panic!("expected KeyNotFound, got {other:?}"),
    }
}

#[test]
fn header_points_at_streamer_info_and_free_segments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.root");

    let mut w = RootWriter::create(&path, Compression::Zlib(1)).unwrap();
    w.put_histogram(&filled("2El_nJets", 10, 40)).unwrap();
    w.finish().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let u32_at = |pos: usize| u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap());
    let end = u32_at(12) as usize;
    let seek_free = u32_at(16) as usize;
    let nbytes_free = u32_at(20) as usize;
    assert_eq!(end, bytes.len());
    assert_eq!(seek_free + nbytes_free, end);
    assert_eq!(u32_at(24), 1, "nfree");
    assert!(u32_at(37) > 100, "fSeekInfo");
    assert!(u32_at(41) > 0, "fNbytesInfo");

    let f = RootFile::open(&path).unwrap();
    assert_eq!(f.end(), end as u64);
    assert_eq!(f.free_segments().unwrap(), vec![(end as u64, 2_000_000_000)]);

    let info = f.streamer_info().unwrap().expect("StreamerInfo key");
    assert_eq!(info.name, "StreamerInfo");
    assert_eq!(info.class_name, "TList");

    // Bookkeeping records stay out of the directory.
    let names: Vec<String> = f.list_keys().unwrap().into_iter().map(|k| k.name).collect();
    assert_eq!(names, vec!["2El_nJets"]);
}
