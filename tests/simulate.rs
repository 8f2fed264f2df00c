// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use float_cmp::approx_eq;

use boosd::{parse, ErrorCode, ErrorKind, Project, Timespec};

static TEST_MODELS: &[&str] = &[
    "test/models/accum/model.boosd",
    "test/models/teacup/model.boosd",
    "test/models/lookups/model.boosd",
    "test/models/specialize/model.boosd",
    "test/models/sir/model.boosd",
];

/// Table is a TSV report read back in: column offsets by header name,
/// then rows of numbers.
struct Table {
    offsets: HashMap<String, usize>,
    rows: Vec<Vec<f64>>,
}

fn load_tsv<R: std::io::Read>(reader: R) -> Table {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(reader);

    let offsets = rdr
        .headers()
        .unwrap()
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), i))
        .collect();

    let rows = rdr
        .records()
        .map(|record| {
            record
                .unwrap()
                .iter()
                .map(|field| field.trim().parse::<f64>().unwrap())
                .collect()
        })
        .collect();

    Table { offsets, rows }
}

fn load_expected(model_path: &str) -> Table {
    let dir = std::path::Path::new(model_path).parent().unwrap();
    let f = std::fs::File::open(dir.join("output.tab")).unwrap();
    load_tsv(f)
}

fn ensure_results(expected: &Table, actual: &Table) {
    assert_eq!(expected.rows.len(), actual.rows.len());
    let mut names: Vec<&String> = expected.offsets.keys().collect();
    names.sort();
    let mut actual_names: Vec<&String> = actual.offsets.keys().collect();
    actual_names.sort();
    assert_eq!(names, actual_names);

    for (step, (expected_row, actual_row)) in expected.rows.iter().zip(actual.rows.iter()).enumerate() {
        for ident in names.iter() {
            let expected = expected_row[expected.offsets[*ident]];
            let actual = actual_row[actual.offsets[*ident]];
            assert!(
                approx_eq!(f64, expected, actual, epsilon = 2e-3),
                "step {step}: {ident}: {expected} (expected) != {actual} (actual)"
            );
        }
    }
}

fn simulate_path(model_path: &str) {
    eprintln!("model: {model_path}");
    let source = std::fs::read_to_string(model_path).unwrap();

    let (file, error_count) = parse(&source);
    assert_eq!(0, error_count, "{:?}", file.errors);

    let project = Project::new(&file).unwrap();
    let mut sim = project.instantiate("main", "main").unwrap();
    sim.run_to_end().unwrap();

    let tsv = sim.results().to_tsv();
    let actual = load_tsv(tsv.as_bytes());
    ensure_results(&load_expected(model_path), &actual);

    // the header is sorted after the leading time column
    let header: Vec<&str> = tsv.lines().next().unwrap().split('\t').collect();
    assert_eq!("time", header[0]);
    assert!(header[1..].windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn simulates_models_correctly() {
    for &path in TEST_MODELS {
        simulate_path(path);
    }
}

#[test]
fn accumulates_at_a_constant_rate() {
    let project = Project::from_source(
        "model main {
	timespec = {start: 0, end: 10, dt: 1, save_step: 1}
	accum = stock {initial: 100, inflow: rate}
	rate = 5
}
",
    )
    .unwrap();
    let mut sim = project.instantiate("main", "main").unwrap();
    sim.run_to_end().unwrap();
    let (times, values) = sim.value_series("accum").unwrap();
    let expected_times: Vec<f64> = (0..=10).map(|t| t as f64).collect();
    let expected: Vec<f64> = (0..=10).map(|t| 100.0 + 5.0 * t as f64).collect();
    assert_eq!(expected_times, times);
    assert_eq!(expected, values);
}

#[test]
fn unresolved_reference_fails_the_whole_file() {
    let err = Project::from_source(
        "model ok {\n\tx = 1\n}\nmodel main {\n\ty = nope + 1\n}\n",
    )
    .err()
    .unwrap();
    assert_eq!(ErrorKind::Model, err.kind);
    assert_eq!(ErrorCode::UnknownVariable, err.code);
}

#[test]
fn abstract_main_is_not_simulatable() {
    let project = Project::from_source(
        "model main {\n\ttimespec = {start: 0, end: 1, dt: 1}\n\tgrowth\n\tx = growth * 2\n}\n",
    )
    .unwrap();
    assert!(project.get_model("main").unwrap().is_abstract);
    let err = project.instantiate("main", "main").err().unwrap();
    assert_eq!(ErrorCode::NotSimulatable, err.code);
}

#[test]
fn overrides_change_a_run() {
    let source = std::fs::read_to_string("test/models/teacup/model.boosd").unwrap();
    let project = Project::from_source(&source).unwrap();

    let mut baseline = project.instantiate("main", "baseline").unwrap();
    let mut warm_room = project.instantiate("main", "warm").unwrap();
    warm_room.set_value("room_temperature", 100.0).unwrap();
    baseline.run_to_end().unwrap();
    warm_room.run_to_end().unwrap();

    let cooler = baseline.value("teacup_temperature").unwrap();
    let warmer = warm_room.value("teacup_temperature").unwrap();
    assert!(warmer > cooler, "{warmer} <= {cooler}");
    assert_eq!(70.0, baseline.value("room_temperature").unwrap());

    // the constant-kinded variable can't be gamed
    let err = warm_room.set_value("characteristic_time", 5.0).unwrap_err();
    assert_eq!(ErrorCode::NotOverridable, err.code);

    let header = warm_room.results().to_tsv();
    assert!(header.starts_with("time\twarm.characteristic_time\t"));
}

#[test]
fn explicit_timespec() {
    let source = std::fs::read_to_string("test/models/accum/model.boosd").unwrap();
    let project = Project::from_source(&source).unwrap();
    let timespec = Timespec::new(0.0, 2.0, 0.25, 0.5).unwrap();
    let mut sim = project.instantiate_with("main", "short", timespec).unwrap();
    sim.run_to_end().unwrap();
    let (times, values) = sim.value_series("accum").unwrap();
    assert_eq!(vec![0.0, 0.5, 1.0, 1.5, 2.0], times);
    assert_eq!(vec![100.0, 102.5, 105.0, 107.5, 110.0], values);
}
