//! Integration tests for KiField runs over real files

use kifield::prelude::*;
use kifield::{Document, FieldMap, Workbook};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Copy fixtures into a scratch directory so runs can write next to them.
fn scratch(names: &[&str]) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    for name in names {
        fs::copy(fixture_path(name), dir.path().join(name)).expect("copy fixture");
    }
    dir
}

fn session() -> WriteSession {
    WriteSession::new(true, 0)
}

fn extract(files: &[PathBuf], options: &KiFieldOptions) -> FieldTable {
    KiFieldCore::extract_part_fields(files, options, &mut session())
}

fn read_workbook(path: &Path) -> Workbook {
    let format = FileFormat::from_path(path).expect("workbook extension");
    Workbook::load(&fs::read(path).expect("read workbook"), format).expect("parse workbook")
}

fn rows(workbook: &Workbook) -> Vec<Vec<String>> {
    workbook
        .rows()
        .iter()
        .map(|row| row.iter().map(|c| c.clone().unwrap_or_default()).collect())
        .collect()
}

fn value<'t>(table: &'t FieldTable, part: &str, field: &str) -> Option<&'t str> {
    table.get(part)?.get(field).map(String::as_str)
}

#[test]
fn test_csv_to_new_xlsx_ungrouped() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("parts.csv");
    let xlsx = dir.path().join("bom.xlsx");
    fs::write(&csv, "Refs,Value\nR1-R3,10k\n").unwrap();

    let report = KiFieldCore::run(&[csv], &[xlsx.clone()], &KiFieldOptions::default(), session());
    assert_eq!(report.parts, 3);
    assert_eq!(report.inserted_files, vec![xlsx.clone()]);
    assert!(report.backups.is_empty(), "nothing to back up for a new file");

    let wb = read_workbook(&xlsx);
    assert_eq!(
        rows(&wb),
        vec![
            vec!["Refs", "Value"],
            vec!["R1", "10k"],
            vec!["R2", "10k"],
            vec!["R3", "10k"],
        ]
    );
}

#[test]
fn test_csv_to_new_xlsx_grouped() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("parts.csv");
    let xlsx = dir.path().join("bom.xlsx");
    fs::write(&csv, "Refs,Value\nR1-R3,10k\n").unwrap();

    let options = KiFieldOptions {
        group_components: true,
        ..Default::default()
    };
    KiFieldCore::run(&[csv], &[xlsx.clone()], &options, session());

    let wb = read_workbook(&xlsx);
    assert_eq!(rows(&wb), vec![vec!["Refs", "Value"], vec!["R1-R3", "10k"]]);
}

#[test]
fn test_grouped_without_ranges() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("parts.csv");
    let out = dir.path().join("bom.csv");
    fs::write(&csv, "Refs,Value\nR1-R3,10k\nC1,1u\n").unwrap();

    let options = KiFieldOptions {
        group_components: true,
        no_range: true,
        ..Default::default()
    };
    KiFieldCore::run(&[csv], &[out.clone()], &options, session());
    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "Refs,Value\nC1,1u\n\"R1, R2, R3\",10k\n"
    );
}

#[test]
fn test_later_file_wins_per_field() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");
    fs::write(&first, "Refs,value\nC1,10k\n").unwrap();
    fs::write(&second, "Refs,value,footprint\nC1,1k,0402\n").unwrap();

    let table = extract(&[first, second], &KiFieldOptions::default());
    let mut expected = FieldMap::new();
    expected.insert("value".into(), "1k".into());
    expected.insert("footprint".into(), "0402".into());
    assert_eq!(table.get("C1"), Some(&expected));
}

#[test]
fn test_repeated_ref_row_last_wins() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("parts.csv");
    fs::write(&csv, "Refs,Value\nR1,10k\nR1,22k\n").unwrap();

    let table = extract(&[csv], &KiFieldOptions::default());
    assert_eq!(value(&table, "R1", "Value"), Some("22k"));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_semicolon_ref_lists_in_comma_csv() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("parts.csv");
    fs::write(&csv, "Refs,Value\n\"C1;C2;C3;C4\",1u\n").unwrap();

    let table = extract(&[csv], &KiFieldOptions::default());
    let parts: Vec<&String> = table.keys().collect();
    assert_eq!(parts, vec!["C1", "C2", "C3", "C4"]);
    assert_eq!(value(&table, "C3", "Value"), Some("1u"));
}

#[test]
fn test_missing_source_is_reported() {
    let dir = TempDir::new().unwrap();
    let typo = dir.path().join("bmo.xlsx");
    let out = dir.path().join("out.csv");

    let report = KiFieldCore::run(&[typo.clone()], &[out.clone()], &KiFieldOptions::default(), session());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, typo);
    assert!(!out.exists());
}

#[test]
fn test_csv_fixture_skips_power_symbols() {
    let table = extract(&[fixture_path("parts.csv")], &KiFieldOptions::default());
    let parts: Vec<&String> = table.keys().collect();
    assert_eq!(parts, vec!["C1", "R1", "R2", "R3"]);
    assert_eq!(value(&table, "R2", "MPN"), Some("RC0603FR-0710KL"));
    assert_eq!(value(&table, "C1", "MPN"), Some(""));
}

#[test]
fn test_legacy_hierarchy_extraction() {
    let dir = scratch(&["root.sch", "power.sch"]);
    let root = dir.path().join("root.sch");

    let flat = extract(&[root.clone()], &KiFieldOptions::default());
    assert!(flat.contains_key("R1"));
    assert!(!flat.contains_key("C1"));
    assert!(!flat.contains_key("#PWR01"));

    let options = KiFieldOptions {
        recurse: true,
        ..Default::default()
    };
    let deep = extract(&[root], &options);
    assert_eq!(value(&deep, "C1", "value"), Some("100n"));
    assert_eq!(value(&deep, "U1", "footprint"), Some("Package_TO_SOT_SMD:SOT-223-3_TabPin2"));
    assert!(!deep.contains_key("C?"));
}

#[test]
fn test_workbook_into_legacy_hierarchy() {
    let dir = scratch(&["root.sch", "power.sch"]);
    let root = dir.path().join("root.sch");
    let csv = dir.path().join("update.csv");
    fs::write(&csv, "Refs,MPN,Value\nC1,GRM188R71C104KA01,\nR2,,4k7\n").unwrap();

    let options = KiFieldOptions {
        recurse: true,
        ..Default::default()
    };
    let report = KiFieldCore::run(&[csv], &[root.clone()], &options, session());
    assert_eq!(report.inserted_files.len(), 2);
    assert!(dir.path().join("root.sch.1.bak").exists());
    assert!(dir.path().join("power.sch.1.bak").exists());

    let power = fs::read_to_string(dir.path().join("power.sch")).unwrap();
    assert!(power.contains("\"GRM188R71C104KA01\""));
    assert!(power.contains("\"MPN\""));

    let table = extract(&[root], &options);
    assert_eq!(value(&table, "C1", "MPN"), Some("GRM188R71C104KA01"));
    // empty value for an existing default field clears it but keeps the field
    assert_eq!(value(&table, "C1", "value"), Some(""));
    assert_eq!(value(&table, "R2", "value"), Some("4k7"));
    assert_eq!(value(&table, "R2", "MPN"), None, "empty new field is not added");
}

#[test]
fn test_kicad_schematic_hierarchy() {
    let dir = scratch(&["demo.kicad_sch", "filter.kicad_sch"]);
    let root = dir.path().join("demo.kicad_sch");
    let options = KiFieldOptions {
        recurse: true,
        ..Default::default()
    };

    let table = extract(&[root.clone()], &options);
    let parts: Vec<&String> = table.keys().collect();
    assert_eq!(parts, vec!["C5", "R1"]);
    assert_eq!(value(&table, "C5", "Value"), Some("1u"));
    assert_eq!(value(&table, "R1", "Notes"), Some(""));
    assert!(table.get("R1").unwrap().keys().all(|k| k != "Reference"));
}

#[test]
fn test_kicad_schematic_default_fields_retained() {
    let dir = scratch(&["demo.kicad_sch", "filter.kicad_sch"]);
    let root = dir.path().join("demo.kicad_sch");
    let csv = dir.path().join("update.csv");
    fs::write(&csv, "Refs,Footprint,Notes,Tolerance\nR1,,,1%\n").unwrap();

    KiFieldCore::run(&[csv], &[root.clone()], &KiFieldOptions::default(), session());

    let doc = Document::parse(FileFormat::KicadSchematic, &fs::read(&root).unwrap()).unwrap();
    let table = doc.extract_fields(&FieldFilter::default()).unwrap();
    let r1 = table.get("R1").unwrap();
    assert_eq!(r1.get("Footprint").map(String::as_str), Some(""));
    assert!(!r1.contains_key("Notes"), "empty custom field is pruned");
    assert_eq!(r1.get("Tolerance").map(String::as_str), Some("1%"));
    assert_eq!(r1.get("Value").map(String::as_str), Some("10k"));
}

#[test]
fn test_new_column_for_unmatched_field() {
    let dir = TempDir::new().unwrap();
    let bom = dir.path().join("bom.csv");
    let src = dir.path().join("src.csv");
    fs::write(&bom, "Refs,Value,Qty\nR1,10k,2\n").unwrap();
    fs::write(&src, "Refs,Tolerance\nR1,1%\n").unwrap();

    KiFieldCore::run(&[src], &[bom.clone()], &KiFieldOptions::default(), session());
    assert_eq!(
        fs::read_to_string(&bom).unwrap(),
        "Refs,Value,Qty,Tolerance\nR1,10k,2,1%\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("bom.csv.1.bak")).unwrap(),
        "Refs,Value,Qty\nR1,10k,2\n"
    );
}

#[test]
fn test_workbook_to_new_doc_library() {
    let dir = TempDir::new().unwrap();
    let csv = dir.path().join("docs.csv");
    let dcm = dir.path().join("demo.dcm");
    fs::write(&csv, "Refs,description,keywords\nLM358,Dual opamp,opamp\nR,,\n").unwrap();

    let report = KiFieldCore::run(&[csv], &[dcm.clone()], &KiFieldOptions::default(), session());
    assert_eq!(report.inserted_files, vec![dcm.clone()]);
    assert_eq!(
        fs::read_to_string(&dcm).unwrap(),
        "EESchema-DOCLIB  Version 2.0\n#\n$CMP LM358\nD Dual opamp\nK opamp\n$ENDCMP\n#\n#End Doc Library\n"
    );
}

#[test]
fn test_legacy_library_fields() {
    let table = extract(&[fixture_path("demo.lib")], &KiFieldOptions::default());
    assert_eq!(value(&table, "R", "prefix"), Some("R"));
    assert_eq!(value(&table, "R", "Manf"), Some("Yageo"));
    assert_eq!(value(&table, "C", "footprint"), Some(""));
}

#[test]
fn test_symbol_library_round_trip_through_workbook() {
    let dir = scratch(&["demo.kicad_sym"]);
    let lib = dir.path().join("demo.kicad_sym");
    let bom = dir.path().join("symbols.tsv");

    KiFieldCore::run(&[lib.clone()], &[bom.clone()], &KiFieldOptions::default(), session());
    let sheet = fs::read_to_string(&bom).unwrap();
    assert!(sheet.starts_with("Refs\t"));
    assert!(sheet.contains("LM358"));

    fs::write(&bom, sheet.replace("dual opamp", "op amp")).unwrap();
    KiFieldCore::run(&[bom], &[lib.clone()], &KiFieldOptions::default(), session());
    let table = extract(&[lib], &KiFieldOptions::default());
    assert_eq!(value(&table, "LM358", "ki_keywords"), Some("op amp"));
    assert_eq!(value(&table, "LM358", "Reference"), Some("U"));
}

#[test]
fn test_field_filter() {
    let options = KiFieldOptions {
        filter: FieldFilter::from_specs(&["value", "mpn"]),
        ..Default::default()
    };
    let table = extract(&[fixture_path("parts.csv")], &options);
    let r1 = table.get("R1").unwrap();
    assert_eq!(r1.len(), 2);
    assert!(r1.contains_key("Value"));
    assert!(r1.contains_key("MPN"));
}
