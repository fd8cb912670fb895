//! Reading part fields out of each supported document type.
//!
//! Every extractor returns a [`FieldTable`] keyed by part reference
//! (schematics, workbooks) or part name (libraries). Pseudo-parts such as
//! power symbols (`#PWR01`) and unannotated parts (`R?`) are skipped. When
//! the same reference shows up more than once in a KiCad file (multi-unit
//! parts, repeated sheet placements) the first value seen for a field is
//! kept. In a workbook the last row for a reference replaces earlier ones.

use tracing::{debug, trace};

use crate::core::KiFieldError;
use crate::fields::{FieldFilter, FieldMap, FieldTable};
use crate::matching::{similarity, FILTER_CUTOFF};
use crate::parser::dcm::DOC_FIELDS;
use crate::parser::kicad_sym::symbol_name;
use crate::parser::properties;
use crate::parser::{
    DocLibrary, KicadSchematic, LegacyLibrary, LegacySchematic, SExp, SymbolLibrary,
};
use crate::refs::{explode, is_pseudo_ref};
use crate::workbook::{find_header_column, Workbook, REFS_LABEL};

/// Names that pass the filter, compared case-insensitively afterwards.
struct Allowed(Vec<String>);

impl Allowed {
    /// Names close to any of `skip` (within the filter cutoff) never pass.
    fn new(names: &[String], filter: &FieldFilter, skip: &[&str]) -> Self {
        let names: Vec<&String> = names
            .iter()
            .filter(|n| !skip.iter().any(|s| similarity(s, n) >= FILTER_CUTOFF))
            .collect();
        Allowed(filter.cull(&names))
    }

    fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

fn record_part(table: &mut FieldTable, reference: &str, fields: &FieldMap) {
    if is_pseudo_ref(reference) {
        trace!("Skipping pseudo-part {}", reference);
        return;
    }
    table.merge_units(reference, fields.clone());
}

fn record_row(table: &mut FieldTable, reference: &str, fields: &FieldMap) {
    if is_pseudo_ref(reference) {
        trace!("Skipping pseudo-part {}", reference);
        return;
    }
    if table.insert(reference, fields.clone()).is_some() {
        debug!("{} listed again; later row wins", reference);
    }
}

/// Fields from the first worksheet of a workbook. The workbook is ungrouped
/// on a copy so collapsed reference cells like `C1-C3` yield one entry each.
pub fn from_workbook(workbook: &Workbook, filter: &FieldFilter) -> Result<FieldTable, KiFieldError> {
    let mut workbook = workbook.clone();
    workbook.ungroup();

    let (header_row, header) = workbook
        .find_header()
        .ok_or_else(|| KiFieldError::FieldExtraction("workbook has no header row".to_string()))?;
    let (refs_col, refs_label) = find_header_column(&header, REFS_LABEL)
        .ok_or_else(|| KiFieldError::FieldExtraction("no references column in workbook".to_string()))?;
    debug!("References in column {} ({:?})", refs_col + 1, refs_label);

    let labels: Vec<String> = header
        .iter()
        .enumerate()
        .filter(|(c, _)| *c != refs_col)
        .filter_map(|(_, label)| label.clone())
        .collect();
    let allowed = Allowed::new(&labels, filter, &[]);
    let columns: Vec<(usize, &str)> = header
        .iter()
        .enumerate()
        .filter(|(c, _)| *c != refs_col)
        .filter_map(|(c, label)| label.as_deref().map(|l| (c, l)))
        .filter(|(_, label)| allowed.contains(label))
        .collect();

    let mut table = FieldTable::new();
    for row in header_row + 1..workbook.max_row() {
        let Some(refs) = workbook.cell(row, refs_col) else {
            continue;
        };
        let fields: FieldMap = columns
            .iter()
            .map(|&(c, label)| {
                let value = workbook.cell(row, c).unwrap_or_default();
                (label.to_string(), value.to_string())
            })
            .collect();
        for reference in explode(refs) {
            record_row(&mut table, &reference, &fields);
        }
    }
    Ok(table)
}

/// Fields of every component in a legacy schematic sheet.
pub fn from_legacy_schematic(schematic: &LegacySchematic, filter: &FieldFilter) -> FieldTable {
    let allowed = Allowed::new(&schematic.field_names(), filter, &["reference"]);
    let mut table = FieldTable::new();
    for component in schematic.components() {
        let fields: FieldMap = (0..component.field_count())
            .map(|i| (component.field_name(i), component.field_value(i)))
            .filter(|(name, _)| !name.is_empty() && allowed.contains(name))
            .collect();
        for reference in component.refs() {
            record_part(&mut table, &reference, &fields);
        }
    }
    table
}

/// Properties of every placed symbol in a KiCad 6+ schematic sheet.
pub fn from_kicad_schematic(schematic: &KicadSchematic, filter: &FieldFilter) -> FieldTable {
    let allowed = Allowed::new(&schematic.field_names(), filter, &["reference"]);
    let mut table = FieldTable::new();
    for symbol in schematic.symbols() {
        let fields = symbol_fields(symbol, &allowed);
        for reference in schematic.symbol_refs(symbol) {
            record_part(&mut table, &reference, &fields);
        }
    }
    table
}

fn symbol_fields(symbol: &SExp, allowed: &Allowed) -> FieldMap {
    properties::properties(symbol)
        .filter_map(|p| Some((properties::name(p)?, properties::value(p).unwrap_or(""))))
        .filter(|(name, _)| allowed.contains(name))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Fields of every symbol in a legacy library, keyed by symbol name.
/// The reference prefix is reported as `prefix`.
pub fn from_legacy_library(library: &LegacyLibrary, filter: &FieldFilter) -> FieldTable {
    let allowed = Allowed::new(&library.field_names(), filter, &[]);
    let mut table = FieldTable::new();
    for component in library.components() {
        let fields: FieldMap = (0..component.field_count())
            .map(|i| (component.field_name(i), component.field_value(i)))
            .filter(|(name, _)| !name.is_empty() && allowed.contains(name))
            .collect();
        table.merge_units(component.name(), fields);
    }
    table
}

/// Properties of every symbol in a KiCad 6+ library, keyed by symbol name.
pub fn from_symbol_library(library: &SymbolLibrary, filter: &FieldFilter) -> FieldTable {
    let allowed = Allowed::new(&library.field_names(), filter, &[]);
    let mut table = FieldTable::new();
    for symbol in library.symbols() {
        let Some(name) = symbol_name(symbol) else {
            continue;
        };
        table.merge_units(name, symbol_fields(symbol, &allowed));
    }
    table
}

/// Description, keywords and document link of every documented symbol.
pub fn from_doc_library(library: &DocLibrary, filter: &FieldFilter) -> FieldTable {
    let names: Vec<String> = DOC_FIELDS.iter().map(|s| s.to_string()).collect();
    let allowed = Allowed::new(&names, filter, &[]);
    let mut table = FieldTable::new();
    for component in library.components() {
        let fields: FieldMap = DOC_FIELDS
            .iter()
            .filter(|name| allowed.contains(name))
            .filter_map(|name| Some((name.to_string(), component.get(name)?.to_string())))
            .collect();
        table.merge_units(&component.name, fields);
    }
    table
}
