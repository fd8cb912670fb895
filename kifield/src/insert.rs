//! Writing part fields back into each supported document type.
//!
//! Parts are looked up by reference (schematics, workbooks) or name
//! (libraries); parts missing from the table are left alone. Existing
//! fields are updated in place. Fields that don't exist yet are added only
//! when they carry a value, hidden unless marked `[V]`. Empty user fields
//! are then pruned and the remaining user fields sorted by name.

use std::collections::BTreeSet;

use tracing::{debug, trace, warn};

use crate::core::KiFieldError;
use crate::extract;
use crate::fields::{default_field_slot, FieldFilter, FieldMap, FieldTable, FieldUpdate, Visibility};
use crate::matching::{closest_match, COLUMN_CUTOFF};
use crate::parser::dcm::{DocComponent, DOC_FIELDS};
use crate::parser::kicad_sym::{symbol_name, DEFAULT_SYMBOL_PROPERTIES};
use crate::parser::properties::{self, HideStyle};
use crate::parser::{
    DocLibrary, KicadSchematic, LegacyComponent, LegacyLibrary, LegacySchematic, LibComponent,
    SExp, SymbolLibrary,
};
use crate::refs::{explode, RefKey};
use crate::workbook::{find_header_column, Workbook, REFS_HEADER, REFS_LABEL};

/// Properties of a placed symbol that are never pruned.
pub const SCHEMATIC_DEFAULT_PROPERTIES: [&str; 5] =
    ["Reference", "Value", "Footprint", "Datasheet", "Description"];

fn is_reference(name: &str) -> bool {
    name.eq_ignore_ascii_case("reference")
}

/// Write the table into the first worksheet. A workbook without a header
/// gets one (`Refs` followed by the sorted field names). References not yet
/// in the sheet get new rows; fields without a matching column get new
/// columns at the right.
pub fn into_workbook(workbook: &mut Workbook, table: &FieldTable) -> Result<(), KiFieldError> {
    if workbook.max_row() == 0 {
        let mut header = vec![Some(REFS_HEADER.to_string())];
        header.extend(table.field_names().into_iter().map(Some));
        workbook.append_row(header);
    }
    workbook.ungroup();

    let (header_row, mut header) = workbook
        .find_header()
        .ok_or_else(|| KiFieldError::LabelNotFound(REFS_LABEL.to_string()))?;
    let (refs_col, _) = find_header_column(&header, REFS_LABEL)
        .ok_or_else(|| KiFieldError::LabelNotFound(REFS_LABEL.to_string()))?;

    let present: BTreeSet<String> = (header_row + 1..workbook.max_row())
        .filter_map(|row| workbook.cell(row, refs_col))
        .flat_map(explode)
        .collect();
    let mut missing: Vec<&String> = table.keys().filter(|r| !present.contains(*r)).collect();
    missing.sort_by(|a, b| RefKey::new(a).cmp(&RefKey::new(b)));
    for reference in missing {
        let row = workbook.max_row();
        workbook.set_cell(row, refs_col, Some(reference.as_str()));
        trace!("Added row {} for {}", row + 1, reference);
    }

    for row in header_row + 1..workbook.max_row() {
        let Some(refs) = workbook.cell(row, refs_col).map(explode) else {
            continue;
        };
        for reference in refs {
            let Some(fields) = table.get(&reference) else {
                continue;
            };
            for (name, value) in fields {
                let col = column_for(&mut header, refs_col, name);
                workbook.set_cell(header_row, col, header[col].as_deref());
                workbook.set_cell(row, col, Some(value.as_str()));
            }
        }
    }
    Ok(())
}

/// Column whose label best matches `name`, adding one if none is close enough.
fn column_for(header: &mut Vec<Option<String>>, refs_col: usize, name: &str) -> usize {
    let labelled: Vec<(usize, &str)> = header
        .iter()
        .enumerate()
        .filter(|(c, _)| *c != refs_col)
        .filter_map(|(c, label)| label.as_deref().map(|l| (c, l)))
        .collect();
    if let Some(m) = closest_match(name, labelled.iter().map(|(_, l)| *l), COLUMN_CUTOFF) {
        return labelled[m.index].0;
    }
    debug!("New column {:?}", name);
    header.push(Some(name.to_string()));
    header.len() - 1
}

/// References of a legacy component that have fields in the table, with a
/// warning when its hierarchical placements disagree.
fn legacy_component_fields<'t>(component: &LegacyComponent, table: &'t FieldTable) -> Vec<&'t FieldMap> {
    let found: Vec<(String, &FieldMap)> = component
        .refs()
        .into_iter()
        .filter_map(|r| table.get(&r).map(|f| (r, f)))
        .collect();
    if let Some((first_ref, first)) = found.first() {
        for (other_ref, other) in &found[1..] {
            if other != first {
                warn!(
                    "Hierarchical placements {} and {} of {} have different fields; using {}",
                    first_ref,
                    other_ref,
                    component.lib_name(),
                    found.last().map(|(r, _)| r.as_str()).unwrap_or_default()
                );
                break;
            }
        }
    }
    found.into_iter().map(|(_, f)| f).collect()
}

fn update_legacy_component(component: &mut LegacyComponent, update: &FieldUpdate) {
    if is_reference(update.name) {
        return;
    }
    let index = component.find_field(update.name).or_else(|| {
        default_field_slot(update.name)
            .filter(|&slot| slot > 0)
            .and_then(|slot| component.find_slot(slot))
    });
    match index {
        Some(index) => {
            component.set_field_value(index, update.value);
            if let Some(visibility) = update.visibility {
                component.set_field_visibility(index, visibility);
            }
        }
        None if !update.value.is_empty() => {
            let visibility = update.visibility.unwrap_or(Visibility::Invisible);
            component.add_field(update.name, update.value, visibility);
        }
        None => {}
    }
}

/// Update every component of a legacy schematic sheet.
pub fn into_legacy_schematic(schematic: &mut LegacySchematic, table: &FieldTable) {
    for component in schematic.components_mut() {
        let maps = legacy_component_fields(component, table);
        if maps.is_empty() {
            continue;
        }
        for fields in maps {
            for update in FieldUpdate::decode_all(fields) {
                update_legacy_component(component, &update);
            }
        }
        component.prune_empty_fields();
        component.sort_fields();
    }
}

fn update_lib_component(component: &mut LibComponent, update: &FieldUpdate) {
    match component.find_field(update.name) {
        Some(index) => {
            component.set_field_value(index, update.value);
            if let Some(visibility) = update.visibility {
                component.set_field_visibility(index, visibility);
            }
        }
        None if !update.value.is_empty() => {
            let visibility = update.visibility.unwrap_or(Visibility::Invisible);
            component.add_field(update.name, update.value, visibility);
        }
        None => {}
    }
}

/// Update every symbol of a legacy library, looked up by symbol name.
pub fn into_legacy_library(library: &mut LegacyLibrary, table: &FieldTable) {
    for component in library.components_mut() {
        let Some(fields) = table.get(component.name()) else {
            continue;
        };
        trace!("Updating library symbol {}", component.name());
        for update in FieldUpdate::decode_all(fields) {
            update_lib_component(component, &update);
        }
        component.prune_empty_fields();
        component.sort_fields();
    }
}

/// Apply one update to a v6 symbol. `reference_alias` lets a library's
/// `prefix` field address its `Reference` property.
fn update_symbol(symbol: &mut SExp, update: &FieldUpdate, style: HideStyle, reference_alias: bool) {
    let name = if reference_alias && update.name.eq_ignore_ascii_case("prefix") {
        "Reference"
    } else {
        update.name
    };
    match properties::find(symbol, name) {
        Some(index) => {
            if let Some(property) = properties::get_mut(symbol, index) {
                properties::set_value(property, update.value);
                if let Some(visibility) = update.visibility {
                    properties::set_visibility(property, visibility, style);
                }
            }
        }
        None if !update.value.is_empty() => {
            if !properties::add(symbol, name, update.value, update.visibility, style) {
                warn!("Cannot add {:?}: symbol has no Reference property", name);
            }
        }
        None => {}
    }
}

fn tidy_symbol(symbol: &mut SExp, defaults: &[&str]) {
    let empty: Vec<usize> = properties::property_slots(symbol)
        .into_iter()
        .filter(|&i| {
            symbol.nth(i).is_some_and(|p| {
                let name = properties::name(p).unwrap_or("");
                !defaults.iter().any(|d| d.eq_ignore_ascii_case(name))
                    && properties::value(p).unwrap_or("").is_empty()
            })
        })
        .collect();
    for index in empty.into_iter().rev() {
        properties::remove(symbol, index);
    }
    properties::sort(symbol, defaults);
}

/// Update every placed symbol of a KiCad 6+ schematic sheet. The reference
/// itself is never rewritten.
pub fn into_kicad_schematic(schematic: &mut KicadSchematic, table: &FieldTable) {
    let style = schematic.hide_style();
    let per_symbol: Vec<Vec<&FieldMap>> = schematic
        .symbols()
        .map(|symbol| {
            schematic
                .symbol_refs(symbol)
                .iter()
                .filter_map(|r| table.get(r))
                .collect()
        })
        .collect();
    for (symbol, maps) in schematic.symbols_mut().zip(per_symbol) {
        if maps.is_empty() {
            continue;
        }
        for fields in maps {
            for update in FieldUpdate::decode_all(fields) {
                if !is_reference(update.name) {
                    update_symbol(symbol, &update, style, false);
                }
            }
        }
        tidy_symbol(symbol, &SCHEMATIC_DEFAULT_PROPERTIES);
    }
}

/// Update every symbol of a KiCad 6+ library, looked up by symbol name.
pub fn into_symbol_library(library: &mut SymbolLibrary, table: &FieldTable) {
    let style = library.hide_style();
    for symbol in library.symbols_mut() {
        let Some(fields) = symbol_name(symbol).and_then(|n| table.get(n)) else {
            continue;
        };
        for update in FieldUpdate::decode_all(fields) {
            update_symbol(symbol, &update, style, true);
        }
        tidy_symbol(symbol, &DEFAULT_SYMBOL_PROPERTIES);
    }
}

fn has_doc_fields(fields: &FieldMap) -> bool {
    FieldUpdate::decode_all(fields)
        .iter()
        .any(|u| DOC_FIELDS.iter().any(|d| d.eq_ignore_ascii_case(u.name)) && !u.value.is_empty())
}

/// Merge the table into a documentation library. Symbols not yet documented
/// are added only when the table gives them a description, keywords or a
/// document link.
pub fn into_doc_library(library: &mut DocLibrary, table: &FieldTable) {
    let mut merged = extract::from_doc_library(library, &FieldFilter::default());
    merged.combine(table, true);
    for (name, fields) in &merged {
        let mut created = false;
        if library.component_mut(name).is_none() {
            if !has_doc_fields(fields) {
                continue;
            }
            debug!("Documenting new symbol {}", name);
            library.upsert(DocComponent::new(name.as_str()));
            created = true;
        }
        let Some(component) = library.component_mut(name) else {
            continue;
        };
        for update in FieldUpdate::decode_all(fields) {
            if created && update.value.is_empty() {
                continue;
            }
            component.set(update.name, update.value);
        }
    }
}
