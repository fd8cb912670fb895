//! KiCad 6+ schematic (`.kicad_sch`).
//!
//! Placed parts are the `symbol` lists directly under the root; the copies
//! inside `lib_symbols` are library definitions and carry no references.
//! A placed symbol's reference comes from, in order of preference:
//!
//! 1. its own `(instances (project ... (path ... (reference "R1"))))` block
//!    (KiCad 7+), which lists every hierarchical placement;
//! 2. the root sheet's `(symbol_instances (path "/sheet/symbol" (reference "R1")))`
//!    table (KiCad 6), looked up by instance path;
//! 3. its `Reference` property.

use std::collections::HashMap;

use crate::parser::properties::{self, HideStyle};
use crate::parser::sexp::{parse_document, SExp};
use crate::parser::{first_line, FormatError};

pub const SCHEMATIC_TAG: &str = "kicad_sch";

/// Where a sheet sits in the hierarchy, and the reference table inherited
/// from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetContext {
    /// Instance path of the sheet: empty for the root, else `/<uuid>/<uuid>...`.
    pub path: String,
    /// Instance path of a symbol to its reference.
    pub instance_refs: HashMap<String, String>,
}

/// A child sheet referenced from a schematic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub uuid: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KicadSchematic {
    root: SExp,
    context: SheetContext,
    hide_style: HideStyle,
}

impl KicadSchematic {
    pub fn parse(content: &str) -> Result<Self, FormatError> {
        let root = parse_document(content)?;
        if !root.is_tagged(SCHEMATIC_TAG) {
            return Err(FormatError::Signature {
                expected: "KiCad schematic",
                found: first_line(content),
            });
        }
        let hide_style = HideStyle::for_document(&root);
        let mut schematic = KicadSchematic {
            root,
            context: SheetContext::default(),
            hide_style,
        };
        let own = schematic.instance_table();
        schematic.context.instance_refs = own;
        Ok(schematic)
    }

    /// Place this sheet in a hierarchy. The sheet's own `symbol_instances`
    /// entries are kept on top of the inherited ones.
    pub fn with_context(mut self, context: SheetContext) -> Self {
        let own = std::mem::take(&mut self.context.instance_refs);
        self.context = context;
        self.context.instance_refs.extend(own);
        self
    }

    pub fn context(&self) -> &SheetContext {
        &self.context
    }

    pub fn hide_style(&self) -> HideStyle {
        self.hide_style
    }

    pub fn serialize(&self) -> String {
        self.root.to_pretty_string()
    }

    fn instance_table(&self) -> HashMap<String, String> {
        let mut table = HashMap::new();
        if let Some(instances) = self.root.find_list("symbol_instances") {
            for path in instances.get_all("path") {
                let reference = path.find_list("reference").and_then(|r| r.nth_str(1));
                if let (Some(p), Some(r)) = (path.nth_str(1), reference) {
                    table.insert(p.to_string(), r.to_string());
                }
            }
        }
        table
    }

    /// Placed symbols (not library definitions).
    pub fn symbols(&self) -> impl Iterator<Item = &SExp> {
        self.root
            .as_list()
            .unwrap_or(&[])
            .iter()
            .filter(|i| i.is_tagged("symbol"))
    }

    pub fn symbols_mut(&mut self) -> impl Iterator<Item = &mut SExp> {
        self.root
            .as_list_mut()
            .map(|items| items.as_mut_slice())
            .unwrap_or(&mut [])
            .iter_mut()
            .filter(|i| i.is_tagged("symbol"))
    }

    /// References of a placed symbol.
    pub fn symbol_refs(&self, symbol: &SExp) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        if let Some(instances) = symbol.find_list("instances") {
            for project in instances.get_all("project") {
                for path in project.get_all("path") {
                    if let Some(r) = path.find_list("reference").and_then(|r| r.nth_str(1)) {
                        refs.push(r.to_string());
                    }
                }
            }
        }
        if refs.is_empty() {
            let uuid = symbol.find_list("uuid").and_then(|u| u.nth_str(1));
            if let Some(r) = uuid.and_then(|u| {
                self.context
                    .instance_refs
                    .get(&format!("{}/{}", self.context.path, u))
            }) {
                refs.push(r.clone());
            }
        }
        if refs.is_empty() {
            if let Some(r) = properties::lookup(symbol, "Reference") {
                refs.push(r.to_string());
            }
        }
        refs.sort();
        refs.dedup();
        refs
    }

    /// Every property name used by a placed symbol.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for symbol in self.symbols() {
            for name in properties::properties(symbol).filter_map(properties::name) {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Child sheets in file order.
    pub fn sheets(&self) -> Vec<SheetEntry> {
        self.root
            .get_all("sheet")
            .into_iter()
            .filter_map(|sheet| {
                let uuid = sheet.find_list("uuid").and_then(|u| u.nth_str(1))?;
                let file = properties::properties(sheet).find_map(|p| {
                    let key: String = properties::name(p)?
                        .chars()
                        .filter(|c| !c.is_whitespace())
                        .collect();
                    key.eq_ignore_ascii_case("sheetfile")
                        .then(|| properties::value(p))
                        .flatten()
                })?;
                Some(SheetEntry {
                    uuid: uuid.to_string(),
                    file: file.to_string(),
                })
            })
            .collect()
    }

    /// Context for a child sheet placed here with the given uuid.
    pub fn child_context(&self, sheet: &SheetEntry) -> SheetContext {
        SheetContext {
            path: format!("{}/{}", self.context.path, sheet.uuid),
            instance_refs: self.context.instance_refs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = r#"(kicad_sch (version 20211123) (generator eeschema)
  (uuid 0000-root)
  (lib_symbols
    (symbol "Device:R" (property "Reference" "R" (id 0) (at 0 0 0)))
  )
  (symbol (lib_id "Device:R") (at 100 50 0) (unit 1)
    (uuid aaaa)
    (property "Reference" "R?" (id 0) (at 102 48.5 0) (effects (font (size 1.27 1.27))))
    (property "Value" "10k" (id 1) (at 102 51 0) (effects (font (size 1.27 1.27))))
  )
  (sheet (at 120 40) (size 20 10)
    (uuid ssss)
    (property "Sheet name" "Power" (id 0) (at 120 39 0))
    (property "Sheet file" "power.kicad_sch" (id 1) (at 120 51 0))
  )
  (symbol_instances
    (path "/aaaa" (reference "R1") (unit 1) (value "10k") (footprint ""))
    (path "/ssss/bbbb" (reference "C7") (unit 1) (value "1u") (footprint ""))
  )
)
"#;

    #[test]
    fn test_library_definitions_are_not_parts() {
        let sch = KicadSchematic::parse(ROOT).unwrap();
        assert_eq!(sch.symbols().count(), 1);
        assert_eq!(sch.field_names(), vec!["Reference", "Value"]);
    }

    #[test]
    fn test_refs_from_instance_table() {
        let sch = KicadSchematic::parse(ROOT).unwrap();
        let symbol = sch.symbols().next().unwrap();
        assert_eq!(sch.symbol_refs(symbol), vec!["R1"]);
    }

    #[test]
    fn test_child_sheet_inherits_table() {
        let root = KicadSchematic::parse(ROOT).unwrap();
        let sheets = root.sheets();
        assert_eq!(
            sheets,
            vec![SheetEntry {
                uuid: "ssss".into(),
                file: "power.kicad_sch".into()
            }]
        );
        let child_text = r#"(kicad_sch (version 20211123) (generator eeschema)
  (symbol (lib_id "Device:C") (at 10 10 0) (unit 1)
    (uuid bbbb)
    (property "Reference" "C?" (id 0) (at 12 8 0))
  )
)"#;
        let child = KicadSchematic::parse(child_text)
            .unwrap()
            .with_context(root.child_context(&sheets[0]));
        let symbol = child.symbols().next().unwrap();
        assert_eq!(child.symbol_refs(symbol), vec!["C7"]);
    }

    #[test]
    fn test_refs_from_instances_block() {
        let text = r#"(kicad_sch (version 20230121) (generator eeschema)
  (symbol (lib_id "Device:R") (at 10 10 0) (unit 1)
    (uuid cccc)
    (property "Reference" "R5" (at 12 8 0))
    (instances
      (project "demo"
        (path "/0000/1111" (reference "R5") (unit 1))
        (path "/0000/2222" (reference "R6") (unit 1))
      )
    )
  )
)"#;
        let sch = KicadSchematic::parse(text).unwrap();
        let symbol = sch.symbols().next().unwrap();
        assert_eq!(sch.symbol_refs(symbol), vec!["R5", "R6"]);
    }

    #[test]
    fn test_serialize_reparses() {
        let sch = KicadSchematic::parse(ROOT).unwrap();
        let again = KicadSchematic::parse(&sch.serialize()).unwrap();
        assert_eq!(again.root, sch.root);
    }

    #[test]
    fn test_rejects_symbol_library() {
        assert!(matches!(
            KicadSchematic::parse("(kicad_symbol_lib (version 20211014))"),
            Err(FormatError::Signature { .. })
        ));
    }
}
