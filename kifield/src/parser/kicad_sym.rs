//! KiCad 6+ symbol library (`.kicad_sym`).

use crate::parser::properties::{self, HideStyle};
use crate::parser::sexp::{parse_document, SExp};
use crate::parser::{first_line, FormatError};

pub const LIBRARY_TAG: &str = "kicad_symbol_lib";

/// Properties every library symbol carries; they are never pruned.
pub const DEFAULT_SYMBOL_PROPERTIES: [&str; 9] = [
    "Reference",
    "Value",
    "Footprint",
    "Datasheet",
    "Description",
    "ki_description",
    "ki_fp_filters",
    "ki_keywords",
    "ki_locked",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolLibrary {
    root: SExp,
    hide_style: HideStyle,
}

impl SymbolLibrary {
    pub fn parse(content: &str) -> Result<Self, FormatError> {
        let root = parse_document(content)?;
        if !root.is_tagged(LIBRARY_TAG) {
            return Err(FormatError::Signature {
                expected: "KiCad symbol library",
                found: first_line(content),
            });
        }
        let hide_style = HideStyle::for_document(&root);
        Ok(SymbolLibrary { root, hide_style })
    }

    pub fn serialize(&self) -> String {
        self.root.to_pretty_string()
    }

    pub fn hide_style(&self) -> HideStyle {
        self.hide_style
    }

    /// Top-level symbols. Unit sub-symbols nested inside them are skipped.
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
}

/// Library name of a symbol: `(symbol "LM358" ...)`.
pub fn symbol_name(symbol: &SExp) -> Option<&str> {
    symbol.nth_str(1)
}

pub fn is_default_property(name: &str) -> bool {
    DEFAULT_SYMBOL_PROPERTIES
        .iter()
        .any(|d| d.eq_ignore_ascii_case(name))
}
