//! KiCad 4-5 symbol library (`.lib`).
//!
//! Each symbol is a `DEF ... ENDDEF` block. Field lines are numbered:
//! `F0` carries the reference prefix, `F1`-`F3` the value, footprint and
//! datasheet, and `F4` onwards are user fields with a trailing name token.
//! Comment lines (`#`) preceding a `DEF` belong to that symbol.

use crate::fields::{Visibility, DEFAULT_FIELD_NAMES};
use crate::parser::tokens::{tokenize, Record, Schema};
use crate::parser::{first_line, line_ending, FormatError};

pub const LIBRARY_SIGNATURE: &str = "EESchema-LIBRARY";
pub const LIBRARY_HEADER: &str = "EESchema-LIBRARY Version 2.3";

const DEFAULT_FOOTER: [&str; 2] = ["#", "#End Library"];

const DEF_SCHEMA: Schema = &[
    ("name", ""),
    ("reference", ""),
    ("unused", "0"),
    ("text_offset", "0"),
    ("draw_pinnumber", "Y"),
    ("draw_pinname", "Y"),
    ("unit_count", "1"),
    ("units_locked", "F"),
    ("option_flag", "N"),
];
const F0_SCHEMA: Schema = &[
    ("reference", "\"\""),
    ("posx", "0"),
    ("posy", "0"),
    ("text_size", "50"),
    ("text_orient", "H"),
    ("visibility", "V"),
    ("htext_justify", "C"),
    ("vtext_justify", "CNN"),
];
const FN_SCHEMA: Schema = &[
    ("name", "\"\""),
    ("posx", "0"),
    ("posy", "0"),
    ("text_size", "50"),
    ("text_orient", "H"),
    ("visibility", "I"),
    ("htext_justify", "C"),
    ("vtext_justify", "CNN"),
    ("fieldname", ""),
];

/// Name used for the `F0` field when reading or writing tables.
pub const PREFIX_FIELD: &str = "prefix";

/// A parsed `.lib` file.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyLibrary {
    header: String,
    components: Vec<LibComponent>,
    footer: Vec<String>,
    newline: &'static str,
}

impl LegacyLibrary {
    pub fn parse(content: &str) -> Result<Self, FormatError> {
        let mut lines = content.lines();
        let header = lines.next().unwrap_or("");
        if !header.contains(LIBRARY_SIGNATURE) {
            return Err(FormatError::Signature {
                expected: "KiCad legacy symbol library",
                found: first_line(content),
            });
        }

        let mut components = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        while let Some(line) = lines.next() {
            if !line.starts_with("DEF") {
                pending.push(line.to_string());
                continue;
            }
            let mut block = vec![line.to_string()];
            let mut closed = false;
            for line in lines.by_ref() {
                block.push(line.to_string());
                if line.starts_with("ENDDEF") {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(FormatError::Syntax(format!("{line} without ENDDEF")));
            }
            components.push(LibComponent::from_block(std::mem::take(&mut pending), block));
        }

        Ok(LegacyLibrary {
            header: header.to_string(),
            components,
            footer: pending,
            newline: line_ending(content),
        })
    }

    pub fn serialize(&self) -> String {
        let mut lines = vec![self.header.clone()];
        for component in &self.components {
            lines.extend(component.to_lines());
        }
        if self.footer.iter().all(|l| l.trim().is_empty()) {
            lines.extend(DEFAULT_FOOTER.iter().map(|s| s.to_string()));
        } else {
            lines.extend(self.footer.iter().cloned());
        }
        let mut out = lines.join(self.newline);
        out.push_str(self.newline);
        out
    }

    pub fn components(&self) -> &[LibComponent] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [LibComponent] {
        &mut self.components
    }

    /// `prefix`, the default field names and every user field name.
    pub fn field_names(&self) -> Vec<String> {
        let mut names = vec![PREFIX_FIELD.to_string()];
        names.extend(DEFAULT_FIELD_NAMES[1..].iter().map(|s| s.to_string()));
        for component in &self.components {
            for index in 0..component.fields.len() {
                let name = component.field_name(index);
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// One `DEF ... ENDDEF` symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct LibComponent {
    comments: Vec<String>,
    definition: Record,
    fields: Vec<Record>,
    body: Vec<String>,
}

impl LibComponent {
    fn from_block(comments: Vec<String>, block: Vec<String>) -> Self {
        let mut definition = Record::new("DEF", DEF_SCHEMA);
        let mut fields = Vec::new();
        let mut body = Vec::new();
        for line in block {
            let tokens = tokenize(&line);
            let tag = tokens.first().map(String::as_str).unwrap_or("");
            if tag == "DEF" {
                definition = Record::decode(tag, DEF_SCHEMA, &line, &tokens[1..]);
            } else if body.is_empty() && is_field_tag(tag) {
                let schema = if fields.is_empty() { F0_SCHEMA } else { FN_SCHEMA };
                fields.push(Record::decode(tag, schema, &line, &tokens[1..]));
            } else {
                body.push(line);
            }
        }
        LibComponent {
            comments,
            definition,
            fields,
            body,
        }
    }

    fn to_lines(&self) -> Vec<String> {
        let mut lines = self.comments.clone();
        lines.push(self.definition.encode());
        for (i, field) in self.fields.iter().enumerate() {
            let mut field = field.clone();
            field.set_tag(&format!("F{i}"));
            lines.push(field.encode());
        }
        lines.extend(self.body.iter().cloned());
        lines
    }

    /// Symbol name from the `DEF` line.
    pub fn name(&self) -> &str {
        self.definition.get("name")
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// `prefix` for F0, the default names for F1-F3, else the field's own name.
    pub fn field_name(&self, index: usize) -> String {
        match index {
            0 => PREFIX_FIELD.to_string(),
            i if i < DEFAULT_FIELD_NAMES.len() => DEFAULT_FIELD_NAMES[i].to_string(),
            i => self
                .fields
                .get(i)
                .map(|f| f.get_unquoted("fieldname"))
                .unwrap_or_default(),
        }
    }

    pub fn field_value(&self, index: usize) -> String {
        let key = if index == 0 { "reference" } else { "name" };
        self.fields
            .get(index)
            .map(|f| f.get_unquoted(key))
            .unwrap_or_default()
    }

    /// Index of the field called `name`. `reference` is accepted for F0.
    pub fn find_field(&self, name: &str) -> Option<usize> {
        if name.eq_ignore_ascii_case("reference") && !self.fields.is_empty() {
            return Some(0);
        }
        (0..self.fields.len()).find(|&i| self.field_name(i).eq_ignore_ascii_case(name))
    }

    pub fn set_field_value(&mut self, index: usize, value: &str) {
        let key = if index == 0 { "reference" } else { "name" };
        if let Some(field) = self.fields.get_mut(index) {
            field.set_quoted(key, value);
        }
    }

    pub fn set_field_visibility(&mut self, index: usize, visibility: Visibility) {
        if let Some(field) = self.fields.get_mut(index) {
            field.set("visibility", if visibility.is_visible() { "V" } else { "I" });
        }
    }

    pub fn is_field_visible(&self, index: usize) -> bool {
        self.fields
            .get(index)
            .is_some_and(|f| f.get("visibility") == "V")
    }

    /// Append a user field, reusing the placement of the last field.
    pub fn add_field(&mut self, name: &str, value: &str, visibility: Visibility) -> usize {
        let mut field = Record::new("F", FN_SCHEMA);
        if let Some(last) = self.fields.last() {
            for key in ["posx", "posy", "text_size", "text_orient", "htext_justify", "vtext_justify"] {
                field.set(key, last.get(key));
            }
        }
        field.set_quoted("name", value);
        field.set_quoted("fieldname", name);
        self.fields.push(field);
        let index = self.fields.len() - 1;
        self.set_field_visibility(index, visibility);
        index
    }

    /// Drop user fields with empty values; F0-F3 always stay.
    pub fn prune_empty_fields(&mut self) {
        let keep: Vec<bool> = (0..self.fields.len())
            .map(|i| i < DEFAULT_FIELD_NAMES.len() || !self.field_value(i).is_empty())
            .collect();
        let mut keep = keep.into_iter();
        self.fields.retain(|_| keep.next().unwrap_or(true));
    }

    /// Order user fields by name.
    pub fn sort_fields(&mut self) {
        if self.fields.len() > DEFAULT_FIELD_NAMES.len() {
            self.fields[DEFAULT_FIELD_NAMES.len()..].sort_by_key(|f| f.get_unquoted("fieldname"));
        }
    }
}

fn is_field_tag(tag: &str) -> bool {
    tag.strip_prefix('F')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIB: &str = "EESchema-LIBRARY Version 2.3
#encoding utf-8
#
# R
#
DEF R R 0 0 N Y 1 F N
F0 \"R\" 80 0 50 V V C CNN
F1 \"R\" 0 0 50 V V C CNN
F2 \"\" -70 0 50 V I C CNN
F3 \"\" 0 0 50 H I C CNN
F4 \"Yageo\" 0 0 50 H I C CNN \"Manf\"
$FPLIST
 R_*
$ENDFPLIST
DRAW
S -40 -100 40 100 0 1 10 N
X ~ 1 0 150 50 D 50 50 1 1 P
ENDDRAW
ENDDEF
#
#End Library
";

    #[test]
    fn test_roundtrip_unchanged() {
        let lib = LegacyLibrary::parse(LIB).unwrap();
        assert_eq!(lib.serialize(), LIB);
    }

    #[test]
    fn test_fields() {
        let lib = LegacyLibrary::parse(LIB).unwrap();
        let r = &lib.components()[0];
        assert_eq!(r.name(), "R");
        assert_eq!(r.field_name(0), "prefix");
        assert_eq!(r.field_value(0), "R");
        assert_eq!(r.field_name(2), "footprint");
        assert_eq!(r.field_name(4), "Manf");
        assert_eq!(r.field_value(4), "Yageo");
        assert_eq!(r.find_field("REFERENCE"), Some(0));
        assert!(lib.field_names().contains(&"Manf".to_string()));
    }

    #[test]
    fn test_add_field_and_renumber() {
        let mut lib = LegacyLibrary::parse(LIB).unwrap();
        let r = &mut lib.components_mut()[0];
        r.add_field("Dist", "Digikey", Visibility::Invisible);
        r.set_field_value(4, "");
        r.prune_empty_fields();
        r.sort_fields();
        let out = lib.serialize();
        assert!(out.contains("F4 \"Digikey\" 0 0 50 H I C CNN \"Dist\""));
        assert!(!out.contains("Yageo"));
        assert!(!out.contains("F5"));
    }

    #[test]
    fn test_missing_footer_is_written() {
        let text = "EESchema-LIBRARY Version 2.3\nDEF C C 0 10 N Y 1 F N\nF0 \"C\" 0 0 50 H V C CNN\nENDDEF\n";
        let lib = LegacyLibrary::parse(text).unwrap();
        assert!(lib.serialize().ends_with("ENDDEF\n#\n#End Library\n"));
    }
}
