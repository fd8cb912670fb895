//! KiCad Legacy Schematic Format (Versions 4-5)
//!
//! A legacy `.sch` file is a header line followed by line-oriented records.
//! Parts live in `$Comp ... $EndComp` blocks and hierarchical sheets in
//! `$Sheet ... $EndSheet` blocks. Everything else (wires, labels, the page
//! description) is carried through untouched in its original order.
//!
//! Component block layout:
//! - `L <lib name> <ref>`
//! - `U <unit> <convert> <timestamp>`
//! - `P <x> <y>`
//! - `AR Path="/..." Ref="R1" Part="1"` (one per hierarchical placement)
//! - `F <id> "<value>" <orient> <x> <y> <size> <attributs> <hjust> <props> ["<name>"]`
//! - tab-indented position/orientation lines

use crate::fields::{Visibility, DEFAULT_FIELD_NAMES};
use crate::parser::tokens::{keyed_value, tokenize, unquote, Record, Schema};
use crate::parser::{first_line, line_ending, FormatError};

pub const SCHEMATIC_SIGNATURE: &str = "EESchema Schematic File";

const L_SCHEMA: Schema = &[("name", ""), ("ref", "")];
const AR_SCHEMA: Schema = &[("path", ""), ("ref", ""), ("part", "")];
const F_SCHEMA: Schema = &[
    ("id", ""),
    ("ref", "\"\""),
    ("orient", "H"),
    ("posx", "0"),
    ("posy", "0"),
    ("size", "50"),
    ("attributs", "0001"),
    ("hjust", "C"),
    ("props", "CNN"),
    ("name", "\"~\""),
];

const VISIBLE_CODE: &str = "0000";
const INVISIBLE_CODE: &str = "0001";

/// Distance below the reference field at which new fields are placed (mils).
const NEW_FIELD_OFFSET: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
enum SchItem {
    Line(String),
    Component(LegacyComponent),
    Sheet(LegacySheet),
}

/// A parsed legacy schematic sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacySchematic {
    header: String,
    items: Vec<SchItem>,
    newline: &'static str,
}

impl LegacySchematic {
    pub fn parse(content: &str) -> Result<Self, FormatError> {
        let mut lines = content.lines();
        let header = lines.next().unwrap_or("");
        if !header.contains(SCHEMATIC_SIGNATURE) {
            return Err(FormatError::Signature {
                expected: "KiCad legacy schematic",
                found: first_line(content),
            });
        }

        let mut items = Vec::new();
        while let Some(line) = lines.next() {
            if line.starts_with("$Comp") {
                let block = collect_block(line, &mut lines, "$EndComp")?;
                items.push(SchItem::Component(LegacyComponent::from_block(block)));
            } else if line.starts_with("$Sheet") {
                let block = collect_block(line, &mut lines, "$EndSheet")?;
                items.push(SchItem::Sheet(LegacySheet { lines: block }));
            } else {
                items.push(SchItem::Line(line.to_string()));
            }
        }

        Ok(LegacySchematic {
            header: header.to_string(),
            items,
            newline: line_ending(content),
        })
    }

    pub fn serialize(&self) -> String {
        let mut lines: Vec<String> = vec![self.header.clone()];
        for item in &self.items {
            match item {
                SchItem::Line(line) => lines.push(line.clone()),
                SchItem::Component(component) => lines.extend(component.to_lines()),
                SchItem::Sheet(sheet) => lines.extend(sheet.lines.iter().cloned()),
            }
        }
        let mut out = lines.join(self.newline);
        out.push_str(self.newline);
        out
    }

    pub fn components(&self) -> impl Iterator<Item = &LegacyComponent> {
        self.items.iter().filter_map(|item| match item {
            SchItem::Component(c) => Some(c),
            _ => None,
        })
    }

    pub fn components_mut(&mut self) -> impl Iterator<Item = &mut LegacyComponent> {
        self.items.iter_mut().filter_map(|item| match item {
            SchItem::Component(c) => Some(c),
            _ => None,
        })
    }

    pub fn sheets(&self) -> impl Iterator<Item = &LegacySheet> {
        self.items.iter().filter_map(|item| match item {
            SchItem::Sheet(s) => Some(s),
            _ => None,
        })
    }

    /// Default field names plus every named field used by any component.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = DEFAULT_FIELD_NAMES.iter().map(|s| s.to_string()).collect();
        for component in self.components() {
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

fn collect_block<'a>(
    first: &str,
    lines: &mut impl Iterator<Item = &'a str>,
    end_tag: &str,
) -> Result<Vec<String>, FormatError> {
    let mut block = vec![first.to_string()];
    for line in lines.by_ref() {
        block.push(line.to_string());
        if line.starts_with(end_tag) {
            return Ok(block);
        }
    }
    Err(FormatError::Syntax(format!("{first} block without {end_tag}")))
}

/// A hierarchical sheet block, kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacySheet {
    lines: Vec<String>,
}

impl LegacySheet {
    fn field(&self, id: &str) -> Option<String> {
        self.lines.iter().find_map(|line| {
            let tokens = tokenize(line);
            match tokens.as_slice() {
                [tag, value, ..] if tag == id => Some(unquote(value)),
                _ => None,
            }
        })
    }

    /// Sheet name (`F0`).
    pub fn name(&self) -> Option<String> {
        self.field("F0")
    }

    /// Child schematic file, relative to the parent (`F1`).
    pub fn file(&self) -> Option<String> {
        self.field("F1").filter(|f| !f.is_empty())
    }
}

/// One `$Comp` block.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyComponent {
    head: Vec<String>,
    label: Option<Record>,
    references: Vec<Record>,
    fields: Vec<Record>,
    tail: Vec<String>,
}

impl LegacyComponent {
    fn from_block(block: Vec<String>) -> Self {
        let mut component = LegacyComponent {
            head: Vec::new(),
            label: None,
            references: Vec::new(),
            fields: Vec::new(),
            tail: Vec::new(),
        };
        let last = block.len().saturating_sub(1);
        for (i, line) in block.into_iter().enumerate() {
            let tokens = if i == 0 || i == last || line.starts_with('\t') {
                Vec::new()
            } else {
                tokenize(&line)
            };
            match tokens.first().map(String::as_str) {
                Some("F") => {
                    let record = Record::decode("F", F_SCHEMA, &line, &tokens[1..]);
                    component.fields.push(record);
                    continue;
                }
                Some("L") => {
                    component.label = Some(Record::decode("L", L_SCHEMA, &line, &tokens[1..]));
                }
                Some("AR") => {
                    let record = Record::decode("AR", AR_SCHEMA, &line, &tokens[1..]);
                    component.references.push(record);
                }
                _ => {}
            }
            if component.fields.is_empty() {
                component.head.push(line);
            } else {
                component.tail.push(line);
            }
        }
        component
    }

    fn to_lines(&self) -> Vec<String> {
        let mut lines = self.head.clone();
        lines.extend(self.fields.iter().map(Record::encode));
        lines.extend(self.tail.iter().cloned());
        lines
    }

    /// Library symbol name from the `L` line.
    pub fn lib_name(&self) -> String {
        self.label.as_ref().map(|l| l.get("name").to_string()).unwrap_or_default()
    }

    /// Every reference this component is known by: one per `AR` placement
    /// plus the one on its `L` line. Sorted, without duplicates.
    pub fn refs(&self) -> Vec<String> {
        let mut refs: Vec<String> = self
            .references
            .iter()
            .filter_map(|r| keyed_value(r.get("ref")))
            .collect();
        if let Some(label) = &self.label {
            let reference = label.get("ref");
            if !reference.is_empty() {
                refs.push(reference.to_string());
            }
        }
        refs.sort();
        refs.dedup();
        refs
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn field_id(&self, index: usize) -> Option<usize> {
        self.fields.get(index).and_then(|f| f.get("id").parse().ok())
    }

    /// Field name; the four default fields are named by slot when unnamed.
    pub fn field_name(&self, index: usize) -> String {
        let Some(field) = self.fields.get(index) else {
            return String::new();
        };
        let name = field.get_unquoted("name");
        if !name.is_empty() && name != "~" {
            return name;
        }
        match self.field_id(index) {
            Some(id) if id < DEFAULT_FIELD_NAMES.len() => DEFAULT_FIELD_NAMES[id].to_string(),
            _ => String::new(),
        }
    }

    pub fn field_value(&self, index: usize) -> String {
        self.fields
            .get(index)
            .map(|f| f.get_unquoted("ref"))
            .unwrap_or_default()
    }

    /// Index of the field whose name matches, ignoring case.
    pub fn find_field(&self, name: &str) -> Option<usize> {
        (0..self.fields.len()).find(|&i| self.field_name(i).eq_ignore_ascii_case(name))
    }

    /// Index of the field in a default slot.
    pub fn find_slot(&self, slot: usize) -> Option<usize> {
        (0..self.fields.len()).find(|&i| self.field_id(i) == Some(slot))
    }

    pub fn set_field_value(&mut self, index: usize, value: &str) {
        if let Some(field) = self.fields.get_mut(index) {
            field.set_quoted("ref", value);
        }
    }

    pub fn set_field_visibility(&mut self, index: usize, visibility: Visibility) {
        if let Some(field) = self.fields.get_mut(index) {
            let code = if visibility.is_visible() {
                VISIBLE_CODE
            } else {
                INVISIBLE_CODE
            };
            field.set("attributs", code);
        }
    }

    pub fn is_field_visible(&self, index: usize) -> bool {
        self.fields
            .get(index)
            .is_some_and(|f| f.get("attributs") == VISIBLE_CODE)
    }

    /// Append a named field just below the reference field.
    pub fn add_field(&mut self, name: &str, value: &str, visibility: Visibility) -> usize {
        let mut field = Record::new("F", F_SCHEMA);
        field.set("id", self.fields.len().to_string());
        field.set_quoted("ref", value);
        field.set_quoted("name", name);
        if let Some(reference) = self.fields.first() {
            field.set("posx", reference.get("posx"));
            let posy = reference
                .get("posy")
                .parse::<i64>()
                .map(|y| (y + NEW_FIELD_OFFSET).to_string())
                .unwrap_or_else(|_| reference.get("posy").to_string());
            field.set("posy", posy);
        }
        self.fields.push(field);
        let index = self.fields.len() - 1;
        self.set_field_visibility(index, visibility);
        index
    }

    /// Drop named fields whose value is empty; default slots always stay.
    pub fn prune_empty_fields(&mut self) {
        let keep: Vec<bool> = (0..self.fields.len())
            .map(|i| {
                self.field_id(i).is_some_and(|id| id < DEFAULT_FIELD_NAMES.len())
                    || !self.field_value(i).is_empty()
            })
            .collect();
        let mut keep = keep.into_iter();
        self.fields.retain(|_| keep.next().unwrap_or(true));
    }

    /// Order the named fields after the four defaults by name and renumber them.
    pub fn sort_fields(&mut self) {
        if self.fields.len() <= DEFAULT_FIELD_NAMES.len() {
            return;
        }
        let mut named = self.fields.split_off(DEFAULT_FIELD_NAMES.len());
        named.sort_by_key(|f| f.get_unquoted("name"));
        for (id, field) in named.iter_mut().enumerate() {
            field.set("id", (id + DEFAULT_FIELD_NAMES.len()).to_string());
        }
        self.fields.extend(named);
    }
}
