//! Part field tables and the rules for merging them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::matching::{closest_match, FILTER_CUTOFF};

/// Field name to value for one part. Keys keep their original spelling;
/// lookups through [`get_field`] and [`set_field`] ignore case.
pub type FieldMap = BTreeMap<String, String>;

/// Names of the four fields every KiCad part carries, in slot order.
pub const DEFAULT_FIELD_NAMES: [&str; 4] = ["reference", "value", "footprint", "datasheet"];

/// Returns true for `reference`, `value`, `footprint` and `datasheet` in any case.
pub fn is_default_field(name: &str) -> bool {
    DEFAULT_FIELD_NAMES
        .iter()
        .any(|d| d.eq_ignore_ascii_case(name))
}

/// Slot number of a default field name.
pub fn default_field_slot(name: &str) -> Option<usize> {
    DEFAULT_FIELD_NAMES
        .iter()
        .position(|d| d.eq_ignore_ascii_case(name))
}

/// Case-insensitive field lookup.
pub fn get_field<'m>(fields: &'m FieldMap, name: &str) -> Option<&'m String> {
    fields.get(name).or_else(|| {
        fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

/// Set a field, overwriting an existing entry whose name differs only by case.
pub fn set_field(fields: &mut FieldMap, name: &str, value: &str) {
    let key = fields
        .keys()
        .find(|k| k.eq_ignore_ascii_case(name))
        .cloned()
        .unwrap_or_else(|| name.to_string());
    fields.insert(key, value.to_string());
}

/// Visibility requested for a field on insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Visible,
    Invisible,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        matches!(self, Visibility::Visible)
    }
}

const VISIBLE_MARKER: &str = "[V]";
const INVISIBLE_MARKER: &str = "[I]";

fn strip_marker(text: &str) -> (Option<Visibility>, &str) {
    if let Some(rest) = text.strip_prefix(VISIBLE_MARKER) {
        (Some(Visibility::Visible), rest)
    } else if let Some(rest) = text.strip_prefix(INVISIBLE_MARKER) {
        (Some(Visibility::Invisible), rest)
    } else {
        (None, text)
    }
}

/// A field name and value with any `[V]`/`[I]` marker removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldUpdate<'a> {
    pub name: &'a str,
    pub value: &'a str,
    pub visibility: Option<Visibility>,
}

impl<'a> FieldUpdate<'a> {
    /// Strip visibility markers. A marker on the value overrides one on the name.
    pub fn decode(name: &'a str, value: &'a str) -> Self {
        let (name_vis, name) = strip_marker(name);
        let (value_vis, value) = strip_marker(value);
        FieldUpdate {
            name,
            value,
            visibility: value_vis.or(name_vis),
        }
    }

    /// All updates for one part, in name order.
    pub fn decode_all(fields: &'a FieldMap) -> Vec<FieldUpdate<'a>> {
        fields.iter().map(|(n, v)| FieldUpdate::decode(n, v)).collect()
    }
}

/// Fields keyed by part reference (schematics, workbooks) or part name (libraries).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldTable(BTreeMap<String, FieldMap>);

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FieldMap> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldMap)> {
        self.0.iter()
    }

    pub fn insert(&mut self, key: impl Into<String>, fields: FieldMap) -> Option<FieldMap> {
        self.0.insert(key.into(), fields)
    }

    /// Every field name used by any part, deduplicated case-insensitively.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for fields in self.0.values() {
            for name in fields.keys() {
                if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names
    }

    /// Merge `from` into this table. Parts present in both take field values
    /// from `from`; parts only in `from` are added when `union` is set.
    /// An empty table always becomes a copy of `from`.
    pub fn combine(&mut self, from: &FieldTable, union: bool) {
        if self.0.is_empty() {
            self.0 = from.0.clone();
            return;
        }
        for (key, fields) in &from.0 {
            match self.0.get_mut(key) {
                Some(existing) => {
                    for (name, value) in fields {
                        set_field(existing, name, value);
                    }
                }
                None if union => {
                    self.0.insert(key.clone(), fields.clone());
                }
                None => {}
            }
        }
    }

    /// Add fields for another unit or placement of `key`. Values already
    /// recorded for the part are kept.
    pub fn merge_units(&mut self, key: &str, fields: FieldMap) {
        let existing = self.0.entry(key.to_string()).or_default();
        for (name, value) in fields {
            if get_field(existing, &name).is_none() {
                existing.insert(name, value);
            }
        }
    }

    /// Fold a whole table in with [`FieldTable::merge_units`].
    pub fn merge_units_from(&mut self, other: FieldTable) {
        for (key, fields) in other.0 {
            self.merge_units(&key, fields);
        }
    }

    /// Drop trailing line breaks and fold interior ones into a single space.
    pub fn clean_values(&mut self) {
        for fields in self.0.values_mut() {
            for value in fields.values_mut() {
                *value = clean_value(value);
            }
        }
    }
}

fn clean_value(value: &str) -> String {
    let trimmed = value.trim_end_matches(['\r', '\n']);
    let mut cleaned = String::with_capacity(trimmed.len());
    let mut in_break = false;
    for c in trimmed.chars() {
        if c == '\r' || c == '\n' {
            if !in_break {
                cleaned.push(' ');
                in_break = true;
            }
        } else {
            cleaned.push(c);
            in_break = false;
        }
    }
    cleaned
}

impl FromIterator<(String, FieldMap)> for FieldTable {
    fn from_iter<T: IntoIterator<Item = (String, FieldMap)>>(iter: T) -> Self {
        FieldTable(iter.into_iter().collect())
    }
}

impl IntoIterator for FieldTable {
    type Item = (String, FieldMap);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'t> IntoIterator for &'t FieldTable {
    type Item = (&'t String, &'t FieldMap);
    type IntoIter = std::collections::btree_map::Iter<'t, String, FieldMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Include/exclude lists applied to field names during extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl FieldFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Build a filter from command-line style names; a leading `/` or `~`
    /// marks a name to exclude.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Self {
        let mut filter = FieldFilter::default();
        for spec in specs {
            let spec = spec.as_ref();
            match spec.strip_prefix(['/', '~']) {
                Some(name) => filter.exclude.push(name.to_string()),
                None => filter.include.push(spec.to_string()),
            }
        }
        filter
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Whether a single name survives the filter.
    pub fn accepts(&self, name: &str) -> bool {
        if !self.include.is_empty()
            && closest_match(name, self.include.iter().map(String::as_str), FILTER_CUTOFF).is_none()
        {
            return false;
        }
        if !self.exclude.is_empty()
            && closest_match(name, self.exclude.iter().map(String::as_str), FILTER_CUTOFF).is_some()
        {
            return false;
        }
        true
    }

    /// Names that survive the filter, in input order.
    pub fn cull<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        names
            .iter()
            .map(AsRef::as_ref)
            .filter(|n| self.accepts(n))
            .map(str::to_string)
            .collect()
    }
}
