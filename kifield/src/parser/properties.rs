//! Symbol properties in KiCad 6+ S-expression files.
//!
//! A property looks like
//! `(property "Value" "10k" (id 1) (at 101.6 52.07 0) (effects (font (size 1.27 1.27)) hide))`.
//! KiCad 8 and later drop `(id ...)` and spell hiding `(hide yes)`.

use crate::fields::Visibility;
use crate::parser::sexp::SExp;

/// File format version from which KiCad writes `(hide yes)` instead of a bare `hide`.
const HIDE_LIST_VERSION: u64 = 20231120;

/// Vertical spacing between a new property and the reference, per property index.
pub const PROPERTY_SPACING: f64 = 2.54;

/// How a file marks hidden text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideStyle {
    /// `(effects ... hide)`
    Flag,
    /// `(effects ... (hide yes))`
    List,
}

impl HideStyle {
    /// Pick the style matching the file's `(version N)`.
    pub fn for_document(root: &SExp) -> Self {
        let version = root
            .find_list("version")
            .and_then(|v| v.nth_str(1))
            .and_then(|v| v.parse::<u64>().ok());
        match version {
            Some(v) if v >= HIDE_LIST_VERSION => HideStyle::List,
            _ => HideStyle::Flag,
        }
    }
}

pub fn name(property: &SExp) -> Option<&str> {
    property.nth_str(1)
}

pub fn value(property: &SExp) -> Option<&str> {
    property.nth_str(2)
}

fn set_item(property: &mut SExp, index: usize, text: &str) {
    if let Some(items) = property.as_list_mut() {
        if let Some(item) = items.get_mut(index) {
            *item = SExp::string(text);
        }
    }
}

pub fn set_name(property: &mut SExp, text: &str) {
    set_item(property, 1, text);
}

pub fn set_value(property: &mut SExp, text: &str) {
    set_item(property, 2, text);
}

pub fn id(property: &SExp) -> Option<i64> {
    property.find_list("id")?.nth_str(1)?.parse().ok()
}

/// Replace `(id N)` if the property has one.
pub fn set_id(property: &mut SExp, new_id: usize) {
    if let Some(items) = property.find_list_mut("id").and_then(SExp::as_list_mut) {
        if items.len() >= 2 {
            items[1] = SExp::atom(new_id.to_string());
        }
    }
}

fn hide_list_value(list: &SExp) -> Option<bool> {
    list.find_list("hide")
        .map(|h| !matches!(h.nth_str(1), Some("no")))
}

pub fn is_hidden(property: &SExp) -> bool {
    if let Some(hidden) = hide_list_value(property) {
        return hidden;
    }
    match property.find_list("effects") {
        Some(effects) => effects.has_atom("hide") || hide_list_value(effects).unwrap_or(false),
        None => false,
    }
}

fn set_hide_list(list: &mut SExp, hidden: bool) -> bool {
    match list.find_list_mut("hide").and_then(SExp::as_list_mut) {
        Some(items) => {
            let flag = SExp::atom(if hidden { "yes" } else { "no" });
            if items.len() >= 2 {
                items[1] = flag;
            } else {
                items.push(flag);
            }
            true
        }
        None => false,
    }
}

/// Show or hide a property, following whatever hide syntax it already uses.
pub fn set_visibility(property: &mut SExp, visibility: Visibility, style: HideStyle) {
    let hidden = !visibility.is_visible();
    if set_hide_list(property, hidden) {
        return;
    }
    if property.find_list("effects").is_none() {
        if let Some(items) = property.as_list_mut() {
            items.push(SExp::List(vec![
                SExp::atom("effects"),
                SExp::List(vec![
                    SExp::atom("font"),
                    SExp::List(vec![SExp::atom("size"), SExp::atom("1.27"), SExp::atom("1.27")]),
                ]),
            ]));
        }
    }
    let Some(effects) = property.find_list_mut("effects") else {
        return;
    };
    if set_hide_list(effects, hidden) {
        return;
    }
    if let Some(items) = effects.as_list_mut() {
        items.retain(|i| !matches!(i, SExp::Atom(s) if s == "hide"));
        if hidden {
            match style {
                HideStyle::Flag => items.push(SExp::atom("hide")),
                HideStyle::List => {
                    items.push(SExp::List(vec![SExp::atom("hide"), SExp::atom("yes")]))
                }
            }
        }
    }
}

/// Move a property down (positive `dy`) by editing its `(at x y angle)`.
pub fn offset_y(property: &mut SExp, dy: f64) {
    let Some(items) = property.find_list_mut("at").and_then(SExp::as_list_mut) else {
        return;
    };
    if let Some(y) = items.get(2).and_then(SExp::as_atom).and_then(|y| y.parse::<f64>().ok()) {
        items[2] = SExp::atom(format_coord(y + dy));
    }
}

/// Millimetre coordinate in KiCad's style: at most four decimals, no trailing zeros.
pub fn format_coord(v: f64) -> String {
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Positions of the `property` lists among a symbol's items.
pub fn property_slots(symbol: &SExp) -> Vec<usize> {
    symbol
        .as_list()
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter(|(_, i)| i.is_tagged("property"))
                .map(|(n, _)| n)
                .collect()
        })
        .unwrap_or_default()
}

pub fn properties(symbol: &SExp) -> impl Iterator<Item = &SExp> {
    symbol
        .as_list()
        .unwrap_or(&[])
        .iter()
        .filter(|i| i.is_tagged("property"))
}

/// Item index of the property called `wanted`, ignoring case.
pub fn find(symbol: &SExp, wanted: &str) -> Option<usize> {
    symbol.as_list()?.iter().position(|i| {
        i.is_tagged("property") && name(i).is_some_and(|n| n.eq_ignore_ascii_case(wanted))
    })
}

pub fn get_mut<'s>(symbol: &'s mut SExp, index: usize) -> Option<&'s mut SExp> {
    symbol.as_list_mut()?.get_mut(index)
}

/// Value of the property called `wanted`.
pub fn lookup<'s>(symbol: &'s SExp, wanted: &str) -> Option<&'s str> {
    find(symbol, wanted).and_then(|i| symbol.nth(i)).and_then(value)
}

/// Add a property modelled on the `Reference` property: same placement,
/// shifted down by its index, hidden unless asked to be visible.
/// Returns false when the symbol has no `Reference` to copy.
pub fn add(
    symbol: &mut SExp,
    new_name: &str,
    new_value: &str,
    visibility: Option<Visibility>,
    style: HideStyle,
) -> bool {
    let slots = property_slots(symbol);
    let Some(template) = find(symbol, "Reference").and_then(|i| symbol.nth(i)).cloned() else {
        return false;
    };
    let mut property = template;
    let index = slots.len();
    set_name(&mut property, new_name);
    set_value(&mut property, new_value);
    set_id(&mut property, index);
    offset_y(&mut property, PROPERTY_SPACING * index as f64);
    set_visibility(&mut property, visibility.unwrap_or(Visibility::Invisible), style);

    let insert_at = slots.last().map(|i| i + 1).unwrap_or(1);
    if let Some(items) = symbol.as_list_mut() {
        let insert_at = insert_at.min(items.len());
        items.insert(insert_at, property);
    }
    true
}

/// Remove the property at item `index`.
pub fn remove(symbol: &mut SExp, index: usize) {
    if let Some(items) = symbol.as_list_mut() {
        if index < items.len() && items[index].is_tagged("property") {
            items.remove(index);
        }
    }
}

/// Keep properties named in `defaults` first, in their existing order,
/// followed by the rest sorted by name. Ids are renumbered where present.
pub fn sort(symbol: &mut SExp, defaults: &[&str]) {
    let slots = property_slots(symbol);
    let Some(items) = symbol.as_list_mut() else {
        return;
    };
    let is_default = |p: &SExp| {
        name(p).is_some_and(|n| defaults.iter().any(|d| d.eq_ignore_ascii_case(n)))
    };
    let props: Vec<SExp> = slots.iter().map(|&i| items[i].clone()).collect();
    let (mut ordered, mut rest): (Vec<SExp>, Vec<SExp>) = props.into_iter().partition(|p| is_default(p));
    rest.sort_by(|a, b| name(a).cmp(&name(b)));
    ordered.append(&mut rest);
    for (n, (slot, mut property)) in slots.iter().zip(ordered).enumerate() {
        if id(&property).is_some() {
            set_id(&mut property, n);
        }
        items[*slot] = property;
    }
}
