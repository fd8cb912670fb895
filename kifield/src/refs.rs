//! Reference designator lists.
//!
//! A part reference such as `C12` splits into an alphabetic prefix (`C`) and a
//! numeric suffix (`12`). Spreadsheets store lists of references in a compact
//! form (`C1-C4, C7`); [`explode`] expands that form and [`collapse`] produces it.

use std::cmp::Ordering;

/// Sort key for a part reference: prefix compared ordinally, suffix numerically.
///
/// References that don't split into `<prefix><digits>` (e.g. `U1A`, `J_PWR`)
/// sort after the decomposable ones with the same leading text and never join
/// a numeric run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefKey<'a> {
    pub prefix: &'a str,
    pub number: Option<u64>,
    pub text: &'a str,
}

impl<'a> RefKey<'a> {
    pub fn new(reference: &'a str) -> Self {
        match decompose(reference) {
            Some((prefix, number)) => RefKey {
                prefix,
                number: Some(number),
                text: reference,
            },
            None => RefKey {
                prefix: reference,
                number: None,
                text: reference,
            },
        }
    }

    fn follows(&self, prev: &RefKey<'_>) -> bool {
        match (prev.number, self.number) {
            (Some(a), Some(b)) => prev.prefix == self.prefix && a.checked_add(1) == Some(b),
            _ => false,
        }
    }
}

impl Ord for RefKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prefix
            .cmp(other.prefix)
            .then_with(|| match (self.number, other.number) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| self.text.cmp(other.text))
    }
}

impl PartialOrd for RefKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two references the way [`collapse`] orders them.
pub fn cmp_refs(a: &str, b: &str) -> Ordering {
    RefKey::new(a).cmp(&RefKey::new(b))
}

/// Sort references in place by (prefix, number).
pub fn sort_refs<S: AsRef<str>>(refs: &mut [S]) {
    refs.sort_by(|a, b| cmp_refs(a.as_ref(), b.as_ref()));
}

/// Split `C12` into `("C", 12)`. The prefix must be non-empty and contain no
/// digits; the suffix must be all digits.
pub fn decompose(reference: &str) -> Option<(&str, u64)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (prefix, digits) = reference.split_at(split);
    if prefix.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|n| (prefix, n))
}

/// Expand a token like `C1-C3` or `C1 : C3` into its bounds.
fn parse_range(token: &str) -> Option<(&str, u64, u64)> {
    for (idx, sep) in token.char_indices().filter(|(_, c)| *c == '-' || *c == ':') {
        let left = token[..idx].trim();
        let right = token[idx + sep.len_utf8()..].trim();
        if let (Some((p1, start)), Some((p2, end))) = (decompose(left), decompose(right)) {
            if p1 == p2 {
                return Some((p1, start, end));
            }
        }
    }
    None
}

/// Explode `"C1-C3, C7; R2"` into `["C1", "C2", "C3", "C7", "R2"]`.
///
/// Tokens are split on `,` or `;`. A range whose end precedes its start
/// expands to nothing. Blank tokens are dropped. Token order is kept.
pub fn explode(collapsed: &str) -> Vec<String> {
    let mut refs = Vec::new();
    for token in collapsed.split([',', ';']) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match parse_range(token) {
            Some((prefix, start, end)) => {
                refs.extend((start..=end).map(|n| format!("{prefix}{n}")));
            }
            None => refs.push(token.to_string()),
        }
    }
    refs
}

/// Collapse references into the compact `C1-C3, C7` form.
///
/// Runs of three or more consecutive suffixes with the same prefix become
/// `first-last`; shorter runs are listed individually.
pub fn collapse<S: AsRef<str>>(refs: &[S]) -> String {
    let mut keys: Vec<RefKey<'_>> = refs.iter().map(|r| RefKey::new(r.as_ref())).collect();
    keys.sort();

    let mut groups: Vec<Vec<&RefKey<'_>>> = Vec::new();
    for key in &keys {
        let joins = groups
            .last()
            .and_then(|group| group.last())
            .is_some_and(|prev| key.follows(prev));
        match groups.last_mut() {
            Some(group) if joins => group.push(key),
            _ => groups.push(vec![key]),
        };
    }

    groups
        .iter()
        .map(|group| match group.as_slice() {
            [first, .., last] if group.len() > 2 => format!("{}-{}", first.text, last.text),
            members => members
                .iter()
                .map(|k| k.text)
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Part references that never carry fields: power flags (`#PWR01`) and
/// unannotated parts (`R?`).
pub fn is_pseudo_ref(reference: &str) -> bool {
    reference.starts_with('#') || reference.ends_with('?')
}
