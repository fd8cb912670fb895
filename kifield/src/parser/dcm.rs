//! KiCad 4-5 symbol documentation library (`.dcm`).

use crate::parser::{first_line, line_ending, FormatError};

pub const DOCLIB_SIGNATURE: &str = "EESchema-DOCLIB";
pub const DOCLIB_HEADER: &str = "EESchema-DOCLIB  Version 2.0";
const DOCLIB_FOOTER: &str = "#End Doc Library";

/// Field names a `.dcm` entry can carry, in file order (`D`, `K`, `F`).
pub const DOC_FIELDS: [&str; 3] = ["description", "keywords", "docfile"];

/// Documentation for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocComponent {
    pub name: String,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub docfile: Option<String>,
}

impl DocComponent {
    pub fn new(name: impl Into<String>) -> Self {
        DocComponent {
            name: name.into(),
            ..Default::default()
        }
    }

    fn slot(&self, field: &str) -> Option<&Option<String>> {
        match field.to_ascii_lowercase().as_str() {
            "description" => Some(&self.description),
            "keywords" => Some(&self.keywords),
            "docfile" => Some(&self.docfile),
            _ => None,
        }
    }

    fn slot_mut(&mut self, field: &str) -> Option<&mut Option<String>> {
        match field.to_ascii_lowercase().as_str() {
            "description" => Some(&mut self.description),
            "keywords" => Some(&mut self.keywords),
            "docfile" => Some(&mut self.docfile),
            _ => None,
        }
    }

    /// Value of a documentation field, matched case-insensitively.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.slot(field).and_then(|v| v.as_deref())
    }

    /// Set a documentation field. Returns false for names that aren't one
    /// of [`DOC_FIELDS`].
    pub fn set(&mut self, field: &str, value: &str) -> bool {
        match self.slot_mut(field) {
            Some(slot) => {
                *slot = Some(value.to_string());
                true
            }
            None => false,
        }
    }

    fn to_lines(&self) -> Vec<String> {
        let mut lines = vec!["#".to_string(), format!("$CMP {}", self.name)];
        for (tag, value) in [
            ("D", &self.description),
            ("K", &self.keywords),
            ("F", &self.docfile),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                lines.push(format!("{tag} {value}"));
            }
        }
        lines.push("$ENDCMP".to_string());
        lines
    }
}

/// A parsed `.dcm` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocLibrary {
    header: String,
    components: Vec<DocComponent>,
    newline: &'static str,
}

impl Default for DocLibrary {
    fn default() -> Self {
        DocLibrary {
            header: DOCLIB_HEADER.to_string(),
            components: Vec::new(),
            newline: "\n",
        }
    }
}

impl DocLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(content: &str) -> Result<Self, FormatError> {
        let mut lines = content.lines();
        let header = lines.next().unwrap_or("");
        if !header.starts_with(DOCLIB_SIGNATURE) {
            return Err(FormatError::Signature {
                expected: "KiCad documentation library",
                found: first_line(content),
            });
        }

        let mut components = Vec::new();
        let mut current: Option<DocComponent> = None;
        for line in lines {
            let line = line.trim_end();
            let (tag, contents) = match line.split_once(char::is_whitespace) {
                Some((tag, rest)) => (tag, rest.trim_start()),
                None => (line, ""),
            };
            match tag.to_ascii_uppercase().as_str() {
                "$CMP" => current = Some(DocComponent::new(contents)),
                "$ENDCMP" => components.extend(current.take()),
                "D" => set_current(&mut current, "description", contents),
                "K" => set_current(&mut current, "keywords", contents),
                "F" => set_current(&mut current, "docfile", contents),
                _ => {}
            }
        }

        Ok(DocLibrary {
            header: header.to_string(),
            components,
            newline: line_ending(content),
        })
    }

    pub fn serialize(&self) -> String {
        let mut lines = vec![self.header.clone()];
        for component in &self.components {
            lines.extend(component.to_lines());
        }
        lines.push("#".to_string());
        lines.push(DOCLIB_FOOTER.to_string());
        let mut out = lines.join(self.newline);
        out.push_str(self.newline);
        out
    }

    pub fn components(&self) -> &[DocComponent] {
        &self.components
    }

    /// Component by name, ignoring case.
    pub fn component_mut(&mut self, name: &str) -> Option<&mut DocComponent> {
        self.components
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Add a component, replacing one of the same name.
    pub fn upsert(&mut self, component: DocComponent) {
        match self.component_mut(&component.name) {
            Some(existing) => *existing = component,
            None => self.components.push(component),
        }
    }
}

fn set_current(current: &mut Option<DocComponent>, field: &str, value: &str) {
    if let Some(component) = current {
        component.set(field, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DCM: &str = "EESchema-DOCLIB  Version 2.0
#
$CMP LM358
D Dual operational amplifier
K dual opamp
F http://www.ti.com/lit/ds/symlink/lm358.pdf
$ENDCMP
#
$CMP R
D Resistor
$ENDCMP
#
#End Doc Library
";

    #[test]
    fn test_roundtrip_unchanged() {
        let dcm = DocLibrary::parse(DCM).unwrap();
        assert_eq!(dcm.serialize(), DCM);
    }

    #[test]
    fn test_parse_fields() {
        let dcm = DocLibrary::parse(DCM).unwrap();
        let lm358 = &dcm.components()[0];
        assert_eq!(lm358.name, "LM358");
        assert_eq!(lm358.get("Description"), Some("Dual operational amplifier"));
        assert_eq!(lm358.get("keywords"), Some("dual opamp"));
        assert_eq!(dcm.components()[1].get("docfile"), None);
    }

    #[test]
    fn test_new_library() {
        let mut dcm = DocLibrary::new();
        let mut c = DocComponent::new("U1");
        assert!(c.set("keywords", "mcu"));
        assert!(!c.set("value", "x"));
        dcm.upsert(c);
        assert_eq!(
            dcm.serialize(),
            "EESchema-DOCLIB  Version 2.0\n#\n$CMP U1\nK mcu\n$ENDCMP\n#\n#End Doc Library\n"
        );
    }

    #[test]
    fn test_rejects_other_files() {
        assert!(DocLibrary::parse("EESchema-LIBRARY Version 2.3\n").is_err());
    }
}
