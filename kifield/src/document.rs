//! A loaded file of any supported format, behind one interface.

use tracing::debug;

use crate::core::KiFieldError;
use crate::extract;
use crate::fields::{FieldFilter, FieldTable};
use crate::insert;
use crate::parser::{
    decode_text, DocLibrary, FileFormat, FormatError, KicadSchematic, LegacyLibrary,
    LegacySchematic, SheetContext, SymbolLibrary,
};
use crate::workbook::{Workbook, WorkbookKind};

/// What every document type can do with a field table.
pub trait FieldDocument {
    /// File contents as they should be written to disk.
    fn serialize(&self) -> Result<Vec<u8>, FormatError>;

    /// Part fields, restricted to names that pass `filter`.
    fn extract_fields(&self, filter: &FieldFilter) -> Result<FieldTable, KiFieldError>;

    /// Write `table` into the document.
    fn insert_fields(&mut self, table: &FieldTable) -> Result<(), KiFieldError>;
}

impl FieldDocument for Workbook {
    fn serialize(&self) -> Result<Vec<u8>, FormatError> {
        self.to_bytes()
    }

    fn extract_fields(&self, filter: &FieldFilter) -> Result<FieldTable, KiFieldError> {
        extract::from_workbook(self, filter)
    }

    fn insert_fields(&mut self, table: &FieldTable) -> Result<(), KiFieldError> {
        insert::into_workbook(self, table)
    }
}

impl FieldDocument for LegacySchematic {
    fn serialize(&self) -> Result<Vec<u8>, FormatError> {
        Ok(LegacySchematic::serialize(self).into_bytes())
    }

    fn extract_fields(&self, filter: &FieldFilter) -> Result<FieldTable, KiFieldError> {
        Ok(extract::from_legacy_schematic(self, filter))
    }

    fn insert_fields(&mut self, table: &FieldTable) -> Result<(), KiFieldError> {
        insert::into_legacy_schematic(self, table);
        Ok(())
    }
}

impl FieldDocument for KicadSchematic {
    fn serialize(&self) -> Result<Vec<u8>, FormatError> {
        Ok(KicadSchematic::serialize(self).into_bytes())
    }

    fn extract_fields(&self, filter: &FieldFilter) -> Result<FieldTable, KiFieldError> {
        Ok(extract::from_kicad_schematic(self, filter))
    }

    fn insert_fields(&mut self, table: &FieldTable) -> Result<(), KiFieldError> {
        insert::into_kicad_schematic(self, table);
        Ok(())
    }
}

impl FieldDocument for LegacyLibrary {
    fn serialize(&self) -> Result<Vec<u8>, FormatError> {
        Ok(LegacyLibrary::serialize(self).into_bytes())
    }

    fn extract_fields(&self, filter: &FieldFilter) -> Result<FieldTable, KiFieldError> {
        Ok(extract::from_legacy_library(self, filter))
    }

    fn insert_fields(&mut self, table: &FieldTable) -> Result<(), KiFieldError> {
        insert::into_legacy_library(self, table);
        Ok(())
    }
}

impl FieldDocument for SymbolLibrary {
    fn serialize(&self) -> Result<Vec<u8>, FormatError> {
        Ok(SymbolLibrary::serialize(self).into_bytes())
    }

    fn extract_fields(&self, filter: &FieldFilter) -> Result<FieldTable, KiFieldError> {
        Ok(extract::from_symbol_library(self, filter))
    }

    fn insert_fields(&mut self, table: &FieldTable) -> Result<(), KiFieldError> {
        insert::into_symbol_library(self, table);
        Ok(())
    }
}

impl FieldDocument for DocLibrary {
    fn serialize(&self) -> Result<Vec<u8>, FormatError> {
        Ok(DocLibrary::serialize(self).into_bytes())
    }

    fn extract_fields(&self, filter: &FieldFilter) -> Result<FieldTable, KiFieldError> {
        Ok(extract::from_doc_library(self, filter))
    }

    fn insert_fields(&mut self, table: &FieldTable) -> Result<(), KiFieldError> {
        insert::into_doc_library(self, table);
        Ok(())
    }
}

/// A child sheet referenced from a schematic: its file name relative to the
/// parent and, for KiCad 6+ sheets, where it sits in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSheet {
    pub file: String,
    pub context: Option<SheetContext>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Workbook(Workbook),
    LegacySchematic(LegacySchematic),
    KicadSchematic(KicadSchematic),
    LegacyLibrary(LegacyLibrary),
    SymbolLibrary(SymbolLibrary),
    DocLibrary(DocLibrary),
}

impl Document {
    /// Parse file contents in the given format.
    pub fn parse(format: FileFormat, bytes: &[u8]) -> Result<Self, FormatError> {
        debug!("Parsing {} document ({} bytes)", format, bytes.len());
        let text = || decode_text(bytes);
        Ok(match format {
            FileFormat::Xlsx | FileFormat::Csv | FileFormat::Tsv => {
                Document::Workbook(Workbook::load(bytes, format)?)
            }
            FileFormat::LegacySchematic => Document::LegacySchematic(LegacySchematic::parse(text()?)?),
            FileFormat::KicadSchematic => Document::KicadSchematic(KicadSchematic::parse(text()?)?),
            FileFormat::LegacyLibrary => Document::LegacyLibrary(LegacyLibrary::parse(text()?)?),
            FileFormat::SymbolLibrary => Document::SymbolLibrary(SymbolLibrary::parse(text()?)?),
            FileFormat::DocLibrary => Document::DocLibrary(DocLibrary::parse(text()?)?),
        })
    }

    /// An empty document for formats that can be written from scratch.
    pub fn create(format: FileFormat) -> Option<Self> {
        if let Some(kind) = WorkbookKind::for_format(format) {
            return Some(Document::Workbook(Workbook::new(kind)));
        }
        match format {
            FileFormat::DocLibrary => Some(Document::DocLibrary(DocLibrary::new())),
            _ => None,
        }
    }

    /// Place a KiCad 6+ sheet in its hierarchy. Other documents are unchanged.
    pub fn with_context(self, context: Option<SheetContext>) -> Self {
        match (self, context) {
            (Document::KicadSchematic(sch), Some(context)) => {
                Document::KicadSchematic(sch.with_context(context))
            }
            (doc, _) => doc,
        }
    }

    /// Sub-sheets of a schematic, in file order.
    pub fn child_sheets(&self) -> Vec<ChildSheet> {
        match self {
            Document::LegacySchematic(sch) => sch
                .sheets()
                .filter_map(|s| s.file())
                .map(|file| ChildSheet {
                    file,
                    context: None,
                })
                .collect(),
            Document::KicadSchematic(sch) => sch
                .sheets()
                .into_iter()
                .map(|entry| ChildSheet {
                    context: Some(sch.child_context(&entry)),
                    file: entry.file,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn inner(&self) -> &dyn FieldDocument {
        match self {
            Document::Workbook(d) => d,
            Document::LegacySchematic(d) => d,
            Document::KicadSchematic(d) => d,
            Document::LegacyLibrary(d) => d,
            Document::SymbolLibrary(d) => d,
            Document::DocLibrary(d) => d,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FieldDocument {
        match self {
            Document::Workbook(d) => d,
            Document::LegacySchematic(d) => d,
            Document::KicadSchematic(d) => d,
            Document::LegacyLibrary(d) => d,
            Document::SymbolLibrary(d) => d,
            Document::DocLibrary(d) => d,
        }
    }

    /// Collapse grouped rows in a workbook. No-op for other documents.
    pub fn group(&mut self, no_range: bool) {
        if let Document::Workbook(wb) = self {
            wb.group(no_range);
        }
    }
}

impl FieldDocument for Document {
    fn serialize(&self) -> Result<Vec<u8>, FormatError> {
        self.inner().serialize()
    }

    fn extract_fields(&self, filter: &FieldFilter) -> Result<FieldTable, KiFieldError> {
        self.inner().extract_fields(filter)
    }

    fn insert_fields(&mut self, table: &FieldTable) -> Result<(), KiFieldError> {
        self.inner_mut().insert_fields(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_SCH: &str = "EESchema Schematic File Version 4
$Sheet
S 5000 3000 1000 500
U 5F0A0B0C
F0 \"Power\" 50
F1 \"power.sch\" 50
$EndSheet
$EndSCHEMATC
";

    #[test]
    fn test_dispatch_by_format() {
        let doc = Document::parse(FileFormat::LegacySchematic, ROOT_SCH.as_bytes()).unwrap();
        assert!(matches!(doc, Document::LegacySchematic(_)));
        assert_eq!(
            doc.child_sheets(),
            vec![ChildSheet {
                file: "power.sch".into(),
                context: None
            }]
        );
        assert_eq!(doc.serialize().unwrap(), ROOT_SCH.as_bytes());
    }

    #[test]
    fn test_wrong_content_for_extension() {
        let err = Document::parse(FileFormat::SymbolLibrary, ROOT_SCH.as_bytes()).unwrap_err();
        assert!(matches!(err, FormatError::Sexp(_) | FormatError::Signature { .. }));
    }

    #[test]
    fn test_create() {
        assert!(matches!(Document::create(FileFormat::Tsv), Some(Document::Workbook(_))));
        assert!(matches!(Document::create(FileFormat::DocLibrary), Some(Document::DocLibrary(_))));
        assert!(Document::create(FileFormat::LegacySchematic).is_none());
    }

    #[test]
    fn test_workbook_roundtrip_through_trait() {
        let mut doc = Document::create(FileFormat::Csv).unwrap();
        let table: FieldTable = [(
            "R1".to_string(),
            [("value".to_string(), "10k".to_string())].into_iter().collect(),
        )]
        .into_iter()
        .collect();
        doc.insert_fields(&table).unwrap();
        let bytes = doc.serialize().unwrap();
        assert_eq!(String::from_utf8(bytes.clone()).unwrap(), "Refs,value\nR1,10k\n");

        let reread = Document::parse(FileFormat::Csv, &bytes).unwrap();
        assert_eq!(reread.extract_fields(&FieldFilter::default()).unwrap(), table);
    }
}
