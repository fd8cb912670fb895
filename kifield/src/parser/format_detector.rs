//! File format detection.
//!
//! Each supported file type is recognised by its extension. The parsers
//! check the header of the content themselves.

use std::fmt;
use std::path::Path;

/// Every file type part fields can be read from or written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Excel workbook
    Xlsx,
    /// Comma-separated values
    Csv,
    /// Tab-separated values
    Tsv,
    /// KiCad 4-5 schematic
    LegacySchematic,
    /// KiCad 6+ schematic
    KicadSchematic,
    /// KiCad 4-5 symbol library
    LegacyLibrary,
    /// KiCad 6+ symbol library
    SymbolLibrary,
    /// KiCad 4-5 symbol documentation library
    DocLibrary,
}

const FORMAT_TABLE: &[(&str, FileFormat)] = &[
    ("xlsx", FileFormat::Xlsx),
    ("csv", FileFormat::Csv),
    ("tsv", FileFormat::Tsv),
    ("sch", FileFormat::LegacySchematic),
    ("kicad_sch", FileFormat::KicadSchematic),
    ("lib", FileFormat::LegacyLibrary),
    ("kicad_sym", FileFormat::SymbolLibrary),
    ("dcm", FileFormat::DocLibrary),
];

impl FileFormat {
    /// Get format name for display
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Xlsx => "XLSX workbook",
            FileFormat::Csv => "CSV file",
            FileFormat::Tsv => "TSV file",
            FileFormat::LegacySchematic => "KiCad 5 schematic",
            FileFormat::KicadSchematic => "KiCad 6+ schematic",
            FileFormat::LegacyLibrary => "KiCad 5 library",
            FileFormat::SymbolLibrary => "KiCad 6+ symbol library",
            FileFormat::DocLibrary => "KiCad 5 documentation library",
        }
    }

    /// Look up a format by file extension, ignoring case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        FORMAT_TABLE
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, f)| *f)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Spreadsheet-like formats.
    pub fn is_workbook(&self) -> bool {
        matches!(self, FileFormat::Xlsx | FileFormat::Csv | FileFormat::Tsv)
    }

    /// Formats that can reference child sheets.
    pub fn is_schematic(&self) -> bool {
        matches!(self, FileFormat::LegacySchematic | FileFormat::KicadSchematic)
    }

    /// Formats a destination file may be created from scratch in.
    pub fn can_create(&self) -> bool {
        self.is_workbook() || matches!(self, FileFormat::DocLibrary)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the format of a file from its extension.
pub fn detect_format(path: &Path) -> Option<FileFormat> {
    FileFormat::from_path(path)
}
