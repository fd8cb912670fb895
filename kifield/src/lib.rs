//! KiField - move part fields between KiCad files and spreadsheets
//!
//! Fields such as value, footprint, manufacturer part number or any custom
//! field are read from schematics, symbol libraries, documentation files and
//! spreadsheets into a table keyed by part reference, then written back into
//! any other supported file.
//!
//! # Quick Start
//!
//! ```no_run
//! use kifield::{KiFieldCore, KiFieldOptions, WriteSession};
//! use std::path::PathBuf;
//!
//! let options = KiFieldOptions::default();
//! let report = KiFieldCore::run(
//!     &[PathBuf::from("board.sch")],
//!     &[PathBuf::from("bom.xlsx")],
//!     &options,
//!     WriteSession::for_options(&options, 0),
//! );
//!
//! println!("{} parts, {} files updated", report.parts, report.inserted_files.len());
//! ```
//!
//! # Formats
//!
//! - **Spreadsheets**: `.xlsx`, `.csv`, `.tsv`
//! - **Schematics**: `.sch` (KiCad 4-5), `.kicad_sch` (KiCad 6+)
//! - **Symbol libraries**: `.lib` (KiCad 4-5), `.kicad_sym` (KiCad 6+)
//! - **Documentation**: `.dcm`

pub mod core;
pub mod document;
pub mod extract;
pub mod fields;
pub mod insert;
pub mod matching;
pub mod parser;
pub mod refs;
pub mod workbook;

// Re-export main types
pub use core::{
    backup_path, KiFieldCore, KiFieldError, KiFieldOptions, RunReport, SkippedFile, WriteSession,
    MAX_SHEET_DEPTH,
};
pub use document::{Document, FieldDocument};
pub use fields::{FieldFilter, FieldMap, FieldTable, FieldUpdate, Visibility};
pub use parser::{detect_format, FileFormat, FormatError};
pub use refs::{collapse, explode};
pub use workbook::Workbook;

/// Read part fields from files (convenience wrapper).
pub fn extract_fields(
    files: &[std::path::PathBuf],
    filter: FieldFilter,
) -> FieldTable {
    let options = KiFieldOptions {
        filter,
        ..Default::default()
    };
    let mut session = WriteSession::for_options(&options, 0);
    KiFieldCore::extract_part_fields(files, &options, &mut session)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        FieldDocument, FieldFilter, FieldTable, FileFormat, KiFieldCore, KiFieldError,
        KiFieldOptions, RunReport, WriteSession,
    };
}
