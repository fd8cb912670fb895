pub mod dcm;
pub mod format_detector;
pub mod kicad_legacy;
pub mod kicad_sch;
pub mod kicad_sym;
pub mod properties;
pub mod schlib;
pub mod sexp;
pub mod tokens;

// Re-export for convenience
pub use dcm::{DocComponent, DocLibrary};
pub use format_detector::{detect_format, FileFormat};
pub use kicad_legacy::{LegacyComponent, LegacySchematic, LegacySheet};
pub use kicad_sch::{KicadSchematic, SheetContext};
pub use kicad_sym::SymbolLibrary;
pub use schlib::{LegacyLibrary, LibComponent};
pub use sexp::{ParseError, SExp, SExpParser};

/// Error type for reading and writing the supported file formats.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("Not a {expected}: {found:?}")]
    Signature { expected: &'static str, found: String },
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("S-expression error: {0}")]
    Sexp(#[from] ParseError),
    #[error("Invalid text encoding: {0}")]
    Encoding(String),
    #[error("Workbook error: {0}")]
    Workbook(String),
}

/// Decode file bytes as UTF-8, dropping a leading byte-order mark.
pub fn decode_text(bytes: &[u8]) -> Result<&str, FormatError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|e| FormatError::Encoding(e.to_string()))
}

/// First line of `text`, used in signature errors.
pub(crate) fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").chars().take(60).collect()
}

/// Line terminator used by `text` (`\r\n` if its first line ends that way).
pub(crate) fn line_ending(text: &str) -> &'static str {
    match text.find('\n') {
        Some(i) if i > 0 && text.as_bytes()[i - 1] == b'\r' => "\r\n",
        _ => "\n",
    }
}
