//! Extraction and insertion runs over lists of files.
//! Shared by the library API and the CLI.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::{Document, FieldDocument};
use crate::fields::{FieldFilter, FieldTable};
use crate::parser::{FileFormat, FormatError, SheetContext};

/// Sheets nested deeper than this are not followed.
pub const MAX_SHEET_DEPTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KiFieldError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Format(#[from] FormatError),
    #[error("Cannot extract fields: {0}")]
    FieldExtraction(String),
    #[error("No column labelled {0:?}")]
    LabelNotFound(String),
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Unsupported file type: {}", .0.display())]
    UnsupportedExtension(PathBuf),
}

/// Options for extraction and insertion runs.
#[derive(Clone, Debug)]
pub struct KiFieldOptions {
    /// Field names to keep or drop while extracting.
    pub filter: FieldFilter,
    /// Follow hierarchical sheets of schematics.
    pub recurse: bool,
    /// Merge identical workbook rows after insertion.
    pub group_components: bool,
    /// Write grouped references as a plain list instead of ranges.
    pub no_range: bool,
    /// Copy files to `<file>.<n>.bak` before their first overwrite.
    pub backup: bool,
}

impl Default for KiFieldOptions {
    fn default() -> Self {
        Self {
            filter: FieldFilter::default(),
            recurse: false,
            group_components: false,
            no_range: false,
            backup: true,
        }
    }
}

/// A file that was left out of a run, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub extracted_files: Vec<PathBuf>,
    pub inserted_files: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
    /// Number of parts in the extracted table.
    pub parts: usize,
    pub backups: Vec<PathBuf>,
}

impl RunReport {
    pub fn has_skipped(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// State for one run: which files were already backed up, and what has
/// been read, written or skipped so far.
#[derive(Debug, Default)]
pub struct WriteSession {
    backup: bool,
    verbosity: u8,
    backed_up: HashSet<PathBuf>,
    report: RunReport,
}

impl WriteSession {
    /// `verbosity` runs from 0 (quiet) to 3 (trace).
    pub fn new(backup: bool, verbosity: u8) -> Self {
        Self {
            backup,
            verbosity,
            ..Default::default()
        }
    }

    pub fn for_options(options: &KiFieldOptions, verbosity: u8) -> Self {
        Self::new(options.backup, verbosity)
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    fn skip(&mut self, path: &Path, error: &KiFieldError) {
        warn!("Skipping {}: {}", path.display(), error);
        self.report.skipped.push(SkippedFile {
            path: path.to_path_buf(),
            reason: error.to_string(),
        });
    }

    /// Copy an existing file to the first free `<file>.<n>.bak`, once per run.
    fn backup(&mut self, path: &Path) -> Result<(), KiFieldError> {
        if !self.backup || !path.exists() {
            return Ok(());
        }
        if !self.backed_up.insert(canonical(path)) {
            return Ok(());
        }
        let backup = (1..)
            .map(|n| backup_path(path, n))
            .find(|p| !p.exists())
            .ok_or_else(|| KiFieldError::FileNotFound(path.to_path_buf()))?;
        fs::copy(path, &backup)?;
        info!("Backed up {} to {}", path.display(), backup.display());
        self.report.backups.push(backup);
        Ok(())
    }

    /// Write a file, backing up its previous contents first.
    pub fn write(&mut self, path: &Path, bytes: &[u8]) -> Result<(), KiFieldError> {
        self.backup(path)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

/// `<path>.<n>.bak`
pub fn backup_path(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}.bak"));
    PathBuf::from(name)
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn format_of(path: &Path) -> Result<FileFormat, KiFieldError> {
    FileFormat::from_path(path).ok_or_else(|| KiFieldError::UnsupportedExtension(path.to_path_buf()))
}

fn child_path(parent: &Path, file: &str) -> PathBuf {
    parent.parent().unwrap_or_else(|| Path::new("")).join(file)
}

/// Sheets currently being visited, outermost first.
struct SheetStack(Vec<PathBuf>);

impl SheetStack {
    fn new(root: &Path) -> Self {
        SheetStack(vec![canonical(root)])
    }

    /// Enter a child sheet, or explain why it must be skipped.
    fn enter(&mut self, child: &Path) -> Result<(), String> {
        if self.0.len() > MAX_SHEET_DEPTH {
            return Err(format!("sheet nesting deeper than {MAX_SHEET_DEPTH}"));
        }
        let key = canonical(child);
        if self.0.contains(&key) {
            return Err("sheet includes itself".to_string());
        }
        self.0.push(key);
        Ok(())
    }

    fn leave(&mut self) {
        self.0.pop();
    }
}

/// Field extraction and insertion over files of any supported format.
pub struct KiFieldCore;

impl KiFieldCore {
    /// Read part fields from every file. Later files override earlier ones
    /// field by field; files that are missing or can't be read are skipped.
    pub fn extract_part_fields(
        files: &[PathBuf],
        options: &KiFieldOptions,
        session: &mut WriteSession,
    ) -> FieldTable {
        let mut table = FieldTable::new();
        for path in files {
            info!("Extracting fields from {}", path.display());
            let mut stack = SheetStack::new(path);
            match Self::extract_file(path, None, options, session, &mut stack) {
                Ok(fields) => {
                    debug!("{} parts in {}", fields.len(), path.display());
                    table.combine(&fields, true);
                    session.report.extracted_files.push(path.clone());
                }
                Err(e) => session.skip(path, &e),
            }
        }
        table.clean_values();
        session.report.parts = table.len();

        if session.verbosity >= 2 {
            match serde_json::to_string_pretty(&table) {
                Ok(json) => debug!("Extracted fields:\n{}", json),
                Err(e) => debug!("Cannot dump extracted fields: {}", e),
            }
        }
        table
    }

    fn extract_file(
        path: &Path,
        context: Option<SheetContext>,
        options: &KiFieldOptions,
        session: &mut WriteSession,
        stack: &mut SheetStack,
    ) -> Result<FieldTable, KiFieldError> {
        let format = format_of(path)?;
        if !path.exists() {
            return Err(KiFieldError::FileNotFound(path.to_path_buf()));
        }
        let document = Document::parse(format, &fs::read(path)?)?.with_context(context);
        let mut table = document.extract_fields(&options.filter)?;

        if options.recurse {
            for child in document.child_sheets() {
                let child_file = child_path(path, &child.file);
                if let Err(reason) = stack.enter(&child_file) {
                    warn!("Not following {}: {}", child_file.display(), reason);
                    session.report.skipped.push(SkippedFile {
                        path: child_file,
                        reason,
                    });
                    continue;
                }
                debug!("Extracting fields from sheet {}", child_file.display());
                match Self::extract_file(&child_file, child.context, options, session, stack) {
                    Ok(fields) => table.merge_units_from(fields),
                    Err(e) => session.skip(&child_file, &e),
                }
                stack.leave();
            }
        }
        Ok(table)
    }

    /// Write the table into every file. Files that can't be updated are
    /// skipped; workbooks and description files that don't exist are created.
    pub fn insert_part_fields(
        table: &FieldTable,
        files: &[PathBuf],
        options: &KiFieldOptions,
        session: &mut WriteSession,
    ) {
        for path in files {
            info!("Inserting fields into {}", path.display());
            let mut stack = SheetStack::new(path);
            if let Err(e) = Self::insert_file(table, path, None, options, session, &mut stack) {
                session.skip(path, &e);
            }
        }
    }

    fn insert_file(
        table: &FieldTable,
        path: &Path,
        context: Option<SheetContext>,
        options: &KiFieldOptions,
        session: &mut WriteSession,
        stack: &mut SheetStack,
    ) -> Result<(), KiFieldError> {
        let format = format_of(path)?;
        let mut document = if path.exists() {
            Document::parse(format, &fs::read(path)?)?.with_context(context)
        } else {
            let created = Document::create(format)
                .ok_or_else(|| KiFieldError::FileNotFound(path.to_path_buf()))?;
            info!("Creating {}", path.display());
            created
        };

        document.insert_fields(table)?;
        if options.group_components {
            document.group(options.no_range);
        }
        session.write(path, &document.serialize()?)?;
        session.report.inserted_files.push(path.to_path_buf());

        if options.recurse {
            for child in document.child_sheets() {
                let child_file = child_path(path, &child.file);
                if let Err(reason) = stack.enter(&child_file) {
                    warn!("Not following {}: {}", child_file.display(), reason);
                    session.report.skipped.push(SkippedFile {
                        path: child_file,
                        reason,
                    });
                    continue;
                }
                debug!("Inserting fields into sheet {}", child_file.display());
                if let Err(e) =
                    Self::insert_file(table, &child_file, child.context, options, session, stack)
                {
                    session.skip(&child_file, &e);
                }
                stack.leave();
            }
        }
        Ok(())
    }

    /// Extract from `extract`, then insert into `insert`. Insertion is
    /// skipped when nothing was extracted.
    pub fn run(
        extract: &[PathBuf],
        insert: &[PathBuf],
        options: &KiFieldOptions,
        mut session: WriteSession,
    ) -> RunReport {
        let table = Self::extract_part_fields(extract, options, &mut session);
        if table.is_empty() {
            warn!("No part fields were extracted; nothing to insert");
        } else {
            Self::insert_part_fields(&table, insert, options, &mut session);
        }
        session.into_report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_numbering() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bom.csv");
        fs::write(&path, "Refs\n").unwrap();
        fs::write(backup_path(&path, 1), "older").unwrap();

        let mut session = WriteSession::new(true, 0);
        session.write(&path, b"Refs,Value\n").unwrap();
        session.write(&path, b"Refs,Value,MPN\n").unwrap();

        assert_eq!(session.report().backups, vec![dir.path().join("bom.csv.2.bak")]);
        assert_eq!(fs::read_to_string(backup_path(&path, 2)).unwrap(), "Refs\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "Refs,Value,MPN\n");
    }

    #[test]
    fn test_no_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bom.csv");
        fs::write(&path, "Refs\n").unwrap();
        let mut session = WriteSession::new(false, 0);
        session.write(&path, b"x").unwrap();
        assert!(session.report().backups.is_empty());
        assert!(!backup_path(&path, 1).exists());
    }

    #[test]
    fn test_unsupported_and_missing_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let files = vec![dir.path().join("notes.txt"), dir.path().join("missing.sch")];
        let mut session = WriteSession::new(true, 0);
        let table = KiFieldCore::extract_part_fields(&files, &KiFieldOptions::default(), &mut session);
        assert!(table.is_empty());
        assert_eq!(session.report().skipped.len(), 2);
        assert!(session.report().skipped[0].reason.contains("Unsupported"));
    }

    #[test]
    fn test_missing_sources_are_skipped() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("parts.csv");
        fs::write(&present, "Refs,Value\nR1,10k\n").unwrap();
        let files = vec![dir.path().join("new.xlsx"), present.clone(), dir.path().join("gone.dcm")];
        let mut session = WriteSession::new(true, 0);
        let table = KiFieldCore::extract_part_fields(&files, &KiFieldOptions::default(), &mut session);
        assert_eq!(table.len(), 1);
        assert_eq!(session.report().extracted_files, vec![present]);
        let skipped: Vec<&PathBuf> = session.report().skipped.iter().map(|s| &s.path).collect();
        assert_eq!(skipped, vec![&files[0], &files[2]]);
        assert!(session.report().skipped[0].reason.contains("not found"));
    }

    #[test]
    fn test_self_including_sheet_is_not_followed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loop.sch");
        fs::write(
            &path,
            "EESchema Schematic File Version 4
$Comp
L Device:R R1
U 1 1 5F000001
P 1000 1000
F 0 \"R1\" H 1050 1050 50  0000 L CNN
F 1 \"10k\" H 1050 950 50  0000 L CNN
$EndComp
$Sheet
S 5000 3000 1000 500
U 5F0A0B0C
F0 \"Again\" 50
F1 \"loop.sch\" 50
$EndSheet
$EndSCHEMATC
",
        )
        .unwrap();
        let options = KiFieldOptions {
            recurse: true,
            ..Default::default()
        };
        let mut session = WriteSession::new(true, 0);
        let table = KiFieldCore::extract_part_fields(&[path.clone()], &options, &mut session);
        assert_eq!(table.get("R1").unwrap()["value"], "10k");
        assert_eq!(session.report().skipped.len(), 1);
        assert!(session.report().skipped[0].reason.contains("itself"));
    }

    #[test]
    fn test_run_skips_insert_when_nothing_extracted() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.csv");
        let report = KiFieldCore::run(
            &[dir.path().join("absent.csv")],
            &[target.clone()],
            &KiFieldOptions::default(),
            WriteSession::new(true, 0),
        );
        assert!(report.inserted_files.is_empty());
        assert!(!target.exists());
    }
}
