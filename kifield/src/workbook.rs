//! Spreadsheet workbooks (XLSX, CSV, TSV) as grids of text cells.
//!
//! Only the first worksheet takes part in field exchange. Other worksheets
//! of an XLSX file are read and written back with their cell values.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use tracing::{debug, trace};

use crate::matching::closest_match;
use crate::parser::{decode_text, FileFormat, FormatError};
use crate::refs::{collapse, explode, sort_refs};

/// The header is looked for among this many leading rows.
pub const HEADER_SEARCH_ROWS: usize = 25;

/// Label of the column holding part references.
pub const REFS_LABEL: &str = "refs";

/// Header written for the reference column of a new workbook.
pub const REFS_HEADER: &str = "Refs";

type Grid = Vec<Vec<Option<String>>>;

/// How a workbook is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookKind {
    Xlsx,
    Delimited { delimiter: u8 },
}

impl WorkbookKind {
    pub fn for_format(format: FileFormat) -> Option<Self> {
        match format {
            FileFormat::Xlsx => Some(WorkbookKind::Xlsx),
            FileFormat::Csv => Some(WorkbookKind::Delimited { delimiter: b',' }),
            FileFormat::Tsv => Some(WorkbookKind::Delimited { delimiter: b'\t' }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workbook {
    kind: WorkbookKind,
    sheet_name: Option<String>,
    rows: Grid,
    other_sheets: Vec<(String, Grid)>,
}

impl Workbook {
    pub fn new(kind: WorkbookKind) -> Self {
        Workbook {
            kind,
            sheet_name: None,
            rows: Vec::new(),
            other_sheets: Vec::new(),
        }
    }

    /// Build a workbook from rows of cell text; empty strings become blank cells.
    pub fn from_rows<R, C>(kind: WorkbookKind, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let mut wb = Workbook::new(kind);
        for row in rows {
            wb.append_row(row.into_iter().map(|c| non_empty(c.as_ref())).collect());
        }
        wb
    }

    pub fn load(bytes: &[u8], format: FileFormat) -> Result<Self, FormatError> {
        match WorkbookKind::for_format(format) {
            Some(WorkbookKind::Xlsx) => Self::load_xlsx(bytes),
            Some(WorkbookKind::Delimited { delimiter }) => Self::load_delimited(bytes, delimiter),
            None => Err(FormatError::Workbook(format!("{format} is not a workbook"))),
        }
    }

    fn load_xlsx(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut xlsx: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| FormatError::Workbook(e.to_string()))?;
        let mut wb = Workbook::new(WorkbookKind::Xlsx);
        for (index, name) in xlsx.sheet_names().into_iter().enumerate() {
            let range = xlsx
                .worksheet_range(&name)
                .map_err(|e| FormatError::Workbook(e.to_string()))?;
            let (row0, col0) = range.start().unwrap_or((0, 0));
            let mut grid: Grid = Vec::new();
            for (r, row) in range.rows().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    if let Some(text) = cell_text(cell) {
                        put(&mut grid, row0 as usize + r, col0 as usize + c, Some(text));
                    }
                }
            }
            if index == 0 {
                wb.sheet_name = Some(name);
                wb.rows = grid;
            } else {
                wb.other_sheets.push((name, grid));
            }
        }
        Ok(wb)
    }

    fn load_delimited(bytes: &[u8], default_delimiter: u8) -> Result<Self, FormatError> {
        let text = decode_text(bytes)?;
        let delimiter = determine_separator(text).unwrap_or(default_delimiter);
        debug!("Reading delimited workbook with separator {:?}", delimiter as char);
        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut wb = Workbook::new(WorkbookKind::Delimited { delimiter });
        for record in reader.into_records() {
            let record = record.map_err(|e| FormatError::Workbook(e.to_string()))?;
            wb.append_row(record.iter().map(non_empty).collect());
        }
        Ok(wb)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        match self.kind {
            WorkbookKind::Xlsx => self.xlsx_bytes(),
            WorkbookKind::Delimited { delimiter } => self.delimited_bytes(delimiter),
        }
    }

    fn xlsx_bytes(&self) -> Result<Vec<u8>, FormatError> {
        let xlsx_err = |e: rust_xlsxwriter::XlsxError| FormatError::Workbook(e.to_string());
        let text = rust_xlsxwriter::Format::new().set_num_format("@");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let first = (self.sheet_name.clone(), &self.rows);
        let others = self.other_sheets.iter().map(|(n, g)| (Some(n.clone()), g));
        for (name, grid) in std::iter::once(first).chain(others) {
            let sheet = workbook.add_worksheet();
            if let Some(name) = name {
                sheet.set_name(name).map_err(xlsx_err)?;
            }
            for (r, row) in grid.iter().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    if let Some(value) = cell {
                        sheet
                            .write_string_with_format(r as u32, c as u16, value, &text)
                            .map_err(xlsx_err)?;
                    }
                }
            }
        }
        workbook.save_to_buffer().map_err(xlsx_err)
    }

    fn delimited_bytes(&self, delimiter: u8) -> Result<Vec<u8>, FormatError> {
        let width = self.max_column();
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        for row in &self.rows {
            let record: Vec<&str> = (0..width)
                .map(|c| row.get(c).and_then(|v| v.as_deref()).unwrap_or(""))
                .collect();
            writer
                .write_record(&record)
                .map_err(|e| FormatError::Workbook(e.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| FormatError::Workbook(e.to_string()))
    }

    pub fn kind(&self) -> WorkbookKind {
        self.kind
    }

    /// Number of rows in the active sheet.
    pub fn max_row(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row.
    pub fn max_column(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    /// Cell text at zero-based `row`, `col`.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// Set a cell; `None` or an empty string clears it.
    pub fn set_cell(&mut self, row: usize, col: usize, value: Option<&str>) {
        put(&mut self.rows, row, col, value.and_then(non_empty));
    }

    pub fn append_row(&mut self, row: Vec<Option<String>>) {
        self.rows.push(row);
    }

    /// Zero-based row with the most filled cells among the first
    /// [`HEADER_SEARCH_ROWS`] rows, with its labels. Ties go to the earlier row.
    pub fn find_header(&self) -> Option<(usize, Vec<Option<String>>)> {
        let mut best: Option<(usize, usize)> = None;
        for (index, row) in self.rows.iter().take(HEADER_SEARCH_ROWS).enumerate() {
            let width = row.iter().filter(|c| c.is_some()).count();
            if width > best.map_or(0, |(_, w)| w) {
                best = Some((index, width));
            }
        }
        let (index, _) = best?;
        trace!("Header on row {}: {:?}", index + 1, self.rows[index]);
        Some((index, self.rows[index].clone()))
    }

    /// Reference column position and its header row.
    pub fn refs_column(&self) -> Option<(usize, usize)> {
        let (header_row, header) = self.find_header()?;
        let (col, _) = find_header_column(&header, REFS_LABEL)?;
        Some((header_row, col))
    }

    /// Expand collapsed reference cells into one row per reference. Rows
    /// below the header without a reference are dropped.
    pub fn ungroup(&mut self) {
        let Some((header_row, ref_col)) = self.refs_column() else {
            return;
        };
        let body = self.rows.split_off(header_row + 1);
        for row in body {
            let Some(refs) = row.get(ref_col).and_then(|c| c.as_deref()) else {
                continue;
            };
            for reference in explode(refs) {
                let mut single = row.clone();
                single[ref_col] = Some(reference);
                self.rows.push(single);
            }
        }
    }

    /// Merge rows whose non-reference cells are identical. The merged
    /// reference cell is collapsed (`C1-C3`) or, with `no_range`, a sorted
    /// comma-separated list.
    pub fn group(&mut self, no_range: bool) {
        let Some((header_row, ref_col)) = self.refs_column() else {
            return;
        };
        let width = self.max_column();
        let body = self.rows.split_off(header_row + 1);

        let mut groups: Vec<(Vec<Option<String>>, Vec<String>)> = Vec::new();
        for mut row in body {
            row.resize(width, None);
            let refs = row[ref_col].take().map(|r| explode(&r)).unwrap_or_default();
            match groups.iter_mut().find(|(values, _)| *values == row) {
                Some((_, existing)) => existing.extend(refs),
                None => groups.push((row, refs)),
            }
        }

        for (mut row, mut refs) in groups {
            let cell = if no_range {
                sort_refs(&mut refs);
                refs.join(", ")
            } else {
                collapse(&refs)
            };
            row[ref_col] = non_empty(&cell);
            self.rows.push(row);
        }
    }
}

/// Column index and label of the header cell best matching `label`.
/// An exact case-insensitive match wins; otherwise the closest label is
/// taken however weak the match.
pub fn find_header_column(header: &[Option<String>], label: &str) -> Option<(usize, String)> {
    let labelled: Vec<(usize, &str)> = header
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.as_deref().map(|s| (i, s)))
        .collect();
    if let Some((col, text)) = labelled.iter().find(|(_, s)| s.eq_ignore_ascii_case(label)) {
        return Some((*col, text.to_string()));
    }
    let best = closest_match(label, labelled.iter().map(|(_, s)| *s), 0.0)?;
    let (col, text) = labelled[best.index];
    Some((col, text.to_string()))
}

const SEPARATORS: [u8; 3] = [b',', b'\t', b';'];

/// Pick the field separator among `,`, tab and `;`. Only characters outside
/// quoted cells count. A separator that appears equally often on every
/// non-blank line is preferred, then the most frequent one.
pub fn determine_separator(text: &str) -> Option<u8> {
    // per line: separator counts and whether the line holds anything
    let mut lines: Vec<([usize; 3], bool)> = vec![([0; 3], false)];
    let mut in_quotes = false;
    for b in text.bytes() {
        if b == b'\n' && !in_quotes {
            lines.push(([0; 3], false));
            continue;
        }
        let Some(line) = lines.last_mut() else {
            continue;
        };
        if !b.is_ascii_whitespace() {
            line.1 = true;
        }
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(i) = SEPARATORS.iter().position(|&sep| sep == b) {
                line.0[i] += 1;
            }
        }
    }

    let filled: Vec<&[usize; 3]> = lines.iter().filter(|(_, f)| *f).map(|(c, _)| c).collect();
    let scores = (0..SEPARATORS.len()).map(|i| {
        let total: usize = filled.iter().map(|c| c[i]).sum();
        let consistent = filled.first().is_some_and(|first| {
            first[i] > 0 && filled.iter().all(|c| c[i] == first[i])
        });
        (consistent, total, i)
    });
    let (_, total, best) = scores.rev().max_by_key(|&(consistent, total, _)| (consistent, total))?;
    (total > 0).then_some(SEPARATORS[best])
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

fn put(grid: &mut Grid, row: usize, col: usize, value: Option<String>) {
    if grid.len() <= row {
        if value.is_none() {
            return;
        }
        grid.resize(row + 1, Vec::new());
    }
    let cells = &mut grid[row];
    if cells.len() <= col {
        if value.is_none() {
            return;
        }
        cells.resize(col + 1, None);
    }
    cells[col] = value;
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => non_empty(s),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(format_number(*f)),
        Data::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => Some(format_number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => non_empty(s),
        Data::Error(e) => Some(format!("#{e:?}")),
    }
}

fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}
