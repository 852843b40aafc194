//! Converts the raw bytes of an upload into a Polars `DataFrame`.
//!
//! CSV payloads are parsed by Polars (with delimiter detection), XLS/XLSX workbooks
//! by `calamine`. Every function here is a pure transformation from bytes to a table.

use crate::{FileExtension, PolarsSheetsError, PolarsSheetsResult, UniqueElements};

use calamine::{Data, Range, Reader, Sheets, Xls, Xlsx};
use polars::prelude::*;
use std::{collections::HashSet, io::Cursor};

// --- Constants ---

/// Default delimiter tried first when parsing CSV uploads.
pub static DEFAULT_CSV_DELIMITER: &str = ",";

/// Default number of rows scanned for CSV schema inference.
pub const DEFAULT_INFER_SCHEMA_ROWS: usize = 200;

/// Rows parsed by the quick delimiter probe.
const PROBE_ROW_LIMIT: usize = 100;

/// Format used to render Excel date cells.
const EXCEL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Settings applied while extracting tables from uploaded bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Delimiter tried first for CSV payloads.
    pub csv_delimiter: String,
    /// Maximum rows scanned for CSV schema inference.
    pub infer_schema_rows: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            csv_delimiter: DEFAULT_CSV_DELIMITER.to_string(),
            infer_schema_rows: DEFAULT_INFER_SCHEMA_ROWS,
        }
    }
}

impl ExtractOptions {
    /// Retrieves the CSV separator byte from the `csv_delimiter` String configuration.
    ///
    /// ### Returns
    /// `Ok(u8)` containing the first byte, or `Err(PolarsSheetsError::InvalidDelimiter)`
    /// if the string is empty.
    pub fn csv_separator(&self) -> PolarsSheetsResult<u8> {
        self.csv_delimiter
            .as_bytes()
            .first()
            .copied()
            .ok_or_else(|| PolarsSheetsError::InvalidDelimiter(self.csv_delimiter.clone()))
    }
}

/// Produces a `DataFrame` from the raw bytes of an upload.
///
/// ### Arguments
/// * `extension`: The type tag inferred at upload time.
/// * `data`: Raw bytes of the file.
/// * `sheet`: Sheet to extract for workbooks; `None` selects the first sheet.
///   Ignored for CSV.
/// * `options`: CSV delimiter and schema inference settings.
///
/// ### Errors
/// `UnsupportedFileType` for anything but CSV, XLS and XLSX,
/// `SheetNotFound` if the named sheet does not exist, plus parsing errors.
pub fn extract_dataframe(
    extension: &FileExtension,
    data: &[u8],
    sheet: Option<&str>,
    options: &ExtractOptions,
) -> PolarsSheetsResult<DataFrame> {
    match extension {
        FileExtension::Csv => read_csv_bytes(data, options),
        FileExtension::Xls | FileExtension::Xlsx => read_sheet_bytes(extension, data, sheet),
        FileExtension::Unknown(ext) => Err(PolarsSheetsError::UnsupportedFileType(ext.clone())),
        FileExtension::Missing => Err(PolarsSheetsError::UnsupportedFileType(
            "file without extension".to_string(),
        )),
    }
}

/// Lists the sheet names of a workbook, in workbook order.
pub fn sheet_names(extension: &FileExtension, data: &[u8]) -> PolarsSheetsResult<Vec<String>> {
    let workbook = open_workbook(extension, data)?;
    Ok(workbook.sheet_names())
}

// --- CSV ---

/// Reads CSV bytes, attempting automatic delimiter detection if the configured one fails.
///
/// The configured delimiter is tried first, then the common ones. A delimiter whose
/// probe yields a single column is skipped; if every candidate yields a single
/// column, the first readable one wins (the file really has one column).
fn read_csv_bytes(data: &[u8], options: &ExtractOptions) -> PolarsSheetsResult<DataFrame> {
    let initial_separator = options.csv_separator()?;

    let mut delimiters_to_try = vec![initial_separator, b',', b';', b'|', b'\t', b':'];
    delimiters_to_try.unique();

    let mut single_column_fallback: Option<u8> = None;

    for &delimiter in &delimiters_to_try {
        // Quick check on the first rows: fails fast if the delimiter is wrong.
        let probe = match parse_csv(data, delimiter, Some(PROBE_ROW_LIMIT), Some(0)) {
            Ok(probe) => probe,
            Err(e) => {
                tracing::debug!("CSV probe failed with delimiter '{}': {e}", delimiter as char);
                continue;
            }
        };

        if probe.width() <= 1 {
            tracing::debug!(
                "Delimiter '{}' produced {} column(s); trying the next one.",
                delimiter as char,
                probe.width()
            );
            single_column_fallback.get_or_insert(delimiter);
            continue;
        }

        match parse_csv(data, delimiter, None, Some(options.infer_schema_rows)) {
            Ok(df) => {
                tracing::info!("Read CSV with delimiter '{}'", delimiter as char);
                return Ok(df);
            }
            Err(e) => {
                tracing::warn!(
                    "Full CSV read failed with delimiter '{}' after quick check passed: {e}",
                    delimiter as char
                );
            }
        }
    }

    if let Some(delimiter) = single_column_fallback {
        return parse_csv(data, delimiter, None, Some(options.infer_schema_rows));
    }

    let error = PolarsSheetsError::CsvParsing(
        "Failed to read CSV with common delimiters. Check the file format.".to_string(),
    );
    tracing::error!("{}", error);
    Err(error)
}

/// Parses CSV bytes with a fixed delimiter.
///
/// - `n_rows`: limits the number of data rows parsed after the header.
/// - `infer_schema_length`: rows used to guess types (`Some(0)` reads everything as String).
fn parse_csv(
    data: &[u8],
    delimiter: u8,
    n_rows: Option<usize>,
    infer_schema_length: Option<usize>,
) -> PolarsSheetsResult<DataFrame> {
    let csv_parse_options = CsvParseOptions::default()
        .with_encoding(CsvEncoding::LossyUtf8) // Handle potentially non-strict UTF8
        .with_missing_is_null(true) // Treat empty fields as nulls
        .with_try_parse_dates(true) // Attempt automatic date parsing.
        .with_separator(delimiter);

    let df = CsvReadOptions::default()
        .with_parse_options(csv_parse_options)
        .with_has_header(true)
        .with_infer_schema_length(infer_schema_length)
        .with_ignore_errors(true) // Malformed cells become nulls instead of stopping.
        .with_n_rows(n_rows)
        .with_rechunk(true)
        .into_reader_with_file_handle(Cursor::new(data.to_vec()))
        .finish()?;

    Ok(df)
}

// --- Workbooks ---

/// Opens XLS/XLSX bytes with the reader matching the extension.
fn open_workbook(
    extension: &FileExtension,
    data: &[u8],
) -> PolarsSheetsResult<Sheets<Cursor<Vec<u8>>>> {
    let cursor = Cursor::new(data.to_vec());
    let workbook = match extension {
        FileExtension::Xls => Sheets::Xls(Xls::new(cursor).map_err(calamine::Error::Xls)?),
        FileExtension::Xlsx => Sheets::Xlsx(Xlsx::new(cursor).map_err(calamine::Error::Xlsx)?),
        other => {
            return Err(PolarsSheetsError::UnsupportedFileType(format!(
                "`{other}` is not a spreadsheet format"
            )));
        }
    };
    Ok(workbook)
}

/// Reads one sheet (or the first one) of a workbook into a `DataFrame`.
fn read_sheet_bytes(
    extension: &FileExtension,
    data: &[u8],
    sheet: Option<&str>,
) -> PolarsSheetsResult<DataFrame> {
    let mut workbook = open_workbook(extension, data)?;
    let names = workbook.sheet_names();

    let sheet_name = match sheet {
        Some(name) if names.iter().any(|n| n == name) => name.to_string(),
        Some(name) => {
            return Err(PolarsSheetsError::SheetNotFound {
                file: format!("{extension} workbook"),
                sheet: name.to_string(),
            });
        }
        None => names.first().cloned().ok_or_else(|| {
            PolarsSheetsError::Other("Workbook does not contain any sheet".to_string())
        })?,
    };

    let range = workbook.worksheet_range(&sheet_name)?;
    let df = range_to_dataframe(&range)?;

    tracing::debug!("Sheet '{sheet_name}' read. Shape: {:?}", df.shape());
    Ok(df)
}

/// Column type chosen from the non-empty cells of a worksheet column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Int,
    Float,
    Bool,
    Text,
}

/// Converts a worksheet range into a `DataFrame`.
///
/// The first row is the header. Empty header cells become `column_<n>`, repeated
/// names get a `_<n>` suffix and short rows are padded with nulls.
fn range_to_dataframe(range: &Range<Data>) -> PolarsSheetsResult<DataFrame> {
    let mut rows = range.rows();

    let Some(header_row) = rows.next() else {
        return Ok(DataFrame::empty());
    };

    let body: Vec<&[Data]> = rows.collect();
    let width = body
        .iter()
        .map(|row| row.len())
        .chain(std::iter::once(header_row.len()))
        .max()
        .unwrap_or(0);

    let column_names = header_names(header_row, width);

    let mut columns: Vec<Column> = Vec::with_capacity(width);
    for (index, name) in column_names.iter().enumerate() {
        let cells: Vec<Option<&Data>> = body
            .iter()
            .map(|row| row.get(index).filter(|cell| !matches!(cell, Data::Empty)))
            .collect();

        let series = match column_kind(&cells) {
            CellKind::Int => {
                let values: Vec<Option<i64>> = cells.iter().map(|c| c.and_then(cell_as_i64)).collect();
                Series::new(name.as_str().into(), values)
            }
            CellKind::Float => {
                let values: Vec<Option<f64>> = cells.iter().map(|c| c.and_then(cell_as_f64)).collect();
                Series::new(name.as_str().into(), values)
            }
            CellKind::Bool => {
                let values: Vec<Option<bool>> = cells
                    .iter()
                    .map(|c| match c {
                        Some(Data::Bool(b)) => Some(*b),
                        _ => None,
                    })
                    .collect();
                Series::new(name.as_str().into(), values)
            }
            CellKind::Text => {
                let values: Vec<Option<String>> = cells.iter().map(|c| c.map(cell_to_string)).collect();
                Series::new(name.as_str().into(), values)
            }
        };

        columns.push(series.into_column());
    }

    Ok(DataFrame::new_infer_height(columns)?)
}

/// Builds unique, non-empty column names from the header row.
fn header_names(header_row: &[Data], width: usize) -> Vec<String> {
    let mut used_names: HashSet<String> = HashSet::new();
    let mut column_names: Vec<String> = Vec::with_capacity(width);

    for index in 0..width {
        let raw = header_row
            .get(index)
            .filter(|cell| !matches!(cell, Data::Empty))
            .map(cell_to_string)
            .unwrap_or_default();

        let mut name = raw.trim().to_string();
        if name.is_empty() {
            name = format!("column_{}", index + 1);
        }

        if used_names.contains(&name) {
            let base = name.clone();
            let mut suffix = 2usize;
            while used_names.contains(&format!("{base}_{suffix}")) {
                suffix += 1;
            }
            name = format!("{base}_{suffix}");
        }

        used_names.insert(name.clone());
        column_names.push(name);
    }

    column_names
}

/// Picks the narrowest type that holds every non-empty cell.
fn column_kind(cells: &[Option<&Data>]) -> CellKind {
    let mut kind: Option<CellKind> = None;

    for cell in cells.iter().flatten() {
        let cell_kind = match cell {
            Data::Int(_) => CellKind::Int,
            Data::Float(f) if is_whole(*f) => CellKind::Int,
            Data::Float(_) => CellKind::Float,
            Data::Bool(_) => CellKind::Bool,
            _ => CellKind::Text,
        };

        kind = Some(match (kind, cell_kind) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(CellKind::Int), CellKind::Float) | (Some(CellKind::Float), CellKind::Int) => {
                CellKind::Float
            }
            _ => return CellKind::Text,
        });
    }

    // A column without any value stays textual (all nulls).
    kind.unwrap_or(CellKind::Text)
}

fn is_whole(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64
}

fn cell_as_i64(cell: &Data) -> Option<i64> {
    match cell {
        Data::Int(i) => Some(*i),
        Data::Float(f) if is_whole(*f) => Some(*f as i64),
        _ => None,
    }
}

fn cell_as_f64(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(i) => Some(*i as f64),
        Data::Float(f) => Some(*f),
        _ => None,
    }
}

/// Renders any cell as text; dates use `EXCEL_DATETIME_FORMAT`.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(d) => d
            .as_datetime()
            .map(|dt| dt.format(EXCEL_DATETIME_FORMAT).to_string())
            .unwrap_or_else(|| d.as_f64().to_string()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//
