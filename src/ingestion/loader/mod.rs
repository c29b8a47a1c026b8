#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use calamine::{Data, Reader, open_workbook_auto};
use encoding_rs::Encoding;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::{RagError, Result};

/// A row as an ordered JSON object keyed by column name
pub type Row = Map<String, Value>;

/// Cell texts read as missing values in delimited files
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// A loaded tabular source
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// File stem of the source
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Csv,
    Spreadsheet,
}

impl SourceKind {
    fn of(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("csv") => Ok(Self::Csv),
            Some("xlsx" | "xlsm" | "xls") => Ok(Self::Spreadsheet),
            _ => Err(RagError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Reads CSV and spreadsheet files into typed rows
#[derive(Debug, Clone, Copy)]
pub struct TabularLoader {
    encoding: &'static Encoding,
    separator: u8,
}

impl Default for TabularLoader {
    #[inline]
    fn default() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
            separator: b',',
        }
    }
}

impl TabularLoader {
    /// `encoding` is any WHATWG label such as `utf-8` or `latin1`
    #[inline]
    pub fn new(encoding: &str, separator: char) -> Result<Self> {
        let encoding = Encoding::for_label(encoding.trim().as_bytes())
            .ok_or_else(|| RagError::Config(format!("Unknown CSV encoding: {}", encoding)))?;
        let separator = u8::try_from(separator)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                RagError::Config(format!("CSV separator must be ASCII: {:?}", separator))
            })?;
        Ok(Self {
            encoding,
            separator,
        })
    }

    /// Fail with `UnsupportedFormat` unless the file can be loaded
    #[inline]
    pub fn check_supported(path: &Path) -> Result<()> {
        SourceKind::of(path).map(|_| ())
    }

    /// Load at most `limit` rows (0 loads all)
    #[inline]
    pub fn load(&self, path: &Path, limit: usize) -> Result<Table> {
        let kind = SourceKind::of(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (columns, rows) = match kind {
            SourceKind::Csv => self.read_csv(path, limit),
            SourceKind::Spreadsheet => read_spreadsheet(path, limit),
        }
        .map_err(|e| RagError::Ingestion(format!("{:#}", e)))?;

        debug!(
            "Loaded {} rows and {} columns from {}",
            rows.len(),
            columns.len(),
            path.display()
        );
        Ok(Table {
            name,
            columns,
            rows,
        })
    }

    fn read_csv(&self, path: &Path, limit: usize) -> anyhow::Result<(Vec<String>, Vec<Row>)> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let (text, _, had_errors) = self.encoding.decode(&bytes);
        if had_errors {
            anyhow::bail!(
                "{} is not valid {} text",
                path.display(),
                self.encoding.name()
            );
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.separator)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", path.display()))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let columns = normalize_headers(headers);

        let take = if limit == 0 { usize::MAX } else { limit };
        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); columns.len()];
        let mut row_count = 0;
        for record in reader.records().take(take) {
            let record = record.with_context(|| format!("Failed to parse {}", path.display()))?;
            if record.len() > columns.len() {
                anyhow::bail!(
                    "{}: expected {} fields on line {}, saw {}",
                    path.display(),
                    columns.len(),
                    record.position().map_or(0, |p| p.line()),
                    record.len()
                );
            }
            for (index, column) in cells.iter_mut().enumerate() {
                column.push(
                    record
                        .get(index)
                        .filter(|cell| !NA_VALUES.contains(cell))
                        .map(str::to_string),
                );
            }
            row_count += 1;
        }

        let typed: Vec<Vec<Value>> = cells.into_iter().map(type_column).collect();
        let rows = (0..row_count)
            .map(|row| {
                columns
                    .iter()
                    .zip(&typed)
                    .map(|(name, column)| (name.clone(), column[row].clone()))
                    .collect()
            })
            .collect();

        Ok((columns, rows))
    }
}

fn read_spreadsheet(path: &Path, limit: usize) -> anyhow::Result<(Vec<String>, Vec<Row>)> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .with_context(|| format!("{} has no worksheets", path.display()))?
        .with_context(|| format!("Failed to read first worksheet of {}", path.display()))?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = sheet_rows
        .next()
        .map(|header| header.iter().map(header_text).collect())
        .unwrap_or_default();
    let columns = normalize_headers(headers);

    let take = if limit == 0 { usize::MAX } else { limit };
    let rows = sheet_rows
        .take(take)
        .map(|cells| {
            columns
                .iter()
                .enumerate()
                .map(|(index, name)| {
                    let value = cells.get(index).map_or(Value::Null, cell_value);
                    (name.clone(), value)
                })
                .collect()
        })
        .collect();

    Ok((columns, rows))
}

/// Name empty headers `Unnamed: <index>` and suffix repeated names with `.<n>`
fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(index, header)| {
            let base = if header.trim().is_empty() {
                format!("Unnamed: {}", index)
            } else {
                header
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}.{}", base, suffix);
                suffix += 1;
            }
            name
        })
        .collect()
}

/// Type a CSV column as a whole: integers, then floats, then booleans, otherwise text
fn type_column(cells: Vec<Option<String>>) -> Vec<Value> {
    let present = || cells.iter().flatten();

    if present().all(|c| c.trim().parse::<i64>().is_ok()) {
        return cells
            .iter()
            .map(|c| {
                c.as_deref()
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .map_or(Value::Null, Value::from)
            })
            .collect();
    }

    if present().all(|c| c.trim().parse::<f64>().is_ok()) {
        return cells
            .iter()
            .map(|c| {
                c.as_deref()
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .and_then(Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            })
            .collect();
    }

    if present().all(|c| parse_bool(c).is_some()) {
        return cells
            .iter()
            .map(|c| c.as_deref().and_then(parse_bool).map_or(Value::Null, Value::Bool))
            .collect();
    }

    cells
        .into_iter()
        .map(|c| c.map_or(Value::Null, Value::String))
        .collect()
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// Whole floats read back as integers, errors as missing values
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Value::from(*f as i64),
        Data::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}
