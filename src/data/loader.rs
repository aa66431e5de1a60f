use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use arrow::util::display::array_value_to_string;
use chrono::{Local, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CandidateTable, CellValue};

/// Column the full export carries the birth date in (`M/D/YYYY`).
pub const DATE_OF_BIRTH: &str = "Date Of Birth";

/// Column derived from [`DATE_OF_BIRTH`] on a full export.
pub const AGE: &str = "Age";

const DAYS_PER_YEAR: f64 = 365.2425;

/// What kind of file is being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// The complete search export from the subject database: header
    /// defects are repaired and `Age` is derived from the birth date.
    #[default]
    FullExport,
    /// A table this tool exported earlier; loaded as-is.
    FilteredExport,
}

/// Columns and typed rows as read from a file, before the roster
/// invariants are checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, CellValue>>,
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a candidate roster from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row with column names, one subject per row
/// * `.json`    – `[{ "Subject Id": 1, "Status": "Active", ... }, ...]`
/// * `.parquet` – one column per roster field
pub fn load_file(path: &Path, mode: LoadMode) -> Result<CandidateTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "csv" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    let table = prepare(raw, mode, Local::now().date_naive())?;
    log::info!(
        "Loaded {} candidates with {} columns from {}",
        table.len(),
        table.columns().len(),
        path.display()
    );
    Ok(table)
}

/// Apply the load mode and build the roster (sorted by subject id).
pub fn prepare(raw: RawTable, mode: LoadMode, today: NaiveDate) -> Result<CandidateTable> {
    let RawTable { mut columns, mut rows } = match mode {
        LoadMode::FullExport => repair_headers(raw),
        LoadMode::FilteredExport => raw,
    };

    if mode == LoadMode::FullExport && columns.iter().any(|c| c == DATE_OF_BIRTH) {
        for row in &mut rows {
            let age = row
                .get(DATE_OF_BIRTH)
                .and_then(|dob| age_on(&dob.to_string(), today))
                .map_or(CellValue::NoData, CellValue::Integer);
            row.insert(AGE.to_string(), age);
        }
        if !columns.iter().any(|c| c == AGE) {
            columns.push(AGE.to_string());
        }
    }

    Ok(CandidateTable::from_rows(columns, rows)?)
}

// ---------------------------------------------------------------------------
// Full-export repairs
// ---------------------------------------------------------------------------

/// Canonical name for a column of the database export. Only the known
/// defects are touched: the doubled space in `RightBC  <f>`, the `L Pt Bc <f>`
/// spelling of left bone conduction, and `Hearing AidUse`. Every other
/// header keeps its exact spacing.
pub fn repair_header(raw: &str) -> String {
    let name = raw.trim_start_matches('\u{feff}');

    if let Some(frequency) = name.strip_prefix("L Pt Bc ") {
        return format!("LeftBC {}", frequency.trim());
    }
    if let Some(rest) = name.strip_prefix("RightBC") {
        if rest.starts_with(char::is_whitespace) {
            return format!("RightBC {}", rest.trim());
        }
    }
    if name == "Hearing AidUse" {
        return "Hearing Aid Use".to_string();
    }
    name.to_string()
}

fn repair_headers(raw: RawTable) -> RawTable {
    let columns = raw.columns.iter().map(|c| repair_header(c)).collect();
    let rows = raw
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(k, v)| (repair_header(&k), v))
                .collect()
        })
        .collect();
    RawTable { columns, rows }
}

/// Whole years between `birthdate` (`M/D/YYYY`) and `today`.
pub fn age_on(birthdate: &str, today: NaiveDate) -> Option<i64> {
    let mut parts = birthdate.trim().split('/');
    let month = parts.next()?.trim().parse().ok()?;
    let day = parts.next()?.trim().parse().ok()?;
    let year = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let birth = NaiveDate::from_ymd_opt(year, month, day)?;
    let days = (today - birth).num_days();
    Some((days as f64 / DAYS_PER_YEAR) as i64)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names, one subject per row.
/// Every cell goes through [`CellValue::parse`].
pub fn read_csv<R: Read>(reader: R) -> Result<RawTable> {
    let mut reader = csv::Reader::from_reader(reader);
    let columns: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let row = columns
            .iter()
            .zip(record.iter())
            .map(|(col, value)| (col.clone(), CellValue::parse(value)))
            .collect();
        rows.push(row);
    }

    Ok(RawTable { columns, rows })
}

fn load_csv(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening CSV")?;
    read_csv(file)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "Subject Id": 1021, "Status": "Active", "RightAC 500": "35", ... },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let mut row = BTreeMap::new();
        for (key, val) in obj {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
            row.insert(key.clone(), json_to_cell(val));
        }
        rows.push(row);
    }

    Ok(RawTable { columns, rows })
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::parse(s),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Decimal(f)
            } else {
                CellValue::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet roster. Works with files written by both **Pandas**
/// (`df.to_parquet()`) and **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;

    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            let cells = columns
                .iter()
                .zip(batch.columns())
                .map(|(name, col)| (name.clone(), extract_cell(col, row)))
                .collect();
            rows.push(cells);
        }
    }

    Ok(RawTable { columns, rows })
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    let typed = match col.data_type() {
        DataType::Utf8 => col
            .as_string_opt::<i32>()
            .map(|a| CellValue::parse(a.value(row))),
        DataType::LargeUtf8 => col
            .as_string_opt::<i64>()
            .map(|a| CellValue::parse(a.value(row))),
        DataType::Int32 => col
            .as_primitive_opt::<Int32Type>()
            .map(|a| CellValue::Integer(a.value(row) as i64)),
        DataType::Int64 => col
            .as_primitive_opt::<Int64Type>()
            .map(|a| CellValue::Integer(a.value(row))),
        DataType::Float32 => col
            .as_primitive_opt::<Float32Type>()
            .map(|a| CellValue::Decimal(a.value(row) as f64)),
        DataType::Float64 => col
            .as_primitive_opt::<Float64Type>()
            .map(|a| CellValue::Decimal(a.value(row))),
        DataType::Boolean => col.as_boolean_opt().map(|a| CellValue::Bool(a.value(row))),
        _ => None,
    };
    typed.unwrap_or_else(|| match array_value_to_string(col, row) {
        Ok(text) => CellValue::parse(&text),
        Err(e) => {
            log::warn!("Unreadable {:?} cell at row {row}: {e}", col.data_type());
            CellValue::Null
        }
    })
}
