use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::TableError;

/// Marker the recruiting database writes into any cell that has no data.
pub const NO_DATA: &str = "-";

/// Column holding the unique subject identifier.
pub const SUBJECT_ID: &str = "Subject Id";

// ---------------------------------------------------------------------------
// CellValue – a single cell of the roster
// ---------------------------------------------------------------------------

/// A dynamically-typed roster cell.
/// Using `BTreeMap` / `BTreeSet` downstream so `CellValue` must be `Ord`.
#[derive(Debug, Clone)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Bool(bool),
    /// The `"-"` sentinel: the source recorded "no data" for this cell.
    NoData,
    /// Empty cell.
    Null,
}

// -- Manual Eq/Ord so we can put CellValue in BTreeSet --

/// Equality follows `Ord` (and `Hash`): decimals compare by `total_cmp`.
impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                NoData => 1,
                Bool(_) => 2,
                Integer(_) => 3,
                Decimal(_) => 4,
                Text(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Decimal(a), Decimal(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Text(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Decimal(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::NoData | CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            // `{:?}` keeps the fractional part (`60.0`), so a decimal reads
            // back as a decimal.
            CellValue::Decimal(v) => write!(f, "{v:?}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::NoData => write!(f, "{NO_DATA}"),
            CellValue::Null => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Integer(i)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Decimal(v)
    }
}

/// `f64::from_str` also accepts `nan`, `inf` and `infinity`; those stay text.
fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

impl CellValue {
    /// Type a raw text cell the way the export tooling does: sentinel first,
    /// then integer, decimal, boolean, and text as the fallback.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return CellValue::Null;
        }
        if s == NO_DATA {
            return CellValue::NoData;
        }
        if let Ok(i) = s.parse::<i64>() {
            return CellValue::Integer(i);
        }
        if let Some(f) = parse_finite(s) {
            return CellValue::Decimal(f);
        }
        if s == "true" || s == "false" {
            return CellValue::Bool(s == "true");
        }
        CellValue::Text(s.to_string())
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, CellValue::NoData)
    }

    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Decimal(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Text(s) => parse_finite(s.trim()),
            _ => None,
        }
    }

    /// Integer reading of the cell. Decimals qualify only when they carry no
    /// fractional part.
    pub fn as_whole_number(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            CellValue::Decimal(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SubjectRecord – one row of the roster
// ---------------------------------------------------------------------------

/// One candidate (one row of the source export).
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRecord {
    /// Parsed value of the `Subject Id` column.
    pub subject_id: i64,
    /// Dynamic columns: column_name → value.
    pub cells: BTreeMap<String, CellValue>,
}

impl SubjectRecord {
    /// Cell for `column`; a column the row never had reads as [`CellValue::Null`].
    pub fn get(&self, column: &str) -> &CellValue {
        self.cells.get(column).unwrap_or(&CellValue::Null)
    }
}

// ---------------------------------------------------------------------------
// CandidateTable – the roster as currently narrowed
// ---------------------------------------------------------------------------

/// The candidate roster. Records are kept sorted by subject id and ids are
/// unique; filtering produces a new table and never edits one in place.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTable {
    columns: Vec<String>,
    records: Vec<SubjectRecord>,
}

impl CandidateTable {
    /// Build a table from loaded rows, sorting by subject id.
    pub fn from_rows(
        columns: Vec<String>,
        rows: Vec<BTreeMap<String, CellValue>>,
    ) -> Result<Self, TableError> {
        if !columns.iter().any(|c| c == SUBJECT_ID) {
            return Err(TableError::MissingColumn {
                column: SUBJECT_ID.to_string(),
            });
        }

        let mut records = Vec::with_capacity(rows.len());
        for (row, cells) in rows.into_iter().enumerate() {
            let raw = cells.get(SUBJECT_ID).unwrap_or(&CellValue::Null);
            let subject_id = raw
                .as_whole_number()
                .ok_or_else(|| TableError::InvalidSubjectId {
                    row,
                    value: raw.to_string(),
                })?;
            records.push(SubjectRecord { subject_id, cells });
        }

        records.sort_by_key(|r| r.subject_id);
        if let Some(pair) = records
            .windows(2)
            .find(|pair| pair[0].subject_id == pair[1].subject_id)
        {
            return Err(TableError::DuplicateSubjectId {
                id: pair[0].subject_id,
            });
        }

        Ok(CandidateTable { columns, records })
    }

    /// Same column set, different rows. Callers pass a subset of `self.records`
    /// in their original order, so the id ordering invariant carries over.
    pub(crate) fn with_records(&self, records: Vec<SubjectRecord>) -> Self {
        CandidateTable {
            columns: self.columns.clone(),
            records,
        }
    }

    /// Column names in load order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[SubjectRecord] {
        &self.records
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn require_column(&self, column: &str) -> Result<(), TableError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(TableError::MissingColumn {
                column: column.to_string(),
            })
        }
    }

    /// Look up a subject by id.
    pub fn record(&self, subject_id: i64) -> Result<&SubjectRecord, TableError> {
        self.records
            .binary_search_by_key(&subject_id, |r| r.subject_id)
            .map(|idx| &self.records[idx])
            .map_err(|_| TableError::UnknownSubject { id: subject_id })
    }

    pub fn subject_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.records.iter().map(|r| r.subject_id)
    }

    /// Sorted distinct values of `column`, without the no-data sentinel.
    pub fn unique_values(&self, column: &str) -> Result<BTreeSet<CellValue>, TableError> {
        self.require_column(column)?;
        Ok(self
            .records
            .iter()
            .map(|r| r.get(column))
            .filter(|v| !v.is_no_data())
            .cloned()
            .collect())
    }
}
