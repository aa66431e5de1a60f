use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::audiology::{Conduction, Side, threshold_column};
use crate::error::{ConfigError, FilterError};

use super::filter::{self, Filter, FilterValue, Operator};
use super::model::{CandidateTable, CellValue};

pub const STATUS: &str = "Status";
pub const GOOD_CANDIDATE: &str = "Good Candidate";
pub const EMPLOYMENT_STATUS: &str = "Employment Status";
pub const MILES_AWAY: &str = "Miles From Starkey";

/// Distance cap applied by the scrub preset unless configured otherwise.
pub const DEFAULT_MAX_MILES: i64 = 60;

const SPEC_HEADER: [&str; 3] = ["column", "operator", "value"];

// ---------------------------------------------------------------------------
// FilterSpec – ordered, gap-free list of predicates
// ---------------------------------------------------------------------------

/// An ordered filter chain. Slot `n` of the editor is element `n` here;
/// every constructor rejects gaps before anything runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterSpec {
    filters: Vec<Filter>,
}

impl FilterSpec {
    pub fn new(filters: Vec<Filter>) -> Self {
        FilterSpec { filters }
    }

    /// Build from explicitly indexed slots. Indices must be unique and run
    /// contiguously from 0.
    pub fn from_slots<I>(slots: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (usize, Filter)>,
    {
        let mut by_index = BTreeMap::new();
        for (slot, filter) in slots {
            if by_index.insert(slot, filter).is_some() {
                return Err(ConfigError::DuplicateSlot { slot });
            }
        }
        for (expected, slot) in by_index.keys().enumerate() {
            if *slot != expected {
                return Err(ConfigError::SlotGap { missing: expected });
            }
        }
        Ok(FilterSpec {
            filters: by_index.into_values().collect(),
        })
    }

    /// Build from a fixed bank of editor slots. Empty slots may trail the
    /// last populated one but not sit between populated ones.
    pub fn from_optional_slots(slots: &[Option<Filter>]) -> Result<Self, ConfigError> {
        FilterSpec::from_slots(
            slots
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| slot.clone().map(|f| (i, f))),
        )
    }

    /// The fixed initial clean-up: active records only, no employees, no
    /// poor ratings, within `max_miles`.
    pub fn scrub(max_miles: i64) -> Self {
        FilterSpec::new(vec![
            Filter::compare(STATUS, Operator::Equals, "Active".into()),
            Filter::compare(EMPLOYMENT_STATUS, Operator::NotEquals, "Employee".into()),
            Filter::contains(
                GOOD_CANDIDATE,
                [
                    CellValue::NoData,
                    "Excellent".into(),
                    "Good".into(),
                    "Fair".into(),
                ],
            ),
            Filter::compare(MILES_AWAY, Operator::LessOrEqual, CellValue::Integer(max_miles)),
        ])
    }

    /// Keep candidates whose air-conduction thresholds fall inside
    /// `lower..=upper` at every listed frequency, in both ears.
    pub fn ac_threshold_window(limits: &BTreeMap<u32, (i64, i64)>) -> Self {
        let mut filters = Vec::with_capacity(limits.len() * 4);
        for side in Side::ALL {
            for (&frequency, &(lower, upper)) in limits {
                let column = threshold_column(side, Conduction::Air, frequency);
                filters.push(Filter::compare(
                    &column,
                    Operator::LessOrEqual,
                    CellValue::Integer(upper),
                ));
                filters.push(Filter::compare(
                    &column,
                    Operator::GreaterOrEqual,
                    CellValue::Integer(lower),
                ));
            }
        }
        FilterSpec::new(filters)
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    // -- Exchange file --

    /// Read the `column,operator,value` side-channel file. Row `n` is slot
    /// `n`; a row with all three fields empty is an empty slot.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers().context("reading filter list header")?;
        if headers.len() != SPEC_HEADER.len() {
            bail!(
                "filter list header has {} fields, expected '{}'",
                headers.len(),
                SPEC_HEADER.join(",")
            );
        }

        let mut slots = Vec::new();
        for (slot, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("filter list row {slot}"))?;
            let field = |i: usize| record.get(i).unwrap_or("");
            let (column, operator, value) = (field(0), field(1), field(2));

            if column.is_empty() && operator.is_empty() && value.is_empty() {
                slots.push(None);
                continue;
            }
            for (name, content) in SPEC_HEADER.into_iter().zip([column, operator, value]) {
                if content.is_empty() {
                    return Err(ConfigError::IncompleteSlot { slot, field: name }.into());
                }
            }

            let operator: Operator = operator.parse()?;
            slots.push(Some(Filter {
                column: column.to_string(),
                operator,
                value: FilterValue::parse(operator, value),
            }));
        }

        Ok(FilterSpec::from_optional_slots(&slots)?)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer
            .write_record(SPEC_HEADER)
            .context("writing filter list header")?;
        for filter in &self.filters {
            writer
                .write_record([
                    filter.column.as_str(),
                    filter.operator.as_str(),
                    filter.value.to_string().as_str(),
                ])
                .with_context(|| format!("writing filter {filter}"))?;
        }
        writer.flush().context("flushing filter list")?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening filter list {}", path.display()))?;
        FilterSpec::read_csv(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("creating filter list {}", path.display()))?;
        self.write_csv(file)
    }
}

// ---------------------------------------------------------------------------
// Chain runner
// ---------------------------------------------------------------------------

/// Effect of one applied filter.
#[derive(Debug, Clone, PartialEq)]
pub struct StepTrace {
    pub slot: usize,
    pub filter: Filter,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl fmt::Display for StepTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} → {} candidates",
            self.slot, self.filter, self.rows_before, self.rows_after
        )
    }
}

/// The step that stopped the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub slot: usize,
    pub filter: Filter,
    pub error: FilterError,
}

/// Outcome of [`run`]. `table` is the result of the last step that
/// succeeded, so a failing step never loses earlier narrowing.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainReport {
    pub table: CandidateTable,
    pub initial_rows: usize,
    pub steps: Vec<StepTrace>,
    pub failure: Option<StepFailure>,
}

impl ChainReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    pub fn final_rows(&self) -> usize {
        self.table.len()
    }
}

impl fmt::Display for ChainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Starting candidates: {}", self.initial_rows)?;
        for step in &self.steps {
            writeln!(f, "{step}")?;
        }
        if let Some(failure) = &self.failure {
            writeln!(f, "[{}] {}: {}", failure.slot, failure.filter, failure.error)?;
        }
        write!(f, "Remaining candidates: {}", self.final_rows())
    }
}

/// Apply `spec` to `table` slot by slot.
pub fn run(table: &CandidateTable, spec: &FilterSpec) -> ChainReport {
    let initial_rows = table.len();
    let mut current = table.clone();
    let mut steps = Vec::with_capacity(spec.len());

    if spec.is_empty() {
        log::info!("No filters set; {initial_rows} candidates unchanged");
    }

    for (slot, filter) in spec.filters().iter().enumerate() {
        let rows_before = current.len();
        match filter::apply(&current, filter) {
            Ok(next) => {
                steps.push(StepTrace {
                    slot,
                    filter: filter.clone(),
                    rows_before,
                    rows_after: next.len(),
                });
                current = next;
            }
            Err(error) => {
                log::warn!("Filter chain stopped at slot {slot} ({filter}): {error}");
                return ChainReport {
                    table: current,
                    initial_rows,
                    steps,
                    failure: Some(StepFailure {
                        slot,
                        filter: filter.clone(),
                        error,
                    }),
                };
            }
        }
    }

    ChainReport {
        table: current,
        initial_rows,
        steps,
        failure: None,
    }
}
