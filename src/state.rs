use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::audiology::{Recommendation, SubjectThresholds, get_thresholds, recommend};
use crate::data::chain::{self, ChainReport, FilterSpec};
use crate::data::filter::Filter;
use crate::data::loader::{self, LoadMode};
use crate::data::model::{CandidateTable, CellValue};
use crate::error::{ConfigError, TableError};

/// Number of editable filter slots.
pub const FILTER_SLOTS: usize = 10;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything the browser holds between user actions, independent of how
/// it is presented.
#[derive(Debug, Default)]
pub struct Session {
    /// Current table (None until a roster is loaded).
    pub table: Option<CandidateTable>,

    /// Row count of the roster as loaded, before any filtering.
    pub source_rows: usize,

    /// Filter editor slots, applied in index order.
    pub slots: [Option<Filter>; FILTER_SLOTS],

    /// Trace of the last chain run.
    pub last_report: Option<ChainReport>,

    /// Status / error message for the user.
    pub status_message: Option<String>,
}

/// What the browser shows for one selected subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectView {
    pub thresholds: SubjectThresholds,
    pub recommendation: Recommendation,
}

impl Session {
    /// Replace the current table with a freshly loaded roster.
    pub fn set_table(&mut self, table: CandidateTable) {
        self.source_rows = table.len();
        self.status_message = Some(format!("{} candidates loaded", table.len()));
        self.table = Some(table);
        self.last_report = None;
    }

    pub fn load(&mut self, path: &Path, mode: LoadMode) -> anyhow::Result<()> {
        let table = loader::load_file(path, mode)?;
        self.set_table(table);
        Ok(())
    }

    pub fn set_slot(&mut self, slot: usize, filter: Option<Filter>) -> Result<(), ConfigError> {
        let entry = self.slots.get_mut(slot).ok_or(ConfigError::SlotOutOfRange {
            slot,
            slots: FILTER_SLOTS,
        })?;
        *entry = filter;
        Ok(())
    }

    /// Fill the slots from `spec`, clearing the rest.
    pub fn set_slots(&mut self, spec: &FilterSpec) -> Result<(), ConfigError> {
        if spec.len() > FILTER_SLOTS {
            return Err(ConfigError::SlotOutOfRange {
                slot: spec.len() - 1,
                slots: FILTER_SLOTS,
            });
        }
        self.clear_filters();
        for (slot, filter) in spec.filters().iter().enumerate() {
            self.slots[slot] = Some(filter.clone());
        }
        Ok(())
    }

    pub fn clear_filters(&mut self) {
        self.slots = Default::default();
    }

    /// Run the populated slots against the current table.
    ///
    /// Nothing runs if every slot is empty or the populated slots have a
    /// gap. On a failing step the table keeps the result of the last step
    /// that succeeded and the failure is in the returned report.
    pub fn apply_filters(&mut self) -> Result<&ChainReport, ConfigError> {
        if self.slots.iter().all(Option::is_none) {
            self.status_message = Some(ConfigError::NoFiltersSet.to_string());
            return Err(ConfigError::NoFiltersSet);
        }
        let spec = FilterSpec::from_optional_slots(&self.slots).inspect_err(|e| {
            self.status_message = Some(e.to_string());
        })?;
        self.apply_spec(&spec)
    }

    /// Run `spec` against the current table, bypassing the slots.
    pub fn apply_spec(&mut self, spec: &FilterSpec) -> Result<&ChainReport, ConfigError> {
        let table = self.table.as_ref().ok_or(ConfigError::NoTableLoaded)?;
        let report = chain::run(table, spec);

        self.status_message = Some(match &report.failure {
            Some(failure) => format!("filter {} failed: {}", failure.slot, failure.error),
            None => format!("{} candidates remaining", report.final_rows()),
        });
        self.table = Some(report.table.clone());
        Ok(self.last_report.insert(report))
    }

    /// Thresholds and fitting recommendation for one subject of the
    /// current table.
    pub fn select_subject(&self, subject_id: i64) -> Result<SubjectView, TableError> {
        let table = self
            .table
            .as_ref()
            .ok_or(TableError::UnknownSubject { id: subject_id })?;
        let thresholds = get_thresholds(table, subject_id)?;
        let recommendation = recommend(&thresholds);
        Ok(SubjectView {
            thresholds,
            recommendation,
        })
    }

    pub fn unique_values(&self, column: &str) -> Result<BTreeSet<CellValue>, TableError> {
        match &self.table {
            Some(table) => table.unique_values(column),
            None => Err(TableError::MissingColumn {
                column: column.to_string(),
            }),
        }
    }
}
