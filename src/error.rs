use thiserror::Error;

/// Failures building or reading a [`CandidateTable`](crate::data::model::CandidateTable).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("column '{column}' is not present in the table")]
    MissingColumn { column: String },

    #[error("row {row}: subject id '{value}' is not an integer")]
    InvalidSubjectId { row: usize, value: String },

    #[error("subject id {id} appears more than once")]
    DuplicateSubjectId { id: i64 },

    #[error("no subject with id {id} in the table")]
    UnknownSubject { id: i64 },
}

/// A single predicate could not be evaluated. Aborts the current filter
/// step only; earlier steps keep their result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("column '{column}' is not present in the table")]
    MissingColumn { column: String },

    #[error(
        "cannot compare different types: column '{column}' holds '{found}', \
         which is not comparable with {expected} value '{value}'"
    )]
    TypeCoercion {
        column: String,
        found: String,
        expected: &'static str,
        value: String,
    },

    #[error("operator '{operator}' on column '{column}' does not accept {reason}")]
    OperatorValueMismatch {
        column: String,
        operator: String,
        reason: &'static str,
    },
}

/// Rejected filter configuration. Always raised before any row is removed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("filter slot {missing} is empty but a later slot is set; slots must be contiguous from 0")]
    SlotGap { missing: usize },

    #[error("filter slot {slot} is defined more than once")]
    DuplicateSlot { slot: usize },

    #[error("filter slot {slot} is missing its {field}")]
    IncompleteSlot { slot: usize, field: &'static str },

    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),

    #[error("filter slot {slot} does not exist; there are {slots} slots")]
    SlotOutOfRange { slot: usize, slots: usize },

    #[error("no filters set")]
    NoFiltersSet,

    #[error("no table loaded")]
    NoTableLoaded,
}
