//! Candidate roster browser for hearing studies: narrow a subject export
//! with an ordered filter chain, then read each subject's audiogram and
//! hearing-aid fitting recommendation.

pub mod audiology;
pub mod data;
pub mod error;
pub mod state;

pub use data::loader::{LoadMode, load_file};
pub use data::model::{CandidateTable, CellValue, SubjectRecord};
pub use error::{ConfigError, FilterError, TableError};
pub use state::Session;
