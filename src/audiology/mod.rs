//! Audiometric thresholds and the fitting recommendation built on them.
//!
//! ```text
//!   CandidateTable
//!        │  get_thresholds(subject_id)
//!        ▼
//!   ┌───────────────────┐
//!   │ SubjectThresholds │  AC + BC maps, absent readings kept as None
//!   └───────────────────┘
//!        │  recommend
//!        ▼
//!   ┌────────────────┐
//!   │ Recommendation │  matrix / coupling / vent per ear
//!   └────────────────┘
//! ```

pub mod degree;
pub mod recommend;
pub mod thresholds;

pub use degree::HearingLossDegree;
pub use recommend::{
    BatchEntry, Coupling, MissingThreshold, PowerMatrix, Recommendation, SideRecommendation,
    VentSize, recommend, recommend_all, recommend_side,
};
pub use thresholds::{
    AC_FREQUENCIES, AudiogramPoint, BC_FREQUENCIES, Conduction, HEARING_LEVEL_RANGE, Side,
    SubjectThresholds, ThresholdMap, get_thresholds, plausible_reading, threshold_column,
};
