/// Data layer: roster types, loading, filtering and export.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file, repair headers → CandidateTable
///   └──────────┘
///        │
///        ▼
///   ┌────────────────┐
///   │ CandidateTable  │  SubjectRecord per row, sorted by Subject Id
///   └────────────────┘
///        │
///        ▼
///   ┌──────────┐      ┌──────────┐
///   │  filter   │ ◀── │  chain    │  ordered FilterSpec → ChainReport
///   └──────────┘      └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  filtered table → CSV
///   └──────────┘
/// ```

pub mod chain;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
