use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use super::model::CandidateTable;

/// `filtered_db_2024_Mar_14_0930.csv`
pub fn default_export_name(now: NaiveDateTime) -> String {
    format!("filtered_db_{}.csv", now.format("%Y_%b_%d_%H%M"))
}

/// Write every column of `table` in load order, one subject per row.
/// Cells are written in their display form, so `"-"` stays `"-"`.
pub fn write_table<W: Write>(table: &CandidateTable, writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(table.columns())
        .context("writing CSV header")?;
    for record in table.records() {
        out.write_record(table.columns().iter().map(|c| record.get(c).to_string()))
            .with_context(|| format!("writing subject {}", record.subject_id))?;
    }
    out.flush().context("flushing CSV")?;
    Ok(())
}

/// Export the table to `path`, readable back with
/// [`LoadMode::FilteredExport`](super::loader::LoadMode::FilteredExport).
pub fn write_csv(table: &CandidateTable, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_table(table, file)?;
    log::info!("Exported {} candidates to {}", table.len(), path.display());
    Ok(())
}
