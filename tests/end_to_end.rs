use std::collections::BTreeMap;

use proptest::prelude::*;
use subject_browser::audiology::{Coupling, recommend_all};
use subject_browser::data::chain::{
    self, EMPLOYMENT_STATUS, FilterSpec, GOOD_CANDIDATE, MILES_AWAY, STATUS,
};
use subject_browser::data::export::write_csv;
use subject_browser::data::model::SUBJECT_ID;
use subject_browser::{CandidateTable, CellValue, LoadMode, load_file};

const STATUSES: [&str; 3] = ["Active", "Inactive", "-"];
const EMPLOYMENT: [&str; 4] = ["Retired", "Employee", "Full Time", "-"];
const RATINGS: [&str; 5] = ["Excellent", "Good", "Fair", "Poor", "-"];

fn roster(rows: &[(usize, usize, usize, Option<i64>)]) -> CandidateTable {
    let columns = [SUBJECT_ID, STATUS, EMPLOYMENT_STATUS, GOOD_CANDIDATE, MILES_AWAY]
        .map(String::from)
        .to_vec();
    let rows = rows
        .iter()
        .enumerate()
        .map(|(i, &(status, employment, rating, miles))| {
            BTreeMap::from([
                (SUBJECT_ID.to_string(), CellValue::Integer(i as i64 + 1)),
                (STATUS.to_string(), CellValue::parse(STATUSES[status])),
                (EMPLOYMENT_STATUS.to_string(), CellValue::parse(EMPLOYMENT[employment])),
                (GOOD_CANDIDATE.to_string(), CellValue::parse(RATINGS[rating])),
                (
                    MILES_AWAY.to_string(),
                    miles.map_or(CellValue::NoData, CellValue::Integer),
                ),
            ])
        })
        .collect();
    CandidateTable::from_rows(columns, rows).unwrap()
}

fn subject_row() -> impl Strategy<Value = (usize, usize, usize, Option<i64>)> {
    (
        0..STATUSES.len(),
        0..EMPLOYMENT.len(),
        0..RATINGS.len(),
        prop::option::weighted(0.9, 0i64..200),
    )
}

proptest! {
    #[test]
    fn scrub_keeps_only_eligible_subjects(rows in prop::collection::vec(subject_row(), 100)) {
        let table = roster(&rows);
        let report = chain::run(&table, &FilterSpec::scrub(60));

        prop_assert!(report.is_complete());
        prop_assert!(report.final_rows() <= 100);
        prop_assert_eq!(report.steps.len(), 4);

        for record in report.table.records() {
            prop_assert_eq!(record.get(STATUS), &CellValue::from("Active"));
            prop_assert_ne!(record.get(EMPLOYMENT_STATUS), &CellValue::from("Employee"));
            prop_assert!(!record.get(EMPLOYMENT_STATUS).is_no_data());
            let rating = record.get(GOOD_CANDIDATE).to_string();
            prop_assert!(["Excellent", "Good", "Fair"].contains(&rating.as_str()));
            let miles = record.get(MILES_AWAY).as_whole_number();
            prop_assert!(miles.is_some_and(|m| m <= 60));
        }

        let expected = rows
            .iter()
            .filter(|&&(status, employment, rating, miles)| {
                STATUSES[status] == "Active"
                    && !matches!(EMPLOYMENT[employment], "Employee" | "-")
                    && rating <= 2
                    && miles.is_some_and(|m| m <= 60)
            })
            .count();
        prop_assert_eq!(report.final_rows(), expected);
    }
}

#[test]
fn roster_file_through_filter_and_export() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("export.csv");

    let mut text = String::from(
        "Subject Id,Status,Employment Status,Good Candidate,Miles From Starkey,Date Of Birth",
    );
    for side in ["Right", "Left"] {
        for f in [250, 500, 750, 1000, 1500, 2000, 3000, 4000, 6000, 8000] {
            text.push_str(&format!(",{side}AC {f}"));
        }
    }
    for f in [500, 1000, 2000, 4000] {
        text.push_str(&format!(",RightBC  {f}"));
    }
    for f in [500, 1000, 2000, 4000] {
        text.push_str(&format!(",L Pt Bc {f}"));
    }
    text.push('\n');
    let ac_mild = "20,25,30,35,40,45,50,55,60,65";
    let bc = "20,30,40,50";
    for (id, status, miles, right_ac) in [
        (30, "Active", "12", ac_mild),
        (10, "Active", "90", ac_mild),
        (20, "Inactive", "5", ac_mild),
        (40, "Active", "33", "20,-,30,35,40,45,50,55,60,65"),
    ] {
        text.push_str(&format!(
            "{id},{status},Retired,Good,{miles},4/1/1955,{right_ac},{ac_mild},{bc},{bc}\n"
        ));
    }
    std::fs::write(&input, text).unwrap();

    let table = load_file(&input, LoadMode::FullExport).unwrap();
    assert_eq!(table.subject_ids().collect::<Vec<_>>(), vec![10, 20, 30, 40]);
    assert!(table.has_column("LeftBC 2000"));
    assert!(table.has_column("Age"));

    let report = chain::run(&table, &FilterSpec::scrub(60));
    assert_eq!(report.table.subject_ids().collect::<Vec<_>>(), vec![30, 40]);

    let batch = recommend_all(&report.table);
    assert_eq!(batch.len(), 2);
    let complete = batch[0].outcome.as_ref().unwrap();
    assert_eq!(complete.right.coupling, Coupling::OpenDome);
    let missing_500 = batch[1].outcome.as_ref().unwrap();
    assert_eq!(missing_500.right.matrix, None);
    assert_eq!(missing_500.right.coupling, Coupling::Unknown);
    assert_eq!(missing_500.left.coupling, Coupling::OpenDome);

    let output = dir.path().join("filtered.csv");
    write_csv(&report.table, &output).unwrap();
    let reloaded = load_file(&output, LoadMode::FilteredExport).unwrap();
    assert_eq!(reloaded, report.table);
}
