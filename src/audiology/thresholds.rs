use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use serde::Serialize;

use crate::data::model::CandidateTable;
use crate::error::TableError;

use super::degree::HearingLossDegree;

/// Air-conduction test frequencies (Hz) carried by the roster.
pub const AC_FREQUENCIES: [u32; 10] = [250, 500, 750, 1000, 1500, 2000, 3000, 4000, 6000, 8000];

/// Bone-conduction test frequencies (Hz) carried by the roster.
pub const BC_FREQUENCIES: [u32; 4] = [500, 1000, 2000, 4000];

/// Audiometer output range (dB HL). Readings outside it are treated as absent.
pub const HEARING_LEVEL_RANGE: RangeInclusive<i64> = -10..=120;

/// `value` if it is a reading an audiometer could have produced.
pub fn plausible_reading(value: i64) -> Option<i64> {
    HEARING_LEVEL_RANGE.contains(&value).then_some(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Side {
    Right,
    Left,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Right, Side::Left];

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Right => "Right",
            Side::Left => "Left",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Conduction {
    Air,
    Bone,
}

impl Conduction {
    /// Column-name infix: `RightAC 500`, `LeftBC 1000`.
    pub fn abbreviation(self) -> &'static str {
        match self {
            Conduction::Air => "AC",
            Conduction::Bone => "BC",
        }
    }

    pub fn frequencies(self) -> &'static [u32] {
        match self {
            Conduction::Air => &AC_FREQUENCIES,
            Conduction::Bone => &BC_FREQUENCIES,
        }
    }
}

/// Roster column holding one threshold, e.g. `"RightAC 2000"`.
pub fn threshold_column(side: Side, conduction: Conduction, frequency: u32) -> String {
    format!("{side}{} {frequency}", conduction.abbreviation())
}

// ---------------------------------------------------------------------------
// ThresholdMap
// ---------------------------------------------------------------------------

/// One point of an audiogram trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudiogramPoint {
    pub frequency: u32,
    pub threshold: i64,
    pub degree: HearingLossDegree,
}

/// Thresholds (dB HL) for one conduction path, per ear and frequency.
/// `None` marks a reading the roster did not have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdMap {
    pub conduction: Conduction,
    pub right: BTreeMap<u32, Option<i64>>,
    pub left: BTreeMap<u32, Option<i64>>,
}

impl ThresholdMap {
    /// Every frequency of `conduction` present as a key, all absent.
    pub fn new(conduction: Conduction) -> Self {
        let blank: BTreeMap<u32, Option<i64>> =
            conduction.frequencies().iter().map(|&f| (f, None)).collect();
        ThresholdMap {
            conduction,
            right: blank.clone(),
            left: blank,
        }
    }

    pub fn side(&self, side: Side) -> &BTreeMap<u32, Option<i64>> {
        match side {
            Side::Right => &self.right,
            Side::Left => &self.left,
        }
    }

    pub fn get(&self, side: Side, frequency: u32) -> Option<i64> {
        self.side(side).get(&frequency).copied().flatten()
    }

    pub fn set(&mut self, side: Side, frequency: u32, value: Option<i64>) {
        let map = match side {
            Side::Right => &mut self.right,
            Side::Left => &mut self.left,
        };
        map.insert(frequency, value);
    }

    /// Plottable trace for one ear: absent readings dropped, ascending
    /// frequency.
    pub fn series(&self, side: Side) -> Vec<AudiogramPoint> {
        self.side(side)
            .iter()
            .filter_map(|(&frequency, value)| {
                value.map(|threshold| AudiogramPoint {
                    frequency,
                    threshold,
                    degree: HearingLossDegree::classify(threshold),
                })
            })
            .collect()
    }
}

/// AC and BC thresholds for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectThresholds {
    pub subject_id: i64,
    pub ac: ThresholdMap,
    pub bc: ThresholdMap,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

fn extract(
    table: &CandidateTable,
    subject_id: i64,
    conduction: Conduction,
) -> Result<ThresholdMap, TableError> {
    let record = table.record(subject_id)?;
    let mut map = ThresholdMap::new(conduction);
    for side in Side::ALL {
        for &frequency in conduction.frequencies() {
            let value = record
                .get(&threshold_column(side, conduction, frequency))
                .as_whole_number()
                .and_then(plausible_reading);
            map.set(side, frequency, value);
        }
    }
    Ok(map)
}

/// Read a subject's AC and BC thresholds from the roster.
///
/// Every threshold column must exist in the table. A cell that does not
/// read as a whole number in [`HEARING_LEVEL_RANGE`] (the `"-"` sentinel, an
/// empty cell, free text, a corrupt value) becomes an absent entry rather
/// than an error.
pub fn get_thresholds(
    table: &CandidateTable,
    subject_id: i64,
) -> Result<SubjectThresholds, TableError> {
    for conduction in [Conduction::Air, Conduction::Bone] {
        for side in Side::ALL {
            for &frequency in conduction.frequencies() {
                table.require_column(&threshold_column(side, conduction, frequency))?;
            }
        }
    }

    Ok(SubjectThresholds {
        subject_id,
        ac: extract(table, subject_id, Conduction::Air)?,
        bc: extract(table, subject_id, Conduction::Bone)?,
    })
}
