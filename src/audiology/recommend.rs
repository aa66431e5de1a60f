//! Receiver-in-canal fitting table: power matrix, acoustic coupling and
//! earmold vent size per ear, from air-conduction thresholds.
//!
//! Thresholds are read as `Option`s, so an absent reading is an ordinary
//! value. A step that needs a reading it does not have yields
//! [`MissingThreshold`] and only that ear is marked [`Coupling::Unknown`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::data::model::CandidateTable;
use crate::error::TableError;

use super::thresholds::{
    Conduction, Side, SubjectThresholds, ThresholdMap, get_thresholds, plausible_reading,
    threshold_column,
};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Receiver power class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PowerMatrix {
    /// Listed among the dome-compatible classes but never produced by the
    /// table.
    #[serde(rename = "S")]
    Standard,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "P")]
    Power,
    #[serde(rename = "UP")]
    UltraPower,
}

impl PowerMatrix {
    pub fn label(self) -> &'static str {
        match self {
            PowerMatrix::Standard => "S",
            PowerMatrix::Medium => "M",
            PowerMatrix::Power => "P",
            PowerMatrix::UltraPower => "UP",
        }
    }

    fn allows_dome(self) -> bool {
        matches!(
            self,
            PowerMatrix::Standard | PowerMatrix::Medium | PowerMatrix::Power
        )
    }
}

impl fmt::Display for PowerMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Coupling {
    #[serde(rename = "Open Dome")]
    OpenDome,
    #[serde(rename = "Occluded Dome")]
    OccludedDome,
    Earmold,
    /// Thresholds were all present but no rule matched.
    Error,
    /// A rule needed a threshold the subject does not have.
    #[serde(rename = "-")]
    Unknown,
}

impl Coupling {
    pub fn label(self) -> &'static str {
        match self {
            Coupling::OpenDome => "Open Dome",
            Coupling::OccludedDome => "Occluded Dome",
            Coupling::Earmold => "Earmold",
            Coupling::Error => "Error",
            Coupling::Unknown => "-",
        }
    }
}

impl fmt::Display for Coupling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VentSize {
    Large,
    Medium,
    Small,
    /// Coupling is not an earmold.
    #[serde(rename = "NA")]
    NotApplicable,
    #[serde(rename = "Calculation Error")]
    CalculationError,
}

impl VentSize {
    pub fn label(self) -> &'static str {
        match self {
            VentSize::Large => "Large",
            VentSize::Medium => "Medium",
            VentSize::Small => "Small",
            VentSize::NotApplicable => "NA",
            VentSize::CalculationError => "Calculation Error",
        }
    }
}

impl fmt::Display for VentSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A fitting rule needed an air-conduction reading the subject lacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("missing threshold '{column}'")]
pub struct MissingThreshold {
    pub side: Side,
    pub frequency: u32,
    pub column: String,
}

impl MissingThreshold {
    fn new(side: Side, frequency: u32) -> Self {
        MissingThreshold {
            side,
            frequency,
            column: threshold_column(side, Conduction::Air, frequency),
        }
    }
}

/// Fitting recommendation for one ear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideRecommendation {
    /// `None` when the recommendation threshold could not be formed.
    pub matrix: Option<PowerMatrix>,
    pub coupling: Coupling,
    pub vent: VentSize,
    /// The reading that made this ear uncategorizable, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<MissingThreshold>,
}

impl SideRecommendation {
    fn unknown(matrix: Option<PowerMatrix>, missing: MissingThreshold) -> Self {
        SideRecommendation {
            matrix,
            coupling: Coupling::Unknown,
            vent: VentSize::NotApplicable,
            missing: Some(missing),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub right: SideRecommendation,
    pub left: SideRecommendation,
}

impl Recommendation {
    pub fn side(&self, side: Side) -> &SideRecommendation {
        match side {
            Side::Right => &self.right,
            Side::Left => &self.left,
        }
    }
}

// ---------------------------------------------------------------------------
// Rule evaluation
// ---------------------------------------------------------------------------

/// Air-conduction readings of one ear.
#[derive(Clone, Copy)]
struct Ear<'a> {
    ac: &'a ThresholdMap,
    side: Side,
}

impl Ear<'_> {
    fn get(self, frequency: u32) -> Option<i64> {
        self.ac
            .get(self.side, frequency)
            .and_then(plausible_reading)
    }

    fn require(self, frequency: u32) -> Result<i64, MissingThreshold> {
        self.get(frequency)
            .ok_or_else(|| MissingThreshold::new(self.side, frequency))
    }

    fn present(self, frequency: u32) -> Truth {
        Truth::from(self.get(frequency).is_some())
    }

    fn test(self, frequency: u32, predicate: impl FnOnce(i64) -> bool) -> Truth {
        match self.get(frequency) {
            Some(value) => Truth::from(predicate(value)),
            None => Truth::Missing(frequency),
        }
    }
}

/// Outcome of a rule condition over possibly-absent readings. Conditions
/// short-circuit left to right; a comparison against an absent reading
/// poisons the rest of the condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Truth {
    Yes,
    No,
    Missing(u32),
}

impl From<bool> for Truth {
    fn from(b: bool) -> Self {
        if b { Truth::Yes } else { Truth::No }
    }
}

impl Truth {
    fn and(self, rhs: impl FnOnce() -> Truth) -> Truth {
        match self {
            Truth::Yes => rhs(),
            other => other,
        }
    }

    fn or(self, rhs: impl FnOnce() -> Truth) -> Truth {
        match self {
            Truth::No => rhs(),
            other => other,
        }
    }
}

/// The threshold that drives the matrix choice.
fn recommendation_threshold(ear: Ear<'_>) -> Result<i64, MissingThreshold> {
    let t500 = ear.require(500)?;
    let t2000 = ear.require(2000)?;
    Ok(if t2000 >= t500 { t2000 } else { t500 + 10 })
}

/// Receiver power class for a recommendation threshold.
pub fn power_matrix(recommendation_threshold: i64) -> PowerMatrix {
    match recommendation_threshold {
        ..=65 => PowerMatrix::Medium,
        // stock receiver
        66..=75 => PowerMatrix::Power,
        // custom-cased receiver
        76..=80 => PowerMatrix::Power,
        _ => PowerMatrix::UltraPower,
    }
}

/// Coupling rules, first match wins. Conditions are kept operand-for-operand as the clinical table
/// states them, including the presence tests on 250 Hz.
fn coupling(ear: Ear<'_>, matrix: PowerMatrix) -> Result<Coupling, MissingThreshold> {
    let dome = Truth::from(matrix.allows_dome());

    let open_dome = ear
        .present(250)
        .and(|| ear.test(500, |t| t < 30))
        .and(|| ear.test(1000, |t| t <= 60))
        .and(|| dome);

    let occluded_dome = ear
        .present(250)
        .or(|| ear.test(500, |t| t > 30))
        .and(|| ear.present(250).and(|| ear.test(500, |t| t <= 50)))
        .and(|| ear.test(1000, |t| t <= 60))
        .and(|| dome);

    let rules = [
        (open_dome, Coupling::OpenDome),
        (occluded_dome, Coupling::OccludedDome),
        (
            ear.present(250).or(|| ear.test(500, |t| t > 50)),
            Coupling::Earmold,
        ),
        (ear.test(1000, |t| t > 60), Coupling::Earmold),
        (
            Truth::from(matrix == PowerMatrix::UltraPower),
            Coupling::Earmold,
        ),
    ];

    let mut first_missing = None;
    for (truth, coupling) in rules {
        match truth {
            Truth::Yes => return Ok(coupling),
            Truth::Missing(frequency) => {
                if first_missing.is_none() {
                    first_missing = Some(frequency);
                }
            }
            Truth::No => {}
        }
    }

    match first_missing {
        Some(frequency) => Err(MissingThreshold::new(ear.side, frequency)),
        None => Ok(Coupling::Error),
    }
}

/// Earmold vent from the 500/1000 Hz average.
pub fn vent_size(average: f64) -> VentSize {
    if average <= 40.0 {
        VentSize::Large
    } else if average < 55.0 {
        VentSize::Medium
    } else if average >= 55.0 {
        VentSize::Small
    } else {
        VentSize::CalculationError
    }
}

fn low_frequency_average(ear: Ear<'_>) -> Result<f64, MissingThreshold> {
    let t500 = ear.require(500)?;
    let t1000 = ear.require(1000)?;
    Ok((t500 + t1000) as f64 / 2.0)
}

/// Recommendation for one ear. Never fails: missing readings surface as
/// [`Coupling::Unknown`] with the offending column attached.
pub fn recommend_side(ac: &ThresholdMap, side: Side) -> SideRecommendation {
    let ear = Ear { ac, side };

    let matrix = match recommendation_threshold(ear) {
        Ok(rt) => power_matrix(rt),
        Err(missing) => {
            log::warn!("{side} ear: no power matrix, {missing}");
            return SideRecommendation::unknown(None, missing);
        }
    };

    let coupling = match coupling(ear, matrix) {
        Ok(coupling) => coupling,
        Err(missing) => {
            log::warn!("{side} ear: coupling undetermined, {missing}");
            return SideRecommendation::unknown(Some(matrix), missing);
        }
    };

    let vent = if coupling == Coupling::Earmold {
        match low_frequency_average(ear) {
            Ok(average) => vent_size(average),
            Err(missing) => {
                log::warn!("{side} ear: vent undetermined, {missing}");
                return SideRecommendation::unknown(Some(matrix), missing);
            }
        }
    } else {
        VentSize::NotApplicable
    };

    SideRecommendation {
        matrix: Some(matrix),
        coupling,
        vent,
        missing: None,
    }
}

/// Recommendation for both ears. The fitting table reads air conduction
/// only; bone conduction travels alongside for display.
pub fn recommend(thresholds: &SubjectThresholds) -> Recommendation {
    Recommendation {
        right: recommend_side(&thresholds.ac, Side::Right),
        left: recommend_side(&thresholds.ac, Side::Left),
    }
}

/// One subject's entry in [`recommend_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub subject_id: i64,
    pub outcome: Result<Recommendation, TableError>,
}

/// Recommend for every subject in the table. A subject whose thresholds
/// cannot be read is reported in its own entry; the batch carries on.
pub fn recommend_all(table: &CandidateTable) -> Vec<BatchEntry> {
    table
        .subject_ids()
        .map(|subject_id| BatchEntry {
            subject_id,
            outcome: get_thresholds(table, subject_id).map(|t| recommend(&t)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::audiology::AC_FREQUENCIES;

    fn ac(right: &[(u32, i64)]) -> ThresholdMap {
        let mut map = ThresholdMap::new(Conduction::Air);
        for &(f, t) in right {
            map.set(Side::Right, f, Some(t));
        }
        map
    }

    fn right(map: &ThresholdMap) -> SideRecommendation {
        recommend_side(map, Side::Right)
    }

    #[test]
    fn matrix_boundaries() {
        assert_eq!(power_matrix(65), PowerMatrix::Medium);
        assert_eq!(power_matrix(66), PowerMatrix::Power);
        assert_eq!(power_matrix(75), PowerMatrix::Power);
        assert_eq!(power_matrix(80), PowerMatrix::Power);
        assert_eq!(power_matrix(81), PowerMatrix::UltraPower);
        assert_eq!(power_matrix(-10), PowerMatrix::Medium);
    }

    #[test]
    fn recommendation_threshold_prefers_2000() {
        let rising = ac(&[(500, 40), (2000, 70)]);
        let ear = Ear {
            ac: &rising,
            side: Side::Right,
        };
        assert_eq!(recommendation_threshold(ear), Ok(70));

        let falling = ac(&[(500, 60), (2000, 50)]);
        let ear = Ear {
            ac: &falling,
            side: Side::Right,
        };
        assert_eq!(recommendation_threshold(ear), Ok(70));
    }

    #[test]
    fn open_dome() {
        let map = ac(&[(250, 20), (500, 20), (1000, 50), (2000, 40)]);
        let rec = right(&map);
        assert_eq!(rec.matrix, Some(PowerMatrix::Medium));
        assert_eq!(rec.coupling, Coupling::OpenDome);
        assert_eq!(rec.vent, VentSize::NotApplicable);
        assert_eq!(rec.missing, None);
    }

    #[test]
    fn occluded_dome() {
        let map = ac(&[(250, 40), (500, 40), (1000, 50), (2000, 55)]);
        let rec = right(&map);
        assert_eq!(rec.matrix, Some(PowerMatrix::Medium));
        assert_eq!(rec.coupling, Coupling::OccludedDome);
        assert_eq!(rec.vent, VentSize::NotApplicable);
    }

    #[test]
    fn loud_500_without_250_is_an_earmold() {
        let map = ac(&[(500, 60), (1000, 60), (2000, 60)]);
        let rec = right(&map);
        assert_eq!(rec.matrix, Some(PowerMatrix::Medium));
        assert_eq!(rec.coupling, Coupling::Earmold);
        assert_eq!(rec.vent, VentSize::Small);
    }

    #[test]
    fn present_250_falls_through_to_earmold() {
        // 500 Hz above 50 fails both dome rules; the 250 Hz presence test
        // then selects an earmold.
        let map = ac(&[(250, 45), (500, 52), (1000, 55), (2000, 50)]);
        assert_eq!(right(&map).coupling, Coupling::Earmold);
    }

    #[test]
    fn steep_1000_is_an_earmold() {
        let map = ac(&[(500, 25), (1000, 65), (2000, 40)]);
        let rec = right(&map);
        assert_eq!(rec.coupling, Coupling::Earmold);
        assert_eq!(rec.vent, VentSize::Medium);
    }

    #[test]
    fn ultra_power_is_an_earmold() {
        // No 250 Hz, 500 Hz mild, 1000 Hz within dome range, but 2000 Hz
        // drives the matrix to UP.
        let map = ac(&[(500, 25), (1000, 55), (2000, 85)]);
        let rec = right(&map);
        assert_eq!(rec.matrix, Some(PowerMatrix::UltraPower));
        assert_eq!(rec.coupling, Coupling::Earmold);
        assert_eq!(rec.vent, VentSize::Large);
    }

    #[test]
    fn nothing_matches_is_an_error() {
        // No 250 Hz; 500 Hz at 30 is neither < 30 nor > 30.
        let map = ac(&[(500, 30), (1000, 40), (2000, 50)]);
        let rec = right(&map);
        assert_eq!(rec.matrix, Some(PowerMatrix::Medium));
        assert_eq!(rec.coupling, Coupling::Error);
        assert_eq!(rec.vent, VentSize::NotApplicable);
        assert_eq!(rec.missing, None);
    }

    #[test]
    fn vent_sizes() {
        assert_eq!(vent_size(30.0), VentSize::Large);
        assert_eq!(vent_size(40.0), VentSize::Large);
        assert_eq!(vent_size(45.0), VentSize::Medium);
        assert_eq!(vent_size(54.5), VentSize::Medium);
        assert_eq!(vent_size(55.0), VentSize::Small);
        assert_eq!(vent_size(60.0), VentSize::Small);
        assert_eq!(vent_size(f64::NAN), VentSize::CalculationError);
    }

    #[test]
    fn earmold_vent_from_low_frequency_average() {
        let cases = [(30, VentSize::Large), (45, VentSize::Medium), (60, VentSize::Small)];
        for (t, expected) in cases {
            // 2000 Hz at 90 forces UP, so neither dome rule applies.
            let map = ac(&[(250, 70), (500, t), (1000, t), (2000, 90)]);
            let rec = right(&map);
            assert_eq!(rec.coupling, Coupling::Earmold, "t = {t}");
            assert_eq!(rec.vent, expected, "t = {t}");
        }
    }

    #[test]
    fn missing_matrix_input_marks_ear_unknown() {
        let map = ac(&[(250, 20), (500, 20), (1000, 20)]);
        let rec = right(&map);
        assert_eq!(rec.matrix, None);
        assert_eq!(rec.coupling, Coupling::Unknown);
        assert_eq!(rec.vent, VentSize::NotApplicable);
        assert_eq!(rec.missing.unwrap().column, "RightAC 2000");
    }

    #[test]
    fn missing_coupling_input_marks_ear_unknown() {
        // 1000 Hz absent: every rule either fails or needs it.
        let map = ac(&[(500, 20), (2000, 20)]);
        let rec = right(&map);
        assert_eq!(rec.matrix, Some(PowerMatrix::Medium));
        assert_eq!(rec.coupling, Coupling::Unknown);
        assert_eq!(rec.missing.unwrap().column, "RightAC 1000");
    }

    #[test]
    fn later_rule_can_match_after_missing_operand() {
        // 1000 Hz absent poisons both dome rules, but 250 Hz is present so
        // the earmold rule still decides. The vent then needs 1000 Hz.
        let map = ac(&[(250, 20), (500, 20), (2000, 20)]);
        let rec = right(&map);
        assert_eq!(rec.coupling, Coupling::Unknown);
        assert_eq!(rec.missing.unwrap().column, "RightAC 1000");
    }

    #[test]
    fn one_ear_failing_leaves_the_other() {
        let mut map = ac(&[(250, 20), (500, 20), (1000, 50), (2000, 40)]);
        map.set(Side::Left, 500, Some(40));
        let thresholds = SubjectThresholds {
            subject_id: 1,
            ac: map,
            bc: ThresholdMap::new(Conduction::Bone),
        };

        let rec = recommend(&thresholds);
        assert_eq!(rec.right.coupling, Coupling::OpenDome);
        assert_eq!(rec.left.coupling, Coupling::Unknown);
        assert_eq!(rec.side(Side::Left).missing.as_ref().unwrap().side, Side::Left);
    }

    #[test]
    fn corrupt_reading_counts_as_missing() {
        let map = ac(&[(250, 20), (500, i64::MAX), (1000, 20), (2000, 0)]);
        let rec = right(&map);
        assert_eq!(rec.matrix, None);
        assert_eq!(rec.coupling, Coupling::Unknown);
        assert_eq!(rec.missing.unwrap().column, "RightAC 500");

        // Earmold vent average with an impossible 1000 Hz value.
        let map = ac(&[(250, 70), (500, 60), (1000, i64::MIN), (2000, 90)]);
        let rec = right(&map);
        assert_eq!(rec.coupling, Coupling::Unknown);
        assert_eq!(rec.missing.unwrap().column, "RightAC 1000");
    }

    #[test]
    fn serializes_clinical_labels() {
        let map = ac(&[(500, 60), (1000, 60), (2000, 60)]);
        let json = serde_json::to_value(right(&map)).unwrap();
        assert_eq!(json["matrix"], "M");
        assert_eq!(json["coupling"], "Earmold");
        assert_eq!(json["vent"], "Small");
        assert!(json.get("missing").is_none());
    }

    fn reading() -> impl Strategy<Value = Option<i64>> {
        prop::option::of(-10i64..=120)
    }

    proptest! {
        #[test]
        fn recommendation_is_deterministic(
            readings in prop::collection::vec(reading(), 10),
        ) {
            let mut map = ThresholdMap::new(Conduction::Air);
            for (&f, value) in AC_FREQUENCIES.iter().zip(readings) {
                map.set(Side::Right, f, value);
                map.set(Side::Left, f, value);
            }
            let thresholds = SubjectThresholds {
                subject_id: 1,
                ac: map,
                bc: ThresholdMap::new(Conduction::Bone),
            };

            let first = recommend(&thresholds);
            prop_assert_eq!(&first, &recommend(&thresholds));
            prop_assert_eq!(first.right.matrix, first.left.matrix);
            prop_assert_eq!(first.right.coupling, first.left.coupling);
            prop_assert_eq!(first.right.vent, first.left.vent);
            if first.right.coupling == Coupling::Earmold {
                prop_assert_ne!(first.right.vent, VentSize::NotApplicable);
            } else {
                prop_assert_eq!(first.right.vent, VentSize::NotApplicable);
            }
        }
    }
}
