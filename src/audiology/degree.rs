use std::fmt;

use serde::Serialize;

/// Audiogram shading bands (dB HL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HearingLossDegree {
    Normal,
    Mild,
    Moderate,
    ModeratelySevere,
    Severe,
    Profound,
}

impl HearingLossDegree {
    pub const ALL: [HearingLossDegree; 6] = [
        HearingLossDegree::Normal,
        HearingLossDegree::Mild,
        HearingLossDegree::Moderate,
        HearingLossDegree::ModeratelySevere,
        HearingLossDegree::Severe,
        HearingLossDegree::Profound,
    ];

    /// Band containing `threshold`. Upper bounds are inclusive.
    pub fn classify(threshold: i64) -> Self {
        match threshold {
            ..=25 => HearingLossDegree::Normal,
            26..=40 => HearingLossDegree::Mild,
            41..=55 => HearingLossDegree::Moderate,
            56..=70 => HearingLossDegree::ModeratelySevere,
            71..=90 => HearingLossDegree::Severe,
            _ => HearingLossDegree::Profound,
        }
    }

    /// Plot extent of the band, `(top, bottom)` in dB HL.
    pub fn range(self) -> (i64, i64) {
        match self {
            HearingLossDegree::Normal => (-10, 25),
            HearingLossDegree::Mild => (25, 40),
            HearingLossDegree::Moderate => (40, 55),
            HearingLossDegree::ModeratelySevere => (55, 70),
            HearingLossDegree::Severe => (70, 90),
            HearingLossDegree::Profound => (90, 120),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HearingLossDegree::Normal => "normal",
            HearingLossDegree::Mild => "mild",
            HearingLossDegree::Moderate => "moderate",
            HearingLossDegree::ModeratelySevere => "moderately-severe",
            HearingLossDegree::Severe => "severe",
            HearingLossDegree::Profound => "profound",
        }
    }
}

impl fmt::Display for HearingLossDegree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
