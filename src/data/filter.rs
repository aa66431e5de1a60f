use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, FilterError};

use super::model::{CandidateTable, CellValue};

/// Separator between members of a `contains` value set in text form.
pub const SET_SEPARATOR: char = ';';

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    /// Row value must be a member of the filter's value set.
    Contains,
}

impl Operator {
    /// In the order a picker would offer them.
    pub const ALL: [Operator; 7] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Contains,
        Operator::Greater,
        Operator::GreaterOrEqual,
        Operator::Less,
        Operator::LessOrEqual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "does not equal",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Contains => "contains",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "equals" | "==" => Ok(Operator::Equals),
            "does not equal" | "!=" => Ok(Operator::NotEquals),
            ">" => Ok(Operator::Greater),
            ">=" => Ok(Operator::GreaterOrEqual),
            "<" => Ok(Operator::Less),
            "<=" => Ok(Operator::LessOrEqual),
            "contains" => Ok(Operator::Contains),
            other => Err(ConfigError::UnknownOperator(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FilterValue / Filter
// ---------------------------------------------------------------------------

/// Right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Single(CellValue),
    Set(BTreeSet<CellValue>),
}

impl FilterValue {
    /// Read a value typed into a filter slot. `contains` takes a
    /// `;`-separated list of members; everything else a single cell.
    pub fn parse(operator: Operator, raw: &str) -> Self {
        match operator {
            Operator::Contains => FilterValue::Set(
                raw.split(SET_SEPARATOR)
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(CellValue::parse)
                    .collect(),
            ),
            _ => FilterValue::Single(CellValue::parse(raw)),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Single(v) => write!(f, "{v}"),
            FilterValue::Set(members) => {
                let joined: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "{}", joined.join(&SET_SEPARATOR.to_string()))
            }
        }
    }
}

/// One predicate: `column operator value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operator: Operator,
    pub value: FilterValue,
}

impl Filter {
    pub fn compare(column: &str, operator: Operator, value: CellValue) -> Self {
        Filter {
            column: column.to_string(),
            operator,
            value: FilterValue::Single(value),
        }
    }

    pub fn contains<I>(column: &str, members: I) -> Self
    where
        I: IntoIterator<Item = CellValue>,
    {
        Filter {
            column: column.to_string(),
            operator: Operator::Contains,
            value: FilterValue::Set(members.into_iter().collect()),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' {} '{}'", self.column, self.operator, self.value)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericKind {
    Integer,
    Decimal,
}

impl NumericKind {
    fn of(value: &FilterValue) -> Option<Self> {
        match value {
            FilterValue::Single(CellValue::Integer(_)) => Some(NumericKind::Integer),
            FilterValue::Single(CellValue::Decimal(_)) => Some(NumericKind::Decimal),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            NumericKind::Integer => "integer",
            NumericKind::Decimal => "decimal",
        }
    }

    fn coerce(self, cell: &CellValue) -> Option<CellValue> {
        match self {
            NumericKind::Integer => cell.as_whole_number().map(CellValue::Integer),
            NumericKind::Decimal => cell.as_f64().map(CellValue::Decimal),
        }
    }
}

/// Order a (possibly coerced) cell against a filter value. Numbers compare
/// numerically when both sides share a type; anything else by text.
fn compare(cell: &CellValue, value: &CellValue) -> Option<Ordering> {
    match (cell, value) {
        (CellValue::Integer(a), CellValue::Integer(b)) => Some(a.cmp(b)),
        (CellValue::Decimal(a), CellValue::Decimal(b)) => a.partial_cmp(b),
        _ => Some(cell.to_string().cmp(&value.to_string())),
    }
}

fn satisfies(operator: Operator, cell: &CellValue, value: &FilterValue) -> bool {
    match value {
        FilterValue::Set(members) => members
            .iter()
            .any(|m| compare(cell, m) == Some(Ordering::Equal)),
        FilterValue::Single(v) => {
            let ord = compare(cell, v);
            match operator {
                Operator::Equals | Operator::Contains => ord == Some(Ordering::Equal),
                Operator::NotEquals => ord != Some(Ordering::Equal),
                Operator::Greater => ord == Some(Ordering::Greater),
                Operator::GreaterOrEqual => {
                    matches!(ord, Some(Ordering::Greater | Ordering::Equal))
                }
                Operator::Less => ord == Some(Ordering::Less),
                Operator::LessOrEqual => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            }
        }
    }
}

fn describe(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => "<empty>".to_string(),
        other => other.to_string(),
    }
}

/// Return a new table holding the rows of `table` that satisfy `filter`.
///
/// * Rows whose value in the filtered column is the `"-"` sentinel are
///   always dropped, whatever the operator.
/// * A numeric filter value coerces the whole column to that numeric type
///   first; the coerced values are what the returned table carries. A cell
///   that cannot be coerced fails the step with [`FilterError::TypeCoercion`].
/// * Row order and the column set are preserved.
pub fn apply(table: &CandidateTable, filter: &Filter) -> Result<CandidateTable, FilterError> {
    let column = filter.column.as_str();
    if !table.has_column(column) {
        return Err(FilterError::MissingColumn {
            column: column.to_string(),
        });
    }
    if matches!(filter.value, FilterValue::Set(_)) && filter.operator != Operator::Contains {
        return Err(FilterError::OperatorValueMismatch {
            column: column.to_string(),
            operator: filter.operator.to_string(),
            reason: "a set of values",
        });
    }

    let numeric = NumericKind::of(&filter.value);
    let mut kept = Vec::new();

    for record in table.records() {
        let cell = record.get(column);
        if cell.is_no_data() {
            continue;
        }

        let Some(kind) = numeric else {
            if satisfies(filter.operator, cell, &filter.value) {
                kept.push(record.clone());
            }
            continue;
        };

        let coerced = kind
            .coerce(cell)
            .ok_or_else(|| FilterError::TypeCoercion {
                column: column.to_string(),
                found: describe(cell),
                expected: kind.label(),
                value: filter.value.to_string(),
            })?;
        if satisfies(filter.operator, &coerced, &filter.value) {
            let mut record = record.clone();
            record.cells.insert(column.to_string(), coerced);
            kept.push(record);
        }
    }

    log::info!(
        "Filtered {filter}: {} → {} candidates",
        table.len(),
        kept.len()
    );
    Ok(table.with_records(kept))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::data::model::SUBJECT_ID;

    fn table(column: &str, values: &[&str]) -> CandidateTable {
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                BTreeMap::from([
                    (SUBJECT_ID.to_string(), CellValue::Integer(i as i64 + 1)),
                    (column.to_string(), CellValue::parse(v)),
                ])
            })
            .collect();
        CandidateTable::from_rows(vec![SUBJECT_ID.to_string(), column.to_string()], rows)
            .unwrap()
    }

    fn ids(table: &CandidateTable) -> Vec<i64> {
        table.subject_ids().collect()
    }

    #[test]
    fn operator_spellings() {
        for op in Operator::ALL {
            assert_eq!(op.as_str().parse::<Operator>().unwrap(), op);
        }
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Equals);
        assert_eq!("!=".parse::<Operator>().unwrap(), Operator::NotEquals);
        assert_eq!(
            "like".parse::<Operator>(),
            Err(ConfigError::UnknownOperator("like".into()))
        );
    }

    #[test]
    fn equals_and_not_equals_on_text() {
        let t = table("Status", &["Active", "Inactive", "-", "Active"]);

        let active = apply(&t, &Filter::compare("Status", Operator::Equals, "Active".into()))
            .unwrap();
        assert_eq!(ids(&active), vec![1, 4]);

        let not_active =
            apply(&t, &Filter::compare("Status", Operator::NotEquals, "Active".into())).unwrap();
        // The sentinel row is gone even though "-" != "Active".
        assert_eq!(ids(&not_active), vec![2]);
    }

    #[test]
    fn numeric_value_coerces_column() {
        let t = table("Miles From Starkey", &["12", "60", "61", "-", "60.0"]);
        let near = apply(
            &t,
            &Filter::compare("Miles From Starkey", Operator::LessOrEqual, CellValue::Integer(60)),
        )
        .unwrap();
        assert_eq!(ids(&near), vec![1, 2, 5]);
        assert_eq!(
            near.record(5).unwrap().get("Miles From Starkey"),
            &CellValue::Integer(60)
        );
    }

    #[test]
    fn decimal_value_compares_numerically() {
        let t = table("Score", &["9", "10.5", "100"]);
        let out = apply(&t, &Filter::compare("Score", Operator::Greater, CellValue::Decimal(9.5)))
            .unwrap();
        assert_eq!(ids(&out), vec![2, 3]);
    }

    #[test]
    fn incompatible_column_is_a_type_error() {
        let t = table("Age", &["70", "unknown"]);
        let err = apply(&t, &Filter::compare("Age", Operator::Less, CellValue::Integer(75)))
            .unwrap_err();
        assert_eq!(
            err,
            FilterError::TypeCoercion {
                column: "Age".into(),
                found: "unknown".into(),
                expected: "integer",
                value: "75".into(),
            }
        );
        assert!(err.to_string().contains("cannot compare different types"));
    }

    #[test]
    fn float_keywords_compare_as_text() {
        let t = table("First Name", &["Nan", "Inf", "Ann"]);
        let value = FilterValue::parse(Operator::Equals, "Nan");
        assert_eq!(value, FilterValue::Single(CellValue::Text("Nan".into())));

        let filter = Filter {
            column: "First Name".into(),
            operator: Operator::Equals,
            value,
        };
        let out = apply(&t, &filter).unwrap();
        assert_eq!(ids(&out), vec![1]);
        assert_eq!(out.record(1).unwrap().get("First Name").to_string(), "Nan");
    }

    #[test]
    fn contains_keeps_members() {
        let t = table("Use Internet", &["Often", "Never", "Very Often", "-"]);
        let filter = Filter {
            column: "Use Internet".into(),
            operator: Operator::Contains,
            value: FilterValue::parse(Operator::Contains, "Very Often; Often"),
        };
        assert_eq!(ids(&apply(&t, &filter).unwrap()), vec![1, 3]);
    }

    #[test]
    fn set_value_needs_contains() {
        let t = table("Status", &["Active"]);
        let filter = Filter {
            column: "Status".into(),
            operator: Operator::Equals,
            value: FilterValue::parse(Operator::Contains, "Active;Inactive"),
        };
        assert!(matches!(
            apply(&t, &filter),
            Err(FilterError::OperatorValueMismatch { .. })
        ));
    }

    #[test]
    fn missing_column_is_reported() {
        let t = table("Status", &["Active"]);
        let err = apply(&t, &Filter::compare("Gender", Operator::Equals, "F".into())).unwrap_err();
        assert_eq!(
            err,
            FilterError::MissingColumn {
                column: "Gender".into()
            }
        );
    }

    #[test]
    fn value_display_joins_sets() {
        let value = FilterValue::parse(Operator::Contains, "Good;Fair;-");
        assert_eq!(value.to_string(), "-;Fair;Good");
    }

    fn cell_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            1 => Just("-".to_string()),
            4 => (0i64..120).prop_map(|n| n.to_string()),
        ]
    }

    fn comparison_strategy() -> impl Strategy<Value = Operator> {
        prop::sample::select(vec![
            Operator::Equals,
            Operator::NotEquals,
            Operator::Greater,
            Operator::GreaterOrEqual,
            Operator::Less,
            Operator::LessOrEqual,
        ])
    }

    proptest! {
        #[test]
        fn filtering_never_adds_rows(
            cells in prop::collection::vec(cell_strategy(), 0..40),
            op in comparison_strategy(),
            bound in 0i64..120,
        ) {
            let refs: Vec<&str> = cells.iter().map(String::as_str).collect();
            let t = table("Score", &refs);
            let filter = Filter::compare("Score", op, CellValue::Integer(bound));
            let once = apply(&t, &filter).unwrap();

            prop_assert!(once.len() <= t.len());
            prop_assert_eq!(once.columns(), t.columns());
            for id in once.subject_ids() {
                prop_assert!(t.record(id).is_ok());
            }
            prop_assert!(once.records().iter().all(|r| !r.get("Score").is_no_data()));

            let twice = apply(&once, &filter).unwrap();
            prop_assert_eq!(twice, once);
        }
    }
}
