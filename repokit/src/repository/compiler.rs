//! Predicate compilation
//!
//! Turns the filter keys of a [`Criteria`] map into a [`Predicate`]: an ordered
//! AND conjunction of comparisons, each bound to a named parameter equal to
//! the full criteria key. Using the full key lets several operators on the
//! same field coexist (`created_at.>=` and `created_at.<=`).
//!
//! Compilation never fails. Keys with an empty field name contribute nothing,
//! unknown operator suffixes fall back to equality and a `between` value that
//! does not yield two bounds is dropped.
//!
//! # Example
//!
//! ```rust
//! use repokit::repository::{compile, Conjunction, Criteria};
//! use serde_json::json;
//!
//! let criteria = Criteria::new()
//!     .with("status.in", "1,2,3")
//!     .with("name", "john")
//!     .with("name.like", "abc");
//!
//! let predicate = compile(&criteria, Conjunction::And);
//! assert_eq!(
//!     predicate.text(),
//!     "`status` IN @status.in AND `name` = @name AND `name` LIKE @name.like"
//! );
//! assert_eq!(predicate.param("name.like"), Some(&json!("%abc%")));
//! assert_eq!(predicate.param("status.in"), Some(&json!(["1", "2", "3"])));
//! ```

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::criteria::{value_as_text, Criteria};

/// Keyword joining clauses; flat conjunctions are the only supported shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Conjunction {
    /// All clauses must hold
    #[default]
    And,
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
        }
    }
}

/// Comparison applied by a single clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `=`, also used for a missing or unrecognized suffix
    Equal,
    /// `>=`
    GreaterThanOrEqual,
    /// `>`
    GreaterThan,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// Membership in a list of values
    In,
    /// Substring match, the value is wrapped in `%` wildcards
    Like,
    /// Full-text match
    Search,
    /// Inclusive range between two bounds
    Between,
}

impl Operator {
    /// Interpret the suffix after the first `.` of a criteria key
    ///
    /// # Example
    ///
    /// ```rust
    /// use repokit::repository::Operator;
    ///
    /// assert_eq!(Operator::from_suffix(">="), Operator::GreaterThanOrEqual);
    /// assert_eq!(Operator::from_suffix("like"), Operator::Like);
    /// assert_eq!(Operator::from_suffix(""), Operator::Equal);
    /// assert_eq!(Operator::from_suffix("regex"), Operator::Equal);
    /// ```
    pub fn from_suffix(suffix: &str) -> Self {
        match suffix {
            ">=" => Self::GreaterThanOrEqual,
            ">" => Self::GreaterThan,
            "<" => Self::LessThan,
            "<=" => Self::LessThanOrEqual,
            "in" => Self::In,
            "like" => Self::Like,
            "search" => Self::Search,
            "between" => Self::Between,
            _ => Self::Equal,
        }
    }

    /// SQL comparison symbol for the plain binary operators
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::GreaterThanOrEqual => ">=",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::In => "IN",
            Self::Like => "LIKE",
            Self::Search => "MATCH",
            Self::Between => "BETWEEN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One atomic comparison of a predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clause {
    /// Column the clause compares
    pub field: String,
    /// Comparison to apply
    pub operator: Operator,
    /// Name of the bound parameter, the full original criteria key
    pub param: String,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = &self.field;
        let param = &self.param;
        match self.operator {
            Operator::Search => write!(f, "MATCH(`{field}`) AGAINST (@{param})"),
            Operator::Between => {
                write!(f, "`{field}` BETWEEN @{param}[0] AND @{param}[1]")
            }
            op => write!(f, "`{field}` {} @{param}", op.symbol()),
        }
    }
}

/// Compiled conjunction plus its bound parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Predicate {
    conjunction: Conjunction,
    clauses: Vec<Clause>,
    params: Criteria,
}

impl Predicate {
    /// Canonical predicate text with back-quoted identifiers and `@key` placeholders
    pub fn text(&self) -> String {
        let separator = format!(" {} ", self.conjunction);
        self.clauses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(&separator)
    }

    /// Clauses in criteria order
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Bound parameters keyed by parameter name
    pub fn params(&self) -> &Criteria {
        &self.params
    }

    /// Value bound to a parameter
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// True when no clause survived compilation
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Joining keyword
    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Compile filter criteria into a predicate
///
/// Pagination-control keys are expected to be removed beforehand (see
/// [`resolve_pagination`](super::resolve_pagination)); any that remain are
/// compiled like ordinary equality filters.
pub fn compile(criteria: &Criteria, conjunction: Conjunction) -> Predicate {
    let mut predicate = Predicate {
        conjunction,
        ..Predicate::default()
    };

    for (key, value) in criteria.iter() {
        let (field, suffix) = key.split_once('.').unwrap_or((key, ""));
        if field.is_empty() {
            continue;
        }

        let operator = Operator::from_suffix(suffix);
        let bound = match operator {
            Operator::Like => Value::String(format!("%{}%", value_as_text(value))),
            Operator::In => Value::Array(list_values(value)),
            Operator::Between => match list_values(value).as_slice() {
                [low, high] => Value::Array(vec![low.clone(), high.clone()]),
                _ => continue,
            },
            _ => value.clone(),
        };

        predicate.clauses.push(Clause {
            field: field.to_string(),
            operator,
            param: key.to_string(),
        });
        predicate.params.insert(key, bound);
    }

    predicate
}

/// Normalize a list-shaped value: arrays pass through, strings split on commas
fn list_values(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::String(s) => s
            .split(',')
            .map(|part| Value::String(part.trim().to_string()))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_of(criteria: &Criteria) -> String {
        compile(criteria, Conjunction::And).text()
    }

    #[test]
    fn test_empty_field_contributes_nothing() {
        let empty = Criteria::new();
        let blank = Criteria::new().with("", "v");
        let blank_with_op = Criteria::new().with(".like", "v");

        assert_eq!(text_of(&blank), text_of(&empty));
        assert_eq!(text_of(&blank_with_op), "");

        let predicate = compile(&blank_with_op, Conjunction::And);
        assert!(predicate.is_empty());
        assert!(predicate.params().is_empty());
    }

    #[test]
    fn test_empty_field_between_other_clauses() {
        let criteria = Criteria::new()
            .with("name", "john")
            .with("", 1)
            .with("age.>", 3);
        assert_eq!(text_of(&criteria), "`name` = @name AND `age` > @age.>");
    }

    #[test]
    fn test_comparison_operators() {
        let criteria = Criteria::new()
            .with("created_at.>=", "2018-01-01")
            .with("created_at.<=", "2019-01-02")
            .with("score.>", 1)
            .with("score.<", 9);
        assert_eq!(
            text_of(&criteria),
            "`created_at` >= @created_at.>= AND `created_at` <= @created_at.<= \
             AND `score` > @score.> AND `score` < @score.<"
        );
    }

    #[test]
    fn test_like_wraps_value_and_leaves_input_untouched() {
        let criteria = Criteria::new().with("name.like", "abc");
        let predicate = compile(&criteria, Conjunction::And);

        assert_eq!(predicate.text(), "`name` LIKE @name.like");
        assert_eq!(predicate.param("name.like"), Some(&json!("%abc%")));
        assert_eq!(criteria.get("name.like"), Some(&json!("abc")));
    }

    #[test]
    fn test_like_with_number() {
        let predicate = compile(&Criteria::new().with("code.like", 42), Conjunction::And);
        assert_eq!(predicate.param("code.like"), Some(&json!("%42%")));
    }

    #[test]
    fn test_in_keeps_sequences_and_splits_strings() {
        let criteria = Criteria::new()
            .with("status.in", vec![1, 2, 3])
            .with("kind.in", "a, b")
            .with("owner.in", 7);
        let predicate = compile(&criteria, Conjunction::And);

        assert_eq!(predicate.param("status.in"), Some(&json!([1, 2, 3])));
        assert_eq!(predicate.param("kind.in"), Some(&json!(["a", "b"])));
        assert_eq!(predicate.param("owner.in"), Some(&json!([7])));
        assert!(predicate.text().starts_with("`status` IN @status.in"));
    }

    #[test]
    fn test_search_renders_full_text_match() {
        let criteria = Criteria::new().with("body.search", "rust async");
        assert_eq!(text_of(&criteria), "MATCH(`body`) AGAINST (@body.search)");
    }

    #[test]
    fn test_between() {
        let criteria = Criteria::new().with("created_at.between", "2018-01-01,2019-01-02");
        let predicate = compile(&criteria, Conjunction::And);
        assert_eq!(
            predicate.text(),
            "`created_at` BETWEEN @created_at.between[0] AND @created_at.between[1]"
        );
        assert_eq!(
            predicate.param("created_at.between"),
            Some(&json!(["2018-01-01", "2019-01-02"]))
        );
    }

    #[test]
    fn test_malformed_between_is_dropped() {
        let criteria = Criteria::new()
            .with("created_at.between", "2018-01-01")
            .with("name", "john");
        let predicate = compile(&criteria, Conjunction::And);
        assert_eq!(predicate.text(), "`name` = @name");
        assert_eq!(predicate.param("created_at.between"), None);
    }

    #[test]
    fn test_unknown_operator_falls_back_to_equality() {
        let criteria = Criteria::new().with("name.regex", "^j");
        assert_eq!(text_of(&criteria), "`name` = @name.regex");
    }

    #[test]
    fn test_key_split_on_first_dot() {
        let criteria = Criteria::new().with("meta.in.x", "1");
        let predicate = compile(&criteria, Conjunction::And);
        assert_eq!(predicate.clauses()[0].field, "meta");
        assert_eq!(predicate.clauses()[0].operator, Operator::Equal);
    }

    #[test]
    fn test_round_trip_three_clauses_distinct_params() {
        let criteria = Criteria::new()
            .with("status.in", vec![1, 2, 3])
            .with("name", "john")
            .with("name.like", "abc");
        let predicate = compile(&criteria, Conjunction::And);

        assert_eq!(predicate.clauses().len(), 3);
        assert_eq!(predicate.text().matches(" AND ").count(), 2);
        let params: Vec<_> = predicate.clauses().iter().map(|c| c.param.as_str()).collect();
        assert_eq!(params, vec!["status.in", "name", "name.like"]);
        assert_eq!(predicate.param("name"), Some(&json!("john")));
    }
}
