//! Pagination resolution and ordering
//!
//! [`resolve_pagination`] pulls the pagination-control keys out of a criteria
//! map and decides between offset pagination (`page` + `per_page`) and
//! keyset pagination (`last_id`). Keyset pagination is expressed as an extra
//! filter on `id`, so resolution must happen before predicate compilation.
//!
//! When `last_id` is present the cursor takes precedence and any offset is
//! discarded; the page size still limits the result.
//!
//! # Example
//!
//! ```rust
//! use repokit::repository::{resolve_pagination, Criteria};
//!
//! let criteria = Criteria::new()
//!     .with("per_page", "10")
//!     .with("page", "2")
//!     .with("name", "john");
//!
//! let (plan, filters) = resolve_pagination(&criteria);
//! assert_eq!(plan.limit, Some(10));
//! assert_eq!(plan.offset, Some(10));
//! assert_eq!(plan.sort, "id desc");
//! assert_eq!(filters.keys().collect::<Vec<_>>(), vec!["name"]);
//! ```

use std::fmt;

use serde::Serialize;

use super::compiler::Operator;
use super::criteria::{
    value_as_i64, value_as_text, Criteria, LAST_ID_KEY, PAGE_KEY, PER_PAGE_KEY, SORT_KEY,
};

/// Order-by clause applied when the criteria carry no `sort`
pub const DEFAULT_SORT: &str = "id desc";

/// Column compared against `last_id`
pub const CURSOR_FIELD: &str = "id";

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

impl OrderDirection {
    /// SQL keyword for this direction
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// One `field direction` item of an order-by clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    /// Column to order by
    pub field: String,
    /// Direction, ascending when omitted
    pub direction: OrderDirection,
}

impl OrderBy {
    /// Parse a literal order-by string such as `"name asc, id desc"`
    ///
    /// Returns a description of the first malformed item on failure.
    ///
    /// # Example
    ///
    /// ```rust
    /// use repokit::repository::{OrderBy, OrderDirection};
    ///
    /// let order = OrderBy::parse_list("name, created_at DESC").unwrap();
    /// assert_eq!(order.len(), 2);
    /// assert_eq!(order[0].direction, OrderDirection::Ascending);
    /// assert_eq!(order[1].field, "created_at");
    /// assert_eq!(order[1].direction, OrderDirection::Descending);
    /// ```
    pub fn parse_list(sort: &str) -> Result<Vec<Self>, String> {
        sort.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                let mut parts = item.split_whitespace();
                let field = parts.next().unwrap_or_default().to_string();
                let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
                    None | Some("asc") => OrderDirection::Ascending,
                    Some("desc") => OrderDirection::Descending,
                    Some(other) => {
                        return Err(format!("unknown sort direction `{}` in `{}`", other, item))
                    }
                };
                if parts.next().is_some() {
                    return Err(format!("malformed sort item `{}`", item));
                }
                Ok(Self { field, direction })
            })
            .collect()
    }
}

/// Comparison injected for keyset pagination
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cursor {
    /// Column compared against the last seen key
    pub field: String,
    /// `<` when walking `id desc`, `>` otherwise
    pub operator: Operator,
}

/// Outcome of pagination resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationPlan {
    /// Maximum number of rows to return
    pub limit: Option<u64>,
    /// Number of rows to skip
    pub offset: Option<u64>,
    /// Literal order-by clause
    pub sort: String,
    /// Keyset comparison, present when `last_id` was supplied
    pub cursor: Option<Cursor>,
}

impl Default for PaginationPlan {
    fn default() -> Self {
        Self {
            limit: None,
            offset: None,
            sort: DEFAULT_SORT.to_string(),
            cursor: None,
        }
    }
}

/// Resolve pagination keys into a plan and the remaining filter criteria
///
/// Never fails: unparsable page sizes or numbers are ignored.
pub fn resolve_pagination(criteria: &Criteria) -> (PaginationPlan, Criteria) {
    let mut filters = criteria.clone();

    let per_page = filters
        .remove(PER_PAGE_KEY)
        .as_ref()
        .and_then(value_as_i64)
        .and_then(|n| u64::try_from(n).ok());

    let page = filters
        .remove(PAGE_KEY)
        .as_ref()
        .and_then(value_as_i64)
        .map(|n| u64::try_from(n).unwrap_or(0));

    let sort = sort_or_default(filters.remove(SORT_KEY).as_ref());

    let offset = match (page, per_page) {
        (Some(page), Some(size)) => Some(page.saturating_sub(1).saturating_mul(size)),
        _ => None,
    };

    let mut plan = PaginationPlan {
        limit: per_page,
        offset,
        sort,
        cursor: None,
    };

    if let Some(last_id) = filters.remove(LAST_ID_KEY) {
        let operator = if is_default_sort(&plan.sort) {
            Operator::LessThan
        } else {
            Operator::GreaterThan
        };
        filters.insert(format!("{}.{}", CURSOR_FIELD, operator.symbol()), last_id);
        plan.cursor = Some(Cursor {
            field: CURSOR_FIELD.to_string(),
            operator,
        });
        plan.offset = None;
    }

    (plan, filters)
}

/// Remove every pagination-control key without applying it
///
/// Returns the resolved sort (callers fetching a single row still order by
/// it) and the filter criteria.
pub fn strip_pagination(criteria: &Criteria) -> (String, Criteria) {
    let sort = sort_or_default(criteria.get(SORT_KEY));
    (sort, criteria.without_control_keys())
}

fn sort_or_default(value: Option<&serde_json::Value>) -> String {
    value
        .map(value_as_text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SORT.to_string())
}

fn is_default_sort(sort: &str) -> bool {
    let normalized: Vec<String> = sort
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect();
    normalized == ["id", "desc"]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{compile, Conjunction};
    use serde_json::json;

    #[test]
    fn test_order_direction_display() {
        assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
        assert_eq!(format!("{}", OrderDirection::Descending), "desc");
        assert_eq!(OrderDirection::Descending.as_sql(), "DESC");
    }

    #[test]
    fn test_offset_scenario() {
        let criteria = Criteria::new()
            .with("per_page", "10")
            .with("page", "2")
            .with("sort", "id desc");
        let (plan, filters) = resolve_pagination(&criteria);

        assert_eq!(plan.limit, Some(10));
        assert_eq!(plan.offset, Some(10));
        assert_eq!(plan.sort, "id desc");
        assert!(plan.cursor.is_none());
        assert_eq!(compile(&filters, Conjunction::And).text(), "");
    }

    #[test]
    fn test_offset_formula() {
        for (page, size) in [(1_u64, 1_u64), (1, 25), (3, 20), (7, 3)] {
            let criteria = Criteria::new().with("page", page).with("per_page", size);
            let (plan, _) = resolve_pagination(&criteria);
            assert_eq!(plan.offset, Some((page - 1) * size));
            assert_eq!(plan.limit, Some(size));
        }
    }

    #[test]
    fn test_page_zero_treated_as_first_page() {
        let criteria = Criteria::new().with("page", 0).with("per_page", 20);
        let (plan, _) = resolve_pagination(&criteria);
        assert_eq!(plan.offset, Some(0));
    }

    #[test]
    fn test_page_without_per_page_has_no_offset() {
        let (plan, filters) = resolve_pagination(&Criteria::new().with("page", "3"));
        assert_eq!(plan.offset, None);
        assert_eq!(plan.limit, None);
        assert!(filters.is_empty());
    }

    #[test]
    fn test_unparsable_per_page_is_a_no_op() {
        let criteria = Criteria::new().with("per_page", "ten").with("page", "2");
        let (plan, filters) = resolve_pagination(&criteria);
        assert_eq!(plan.limit, None);
        assert_eq!(plan.offset, None);
        assert!(filters.is_empty());
    }

    #[test]
    fn test_negative_per_page_is_a_no_op() {
        let (plan, _) = resolve_pagination(&Criteria::new().with("per_page", -5));
        assert_eq!(plan.limit, None);
    }

    #[test]
    fn test_default_sort() {
        let (plan, _) = resolve_pagination(&Criteria::new());
        assert_eq!(plan.sort, DEFAULT_SORT);
        assert_eq!(plan, PaginationPlan::default());
    }

    #[test]
    fn test_last_id_without_sort_walks_down() {
        let criteria = Criteria::new().with("last_id", "42");
        let (plan, filters) = resolve_pagination(&criteria);
        let predicate = compile(&filters, Conjunction::And);

        assert_eq!(predicate.text(), "`id` < @id.<");
        assert_eq!(predicate.param("id.<"), Some(&json!("42")));
        assert_eq!(
            plan.cursor,
            Some(Cursor {
                field: "id".to_string(),
                operator: Operator::LessThan
            })
        );
        assert_eq!(criteria.get("last_id"), Some(&json!("42")));
    }

    #[test]
    fn test_last_id_with_ascending_sort_walks_up() {
        let criteria = Criteria::new().with("sort", "id asc").with("last_id", 42);
        let (_, filters) = resolve_pagination(&criteria);
        let predicate = compile(&filters, Conjunction::And);
        assert_eq!(predicate.text(), "`id` > @id.>");
        assert_eq!(predicate.param("id.>"), Some(&json!(42)));
    }

    #[test]
    fn test_last_id_with_explicit_default_sort_in_other_case() {
        let criteria = Criteria::new().with("sort", "ID  DESC").with("last_id", 9);
        let (_, filters) = resolve_pagination(&criteria);
        assert!(filters.contains_key("id.<"));
    }

    #[test]
    fn test_cursor_takes_precedence_over_offset() {
        let criteria = Criteria::new()
            .with("per_page", "5")
            .with("page", "3")
            .with("last_id", "100");
        let (plan, _) = resolve_pagination(&criteria);
        assert_eq!(plan.limit, Some(5));
        assert_eq!(plan.offset, None);
        assert!(plan.cursor.is_some());
    }

    #[test]
    fn test_cursor_clause_follows_other_filters() {
        let criteria = Criteria::new()
            .with("last_id", "42")
            .with("status", "active");
        let (_, filters) = resolve_pagination(&criteria);
        assert_eq!(
            compile(&filters, Conjunction::And).text(),
            "`status` = @status AND `id` < @id.<"
        );
    }

    #[test]
    fn test_strip_pagination_keeps_sort() {
        let criteria = Criteria::new()
            .with("sort", "name asc")
            .with("per_page", "2")
            .with("last_id", "3")
            .with("name", "x");
        let (sort, filters) = strip_pagination(&criteria);
        assert_eq!(sort, "name asc");
        assert_eq!(filters.keys().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn test_order_by_parse_errors() {
        assert!(OrderBy::parse_list("name sideways").is_err());
        assert!(OrderBy::parse_list("name asc extra").is_err());
        assert_eq!(OrderBy::parse_list("").unwrap(), Vec::new());
    }
}
