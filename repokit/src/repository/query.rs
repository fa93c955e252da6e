//! Query preparation
//!
//! Runs the criteria pipeline every store shares: pagination resolution,
//! predicate compilation, then schema validation and value coercion against
//! the record type. Stores only ever see validated columns and typed values.

use serde::Serialize;

use super::compiler::{compile, Conjunction, Operator, Predicate};
use super::criteria::Criteria;
use super::error::{RepositoryError, RepositoryOperation};
use super::pagination::{resolve_pagination, strip_pagination, OrderBy, PaginationPlan};
use super::schema::{coerce_param, BindValue, Field, Patch, Record};

/// How a criteria map would be executed, before any schema is applied
///
/// # Example
///
/// ```rust
/// use repokit::repository::{explain, Criteria};
///
/// let criteria = Criteria::from_query("name.like=jo&per_page=10&page=3").unwrap();
/// let explained = explain(&criteria);
/// assert_eq!(explained.predicate, "`name` LIKE @name.like");
/// assert_eq!(explained.plan.offset, Some(20));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explain {
    /// Resolved pagination
    pub plan: PaginationPlan,
    /// Canonical predicate text
    pub predicate: String,
    /// Bound parameters by name
    pub params: Criteria,
}

/// Resolve and compile criteria the way `find` does
pub fn explain(criteria: &Criteria) -> Explain {
    let (plan, filters) = resolve_pagination(criteria);
    let predicate = compile(&filters, Conjunction::And);
    Explain {
        plan,
        predicate: predicate.text(),
        params: predicate.params().clone(),
    }
}

/// A clause checked against the schema with its values coerced
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundClause {
    pub field: &'static Field,
    pub operator: Operator,
    pub values: Vec<BindValue>,
}

/// A fully validated read
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreparedQuery {
    pub clauses: Vec<BoundClause>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Prepare a paginated read
pub(crate) fn prepare_find<T: Record>(
    criteria: &Criteria,
) -> Result<PreparedQuery, RepositoryError> {
    let operation = RepositoryOperation::Find;
    let (plan, filters) = resolve_pagination(criteria);
    let predicate = compile(&filters, Conjunction::And);

    Ok(PreparedQuery {
        clauses: bind_predicate::<T>(&predicate, operation)?,
        order: T::SCHEMA.parse_sort(&plan.sort, operation)?,
        limit: plan.limit,
        offset: plan.offset,
    })
}

/// Prepare a single-row read; only `sort` survives among the control keys
pub(crate) fn prepare_find_one<T: Record>(
    criteria: &Criteria,
) -> Result<PreparedQuery, RepositoryError> {
    let operation = RepositoryOperation::FindOne;
    let (sort, filters) = strip_pagination(criteria);
    let predicate = compile(&filters, Conjunction::And);

    Ok(PreparedQuery {
        clauses: bind_predicate::<T>(&predicate, operation)?,
        order: T::SCHEMA.parse_sort(&sort, operation)?,
        limit: Some(1),
        offset: None,
    })
}

/// Prepare the filter of a count or a criteria-driven write
///
/// Writes pass `require_filter` so that an empty predicate never reaches
/// every row.
pub(crate) fn prepare_filter<T: Record>(
    criteria: &Criteria,
    operation: RepositoryOperation,
    require_filter: bool,
) -> Result<Vec<BoundClause>, RepositoryError> {
    let (_, filters) = strip_pagination(criteria);
    let predicate = compile(&filters, Conjunction::And);

    if require_filter && predicate.is_empty() {
        return Err(RepositoryError::validation_failed(
            operation,
            "refusing to run without a filter",
        ));
    }

    bind_predicate::<T>(&predicate, operation)
}

/// Validate the columns of a patch and coerce its values
pub(crate) fn bind_patch<T: Record>(
    patch: &Patch,
    operation: RepositoryOperation,
) -> Result<Vec<(&'static Field, BindValue)>, RepositoryError> {
    patch
        .iter()
        .map(|(name, value)| {
            let field = T::SCHEMA.require(name, operation)?;
            let bound = field.kind.coerce(value).map_err(|message| {
                RepositoryError::validation_failed(
                    operation,
                    format!("field `{}`: {}", field.name, message),
                )
            })?;
            Ok((field, bound))
        })
        .collect()
}

fn bind_predicate<T: Record>(
    predicate: &Predicate,
    operation: RepositoryOperation,
) -> Result<Vec<BoundClause>, RepositoryError> {
    T::SCHEMA.check_predicate(predicate, operation)?;

    predicate
        .clauses()
        .iter()
        .map(|clause| {
            let field = T::SCHEMA.require(&clause.field, operation)?;
            let value = predicate
                .param(&clause.param)
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            Ok(BoundClause {
                field,
                operator: clause.operator,
                values: coerce_param(field, clause.operator, &value, operation)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{FieldKind, RepositoryErrorKind, Schema};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Order {
        id: Option<u32>,
        status: i64,
        customer: String,
    }

    impl Record for Order {
        const TABLE: &'static str = "orders";
        const SCHEMA: Schema = Schema::new(&[
            Field::integer("id"),
            Field::integer("status"),
            Field::text("customer"),
        ]);
    }

    #[test]
    fn test_explain_serializes_plan_and_predicate() {
        let criteria = Criteria::from_query("status.in=1,2&last_id=9").unwrap();
        let value = serde_json::to_value(explain(&criteria)).unwrap();
        assert_eq!(value["predicate"], json!("`status` IN @status.in AND `id` < @id.<"));
        assert_eq!(value["params"]["status.in"], json!(["1", "2"]));
        assert_eq!(value["plan"]["sort"], json!("id desc"));
        assert_eq!(value["plan"]["cursor"]["operator"], json!("less_than"));
    }

    #[test]
    fn test_prepare_find_coerces_values() {
        let criteria = Criteria::from_query("status.in=1,2&per_page=5&page=2").unwrap();
        let query = prepare_find::<Order>(&criteria).unwrap();

        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, Some(5));
        assert_eq!(query.clauses.len(), 1);
        assert_eq!(query.clauses[0].field.kind, FieldKind::Integer);
        assert_eq!(
            query.clauses[0].values,
            vec![BindValue::Integer(1), BindValue::Integer(2)]
        );
    }

    #[test]
    fn test_prepare_find_rejects_unknown_sort_field() {
        let criteria = Criteria::new().with("sort", "secret desc");
        let error = prepare_find::<Order>(&criteria).unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[test]
    fn test_prepare_find_one_ignores_paging() {
        let criteria = Criteria::new()
            .with("per_page", 50)
            .with("last_id", 3)
            .with("customer", "acme");
        let query = prepare_find_one::<Order>(&criteria).unwrap();
        assert_eq!(query.limit, Some(1));
        assert_eq!(query.offset, None);
        assert_eq!(query.clauses.len(), 1);
    }

    #[test]
    fn test_prepare_filter_requires_filter_for_writes() {
        let criteria = Criteria::new().with("per_page", 10);
        let error = prepare_filter::<Order>(&criteria, RepositoryOperation::Delete, true)
            .unwrap_err();
        assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
        assert_eq!(error.operation, RepositoryOperation::Delete);

        assert!(prepare_filter::<Order>(&criteria, RepositoryOperation::Count, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_bind_patch_validates_columns() {
        let mut patch = Patch::new();
        patch.insert("status".into(), json!("3"));
        let bound = bind_patch::<Order>(&patch, RepositoryOperation::UpdateBulk).unwrap();
        assert_eq!(bound[0].1, BindValue::Integer(3));

        patch.insert("password".into(), json!("x"));
        assert!(bind_patch::<Order>(&patch, RepositoryOperation::UpdateBulk).is_err());
    }
}
