//! PostgreSQL repository
//!
//! [`PgRepository`] renders validated queries with [`sqlx::QueryBuilder`]:
//! identifiers are double-quoted, every value is a positional bind and rows
//! come back as `to_jsonb(r)` so any serde record type can be decoded without
//! a hand-written `FromRow`.
//!
//! # Example
//!
//! ```rust,ignore
//! use repokit::repository::{Criteria, PgRepository, Repository};
//!
//! let repo = PgRepository::<User>::new(pool).with_query_timeout(Some(Duration::from_secs(5)));
//! let users = repo.find(&Criteria::from_query("status.in=1,2&per_page=20")?).await?;
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use serde_json::{Map, Value};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use super::compiler::Operator;
use super::criteria::Criteria;
use super::error::{RepositoryError, RepositoryOperation};
use super::pagination::OrderBy;
use super::query::{
    bind_patch, prepare_filter, prepare_find, prepare_find_one, BoundClause, PreparedQuery,
};
use super::schema::{is_unset_key, to_row, BindValue, Field, FieldKind, Id, Patch, Record};
use super::traits::{CriteriaRepository, Repository, RepositoryResult};

type Row = Map<String, Value>;
type Sql = QueryBuilder<'static, Postgres>;

/// Record store backed by a PostgreSQL pool
pub struct PgRepository<T> {
    pool: PgPool,
    query_timeout: Option<Duration>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> PgRepository<T> {
    /// Create a repository over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: None,
            _record: PhantomData,
        }
    }

    /// Bound every call by a timeout
    #[must_use]
    pub fn with_query_timeout(mut self, query_timeout: Option<Duration>) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    /// The underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run<F, R>(&self, operation: RepositoryOperation, query: F) -> RepositoryResult<R>
    where
        F: Future<Output = Result<R, sqlx::Error>>,
    {
        let result = match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, query).await.map_err(|_| {
                RepositoryError::timeout(operation, format!("query exceeded {:?}", limit))
                    .with_entity(T::TABLE)
            })?,
            None => query.await,
        };

        result.map_err(|e| RepositoryError::from_sqlx(operation, e).with_entity(T::TABLE))
    }
}

impl<T: Record> Clone for PgRepository<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            query_timeout: self.query_timeout,
            _record: PhantomData,
        }
    }
}

impl<T: Record> std::fmt::Debug for PgRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgRepository")
            .field("table", &T::TABLE)
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl<T: Record> Repository<T> for PgRepository<T> {
    async fn create(&self, record: &T) -> RepositoryResult<T> {
        let operation = RepositoryOperation::Create;
        let row = to_row(record, operation).map_err(entity::<T>)?;
        let mut sql = insert_sql::<T>(std::slice::from_ref(&row), operation)?;

        let Json(stored) = self
            .run(
                operation,
                sql.build_query_scalar::<Json<T>>().fetch_one(&self.pool),
            )
            .await?;
        Ok(stored)
    }

    async fn find_one(&self, criteria: &Criteria) -> RepositoryResult<T> {
        let operation = RepositoryOperation::FindOne;
        let query = prepare_find_one::<T>(criteria).map_err(entity::<T>)?;
        let mut sql = select_sql::<T>(&query);

        let found = self
            .run(
                operation,
                sql.build_query_scalar::<Json<T>>().fetch_optional(&self.pool),
            )
            .await?;
        found
            .map(|Json(record)| record)
            .ok_or_else(|| RepositoryError::not_found(T::TABLE))
    }

    async fn find(&self, criteria: &Criteria) -> RepositoryResult<Vec<T>> {
        let operation = RepositoryOperation::Find;
        let query = prepare_find::<T>(criteria).map_err(entity::<T>)?;
        let mut sql = select_sql::<T>(&query);

        let rows = self
            .run(
                operation,
                sql.build_query_scalar::<Json<T>>().fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.into_iter().map(|Json(record)| record).collect())
    }

    async fn upsert(&self, record: &T) -> RepositoryResult<T> {
        let operation = RepositoryOperation::Upsert;
        let row = to_row(record, operation).map_err(entity::<T>)?;
        if is_unset_key(row.get(T::SCHEMA.primary_key())) {
            return self
                .create(record)
                .await
                .map_err(|e| e.with_operation(operation));
        }

        let mut sql = upsert_sql::<T>(&row, operation)?;
        let Json(stored) = self
            .run(
                operation,
                sql.build_query_scalar::<Json<T>>().fetch_one(&self.pool),
            )
            .await?;
        Ok(stored)
    }
}

impl<T: Record> CriteriaRepository<T> for PgRepository<T> {
    async fn create_bulk(&self, records: &[T]) -> RepositoryResult<Vec<T>> {
        let operation = RepositoryOperation::CreateBulk;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let rows = records
            .iter()
            .map(|record| to_row(record, operation))
            .collect::<RepositoryResult<Vec<Row>>>()
            .map_err(entity::<T>)?;
        let mut sql = insert_sql::<T>(&rows, operation)?;

        let stored = self
            .run(
                operation,
                sql.build_query_scalar::<Json<T>>().fetch_all(&self.pool),
            )
            .await?;
        Ok(stored.into_iter().map(|Json(record)| record).collect())
    }

    async fn count(&self, criteria: &Criteria) -> RepositoryResult<u64> {
        let operation = RepositoryOperation::Count;
        let clauses = prepare_filter::<T>(criteria, operation, false).map_err(entity::<T>)?;
        let mut sql = count_sql::<T>(&clauses);

        let count = self
            .run(
                operation,
                sql.build_query_scalar::<i64>().fetch_one(&self.pool),
            )
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn update(&self, id: Id, record: &T) -> RepositoryResult<()> {
        let operation = RepositoryOperation::Update;
        let row = to_row(record, operation).map_err(entity::<T>)?;
        let mut sql = update_sql::<T>(id, &row, operation)?;

        let result = self
            .run(operation, sql.build().execute(&self.pool))
            .await?;
        match result.rows_affected() {
            1 => Ok(()),
            0 => Err(entity::<T>(RepositoryError::not_any_records_affected(
                operation,
            ))),
            n => Err(entity::<T>(RepositoryError::rows_affected_not_expected(
                operation, n,
            ))),
        }
    }

    async fn update_bulk(&self, criteria: &Criteria, patch: &Patch) -> RepositoryResult<()> {
        let operation = RepositoryOperation::UpdateBulk;
        let clauses = prepare_filter::<T>(criteria, operation, true).map_err(entity::<T>)?;
        let assignments = bind_patch::<T>(patch, operation).map_err(entity::<T>)?;
        if assignments.is_empty() {
            return Ok(());
        }

        let mut sql = update_bulk_sql::<T>(&clauses, &assignments);
        self.run(operation, sql.build().execute(&self.pool))
            .await?;
        Ok(())
    }

    async fn delete(&self, criteria: &Criteria) -> RepositoryResult<()> {
        let operation = RepositoryOperation::Delete;
        let clauses = prepare_filter::<T>(criteria, operation, true).map_err(entity::<T>)?;

        let mut sql = delete_sql::<T>(&clauses);
        self.run(operation, sql.build().execute(&self.pool))
            .await?;
        Ok(())
    }
}

fn entity<T: Record>(error: RepositoryError) -> RepositoryError {
    error.with_entity(T::TABLE)
}

/// Double-quote an identifier, doubling embedded quotes
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn push_value(sql: &mut Sql, value: BindValue) {
    match value {
        BindValue::Integer(v) => sql.push_bind(v),
        BindValue::Float(v) => sql.push_bind(v),
        BindValue::Text(v) => sql.push_bind(v),
        BindValue::Boolean(v) => sql.push_bind(v),
        BindValue::Timestamp(v) => sql.push_bind(v),
        BindValue::Json(v) => sql.push_bind(Json(v)),
        BindValue::Null(FieldKind::Integer) => sql.push_bind(None::<i64>),
        BindValue::Null(FieldKind::Float) => sql.push_bind(None::<f64>),
        BindValue::Null(FieldKind::Text) => sql.push_bind(None::<String>),
        BindValue::Null(FieldKind::Boolean) => sql.push_bind(None::<bool>),
        BindValue::Null(FieldKind::Timestamp) => {
            sql.push_bind(None::<chrono::DateTime<chrono::Utc>>)
        }
        BindValue::Null(FieldKind::Json) => sql.push_bind(None::<Json<Value>>),
    };
}

fn coerce_column(
    field: &Field,
    value: &Value,
    operation: RepositoryOperation,
) -> RepositoryResult<BindValue> {
    field.kind.coerce(value).map_err(|message| {
        RepositoryError::validation_failed(operation, format!("field `{}`: {}", field.name, message))
    })
}

fn push_where(sql: &mut Sql, clauses: &[BoundClause]) {
    for (i, clause) in clauses.iter().enumerate() {
        sql.push(if i == 0 { " WHERE " } else { " AND " });

        let column = quote_ident(clause.field.name);
        let mut values = clause.values.iter().cloned();

        match clause.operator {
            Operator::In if clause.values.is_empty() => {
                sql.push("FALSE");
            }
            Operator::In => {
                sql.push(&column).push(" IN (");
                for (j, value) in values.enumerate() {
                    if j > 0 {
                        sql.push(", ");
                    }
                    push_value(sql, value);
                }
                sql.push(")");
            }
            Operator::Between => {
                sql.push(&column).push(" BETWEEN ");
                push_value(sql, values.next().unwrap_or(BindValue::Null(clause.field.kind)));
                sql.push(" AND ");
                push_value(sql, values.next().unwrap_or(BindValue::Null(clause.field.kind)));
            }
            Operator::Like => {
                push_as_text(sql, clause.field, &column);
                sql.push(" LIKE ");
                push_value(sql, values.next().unwrap_or(BindValue::Text(String::new())));
            }
            Operator::Search => {
                sql.push("to_tsvector(");
                push_as_text(sql, clause.field, &column);
                sql.push(") @@ plainto_tsquery(");
                push_value(sql, values.next().unwrap_or(BindValue::Text(String::new())));
                sql.push(")");
            }
            operator => {
                sql.push(&column).push(" ").push(operator.symbol()).push(" ");
                push_value(sql, values.next().unwrap_or(BindValue::Null(clause.field.kind)));
            }
        }
    }
}

fn push_as_text(sql: &mut Sql, field: &Field, column: &str) {
    if field.kind == FieldKind::Text {
        sql.push(column);
    } else {
        sql.push("CAST(").push(column).push(" AS TEXT)");
    }
}

fn push_order(sql: &mut Sql, order: &[OrderBy]) {
    for (i, item) in order.iter().enumerate() {
        sql.push(if i == 0 { " ORDER BY " } else { ", " });
        sql.push(quote_ident(&item.field))
            .push(" ")
            .push(item.direction.as_sql());
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

pub(crate) fn select_sql<T: Record>(query: &PreparedQuery) -> Sql {
    let mut sql = QueryBuilder::new(format!(
        "SELECT to_jsonb(r) FROM {} AS r",
        quote_ident(T::TABLE)
    ));
    push_where(&mut sql, &query.clauses);
    push_order(&mut sql, &query.order);
    if let Some(limit) = query.limit {
        sql.push(" LIMIT ").push_bind(to_i64(limit));
    }
    if let Some(offset) = query.offset {
        sql.push(" OFFSET ").push_bind(to_i64(offset));
    }
    sql
}

pub(crate) fn count_sql<T: Record>(clauses: &[BoundClause]) -> Sql {
    let mut sql = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", quote_ident(T::TABLE)));
    push_where(&mut sql, clauses);
    sql
}

/// Multi-row insert; the key column is sent as `DEFAULT` where unset
pub(crate) fn insert_sql<T: Record>(
    rows: &[Row],
    operation: RepositoryOperation,
) -> RepositoryResult<Sql> {
    let mut sql = insert_values::<T>(rows, operation)?;
    sql.push(" RETURNING to_jsonb(r)");
    Ok(sql)
}

/// Insert overwriting every column on primary key conflict
pub(crate) fn upsert_sql<T: Record>(
    row: &Row,
    operation: RepositoryOperation,
) -> RepositoryResult<Sql> {
    let schema = T::SCHEMA;
    let pk = quote_ident(schema.primary_key());
    let mut sql = insert_values::<T>(std::slice::from_ref(row), operation)?;

    let updates: Vec<String> = schema
        .insert_columns(row)
        .iter()
        .filter(|field| field.name != schema.primary_key())
        .map(|field| {
            let column = quote_ident(field.name);
            format!("{column} = EXCLUDED.{column}")
        })
        .collect();
    let updates = if updates.is_empty() {
        format!("{pk} = EXCLUDED.{pk}")
    } else {
        updates.join(", ")
    };

    sql.push(" ON CONFLICT (")
        .push(&pk)
        .push(") DO UPDATE SET ")
        .push(updates)
        .push(" RETURNING to_jsonb(r)");
    Ok(sql)
}

fn insert_values<T: Record>(rows: &[Row], operation: RepositoryOperation) -> RepositoryResult<Sql> {
    let schema = T::SCHEMA;
    let pk = schema.primary_key();
    let all_keys_unset = rows.iter().all(|row| is_unset_key(row.get(pk)));
    let columns: Vec<&'static Field> = schema
        .fields()
        .iter()
        .filter(|field| rows.iter().any(|row| row.contains_key(field.name)))
        .filter(|field| field.name != pk || !all_keys_unset)
        .collect();

    let mut sql = QueryBuilder::new(format!("INSERT INTO {} AS r", quote_ident(T::TABLE)));

    if columns.is_empty() {
        sql.push(" DEFAULT VALUES");
        return Ok(sql);
    }

    let names: Vec<String> = columns.iter().map(|f| quote_ident(f.name)).collect();
    sql.push(" (").push(names.join(", ")).push(") VALUES ");

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push("(");
        for (j, field) in columns.iter().enumerate() {
            if j > 0 {
                sql.push(", ");
            }
            match row.get(field.name) {
                Some(value) if field.name != pk || !is_unset_key(Some(value)) => {
                    let bound = coerce_column(field, value, operation).map_err(entity::<T>)?;
                    push_value(&mut sql, bound);
                }
                _ => {
                    sql.push("DEFAULT");
                }
            }
        }
        sql.push(")");
    }

    Ok(sql)
}

/// Overwrite non-null, non-key columns of one row
pub(crate) fn update_sql<T: Record>(
    id: Id,
    row: &Row,
    operation: RepositoryOperation,
) -> RepositoryResult<Sql> {
    let schema = T::SCHEMA;
    let pk = quote_ident(schema.primary_key());
    let mut sql = QueryBuilder::new(format!("UPDATE {} SET ", quote_ident(T::TABLE)));

    let mut assigned = 0;
    for field in schema.fields() {
        if field.name == schema.primary_key() {
            continue;
        }
        let Some(value) = row.get(field.name).filter(|v| !v.is_null()) else {
            continue;
        };
        if assigned > 0 {
            sql.push(", ");
        }
        sql.push(quote_ident(field.name)).push(" = ");
        push_value(
            &mut sql,
            coerce_column(field, value, operation).map_err(entity::<T>)?,
        );
        assigned += 1;
    }
    if assigned == 0 {
        sql.push(format!("{pk} = {pk}"));
    }

    sql.push(" WHERE ").push(&pk).push(" = ").push_bind(i64::from(id));
    Ok(sql)
}

pub(crate) fn update_bulk_sql<T: Record>(
    clauses: &[BoundClause],
    assignments: &[(&'static Field, BindValue)],
) -> Sql {
    let mut sql = QueryBuilder::new(format!("UPDATE {} SET ", quote_ident(T::TABLE)));
    for (i, (field, value)) in assignments.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push(quote_ident(field.name)).push(" = ");
        push_value(&mut sql, value.clone());
    }
    push_where(&mut sql, clauses);
    sql
}

pub(crate) fn delete_sql<T: Record>(clauses: &[BoundClause]) -> Sql {
    let mut sql = QueryBuilder::new(format!("DELETE FROM {}", quote_ident(T::TABLE)));
    push_where(&mut sql, clauses);
    sql
}
