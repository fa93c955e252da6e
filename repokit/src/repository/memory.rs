//! In-memory repository
//!
//! [`MemoryRepository`] keeps records as serialized column maps behind a
//! `tokio::sync::RwLock` and evaluates the same validated predicate, ordering
//! and pagination as the PostgreSQL store. Useful for tests and prototypes.
//!
//! # Example
//!
//! ```rust,ignore
//! use repokit::repository::{Criteria, MemoryRepository, Repository};
//!
//! let repo = MemoryRepository::<User>::new();
//! let stored = repo.create(&User::new("john")).await?;
//! let found = repo.find(&Criteria::new().with("name", "john")).await?;
//! ```

use std::cmp::Ordering;
use std::marker::PhantomData;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::compiler::Operator;
use super::criteria::{value_as_text, Criteria};
use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
use super::pagination::{OrderBy, OrderDirection};
use super::query::{
    bind_patch, prepare_filter, prepare_find, prepare_find_one, BoundClause, PreparedQuery,
};
use super::schema::{is_unset_key, to_row, BindValue, FieldKind, Id, Patch, Record, Schema};
use super::traits::{CriteriaRepository, Repository, RepositoryResult};

type Row = Map<String, Value>;

#[derive(Debug)]
struct Table {
    rows: Vec<Row>,
    next_id: Id,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
        }
    }
}

/// Record store held in process memory
pub struct MemoryRepository<T> {
    table: RwLock<Table>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> MemoryRepository<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::default()),
            _record: PhantomData,
        }
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    /// True when nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> std::fmt::Debug for MemoryRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRepository")
            .field("table", &T::TABLE)
            .finish_non_exhaustive()
    }
}

impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn create(&self, record: &T) -> RepositoryResult<T> {
        let operation = RepositoryOperation::Create;
        let mut table = self.table.write().await;

        let mut staged = stage_inserts::<T>(&table, std::slice::from_ref(record), operation)?;
        let (row, next_id) = staged.pop().ok_or_else(|| {
            RepositoryError::new(operation, RepositoryErrorKind::BackendError, "nothing staged")
        })?;
        let stored = decode::<T>(&row, operation)?;
        table.rows.push(row);
        table.next_id = next_id;
        Ok(stored)
    }

    async fn find_one(&self, criteria: &Criteria) -> RepositoryResult<T> {
        let query = prepare_find_one::<T>(criteria).map_err(entity::<T>)?;
        let table = self.table.read().await;

        match select::<T>(&table.rows, &query).first() {
            Some(row) => decode::<T>(row, RepositoryOperation::FindOne),
            None => Err(RepositoryError::not_found(T::TABLE)),
        }
    }

    async fn find(&self, criteria: &Criteria) -> RepositoryResult<Vec<T>> {
        let query = prepare_find::<T>(criteria).map_err(entity::<T>)?;
        let table = self.table.read().await;

        select::<T>(&table.rows, &query)
            .into_iter()
            .map(|row| decode::<T>(row, RepositoryOperation::Find))
            .collect()
    }

    async fn upsert(&self, record: &T) -> RepositoryResult<T> {
        let operation = RepositoryOperation::Upsert;
        let schema = T::SCHEMA;
        let row = to_row(record, operation).map_err(entity::<T>)?;

        if is_unset_key(row.get(schema.primary_key())) {
            return self
                .create(record)
                .await
                .map_err(|e| e.with_operation(operation));
        }

        check_row::<T>(&row, operation)?;
        let stored = decode::<T>(&row, operation)?;
        let key = row.get(schema.primary_key()).cloned();

        let mut table = self.table.write().await;
        if let Some(id) = key.as_ref().and_then(Value::as_u64) {
            let id = Id::try_from(id).unwrap_or(Id::MAX);
            table.next_id = table.next_id.max(id.saturating_add(1));
        }
        match table
            .rows
            .iter_mut()
            .find(|existing| existing.get(schema.primary_key()) == key.as_ref())
        {
            Some(existing) => *existing = row,
            None => table.rows.push(row),
        }
        Ok(stored)
    }
}

impl<T: Record> CriteriaRepository<T> for MemoryRepository<T> {
    async fn create_bulk(&self, records: &[T]) -> RepositoryResult<Vec<T>> {
        let operation = RepositoryOperation::CreateBulk;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut table = self.table.write().await;
        let staged = stage_inserts::<T>(&table, records, operation)?;

        let stored = staged
            .iter()
            .map(|(row, _)| decode::<T>(row, operation))
            .collect::<RepositoryResult<Vec<T>>>()?;

        for (row, next_id) in staged {
            table.rows.push(row);
            table.next_id = next_id;
        }
        Ok(stored)
    }

    async fn count(&self, criteria: &Criteria) -> RepositoryResult<u64> {
        let clauses = prepare_filter::<T>(criteria, RepositoryOperation::Count, false)
            .map_err(entity::<T>)?;
        let table = self.table.read().await;

        let matched = table
            .rows
            .iter()
            .filter(|row| matches_all(row, &clauses))
            .count();
        Ok(matched as u64)
    }

    async fn update(&self, id: Id, record: &T) -> RepositoryResult<()> {
        let operation = RepositoryOperation::Update;
        let schema = T::SCHEMA;
        let row = to_row(record, operation).map_err(entity::<T>)?;
        check_row::<T>(&row, operation)?;

        let key = Value::from(id);
        let mut table = self.table.write().await;
        let mut affected = 0_u64;

        for existing in table
            .rows
            .iter_mut()
            .filter(|existing| existing.get(schema.primary_key()) == Some(&key))
        {
            for (name, value) in &row {
                if name == schema.primary_key() || value.is_null() || schema.field(name).is_none()
                {
                    continue;
                }
                existing.insert(name.clone(), value.clone());
            }
            affected += 1;
        }

        match affected {
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

        let mut table = self.table.write().await;
        for row in table
            .rows
            .iter_mut()
            .filter(|row| matches_all(row, &clauses))
        {
            for (field, value) in &assignments {
                row.insert(field.name.to_string(), value.to_json());
            }
        }
        Ok(())
    }

    async fn delete(&self, criteria: &Criteria) -> RepositoryResult<()> {
        let clauses = prepare_filter::<T>(criteria, RepositoryOperation::Delete, true)
            .map_err(entity::<T>)?;

        let mut table = self.table.write().await;
        table.rows.retain(|row| !matches_all(row, &clauses));
        Ok(())
    }
}

fn entity<T: Record>(error: RepositoryError) -> RepositoryError {
    error.with_entity(T::TABLE)
}

fn decode<T: Record>(row: &Row, operation: RepositoryOperation) -> RepositoryResult<T> {
    serde_json::from_value(Value::Object(row.clone())).map_err(|e| {
        RepositoryError::serialization_error(operation, e.to_string()).with_entity(T::TABLE)
    })
}

/// Reject values a typed column could not hold
fn check_row<T: Record>(row: &Row, operation: RepositoryOperation) -> RepositoryResult<()> {
    for field in T::SCHEMA.fields() {
        if let Some(value) = row.get(field.name) {
            field.kind.coerce(value).map_err(|message| {
                RepositoryError::validation_failed(
                    operation,
                    format!("field `{}`: {}", field.name, message),
                )
                .with_entity(T::TABLE)
            })?;
        }
    }
    Ok(())
}

/// Serialize and key a batch without touching the table
///
/// Each staged row carries the id counter to apply once it is committed.
fn stage_inserts<T: Record>(
    table: &Table,
    records: &[T],
    operation: RepositoryOperation,
) -> RepositoryResult<Vec<(Row, Id)>> {
    let schema = T::SCHEMA;
    let pk = schema.primary_key();
    let mut next_id = table.next_id;
    let mut staged: Vec<(Row, Id)> = Vec::with_capacity(records.len());

    for record in records {
        let mut row = to_row(record, operation).map_err(entity::<T>)?;
        check_row::<T>(&row, operation)?;

        if is_unset_key(row.get(pk)) {
            if schema.field(pk).map(|f| f.kind) != Some(FieldKind::Integer) {
                return Err(entity::<T>(RepositoryError::validation_failed(
                    operation,
                    format!("primary key `{}` must be set", pk),
                )));
            }
            row.insert(pk.to_string(), Value::from(next_id));
            next_id = next_id.saturating_add(1);
        } else if let Some(id) = row.get(pk).and_then(Value::as_u64) {
            let id = Id::try_from(id).unwrap_or(Id::MAX);
            next_id = next_id.max(id.saturating_add(1));
        }

        let key = row.get(pk);
        let duplicate = table.rows.iter().any(|existing| existing.get(pk) == key)
            || staged.iter().any(|(other, _)| other.get(pk) == key);
        if duplicate {
            return Err(RepositoryError::new(
                operation,
                RepositoryErrorKind::AlreadyExists,
                format!("duplicate primary key {}", key.map(value_as_text).unwrap_or_default()),
            )
            .with_entity(T::TABLE));
        }

        staged.push((row, next_id));
    }

    Ok(staged)
}

fn select<'a, T: Record>(rows: &'a [Row], query: &PreparedQuery) -> Vec<&'a Row> {
    let mut matched: Vec<&Row> = rows
        .iter()
        .filter(|row| matches_all(row, &query.clauses))
        .collect();

    matched.sort_by(|a, b| compare_rows(T::SCHEMA, &query.order, a, b));

    let offset = query
        .offset
        .map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
    let limit = query
        .limit
        .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));

    matched.into_iter().skip(offset).take(limit).collect()
}

fn column(row: &Row, name: &str, kind: FieldKind) -> BindValue {
    row.get(name)
        .and_then(|value| kind.coerce(value).ok())
        .unwrap_or(BindValue::Null(kind))
}

/// SQL NULL never satisfies a pattern match
fn non_null<'a>(row: &'a Row, name: &str) -> Option<&'a Value> {
    row.get(name).filter(|value| !value.is_null())
}

fn matches_all(row: &Row, clauses: &[BoundClause]) -> bool {
    clauses.iter().all(|clause| matches_clause(row, clause))
}

fn matches_clause(row: &Row, clause: &BoundClause) -> bool {
    let field = clause.field;

    match clause.operator {
        Operator::Like => {
            let text = non_null(row, field.name).map(value_as_text);
            match (text, clause.values.first()) {
                (Some(text), Some(BindValue::Text(pattern))) => like_matches(&text, pattern),
                _ => false,
            }
        }
        Operator::Search => {
            let text = non_null(row, field.name).map(value_as_text);
            match (text, clause.values.first()) {
                (Some(text), Some(BindValue::Text(query))) => search_matches(&text, query),
                _ => false,
            }
        }
        operator => {
            let actual = column(row, field.name, field.kind);
            let cmp = |value: &BindValue| actual.partial_cmp(value);
            match (operator, clause.values.as_slice()) {
                (Operator::In, values) => values.iter().any(|v| cmp(v) == Some(Ordering::Equal)),
                (Operator::Between, [low, high]) => {
                    matches!(cmp(low), Some(Ordering::Greater | Ordering::Equal))
                        && matches!(cmp(high), Some(Ordering::Less | Ordering::Equal))
                }
                (Operator::Equal, [value]) => cmp(value) == Some(Ordering::Equal),
                (Operator::GreaterThan, [value]) => cmp(value) == Some(Ordering::Greater),
                (Operator::GreaterThanOrEqual, [value]) => {
                    matches!(cmp(value), Some(Ordering::Greater | Ordering::Equal))
                }
                (Operator::LessThan, [value]) => cmp(value) == Some(Ordering::Less),
                (Operator::LessThanOrEqual, [value]) => {
                    matches!(cmp(value), Some(Ordering::Less | Ordering::Equal))
                }
                _ => false,
            }
        }
    }
}

/// SQL `LIKE` with `%` and `_` wildcards
fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if let Some((star, start)) = backtrack {
            p = star + 1;
            t = start + 1;
            backtrack = Some((star, start + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}

/// Every search term must appear as a word of the text, ignoring case
fn search_matches(text: &str, query: &str) -> bool {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let mut terms = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .peekable();

    terms.peek().is_some() && terms.all(|term| words.contains(&term))
}

/// Nulls sort after every value, as PostgreSQL does for ascending order
fn compare_rows(schema: Schema, order: &[OrderBy], a: &Row, b: &Row) -> Ordering {
    for item in order {
        let kind = schema.field(&item.field).map_or(FieldKind::Json, |f| f.kind);
        let left = column(a, &item.field, kind);
        let right = column(b, &item.field, kind);

        let ordering = match (left, right) {
            (BindValue::Null(_), BindValue::Null(_)) => Ordering::Equal,
            (BindValue::Null(_), _) => Ordering::Greater,
            (_, BindValue::Null(_)) => Ordering::Less,
            (left, right) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
        };
        let ordering = match item.direction {
            OrderDirection::Ascending => ordering,
            OrderDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
