//! Logging decorator
//!
//! [`LoggedRepository`] wraps any repository and reports failures through
//! `tracing`: an `ERROR` event with the error, followed by a `TRACE` event
//! carrying the full input. Successful calls are silent and every result is
//! returned unchanged.

use serde::Serialize;

use super::criteria::Criteria;
use super::error::RepositoryOperation;
use super::schema::{Id, Patch, Record};
use super::traits::{CriteriaRepository, Repository, RepositoryResult};

/// Repository wrapper that logs failed calls
///
/// # Example
///
/// ```rust,ignore
/// use repokit::repository::{Criteria, LoggedRepository, PgRepository, Repository};
///
/// let repo = LoggedRepository::new(PgRepository::<User>::new(pool));
/// let user = repo.find_one(&Criteria::new().with("name", "john")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct LoggedRepository<R> {
    inner: R,
}

impl<R> LoggedRepository<R> {
    /// Wrap a repository
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// The wrapped repository
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Unwrap the decorated repository
    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn to_json(input: &impl Serialize) -> String {
    serde_json::to_string(input).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}

fn report<V>(
    table: &str,
    operation: RepositoryOperation,
    result: RepositoryResult<V>,
    input: impl FnOnce() -> String,
) -> RepositoryResult<V> {
    if let Err(ref error) = result {
        let input = input();
        tracing::error!(table, error = %error, "repository {} failed", operation);
        tracing::trace!(table, error = %error, input = %input, "repository {} failed", operation);
    }
    result
}

impl<T: Record, R: Repository<T>> Repository<T> for LoggedRepository<R> {
    async fn create(&self, record: &T) -> RepositoryResult<T> {
        let result = self.inner.create(record).await;
        report(T::TABLE, RepositoryOperation::Create, result, || {
            to_json(record)
        })
    }

    async fn find_one(&self, criteria: &Criteria) -> RepositoryResult<T> {
        let result = self.inner.find_one(criteria).await;
        report(T::TABLE, RepositoryOperation::FindOne, result, || {
            to_json(criteria)
        })
    }

    async fn find(&self, criteria: &Criteria) -> RepositoryResult<Vec<T>> {
        let result = self.inner.find(criteria).await;
        report(T::TABLE, RepositoryOperation::Find, result, || {
            to_json(criteria)
        })
    }

    async fn upsert(&self, record: &T) -> RepositoryResult<T> {
        let result = self.inner.upsert(record).await;
        report(T::TABLE, RepositoryOperation::Upsert, result, || {
            to_json(record)
        })
    }
}

impl<T: Record, R: CriteriaRepository<T>> CriteriaRepository<T> for LoggedRepository<R> {
    async fn create_bulk(&self, records: &[T]) -> RepositoryResult<Vec<T>> {
        let result = self.inner.create_bulk(records).await;
        report(T::TABLE, RepositoryOperation::CreateBulk, result, || {
            to_json(&records)
        })
    }

    async fn count(&self, criteria: &Criteria) -> RepositoryResult<u64> {
        let result = self.inner.count(criteria).await;
        report(T::TABLE, RepositoryOperation::Count, result, || {
            to_json(criteria)
        })
    }

    async fn update(&self, id: Id, record: &T) -> RepositoryResult<()> {
        let result = self.inner.update(id, record).await;
        report(T::TABLE, RepositoryOperation::Update, result, || {
            format!("id={} record={}", id, to_json(record))
        })
    }

    async fn update_bulk(&self, criteria: &Criteria, patch: &Patch) -> RepositoryResult<()> {
        let result = self.inner.update_bulk(criteria, patch).await;
        report(T::TABLE, RepositoryOperation::UpdateBulk, result, || {
            format!("criteria={} patch={}", to_json(criteria), to_json(patch))
        })
    }

    async fn delete(&self, criteria: &Criteria) -> RepositoryResult<()> {
        let result = self.inner.delete(criteria).await;
        report(T::TABLE, RepositoryOperation::Delete, result, || {
            to_json(criteria)
        })
    }
}
