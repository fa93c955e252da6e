//! Repository trait definitions
//!
//! Both traits use RPITIT (Return Position Impl Trait In Traits) so that
//! implementations can be written as plain `async fn` without `async_trait`.
//!
//! - [`Repository`]: the capability set every store and the logging decorator share
//! - [`CriteriaRepository`]: bulk and criteria-driven writes on top of it
//!
//! Every operation borrows its criteria immutably; the caller's map is never
//! changed by a call.

use std::future::Future;

use super::criteria::Criteria;
use super::error::RepositoryError;
use super::schema::{Id, Patch, Record};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Base repository trait
///
/// # Example
///
/// ```rust,ignore
/// use repokit::repository::{Criteria, Repository};
///
/// async fn active_users(repo: &impl Repository<User>) -> RepositoryResult<Vec<User>> {
///     let criteria = Criteria::from_query("status=1&per_page=20&page=2").unwrap();
///     repo.find(&criteria).await
/// }
/// ```
pub trait Repository<T: Record>: Send + Sync {
    /// Insert one record and return the stored row
    ///
    /// A null or zero primary key is left for the store to generate.
    fn create(&self, record: &T) -> impl Future<Output = RepositoryResult<T>> + Send;

    /// Fetch the first record matching the criteria
    ///
    /// Pagination keys other than `sort` are ignored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` with `NotFound` kind when nothing matches.
    fn find_one(&self, criteria: &Criteria) -> impl Future<Output = RepositoryResult<T>> + Send;

    /// Fetch every record matching the criteria, paginated and ordered
    ///
    /// No match yields an empty vector, never an error.
    fn find(&self, criteria: &Criteria) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// Insert the record, or overwrite every column on primary key conflict
    fn upsert(&self, record: &T) -> impl Future<Output = RepositoryResult<T>> + Send;
}

/// Extended repository with bulk and criteria-driven writes
pub trait CriteriaRepository<T: Record>: Repository<T> {
    /// Insert a batch of records in a single statement
    ///
    /// Either every record is stored or none is. An empty batch is a no-op.
    fn create_bulk(&self, records: &[T])
        -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// Count records matching the filter keys of the criteria
    fn count(&self, criteria: &Criteria) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Overwrite every non-null column of the record with the given id
    ///
    /// # Errors
    ///
    /// `NotAnyRecordsAffected` when no row has the id,
    /// `RowsAffectedNotExpected` when more than one row changed.
    fn update(&self, id: Id, record: &T) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Apply a partial field map to every matching record
    ///
    /// # Errors
    ///
    /// `ValidationFailed` when the criteria carry no filter.
    fn update_bulk(
        &self,
        criteria: &Criteria,
        patch: &Patch,
    ) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Delete every matching record
    ///
    /// # Errors
    ///
    /// `ValidationFailed` when the criteria carry no filter.
    fn delete(&self, criteria: &Criteria) -> impl Future<Output = RepositoryResult<()>> + Send;
}
