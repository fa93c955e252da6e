//! Criteria-driven generic repositories
//!
//! A caller describes a query as a flat [`Criteria`] map, usually straight from
//! URL query parameters. The map is split into pagination and filters
//! ([`resolve_pagination`]), the filters are compiled into a [`Predicate`]
//! ([`compile`]) and both are validated against the record's [`Schema`] before
//! a store executes them.
//!
//! # Features
//!
//! - **Criteria**: ordered untyped maps with `field.operator` keys
//! - **Pagination**: offset (`page` + `per_page`) or keyset (`last_id`)
//! - **Stores**: [`PgRepository`] over sqlx and [`MemoryRepository`] for tests
//! - **Logging**: [`LoggedRepository`] reports failed calls through `tracing`
//!
//! # Example
//!
//! ```rust,ignore
//! use repokit::repository::{
//!     Criteria, CriteriaRepository, Field, PgRepository, Record, Repository, Schema,
//! };
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     id: Option<u32>,
//!     name: String,
//!     status: i32,
//! }
//!
//! impl Record for User {
//!     const TABLE: &'static str = "users";
//!     const SCHEMA: Schema = Schema::new(&[
//!         Field::integer("id"),
//!         Field::text("name"),
//!         Field::integer("status"),
//!     ]);
//! }
//!
//! let repo = PgRepository::<User>::new(pool);
//! let criteria = Criteria::from_query("status.in=1,2&name.like=jo&per_page=20&page=2")?;
//! let users = repo.find(&criteria).await?;
//! let total = repo.count(&criteria).await?;
//! ```

mod compiler;
mod criteria;
mod error;
mod logged;
mod memory;
mod pagination;
#[cfg(feature = "database")]
mod postgres;
mod query;
mod schema;
mod traits;

pub use compiler::{compile, Clause, Conjunction, Operator, Predicate};
pub use criteria::{Criteria, CONTROL_KEYS, LAST_ID_KEY, PAGE_KEY, PER_PAGE_KEY, SORT_KEY};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, CHECK_VIOLATION_CODE};
pub use logged::LoggedRepository;
pub use memory::MemoryRepository;
pub use pagination::{
    resolve_pagination, strip_pagination, Cursor, OrderBy, OrderDirection, PaginationPlan,
    CURSOR_FIELD, DEFAULT_SORT,
};
#[cfg(feature = "database")]
pub use postgres::PgRepository;
pub use query::{explain, Explain};
pub use schema::{BindValue, Field, FieldKind, Id, Patch, Record, Schema};
pub use traits::{CriteriaRepository, Repository, RepositoryResult};
