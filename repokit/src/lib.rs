//! # repokit
//!
//! Criteria-driven generic repositories over relational stores.
//!
//! Application code describes what it wants with a flat, untyped criteria map
//! (usually straight from URL query parameters). repokit turns it into a
//! parameterized predicate, a pagination plan and an ordering, validates all
//! of it against the record's declared schema and runs it against a store.
//!
//! ## Features
//!
//! - **Criteria**: `field.operator` keys with `=`, `>=`, `>`, `<`, `<=`, `in`, `like`, `search` and `between`
//! - **Pagination**: offset (`page` + `per_page`) or keyset (`last_id`) with a literal `sort`
//! - **Stores**: PostgreSQL via sqlx, plus an in-memory store for tests
//! - **Logging**: a decorator that reports failed calls through `tracing`
//! - **Configuration**: Figment layering of defaults, TOML files and `REPOKIT_` environment variables
//!
//! ## Example
//!
//! ```rust,no_run
//! use repokit::prelude::*;
//! use serde::{Deserialize, Serialize};
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
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let db = config
//!         .database
//!         .as_ref()
//!         .ok_or_else(|| Error::NotConfigured("database".into()))?;
//!     let pool = create_pool(db).await?;
//!
//!     let users = LoggedRepository::new(
//!         PgRepository::<User>::new(pool)
//!             .with_query_timeout(config.repository.query_timeout()),
//!     );
//!
//!     let criteria = Criteria::new()
//!         .with("status.in", "1,2")
//!         .with("name.like", "jo")
//!         .with("per_page", 20);
//!     for user in users.find(&criteria).await? {
//!         println!("{} {}", user.id.unwrap_or_default(), user.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod repository;

#[cfg(feature = "database")]
pub mod database;

/// Commonly used types
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, RepositoryConfig, ServiceConfig};
    pub use crate::error::{Error, Result};
    pub use crate::observability::init_tracing;
    pub use crate::repository::{
        compile, explain, resolve_pagination, Conjunction, Criteria, CriteriaRepository, Field,
        FieldKind, Id, LoggedRepository, MemoryRepository, OrderDirection, PaginationPlan, Patch,
        Predicate, Record, Repository, RepositoryError, RepositoryErrorKind, RepositoryResult,
        Schema,
    };

    #[cfg(feature = "database")]
    pub use crate::database::{create_pool, ping};

    #[cfg(feature = "database")]
    pub use crate::repository::PgRepository;
}
