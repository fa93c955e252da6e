//! Repository error types
//!
//! Every store-facing operation returns a [`RepositoryError`] whose
//! [`RepositoryErrorKind`] callers are expected to branch on. Driver errors are
//! classified, never replaced: the original error stays reachable through
//! [`std::error::Error::source`].
//!
//! # Example
//!
//! ```rust
//! use repokit::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::not_found("users");
//! assert!(error.is_not_found());
//! assert_eq!(error.operation, RepositoryOperation::FindOne);
//! ```

use std::fmt;
use std::sync::Arc;

/// SQLSTATE reported by the backend when a CHECK constraint rejects a row
pub const CHECK_VIOLATION_CODE: &str = "23514";

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Inserting a single record
    Create,
    /// Inserting a batch of records
    CreateBulk,
    /// Fetching exactly one record
    FindOne,
    /// Fetching a page of records
    Find,
    /// Counting matching records
    Count,
    /// Updating one record by primary key
    Update,
    /// Patching every matching record
    UpdateBulk,
    /// Deleting matching records
    Delete,
    /// Insert-or-update by primary key
    Upsert,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::CreateBulk => write!(f, "create_bulk"),
            Self::FindOne => write!(f, "find_one"),
            Self::Find => write!(f, "find"),
            Self::Count => write!(f, "count"),
            Self::Update => write!(f, "update"),
            Self::UpdateBulk => write!(f, "update_bulk"),
            Self::Delete => write!(f, "delete"),
            Self::Upsert => write!(f, "upsert"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Zero rows where exactly one was expected
    NotFound,
    /// A write matched no rows
    NotAnyRecordsAffected,
    /// A write touched a different number of rows than expected
    RowsAffectedNotExpected,
    /// A CHECK constraint rejected the row (SQLSTATE 23514)
    CheckConstraintViolation,
    /// Unique key violation
    AlreadyExists,
    /// Other integrity constraint violation (foreign key, not null)
    ConstraintViolation,
    /// Input rejected before reaching the store
    ValidationFailed,
    /// Could not reach the store
    ConnectionFailed,
    /// The call exceeded its time budget
    Timeout,
    /// Row could not be mapped to or from the record type
    SerializationError,
    /// Opaque driver failure
    BackendError,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::NotAnyRecordsAffected => write!(f, "not_any_records_affected"),
            Self::RowsAffectedNotExpected => write!(f, "rows_affected_not_expected"),
            Self::CheckConstraintViolation => write!(f, "check_constraint_violation"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::BackendError => write!(f, "backend_error"),
        }
    }
}

type Source = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use repokit::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
///
/// let error = RepositoryError::new(
///     RepositoryOperation::Update,
///     RepositoryErrorKind::NotAnyRecordsAffected,
///     "no row with id 7",
/// )
/// .with_entity("users");
///
/// assert_eq!(
///     error.to_string(),
///     "Repository not_any_records_affected error during update: no row with id 7 [users]"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The table or record type involved
    pub entity_type: Option<String>,
    source: Option<Source>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            source: None,
        }
    }

    /// Create a "not found" error for a single-row fetch
    pub fn not_found(entity_type: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindOne,
            RepositoryErrorKind::NotFound,
            "record not found",
        )
        .with_entity(entity_type)
    }

    /// Create a validation failed error
    ///
    /// # Example
    ///
    /// ```rust
    /// use repokit::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
    ///
    /// let error = RepositoryError::validation_failed(RepositoryOperation::Find, "unknown field `nme`");
    /// assert_eq!(error.kind, RepositoryErrorKind::ValidationFailed);
    /// ```
    pub fn validation_failed(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::ValidationFailed, message)
    }

    /// Create an error for a write that matched no rows
    pub fn not_any_records_affected(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::NotAnyRecordsAffected,
            "not any record(s) affected",
        )
    }

    /// Create an error for a write that touched an unexpected number of rows
    pub fn rows_affected_not_expected(operation: RepositoryOperation, affected: u64) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::RowsAffectedNotExpected,
            format!("{} row(s) affected, expected 1", affected),
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Wrap an opaque driver failure, keeping it as the error source
    pub fn backend(
        operation: RepositoryOperation,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::BackendError,
            source.to_string(),
        )
        .with_source(source)
    }

    /// Add the table or record type to an existing error
    #[must_use]
    pub fn with_entity(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Attach the underlying cause
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// True for the zero-rows outcome of a single-row fetch
    pub fn is_not_found(&self) -> bool {
        self.kind == RepositoryErrorKind::NotFound
    }

    /// Check if this error is transient (the repository itself never retries)
    ///
    /// # Example
    ///
    /// ```rust
    /// use repokit::repository::{RepositoryError, RepositoryOperation};
    ///
    /// assert!(RepositoryError::timeout(RepositoryOperation::Find, "5s elapsed").is_retriable());
    /// assert!(!RepositoryError::not_found("users").is_retriable());
    /// ```
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }
}

impl PartialEq for RepositoryError {
    fn eq(&self, other: &Self) -> bool {
        self.operation == other.operation
            && self.kind == other.kind
            && self.message == other.message
            && self.entity_type == other.entity_type
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref entity_type) = self.entity_type {
            write!(f, " [{}]", entity_type)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(feature = "database")]
impl RepositoryError {
    /// Classify a sqlx error raised while performing `operation`
    pub fn from_sqlx(operation: RepositoryOperation, err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;
        use sqlx::Error as E;

        let kind = match &err {
            E::RowNotFound => RepositoryErrorKind::NotFound,
            E::PoolTimedOut => RepositoryErrorKind::Timeout,
            E::Io(_) | E::Tls(_) | E::PoolClosed | E::WorkerCrashed => {
                RepositoryErrorKind::ConnectionFailed
            }
            E::ColumnDecode { .. } | E::Decode(_) => RepositoryErrorKind::SerializationError,
            E::Database(db_err) => {
                if db_err.code().as_deref() == Some(CHECK_VIOLATION_CODE) {
                    RepositoryErrorKind::CheckConstraintViolation
                } else {
                    match db_err.kind() {
                        ErrorKind::UniqueViolation => RepositoryErrorKind::AlreadyExists,
                        ErrorKind::CheckViolation => RepositoryErrorKind::CheckConstraintViolation,
                        ErrorKind::ForeignKeyViolation | ErrorKind::NotNullViolation => {
                            RepositoryErrorKind::ConstraintViolation
                        }
                        _ => RepositoryErrorKind::BackendError,
                    }
                }
            }
            _ => RepositoryErrorKind::BackendError,
        };

        Self::new(operation, kind, err.to_string()).with_source(err)
    }
}
