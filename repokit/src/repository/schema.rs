//! Record types and their declared schema
//!
//! Field identifiers in criteria are only ever accepted if the record type
//! declares them. The schema also carries the column type used to coerce the
//! untyped criteria values (`"42"` for an integer column) before they are
//! bound.
//!
//! # Example
//!
//! ```rust
//! use repokit::repository::{Field, Record, Schema};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     id: Option<u32>,
//!     name: String,
//!     age: i32,
//! }
//!
//! impl Record for User {
//!     const TABLE: &'static str = "users";
//!     const SCHEMA: Schema = Schema::new(&[
//!         Field::integer("id"),
//!         Field::text("name"),
//!         Field::integer("age"),
//!     ]);
//! }
//!
//! assert!(User::SCHEMA.field("name").is_some());
//! assert!(User::SCHEMA.field("password").is_none());
//! ```

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::compiler::{Operator, Predicate};
use super::criteria::value_as_text;
use super::error::{RepositoryError, RepositoryOperation};
use super::pagination::OrderBy;

/// Primary key type shared by every record
pub type Id = u32;

/// Partial field map applied by bulk updates
pub type Patch = serde_json::Map<String, Value>;

/// A stored record type
///
/// Records travel to and from the store through serde, so the serialized
/// field names must match the declared column names.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Table holding the records
    const TABLE: &'static str;

    /// Declared columns
    const SCHEMA: Schema;
}

/// Column type used for coercion and binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 64-bit signed integer
    Integer,
    /// Double precision float
    Float,
    /// Text
    Text,
    /// Boolean
    Boolean,
    /// Timestamp with time zone, UTC
    Timestamp,
    /// Arbitrary JSON document
    Json,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Text => write!(f, "text"),
            Self::Boolean => write!(f, "boolean"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// A declared column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Column name
    pub name: &'static str,
    /// Column type
    pub kind: FieldKind,
}

impl Field {
    /// Declare a column
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }

    /// Declare an integer column
    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// Declare a float column
    pub const fn float(name: &'static str) -> Self {
        Self::new(name, FieldKind::Float)
    }

    /// Declare a text column
    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    /// Declare a boolean column
    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Declare a timestamp column
    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, FieldKind::Timestamp)
    }

    /// Declare a JSON column
    pub const fn json(name: &'static str) -> Self {
        Self::new(name, FieldKind::Json)
    }
}

/// The set of columns a record type exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    fields: &'static [Field],
    primary_key: &'static str,
}

impl Schema {
    /// Declare a schema whose primary key column is `id`
    pub const fn new(fields: &'static [Field]) -> Self {
        Self {
            fields,
            primary_key: "id",
        }
    }

    /// Use a different primary key column
    #[must_use]
    pub const fn with_primary_key(mut self, primary_key: &'static str) -> Self {
        self.primary_key = primary_key;
        self
    }

    /// Declared columns in declaration order
    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Primary key column
    pub fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    /// Look up a declared column
    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Look up a declared column, failing with `ValidationFailed`
    pub fn require(
        &self,
        name: &str,
        operation: RepositoryOperation,
    ) -> Result<&'static Field, RepositoryError> {
        self.field(name).ok_or_else(|| {
            RepositoryError::validation_failed(operation, format!("unknown field `{}`", name))
        })
    }

    /// Check every clause field of a predicate against the declared columns
    pub fn check_predicate(
        &self,
        predicate: &Predicate,
        operation: RepositoryOperation,
    ) -> Result<(), RepositoryError> {
        for clause in predicate.clauses() {
            self.require(&clause.field, operation)?;
        }
        Ok(())
    }

    /// Parse a literal sort and check its fields against the declared columns
    pub fn parse_sort(
        &self,
        sort: &str,
        operation: RepositoryOperation,
    ) -> Result<Vec<OrderBy>, RepositoryError> {
        let order = OrderBy::parse_list(sort)
            .map_err(|message| RepositoryError::validation_failed(operation, message))?;
        for item in &order {
            self.require(&item.field, operation)?;
        }
        Ok(order)
    }

    /// Columns present in a serialized record, in declaration order
    ///
    /// The primary key is left out when it is null or zero so that the store
    /// can generate it.
    pub fn insert_columns(&self, row: &serde_json::Map<String, Value>) -> Vec<&'static Field> {
        self.fields
            .iter()
            .filter(|field| row.contains_key(field.name))
            .filter(|field| field.name != self.primary_key || !is_unset_key(row.get(field.name)))
            .collect()
    }
}

/// Whether a primary key value asks the store to generate one
pub(crate) fn is_unset_key(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Number(n)) => n.as_u64() == Some(0),
        _ => false,
    }
}

/// Serialize a record into its column map
pub(crate) fn to_row<T: Record>(
    record: &T,
    operation: RepositoryOperation,
) -> Result<serde_json::Map<String, Value>, RepositoryError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(RepositoryError::serialization_error(
            operation,
            format!("record serialized to {} instead of an object", json_type(&other)),
        )),
        Err(e) => Err(RepositoryError::serialization_error(operation, e.to_string())),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A criteria or record value coerced to its column type
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// Integer value
    Integer(i64),
    /// Float value
    Float(f64),
    /// Text value
    Text(String),
    /// Boolean value
    Boolean(bool),
    /// Timestamp value
    Timestamp(DateTime<Utc>),
    /// JSON document
    Json(Value),
    /// SQL NULL of the given column type
    Null(FieldKind),
}

impl BindValue {
    /// JSON form of the value as it would be read back from the store
    ///
    /// Timestamps become RFC 3339 strings; non-finite floats become null.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(v) => Value::from(*v),
            Self::Float(v) => Value::from(*v),
            Self::Text(v) => Value::String(v.clone()),
            Self::Boolean(v) => Value::Bool(*v),
            Self::Timestamp(v) => Value::String(v.to_rfc3339()),
            Self::Json(v) => v.clone(),
            Self::Null(_) => Value::Null,
        }
    }
}

impl PartialOrd for BindValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.partial_cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Text(a), Self::Text(b)) => a.partial_cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.partial_cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.partial_cmp(b),
            (Self::Json(a), Self::Json(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl FieldKind {
    /// Coerce an untyped value into this column type
    ///
    /// # Example
    ///
    /// ```rust
    /// use repokit::repository::{BindValue, FieldKind};
    /// use serde_json::json;
    ///
    /// assert_eq!(FieldKind::Integer.coerce(&json!("42")), Ok(BindValue::Integer(42)));
    /// assert_eq!(FieldKind::Boolean.coerce(&json!("1")), Ok(BindValue::Boolean(true)));
    /// assert!(FieldKind::Integer.coerce(&json!("forty")).is_err());
    /// ```
    pub fn coerce(&self, value: &Value) -> Result<BindValue, String> {
        if value.is_null() {
            return Ok(BindValue::Null(*self));
        }

        let mismatch = || format!("cannot use {} as {}", value, self);

        match self {
            Self::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(BindValue::Integer)
                    .ok_or_else(mismatch),
                Value::String(s) => s
                    .trim()
                    .parse()
                    .map(BindValue::Integer)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Self::Float => match value {
                Value::Number(n) => n.as_f64().map(BindValue::Float).ok_or_else(mismatch),
                Value::String(s) => s
                    .trim()
                    .parse()
                    .map(BindValue::Float)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Self::Text => match value {
                Value::Array(_) | Value::Object(_) => Err(mismatch()),
                other => Ok(BindValue::Text(value_as_text(other))),
            },
            Self::Boolean => match value {
                Value::Bool(b) => Ok(BindValue::Boolean(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(BindValue::Boolean(false)),
                    Some(1) => Ok(BindValue::Boolean(true)),
                    _ => Err(mismatch()),
                },
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(BindValue::Boolean(true)),
                    "false" | "0" => Ok(BindValue::Boolean(false)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            Self::Timestamp => match value {
                Value::String(s) => parse_timestamp(s.trim())
                    .map(BindValue::Timestamp)
                    .ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            Self::Json => Ok(BindValue::Json(value.clone())),
        }
    }
}

/// Coerce a predicate parameter for a clause
///
/// `in` and `between` parameters are coerced element-wise; `like` and
/// `search` always bind text.
pub(crate) fn coerce_param(
    field: &Field,
    operator: Operator,
    value: &Value,
    operation: RepositoryOperation,
) -> Result<Vec<BindValue>, RepositoryError> {
    let fail = |message: String| {
        RepositoryError::validation_failed(operation, format!("field `{}`: {}", field.name, message))
    };

    match operator {
        Operator::Like | Operator::Search => Ok(vec![BindValue::Text(value_as_text(value))]),
        Operator::In | Operator::Between => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| field.kind.coerce(item).map_err(fail))
                .collect(),
            other => Ok(vec![field.kind.coerce(other).map_err(fail)?]),
        },
        _ => Ok(vec![field.kind.coerce(value).map_err(fail)?]),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{compile, Conjunction, Criteria};
    use chrono::TimeZone;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Account {
        id: Option<u32>,
        email: String,
        balance: f64,
    }

    impl Record for Account {
        const TABLE: &'static str = "accounts";
        const SCHEMA: Schema = Schema::new(&[
            Field::integer("id"),
            Field::text("email"),
            Field::float("balance"),
        ]);
    }

    #[test]
    fn test_schema_lookup() {
        assert_eq!(Account::SCHEMA.primary_key(), "id");
        assert_eq!(
            Account::SCHEMA.field("balance").map(|f| f.kind),
            Some(FieldKind::Float)
        );
        assert!(Account::SCHEMA
            .require("password", RepositoryOperation::Find)
            .is_err());
    }

    #[test]
    fn test_custom_primary_key() {
        const SCHEMA: Schema = Schema::new(&[Field::text("code")]).with_primary_key("code");
        assert_eq!(SCHEMA.primary_key(), "code");
    }

    #[test]
    fn test_check_predicate_rejects_unknown_field() {
        let predicate = compile(
            &Criteria::new().with("email", "a@b.c").with("password.like", "x"),
            Conjunction::And,
        );
        let error = Account::SCHEMA
            .check_predicate(&predicate, RepositoryOperation::Find)
            .unwrap_err();
        assert!(error.message.contains("password"));
    }

    #[test]
    fn test_parse_sort_checks_fields() {
        let order = Account::SCHEMA
            .parse_sort("balance desc, id", RepositoryOperation::Find)
            .unwrap();
        assert_eq!(order.len(), 2);
        assert!(Account::SCHEMA
            .parse_sort("id; DROP TABLE accounts", RepositoryOperation::Find)
            .is_err());
    }

    #[test]
    fn test_insert_columns_skip_unset_primary_key() {
        let row = to_row(
            &Account {
                id: None,
                email: "a@b.c".into(),
                balance: 1.5,
            },
            RepositoryOperation::Create,
        )
        .unwrap();
        let names: Vec<_> = Account::SCHEMA
            .insert_columns(&row)
            .iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["email", "balance"]);

        let row = to_row(
            &Account {
                id: Some(4),
                email: "a@b.c".into(),
                balance: 1.5,
            },
            RepositoryOperation::Create,
        )
        .unwrap();
        assert_eq!(Account::SCHEMA.insert_columns(&row).len(), 3);
    }

    #[test]
    fn test_coerce_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            FieldKind::Timestamp.coerce(&json!("2018-01-01")),
            Ok(BindValue::Timestamp(expected))
        );
        assert_eq!(
            FieldKind::Timestamp.coerce(&json!("2018-01-01T02:00:00+02:00")),
            Ok(BindValue::Timestamp(expected))
        );
        assert!(FieldKind::Timestamp.coerce(&json!("yesterday")).is_err());
    }

    #[test]
    fn test_coerce_null_keeps_kind() {
        assert_eq!(
            FieldKind::Text.coerce(&Value::Null),
            Ok(BindValue::Null(FieldKind::Text))
        );
    }

    #[test]
    fn test_coerce_param_in_is_element_wise() {
        let field = Field::integer("status");
        let values = coerce_param(
            &field,
            Operator::In,
            &json!(["1", 2]),
            RepositoryOperation::Find,
        )
        .unwrap();
        assert_eq!(values, vec![BindValue::Integer(1), BindValue::Integer(2)]);

        let error = coerce_param(
            &field,
            Operator::In,
            &json!(["x"]),
            RepositoryOperation::Find,
        )
        .unwrap_err();
        assert!(error.message.contains("status"));
    }

    #[test]
    fn test_coerce_param_like_binds_text() {
        let field = Field::integer("code");
        let values = coerce_param(
            &field,
            Operator::Like,
            &json!("%12%"),
            RepositoryOperation::Find,
        )
        .unwrap();
        assert_eq!(values, vec![BindValue::Text("%12%".into())]);
    }

    #[test]
    fn test_bind_value_to_json() {
        assert_eq!(
            FieldKind::Integer.coerce(&json!("3")).unwrap().to_json(),
            json!(3)
        );
        assert_eq!(BindValue::Null(FieldKind::Text).to_json(), Value::Null);
        assert_eq!(BindValue::Float(f64::NAN).to_json(), Value::Null);
        let ts = FieldKind::Timestamp.coerce(&json!("2018-01-01")).unwrap();
        assert_eq!(ts.to_json(), json!("2018-01-01T00:00:00+00:00"));
    }

    #[test]
    fn test_bind_value_ordering() {
        assert!(BindValue::Integer(2) < BindValue::Integer(3));
        assert!(BindValue::Integer(2) < BindValue::Float(2.5));
        assert_eq!(
            BindValue::Text("a".into()).partial_cmp(&BindValue::Integer(1)),
            None
        );
    }
}
