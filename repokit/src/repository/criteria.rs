//! Criteria maps
//!
//! A [`Criteria`] is the flat, untyped description of a query that callers
//! hand to a repository: pagination-control keys (`per_page`, `page`, `sort`,
//! `last_id`) and filter keys of the form `field` or `field.operator`.
//!
//! Entries keep their insertion order so that the compiled predicate is
//! deterministic. Repositories only ever borrow a criteria map; every stage
//! that needs to change it produces a new one.
//!
//! # Example
//!
//! ```rust
//! use repokit::repository::Criteria;
//!
//! let criteria = Criteria::new()
//!     .with("status.in", vec![1, 2, 3])
//!     .with("name", "john")
//!     .with("per_page", "10");
//!
//! assert_eq!(criteria.len(), 3);
//! assert_eq!(criteria.keys().next(), Some("status.in"));
//! ```

use std::fmt;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Page size control key
pub const PER_PAGE_KEY: &str = "per_page";
/// Page number control key (1-indexed)
pub const PAGE_KEY: &str = "page";
/// Literal order-by control key
pub const SORT_KEY: &str = "sort";
/// Keyset pagination control key
pub const LAST_ID_KEY: &str = "last_id";

/// Every key interpreted by pagination rather than filtering
pub const CONTROL_KEYS: [&str; 4] = [PER_PAGE_KEY, PAGE_KEY, SORT_KEY, LAST_ID_KEY];

/// Ordered mapping from criteria key to an untyped value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    entries: Vec<(String, Value)>,
}

impl Criteria {
    /// Create an empty criteria map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build criteria from a URL query string
    ///
    /// Values are kept as strings; for repeated keys the first value wins.
    ///
    /// # Example
    ///
    /// ```rust
    /// use repokit::repository::Criteria;
    /// use serde_json::json;
    ///
    /// let criteria = Criteria::from_query("status.in=1,2,3&name=john&name=jane").unwrap();
    /// assert_eq!(criteria.get("status.in"), Some(&json!("1,2,3")));
    /// assert_eq!(criteria.get("name"), Some(&json!("john")));
    /// ```
    pub fn from_query(query: &str) -> Result<Self, serde_urlencoded::de::Error> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(query.trim_start_matches('?'))?;

        let mut criteria = Self::new();
        for (key, value) in pairs {
            if !criteria.contains_key(&key) {
                criteria.entries.push((key, Value::String(value)));
            }
        }
        Ok(criteria)
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, replacing an existing key in place
    ///
    /// Returns the previous value if the key was present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Iterate over entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of this map without the pagination-control keys
    #[must_use]
    pub fn without_control_keys(&self) -> Self {
        self.entries
            .iter()
            .filter(|(k, _)| !CONTROL_KEYS.contains(&k.as_str()))
            .cloned()
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut criteria = Self::new();
        for (key, value) in iter {
            criteria.insert(key, value);
        }
        criteria
    }
}

impl From<serde_json::Map<String, Value>> for Criteria {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl IntoIterator for Criteria {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Criteria {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Criteria {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CriteriaVisitor;

        impl<'de> Visitor<'de> for CriteriaVisitor {
            type Value = Criteria;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of criteria keys to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Criteria, A::Error> {
                let mut criteria = Criteria::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    criteria.insert(key, value);
                }
                Ok(criteria)
            }
        }

        deserializer.deserialize_map(CriteriaVisitor)
    }
}

/// Read an untyped criteria value as an integer
///
/// Accepts JSON numbers and numeric strings (surrounding whitespace allowed).
pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Textual form of a scalar criteria value
pub(crate) fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_preserves_order_and_replaces_in_place() {
        let mut criteria = Criteria::new().with("b", 1).with("a", 2).with("c", 3);
        let previous = criteria.insert("a", 20);

        assert_eq!(previous, Some(json!(2)));
        assert_eq!(criteria.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(criteria.get("a"), Some(&json!(20)));
    }

    #[test]
    fn test_remove() {
        let mut criteria = Criteria::new().with("page", "2").with("name", "john");
        assert_eq!(criteria.remove("page"), Some(json!("2")));
        assert_eq!(criteria.remove("page"), None);
        assert_eq!(criteria.len(), 1);
    }

    #[test]
    fn test_from_query_first_value_wins() {
        let criteria =
            Criteria::from_query("?status.in=1,2,3&name=john&name.like=abc&name=jane").unwrap();
        assert_eq!(criteria.len(), 3);
        assert_eq!(criteria.get("name"), Some(&json!("john")));
        assert_eq!(criteria.get("name.like"), Some(&json!("abc")));
    }

    #[test]
    fn test_from_query_decodes_operators() {
        let criteria = Criteria::from_query("created_at.%3E%3D=2018-01-01&score.%3C=5").unwrap();
        assert_eq!(criteria.get("created_at.>="), Some(&json!("2018-01-01")));
        assert_eq!(criteria.get("score.<"), Some(&json!("5")));
    }

    #[test]
    fn test_without_control_keys() {
        let criteria = Criteria::new()
            .with("per_page", "10")
            .with("page", "2")
            .with("sort", "id asc")
            .with("last_id", 4)
            .with("name", "john");
        let filters = criteria.without_control_keys();
        assert_eq!(filters.keys().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(criteria.len(), 5);
    }

    #[test]
    fn test_serde_round_trip_keeps_order() {
        let criteria = Criteria::new().with("z", 1).with("a", "x");
        let text = serde_json::to_string(&criteria).unwrap();
        assert_eq!(text, r#"{"z":1,"a":"x"}"#);

        let back: Criteria = serde_json::from_str(r#"{"z":1,"a":"x"}"#).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["z", "a"]);
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(value_as_i64(&json!("10")), Some(10));
        assert_eq!(value_as_i64(&json!(" 7 ")), Some(7));
        assert_eq!(value_as_i64(&json!(3)), Some(3));
        assert_eq!(value_as_i64(&json!(3.0)), Some(3));
        assert_eq!(value_as_i64(&json!("ten")), None);
        assert_eq!(value_as_i64(&json!(null)), None);
    }
}
