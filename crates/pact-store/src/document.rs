// document.rs — Document representation, predicates, ordering, change records.
//
// A document is a JSON object. Its identity lives both in the store key and
// in the `id` field of the object, so typed records can deserialize it
// without extra plumbing.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// A stored document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Serialize a typed record into a document.
///
/// Fails with a serialization error if the record is not a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(serde::ser::Error::custom(
            format!("expected a JSON object, got {}", other),
        ))),
    }
}

/// Deserialize a document into a typed record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Resolve a dotted field path (`data.goalId`) inside a document.
pub fn field<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Conjunction of equality conditions over field paths.
///
/// An empty filter matches every document in the collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `path == value`.
    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((path.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(path, expected)| field(doc, path) == Some(expected))
    }
}

/// Sort order for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// Sort documents in place. Documents missing the field sort last.
    pub fn sort(&self, docs: &mut [Document]) {
        docs.sort_by(|a, b| {
            match (field(a, &self.field), field(b, &self.field)) {
                (Some(x), Some(y)) => {
                    let ord = compare_values(x, y);
                    if self.descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    }
}

// Timestamps are stored as RFC 3339 strings with a variable number of
// fractional digits, so they are compared as instants, not as text.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Apply a partial update to a document.
///
/// Top-level keys in `fields` overwrite the existing ones; a `null` value
/// removes the key. The `id` field is never rewritten.
pub(crate) fn merge(doc: &mut Document, fields: Document) {
    for (key, value) in fields {
        if key == "id" {
            continue;
        }
        if value.is_null() {
            doc.remove(&key);
        } else {
            doc.insert(key, value);
        }
    }
}

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Published on the store's change feed after every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChange {
    pub collection: String,
    pub id: String,
    pub kind: ChangeKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn field_resolves_dotted_paths() {
        let d = doc(json!({"userId": "u1", "data": {"goalId": "g1"}}));
        assert_eq!(field(&d, "userId"), Some(&json!("u1")));
        assert_eq!(field(&d, "data.goalId"), Some(&json!("g1")));
        assert_eq!(field(&d, "data.missing"), None);
        assert_eq!(field(&d, "userId.nested"), None);
    }

    #[test]
    fn filter_is_a_conjunction() {
        let d = doc(json!({"userId": "u1", "type": "goal_suggestion"}));
        assert!(Filter::new().matches(&d));
        assert!(Filter::new().eq("userId", "u1").matches(&d));
        assert!(!Filter::new()
            .eq("userId", "u1")
            .eq("type", "goal_approved")
            .matches(&d));
    }

    #[test]
    fn order_by_compares_timestamps_as_instants() {
        // "12:00:00Z" sorts after "12:00:00.5Z" as text, but is earlier in time.
        let mut docs = vec![
            doc(json!({"id": "a", "createdAt": "2026-01-01T12:00:00Z"})),
            doc(json!({"id": "b", "createdAt": "2026-01-01T12:00:00.500Z"})),
            doc(json!({"id": "c"})),
        ];
        OrderBy::desc("createdAt").sort(&mut docs);
        let ids: Vec<_> = docs.iter().map(|d| d["id"].clone()).collect();
        assert_eq!(ids, vec![json!("b"), json!("a"), json!("c")]);
    }

    #[test]
    fn merge_removes_nulls_and_keeps_id() {
        let mut d = doc(json!({"id": "g1", "a": 1, "b": 2}));
        merge(&mut d, doc(json!({"id": "other", "a": 5, "b": null, "c": true})));
        assert_eq!(Value::Object(d), json!({"id": "g1", "a": 5, "c": true}));
    }

    #[test]
    fn to_document_rejects_non_objects() {
        assert!(to_document(&42).is_err());
        assert!(to_document(&json!({"a": 1})).is_ok());
    }
}
