//! Pure functions over cached collections of records.
//!
//! Collections are JSON arrays of objects carrying an `id` field. Optimistic
//! records carry a [`TempId`] until the server assigns the real id; the
//! functions here insert, patch, remove and reconcile them without touching
//! the position of any other record.
//!
//! This is part of the Functional Core - all functions are pure with no side effects.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Name of the identity field of every record.
pub const ID_FIELD: &str = "id";

/// Errors that can occur when reconciling an optimistic record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Optimistic placeholder {temp_id} not found in cached collection")]
    PlaceholderNotFound { temp_id: String },
    #[error("Server record has no `id` field")]
    MissingId,
    #[error("Cached value is not a collection")]
    NotACollection,
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Client-assigned identity of a record the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(String);

impl TempId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The JSON value stored in the placeholder's `id` field.
    pub fn to_json(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues unique, monotonically increasing temporary ids (`T-<n>`).
#[derive(Debug)]
pub struct TempIdGenerator {
    next: AtomicI64,
}

impl TempIdGenerator {
    pub fn starting_at(seed: i64) -> Self {
        Self {
            next: AtomicI64::new(seed),
        }
    }

    /// Seeds the counter with the current unix timestamp.
    pub fn from_clock() -> Self {
        Self::starting_at(chrono::Utc::now().timestamp())
    }

    pub fn next_id(&self) -> TempId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        TempId(format!("T-{}", n))
    }
}

impl Default for TempIdGenerator {
    fn default() -> Self {
        Self::from_clock()
    }
}

/// Returns the `id` field of a record.
pub fn record_id(record: &Value) -> Option<&Value> {
    record.get(ID_FIELD)
}

fn has_id(record: &Value, id: &Value) -> bool {
    record_id(record) == Some(id)
}

/// Returns the position of the record with `id` in `records`.
pub fn find_position(records: &[Value], id: &Value) -> Option<usize> {
    records.iter().position(|record| has_id(record, id))
}

/// Appends `placeholder` to a cached collection.
///
/// Returns `None` when `current` is absent or not a collection (there is no
/// loaded list to patch). A collection that already holds a record with the
/// placeholder's id is returned unchanged.
pub fn insert_placeholder(current: Option<&Value>, placeholder: &Value) -> Option<Value> {
    let records = current?.as_array()?;
    let mut records = records.clone();

    let already_present = record_id(placeholder)
        .map(|id| find_position(&records, id).is_some())
        .unwrap_or(false);
    if !already_present {
        records.push(placeholder.clone());
    }

    Some(Value::Array(records))
}

/// Replaces the placeholder with id `temp_id` by the server's record, at the
/// placeholder's position.
///
/// Idempotent: once the placeholder is gone and the server record is
/// present, reconciling again rewrites the server record where it stands.
/// If both are present (the record reached the list by another path) the
/// other copy is removed and the server record takes the placeholder's slot
/// relative to its neighbours.
pub fn replace_in_place(collection: &Value, temp_id: &Value, server: &Value) -> Result<Value> {
    let records = collection.as_array().ok_or(ReconcileError::NotACollection)?;
    let server_id = record_id(server).ok_or(ReconcileError::MissingId)?;

    let temp_pos = find_position(records, temp_id);
    let server_pos = find_position(records, server_id);

    let mut records = records.clone();
    match (temp_pos, server_pos) {
        (Some(t), None) => records[t] = server.clone(),
        (Some(t), Some(s)) => {
            records.remove(s);
            // The placeholder moved up by one if the copy sat before it.
            let t = if s < t { t - 1 } else { t };
            records[t] = server.clone();
        }
        (None, Some(s)) => records[s] = server.clone(),
        (None, None) => {
            return Err(ReconcileError::PlaceholderNotFound {
                temp_id: temp_id
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| temp_id.to_string()),
            })
        }
    }

    Ok(Value::Array(records))
}

/// Shallow-merges the fields of `changes` into `record`.
///
/// Non-object inputs yield `changes` unchanged.
pub fn merge_fields(record: &Value, changes: &Value) -> Value {
    match (record, changes) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut merged: Map<String, Value> = base.clone();
            for (field, value) in patch {
                merged.insert(field.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => changes.clone(),
    }
}

/// Applies `changes` to the record with `id`, either inside a collection or
/// as a single cached record.
///
/// Returns `None` when no record with `id` is cached under this value.
pub fn apply_changes(current: Option<&Value>, id: &Value, changes: &Value) -> Option<Value> {
    map_record(current?, id, |record| merge_fields(record, changes))
}

/// Replaces the record carrying the server record's id with the server
/// record. Returns `None` when it is not cached under this value.
pub fn replace_record(current: &Value, server: &Value) -> Option<Value> {
    let id = record_id(server)?;
    map_record(current, id, |_| server.clone())
}

/// Removes the record with `id` from a cached collection.
///
/// Returns `None` when `current` is absent, not a collection, or does not
/// contain the record.
pub fn remove_record(current: Option<&Value>, id: &Value) -> Option<Value> {
    let records = current?.as_array()?;
    let position = find_position(records, id)?;

    let mut records = records.clone();
    records.remove(position);
    Some(Value::Array(records))
}

fn map_record(current: &Value, id: &Value, f: impl Fn(&Value) -> Value) -> Option<Value> {
    match current {
        Value::Array(records) => {
            let position = find_position(records, id)?;
            let mut records = records.clone();
            records[position] = f(&records[position]);
            Some(Value::Array(records))
        }
        record @ Value::Object(_) if has_id(record, id) => Some(f(record)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tenants_with_placeholder() -> Value {
        json!([
            {"id": 1, "name": "Globex"},
            {"id": "T-1700000000", "name": "Acme"},
            {"id": 2, "name": "Initech"},
        ])
    }

    #[test]
    fn test_temp_id_generator_is_monotonic() {
        let generator = TempIdGenerator::starting_at(1_700_000_000);
        assert_eq!(generator.next_id(), TempId::new("T-1700000000"));
        assert_eq!(generator.next_id(), TempId::new("T-1700000001"));
    }

    #[test]
    fn test_insert_placeholder_appends() {
        let current = json!([{"id": 1, "name": "Globex"}]);
        let placeholder = json!({"id": "T-1", "name": "Acme"});

        let patched = insert_placeholder(Some(&current), &placeholder).unwrap();
        assert_eq!(
            patched,
            json!([{"id": 1, "name": "Globex"}, {"id": "T-1", "name": "Acme"}])
        );
    }

    #[test]
    fn test_insert_placeholder_skips_unloaded_or_non_collection() {
        let placeholder = json!({"id": "T-1"});
        assert_eq!(insert_placeholder(None, &placeholder), None);
        assert_eq!(insert_placeholder(Some(&json!({"count": 3})), &placeholder), None);
    }

    #[test]
    fn test_insert_placeholder_does_not_duplicate() {
        let current = json!([{"id": "T-1"}]);
        let patched = insert_placeholder(Some(&current), &json!({"id": "T-1"})).unwrap();
        assert_eq!(patched, current);
    }

    #[test]
    fn test_replace_in_place_keeps_position() {
        let server = json!({"id": 42, "name": "Acme"});
        let reconciled =
            replace_in_place(&tenants_with_placeholder(), &json!("T-1700000000"), &server)
                .unwrap();

        assert_eq!(
            reconciled,
            json!([
                {"id": 1, "name": "Globex"},
                {"id": 42, "name": "Acme"},
                {"id": 2, "name": "Initech"},
            ])
        );
    }

    #[test]
    fn test_replace_in_place_is_idempotent() {
        let server = json!({"id": 42, "name": "Acme"});
        let temp = json!("T-1700000000");

        let once = replace_in_place(&tenants_with_placeholder(), &temp, &server).unwrap();
        let twice = replace_in_place(&once, &temp, &server).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_replace_in_place_drops_second_copy() {
        let collection = json!([
            {"id": "T-1", "name": "Acme"},
            {"id": 5, "name": "Other"},
            {"id": 42, "name": "Acme"},
        ]);
        let server = json!({"id": 42, "name": "Acme"});

        let reconciled = replace_in_place(&collection, &json!("T-1"), &server).unwrap();
        assert_eq!(
            reconciled,
            json!([{"id": 42, "name": "Acme"}, {"id": 5, "name": "Other"}])
        );
    }

    #[test]
    fn test_replace_in_place_with_copy_before_placeholder() {
        let collection = json!([
            {"id": 1, "name": "Globex"},
            {"id": 42, "name": "Acme"},
            {"id": 5, "name": "Other"},
            {"id": "T-1", "name": "Acme"},
            {"id": 9, "name": "Initech"},
        ]);
        let server = json!({"id": 42, "name": "Acme Corp"});

        let reconciled = replace_in_place(&collection, &json!("T-1"), &server).unwrap();
        assert_eq!(
            reconciled,
            json!([
                {"id": 1, "name": "Globex"},
                {"id": 5, "name": "Other"},
                {"id": 42, "name": "Acme Corp"},
                {"id": 9, "name": "Initech"},
            ])
        );
    }

    #[test]
    fn test_replace_in_place_errors() {
        let server = json!({"id": 42});
        assert_eq!(
            replace_in_place(&json!({"id": 1}), &json!("T-1"), &server),
            Err(ReconcileError::NotACollection)
        );
        assert_eq!(
            replace_in_place(&json!([]), &json!("T-1"), &json!({"name": "x"})),
            Err(ReconcileError::MissingId)
        );
        assert_eq!(
            replace_in_place(&json!([{"id": 1}]), &json!("T-1"), &server),
            Err(ReconcileError::PlaceholderNotFound {
                temp_id: "T-1".to_string()
            })
        );
    }

    #[test]
    fn test_apply_changes_in_collection_and_record() {
        let teams = json!([{"id": 7, "isActive": true}, {"id": 8, "isActive": true}]);
        let changes = json!({"isActive": false});

        assert_eq!(
            apply_changes(Some(&teams), &json!(7), &changes).unwrap(),
            json!([{"id": 7, "isActive": false}, {"id": 8, "isActive": true}])
        );

        let team = json!({"id": 7, "name": "SRE", "isActive": true});
        assert_eq!(
            apply_changes(Some(&team), &json!(7), &changes).unwrap(),
            json!({"id": 7, "name": "SRE", "isActive": false})
        );

        assert_eq!(apply_changes(Some(&team), &json!(8), &changes), None);
        assert_eq!(apply_changes(None, &json!(7), &changes), None);
    }

    #[test]
    fn test_replace_record() {
        let teams = json!([{"id": 7, "name": "old"}]);
        let server = json!({"id": 7, "name": "new", "updatedAt": "now"});

        assert_eq!(
            replace_record(&teams, &server).unwrap(),
            json!([{"id": 7, "name": "new", "updatedAt": "now"}])
        );
        assert_eq!(replace_record(&teams, &json!({"id": 9})), None);
        assert_eq!(replace_record(&teams, &json!({"name": "no id"})), None);
    }

    #[test]
    fn test_remove_record() {
        let teams = json!([{"id": 7}, {"id": 8}]);
        assert_eq!(
            remove_record(Some(&teams), &json!(7)).unwrap(),
            json!([{"id": 8}])
        );
        assert_eq!(remove_record(Some(&teams), &json!(9)), None);
        assert_eq!(remove_record(Some(&json!({"id": 7})), &json!(7)), None);
    }

    #[test]
    fn test_merge_fields_non_object() {
        assert_eq!(merge_fields(&json!(1), &json!({"a": 1})), json!({"a": 1}));
    }
}
