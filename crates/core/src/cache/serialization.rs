//! Pure functions for converting typed records to and from cached JSON values.
//!
//! The cache stores `serde_json::Value` so that one store can hold every view
//! of the console; these helpers are the typed boundary around it.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during cache serialization/deserialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializationError {
    /// Failed to serialize a value.
    #[error("Failed to serialize: {0}")]
    SerializeFailed(String),
    /// Failed to deserialize a cached value.
    #[error("Failed to deserialize: {0}")]
    DeserializeFailed(String),
}

/// Result type for serialization operations.
pub type Result<T> = std::result::Result<T, SerializationError>;

/// Serializes a record into the value stored in the cache.
pub fn serialize_record<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(|e| SerializationError::SerializeFailed(e.to_string()))
}

/// Serializes a list of records into a cached collection.
pub fn serialize_records<T: Serialize>(records: &[T]) -> Result<Value> {
    serde_json::to_value(records).map_err(|e| SerializationError::SerializeFailed(e.to_string()))
}

/// Deserializes a cached value into a record.
pub fn deserialize_record<T: DeserializeOwned>(value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| SerializationError::DeserializeFailed(e.to_string()))
}

/// Deserializes a cached collection into records.
pub fn deserialize_records<T: DeserializeOwned>(value: &Value) -> Result<Vec<T>> {
    Vec::<T>::deserialize(value).map_err(|e| SerializationError::DeserializeFailed(e.to_string()))
}
