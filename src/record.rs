//! The Data record and the inputs that create and modify it.
//!
//! Request bodies arrive as [`NewRecord`] and [`RecordPatch`]. Both keep
//! every field as raw JSON so that "absent" and "present but null" stay
//! distinguishable until [`NewRecord::validate`] / [`RecordPatch::validate`]
//! turn them into the checked [`RecordFields`] / [`FieldUpdate`] the stores
//! write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::store::StoreError;

/// A stored Data record, in the shape every backend returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Overwrites the fields present in `update`.
    pub fn apply(&mut self, update: &FieldUpdate) {
        if let Some(kind) = &update.kind {
            self.kind = kind.clone();
        }
        if let Some(data) = &update.data {
            self.data = data.clone();
        }
        if let Some(metadata) = &update.metadata {
            self.metadata = metadata.clone();
        }
    }
}

/// Deserialises a field that is present in the body, keeping `null` as
/// `Some(Value::Null)`. Paired with `#[serde(default)]` for absent fields.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// The body of a create request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewRecord {
    #[serde(rename = "type", default, deserialize_with = "present")]
    pub kind: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub data: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub metadata: Option<Value>,
}

/// A validated record ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFields {
    pub kind: String,
    pub data: Value,
    pub metadata: Value,
}

impl NewRecord {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: Some(Value::String(kind.into())),
            data: Some(data),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Checks that `type` is a non-empty string and `data` is present and
    /// non-null. A missing or null `metadata` becomes `{}`.
    pub fn validate(self) -> Result<RecordFields, StoreError> {
        let mut problems = Vec::new();

        let kind = match self.kind {
            Some(value) => check_kind(value, &mut problems),
            None => {
                problems.push("`type` is required".to_owned());
                None
            }
        };
        let data = match self.data {
            Some(value) => check_data(value, &mut problems),
            None => {
                problems.push("`data` is required".to_owned());
                None
            }
        };

        match (kind, data) {
            (Some(kind), Some(data)) if problems.is_empty() => Ok(RecordFields {
                kind,
                data,
                metadata: metadata_or_empty(self.metadata),
            }),
            _ => Err(StoreError::Validation(format!(
                "record validation failed: {}",
                problems.join(", ")
            ))),
        }
    }
}

/// The body of a partial update request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordPatch {
    #[serde(rename = "type", default, deserialize_with = "present")]
    pub kind: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub data: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub metadata: Option<Value>,
}

/// A validated partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUpdate {
    pub kind: Option<String>,
    pub data: Option<Value>,
    pub metadata: Option<Value>,
}

impl FieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.data.is_none() && self.metadata.is_none()
    }

    /// Names of the fields this update writes, as stored.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(3);
        if self.kind.is_some() {
            names.push("type");
        }
        if self.data.is_some() {
            names.push("data");
        }
        if self.metadata.is_some() {
            names.push("metadata");
        }
        names
    }
}

impl RecordPatch {
    /// Only supplied fields are written. A supplied `type` or `data` must
    /// satisfy the same rules as on create; a supplied `metadata: null`
    /// resets metadata to `{}`.
    pub fn validate(self) -> Result<FieldUpdate, StoreError> {
        let mut problems = Vec::new();
        let kind = self.kind.and_then(|v| check_kind(v, &mut problems));
        let data = self.data.and_then(|v| check_data(v, &mut problems));
        if !problems.is_empty() {
            return Err(StoreError::Validation(format!(
                "record validation failed: {}",
                problems.join(", ")
            )));
        }
        Ok(FieldUpdate {
            kind,
            data,
            metadata: self.metadata.map(|m| metadata_or_empty(Some(m))),
        })
    }
}

fn check_kind(value: Value, problems: &mut Vec<String>) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::String(_) | Value::Null => {
            problems.push("`type` is required".to_owned());
            None
        }
        _ => {
            problems.push("`type` must be a string".to_owned());
            None
        }
    }
}

fn check_data(value: Value, problems: &mut Vec<String>) -> Option<Value> {
    if value.is_null() {
        problems.push("`data` is required".to_owned());
        None
    } else {
        Some(value)
    }
}

fn metadata_or_empty(metadata: Option<Value>) -> Value {
    match metadata {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(value) => value,
    }
}
