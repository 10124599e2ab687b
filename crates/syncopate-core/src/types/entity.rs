use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::field_value::FieldValue;

/// Store-managed creation timestamp, kept inside the field map.
pub const CREATED_AT_FIELD: &str = "_created_at";
/// Store-managed last-modification timestamp, kept inside the field map.
pub const UPDATED_AT_FIELD: &str = "_updated_at";

/// A stored record of a given entity type.
///
/// Fields are a `BTreeMap` for deterministic ordering, which simplifies
/// testing and serialization. The id is held in its canonical string form
/// regardless of the generator; the representation layer coerces it back
/// to the declared external type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            fields,
        }
    }

    /// Returns the value of a field by name, if present.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.fields.get(CREATED_AT_FIELD) {
            Some(FieldValue::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self.fields.get(UPDATED_AT_FIELD) {
            Some(FieldValue::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    /// Stamps both timestamps to `now` (insert path).
    pub fn stamp_created(&mut self, now: DateTime<Utc>) {
        self.fields
            .insert(CREATED_AT_FIELD.to_string(), FieldValue::DateTime(now));
        self.fields
            .insert(UPDATED_AT_FIELD.to_string(), FieldValue::DateTime(now));
    }

    /// Refreshes the modification timestamp, preserving creation time.
    pub fn stamp_updated(&mut self, now: DateTime<Utc>) {
        self.fields
            .insert(UPDATED_AT_FIELD.to_string(), FieldValue::DateTime(now));
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}
