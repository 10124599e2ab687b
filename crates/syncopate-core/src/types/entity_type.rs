use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::DbError;

use super::field_definition::FieldDefinition;
use super::id_generator::IdGeneratorKind;

/// A registered entity type: name, id strategy, and an ordered field list.
///
/// `name` and `id_generator` are immutable once registered; fields may be
/// added, removed, or have their flags toggled through an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeDefinition {
    pub name: String,
    #[serde(default)]
    pub id_generator: IdGeneratorKind,
    pub fields: Vec<FieldDefinition>,
}

impl EntityTypeDefinition {
    pub fn new(name: impl Into<String>, id_generator: IdGeneratorKind) -> Self {
        Self {
            name: name.into(),
            id_generator,
            fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: Vec<FieldDefinition>) -> Self {
        self.fields = fields;
        self
    }

    /// Validates the definition:
    /// - non-empty name
    /// - no duplicate field names
    /// - no field named `id` (the id lives only at the top level)
    /// - no leading-underscore field name unless the field is internal
    pub fn validate(&self) -> Result<(), DbError> {
        if self.name.is_empty() {
            return Err(DbError::InvalidEntityType {
                name: self.name.clone(),
                reason: "name must not be empty".into(),
            });
        }
        let mut seen = HashSet::with_capacity(self.fields.len());
        for f in &self.fields {
            if f.name == "id" {
                return Err(DbError::InvalidEntityType {
                    name: self.name.clone(),
                    reason: "field name 'id' is reserved".into(),
                });
            }
            if f.name.starts_with('_') && !f.internal {
                return Err(DbError::InvalidEntityType {
                    name: self.name.clone(),
                    reason: format!(
                        "field name '{}' starts with '_' but is not internal",
                        f.name
                    ),
                });
            }
            if f.name.is_empty() {
                return Err(DbError::InvalidEntityType {
                    name: self.name.clone(),
                    reason: "field name must not be empty".into(),
                });
            }
            if !seen.insert(f.name.as_str()) {
                return Err(DbError::InvalidEntityType {
                    name: self.name.clone(),
                    reason: format!("duplicate field name '{}'", f.name),
                });
            }
        }
        Ok(())
    }

    /// Looks up a field declaration by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of fields carrying the `unique` flag.
    pub fn unique_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.unique)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Names of fields carrying the `indexed` flag.
    pub fn indexed_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.indexed)
            .map(|f| f.name.as_str())
            .collect()
    }
}

/// Payload of an entity type update. The generator is optional so that an
/// omitted value carries the stored one forward, while a present value
/// that differs is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeUpdate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_generator: Option<IdGeneratorKind>,
    pub fields: Vec<FieldDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    fn user_type() -> EntityTypeDefinition {
        EntityTypeDefinition::new("user", IdGeneratorKind::AutoIncrement).with_fields(vec![
            FieldDefinition::new("email", FieldType::String).required().unique(),
            FieldDefinition::new("age", FieldType::Integer).indexed(),
        ])
    }

    #[test]
    fn valid_definition() {
        let def = user_type();
        def.validate().unwrap();
        assert!(def.field("email").is_some());
        assert!(def.field("missing").is_none());
        assert_eq!(def.unique_fields(), vec!["email"]);
        assert_eq!(def.indexed_fields(), vec!["age"]);
    }

    #[test]
    fn empty_name_rejected() {
        let def = EntityTypeDefinition::new("", IdGeneratorKind::Uuid);
        assert!(matches!(
            def.validate(),
            Err(DbError::InvalidEntityType { .. })
        ));
    }

    #[test]
    fn duplicate_field_rejected() {
        let def = EntityTypeDefinition::new("user", IdGeneratorKind::Uuid).with_fields(vec![
            FieldDefinition::new("email", FieldType::String),
            FieldDefinition::new("email", FieldType::String),
        ]);
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn reserved_id_field_rejected() {
        let def = EntityTypeDefinition::new("user", IdGeneratorKind::Uuid)
            .with_fields(vec![FieldDefinition::new("id", FieldType::String)]);
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn underscore_requires_internal() {
        let def = EntityTypeDefinition::new("user", IdGeneratorKind::Uuid)
            .with_fields(vec![FieldDefinition::new("_shadow", FieldType::String)]);
        assert!(def.validate().is_err());

        let def = EntityTypeDefinition::new("user", IdGeneratorKind::Uuid)
            .with_fields(vec![
                FieldDefinition::new("_shadow", FieldType::String).internal()
            ]);
        def.validate().unwrap();
    }

    #[test]
    fn serde_defaults_generator() {
        let def: EntityTypeDefinition = serde_json::from_str(
            r#"{"name": "user", "fields": [{"name": "email", "type": "string"}]}"#,
        )
        .unwrap();
        assert_eq!(def.id_generator, IdGeneratorKind::AutoIncrement);
    }

    #[test]
    fn update_payload_distinguishes_absent_generator() {
        let upd: EntityTypeUpdate =
            serde_json::from_str(r#"{"name": "user", "fields": []}"#).unwrap();
        assert_eq!(upd.id_generator, None);

        let upd: EntityTypeUpdate = serde_json::from_str(
            r#"{"name": "user", "idGenerator": "uuid", "fields": []}"#,
        )
        .unwrap();
        assert_eq!(upd.id_generator, Some(IdGeneratorKind::Uuid));
    }

    #[test]
    fn serde_roundtrip() {
        let def = user_type();
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("\"idGenerator\":\"auto_increment\""));
        let back: EntityTypeDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }
}
