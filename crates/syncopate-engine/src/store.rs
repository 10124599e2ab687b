//! The authoritative mapping from `(type, id)` to entity records, with
//! per-type membership, per-field hash indexes, unique maps, and the
//! auto-increment counters. All mutations hold the write lock; queries
//! hold the read lock for their full duration and see a consistent
//! snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use syncopate_core::error::DbError;
use syncopate_core::types::{Entity, EntityTypeDefinition, FieldValue, IdGeneratorKind};

use crate::idgen;
use crate::wal::{Recovered, WalRecord, WalWriter};

/// In-memory engine state. Index maps key on the canonical
/// [`FieldValue::index_key`] string; id sets are plain hash sets because
/// range operators always take the residual scan path.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    /// type name -> id -> entity
    pub(crate) entities: HashMap<String, HashMap<String, Entity>>,
    /// type name -> field name -> value key -> ids
    pub(crate) indexes: HashMap<String, HashMap<String, HashMap<String, HashSet<String>>>>,
    /// type name -> field name -> value key -> owning id
    pub(crate) uniques: HashMap<String, HashMap<String, HashMap<String, String>>>,
    /// type name -> last allocated auto-increment id
    pub(crate) counters: HashMap<String, u64>,
}

impl StoreState {
    pub(crate) fn members(&self, entity_type: &str) -> Option<&HashMap<String, Entity>> {
        self.entities.get(entity_type)
    }

    /// Fails with `UniqueConstraint` if any unique field of `fields`
    /// holds a non-null value already owned by a different entity.
    fn check_unique(
        &self,
        def: &EntityTypeDefinition,
        fields: &BTreeMap<String, FieldValue>,
        exclude_id: Option<&str>,
    ) -> Result<(), DbError> {
        let per_type = self.uniques.get(&def.name);
        for fd in def.fields.iter().filter(|f| f.unique) {
            let Some(value) = fields.get(&fd.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let holder = per_type
                .and_then(|by_field| by_field.get(&fd.name))
                .and_then(|by_value| by_value.get(&value.index_key()));
            if let Some(holder) = holder {
                if Some(holder.as_str()) != exclude_id {
                    return Err(DbError::UniqueConstraint {
                        field: fd.name.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn index_entity(&mut self, def: &EntityTypeDefinition, entity: &Entity) {
        for fd in &def.fields {
            let Some(value) = entity.field(&fd.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let key = value.index_key();
            if fd.indexed {
                self.indexes
                    .entry(def.name.clone())
                    .or_default()
                    .entry(fd.name.clone())
                    .or_default()
                    .entry(key.clone())
                    .or_default()
                    .insert(entity.id.clone());
            }
            if fd.unique {
                self.uniques
                    .entry(def.name.clone())
                    .or_default()
                    .entry(fd.name.clone())
                    .or_default()
                    .insert(key, entity.id.clone());
            }
        }
    }

    fn unindex_entity(&mut self, def: &EntityTypeDefinition, entity: &Entity) {
        for fd in &def.fields {
            let Some(value) = entity.field(&fd.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let key = value.index_key();
            if fd.indexed {
                if let Some(by_value) = self
                    .indexes
                    .get_mut(&def.name)
                    .and_then(|by_field| by_field.get_mut(&fd.name))
                {
                    if let Some(ids) = by_value.get_mut(&key) {
                        ids.remove(&entity.id);
                        if ids.is_empty() {
                            by_value.remove(&key);
                        }
                    }
                }
            }
            if fd.unique {
                if let Some(by_value) = self
                    .uniques
                    .get_mut(&def.name)
                    .and_then(|by_field| by_field.get_mut(&fd.name))
                {
                    if by_value.get(&key).map(String::as_str) == Some(entity.id.as_str()) {
                        by_value.remove(&key);
                    }
                }
            }
        }
    }

    /// Validate-first half of a schema change: would the given fields
    /// hold unique values over the live data of this type?
    pub(crate) fn verify_unique_over_data(
        &self,
        entity_type: &str,
        fields: &[String],
    ) -> Result<(), DbError> {
        let Some(members) = self.entities.get(entity_type) else {
            return Ok(());
        };
        for field in fields {
            let mut seen: HashMap<String, String> = HashMap::new();
            for entity in members.values() {
                let Some(value) = entity.field(field) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                if seen.insert(value.index_key(), entity.id.clone()).is_some() {
                    return Err(DbError::UniqueConstraint {
                        field: field.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Commit half of a schema change: rebuild every index structure of
    /// the type from the new definition.
    pub(crate) fn rebuild_type_indexes(&mut self, def: &EntityTypeDefinition) {
        self.indexes.remove(&def.name);
        self.uniques.remove(&def.name);
        let Some(members) = self.entities.get(&def.name) else {
            return;
        };
        let entities: Vec<Entity> = members.values().cloned().collect();
        for entity in &entities {
            self.index_entity(def, entity);
        }
    }
}

/// Converts and validates an incoming JSON field map against the schema.
///
/// With `patch` set, only the supplied keys are validated (update path);
/// otherwise absent declared fields are null-filled or rejected.
fn convert_fields(
    def: &EntityTypeDefinition,
    incoming: &serde_json::Map<String, serde_json::Value>,
    patch: bool,
) -> Result<BTreeMap<String, FieldValue>, DbError> {
    let mut fields = BTreeMap::new();
    for (name, raw) in incoming {
        if name == "id" {
            return Err(DbError::MalformedData {
                field: "id".into(),
                reason: "the id may not appear inside fields".into(),
            });
        }
        if name.starts_with('_') {
            return Err(DbError::MalformedData {
                field: name.clone(),
                reason: "fields starting with '_' are managed by the store".into(),
            });
        }
        let value = match def.field(name) {
            Some(fd) => {
                let value = FieldValue::from_json(raw, fd.field_type).map_err(|reason| {
                    DbError::MalformedData {
                        field: name.clone(),
                        reason,
                    }
                })?;
                if value.is_null() && !fd.nullable {
                    return Err(DbError::MalformedData {
                        field: name.clone(),
                        reason: "null is not allowed for a non-nullable field".into(),
                    });
                }
                value
            }
            None => FieldValue::from_json_untyped(raw),
        };
        fields.insert(name.clone(), value);
    }

    if !patch {
        for fd in def.fields.iter().filter(|f| !f.internal) {
            if fields.contains_key(&fd.name) {
                continue;
            }
            if fd.nullable {
                fields.insert(fd.name.clone(), FieldValue::Null);
            } else {
                return Err(DbError::RequiredFieldMissing {
                    field: fd.name.clone(),
                });
            }
        }
    }

    Ok(fields)
}

/// The entity store. One reader/writer lock guards the primary mapping
/// and every index structure; the WAL writer is handed in per mutation so
/// the append happens while the write lock is held.
pub struct EntityStore {
    state: RwLock<StoreState>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Builds a store from replayed WAL state, rebuilding indexes and
    /// installing the recovered auto-increment counters.
    pub fn from_recovered(
        types: &HashMap<String, EntityTypeDefinition>,
        recovered: Recovered,
    ) -> Self {
        let mut state = StoreState {
            entities: recovered.entities,
            counters: recovered.counters,
            ..StoreState::default()
        };
        for def in types.values() {
            state.rebuild_type_indexes(def);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    pub(crate) fn state(&self) -> &RwLock<StoreState> {
        &self.state
    }

    /// Inserts a new entity, generating or validating its id.
    pub async fn insert(
        &self,
        def: &EntityTypeDefinition,
        supplied_id: Option<&str>,
        fields_json: &serde_json::Map<String, serde_json::Value>,
        wal: Option<&WalWriter>,
    ) -> Result<Entity, DbError> {
        let mut state = self.state.write().await;

        let supplied = supplied_id.filter(|s| !s.is_empty());
        let mut allocated_counter = None;
        let id = match supplied {
            Some(raw) => idgen::validate_supplied(def.id_generator, raw)?,
            None => match def.id_generator {
                IdGeneratorKind::AutoIncrement => {
                    let next = state.counters.get(&def.name).copied().unwrap_or(0) + 1;
                    allocated_counter = Some(next);
                    idgen::format_auto_increment(next)
                }
                IdGeneratorKind::Uuid => idgen::generate_uuid(),
                IdGeneratorKind::Cuid => idgen::generate_cuid(),
                IdGeneratorKind::Custom => {
                    return Err(DbError::RequiredFieldMissing { field: "id".into() })
                }
            },
        };

        if state
            .entities
            .get(&def.name)
            .is_some_and(|m| m.contains_key(&id))
        {
            return Err(DbError::UniqueConstraint {
                field: "id".into(),
                value: id,
            });
        }

        let fields = convert_fields(def, fields_json, false)?;
        state.check_unique(def, &fields, None)?;

        let mut entity = Entity::new(id, def.name.clone(), fields);
        entity.stamp_created(Utc::now());

        if let Some(wal) = wal {
            wal.append(&WalRecord::insert(&entity)?).await?;
        }

        if let Some(next) = allocated_counter {
            state.counters.insert(def.name.clone(), next);
        }
        state.index_entity(def, &entity);
        state
            .entities
            .entry(def.name.clone())
            .or_default()
            .insert(entity.id.clone(), entity.clone());
        debug!(entity_type = %def.name, id = %entity.id, "insert");
        Ok(entity)
    }

    /// Applies a patch: only the supplied keys change. Unique probes
    /// exclude the entity's own current value.
    pub async fn update(
        &self,
        def: &EntityTypeDefinition,
        raw_id: &str,
        patch_json: &serde_json::Map<String, serde_json::Value>,
        wal: Option<&WalWriter>,
    ) -> Result<Entity, DbError> {
        let id = idgen::normalize(def.id_generator, raw_id)?;
        let mut state = self.state.write().await;

        let existing = state
            .entities
            .get(&def.name)
            .and_then(|m| m.get(&id))
            .cloned()
            .ok_or_else(|| DbError::EntityNotFound {
                entity_type: def.name.clone(),
                id: id.clone(),
            })?;

        let patch = convert_fields(def, patch_json, true)?;
        let mut updated = existing.clone();
        for (name, value) in patch {
            updated.fields.insert(name, value);
        }
        updated.stamp_updated(Utc::now());

        state.check_unique(def, &updated.fields, Some(&id))?;

        if let Some(wal) = wal {
            wal.append(&WalRecord::update(&updated)?).await?;
        }

        state.unindex_entity(def, &existing);
        state.index_entity(def, &updated);
        state
            .entities
            .entry(def.name.clone())
            .or_default()
            .insert(id.clone(), updated.clone());
        debug!(entity_type = %def.name, id = %id, "update");
        Ok(updated)
    }

    /// Deletes an entity and every index entry that referenced it. The
    /// auto-increment counter is not rewound.
    pub async fn delete(
        &self,
        def: &EntityTypeDefinition,
        raw_id: &str,
        wal: Option<&WalWriter>,
    ) -> Result<(), DbError> {
        let id = idgen::normalize(def.id_generator, raw_id)?;
        let mut state = self.state.write().await;

        let existing = state
            .entities
            .get(&def.name)
            .and_then(|m| m.get(&id))
            .cloned()
            .ok_or_else(|| DbError::EntityNotFound {
                entity_type: def.name.clone(),
                id: id.clone(),
            })?;

        if let Some(wal) = wal {
            wal.append(&WalRecord::delete(&def.name, &id)).await?;
        }

        state.unindex_entity(def, &existing);
        if let Some(members) = state.entities.get_mut(&def.name) {
            members.remove(&id);
        }
        debug!(entity_type = %def.name, id = %id, "delete");
        Ok(())
    }

    /// Fetches one entity by type, normalizing the incoming id first.
    pub async fn get_by_type(
        &self,
        def: &EntityTypeDefinition,
        raw_id: &str,
    ) -> Result<Entity, DbError> {
        let id = idgen::normalize(def.id_generator, raw_id)?;
        let state = self.state.read().await;
        state
            .entities
            .get(&def.name)
            .and_then(|m| m.get(&id))
            .cloned()
            .ok_or(DbError::EntityNotFound {
                entity_type: def.name.clone(),
                id,
            })
    }

    /// Fetches an entity by canonical id across all types.
    pub async fn get(&self, id: &str) -> Option<Entity> {
        let state = self.state.read().await;
        state
            .entities
            .values()
            .find_map(|members| members.get(id))
            .cloned()
    }

    /// All live entities of a type, in no particular order.
    pub async fn list_by_type(&self, entity_type: &str) -> Vec<Entity> {
        let state = self.state.read().await;
        state
            .entities
            .get(entity_type)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Live entity count of a type (membership cardinality).
    pub async fn count_by_type(&self, entity_type: &str) -> usize {
        let state = self.state.read().await;
        state.entities.get(entity_type).map_or(0, HashMap::len)
    }

    /// Total live entities across all types.
    pub async fn total(&self) -> usize {
        let state = self.state.read().await;
        state.entities.values().map(HashMap::len).sum()
    }

    /// Visits every live entity under the read lock.
    pub async fn inspect_all<F: FnMut(&Entity)>(&self, mut visitor: F) {
        let state = self.state.read().await;
        for members in state.entities.values() {
            for entity in members.values() {
                visitor(entity);
            }
        }
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use syncopate_core::types::{FieldDefinition, FieldType};

    use super::*;

    fn user_def() -> EntityTypeDefinition {
        EntityTypeDefinition::new("user", IdGeneratorKind::AutoIncrement).with_fields(vec![
            FieldDefinition::new("email", FieldType::String).required().unique(),
            FieldDefinition::new("age", FieldType::Integer).indexed(),
            FieldDefinition::new("nickname", FieldType::String).nullable(),
        ])
    }

    fn fields(json: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        json.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_allocates_sequential_ids() {
        let store = EntityStore::new();
        let def = user_def();
        let a = store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 30})), None)
            .await
            .unwrap();
        let b = store
            .insert(&def, None, &fields(serde_json::json!({"email": "c@d", "age": 30})), None)
            .await
            .unwrap();
        assert_eq!(a.id, "1");
        assert_eq!(b.id, "2");
    }

    #[tokio::test]
    async fn insert_fills_nullable_and_stamps() {
        let store = EntityStore::new();
        let def = user_def();
        let e = store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 30})), None)
            .await
            .unwrap();
        assert_eq!(e.field("nickname"), Some(&FieldValue::Null));
        assert_eq!(e.created_at(), e.updated_at());
        assert!(e.created_at().is_some());
    }

    #[tokio::test]
    async fn insert_missing_required_fails() {
        let store = EntityStore::new();
        let def = user_def();
        let err = store
            .insert(&def, None, &fields(serde_json::json!({"age": 30})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::RequiredFieldMissing { field } if field == "email"));
    }

    #[tokio::test]
    async fn insert_rejects_id_inside_fields() {
        let store = EntityStore::new();
        let def = user_def();
        let err = store
            .insert(
                &def,
                None,
                &fields(serde_json::json!({"email": "a@b", "age": 1, "id": 9})),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::MalformedData { field, .. } if field == "id"));
    }

    #[tokio::test]
    async fn insert_rejects_underscore_fields() {
        let store = EntityStore::new();
        let def = user_def();
        let err = store
            .insert(
                &def,
                None,
                &fields(serde_json::json!({"email": "a@b", "age": 1, "_created_at": "x"})),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::MalformedData { .. }));
    }

    #[tokio::test]
    async fn unique_collision_rejected_and_first_insert_survives() {
        let store = EntityStore::new();
        let def = user_def();
        store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 30})), None)
            .await
            .unwrap();
        let err = store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 31})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueConstraint { field, .. } if field == "email"));
        // the failed insert must not have consumed an id
        let next = store
            .insert(&def, None, &fields(serde_json::json!({"email": "c@d", "age": 30})), None)
            .await
            .unwrap();
        assert_eq!(next.id, "2");
    }

    #[tokio::test]
    async fn update_is_a_patch_and_refreshes_timestamp() {
        let store = EntityStore::new();
        let def = user_def();
        let e = store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 30})), None)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let updated = store
            .update(&def, &e.id, &fields(serde_json::json!({"age": 31})), None)
            .await
            .unwrap();
        assert_eq!(updated.field("age"), Some(&FieldValue::Integer(31)));
        assert_eq!(
            updated.field("email"),
            Some(&FieldValue::String("a@b".into()))
        );
        assert_eq!(updated.created_at(), e.created_at());
        assert!(updated.updated_at() > updated.created_at());
    }

    #[tokio::test]
    async fn update_unique_excludes_self() {
        let store = EntityStore::new();
        let def = user_def();
        let e = store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 30})), None)
            .await
            .unwrap();
        store
            .insert(&def, None, &fields(serde_json::json!({"email": "c@d", "age": 30})), None)
            .await
            .unwrap();

        // re-asserting its own email is fine
        store
            .update(&def, &e.id, &fields(serde_json::json!({"email": "a@b"})), None)
            .await
            .unwrap();
        // taking the other entity's email is not
        let err = store
            .update(&def, &e.id, &fields(serde_json::json!({"email": "c@d"})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueConstraint { .. }));
    }

    #[tokio::test]
    async fn update_accepts_non_canonical_id() {
        let store = EntityStore::new();
        let def = user_def();
        store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 30})), None)
            .await
            .unwrap();
        let updated = store
            .update(&def, "0001", &fields(serde_json::json!({"age": 44})), None)
            .await
            .unwrap();
        assert_eq!(updated.id, "1");
    }

    #[tokio::test]
    async fn delete_purges_indexes_and_frees_unique_value() {
        let store = EntityStore::new();
        let def = user_def();
        let e = store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 30})), None)
            .await
            .unwrap();
        store.delete(&def, &e.id, None).await.unwrap();

        assert!(matches!(
            store.get_by_type(&def, &e.id).await,
            Err(DbError::EntityNotFound { .. })
        ));
        {
            let state = store.state().read().await;
            let indexed: usize = state
                .indexes
                .get("user")
                .map(|by_field| by_field.values().map(|m| m.len()).sum())
                .unwrap_or(0);
            assert_eq!(indexed, 0);
        }
        // the unique value is free again, and the counter did not rewind
        let again = store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 30})), None)
            .await
            .unwrap();
        assert_eq!(again.id, "2");
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = EntityStore::new();
        let def = user_def();
        assert!(matches!(
            store.delete(&def, "5", None).await,
            Err(DbError::EntityNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn uuid_ids_canonicalized_on_insert_and_lookup() {
        let store = EntityStore::new();
        let def = EntityTypeDefinition::new("post", IdGeneratorKind::Uuid)
            .with_fields(vec![FieldDefinition::new("title", FieldType::String)]);
        let e = store
            .insert(
                &def,
                Some("550E8400-E29B-41D4-A716-446655440000"),
                &fields(serde_json::json!({"title": "hi"})),
                None,
            )
            .await
            .unwrap();
        assert_eq!(e.id, "550e8400-e29b-41d4-a716-446655440000");
        let got = store
            .get_by_type(&def, "550E8400-E29B-41D4-A716-446655440000")
            .await
            .unwrap();
        assert_eq!(got.id, e.id);
    }

    #[tokio::test]
    async fn cuid_rejects_foreign_prefix() {
        let store = EntityStore::new();
        let def = EntityTypeDefinition::new("post", IdGeneratorKind::Cuid)
            .with_fields(vec![FieldDefinition::new("title", FieldType::String)]);
        let err = store
            .insert(&def, Some("xyz"), &fields(serde_json::json!({"title": "hi"})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidId { .. }));
    }

    #[tokio::test]
    async fn custom_requires_an_id() {
        let store = EntityStore::new();
        let def = EntityTypeDefinition::new("order", IdGeneratorKind::Custom)
            .with_fields(vec![FieldDefinition::new("total", FieldType::Float)]);
        let err = store
            .insert(&def, None, &fields(serde_json::json!({"total": 9.5})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::RequiredFieldMissing { field } if field == "id"));

        let ok = store
            .insert(&def, Some("ord-1"), &fields(serde_json::json!({"total": 9.5})), None)
            .await
            .unwrap();
        assert_eq!(ok.id, "ord-1");
    }

    #[tokio::test]
    async fn duplicate_explicit_id_conflicts() {
        let store = EntityStore::new();
        let def = EntityTypeDefinition::new("order", IdGeneratorKind::Custom)
            .with_fields(vec![FieldDefinition::new("total", FieldType::Float)]);
        store
            .insert(&def, Some("ord-1"), &fields(serde_json::json!({"total": 1.0})), None)
            .await
            .unwrap();
        let err = store
            .insert(&def, Some("ord-1"), &fields(serde_json::json!({"total": 2.0})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueConstraint { field, .. } if field == "id"));
    }

    #[tokio::test]
    async fn undeclared_fields_are_admitted_untyped() {
        let store = EntityStore::new();
        let def = user_def();
        let e = store
            .insert(
                &def,
                None,
                &fields(serde_json::json!({"email": "a@b", "age": 1, "extra": [1, 2]})),
                None,
            )
            .await
            .unwrap();
        assert!(matches!(e.field("extra"), Some(FieldValue::Json(_))));
    }

    #[tokio::test]
    async fn explicit_null_for_non_nullable_rejected() {
        let store = EntityStore::new();
        let def = user_def();
        let err = store
            .insert(
                &def,
                None,
                &fields(serde_json::json!({"email": null, "age": 1})),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::MalformedData { field, .. } if field == "email"));
    }

    #[tokio::test]
    async fn verify_unique_over_data_detects_collision() {
        let store = EntityStore::new();
        let def = user_def();
        store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 30})), None)
            .await
            .unwrap();
        store
            .insert(&def, None, &fields(serde_json::json!({"email": "c@d", "age": 30})), None)
            .await
            .unwrap();

        let state = store.state().read().await;
        let err = state
            .verify_unique_over_data("user", &["age".to_string()])
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueConstraint { field, .. } if field == "age"));
        state
            .verify_unique_over_data("user", &["email".to_string()])
            .unwrap();
    }

    #[tokio::test]
    async fn get_across_types() {
        let store = EntityStore::new();
        let def = user_def();
        let e = store
            .insert(&def, None, &fields(serde_json::json!({"email": "a@b", "age": 30})), None)
            .await
            .unwrap();
        assert_eq!(store.get(&e.id).await.map(|f| f.id), Some(e.id));
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn inspect_all_visits_everything() {
        let store = EntityStore::new();
        let def = user_def();
        for email in ["a@b", "c@d", "e@f"] {
            store
                .insert(&def, None, &fields(serde_json::json!({"email": email, "age": 1})), None)
                .await
                .unwrap();
        }
        let mut seen = 0;
        store.inspect_all(|_| seen += 1).await;
        assert_eq!(seen, 3);
        assert_eq!(store.count_by_type("user").await, 3);
        assert_eq!(store.total().await, 3);
    }
}
