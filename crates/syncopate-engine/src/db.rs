//! The engine facade. Coordinates the schema registry, the entity
//! store, and the write-ahead log so that every mutation appends to the
//! log before it applies, and so that query paths resolve all schema
//! snapshots before taking the store lock (registry and store locks are
//! only ever acquired registry-first on write paths, which keeps the
//! two-lock discipline cycle-free).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use syncopate_core::error::DbError;
use syncopate_core::query::{QueryOptions, QueryResult};
use syncopate_core::types::{Entity, EntityTypeDefinition, EntityTypeUpdate};

use crate::executor;
use crate::join;
use crate::registry::{SchemaChange, SchemaRegistry};
use crate::represent::{self, RenderOptions};
use crate::store::EntityStore;
use crate::wal::{self, WalRecord, WalWriter};

/// Durability settings. With no WAL path the engine is purely in-memory.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub wal_path: Option<PathBuf>,
    pub compress_wal: bool,
}

/// A complete SyncopateDB engine instance.
pub struct Database {
    registry: SchemaRegistry,
    store: EntityStore,
    wal: Option<Arc<WalWriter>>,
}

impl Database {
    /// A purely in-memory instance (no durability).
    pub fn in_memory() -> Self {
        Self {
            registry: SchemaRegistry::new(),
            store: EntityStore::new(),
            wal: None,
        }
    }

    /// Opens an instance per the config, replaying the WAL from the
    /// beginning when one is configured.
    pub fn open(config: DatabaseConfig) -> Result<Self, DbError> {
        let Some(path) = config.wal_path else {
            return Ok(Self::in_memory());
        };
        let recovered = wal::replay(&path)?;
        let types = recovered.types.clone();
        let store = EntityStore::from_recovered(&types, recovered);
        let registry = SchemaRegistry::with_types(types);
        let writer = WalWriter::open(&path, config.compress_wal)?;
        info!(wal = %path.display(), compress = config.compress_wal, "database opened");
        Ok(Self {
            registry,
            store,
            wal: Some(Arc::new(writer)),
        })
    }

    fn wal(&self) -> Option<&WalWriter> {
        self.wal.as_deref()
    }

    pub fn wal_enabled(&self) -> bool {
        self.wal.is_some()
    }

    pub fn wal_compression_enabled(&self) -> bool {
        self.wal().is_some_and(WalWriter::compression_enabled)
    }

    /// original / compressed across appends so far; 1.0 means none.
    pub fn wal_compression_ratio(&self) -> f64 {
        self.wal().map_or(1.0, WalWriter::compression_ratio)
    }

    // -- schema operations --------------------------------------------------

    /// Registers a new entity type. The id generator is immutable from
    /// here on.
    pub async fn register_entity_type(
        &self,
        def: EntityTypeDefinition,
    ) -> Result<EntityTypeDefinition, DbError> {
        def.validate()?;
        let mut types = self.registry.inner.write().await;
        if types.contains_key(&def.name) {
            return Err(DbError::EntityTypeExists {
                name: def.name.clone(),
            });
        }
        if let Some(wal) = self.wal() {
            wal.append(&WalRecord::register_type(&def)?).await?;
        }
        types.insert(def.name.clone(), def.clone());
        info!(entity_type = %def.name, generator = %def.id_generator, "entity type registered");
        Ok(def)
    }

    /// Updates an entity type: fields may be added, removed, or have
    /// flags toggled; name and id generator are immutable. Newly unique
    /// fields are verified against live data before anything commits.
    pub async fn update_entity_type(
        &self,
        update: EntityTypeUpdate,
    ) -> Result<SchemaChange, DbError> {
        let mut types = self.registry.inner.write().await;
        let stored = types
            .get(&update.name)
            .ok_or_else(|| DbError::EntityTypeNotFound {
                name: update.name.clone(),
            })?;

        if let Some(requested) = update.id_generator {
            if requested != stored.id_generator {
                return Err(DbError::IdGeneratorChange {
                    name: stored.name.clone(),
                });
            }
        }

        let new_def = EntityTypeDefinition {
            name: stored.name.clone(),
            id_generator: stored.id_generator,
            fields: update.fields,
        };
        new_def.validate()?;

        let old_unique: HashSet<String> =
            stored.unique_fields().iter().map(|s| s.to_string()).collect();
        let new_unique: HashSet<String> =
            new_def.unique_fields().iter().map(|s| s.to_string()).collect();
        let mut added_unique: Vec<String> =
            new_unique.difference(&old_unique).cloned().collect();
        let mut removed_unique: Vec<String> =
            old_unique.difference(&new_unique).cloned().collect();
        added_unique.sort();
        removed_unique.sort();

        // validate first, commit second: the store write lock is held
        // across the uniqueness scan, the WAL append, and the index
        // rebuild so no insert can slip a collision in between
        let mut state = self.store.state().write().await;
        state.verify_unique_over_data(&new_def.name, &added_unique)?;
        if let Some(wal) = self.wal() {
            wal.append(&WalRecord::update_type(&new_def)?).await?;
        }
        state.rebuild_type_indexes(&new_def);
        drop(state);

        types.insert(new_def.name.clone(), new_def.clone());
        info!(entity_type = %new_def.name, "entity type updated");
        Ok(SchemaChange {
            definition: new_def,
            added_unique,
            removed_unique,
        })
    }

    pub async fn entity_type(&self, name: &str) -> Result<EntityTypeDefinition, DbError> {
        self.registry.get(name).await
    }

    pub async fn entity_type_names(&self) -> Vec<String> {
        self.registry.names().await
    }

    pub async fn entity_type_definitions(&self) -> Vec<EntityTypeDefinition> {
        self.registry.definitions().await
    }

    // -- entity operations --------------------------------------------------

    pub async fn insert(
        &self,
        entity_type: &str,
        id: Option<&str>,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Entity, DbError> {
        let def = self.registry.get(entity_type).await?;
        self.store.insert(&def, id, fields, self.wal()).await
    }

    pub async fn update(
        &self,
        entity_type: &str,
        id: &str,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Entity, DbError> {
        let def = self.registry.get(entity_type).await?;
        self.store.update(&def, id, patch, self.wal()).await
    }

    pub async fn delete(&self, entity_type: &str, id: &str) -> Result<(), DbError> {
        let def = self.registry.get(entity_type).await?;
        self.store.delete(&def, id, self.wal()).await
    }

    pub async fn get(&self, entity_type: &str, id: &str) -> Result<Entity, DbError> {
        let def = self.registry.get(entity_type).await?;
        self.store.get_by_type(&def, id).await
    }

    /// Live entity count of one type.
    pub async fn count(&self, entity_type: &str) -> Result<usize, DbError> {
        // existence check keeps an unknown type a 404, not a zero
        self.registry.get(entity_type).await?;
        Ok(self.store.count_by_type(entity_type).await)
    }

    pub async fn total_entities(&self) -> usize {
        self.store.total().await
    }

    /// Per-type live entity counts, for the operational surfaces.
    pub async fn entity_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        self.store
            .inspect_all(|entity| {
                *counts.entry(entity.entity_type.clone()).or_insert(0) += 1;
            })
            .await;
        counts
    }

    // -- queries ------------------------------------------------------------

    /// Runs a query (optionally with joins) and renders the wire rows.
    /// The whole of planning, scanning, joining, and rendering happens
    /// under one read snapshot of the store.
    pub async fn query(
        &self,
        opts: &QueryOptions,
        include_internal: bool,
    ) -> Result<QueryResult, DbError> {
        let base_def = self.registry.get(&opts.entity_type).await?;

        // resolve every join's schema before taking the store lock
        let mut join_defs: HashMap<String, EntityTypeDefinition> = HashMap::new();
        for j in &opts.joins {
            join::validate_join(j)?;
            let def = self.registry.get(&j.entity_type).await.map_err(|_| {
                DbError::InvalidJoin {
                    reason: format!("unknown entity type '{}' in join", j.entity_type),
                }
            })?;
            join_defs.insert(j.entity_type.clone(), def);
        }

        let render = RenderOptions {
            include_internal,
            join_aliases: opts.joins.iter().map(|j| j.as_alias.clone()).collect(),
        };

        let state = self.store.state().read().await;
        let executed = executor::execute(&state, &base_def, opts)?;
        let data: Vec<serde_json::Value> = if opts.joins.is_empty() {
            executed
                .entities
                .iter()
                .map(|e| serde_json::Value::Object(represent::project(e, &base_def, &render)))
                .collect()
        } else {
            join::apply_joins(
                &state,
                &join_defs,
                &base_def,
                &executed.entities,
                &opts.joins,
                &render,
            )?
        };
        drop(state);

        let count = data.len();
        Ok(QueryResult {
            data,
            total: executed.total,
            count,
            limit: executed.limit,
            offset: executed.offset,
            has_more: executed.offset as usize + count < executed.total,
        })
    }

    /// Count-only query path.
    pub async fn query_count(&self, opts: &QueryOptions) -> Result<usize, DbError> {
        let def = self.registry.get(&opts.entity_type).await?;
        let state = self.store.state().read().await;
        executor::execute_count(&state, &def, opts)
    }
}
