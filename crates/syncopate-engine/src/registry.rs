//! The schema registry: reader/writer-locked map of entity type
//! definitions. Reads are concurrent; register and update serialize.

use std::collections::HashMap;

use tokio::sync::RwLock;

use syncopate_core::error::DbError;
use syncopate_core::types::EntityTypeDefinition;

/// Outcome of a schema update: the committed definition plus the unique
/// fields the change added and removed.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaChange {
    pub definition: EntityTypeDefinition,
    pub added_unique: Vec<String>,
    pub removed_unique: Vec<String>,
}

/// Thread-safe registry of entity type definitions.
pub struct SchemaRegistry {
    pub(crate) inner: RwLock<HashMap<String, EntityTypeDefinition>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Builds a registry from WAL-recovered definitions.
    pub fn with_types(types: HashMap<String, EntityTypeDefinition>) -> Self {
        Self {
            inner: RwLock::new(types),
        }
    }

    /// Looks up a definition, cloning a consistent snapshot.
    pub async fn get(&self, name: &str) -> Result<EntityTypeDefinition, DbError> {
        let guard = self.inner.read().await;
        guard
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::EntityTypeNotFound {
                name: name.to_string(),
            })
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.inner.read().await.contains_key(name)
    }

    /// Sorted list of registered type names.
    pub async fn names(&self) -> Vec<String> {
        let guard = self.inner.read().await;
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        names
    }

    /// All definitions, sorted by name.
    pub async fn definitions(&self) -> Vec<EntityTypeDefinition> {
        let guard = self.inner.read().await;
        let mut defs: Vec<EntityTypeDefinition> = guard.values().cloned().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
