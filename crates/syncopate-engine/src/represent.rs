//! Projects stored entities to the external wire shape: underscore
//! filtering (with debug and join-alias exemptions), null-filling of
//! absent schema fields, and id coercion to the generator's declared
//! external type.

use syncopate_core::types::{Entity, EntityTypeDefinition, IdGeneratorKind};

/// Options for one projection pass. Join aliases are a property of the
/// active query, not a global toggle, so they travel with the call.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Include store-managed underscore fields verbatim (debug mode).
    pub include_internal: bool,
    /// Field names exempt from underscore filtering because a join of
    /// the current query attaches under them.
    pub join_aliases: Vec<String>,
}

impl RenderOptions {
    pub fn new(include_internal: bool) -> Self {
        Self {
            include_internal,
            join_aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.join_aliases = aliases;
        self
    }
}

/// The id as JSON, typed by the generator: integer for auto-increment,
/// string otherwise.
pub fn id_to_json(id: &str, kind: IdGeneratorKind) -> serde_json::Value {
    match kind {
        IdGeneratorKind::AutoIncrement => match id.parse::<u64>() {
            Ok(n) => serde_json::json!(n),
            Err(_) => serde_json::Value::String(id.to_string()),
        },
        _ => serde_json::Value::String(id.to_string()),
    }
}

/// Projects an entity to its wire object. The stored entity is never
/// modified; callers attach join payloads to the returned copy.
pub fn project(
    entity: &Entity,
    def: &EntityTypeDefinition,
    opts: &RenderOptions,
) -> serde_json::Map<String, serde_json::Value> {
    let mut out = serde_json::Map::new();
    out.insert("id".to_string(), id_to_json(&entity.id, def.id_generator));

    for (name, value) in &entity.fields {
        // the id lives only at the top level
        if name == "id" {
            continue;
        }
        if name.starts_with('_')
            && !opts.include_internal
            && !opts.join_aliases.iter().any(|a| a == name)
        {
            continue;
        }
        out.insert(name.clone(), value.to_json());
    }

    for fd in &def.fields {
        if fd.internal || fd.name.starts_with('_') || fd.name == "id" {
            continue;
        }
        out.entry(fd.name.clone())
            .or_insert(serde_json::Value::Null);
    }

    out
}
