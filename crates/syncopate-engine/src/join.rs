//! Join execution. Joins attach foreign payloads to copies of the base
//! rows; stored entities are never touched, and joins never change the
//! base query's pagination or totals.

use std::collections::{HashMap, HashSet};

use syncopate_core::error::DbError;
use syncopate_core::query::{Join, JoinKind};
use syncopate_core::types::{Entity, EntityTypeDefinition, FieldValue};

use crate::executor::{self, ParsedFilter};
use crate::represent::{self, RenderOptions};
use crate::store::StoreState;

/// Basic shape checks, run before any store access so a bad join fails
/// the whole request up front.
pub(crate) fn validate_join(join: &Join) -> Result<(), DbError> {
    if join.as_alias.is_empty() {
        return Err(DbError::InvalidJoin {
            reason: "join alias ('as') must not be empty".into(),
        });
    }
    if join.local_field.is_empty() || join.foreign_field.is_empty() {
        return Err(DbError::InvalidJoin {
            reason: format!(
                "join '{}' needs both localField and foreignField",
                join.as_alias
            ),
        });
    }
    Ok(())
}

/// Applies every join to every base row, returning the wire objects.
pub(crate) fn apply_joins(
    state: &StoreState,
    defs: &HashMap<String, EntityTypeDefinition>,
    base_def: &EntityTypeDefinition,
    base: &[Entity],
    joins: &[Join],
    render: &RenderOptions,
) -> Result<Vec<serde_json::Value>, DbError> {
    // parse join filters once, against the foreign schema
    let mut parsed_filters: Vec<(&Join, &EntityTypeDefinition, Vec<ParsedFilter>)> =
        Vec::with_capacity(joins.len());
    for join in joins {
        validate_join(join)?;
        let foreign_def = defs
            .get(&join.entity_type)
            .ok_or_else(|| DbError::InvalidJoin {
                reason: format!("unknown entity type '{}' in join", join.entity_type),
            })?;
        let filters = executor::parse_filters(foreign_def, &join.filters)
            .map_err(|e| DbError::InvalidJoin {
                reason: e.to_string(),
            })?;
        parsed_filters.push((join, foreign_def, filters));
    }

    let foreign_render = RenderOptions::new(render.include_internal);
    let mut rows = Vec::with_capacity(base.len());
    for entity in base {
        let mut row = represent::project(entity, base_def, render);
        for (join, foreign_def, filters) in &parsed_filters {
            let payload = join_payload(
                state,
                join,
                foreign_def,
                filters,
                entity,
                &foreign_render,
            );
            row.insert(join.as_alias.clone(), payload);
        }
        rows.push(serde_json::Value::Object(row));
    }
    Ok(rows)
}

fn join_payload(
    state: &StoreState,
    join: &Join,
    foreign_def: &EntityTypeDefinition,
    filters: &[ParsedFilter],
    base: &Entity,
    foreign_render: &RenderOptions,
) -> serde_json::Value {
    let locals = local_values(base, join);
    let mut matches = foreign_matches(state, join, foreign_def, &locals);
    matches.retain(|e| filters.iter().all(|f| executor::eval_filter(e, f)));
    matches.sort_by(|a, b| executor::compare_ids(&a.id, &b.id));

    let projected: Vec<serde_json::Value> = matches
        .iter()
        .map(|e| {
            let mut obj = represent::project(e, foreign_def, foreign_render);
            if !join.select_fields.is_empty() {
                obj.retain(|k, _| join.select_fields.iter().any(|s| s == k));
            }
            serde_json::Value::Object(obj)
        })
        .collect();

    if join.kind.is_many() {
        serde_json::Value::Array(projected)
    } else {
        projected
            .into_iter()
            .next()
            .unwrap_or(serde_json::Value::Null)
    }
}

/// The base-side join key(s). A many_to_many local field holding a JSON
/// array contributes every element.
fn local_values(base: &Entity, join: &Join) -> Vec<FieldValue> {
    if join.local_field == "id" {
        return vec![FieldValue::String(base.id.clone())];
    }
    match base.field(&join.local_field) {
        None | Some(FieldValue::Null) => Vec::new(),
        Some(FieldValue::Json(serde_json::Value::Array(items)))
            if join.kind == JoinKind::ManyToMany =>
        {
            items.iter().map(FieldValue::from_json_untyped).collect()
        }
        Some(v) => vec![v.clone()],
    }
}

fn foreign_matches<'a>(
    state: &'a StoreState,
    join: &Join,
    foreign_def: &EntityTypeDefinition,
    locals: &[FieldValue],
) -> Vec<&'a Entity> {
    let Some(members) = state.members(&foreign_def.name) else {
        return Vec::new();
    };
    if locals.is_empty() {
        return Vec::new();
    }

    if join.foreign_field == "id" {
        let mut out = Vec::new();
        for local in locals {
            if let Some(found) = members.get(&join_key_string(local)) {
                out.push(found);
            }
        }
        return out;
    }

    // coerce the base-side keys to the declared foreign type, so an
    // auto-increment id ("1") can probe an integer author_id
    let declared = foreign_def.field(&join.foreign_field);
    let locals: Vec<FieldValue> = match declared {
        Some(fd) => locals
            .iter()
            .map(|l| coerce_local(l, fd.field_type))
            .collect(),
        None => locals.to_vec(),
    };

    // index fast path for declared indexed/unique foreign fields
    if let Some(fd) = declared.filter(|fd| fd.indexed || fd.unique) {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for local in &locals {
            let key = local.index_key();
            if fd.unique {
                if let Some(id) = state
                    .uniques
                    .get(&foreign_def.name)
                    .and_then(|by_field| by_field.get(&join.foreign_field))
                    .and_then(|by_value| by_value.get(&key))
                {
                    if seen.insert(id.clone()) {
                        if let Some(e) = members.get(id) {
                            out.push(e);
                        }
                    }
                }
            } else if let Some(ids) = state
                .indexes
                .get(&foreign_def.name)
                .and_then(|by_field| by_field.get(&join.foreign_field))
                .and_then(|by_value| by_value.get(&key))
            {
                for id in ids {
                    if seen.insert(id.clone()) {
                        if let Some(e) = members.get(id) {
                            out.push(e);
                        }
                    }
                }
            }
        }
        return out;
    }

    members
        .values()
        .filter(|e| {
            e.field(&join.foreign_field)
                .map(|v| locals.iter().any(|l| v.loose_eq(l)))
                .unwrap_or(false)
        })
        .collect()
}

/// Best-effort conversion of a base-side key to the foreign field's
/// declared type. Unconvertible values pass through and simply miss.
fn coerce_local(value: &FieldValue, target: syncopate_core::types::FieldType) -> FieldValue {
    use syncopate_core::types::FieldType;
    match (value, target) {
        (FieldValue::String(s), FieldType::Integer) => match s.parse::<i64>() {
            Ok(i) => FieldValue::Integer(i),
            Err(_) => value.clone(),
        },
        (FieldValue::String(s), FieldType::Float) => match s.parse::<f64>() {
            Ok(f) => FieldValue::Float(f),
            Err(_) => value.clone(),
        },
        (FieldValue::Integer(i), FieldType::String) => FieldValue::String(i.to_string()),
        _ => value.clone(),
    }
}

/// String form of a local value probing a foreign id.
fn join_key_string(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) => s.clone(),
        FieldValue::Integer(i) => i.to_string(),
        other => other.to_string(),
    }
}
