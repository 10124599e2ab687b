//! Query planning and execution. Filters are partitioned into an
//! index-assisted candidate lookup (eq/in on indexed or unique fields)
//! and a residual linear scan; ordering and pagination run over the
//! surviving snapshot.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use syncopate_core::error::DbError;
use syncopate_core::query::{Filter, FilterOp, QueryOptions};
use syncopate_core::types::{
    Entity, EntityTypeDefinition, FieldValue, CREATED_AT_FIELD, UPDATED_AT_FIELD,
};

use crate::idgen;
use crate::store::StoreState;

const DEFAULT_LIMIT: i64 = 100;

/// A filter with its operator parsed and its value coerced to the
/// declared field type.
pub(crate) struct ParsedFilter {
    pub(crate) field: String,
    pub(crate) op: FilterOp,
    pub(crate) value: ParsedValue,
}

pub(crate) enum ParsedValue {
    None,
    Single(FieldValue),
    Many(Vec<FieldValue>),
}

/// The raw result of a query before representation: the page of
/// entities plus pre-pagination totals.
pub(crate) struct ExecutedQuery {
    pub(crate) entities: Vec<Entity>,
    pub(crate) total: usize,
    pub(crate) limit: i64,
    pub(crate) offset: i64,
}

/// Validates and coerces the wire filters against the schema. Unknown
/// fields and operators surface as `InvalidQuery`.
pub(crate) fn parse_filters(
    def: &EntityTypeDefinition,
    filters: &[Filter],
) -> Result<Vec<ParsedFilter>, DbError> {
    filters.iter().map(|f| parse_filter(def, f)).collect()
}

fn parse_filter(def: &EntityTypeDefinition, filter: &Filter) -> Result<ParsedFilter, DbError> {
    let op = FilterOp::parse(&filter.op)?;
    check_known_field(def, &filter.field)?;

    let value = match op {
        FilterOp::Exists => ParsedValue::None,
        FilterOp::In => {
            let items = filter
                .value
                .as_array()
                .ok_or_else(|| DbError::InvalidQuery {
                    reason: format!("'in' filter on '{}' requires an array value", filter.field),
                })?;
            let values = items
                .iter()
                .map(|item| coerce_filter_value(def, &filter.field, item))
                .collect::<Result<Vec<_>, _>>()?;
            ParsedValue::Many(values)
        }
        FilterOp::Contains | FilterOp::StartsWith | FilterOp::EndsWith => {
            let s = filter
                .value
                .as_str()
                .ok_or_else(|| DbError::InvalidQuery {
                    reason: format!(
                        "'{op}' filter on '{}' requires a string value",
                        filter.field
                    ),
                })?;
            ParsedValue::Single(FieldValue::String(s.to_string()))
        }
        _ => ParsedValue::Single(coerce_filter_value(def, &filter.field, &filter.value)?),
    };

    Ok(ParsedFilter {
        field: filter.field.clone(),
        op,
        value,
    })
}

fn check_known_field(def: &EntityTypeDefinition, field: &str) -> Result<(), DbError> {
    if field == "id"
        || field == CREATED_AT_FIELD
        || field == UPDATED_AT_FIELD
        || def.field(field).is_some()
    {
        Ok(())
    } else {
        Err(DbError::InvalidQuery {
            reason: format!("unknown field '{}' on type '{}'", field, def.name),
        })
    }
}

fn coerce_filter_value(
    def: &EntityTypeDefinition,
    field: &str,
    raw: &serde_json::Value,
) -> Result<FieldValue, DbError> {
    if field == "id" {
        return coerce_id_value(def, raw);
    }
    if field == CREATED_AT_FIELD || field == UPDATED_AT_FIELD {
        return FieldValue::from_json(raw, syncopate_core::types::FieldType::DateTime).map_err(
            |reason| DbError::InvalidQuery {
                reason: format!("bad value for '{field}': {reason}"),
            },
        );
    }
    match def.field(field) {
        Some(fd) => {
            FieldValue::from_json(raw, fd.field_type).map_err(|reason| DbError::InvalidQuery {
                reason: format!("bad value for '{field}': {reason}"),
            })
        }
        None => unreachable!("field existence checked before coercion"),
    }
}

/// Id filter values are canonicalized so `"0012"`, `12`, and uppercase
/// uuids all probe the same stored key.
fn coerce_id_value(
    def: &EntityTypeDefinition,
    raw: &serde_json::Value,
) -> Result<FieldValue, DbError> {
    let text = match raw {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => {
            return Err(DbError::InvalidQuery {
                reason: format!("bad id value {other}"),
            })
        }
    };
    let canonical = idgen::normalize(def.id_generator, &text).map_err(|e| {
        DbError::InvalidQuery {
            reason: format!("bad id value: {e}"),
        }
    })?;
    Ok(FieldValue::String(canonical))
}

/// Evaluates one parsed filter against an entity. Missing fields behave
/// as Null; `exists` means present and non-null.
pub(crate) fn eval_filter(entity: &Entity, filter: &ParsedFilter) -> bool {
    let (present, actual) = if filter.field == "id" {
        (true, FieldValue::String(entity.id.clone()))
    } else {
        match entity.field(&filter.field) {
            Some(v) => (true, v.clone()),
            None => (false, FieldValue::Null),
        }
    };

    match (filter.op, &filter.value) {
        (FilterOp::Exists, _) => present && !actual.is_null(),
        (FilterOp::Eq, ParsedValue::Single(v)) => actual.loose_eq(v),
        (FilterOp::Ne, ParsedValue::Single(v)) => !actual.loose_eq(v),
        (FilterOp::Gt, ParsedValue::Single(v)) => {
            matches!(actual.compare(v), Some(Ordering::Greater))
        }
        (FilterOp::Gte, ParsedValue::Single(v)) => matches!(
            actual.compare(v),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        (FilterOp::Lt, ParsedValue::Single(v)) => {
            matches!(actual.compare(v), Some(Ordering::Less))
        }
        (FilterOp::Lte, ParsedValue::Single(v)) => {
            matches!(actual.compare(v), Some(Ordering::Less | Ordering::Equal))
        }
        (FilterOp::In, ParsedValue::Many(values)) => values.iter().any(|v| actual.loose_eq(v)),
        (FilterOp::Contains, ParsedValue::Single(v)) => match (actual.as_str(), v.as_str()) {
            (Some(a), Some(b)) => a.contains(b),
            _ => false,
        },
        (FilterOp::StartsWith, ParsedValue::Single(v)) => match (actual.as_str(), v.as_str()) {
            (Some(a), Some(b)) => a.starts_with(b),
            _ => false,
        },
        (FilterOp::EndsWith, ParsedValue::Single(v)) => match (actual.as_str(), v.as_str()) {
            (Some(a), Some(b)) => a.ends_with(b),
            _ => false,
        },
        _ => false,
    }
}

/// Canonical id order: numeric when both sides are decimal
/// (auto-increment), lexicographic otherwise.
pub(crate) fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn is_indexable(def: &EntityTypeDefinition, filter: &ParsedFilter) -> bool {
    if !matches!(filter.op, FilterOp::Eq | FilterOp::In) {
        return false;
    }
    let Some(fd) = def.field(&filter.field) else {
        return false;
    };
    if !fd.indexed && !fd.unique {
        return false;
    }
    // a null probe must fall through to the scan: nulls are not indexed
    match &filter.value {
        ParsedValue::Single(v) => !v.is_null(),
        ParsedValue::Many(vs) => !vs.is_empty() && vs.iter().all(|v| !v.is_null()),
        ParsedValue::None => false,
    }
}

fn index_lookup(
    state: &StoreState,
    def: &EntityTypeDefinition,
    filter: &ParsedFilter,
) -> HashSet<String> {
    let Some(fd) = def.field(&filter.field) else {
        return HashSet::new();
    };
    let values: Vec<&FieldValue> = match &filter.value {
        ParsedValue::Single(v) => vec![v],
        ParsedValue::Many(vs) => vs.iter().collect(),
        ParsedValue::None => Vec::new(),
    };

    let mut ids = HashSet::new();
    for value in values {
        let key = value.index_key();
        if fd.unique {
            if let Some(id) = state
                .uniques
                .get(&def.name)
                .and_then(|by_field| by_field.get(&filter.field))
                .and_then(|by_value| by_value.get(&key))
            {
                ids.insert(id.clone());
            }
        } else if let Some(set) = state
            .indexes
            .get(&def.name)
            .and_then(|by_field| by_field.get(&filter.field))
            .and_then(|by_value| by_value.get(&key))
        {
            ids.extend(set.iter().cloned());
        }
    }
    ids
}

fn candidate_ids(
    state: &StoreState,
    def: &EntityTypeDefinition,
    indexable: &[&ParsedFilter],
) -> Option<HashSet<String>> {
    if indexable.is_empty() {
        return None;
    }
    let mut sets: Vec<HashSet<String>> = indexable
        .iter()
        .map(|f| index_lookup(state, def, f))
        .collect();
    // intersect starting from the smallest set to minimize work
    sets.sort_by_key(HashSet::len);
    let mut iter = sets.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, set| {
        acc.into_iter().filter(|id| set.contains(id)).collect()
    }))
}

fn matching_entities<'a>(
    state: &'a StoreState,
    def: &EntityTypeDefinition,
    parsed: &[ParsedFilter],
) -> Vec<&'a Entity> {
    let Some(members) = state.members(&def.name) else {
        return Vec::new();
    };

    let (indexable, residual): (Vec<&ParsedFilter>, Vec<&ParsedFilter>) =
        parsed.iter().partition(|f| is_indexable(def, f));

    let candidates: Vec<&Entity> = match candidate_ids(state, def, &indexable) {
        Some(ids) => ids.iter().filter_map(|id| members.get(id)).collect(),
        None => members.values().collect(),
    };

    candidates
        .into_iter()
        .filter(|e| residual.iter().all(|f| eval_filter(e, f)))
        .collect()
}

fn check_order_by(def: &EntityTypeDefinition, order_by: &str) -> Result<(), DbError> {
    if order_by.is_empty() {
        return Ok(());
    }
    check_known_field(def, order_by)
}

fn sort_entities(entities: &mut [&Entity], order_by: &str, desc: bool) {
    if order_by.is_empty() || order_by == "id" {
        entities.sort_by(|a, b| compare_ids(&a.id, &b.id));
        if !order_by.is_empty() && desc {
            entities.reverse();
        }
        return;
    }
    entities.sort_by(|a, b| {
        let va = a.field(order_by).filter(|v| !v.is_null());
        let vb = b.field(order_by).filter(|v| !v.is_null());
        let primary = match (va, vb) {
            (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
            // missing or null values sort after present ones
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        primary.then_with(|| compare_ids(&a.id, &b.id))
    });
    if desc {
        entities.reverse();
    }
}

/// Runs the full query pipeline over a read snapshot: plan, scan, order,
/// paginate.
pub(crate) fn execute(
    state: &StoreState,
    def: &EntityTypeDefinition,
    opts: &QueryOptions,
) -> Result<ExecutedQuery, DbError> {
    let parsed = parse_filters(def, &opts.filters)?;
    check_order_by(def, &opts.order_by)?;

    let mut matches = matching_entities(state, def, &parsed);
    let total = matches.len();
    sort_entities(&mut matches, &opts.order_by, opts.order_desc);

    let limit = if opts.limit <= 0 {
        DEFAULT_LIMIT
    } else {
        opts.limit
    };
    let offset = opts.offset.max(0);

    let page: Vec<Entity> = matches
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect();

    Ok(ExecutedQuery {
        entities: page,
        total,
        limit,
        offset,
    })
}

/// Count-only path: no sort, no pagination. With no filters this is the
/// membership-set cardinality.
pub(crate) fn execute_count(
    state: &StoreState,
    def: &EntityTypeDefinition,
    opts: &QueryOptions,
) -> Result<usize, DbError> {
    if opts.filters.is_empty() {
        return Ok(state.members(&def.name).map_or(0, HashMap::len));
    }
    let parsed = parse_filters(def, &opts.filters)?;
    Ok(matching_entities(state, def, &parsed).len())
}

#[cfg(test)]
mod tests {
    use syncopate_core::query::Filter;
    use syncopate_core::types::{FieldDefinition, FieldType, IdGeneratorKind};

    use crate::store::EntityStore;

    use super::*;

    fn user_def() -> EntityTypeDefinition {
        EntityTypeDefinition::new("user", IdGeneratorKind::AutoIncrement).with_fields(vec![
            FieldDefinition::new("email", FieldType::String).required().unique(),
            FieldDefinition::new("age", FieldType::Integer).indexed(),
            FieldDefinition::new("name", FieldType::String),
            FieldDefinition::new("score", FieldType::Float).nullable(),
        ])
    }

    async fn seeded_store() -> (EntityStore, EntityTypeDefinition) {
        let store = EntityStore::new();
        let def = user_def();
        let rows = [
            ("a@b", 30, "Ann", Some(1.5)),
            ("c@d", 30, "Bob", Some(9.0)),
            ("e@f", 41, "Cara", None),
            ("g@h", 55, "Dan", Some(4.25)),
        ];
        for (email, age, name, score) in rows {
            let mut fields = serde_json::json!({"email": email, "age": age, "name": name});
            if let Some(s) = score {
                fields["score"] = serde_json::json!(s);
            }
            store
                .insert(&def, None, fields.as_object().unwrap(), None)
                .await
                .unwrap();
        }
        (store, def)
    }

    fn eq(field: &str, value: serde_json::Value) -> Filter {
        Filter::new(field, FilterOp::Eq, value)
    }

    async fn run(
        store: &EntityStore,
        def: &EntityTypeDefinition,
        opts: &QueryOptions,
    ) -> Result<ExecutedQuery, DbError> {
        let state = store.state().read().await;
        execute(&state, def, opts)
    }

    #[tokio::test]
    async fn indexed_eq_uses_index_and_matches_scan() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_filter(eq("age", serde_json::json!(30)));
        let result = run(&store, &def, &opts).await.unwrap();
        assert_eq!(result.total, 2);
        let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        // the same predicate on an unindexed field takes the scan path
        let scan = QueryOptions::for_type("user")
            .with_filter(Filter::new("age", FilterOp::Gte, serde_json::json!(30)))
            .with_filter(Filter::new("age", FilterOp::Lte, serde_json::json!(30)));
        let scanned = run(&store, &def, &scan).await.unwrap();
        assert_eq!(scanned.total, 2);
    }

    #[tokio::test]
    async fn unique_eq_resolves_single_candidate() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_filter(eq("email", serde_json::json!("e@f")));
        let result = run(&store, &def, &opts).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.entities[0].id, "3");
    }

    #[tokio::test]
    async fn in_filter_unions_index_lookups() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_filter(Filter::new(
            "age",
            FilterOp::In,
            serde_json::json!([41, 55]),
        ));
        let result = run(&store, &def, &opts).await.unwrap();
        assert_eq!(result.total, 2);
    }

    #[tokio::test]
    async fn intersection_of_indexable_filters() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user")
            .with_filter(eq("age", serde_json::json!(30)))
            .with_filter(eq("email", serde_json::json!("c@d")));
        let result = run(&store, &def, &opts).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.entities[0].id, "2");
    }

    #[tokio::test]
    async fn string_ops() {
        let (store, def) = seeded_store().await;
        for (op, value, expected) in [
            (FilterOp::Contains, "ar", 1usize),
            (FilterOp::StartsWith, "A", 1),
            (FilterOp::EndsWith, "n", 2),
        ] {
            let opts = QueryOptions::for_type("user").with_filter(Filter::new(
                "name",
                op,
                serde_json::json!(value),
            ));
            let result = run(&store, &def, &opts).await.unwrap();
            assert_eq!(result.total, expected, "op {op}");
        }
    }

    #[tokio::test]
    async fn exists_means_present_and_non_null() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_filter(Filter::new(
            "score",
            FilterOp::Exists,
            serde_json::Value::Null,
        ));
        let result = run(&store, &def, &opts).await.unwrap();
        assert_eq!(result.total, 3);
    }

    #[tokio::test]
    async fn ne_treats_missing_as_null() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_filter(Filter::new(
            "score",
            FilterOp::Ne,
            serde_json::json!(9.0),
        ));
        // Cara's null score is != 9.0
        let result = run(&store, &def, &opts).await.unwrap();
        assert_eq!(result.total, 3);
    }

    #[tokio::test]
    async fn unknown_field_and_operator_are_invalid_query() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_filter(eq("height", serde_json::json!(1)));
        assert!(matches!(
            run(&store, &def, &opts).await,
            Err(DbError::InvalidQuery { .. })
        ));

        let opts = QueryOptions::for_type("user").with_filter(Filter {
            field: "age".into(),
            op: "like".into(),
            value: serde_json::json!(1),
        });
        assert!(matches!(
            run(&store, &def, &opts).await,
            Err(DbError::InvalidQuery { .. })
        ));
    }

    #[tokio::test]
    async fn filter_value_type_mismatch_is_invalid_query() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_filter(eq("age", serde_json::json!("old")));
        assert!(matches!(
            run(&store, &def, &opts).await,
            Err(DbError::InvalidQuery { .. })
        ));
    }

    #[tokio::test]
    async fn id_filter_canonicalizes() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_filter(eq("id", serde_json::json!("0002")));
        let result = run(&store, &def, &opts).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.entities[0].id, "2");
    }

    #[tokio::test]
    async fn ordering_with_ties_breaks_by_id() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_order("age", false);
        let result = run(&store, &def, &opts).await.unwrap();
        let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);

        let opts = QueryOptions::for_type("user").with_order("age", true);
        let result = run(&store, &def, &opts).await.unwrap();
        let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["4", "3", "2", "1"]);
    }

    #[tokio::test]
    async fn missing_order_values_sort_last() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_order("score", false);
        let result = run(&store, &def, &opts).await.unwrap();
        assert_eq!(result.entities.last().unwrap().id, "3");
    }

    #[tokio::test]
    async fn default_order_is_ascending_canonical_id() {
        let store = EntityStore::new();
        let def = user_def();
        for i in 0..11 {
            store
                .insert(
                    &def,
                    None,
                    serde_json::json!({"email": format!("u{i}@x"), "age": 1, "name": "n"})
                        .as_object()
                        .unwrap(),
                    None,
                )
                .await
                .unwrap();
        }
        let result = run(&store, &def, &QueryOptions::for_type("user"))
            .await
            .unwrap();
        let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
        // numeric order, not lexicographic ("10" after "9")
        assert_eq!(ids[8..], ["9", "10", "11"]);
    }

    #[tokio::test]
    async fn pagination_clamps_and_reports() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_page(2, 1);
        let result = run(&store, &def, &opts).await.unwrap();
        assert_eq!(result.total, 4);
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.limit, 2);
        assert_eq!(result.offset, 1);

        // limit <= 0 defaults to 100, negative offset clamps to 0
        let opts = QueryOptions::for_type("user").with_page(0, -7);
        let result = run(&store, &def, &opts).await.unwrap();
        assert_eq!(result.limit, 100);
        assert_eq!(result.offset, 0);
        assert_eq!(result.entities.len(), 4);
    }

    #[tokio::test]
    async fn count_matches_data_query() {
        let (store, def) = seeded_store().await;
        let opts = QueryOptions::for_type("user").with_filter(eq("age", serde_json::json!(30)));
        let state = store.state().read().await;
        let count = execute_count(&state, &def, &opts).unwrap();
        let data = execute(&state, &def, &opts).unwrap();
        assert_eq!(count, data.total);

        // no filters: membership cardinality
        let count = execute_count(&state, &def, &QueryOptions::for_type("user")).unwrap();
        assert_eq!(count, 4);
    }
}
