use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET / -- service banner.
pub async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "SyncopateDB",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.settings.environment,
    }))
}

/// GET /health -- liveness plus coarse store statistics.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let entity_types = state.db.entity_type_names().await.len();
    let entities = state.db.total_entities().await;
    Json(serde_json::json!({
        "status": "ok",
        "entityTypes": entity_types,
        "entities": entities,
    }))
}

/// GET /settings -- effective runtime settings.
pub async fn settings(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "environment": state.settings.environment,
        "debug": state.settings.debug,
        "wal": {
            "enabled": state.db.wal_enabled(),
            "compressionEnabled": state.db.wal_compression_enabled(),
            "compressionRatio": state.db.wal_compression_ratio(),
        },
    }))
}

// One row per stable error code: (db_code, kind, http status, description).
const ERROR_DOCS: &[(&str, &str, u16, &str)] = &[
    ("SY001", "entity_not_found", 404, "No entity with this id exists in the type."),
    ("SY002", "entity_type_not_found", 404, "No entity type is registered under this name."),
    ("SY003", "entity_type_exists", 409, "An entity type with this name is already registered."),
    ("SY004", "invalid_entity_type", 400, "The entity type definition failed validation."),
    ("SY100", "malformed_data", 400, "A field value does not conform to the declared schema."),
    ("SY101", "required_field_missing", 400, "A required field (or id for custom generators) is absent."),
    ("SY102", "invalid_id", 400, "The id does not conform to the type's generator."),
    ("SY103", "invalid_request", 400, "The request shape is invalid."),
    ("SY104", "invalid_query", 400, "The query references an unknown field or operator."),
    ("SY105", "invalid_join", 400, "The join specification is invalid or missing."),
    ("SY200", "unique_constraint", 409, "The operation would violate a unique constraint."),
    ("SY201", "id_generator_change", 400, "The id generator of an entity type is immutable."),
    ("SY900", "internal_error", 500, "Unexpected engine failure."),
];

/// GET /errors -- documentation of every stable error code.
pub async fn errors() -> Json<serde_json::Value> {
    let docs: Vec<serde_json::Value> = ERROR_DOCS
        .iter()
        .map(|(db_code, error, code, description)| {
            serde_json::json!({
                "db_code": db_code,
                "error": error,
                "code": code,
                "description": description,
            })
        })
        .collect();
    Json(serde_json::json!({ "errors": docs }))
}

/// GET /debug/schema -- full definitions plus per-type live counts.
pub async fn debug_schema(State(state): State<AppState>) -> Json<serde_json::Value> {
    let definitions = state.db.entity_type_definitions().await;
    let counts = state.db.entity_counts().await;
    Json(serde_json::json!({
        "entityTypes": definitions,
        "counts": counts,
    }))
}
