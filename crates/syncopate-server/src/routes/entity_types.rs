use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use syncopate_core::error::DbError;
use syncopate_core::types::{EntityTypeDefinition, EntityTypeUpdate};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

/// Response for a schema update: the committed definition plus the
/// unique fields the change added and removed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntityTypeResponse {
    pub entity_type: EntityTypeDefinition,
    pub added_unique_fields: Vec<String>,
    pub removed_unique_fields: Vec<String>,
}

/// GET /api/v1/entity-types -- sorted list of type names.
pub async fn list_entity_types(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.db.entity_type_names().await)
}

/// POST /api/v1/entity-types -- register a type.
pub async fn register_entity_type(
    State(state): State<AppState>,
    ApiJson(def): ApiJson<EntityTypeDefinition>,
) -> Result<impl IntoResponse, ApiError> {
    let def = state.db.register_entity_type(def).await?;
    Ok((StatusCode::CREATED, Json(def)))
}

/// GET /api/v1/entity-types/{name} -- fetch one definition.
pub async fn get_entity_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<EntityTypeDefinition>, ApiError> {
    Ok(Json(state.db.entity_type(&name).await?))
}

/// PUT /api/v1/entity-types/{name} -- update a definition. The payload
/// name must match the path.
pub async fn update_entity_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
    ApiJson(update): ApiJson<EntityTypeUpdate>,
) -> Result<Json<UpdateEntityTypeResponse>, ApiError> {
    if update.name != name {
        return Err(ApiError(DbError::InvalidRequest {
            reason: format!(
                "payload name '{}' does not match target '{name}'",
                update.name
            ),
        }));
    }
    let change = state.db.update_entity_type(update).await?;
    Ok(Json(UpdateEntityTypeResponse {
        entity_type: change.definition,
        added_unique_fields: change.added_unique,
        removed_unique_fields: change.removed_unique,
    }))
}
