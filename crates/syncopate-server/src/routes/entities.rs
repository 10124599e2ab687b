use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use syncopate_core::query::{QueryOptions, QueryResult};
use syncopate_core::types::Entity;
use syncopate_engine::represent::{self, RenderOptions};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

/// Body for POST /entities/{type}: an optional explicit id plus the
/// field map.
#[derive(Debug, Deserialize)]
pub struct InsertEntityRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Body for PUT /entities/{type}/{id}: patch semantics, only the
/// supplied keys change.
#[derive(Debug, Deserialize)]
pub struct UpdateEntityRequest {
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Pagination and ordering query-string parameters for the list route.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListEntitiesParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Option<String>,
    pub order_desc: Option<bool>,
}

async fn render_entity(
    state: &AppState,
    entity: &Entity,
) -> Result<serde_json::Value, ApiError> {
    let def = state.db.entity_type(&entity.entity_type).await?;
    let opts = RenderOptions::new(state.settings.debug);
    Ok(serde_json::Value::Object(represent::project(
        entity, &def, &opts,
    )))
}

/// GET /api/v1/entities/{type} -- paginated list.
pub async fn list_entities(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    Query(params): Query<ListEntitiesParams>,
) -> Result<Json<QueryResult>, ApiError> {
    let mut opts = QueryOptions::for_type(entity_type);
    opts.limit = params.limit.unwrap_or(0);
    opts.offset = params.offset.unwrap_or(0);
    opts.order_by = params.order_by.unwrap_or_default();
    opts.order_desc = params.order_desc.unwrap_or(false);

    let result = state.db.query(&opts, state.settings.debug).await?;
    Ok(Json(result))
}

/// POST /api/v1/entities/{type} -- insert, returning the stored shape
/// with its (possibly generated) id.
pub async fn create_entity(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    ApiJson(body): ApiJson<InsertEntityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entity = state
        .db
        .insert(&entity_type, body.id.as_deref(), &body.fields)
        .await?;
    let rendered = render_entity(&state, &entity).await?;
    Ok((StatusCode::CREATED, Json(rendered)))
}

/// GET /api/v1/entities/{type}/{id} -- fetch one.
pub async fn get_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entity = state.db.get(&entity_type, &id).await?;
    Ok(Json(render_entity(&state, &entity).await?))
}

/// PUT /api/v1/entities/{type}/{id} -- patch.
pub async fn update_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
    ApiJson(body): ApiJson<UpdateEntityRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entity = state.db.update(&entity_type, &id, &body.fields).await?;
    Ok(Json(render_entity(&state, &entity).await?))
}

/// DELETE /api/v1/entities/{type}/{id} -- remove.
pub async fn delete_entity(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.db.delete(&entity_type, &id).await?;
    Ok(Json(serde_json::json!({
        "status": "deleted",
        "type": entity_type,
        "id": id,
    })))
}
