pub mod entities;
pub mod entity_types;
pub mod query;
pub mod system;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Builds the full application router. Data paths live under
/// `/api/v1`; the operational surfaces are mounted both there and at
/// the server root.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/entity-types",
            get(entity_types::list_entity_types).post(entity_types::register_entity_type),
        )
        .route(
            "/entity-types/{name}",
            get(entity_types::get_entity_type).put(entity_types::update_entity_type),
        )
        .route(
            "/entities/{type}",
            get(entities::list_entities).post(entities::create_entity),
        )
        .route(
            "/entities/{type}/{id}",
            get(entities::get_entity)
                .put(entities::update_entity)
                .delete(entities::delete_entity),
        )
        .route("/query", post(query::execute_query))
        .route("/query/count", post(query::execute_count_query))
        .route("/query/joins", post(query::execute_join_query));

    let ops = Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .route("/settings", get(system::settings))
        .route("/errors", get(system::errors))
        .route("/debug/schema", get(system::debug_schema));

    Router::new()
        .nest("/api/v1", api.merge(ops.clone()))
        .merge(ops)
        .with_state(state)
}
