use std::time::Instant;

use axum::extract::State;
use axum::Json;

use syncopate_core::error::DbError;
use syncopate_core::query::{CountResult, QueryOptions, QueryResult};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::AppState;

/// POST /api/v1/query -- filtered, ordered, paginated query.
pub async fn execute_query(
    State(state): State<AppState>,
    ApiJson(opts): ApiJson<QueryOptions>,
) -> Result<Json<QueryResult>, ApiError> {
    let result = state.db.query(&opts, state.settings.debug).await?;
    Ok(Json(result))
}

/// POST /api/v1/query/count -- count-only variant.
pub async fn execute_count_query(
    State(state): State<AppState>,
    ApiJson(opts): ApiJson<QueryOptions>,
) -> Result<Json<CountResult>, ApiError> {
    let started = Instant::now();
    let count = state.db.query_count(&opts).await?;
    let elapsed = started.elapsed();
    Ok(Json(CountResult {
        count,
        entity_type: opts.entity_type,
        query_type: "count".to_string(),
        filters_count: opts.filters.len(),
        joins_applied: opts.joins.len(),
        execution_time: format!("{:.3}ms", elapsed.as_secs_f64() * 1000.0),
    }))
}

/// POST /api/v1/query/joins -- nested join query; at least one join is
/// required.
pub async fn execute_join_query(
    State(state): State<AppState>,
    ApiJson(opts): ApiJson<QueryOptions>,
) -> Result<Json<QueryResult>, ApiError> {
    if opts.joins.is_empty() {
        return Err(ApiError(DbError::InvalidJoin {
            reason: "at least one join is required".into(),
        }));
    }
    let result = state.db.query(&opts, state.settings.debug).await?;
    Ok(Json(result))
}
