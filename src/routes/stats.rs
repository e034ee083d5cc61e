use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::services::stats;
use crate::AppState;

/// Owner-only (enforced by route middleware): per-stadium booking counts and
/// paid income, served cache-first.
pub async fn stadium_stats(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let rows = stats::owner_stats(
        &state.db,
        &state.cache,
        user.id,
        state.config.stats.cache_seconds,
    )
    .await?;
    Ok(Json(json!(rows)))
}
