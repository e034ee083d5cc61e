use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::stadium::*;
use crate::services::stadiums::{self, CreateVariant};
use crate::AppState;

/// Create is role-dispatched in the handler rather than the router: admins
/// and owners share the endpoint but send different payloads.
pub async fn create_stadium(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Json(body): Json<CreateStadiumRequest>,
) -> AppResult<Json<Value>> {
    let role = stadiums::fetch_role(&state.db, user.id).await?;
    let variant = CreateVariant::for_role(role, user.id, body.owner)?;
    let stadium = stadiums::create_stadium(&state.db, variant, &body).await?;
    tracing::info!(stadium_id = %stadium.id, owner_id = %stadium.owner_id, "stadium created");
    Ok(Json(json!(stadium)))
}

pub async fn update_stadium(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStadiumRequest>,
) -> AppResult<Json<Value>> {
    let role = stadiums::fetch_role(&state.db, user.id).await?;
    let stadium = stadiums::update_stadium(&state.db, user.id, role, id, &body).await?;
    Ok(Json(json!(stadium)))
}

pub async fn delete_stadium(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let role = stadiums::fetch_role(&state.db, user.id).await?;
    stadiums::delete_stadium(&state.db, user.id, role, id).await?;
    tracing::info!(stadium_id = %id, "stadium deleted");
    Ok(Json(json!({ "success": true })))
}

/// Admins see every stadium, owners their own.
pub async fn list_stadiums(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let role = stadiums::fetch_role(&state.db, user.id).await?;
    let rows = stadiums::list_stadiums(&state.db, user.id, role).await?;
    Ok(Json(json!({ "stadiums": rows })))
}

/// Admin-only (enforced by route middleware): active/inactive rollup.
pub async fn status_count(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let counts = stadiums::status_counts(&state.db).await?;
    Ok(Json(json!(counts)))
}
