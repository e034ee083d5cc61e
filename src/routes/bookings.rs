use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::booking::*;
use crate::services::booking::{self, LIST_TIME_FORMAT};
use crate::AppState;

pub async fn create_booking(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Json(body): Json<CreateBookingRequest>,
) -> AppResult<Json<Value>> {
    let created = booking::create_booking(&state.db, user.id, &body).await?;
    tracing::info!(
        booking_id = %created.id,
        stadium_id = %created.stadium_id,
        "booking created"
    );
    Ok(Json(json!(created)))
}

/// Manager-only (enforced by route middleware): flips the paid flag. Any
/// manager may update any booking, not just their own stadium's.
pub async fn update_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PaymentUpdateRequest>,
) -> AppResult<Json<Value>> {
    let (id, is_paid) =
        booking::set_payment_status(&state.db, &state.cache, id, body.is_paid).await?;
    Ok(Json(json!({ "id": id, "is_paid": is_paid })))
}

/// Owner-only (enforced by route middleware): bookings across the owner's
/// stadiums with filters, search, ordering and paging.
pub async fn list_bookings(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Query(query): Query<BookingListQuery>,
) -> AppResult<Json<Value>> {
    let (rows, count) = booking::list_owner_bookings(&state.db, user.id, &query).await?;

    let results: Vec<Value> = rows
        .iter()
        .map(|(stadium_name, start, end, team_name, order_type, is_paid)| {
            json!({
                "stadium_name": stadium_name,
                "start_time": start.format(LIST_TIME_FORMAT).to_string(),
                "end_time": end.format(LIST_TIME_FORMAT).to_string(),
                "team_name": team_name,
                "order_type": order_type.as_str(),
                "is_paid": is_paid,
            })
        })
        .collect();

    Ok(Json(json!({ "results": results, "count": count })))
}
