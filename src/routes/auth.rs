use axum::{extract::State, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{generate_tokens, verify_token};
use crate::models::user::*;
use crate::AppState;

const USER_COLUMNS: &str =
    "id, phone_number, full_name, email, password_hash, role, is_active, created_at, updated_at";

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<Value>> {
    if !valid_phone(&body.phone_number) {
        return Err(AppError::BadRequest(
            "Phone number must be +998 followed by 9 digits".into(),
        ));
    }
    if body.password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".into(),
        ));
    }

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE phone_number = $1)")
            .bind(&body.phone_number)
            .fetch_one(&state.db)
            .await?;
    if exists {
        return Err(AppError::Conflict("Phone number already registered".into()));
    }

    let password_hash =
        bcrypt::hash(&body.password, 12).map_err(|e| AppError::Internal(e.to_string()))?;
    let full_name = body.full_name.unwrap_or_default();

    let user: User = sqlx::query_as(&format!(
        "INSERT INTO users (id, phone_number, full_name, email, password_hash, role, is_active)
         VALUES ($1, $2, $3, $4, $5, 'user', true)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&body.phone_number)
    .bind(&full_name)
    .bind(body.email.as_deref())
    .bind(&password_hash)
    .fetch_one(&state.db)
    .await
    .map_err(map_phone_conflict)?;

    let (token, refresh_token) = generate_tokens(
        user.id,
        Some(user.role.as_str()),
        &state.config.jwt.secret,
        state.config.jwt.access_expiry_secs,
        state.config.jwt.refresh_expiry_secs,
    )?;

    Ok(Json(json!({
        "token": token,
        "refresh_token": refresh_token,
        "user": UserPublic::from(&user),
    })))
}

// Two registrations can pass the existence check together; the phone unique
// constraint settles the race.
fn map_phone_conflict(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some("uq_users_phone") {
            return AppError::Conflict("Phone number already registered".into());
        }
    }
    AppError::Database(err)
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let user: User = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1 AND is_active"
    ))
    .bind(&body.phone_number)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Unauthorized("Invalid phone number or password".into()))?;

    let valid = bcrypt::verify(&body.password, &user.password_hash)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if !valid {
        return Err(AppError::Unauthorized(
            "Invalid phone number or password".into(),
        ));
    }

    let (token, refresh_token) = generate_tokens(
        user.id,
        Some(user.role.as_str()),
        &state.config.jwt.secret,
        state.config.jwt.access_expiry_secs,
        state.config.jwt.refresh_expiry_secs,
    )?;

    Ok(Json(json!({
        "token": token,
        "refresh_token": refresh_token,
        "user": UserPublic::from(&user),
    })))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<Value>> {
    let claims = verify_token(&body.refresh_token, &state.config.jwt.secret)?;
    if claims.token_type.as_deref() != Some("refresh") {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    let (new_token, new_refresh) = generate_tokens(
        user_id,
        claims.role.as_deref(),
        &state.config.jwt.secret,
        state.config.jwt.access_expiry_secs,
        state.config.jwt.refresh_expiry_secs,
    )?;

    Ok(Json(json!({
        "token": new_token,
        "refresh_token": new_refresh,
    })))
}
