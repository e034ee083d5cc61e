use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::Role;
use crate::AppState;

/// Re-reads the actor's role from the database and requires an exact match.
/// Token claims are not trusted here: owner/manager promotion happens after
/// tokens are issued, so the claim can be stale in either direction.
async fn check_role(state: &AppState, user_id: Uuid, required: Role) -> Result<(), AppError> {
    let role = sqlx::query_scalar::<_, Role>("SELECT role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account not found".into()))?;

    if role != required {
        return Err(AppError::Forbidden(format!(
            "Requires {} role",
            required.as_str()
        )));
    }
    Ok(())
}

fn current_user(req: &Request) -> Result<AuthUser, AppError> {
    req.extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))
}

/// Middleware factory family, used via
/// `axum::middleware::from_fn_with_state(state, require_admin)` etc.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = current_user(&req)?;
    check_role(&state, user.id, Role::Admin).await?;
    Ok(next.run(req).await)
}

pub async fn require_owner(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = current_user(&req)?;
    check_role(&state, user.id, Role::Owner).await?;
    Ok(next.run(req).await)
}

pub async fn require_manager(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = current_user(&req)?;
    check_role(&state, user.id, Role::Manager).await?;
    Ok(next.run(req).await)
}
