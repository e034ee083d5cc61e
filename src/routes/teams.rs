use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::{AddMemberRequest, CreateTeamRequest, Team, TeamMember};
use crate::AppState;

pub async fn create_team(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Json(body): Json<CreateTeamRequest>,
) -> AppResult<Json<Value>> {
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("Team name required".into()));
    }

    let team: Team = sqlx::query_as(
        "INSERT INTO teams (id, name, owner_id) VALUES ($1, $2, $3)
         RETURNING id, name, owner_id, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(body.name.trim())
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!(team)))
}

/// Teams the caller owns or belongs to.
pub async fn list_teams(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let teams: Vec<Team> = sqlx::query_as(
        "SELECT DISTINCT t.id, t.name, t.owner_id, t.created_at
         FROM teams t
         LEFT JOIN team_members m ON m.team_id = t.id
         WHERE t.owner_id = $1 OR m.user_id = $1
         ORDER BY t.created_at",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "teams": teams })))
}

pub async fn list_members(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let owner_id: Uuid = sqlx::query_scalar("SELECT owner_id FROM teams WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Team not found".into()))?;

    if owner_id != user.id {
        let is_member: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM team_members WHERE team_id = $1 AND user_id = $2)",
        )
        .bind(id)
        .bind(user.id)
        .fetch_one(&state.db)
        .await?;
        if !is_member {
            return Err(AppError::Forbidden("Not a member of this team".into()));
        }
    }

    let members: Vec<TeamMember> = sqlx::query_as(
        "SELECT m.user_id, u.full_name, u.phone_number, m.joined_at
         FROM team_members m
         JOIN users u ON u.id = m.user_id
         WHERE m.team_id = $1
         ORDER BY m.joined_at",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "members": members })))
}

/// Team owner only; re-adding an existing member is a no-op.
pub async fn add_member(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<AddMemberRequest>,
) -> AppResult<Json<Value>> {
    let owner_id: Uuid = sqlx::query_scalar("SELECT owner_id FROM teams WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Team not found".into()))?;

    if owner_id != user.id {
        return Err(AppError::Forbidden("Must be the team owner".into()));
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(body.user_id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(AppError::BadRequest("User not found.".into()));
    }

    sqlx::query(
        "INSERT INTO team_members (team_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(id)
    .bind(body.user_id)
    .execute(&state.db)
    .await?;

    Ok(Json(json!({ "success": true })))
}
