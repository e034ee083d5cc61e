use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{CreateStadiumRequest, Role, Stadium, StatusCounts, UpdateStadiumRequest};

pub const STADIUM_EXISTS: &str = "Such a stadium already exists.";
pub const MANAGER_IS_OWNER: &str = "Owner and Manager cannot be the same user.";
pub const MANAGER_BAD_ROLE: &str = "Manager cannot be a user with 'admin' or 'owner' role.";
pub const OWNER_LIMIT_REACHED: &str = "This owner already has 3 stadiums.";
pub const OWNER_CANNOT_BE_ADMIN: &str = "Owner cannot be a user with 'admin' role.";
pub const OWNER_REQUIRED: &str = "Owner must be provided.";
pub const OWNER_NOT_ALLOWED: &str = "Owner must not be provided.";

pub const MAX_STADIUMS_PER_OWNER: i64 = 3;

const STADIUM_COLUMNS: &str =
    "id, name, description, latitude, longitude, price_hour, owner_id, manager_id, is_active, created_at, updated_at";

/// Create requests mean different things depending on who sends them: admins
/// must name the owner, owners always create for themselves and must not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateVariant {
    Admin { owner: Uuid },
    Owner { owner: Uuid },
}

impl CreateVariant {
    pub fn for_role(role: Role, actor: Uuid, requested_owner: Option<Uuid>) -> AppResult<Self> {
        match role {
            Role::Admin => {
                let owner = requested_owner
                    .ok_or_else(|| AppError::BadRequest(OWNER_REQUIRED.into()))?;
                Ok(CreateVariant::Admin { owner })
            }
            Role::Owner => {
                if requested_owner.is_some() {
                    return Err(AppError::BadRequest(OWNER_NOT_ALLOWED.into()));
                }
                Ok(CreateVariant::Owner { owner: actor })
            }
            _ => Err(AppError::Forbidden("Requires admin or owner role".into())),
        }
    }

    pub fn owner_id(&self) -> Uuid {
        match *self {
            CreateVariant::Admin { owner } | CreateVariant::Owner { owner } => owner,
        }
    }
}

/// Fresh role read for the role-dispatched stadium handlers.
pub async fn fetch_role(db: &PgPool, user_id: Uuid) -> AppResult<Role> {
    sqlx::query_scalar::<_, Role>("SELECT role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account not found".into()))
}

/// Admins stay admins; naming one as a stadium owner is rejected outright.
pub fn check_owner_target(role: Role) -> AppResult<()> {
    if role == Role::Admin {
        return Err(AppError::BadRequest(OWNER_CANNOT_BE_ADMIN.into()));
    }
    Ok(())
}

pub fn check_manager_distinct(owner_id: Uuid, manager_id: Uuid) -> AppResult<()> {
    if manager_id == owner_id {
        return Err(AppError::BadRequest(MANAGER_IS_OWNER.into()));
    }
    Ok(())
}

pub fn check_manager_role(role: Role) -> AppResult<()> {
    if matches!(role, Role::Admin | Role::Owner) {
        return Err(AppError::BadRequest(MANAGER_BAD_ROLE.into()));
    }
    Ok(())
}

/// The cap binds accounts already acting as owners; any other role is being
/// promoted by its first stadium and starts from zero.
pub fn check_owner_capacity(role: Role, held: i64) -> AppResult<()> {
    if role == Role::Owner && held >= MAX_STADIUMS_PER_OWNER {
        return Err(AppError::BadRequest(OWNER_LIMIT_REACHED.into()));
    }
    Ok(())
}

/// Counts the stadiums the target owner holds and applies the cap. Runs on
/// create and on ownership transfer, inside the caller's transaction.
async fn ensure_owner_capacity(
    conn: &mut PgConnection,
    owner_id: Uuid,
    role: Role,
) -> AppResult<()> {
    if role != Role::Owner {
        return Ok(());
    }
    let held: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stadiums WHERE owner_id = $1")
        .bind(owner_id)
        .fetch_one(&mut *conn)
        .await?;
    check_owner_capacity(role, held)
}

/// Shared base validation: active-site uniqueness, then the manager rules.
/// `exclude` skips the stadium being updated in the uniqueness check.
async fn validate_stadium_rules(
    conn: &mut PgConnection,
    name: &str,
    latitude: Decimal,
    longitude: Decimal,
    owner_id: Uuid,
    manager_id: Option<Uuid>,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let duplicate: bool = sqlx::query_scalar(
        "SELECT EXISTS (
           SELECT 1 FROM stadiums
           WHERE name = $1 AND latitude = $2 AND longitude = $3 AND is_active
             AND ($4::uuid IS NULL OR id <> $4))",
    )
    .bind(name)
    .bind(latitude)
    .bind(longitude)
    .bind(exclude)
    .fetch_one(&mut *conn)
    .await?;
    if duplicate {
        return Err(AppError::BadRequest(STADIUM_EXISTS.into()));
    }

    if let Some(manager_id) = manager_id {
        check_manager_distinct(owner_id, manager_id)?;
        let role = sqlx::query_scalar::<_, Role>("SELECT role FROM users WHERE id = $1")
            .bind(manager_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::BadRequest("Manager not found.".into()))?;
        check_manager_role(role)?;
    }
    Ok(())
}

/// Applies a role transition unless the user already holds it. Re-promotion
/// is a no-op, so callers invoke this unconditionally.
pub async fn promote_role(conn: &mut PgConnection, user_id: Uuid, target: Role) -> AppResult<()> {
    let result =
        sqlx::query("UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 AND role <> $2")
            .bind(user_id)
            .bind(target)
            .execute(&mut *conn)
            .await?;
    if result.rows_affected() > 0 {
        tracing::info!(user_id = %user_id, role = target.as_str(), "role promoted");
    }
    Ok(())
}

pub async fn create_stadium(
    db: &PgPool,
    variant: CreateVariant,
    req: &CreateStadiumRequest,
) -> AppResult<Stadium> {
    let owner_id = variant.owner_id();
    let mut tx = db.begin().await?;

    let owner_role = sqlx::query_scalar::<_, Role>("SELECT role FROM users WHERE id = $1")
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::BadRequest("Owner not found.".into()))?;
    check_owner_target(owner_role)?;

    validate_stadium_rules(
        &mut tx,
        &req.name,
        req.latitude,
        req.longitude,
        owner_id,
        req.manager,
        None,
    )
    .await?;

    ensure_owner_capacity(&mut tx, owner_id, owner_role).await?;

    let stadium = sqlx::query_as::<_, Stadium>(&format!(
        "INSERT INTO stadiums (id, name, description, latitude, longitude, price_hour, owner_id, manager_id, is_active)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING {STADIUM_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&req.name)
    .bind(req.description.clone().unwrap_or_default())
    .bind(req.latitude)
    .bind(req.longitude)
    .bind(req.price_hour)
    .bind(owner_id)
    .bind(req.manager)
    .bind(req.is_active.unwrap_or(true))
    .fetch_one(&mut *tx)
    .await?;

    if matches!(variant, CreateVariant::Admin { .. }) && owner_role != Role::Owner {
        promote_role(&mut tx, owner_id, Role::Owner).await?;
    }
    if let Some(manager_id) = req.manager {
        promote_role(&mut tx, manager_id, Role::Manager).await?;
    }

    tx.commit().await?;
    Ok(stadium)
}

pub async fn update_stadium(
    db: &PgPool,
    actor: Uuid,
    actor_role: Role,
    stadium_id: Uuid,
    req: &UpdateStadiumRequest,
) -> AppResult<Stadium> {
    let mut tx = db.begin().await?;

    let existing = sqlx::query_as::<_, Stadium>(&format!(
        "SELECT {STADIUM_COLUMNS} FROM stadiums WHERE id = $1 FOR UPDATE"
    ))
    .bind(stadium_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Stadium not found".into()))?;

    match actor_role {
        Role::Admin => {}
        Role::Owner if existing.owner_id == actor => {}
        Role::Owner => return Err(AppError::Forbidden("You do not own this stadium".into())),
        _ => return Err(AppError::Forbidden("Requires admin or owner role".into())),
    }

    let owner_id = match (actor_role, req.owner) {
        (Role::Admin, Some(owner)) => owner,
        (_, Some(_)) => return Err(AppError::BadRequest(OWNER_NOT_ALLOWED.into())),
        (_, None) => existing.owner_id,
    };
    let new_owner_role = if owner_id != existing.owner_id {
        let role = sqlx::query_scalar::<_, Role>("SELECT role FROM users WHERE id = $1")
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::BadRequest("Owner not found.".into()))?;
        check_owner_target(role)?;
        Some(role)
    } else {
        None
    };

    let name = req.name.clone().unwrap_or_else(|| existing.name.clone());
    let latitude = req.latitude.unwrap_or(existing.latitude);
    let longitude = req.longitude.unwrap_or(existing.longitude);
    let price_hour = req.price_hour.unwrap_or(existing.price_hour);
    let description = req
        .description
        .clone()
        .unwrap_or_else(|| existing.description.clone());
    let manager_id = match req.manager {
        Some(update) => update,
        None => existing.manager_id,
    };
    let is_active = req.is_active.unwrap_or(existing.is_active);

    validate_stadium_rules(
        &mut tx,
        &name,
        latitude,
        longitude,
        owner_id,
        manager_id,
        Some(stadium_id),
    )
    .await?;

    // A transfer counts against the receiving owner's cap; re-submitting the
    // current owner is not a transfer.
    if let Some(role) = new_owner_role {
        ensure_owner_capacity(&mut tx, owner_id, role).await?;
    }

    let stadium = sqlx::query_as::<_, Stadium>(&format!(
        "UPDATE stadiums
         SET name = $2, description = $3, latitude = $4, longitude = $5,
             price_hour = $6, owner_id = $7, manager_id = $8, is_active = $9,
             updated_at = NOW()
         WHERE id = $1
         RETURNING {STADIUM_COLUMNS}"
    ))
    .bind(stadium_id)
    .bind(&name)
    .bind(&description)
    .bind(latitude)
    .bind(longitude)
    .bind(price_hour)
    .bind(owner_id)
    .bind(manager_id)
    .bind(is_active)
    .fetch_one(&mut *tx)
    .await?;

    if owner_id != existing.owner_id {
        promote_role(&mut tx, owner_id, Role::Owner).await?;
    }
    if let Some(Some(manager_id)) = req.manager {
        promote_role(&mut tx, manager_id, Role::Manager).await?;
    }

    tx.commit().await?;
    Ok(stadium)
}

pub async fn delete_stadium(
    db: &PgPool,
    actor: Uuid,
    actor_role: Role,
    stadium_id: Uuid,
) -> AppResult<()> {
    let owner_id: Uuid = sqlx::query_scalar("SELECT owner_id FROM stadiums WHERE id = $1")
        .bind(stadium_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stadium not found".into()))?;

    match actor_role {
        Role::Admin => {}
        Role::Owner if owner_id == actor => {}
        Role::Owner => return Err(AppError::Forbidden("You do not own this stadium".into())),
        _ => return Err(AppError::Forbidden("Requires admin or owner role".into())),
    }

    // Bookings go with the stadium via ON DELETE CASCADE.
    sqlx::query("DELETE FROM stadiums WHERE id = $1")
        .bind(stadium_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn list_stadiums(db: &PgPool, actor: Uuid, actor_role: Role) -> AppResult<Vec<Stadium>> {
    let rows = match actor_role {
        Role::Admin => {
            sqlx::query_as::<_, Stadium>(&format!(
                "SELECT {STADIUM_COLUMNS} FROM stadiums ORDER BY created_at DESC"
            ))
            .fetch_all(db)
            .await?
        }
        Role::Owner => {
            sqlx::query_as::<_, Stadium>(&format!(
                "SELECT {STADIUM_COLUMNS} FROM stadiums WHERE owner_id = $1 ORDER BY created_at DESC"
            ))
            .bind(actor)
            .fetch_all(db)
            .await?
        }
        _ => return Err(AppError::Forbidden("Requires admin or owner role".into())),
    };
    Ok(rows)
}

pub async fn status_counts(db: &PgPool) -> AppResult<StatusCounts> {
    let counts = sqlx::query_as::<_, StatusCounts>(
        "SELECT COUNT(*) AS total_stadiums,
                COUNT(*) FILTER (WHERE is_active) AS active_stadiums,
                COUNT(*) FILTER (WHERE NOT is_active) AS inactive_stadiums
         FROM stadiums",
    )
    .fetch_one(db)
    .await?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_create_requires_an_owner() {
        let actor = Uuid::new_v4();
        let err = CreateVariant::for_role(Role::Admin, actor, None).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m == OWNER_REQUIRED));

        let target = Uuid::new_v4();
        let variant = CreateVariant::for_role(Role::Admin, actor, Some(target)).unwrap();
        assert_eq!(variant, CreateVariant::Admin { owner: target });
        assert_eq!(variant.owner_id(), target);
    }

    #[test]
    fn owner_create_is_always_for_self() {
        let actor = Uuid::new_v4();
        let variant = CreateVariant::for_role(Role::Owner, actor, None).unwrap();
        assert_eq!(variant.owner_id(), actor);

        let err = CreateVariant::for_role(Role::Owner, actor, Some(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m == OWNER_NOT_ALLOWED));
    }

    #[test]
    fn other_roles_cannot_create() {
        let actor = Uuid::new_v4();
        assert!(matches!(
            CreateVariant::for_role(Role::User, actor, None),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            CreateVariant::for_role(Role::Manager, actor, None),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn owner_limit_caps_at_three() {
        assert!(check_owner_capacity(Role::Owner, 0).is_ok());
        assert!(check_owner_capacity(Role::Owner, 2).is_ok());
        let err = check_owner_capacity(Role::Owner, 3).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m == OWNER_LIMIT_REACHED));
        // Only accounts already holding the owner role are capped.
        assert!(check_owner_capacity(Role::User, 5).is_ok());
        assert!(check_owner_capacity(Role::Manager, 3).is_ok());
    }

    #[test]
    fn manager_must_be_a_distinct_plain_user() {
        let owner = Uuid::new_v4();
        let err = check_manager_distinct(owner, owner).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m == MANAGER_IS_OWNER));
        assert!(check_manager_distinct(owner, Uuid::new_v4()).is_ok());

        for role in [Role::Admin, Role::Owner] {
            let err = check_manager_role(role).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(m) if m == MANAGER_BAD_ROLE));
        }
        assert!(check_manager_role(Role::User).is_ok());
        assert!(check_manager_role(Role::Manager).is_ok());
    }

    #[test]
    fn admins_cannot_be_named_owner() {
        let err = check_owner_target(Role::Admin).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m == OWNER_CANNOT_BE_ADMIN));
        assert!(check_owner_target(Role::User).is_ok());
        assert!(check_owner_target(Role::Manager).is_ok());
        assert!(check_owner_target(Role::Owner).is_ok());
    }

    // The SQL-coupled registry flows run against a scratch database:
    //   DATABASE_URL=postgres://.../scratch cargo test -- --ignored
    mod db {
        use super::*;
        use sqlx::postgres::PgPoolOptions;

        async fn pool() -> PgPool {
            let url = std::env::var("DATABASE_URL").expect("DATABASE_URL for a scratch database");
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .connect(&url)
                .await
                .expect("connect");
            sqlx::migrate!("./migrations").run(&pool).await.expect("migrate");
            pool
        }

        async fn seed_user(db: &PgPool, role: Role) -> Uuid {
            let id = Uuid::new_v4();
            let phone = format!("+998{:09}", id.as_u128() % 1_000_000_000);
            sqlx::query(
                "INSERT INTO users (id, phone_number, password_hash, role) VALUES ($1, $2, 'x', $3)",
            )
            .bind(id)
            .bind(&phone)
            .bind(role)
            .execute(db)
            .await
            .expect("seed user");
            id
        }

        fn site(name: &str) -> CreateStadiumRequest {
            CreateStadiumRequest {
                name: name.to_string(),
                latitude: Decimal::new(41_299_496, 6),
                longitude: Decimal::new(69_240_073, 6),
                description: None,
                price_hour: Decimal::new(80_000, 0),
                owner: None,
                manager: None,
                is_active: None,
            }
        }

        fn unchanged() -> UpdateStadiumRequest {
            UpdateStadiumRequest {
                name: None,
                latitude: None,
                longitude: None,
                description: None,
                price_hour: None,
                owner: None,
                manager: None,
                is_active: None,
            }
        }

        fn arena() -> String {
            format!("Arena {}", Uuid::new_v4())
        }

        #[tokio::test]
        #[ignore] // Needs a scratch DATABASE_URL
        async fn reassigning_to_a_full_owner_is_rejected() {
            let db = pool().await;
            let full_owner = seed_user(&db, Role::Owner).await;
            for _ in 0..3 {
                create_stadium(&db, CreateVariant::Owner { owner: full_owner }, &site(&arena()))
                    .await
                    .expect("create within the limit");
            }
            let err =
                create_stadium(&db, CreateVariant::Owner { owner: full_owner }, &site(&arena()))
                    .await
                    .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(m) if m == OWNER_LIMIT_REACHED));

            // Handing them someone else's stadium must fail the same way.
            let other_owner = seed_user(&db, Role::Owner).await;
            let stadium =
                create_stadium(&db, CreateVariant::Owner { owner: other_owner }, &site(&arena()))
                    .await
                    .expect("other owner's stadium");
            let admin = seed_user(&db, Role::Admin).await;
            let transfer = UpdateStadiumRequest {
                owner: Some(full_owner),
                ..unchanged()
            };
            let err = update_stadium(&db, admin, Role::Admin, stadium.id, &transfer)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(m) if m == OWNER_LIMIT_REACHED));

            // A transfer to an owner with room goes through.
            let fresh_owner = seed_user(&db, Role::Owner).await;
            let transfer = UpdateStadiumRequest {
                owner: Some(fresh_owner),
                ..unchanged()
            };
            let updated = update_stadium(&db, admin, Role::Admin, stadium.id, &transfer)
                .await
                .expect("transfer with capacity");
            assert_eq!(updated.owner_id, fresh_owner);
        }

        #[tokio::test]
        #[ignore] // Needs a scratch DATABASE_URL
        async fn promotion_is_idempotent() {
            let db = pool().await;
            let user = seed_user(&db, Role::User).await;
            let mut conn = db.acquire().await.expect("acquire");
            promote_role(&mut conn, user, Role::Owner)
                .await
                .expect("first promotion");
            promote_role(&mut conn, user, Role::Owner)
                .await
                .expect("second promotion is a no-op");
            assert_eq!(fetch_role(&db, user).await.expect("role"), Role::Owner);
        }

        #[tokio::test]
        #[ignore] // Needs a scratch DATABASE_URL
        async fn duplicate_active_site_is_rejected_until_deactivated() {
            let db = pool().await;
            let owner = seed_user(&db, Role::Owner).await;
            let name = arena();
            let first = create_stadium(&db, CreateVariant::Owner { owner }, &site(&name))
                .await
                .expect("first site");

            let rival = seed_user(&db, Role::Owner).await;
            let err = create_stadium(&db, CreateVariant::Owner { owner: rival }, &site(&name))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(m) if m == STADIUM_EXISTS));

            // Decommissioned rows stop blocking the site.
            let decommission = UpdateStadiumRequest {
                is_active: Some(false),
                ..unchanged()
            };
            update_stadium(&db, owner, Role::Owner, first.id, &decommission)
                .await
                .expect("deactivate");
            create_stadium(&db, CreateVariant::Owner { owner: rival }, &site(&name))
                .await
                .expect("site freed");
        }
    }
}
