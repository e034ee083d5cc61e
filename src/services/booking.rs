use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::Cache;
use crate::error::{AppError, AppResult};
use crate::models::{Booking, BookingListQuery, CreateBookingRequest, OrderType, Role};
use crate::services::stats::owner_stats_key;

pub const SLOT_TIME_INVALID: &str = "The time was entered incorrectly.";
pub const SLOT_DURATION_INVALID: &str = "The booking time was not available.";
pub const SLOT_TAKEN: &str = "This time slot is already booked.";
pub const ROLE_CANNOT_BOOK: &str = "Admins and Managers cannot book stadiums.";
pub const TEAM_REQUIRED: &str = "Team must be provided for team bookings.";
pub const TEAM_NOT_ALLOWED: &str = "You are not allowed to book on behalf of this team.";
pub const TEAM_FORBIDDEN_FOR_USER: &str = "Team should not be provided for user bookings.";

/// Timestamp format used by the owner-facing booking list.
pub const LIST_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Slot rules, in order: both endpoints in the future and start before end,
/// then a whole number of hours with a one-hour minimum. Malformed ranges are
/// reported before duration problems; callers rely on that ordering.
pub fn validate_slot(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AppResult<()> {
    if start < now || end < now || start >= end {
        return Err(AppError::BadRequest(SLOT_TIME_INVALID.into()));
    }
    let secs = (end - start).num_seconds();
    if secs < 3600 || secs % 3600 != 0 {
        return Err(AppError::BadRequest(SLOT_DURATION_INVALID.into()));
    }
    Ok(())
}

/// Only plain users and owners book. The rejection is a validation error, not
/// a 403: authentication succeeded, the role/payload combination is invalid.
pub fn check_booking_role(role: Role) -> AppResult<()> {
    match role {
        Role::Admin | Role::Manager => Err(AppError::BadRequest(ROLE_CANNOT_BOOK.into())),
        Role::Owner | Role::User => Ok(()),
    }
}

/// `is_team` and the `team` field must agree both ways.
pub fn check_team_choice(is_team: bool, team: Option<Uuid>) -> AppResult<Option<Uuid>> {
    match (is_team, team) {
        (true, None) => Err(AppError::BadRequest(TEAM_REQUIRED.into())),
        (true, Some(id)) => Ok(Some(id)),
        (false, Some(_)) => Err(AppError::BadRequest(TEAM_FORBIDDEN_FOR_USER.into())),
        (false, None) => Ok(None),
    }
}

/// Whitelisted ORDER BY for the owner list. Unknown values fall back to the
/// default rather than erroring.
pub fn order_clause(ordering: Option<&str>) -> &'static str {
    match ordering {
        Some("end_time") => "b.end_time ASC",
        Some("-start_time") => "b.start_time DESC",
        Some("-end_time") => "b.end_time DESC",
        _ => "b.start_time ASC",
    }
}

/// Creates a booking inside one transaction. Check order is a documented
/// contract: fresh role, team gate, slot rules, stadium lock, overlap, insert.
/// The stadium row is locked with FOR UPDATE before the overlap read so two
/// concurrent requests for the same stadium serialize instead of racing.
pub async fn create_booking(
    db: &PgPool,
    actor_id: Uuid,
    req: &CreateBookingRequest,
) -> AppResult<Booking> {
    let mut tx = db.begin().await?;

    let role = sqlx::query_scalar::<_, Role>("SELECT role FROM users WHERE id = $1")
        .bind(actor_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account not found".into()))?;
    check_booking_role(role)?;

    let team_id = check_team_choice(req.is_team, req.team)?;
    if let Some(team_id) = team_id {
        let allowed: bool = sqlx::query_scalar(
            "SELECT EXISTS (
               SELECT 1 FROM teams t
               LEFT JOIN team_members m ON m.team_id = t.id AND m.user_id = $2
               WHERE t.id = $1 AND (t.owner_id = $2 OR m.user_id IS NOT NULL))",
        )
        .bind(team_id)
        .bind(actor_id)
        .fetch_one(&mut *tx)
        .await?;
        if !allowed {
            return Err(AppError::BadRequest(TEAM_NOT_ALLOWED.into()));
        }
    }

    validate_slot(req.start_time, req.end_time, Utc::now())?;

    let stadium: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM stadiums WHERE id = $1 FOR UPDATE")
            .bind(req.stadium)
            .fetch_optional(&mut *tx)
            .await?;
    if stadium.is_none() {
        return Err(AppError::NotFound("Stadium not found".into()));
    }

    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS (
           SELECT 1 FROM bookings
           WHERE stadium_id = $1 AND start_time < $3 AND end_time > $2)",
    )
    .bind(req.stadium)
    .bind(req.start_time)
    .bind(req.end_time)
    .fetch_one(&mut *tx)
    .await?;
    if taken {
        return Err(AppError::BadRequest(SLOT_TAKEN.into()));
    }

    let booking = sqlx::query_as::<_, Booking>(
        "INSERT INTO bookings (id, user_id, stadium_id, team_id, start_time, end_time, is_paid, order_type)
         VALUES ($1, $2, $3, $4, $5, $6, false, $7)
         RETURNING id, user_id, stadium_id, team_id, start_time, end_time, is_paid, order_type, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(actor_id)
    .bind(req.stadium)
    .bind(team_id)
    .bind(req.start_time)
    .bind(req.end_time)
    .bind(req.order_type)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_slot_conflict)?;

    tx.commit().await?;
    Ok(booking)
}

// A unique violation on the exact slot triple can only surface if the stadium
// lock was bypassed; report it as the ordinary overlap rejection, not a 500.
fn map_slot_conflict(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some("uq_booking_slot") {
            return AppError::BadRequest(SLOT_TAKEN.into());
        }
    }
    AppError::Database(err)
}

/// Flips the paid flag and drops the owning owner's cached stats, so income
/// reflects the change on the next read instead of waiting out the TTL.
pub async fn set_payment_status(
    db: &PgPool,
    cache: &Cache,
    booking_id: Uuid,
    is_paid: bool,
) -> AppResult<(Uuid, bool)> {
    let updated: Option<(Uuid, bool, Uuid)> = sqlx::query_as(
        "UPDATE bookings b SET is_paid = $2, updated_at = NOW()
         FROM stadiums s
         WHERE b.id = $1 AND s.id = b.stadium_id
         RETURNING b.id, b.is_paid, s.owner_id",
    )
    .bind(booking_id)
    .bind(is_paid)
    .fetch_optional(db)
    .await?;

    let (id, paid, owner_id) =
        updated.ok_or_else(|| AppError::NotFound("Booking not found".into()))?;
    cache.del(&owner_stats_key(owner_id)).await;
    Ok((id, paid))
}

pub type OwnerBookingRow = (
    String,            // stadium name
    DateTime<Utc>,     // start
    DateTime<Utc>,     // end
    Option<String>,    // team name
    OrderType,
    bool,              // is_paid
);

/// Bookings across all stadiums the owner holds, with exact-match filters,
/// case-insensitive name search and whitelisted ordering.
pub async fn list_owner_bookings(
    db: &PgPool,
    owner_id: Uuid,
    query: &BookingListQuery,
) -> AppResult<(Vec<OwnerBookingRow>, i64)> {
    let filter = "FROM bookings b
         JOIN stadiums s ON s.id = b.stadium_id
         LEFT JOIN teams t ON t.id = b.team_id
         WHERE s.owner_id = $1
           AND ($2::text IS NULL OR s.name = $2)
           AND ($3::boolean IS NULL OR b.is_paid = $3)
           AND ($4::timestamptz IS NULL OR b.start_time = $4)
           AND ($5::timestamptz IS NULL OR b.end_time = $5)
           AND ($6::text IS NULL OR s.name ILIKE '%' || $6 || '%')";

    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {filter}"))
        .bind(owner_id)
        .bind(query.stadium_name.as_deref())
        .bind(query.is_paid)
        .bind(query.start_time)
        .bind(query.end_time)
        .bind(query.search.as_deref())
        .fetch_one(db)
        .await?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);
    let rows: Vec<OwnerBookingRow> = sqlx::query_as(&format!(
        "SELECT s.name, b.start_time, b.end_time, t.name, b.order_type, b.is_paid
         {filter}
         ORDER BY {order}
         LIMIT $7 OFFSET $8",
        order = order_clause(query.ordering.as_deref()),
    ))
    .bind(owner_id)
    .bind(query.stadium_name.as_deref())
    .bind(query.is_paid)
    .bind(query.start_time)
    .bind(query.end_time)
    .bind(query.search.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok((rows, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 1, hour, min, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        t(8, 0)
    }

    // Mirror of the half-open EXISTS predicate in create_booking: a booking
    // ending exactly when another starts does not conflict with it.
    fn overlaps(
        a_start: DateTime<Utc>,
        a_end: DateTime<Utc>,
        b_start: DateTime<Utc>,
        b_end: DateTime<Utc>,
    ) -> bool {
        a_start < b_end && a_end > b_start
    }

    fn msg(err: AppError) -> String {
        match err {
            AppError::BadRequest(m) => m,
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn accepts_whole_hour_future_slots() {
        assert!(validate_slot(t(10, 0), t(11, 0), now()).is_ok());
        assert!(validate_slot(t(10, 0), t(13, 0), now()).is_ok());
    }

    #[test]
    fn rejects_past_start() {
        let err = validate_slot(t(7, 0), t(9, 0), now()).unwrap_err();
        assert_eq!(msg(err), SLOT_TIME_INVALID);
    }

    #[test]
    fn rejects_reversed_range_before_duration() {
        // Reversed ranges also have a nonsense duration; the range message
        // must win.
        let err = validate_slot(t(12, 0), t(10, 0), now()).unwrap_err();
        assert_eq!(msg(err), SLOT_TIME_INVALID);
    }

    #[test]
    fn rejects_zero_length_slot() {
        let err = validate_slot(t(10, 0), t(10, 0), now()).unwrap_err();
        assert_eq!(msg(err), SLOT_TIME_INVALID);
    }

    #[test]
    fn rejects_half_hour_slot() {
        let err = validate_slot(t(10, 0), t(10, 30), now()).unwrap_err();
        assert_eq!(msg(err), SLOT_DURATION_INVALID);
    }

    #[test]
    fn rejects_ninety_minute_slot() {
        let err = validate_slot(t(10, 0), t(11, 30), now()).unwrap_err();
        assert_eq!(msg(err), SLOT_DURATION_INVALID);
    }

    #[test]
    fn half_open_overlap_semantics() {
        // 10:30-11:30 against 10:00-11:00 conflicts.
        assert!(overlaps(t(10, 30), t(11, 30), t(10, 0), t(11, 0)));
        // Contained and containing intervals conflict.
        assert!(overlaps(t(10, 0), t(13, 0), t(11, 0), t(12, 0)));
        assert!(overlaps(t(11, 0), t(12, 0), t(10, 0), t(13, 0)));
        // Identical intervals conflict.
        assert!(overlaps(t(10, 0), t(11, 0), t(10, 0), t(11, 0)));
    }

    #[test]
    fn touching_boundaries_do_not_overlap() {
        assert!(!overlaps(t(11, 0), t(12, 0), t(10, 0), t(11, 0)));
        assert!(!overlaps(t(9, 0), t(10, 0), t(10, 0), t(11, 0)));
    }

    #[test]
    fn disjoint_intervals_do_not_overlap() {
        assert!(!overlaps(t(13, 0), t(14, 0), t(10, 0), t(11, 0)));
    }

    #[test]
    fn admins_and_managers_cannot_book() {
        assert_eq!(msg(check_booking_role(Role::Admin).unwrap_err()), ROLE_CANNOT_BOOK);
        assert_eq!(msg(check_booking_role(Role::Manager).unwrap_err()), ROLE_CANNOT_BOOK);
        assert!(check_booking_role(Role::User).is_ok());
        assert!(check_booking_role(Role::Owner).is_ok());
    }

    #[test]
    fn team_flag_and_field_must_agree() {
        let team = Some(Uuid::new_v4());

        assert_eq!(msg(check_team_choice(true, None).unwrap_err()), TEAM_REQUIRED);
        assert_eq!(
            msg(check_team_choice(false, team).unwrap_err()),
            TEAM_FORBIDDEN_FOR_USER
        );
        assert_eq!(check_team_choice(false, None).unwrap(), None);
        assert_eq!(check_team_choice(true, team).unwrap(), team);
    }

    #[test]
    fn ordering_whitelist() {
        assert_eq!(order_clause(None), "b.start_time ASC");
        assert_eq!(order_clause(Some("start_time")), "b.start_time ASC");
        assert_eq!(order_clause(Some("end_time")), "b.end_time ASC");
        assert_eq!(order_clause(Some("-start_time")), "b.start_time DESC");
        assert_eq!(order_clause(Some("-end_time")), "b.end_time DESC");
        // Unknown fields fall back instead of erroring.
        assert_eq!(order_clause(Some("price_hour")), "b.start_time ASC");
    }
}
