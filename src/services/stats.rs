use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::Cache;
use crate::error::AppResult;
use crate::models::StadiumStats;

/// Cache key for one owner's aggregate. The payment-flip path drops this key
/// to keep income fresh; everything else waits out the TTL.
pub fn owner_stats_key(owner_id: Uuid) -> String {
    format!("stats:owner:{owner_id}")
}

/// Per-stadium aggregate for one owner. Bookings are counted whether paid or
/// not; income sums `price_hour` once per paid booking.
pub async fn owner_stats(
    db: &PgPool,
    cache: &Cache,
    owner_id: Uuid,
    ttl_secs: u64,
) -> AppResult<Vec<StadiumStats>> {
    let cache_key = owner_stats_key(owner_id);
    if let Some(cached) = cache.get_json::<Vec<StadiumStats>>(&cache_key).await {
        return Ok(cached);
    }

    // TODO: income ignores duration (a paid 3-hour booking contributes one
    // price_hour); confirm with product whether it should be hour-weighted.
    let stats = sqlx::query_as::<_, StadiumStats>(
        "SELECT s.id, s.name, s.price_hour,
                COUNT(b.id) AS total_bron_count,
                COALESCE(SUM(s.price_hour) FILTER (WHERE b.is_paid), 0) AS total_income
         FROM stadiums s
         LEFT JOIN bookings b ON b.stadium_id = s.id
         WHERE s.owner_id = $1
         GROUP BY s.id, s.name, s.price_hour
         ORDER BY s.name",
    )
    .bind(owner_id)
    .fetch_all(db)
    .await?;

    cache.set_json(&cache_key, &stats, ttl_secs).await;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_keys_are_scoped_per_owner() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(owner_stats_key(a), format!("stats:owner:{a}"));
        assert_ne!(owner_stats_key(a), owner_stats_key(b));
    }
}
