use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stadium {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub price_hour: Decimal,
    pub owner_id: Uuid,
    pub manager_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create payload. `owner` is only honoured for admins; owners always become
/// the owner of what they create and must omit it.
#[derive(Debug, Deserialize)]
pub struct CreateStadiumRequest {
    pub name: String,
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub description: Option<String>,
    pub price_hour: Decimal,
    pub owner: Option<Uuid>,
    pub manager: Option<Uuid>,
    pub is_active: Option<bool>,
}

/// Partial update. `manager` distinguishes an absent field (keep the current
/// manager) from an explicit null (clear it), hence the nested Option.
#[derive(Debug, Deserialize)]
pub struct UpdateStadiumRequest {
    pub name: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub description: Option<String>,
    pub price_hour: Option<Decimal>,
    pub owner: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    pub manager: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
}

fn double_option<'de, D>(de: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(de).map(Some)
}

/// One row of the owner statistics aggregate. Deserialize is needed for the
/// cache round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StadiumStats {
    pub id: Uuid,
    pub name: String,
    pub price_hour: Decimal,
    pub total_bron_count: i64,
    pub total_income: Decimal,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatusCounts {
    pub total_stadiums: i64,
    pub active_stadiums: i64,
    pub inactive_stadiums: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_manager_keeps_clears_or_sets() {
        let keep: UpdateStadiumRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(keep.manager, None);

        let clear: UpdateStadiumRequest = serde_json::from_str(r#"{"manager": null}"#).unwrap();
        assert_eq!(clear.manager, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateStadiumRequest =
            serde_json::from_str(&format!(r#"{{"manager": "{id}"}}"#)).unwrap();
        assert_eq!(set.manager, Some(Some(id)));
    }
}
