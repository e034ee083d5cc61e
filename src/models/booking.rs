use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment channel tag recorded on a booking. No processing happens here;
/// the backend only stores which provider the client intends to pay through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Click,
    Payme,
    #[default]
    Cash,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Click => "click",
            OrderType::Payme => "payme",
            OrderType::Cash => "cash",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stadium_id: Uuid,
    pub team_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_paid: bool,
    pub order_type: OrderType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub stadium: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub order_type: OrderType,
    pub is_team: bool,
    #[serde(default)]
    pub team: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentUpdateRequest {
    pub is_paid: bool,
}

/// Filters for the owner-facing booking list. Times are exact-match instants,
/// `search` is a case-insensitive stadium-name substring.
#[derive(Debug, Default, Deserialize)]
pub struct BookingListQuery {
    pub stadium_name: Option<String>,
    pub is_paid: Option<bool>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_type_defaults_to_cash() {
        let req: CreateBookingRequest = serde_json::from_value(serde_json::json!({
            "stadium": "7f1f2a4e-58be-4b63-9d3f-0a9c2b1de111",
            "start_time": "2030-05-01T10:00:00Z",
            "end_time": "2030-05-01T11:00:00Z",
            "is_team": false
        }))
        .unwrap();
        assert_eq!(req.order_type, OrderType::Cash);
        assert!(req.team.is_none());
    }

    #[test]
    fn order_type_parses_lowercase() {
        let req: CreateBookingRequest = serde_json::from_value(serde_json::json!({
            "stadium": "7f1f2a4e-58be-4b63-9d3f-0a9c2b1de111",
            "start_time": "2030-05-01T10:00:00Z",
            "end_time": "2030-05-01T12:00:00Z",
            "order_type": "payme",
            "is_team": false
        }))
        .unwrap();
        assert_eq!(req.order_type, OrderType::Payme);
    }

    #[test]
    fn is_team_is_required() {
        let res: Result<CreateBookingRequest, _> = serde_json::from_value(serde_json::json!({
            "stadium": "7f1f2a4e-58be-4b63-9d3f-0a9c2b1de111",
            "start_time": "2030-05-01T10:00:00Z",
            "end_time": "2030-05-01T11:00:00Z"
        }));
        assert!(res.is_err());
    }
}
