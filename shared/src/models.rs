//! Domain request/response payloads.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Payload for `POST /reserve`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReserveRequest {
    /// Name of the person making the reservation
    pub reservation_holder: String,
    /// Check-in date, loosely formatted
    pub checkin: String,
    /// Check-out date, loosely formatted
    pub checkout: String,
}

/// A stored reservation, also the `POST /reserve` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveResponse {
    /// Reservation id (the calendar event id)
    pub reserve_id: String,
    pub reservation_holder: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
}

/// Payload for `POST /is_vacancy`.
#[derive(Debug, Clone, Deserialize)]
pub struct IsVacancyRequest {
    pub checkin: String,
    pub checkout: String,
}

/// Payload for `POST /get_my_reservation`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetMyReservationRequest {
    pub reservation_holder: String,
}

/// Response for `POST /get_my_reservation`.
#[derive(Debug, Clone, Serialize)]
pub struct GetMyReservationResponse {
    pub reservations: Vec<ReserveResponse>,
}

/// What `POST /update_reservation` should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Update,
    Delete,
}

/// Payload for `POST /update_reservation`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateReservationRequest {
    pub update_type: UpdateType,
    pub reserve_id: String,
    /// New reservation details; required when `update_type` is `update`
    #[serde(default)]
    pub reserve_info: Option<ReserveRequest>,
}

/// Confirmation body returned after a delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteConfirmation {
    pub reserve_id: String,
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_type_parses_lowercase_values() {
        let request: UpdateReservationRequest = serde_json::from_str(
            r#"{"update_type":"delete","reserve_id":"ev1"}"#,
        )
        .unwrap();
        assert_eq!(request.update_type, UpdateType::Delete);
        assert!(request.reserve_info.is_none());
    }

    #[test]
    fn test_unknown_update_type_is_rejected() {
        let result: Result<UpdateReservationRequest, _> =
            serde_json::from_str(r#"{"update_type":"cancel","reserve_id":"ev1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reservation_dates_serialize_as_iso_dates() {
        let reservation = ReserveResponse {
            reserve_id: "ev1".to_string(),
            reservation_holder: "Alice".to_string(),
            checkin: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            checkout: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
        };
        let json = serde_json::to_value(&reservation).unwrap();
        assert_eq!(json["checkin"], "2024-05-01");
        assert_eq!(json["checkout"], "2024-05-03");
    }
}
