use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Worked-duration string of a day without punches.
pub const ZERO_WORKED: &str = "0h 0m";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
pub enum AttendanceStatus {
    #[serde(rename = "Not Punched In")]
    #[strum(serialize = "Not Punched In")]
    NotPunchedIn,
    #[serde(rename = "Present")]
    #[strum(serialize = "Present")]
    Present,
    #[serde(rename = "Absent")]
    #[strum(serialize = "Absent")]
    Absent,
    #[serde(rename = "On Leave")]
    #[strum(serialize = "On Leave")]
    OnLeave,
    // No transition reaches this yet.
    #[serde(rename = "Half Day")]
    #[strum(serialize = "Half Day")]
    HalfDay,
}

/// One employee-day of attendance.
///
/// `id` is `0` for records projected by a read that found nothing persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[schema(example = json!({
    "id": 42,
    "date": "2025-10-09",
    "login_time": "2025-10-09T09:00:00Z",
    "logout_time": "2025-10-09T17:30:45Z",
    "total_hours": "8h 30m",
    "status": "Present"
}))]
pub struct AttendanceRecord {
    pub id: u64,
    #[serde(skip_serializing)]
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub login_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub logout_time: Option<DateTime<Utc>>,
    pub total_hours: String,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    /// A record with no punches, not yet persisted.
    pub fn blank(employee_id: u64, date: NaiveDate, status: AttendanceStatus) -> Self {
        Self {
            id: 0,
            employee_id,
            date,
            login_time: None,
            logout_time: None,
            total_hours: ZERO_WORKED.to_string(),
            status,
        }
    }

    pub fn punched_in(employee_id: u64, at: DateTime<Utc>) -> Self {
        Self {
            login_time: Some(at),
            ..Self::blank(employee_id, at.date_naive(), AttendanceStatus::Present)
        }
    }

    /// Clears punches and marks the day as leave. Keeps `id` so the write is
    /// an update when the row already exists.
    pub fn mark_on_leave(&mut self) {
        self.login_time = None;
        self.logout_time = None;
        self.total_hours = ZERO_WORKED.to_string();
        self.status = AttendanceStatus::OnLeave;
    }
}

/// Formats `logout - login` as whole hours and minutes; seconds are dropped.
pub fn format_worked(login: DateTime<Utc>, logout: DateTime<Utc>) -> String {
    let seconds = (logout - login).num_seconds().max(0);
    format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn worked_duration_truncates_seconds() {
        let login = Utc.with_ymd_and_hms(2025, 10, 9, 9, 0, 0).unwrap();
        let logout = Utc.with_ymd_and_hms(2025, 10, 9, 17, 30, 45).unwrap();

        assert_eq!(format_worked(login, logout), "8h 30m");
    }

    #[test]
    fn worked_duration_never_negative() {
        let login = Utc.with_ymd_and_hms(2025, 10, 9, 9, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 10, 9, 8, 0, 0).unwrap();

        assert_eq!(format_worked(login, earlier), ZERO_WORKED);
    }

    #[test]
    fn status_strings_match_stored_values() {
        assert_eq!(AttendanceStatus::OnLeave.as_ref(), "On Leave");
        assert_eq!(
            AttendanceStatus::from_str("Not Punched In").unwrap(),
            AttendanceStatus::NotPunchedIn
        );
        assert_eq!(
            serde_json::to_value(AttendanceStatus::HalfDay).unwrap(),
            serde_json::json!("Half Day")
        );
    }

    #[test]
    fn mark_on_leave_clears_punches_but_keeps_identity() {
        let at = Utc.with_ymd_and_hms(2025, 10, 9, 9, 0, 0).unwrap();
        let mut record = AttendanceRecord::punched_in(7, at);
        record.id = 11;

        record.mark_on_leave();

        assert_eq!(record.id, 11);
        assert_eq!(record.login_time, None);
        assert_eq!(record.total_hours, ZERO_WORKED);
        assert_eq!(record.status, AttendanceStatus::OnLeave);
    }

    #[test]
    fn serialized_shape_hides_employee() {
        let record = AttendanceRecord::blank(
            3,
            NaiveDate::from_ymd_opt(2025, 10, 9).unwrap(),
            AttendanceStatus::NotPunchedIn,
        );
        let json = serde_json::to_value(&record).unwrap();

        assert!(json.get("employee_id").is_none());
        assert_eq!(json["status"], "Not Punched In");
        assert_eq!(json["total_hours"], "0h 0m");
    }
}
