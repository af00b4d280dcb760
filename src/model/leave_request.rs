use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::date_range::DateRange;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    /// Statuses that hold a date range against new applications and punches.
    pub const BLOCKING: [LeaveStatus; 2] = [LeaveStatus::Pending, LeaveStatus::Approved];
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveType {
    Annual,
    Sick,
    Unpaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DecisionAction {
    Approve,
    Reject,
}

impl DecisionAction {
    pub fn resulting_status(self) -> LeaveStatus {
        match self {
            DecisionAction::Approve => LeaveStatus::Approved,
            DecisionAction::Reject => LeaveStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "employee_id": 1000,
    "approved_by": null,
    "leave_type": "sick",
    "start_date": "2026-01-01",
    "end_date": "2026-01-03",
    "reason": "flu",
    "status": "Pending",
    "applied_on": "2025-12-30T10:00:00Z"
}))]
pub struct LeaveRequest {
    pub id: u64,
    pub employee_id: u64,
    pub approved_by: Option<u64>,
    pub leave_type: LeaveType,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    pub status: LeaveStatus,
    #[schema(value_type = String, format = "date-time")]
    pub applied_on: DateTime<Utc>,
}

impl LeaveRequest {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

/// What an employee submits when applying for leave.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LeaveApplication {
    #[schema(example = "sick")]
    pub leave_type: LeaveType,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "flu")]
    pub reason: Option<String>,
}

/// Insert payload for a fresh, pending request.
#[derive(Debug, Clone)]
pub struct NewLeave {
    pub employee_id: u64,
    pub leave_type: LeaveType,
    pub range: DateRange,
    pub reason: Option<String>,
    pub applied_on: DateTime<Utc>,
}

/// Leave joined with the owning employee's display name.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaveListing {
    #[serde(flatten)]
    pub leave: LeaveRequest,
    #[schema(example = "John Doe")]
    pub employee: String,
}

#[derive(Debug, Clone, Default)]
pub struct LeaveQuery {
    pub employee_id: Option<u64>,
    pub status: Option<LeaveStatus>,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MonthlyLeaveSummary {
    pub employee_id: u64,
    #[schema(example = "John Doe")]
    pub employee: String,
    #[schema(example = 2)]
    pub leaves_taken: i64,
    #[schema(example = 5)]
    pub total_days: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn only_pending_and_approved_block() {
        assert!(LeaveStatus::BLOCKING.contains(&LeaveStatus::Pending));
        assert!(LeaveStatus::BLOCKING.contains(&LeaveStatus::Approved));
        assert!(!LeaveStatus::BLOCKING.contains(&LeaveStatus::Rejected));
    }

    #[test]
    fn decision_actions_parse_lowercase_only() {
        assert_eq!(DecisionAction::from_str("approve").unwrap(), DecisionAction::Approve);
        assert_eq!(DecisionAction::from_str("reject").unwrap(), DecisionAction::Reject);
        assert!(DecisionAction::from_str("cancel").is_err());
        assert_eq!(DecisionAction::Reject.resulting_status(), LeaveStatus::Rejected);
    }

    #[test]
    fn leave_type_wire_format_is_lowercase() {
        assert_eq!(serde_json::to_value(LeaveType::Sick).unwrap(), "sick");
        assert_eq!(LeaveType::from_str("annual").unwrap(), LeaveType::Annual);
        assert_eq!(LeaveStatus::Approved.as_ref(), "Approved");
    }
}
