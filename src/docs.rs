use crate::api::attendance::SummaryFilter;
use crate::api::leave_request::{LeaveFilter, LeaveListResponse};
use crate::model::{
    AttendanceRecord, AttendanceStatus, LeaveApplication, LeaveListing, LeaveRequest, LeaveStatus,
    LeaveType, MonthlyLeaveSummary,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "WorkTrack API",
        version = "1.0.0",
        description = r#"
## Attendance, leave and live activity

This API keeps each employee's **daily attendance**, **leave requests** and
**live activity stream** consistent with one another.

### 🔹 Key Features
- **Attendance**
  - Punch in and out once per day, see today's state and recent history
- **Leave Management**
  - Apply for leave, approve/reject requests, monthly approved-leave totals
  - Applying marks every day of the range as *On Leave*; rejecting turns those days *Absent*
- **Realtime**
  - `GET /realtime/ws?token=...` streams JSON activity frames between clients

### 🔐 Security
Endpoints under `/api` are protected using **JWT Bearer authentication**.
Only **Admin** or **HR** can decide leave or read organisation-wide data.

### 📦 Response Format
- JSON-based RESTful responses
- Errors carry `message` and a machine-readable `code`

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::punch_in,
        crate::api::attendance::punch_out,
        crate::api::attendance::today,
        crate::api::attendance::summary,

        crate::api::leave_request::apply_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::my_leaves,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::decide_leave,
        crate::api::leave_request::monthly_summary,

        crate::realtime::ws::realtime_ws
    ),
    components(
        schemas(
            AttendanceRecord,
            AttendanceStatus,
            SummaryFilter,
            LeaveApplication,
            LeaveRequest,
            LeaveStatus,
            LeaveType,
            LeaveListing,
            LeaveFilter,
            LeaveListResponse,
            MonthlyLeaveSummary
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Punch in/out and attendance history"),
        (name = "Leave", description = "Leave management APIs"),
        (name = "Realtime", description = "Live activity streaming"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();

        for expected in [
            "/api/attendance/punch_in",
            "/api/attendance/punch_out",
            "/api/attendance/today",
            "/api/attendance/summary",
            "/api/leave",
            "/api/leave/my",
            "/api/leave/{leave_id}",
            "/api/leave/{leave_id}/{action}",
            "/api/leave/summary/{year}/{month}",
            "/realtime/ws",
        ] {
            assert!(paths.iter().any(|p| p == expected), "missing {expected}");
        }
        assert!(doc.components.unwrap().security_schemes.contains_key("bearer_auth"));
    }
}
