use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::{LeaveApplication, LeaveListing, LeaveQuery, LeaveStatus};
use crate::service::LeaveService;
use crate::store::RecordStore;
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

#[derive(Serialize, ToSchema)]
#[schema(example = json!({
    "data": [
        {
            "id": 1,
            "employee_id": 1000,
            "approved_by": null,
            "leave_type": "sick",
            "start_date": "2026-01-01",
            "end_date": "2026-01-03",
            "reason": "flu",
            "status": "Pending",
            "applied_on": "2025-12-30T10:00:00Z",
            "employee": "John Doe"
        }
    ],
    "page": 1,
    "per_page": 10,
    "total": 1
}))]
pub struct LeaveListResponse {
    pub data: Vec<LeaveListing>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    #[schema(example = 123)]
    /// Filter by employee ID
    pub employee_id: Option<u64>,
    #[schema(example = "Pending")]
    /// Filter by leave status
    pub status: Option<LeaveStatus>,
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u64>, // 1-based
    #[schema(example = 3)]
    /// Pagination per page number
    pub per_page: Option<u64>, // items per page
}

impl LeaveFilter {
    fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    fn per_page(&self) -> u64 {
        self.per_page.unwrap_or(10).clamp(1, 100)
    }

    fn to_query(&self) -> LeaveQuery {
        LeaveQuery {
            employee_id: self.employee_id,
            status: self.status,
            limit: self.per_page(),
            offset: (self.page() - 1).saturating_mul(self.per_page()),
        }
    }
}

/* =========================
Apply for leave
========================= */
/// Swagger doc for apply_leave endpoint
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = LeaveApplication,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Leave request submitted and days marked on leave",
         body = Object,
         example = json!({
            "message": "Leave request submitted",
            "leave_id": 1,
            "status": "Pending"
         })
        ),
        (status = 400, description = "Invalid range or overlapping leave", body = Object, example = json!({
            "message": "Leave overlaps an existing pending or approved request",
            "code": "overlapping_leave"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn apply_leave<S: RecordStore>(
    auth: AuthUser,
    service: web::Data<LeaveService<S>>,
    payload: web::Json<LeaveApplication>,
) -> Result<HttpResponse, AppError> {
    let employee_id = auth.employee()?;
    let leave = service
        .apply(employee_id, payload.into_inner(), Utc::now())
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Leave request submitted",
        "leave_id": leave.id,
        "status": leave.status,
    })))
}

/* =========================
Approve or reject (HR/Admin)
========================= */
/// Swagger doc for decide_leave endpoint
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/{action}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to decide"),
        ("action" = String, Path, description = "`approve` or `reject`")
    ),
    responses(
        (status = 200, description = "Leave decided", body = Object, example = json!({
            "message": "Leave approved successfully",
            "leave_id": 1
        })),
        (status = 400, description = "Invalid action or leave already decided", body = Object, example = json!({
            "message": "Leave request has already been decided",
            "code": "already_decided"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn decide_leave<S: RecordStore>(
    auth: AuthUser,
    service: web::Data<LeaveService<S>>,
    path: web::Path<(u64, String)>,
) -> Result<HttpResponse, AppError> {
    let (leave_id, action) = path.into_inner();
    let leave = service.decide(leave_id, &auth.actor(), &action).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Leave {} successfully", leave.status.as_ref().to_lowercase()),
        "leave_id": leave.id,
    })))
}

/// for getting a leave application details endpoint
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "message": "Leave request not found",
            "code": "leave_not_found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave<S: RecordStore>(
    auth: AuthUser,
    service: web::Data<LeaveService<S>>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let leave = service.get(path.into_inner(), &auth.actor()).await?;
    Ok(HttpResponse::Ok().json(leave))
}

/// for getting leave applications endpoint
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn leave_list<S: RecordStore>(
    auth: AuthUser,
    service: web::Data<LeaveService<S>>,
    query: web::Query<LeaveFilter>,
) -> Result<HttpResponse, AppError> {
    let (data, total) = service.list_all(&auth.actor(), &query.to_query()).await?;

    let response = LeaveListResponse {
        data,
        page: query.page(),
        per_page: query.per_page(),
        total,
    };

    Ok(HttpResponse::Ok().json(response))
}

/// The caller's own leave requests, latest first
#[utoipa::path(
    get,
    path = "/api/leave/my",
    responses(
        (status = 200, description = "Own leave requests, or a message when there are none", body = [LeaveRequest]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn my_leaves<S: RecordStore>(
    auth: AuthUser,
    service: web::Data<LeaveService<S>>,
) -> Result<HttpResponse, AppError> {
    let employee_id = auth.employee()?;
    let leaves = service.list_mine(employee_id).await?;

    if leaves.is_empty() {
        return Ok(HttpResponse::Ok().json(json!({ "message": "No leave records found." })));
    }
    Ok(HttpResponse::Ok().json(leaves))
}

/// Approved leave per employee for requests starting in the month
#[utoipa::path(
    get,
    path = "/api/leave/summary/{year}/{month}",
    params(
        ("year" = i32, Path, description = "Calendar year"),
        ("month" = u32, Path, description = "Month, 1 to 12")
    ),
    responses(
        (status = 200, description = "Per-employee totals, or a message when there are none", body = [MonthlyLeaveSummary]),
        (status = 400, description = "Month out of range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn monthly_summary<S: RecordStore>(
    auth: AuthUser,
    service: web::Data<LeaveService<S>>,
    path: web::Path<(i32, u32)>,
) -> Result<HttpResponse, AppError> {
    let (year, month) = path.into_inner();
    let summary = service.monthly_summary(&auth.actor(), year, month).await?;

    if summary.is_empty() {
        return Ok(HttpResponse::Ok().json(json!({ "message": "No leave data for this month." })));
    }
    Ok(HttpResponse::Ok().json(summary))
}
