use crate::auth::auth::AuthUser;
use crate::error::AppError;
use crate::model::DateBounds;
use crate::service::AttendanceService;
use crate::store::RecordStore;
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct SummaryFilter {
    #[schema(example = "2025-10-01", format = "date", value_type = Option<String>)]
    /// Earliest date to include
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2025-10-31", format = "date", value_type = Option<String>)]
    /// Latest date to include
    pub end_date: Option<NaiveDate>,
    #[schema(example = 30)]
    /// Maximum rows, 30 by default, at most 100
    pub limit: Option<u32>,
}

/// Punch-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/punch_in",
    responses(
        (status = 200, description = "Punched in", body = AttendanceRecord),
        (status = 400, description = "Already punched in, or on leave today", body = Object, example = json!({
            "message": "Already punched in today",
            "code": "already_punched_in"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn punch_in<S: RecordStore>(
    auth: AuthUser,
    service: web::Data<AttendanceService<S>>,
) -> Result<HttpResponse, AppError> {
    let employee_id = auth.employee()?;
    let record = service.punch_in(employee_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Punch-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/punch_out",
    responses(
        (status = 200, description = "Punched out, worked time computed", body = AttendanceRecord),
        (status = 400, description = "Already punched out, or on leave today", body = Object, example = json!({
            "message": "Already punched out today",
            "code": "already_punched_out"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 404, description = "No punch-in found for today", body = Object, example = json!({
            "message": "No punch-in found for today",
            "code": "no_punch_in_found"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn punch_out<S: RecordStore>(
    auth: AuthUser,
    service: web::Data<AttendanceService<S>>,
) -> Result<HttpResponse, AppError> {
    let employee_id = auth.employee()?;
    let record = service.punch_out(employee_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Today's attendance. Days without a stored row come back with `id` 0.
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's attendance", body = AttendanceRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today<S: RecordStore>(
    auth: AuthUser,
    service: web::Data<AttendanceService<S>>,
) -> Result<HttpResponse, AppError> {
    let employee_id = auth.employee()?;
    let record = service.today(employee_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    get,
    path = "/api/attendance/summary",
    params(SummaryFilter),
    responses(
        (status = 200, description = "Stored attendance, newest first", body = [AttendanceRecord]),
        (status = 400, description = "start_date after end_date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn summary<S: RecordStore>(
    auth: AuthUser,
    service: web::Data<AttendanceService<S>>,
    query: web::Query<SummaryFilter>,
) -> Result<HttpResponse, AppError> {
    let employee_id = auth.employee()?;
    let bounds = DateBounds {
        from: query.start_date,
        to: query.end_date,
    };
    let records = service.summary(employee_id, bounds, query.limit).await?;
    Ok(HttpResponse::Ok().json(records))
}
