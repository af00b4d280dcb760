use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Every way an attendance or leave operation can be refused.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("start date cannot be after end date")]
    InvalidRange,
    #[error("month must be between 1 and 12")]
    InvalidMonth,
    #[error("invalid action `{0}`, expected approve or reject")]
    InvalidAction(String),

    #[error("You are on leave today")]
    AlreadyOnLeave,
    #[error("Already punched in today")]
    AlreadyPunchedIn,
    #[error("Cannot punch out, today is covered by leave")]
    OnLeaveConflict,
    #[error("Already punched out today")]
    AlreadyPunchedOut,
    #[error("Cannot punch out while marked on leave")]
    CannotPunchOutOnLeave,
    #[error("Leave overlaps an existing pending or approved request")]
    OverlappingLeave,
    #[error("Leave request has already been decided")]
    AlreadyDecided,

    #[error("No punch-in found for today")]
    NoPunchInFound,
    #[error("Leave request not found")]
    LeaveNotFound,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn store_failure(&self) -> Option<&StoreError> {
        match self {
            AppError::Store(err) => Some(err),
            _ => None,
        }
    }

    /// Stable machine-readable kind for clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRange => "invalid_range",
            AppError::InvalidMonth => "invalid_month",
            AppError::InvalidAction(_) => "invalid_action",
            AppError::AlreadyOnLeave => "already_on_leave",
            AppError::AlreadyPunchedIn => "already_punched_in",
            AppError::OnLeaveConflict => "on_leave_conflict",
            AppError::AlreadyPunchedOut => "already_punched_out",
            AppError::CannotPunchOutOnLeave => "cannot_punch_out_on_leave",
            AppError::OverlappingLeave => "overlapping_leave",
            AppError::AlreadyDecided => "already_decided",
            AppError::NoPunchInFound => "no_punch_in_found",
            AppError::LeaveNotFound => "leave_not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::Store(StoreError::Timeout(_)) => "store_timeout",
            AppError::Store(_) => "store_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NoPunchInFound | AppError::LeaveNotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Store(StoreError::Timeout(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Store details stay in the logs.
        let message = match self {
            AppError::Store(StoreError::Timeout(_)) => "Service temporarily unavailable".to_string(),
            AppError::Store(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({
            "message": message,
            "code": self.code(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn kinds_map_to_conventional_statuses() {
        assert_eq!(AppError::InvalidRange.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::OverlappingLeave.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::LeaveNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NoPunchInFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden("HR/Admin only").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Store(StoreError::Timeout("begin")).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Store(StoreError::Corrupt("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn store_details_are_not_leaked() {
        let resp = AppError::Store(StoreError::Corrupt("status = \"??\"".into())).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["message"], "Internal Server Error");
        assert_eq!(value["code"], "store_error");
    }
}
