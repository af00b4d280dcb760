pub mod attendance;
pub mod leave;
pub mod reconcile;

pub use attendance::AttendanceService;
pub use leave::LeaveService;

use crate::error::AppError;
use crate::model::Role;

/// The authenticated user an operation acts on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub employee_id: Option<u64>,
    pub role: Role,
}

impl Actor {
    pub fn require_administrative(&self) -> Result<(), AppError> {
        if self.role.is_administrative() {
            Ok(())
        } else {
            Err(AppError::Forbidden("HR/Admin only"))
        }
    }

    pub fn employee(&self) -> Result<u64, AppError> {
        self.employee_id
            .ok_or(AppError::Forbidden("No employee profile"))
    }
}
