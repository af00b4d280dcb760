pub mod attendance;
pub mod date_range;
pub mod employee;
pub mod leave_request;
pub mod role;

pub use attendance::{AttendanceRecord, AttendanceStatus, format_worked};
pub use date_range::{DateBounds, DateRange};
pub use employee::EmployeeRef;
pub use leave_request::{
    DecisionAction, LeaveApplication, LeaveListing, LeaveQuery, LeaveRequest, LeaveStatus, LeaveType,
    MonthlyLeaveSummary, NewLeave,
};
pub use role::Role;
