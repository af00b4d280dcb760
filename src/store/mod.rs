//! Record store boundary for attendance, leave and employee rows.
//!
//! Reads that stand alone go through [`RecordStore`]. Every check-then-write
//! sequence runs inside a [`StoreTx`] obtained from [`RecordStore::begin`]:
//! the transaction is applied by [`StoreTx::commit`] and discarded when it is
//! dropped, so a failure half-way through a multi-row write leaves nothing
//! behind.

pub mod memory;
pub mod mysql;
pub mod policy;

use chrono::NaiveDate;
use thiserror::Error;

use crate::model::{
    AttendanceRecord, DateBounds, DateRange, LeaveListing, LeaveQuery, LeaveRequest, LeaveStatus,
    MonthlyLeaveSummary, NewLeave,
};

pub use memory::MemoryStore;
pub use mysql::MySqlStore;
pub use policy::StorePolicy;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store call `{0}` timed out")]
    Timeout(&'static str),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("row missing after write: {0}")]
    Missing(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Failures worth another attempt for an idempotent read.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout(_) | StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            StoreError::Corrupt(_) | StoreError::Missing(_) => false,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait RecordStore: 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn find_attendance(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Newest first, at most `limit` rows.
    async fn list_attendance(
        &self,
        employee_id: u64,
        bounds: DateBounds,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    async fn find_overlapping_leave(
        &self,
        employee_id: u64,
        range: DateRange,
        statuses: &[LeaveStatus],
    ) -> Result<Option<LeaveRequest>, StoreError>;

    async fn find_leave(&self, leave_id: u64) -> Result<Option<LeaveRequest>, StoreError>;

    /// All requests of one employee, latest start date first.
    async fn list_employee_leaves(&self, employee_id: u64)
    -> Result<Vec<LeaveRequest>, StoreError>;

    /// One page of requests joined with employee names, plus the total count
    /// matching the filter.
    async fn list_leaves(&self, query: &LeaveQuery)
    -> Result<(Vec<LeaveListing>, i64), StoreError>;

    /// Per-employee count and summed day-span of approved requests starting
    /// in the given month.
    async fn monthly_approved_leave_aggregates(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<MonthlyLeaveSummary>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait StoreTx {
    /// Serializes concurrent write transactions for the same employee.
    async fn lock_employee(&mut self, employee_id: u64) -> Result<(), StoreError>;

    async fn find_attendance(
        &mut self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Insert or update keyed by `(employee_id, date)`; `record.id` is ignored.
    async fn upsert_attendance(
        &mut self,
        record: &AttendanceRecord,
    ) -> Result<AttendanceRecord, StoreError>;

    async fn find_overlapping_leave(
        &mut self,
        employee_id: u64,
        range: DateRange,
        statuses: &[LeaveStatus],
    ) -> Result<Option<LeaveRequest>, StoreError>;

    async fn insert_leave(&mut self, leave: &NewLeave) -> Result<LeaveRequest, StoreError>;

    async fn find_leave(&mut self, leave_id: u64) -> Result<Option<LeaveRequest>, StoreError>;

    async fn update_leave_status(
        &mut self,
        leave_id: u64,
        status: LeaveStatus,
        approver_id: u64,
    ) -> Result<LeaveRequest, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
