//! Keeps daily attendance rows in line with leave requests.
//!
//! Both functions run inside the caller's transaction and only write rows
//! that are not already in the target state, so running them twice over the
//! same range is harmless.

use crate::model::{AttendanceRecord, AttendanceStatus, DateRange};
use crate::store::{StoreError, StoreTx};

/// Sets every day of `range` to `OnLeave` with punches cleared. Returns the
/// number of rows written.
pub async fn mark_range_on_leave<T: StoreTx>(
    tx: &mut T,
    employee_id: u64,
    range: DateRange,
) -> Result<usize, StoreError> {
    let mut written = 0;
    for day in range.days() {
        let record = match tx.find_attendance(employee_id, day).await? {
            Some(existing) if is_clean_leave_day(&existing) => continue,
            Some(mut existing) => {
                existing.mark_on_leave();
                existing
            }
            None => AttendanceRecord::blank(employee_id, day, AttendanceStatus::OnLeave),
        };
        tx.upsert_attendance(&record).await?;
        written += 1;
    }
    Ok(written)
}

/// Turns `OnLeave` days of `range` into `Absent`. Days in any other state
/// are left alone. Returns the number of rows written.
pub async fn revert_range_after_rejection<T: StoreTx>(
    tx: &mut T,
    employee_id: u64,
    range: DateRange,
) -> Result<usize, StoreError> {
    let mut written = 0;
    for day in range.days() {
        let Some(mut record) = tx.find_attendance(employee_id, day).await? else {
            continue;
        };
        if record.status != AttendanceStatus::OnLeave {
            continue;
        }
        record.status = AttendanceStatus::Absent;
        tx.upsert_attendance(&record).await?;
        written += 1;
    }
    Ok(written)
}

fn is_clean_leave_day(record: &AttendanceRecord) -> bool {
    record.status == AttendanceStatus::OnLeave
        && record.login_time.is_none()
        && record.logout_time.is_none()
}
