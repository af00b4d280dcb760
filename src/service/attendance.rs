use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::model::{
    AttendanceRecord, AttendanceStatus, DateBounds, DateRange, LeaveStatus, format_worked,
};
use crate::store::{RecordStore, StoreTx};

pub const DEFAULT_SUMMARY_LIMIT: u32 = 30;
pub const MAX_SUMMARY_LIMIT: u32 = 100;

/// Daily punch state machine. "Today" is the UTC calendar date of `now`.
///
/// A blocking leave covering today is checked before the attendance row: leave
/// always wins over whatever the row says.
pub struct AttendanceService<S> {
    store: Arc<S>,
}

impl<S> Clone for AttendanceService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RecordStore> AttendanceService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn punch_in(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        self.try_punch_in(employee_id, now).await.inspect_err(|e| {
            if let Some(err) = e.store_failure() {
                error!(employee_id, error = %err, "Punch-in failed");
            }
        })
    }

    async fn try_punch_in(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        let today = now.date_naive();
        let mut tx = self.store.begin().await?;
        tx.lock_employee(employee_id).await?;

        if tx
            .find_overlapping_leave(employee_id, DateRange::single(today), &LeaveStatus::BLOCKING)
            .await?
            .is_some()
        {
            debug!(employee_id, %today, "Punch-in refused, leave covers today");
            return Err(AppError::AlreadyOnLeave);
        }

        if let Some(existing) = tx.find_attendance(employee_id, today).await? {
            match existing.status {
                AttendanceStatus::OnLeave => return Err(AppError::AlreadyOnLeave),
                // Absence left behind by a rejected leave can still be worked.
                AttendanceStatus::Absent if existing.login_time.is_none() => {}
                _ => return Err(AppError::AlreadyPunchedIn),
            }
        }

        let record = tx
            .upsert_attendance(&AttendanceRecord::punched_in(employee_id, now))
            .await?;
        tx.commit().await?;

        info!(employee_id, %today, "Punched in");
        Ok(record)
    }

    pub async fn punch_out(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        self.try_punch_out(employee_id, now).await.inspect_err(|e| {
            if let Some(err) = e.store_failure() {
                error!(employee_id, error = %err, "Punch-out failed");
            }
        })
    }

    async fn try_punch_out(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        let today = now.date_naive();
        let mut tx = self.store.begin().await?;
        tx.lock_employee(employee_id).await?;

        if tx
            .find_overlapping_leave(employee_id, DateRange::single(today), &LeaveStatus::BLOCKING)
            .await?
            .is_some()
        {
            debug!(employee_id, %today, "Punch-out refused, leave covers today");
            return Err(AppError::OnLeaveConflict);
        }

        let mut record = tx
            .find_attendance(employee_id, today)
            .await?
            .ok_or(AppError::NoPunchInFound)?;
        if record.logout_time.is_some() {
            return Err(AppError::AlreadyPunchedOut);
        }
        if record.status == AttendanceStatus::OnLeave {
            return Err(AppError::CannotPunchOutOnLeave);
        }
        let login = record.login_time.ok_or(AppError::NoPunchInFound)?;

        record.logout_time = Some(now);
        record.total_hours = format_worked(login, now);
        record.status = AttendanceStatus::Present;
        let record = tx.upsert_attendance(&record).await?;
        tx.commit().await?;

        info!(employee_id, %today, worked = %record.total_hours, "Punched out");
        Ok(record)
    }

    /// Today's row, or a projection of it when nothing is stored yet. Never
    /// writes.
    pub async fn today(
        &self,
        employee_id: u64,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        let today = now.date_naive();
        if let Some(record) = self.store.find_attendance(employee_id, today).await? {
            return Ok(record);
        }

        let on_leave = self
            .store
            .find_overlapping_leave(employee_id, DateRange::single(today), &LeaveStatus::BLOCKING)
            .await?
            .is_some();
        let status = if on_leave {
            AttendanceStatus::OnLeave
        } else {
            AttendanceStatus::NotPunchedIn
        };
        Ok(AttendanceRecord::blank(employee_id, today, status))
    }

    /// Stored rows only, newest first.
    pub async fn summary(
        &self,
        employee_id: u64,
        bounds: DateBounds,
        limit: Option<u32>,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        if bounds.is_inverted() {
            return Err(AppError::InvalidRange);
        }
        let limit = limit
            .unwrap_or(DEFAULT_SUMMARY_LIMIT)
            .clamp(1, MAX_SUMMARY_LIMIT);
        Ok(self
            .store
            .list_attendance(employee_id, bounds, limit)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LeaveType, NewLeave};
    use crate::store::{MemoryStore, StoreError};
    use chrono::{NaiveDate, TimeZone};

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, day, h, m, s).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
    }

    fn service() -> (Arc<MemoryStore>, AttendanceService<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Arc::clone(&store), AttendanceService::new(store))
    }

    async fn pending_leave(store: &MemoryStore, employee_id: u64, start: u32, end: u32) {
        let mut tx = store.begin().await.unwrap();
        tx.insert_leave(&NewLeave {
            employee_id,
            leave_type: LeaveType::Sick,
            range: DateRange::new(d(start), d(end)).unwrap(),
            reason: None,
            applied_on: at(1, 8, 0, 0),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn punch_in_twice_is_rejected() {
        let (_, svc) = service();
        let first = svc.punch_in(7, at(9, 9, 0, 0)).await.unwrap();
        assert_eq!(first.status, AttendanceStatus::Present);

        let err = svc.punch_in(7, at(9, 9, 5, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyPunchedIn));
    }

    #[tokio::test]
    async fn punch_out_computes_truncated_duration() {
        let (_, svc) = service();
        svc.punch_in(7, at(9, 9, 0, 0)).await.unwrap();

        let record = svc.punch_out(7, at(9, 17, 30, 45)).await.unwrap();

        assert_eq!(record.total_hours, "8h 30m");
        assert_eq!(record.logout_time, Some(at(9, 17, 30, 45)));
        assert_eq!(record.status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn punch_out_without_punch_in_is_not_found() {
        let (_, svc) = service();
        let err = svc.punch_out(7, at(9, 17, 0, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::NoPunchInFound));
    }

    #[tokio::test]
    async fn second_punch_out_is_rejected() {
        let (_, svc) = service();
        svc.punch_in(7, at(9, 9, 0, 0)).await.unwrap();
        svc.punch_out(7, at(9, 17, 0, 0)).await.unwrap();

        let err = svc.punch_out(7, at(9, 18, 0, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyPunchedOut));
    }

    #[tokio::test]
    async fn leave_blocks_punching_even_without_a_row() {
        let (store, svc) = service();
        pending_leave(&store, 7, 9, 10).await;

        assert!(matches!(
            svc.punch_in(7, at(9, 9, 0, 0)).await.unwrap_err(),
            AppError::AlreadyOnLeave
        ));
        assert!(matches!(
            svc.punch_out(7, at(9, 17, 0, 0)).await.unwrap_err(),
            AppError::OnLeaveConflict
        ));
        assert!(store.attendance_of(7).await.is_empty());
    }

    #[tokio::test]
    async fn leave_takes_precedence_over_an_open_punch() {
        let (store, svc) = service();
        svc.punch_in(7, at(9, 9, 0, 0)).await.unwrap();
        pending_leave(&store, 7, 9, 9).await;

        let err = svc.punch_out(7, at(9, 17, 0, 0)).await.unwrap_err();
        assert!(matches!(err, AppError::OnLeaveConflict));
    }

    #[tokio::test]
    async fn on_leave_row_without_blocking_leave_cannot_punch_out() {
        let (store, svc) = service();
        store
            .put_attendance(AttendanceRecord::blank(7, d(9), AttendanceStatus::OnLeave))
            .await;

        assert!(matches!(
            svc.punch_in(7, at(9, 9, 0, 0)).await.unwrap_err(),
            AppError::AlreadyOnLeave
        ));
        assert!(matches!(
            svc.punch_out(7, at(9, 17, 0, 0)).await.unwrap_err(),
            AppError::CannotPunchOutOnLeave
        ));
    }

    #[tokio::test]
    async fn absence_from_rejected_leave_can_be_worked() {
        let (store, svc) = service();
        let absent = store
            .put_attendance(AttendanceRecord::blank(7, d(9), AttendanceStatus::Absent))
            .await;

        let record = svc.punch_in(7, at(9, 10, 0, 0)).await.unwrap();

        assert_eq!(record.id, absent.id);
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(store.attendance_of(7).await.len(), 1);
    }

    #[tokio::test]
    async fn today_projects_without_writing() {
        let (store, svc) = service();
        let none = svc.today(7, at(9, 8, 0, 0)).await.unwrap();
        assert_eq!(none.id, 0);
        assert_eq!(none.status, AttendanceStatus::NotPunchedIn);

        pending_leave(&store, 7, 9, 9).await;
        let leave = svc.today(7, at(9, 8, 0, 0)).await.unwrap();
        assert_eq!(leave.status, AttendanceStatus::OnLeave);
        assert_eq!(leave.total_hours, "0h 0m");

        assert!(store.attendance_of(7).await.is_empty());
    }

    #[tokio::test]
    async fn summary_is_newest_first_and_bounded() {
        let (store, svc) = service();
        for day in 1..=5 {
            store
                .put_attendance(AttendanceRecord::punched_in(7, at(day, 9, 0, 0)))
                .await;
        }

        let rows = svc.summary(7, DateBounds::default(), Some(2)).await.unwrap();
        let dates: Vec<_> = rows.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(5), d(4)]);

        let bounded = DateBounds {
            from: Some(d(2)),
            to: Some(d(3)),
        };
        assert_eq!(svc.summary(7, bounded, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn summary_rejects_inverted_bounds() {
        let (_, svc) = service();
        let bounds = DateBounds {
            from: Some(d(5)),
            to: Some(d(1)),
        };
        assert!(matches!(
            svc.summary(7, bounds, None).await.unwrap_err(),
            AppError::InvalidRange
        ));
    }

    #[tokio::test]
    async fn failed_write_leaves_no_row() {
        let (store, svc) = service();
        store.fail_writes_after(0);

        let err = svc.punch_in(7, at(9, 9, 0, 0)).await.unwrap_err();

        assert!(matches!(err, AppError::Store(StoreError::Unavailable(_))));
        assert!(store.attendance_of(7).await.is_empty());
    }
}
