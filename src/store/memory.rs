//! In-process record store with the same transactional contract as MySQL.
//!
//! A transaction holds the store lock from `begin` until it is committed or
//! dropped and works on a private copy of the state, so transactions are
//! serialized and an uncommitted one leaves no trace.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{RecordStore, StoreError, StoreTx};
use crate::model::{
    AttendanceRecord, DateBounds, DateRange, EmployeeRef, LeaveListing, LeaveQuery, LeaveRequest,
    LeaveStatus, MonthlyLeaveSummary, NewLeave,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    employees: BTreeMap<u64, EmployeeRef>,
    attendance: BTreeMap<(u64, NaiveDate), AttendanceRecord>,
    leaves: BTreeMap<u64, LeaveRequest>,
    last_attendance_id: u64,
    last_leave_id: u64,
}

impl MemoryState {
    fn overlapping_leave(
        &self,
        employee_id: u64,
        range: DateRange,
        statuses: &[LeaveStatus],
    ) -> Option<LeaveRequest> {
        self.leaves
            .values()
            .find(|l| {
                l.employee_id == employee_id
                    && statuses.contains(&l.status)
                    && l.range().overlaps(&range)
            })
            .cloned()
    }

    fn listing(&self, leave: &LeaveRequest) -> Option<LeaveListing> {
        self.employees.get(&leave.employee_id).map(|e| LeaveListing {
            leave: leave.clone(),
            employee: e.name.clone(),
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_writes_after: Arc<StdMutex<Option<usize>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_employee(&self, employee: EmployeeRef) {
        self.state.lock().await.employees.insert(employee.id, employee);
    }

    /// Writes an attendance row directly, outside any engine rules. Stands in
    /// for manual corrections made by other parts of the system.
    pub async fn put_attendance(&self, mut record: AttendanceRecord) -> AttendanceRecord {
        let mut state = self.state.lock().await;
        let key = (record.employee_id, record.date);
        record.id = match state.attendance.get(&key) {
            Some(existing) => existing.id,
            None => {
                state.last_attendance_id += 1;
                state.last_attendance_id
            }
        };
        state.attendance.insert(key, record.clone());
        record
    }

    pub async fn attendance_of(&self, employee_id: u64) -> Vec<AttendanceRecord> {
        self.state
            .lock()
            .await
            .attendance
            .values()
            .filter(|r| r.employee_id == employee_id)
            .cloned()
            .collect()
    }

    /// Every transaction begun after this call fails on its `n + 1`-th write.
    pub fn fail_writes_after(&self, n: usize) {
        *self
            .fail_writes_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(n);
    }

    pub fn clear_faults(&self) {
        *self
            .fail_writes_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl RecordStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        let writes_left = *self
            .fail_writes_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(MemoryTx {
            guard,
            work,
            writes_left,
        })
    }

    async fn find_attendance(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .attendance
            .get(&(employee_id, date))
            .cloned())
    }

    async fn list_attendance(
        &self,
        employee_id: u64,
        bounds: DateBounds,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .attendance
            .values()
            .rev()
            .filter(|r| r.employee_id == employee_id && bounds.contains(r.date))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn find_overlapping_leave(
        &self,
        employee_id: u64,
        range: DateRange,
        statuses: &[LeaveStatus],
    ) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .overlapping_leave(employee_id, range, statuses))
    }

    async fn find_leave(&self, leave_id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self.state.lock().await.leaves.get(&leave_id).cloned())
    }

    async fn list_employee_leaves(
        &self,
        employee_id: u64,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let state = self.state.lock().await;
        let mut leaves: Vec<_> = state
            .leaves
            .values()
            .filter(|l| l.employee_id == employee_id)
            .cloned()
            .collect();
        leaves.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
        Ok(leaves)
    }

    async fn list_leaves(
        &self,
        query: &LeaveQuery,
    ) -> Result<(Vec<LeaveListing>, i64), StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<LeaveListing> = state
            .leaves
            .values()
            .filter(|l| query.employee_id.is_none_or(|id| l.employee_id == id))
            .filter(|l| query.status.is_none_or(|s| l.status == s))
            .filter_map(|l| state.listing(l))
            .collect();
        matching.sort_by(|a, b| {
            b.leave
                .start_date
                .cmp(&a.leave.start_date)
                .then(b.leave.id.cmp(&a.leave.id))
        });

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn monthly_approved_leave_aggregates(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<MonthlyLeaveSummary>, StoreError> {
        let state = self.state.lock().await;
        let mut by_employee: BTreeMap<u64, MonthlyLeaveSummary> = BTreeMap::new();

        for leave in state.leaves.values() {
            if leave.status != LeaveStatus::Approved || !leave.range().starts_in_month(year, month)
            {
                continue;
            }
            let Some(employee) = state.employees.get(&leave.employee_id) else {
                continue;
            };
            let entry = by_employee
                .entry(employee.id)
                .or_insert_with(|| MonthlyLeaveSummary {
                    employee_id: employee.id,
                    employee: employee.name.clone(),
                    leaves_taken: 0,
                    total_days: 0,
                });
            entry.leaves_taken += 1;
            entry.total_days += leave.range().span_days();
        }

        Ok(by_employee.into_values().collect())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    writes_left: Option<usize>,
}

impl MemoryTx {
    fn spend_write(&mut self, op: &'static str) -> Result<(), StoreError> {
        match self.writes_left.as_mut() {
            Some(0) => Err(StoreError::Unavailable(format!("injected failure in {op}"))),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl StoreTx for MemoryTx {
    async fn lock_employee(&mut self, _employee_id: u64) -> Result<(), StoreError> {
        // The whole store is already held by this transaction.
        Ok(())
    }

    async fn find_attendance(
        &mut self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.work.attendance.get(&(employee_id, date)).cloned())
    }

    async fn upsert_attendance(
        &mut self,
        record: &AttendanceRecord,
    ) -> Result<AttendanceRecord, StoreError> {
        self.spend_write("upsert_attendance")?;
        let key = (record.employee_id, record.date);
        let id = match self.work.attendance.get(&key) {
            Some(existing) => existing.id,
            None => {
                self.work.last_attendance_id += 1;
                self.work.last_attendance_id
            }
        };
        let stored = AttendanceRecord {
            id,
            ..record.clone()
        };
        self.work.attendance.insert(key, stored.clone());
        Ok(stored)
    }

    async fn find_overlapping_leave(
        &mut self,
        employee_id: u64,
        range: DateRange,
        statuses: &[LeaveStatus],
    ) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self.work.overlapping_leave(employee_id, range, statuses))
    }

    async fn insert_leave(&mut self, leave: &NewLeave) -> Result<LeaveRequest, StoreError> {
        self.spend_write("insert_leave")?;
        self.work.last_leave_id += 1;
        let stored = LeaveRequest {
            id: self.work.last_leave_id,
            employee_id: leave.employee_id,
            approved_by: None,
            leave_type: leave.leave_type,
            start_date: leave.range.start,
            end_date: leave.range.end,
            reason: leave.reason.clone(),
            status: LeaveStatus::Pending,
            applied_on: leave.applied_on,
        };
        self.work.leaves.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_leave(&mut self, leave_id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self.work.leaves.get(&leave_id).cloned())
    }

    async fn update_leave_status(
        &mut self,
        leave_id: u64,
        status: LeaveStatus,
        approver_id: u64,
    ) -> Result<LeaveRequest, StoreError> {
        self.spend_write("update_leave_status")?;
        let leave = self
            .work
            .leaves
            .get_mut(&leave_id)
            .ok_or(StoreError::Missing("leave_requests"))?;
        leave.status = status;
        leave.approved_by = Some(approver_id);
        Ok(leave.clone())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        *self.guard = self.work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceStatus, LeaveType};
    use chrono::{TimeZone, Utc};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
    }

    fn new_leave(employee_id: u64, start: u32, end: u32) -> NewLeave {
        NewLeave {
            employee_id,
            leave_type: LeaveType::Annual,
            range: DateRange::new(d(start), d(end)).unwrap(),
            reason: None,
            applied_on: Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_leave(&new_leave(1, 10, 12)).await.unwrap();
        }

        assert!(store.find_leave(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_upsert_keeps_one_row_per_day() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let first = tx
            .upsert_attendance(&AttendanceRecord::blank(1, d(10), AttendanceStatus::Present))
            .await
            .unwrap();
        let second = tx
            .upsert_attendance(&AttendanceRecord::blank(1, d(10), AttendanceStatus::OnLeave))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.id, second.id);
        let rows = store.attendance_of(1).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttendanceStatus::OnLeave);
    }

    #[tokio::test]
    async fn injected_fault_fails_the_nth_write() {
        let store = MemoryStore::new();
        store.fail_writes_after(1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_leave(&new_leave(1, 10, 12)).await.unwrap();
        let err = tx
            .upsert_attendance(&AttendanceRecord::blank(1, d(10), AttendanceStatus::OnLeave))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn listing_skips_unknown_employees_and_pages() {
        let store = MemoryStore::new();
        store.add_employee(EmployeeRef::new(1, "Ada", Some("Lovelace"))).await;
        let mut tx = store.begin().await.unwrap();
        tx.insert_leave(&new_leave(1, 1, 2)).await.unwrap();
        tx.insert_leave(&new_leave(1, 5, 6)).await.unwrap();
        tx.insert_leave(&new_leave(9, 5, 6)).await.unwrap();
        tx.commit().await.unwrap();

        let query = LeaveQuery {
            limit: 1,
            ..LeaveQuery::default()
        };
        let (page, total) = store.list_leaves(&query).await.unwrap();

        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].leave.start_date, d(5));
        assert_eq!(page[0].employee, "Ada Lovelace");
    }
}
