use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::mysql::MySqlArguments;
use sqlx::query::QueryAs;
use sqlx::{Executor, FromRow, MySql, MySqlPool, Transaction};
use tracing::debug;

use super::{RecordStore, StoreError, StorePolicy, StoreTx};
use crate::model::{
    AttendanceRecord, DateBounds, DateRange, LeaveListing, LeaveQuery, LeaveRequest, LeaveStatus,
    LeaveType, MonthlyLeaveSummary, NewLeave,
};

const ATTENDANCE_COLUMNS: &str =
    "id, employee_id, date, login_time, logout_time, total_hours, status";

const LEAVE_COLUMNS: &str = "l.id, l.employee_id, l.approved_by, l.leave_type, l.start_date, \
     l.end_date, l.reason, l.status, l.applied_on";

const EMPLOYEE_NAME: &str = "TRIM(CONCAT(e.first_name, ' ', COALESCE(e.last_name, '')))";

#[derive(FromRow)]
struct AttendanceRow {
    id: u64,
    employee_id: u64,
    date: NaiveDate,
    login_time: Option<DateTime<Utc>>,
    logout_time: Option<DateTime<Utc>>,
    total_hours: String,
    status: String,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(AttendanceRecord {
            id: row.id,
            employee_id: row.employee_id,
            date: row.date,
            login_time: row.login_time,
            logout_time: row.logout_time,
            total_hours: row.total_hours,
            status: parse_column("attendance.status", &row.status)?,
        })
    }
}

#[derive(FromRow)]
struct LeaveRow {
    id: u64,
    employee_id: u64,
    approved_by: Option<u64>,
    leave_type: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    reason: Option<String>,
    status: String,
    applied_on: DateTime<Utc>,
}

impl TryFrom<LeaveRow> for LeaveRequest {
    type Error = StoreError;

    fn try_from(row: LeaveRow) -> Result<Self, Self::Error> {
        Ok(LeaveRequest {
            id: row.id,
            employee_id: row.employee_id,
            approved_by: row.approved_by,
            leave_type: parse_column::<LeaveType>("leave_requests.leave_type", &row.leave_type)?,
            start_date: row.start_date,
            end_date: row.end_date,
            reason: row.reason,
            status: parse_column::<LeaveStatus>("leave_requests.status", &row.status)?,
            applied_on: row.applied_on,
        })
    }
}

#[derive(FromRow)]
struct LeaveListingRow {
    #[sqlx(flatten)]
    leave: LeaveRow,
    employee: String,
}

#[derive(FromRow)]
struct MonthlyRow {
    employee_id: u64,
    employee: String,
    leaves_taken: i64,
    total_days: i64,
}

fn parse_column<T: FromStr>(column: &str, value: &str) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("{column} = {value:?}")))
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(&'static str),
    Date(NaiveDate),
}

fn bind_all<'q, O>(
    mut query: QueryAs<'q, MySql, O, MySqlArguments>,
    args: &[FilterValue],
) -> QueryAs<'q, MySql, O, MySqlArguments> {
    for arg in args {
        query = match arg {
            FilterValue::U64(v) => query.bind(*v),
            FilterValue::Str(s) => query.bind(*s),
            FilterValue::Date(d) => query.bind(*d),
        };
    }
    query
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/* =========================
Queries shared by pool and transaction
========================= */

async fn fetch_attendance<'e, E>(
    exec: E,
    employee_id: u64,
    date: NaiveDate,
    for_update: bool,
) -> Result<Option<AttendanceRecord>, StoreError>
where
    E: Executor<'e, Database = MySql>,
{
    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE employee_id = ? AND date = ?{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, AttendanceRow>(&sql)
        .bind(employee_id)
        .bind(date)
        .fetch_optional(exec)
        .await?
        .map(AttendanceRecord::try_from)
        .transpose()
}

async fn fetch_overlapping_leave<'e, E>(
    exec: E,
    employee_id: u64,
    range: DateRange,
    statuses: &[LeaveStatus],
    for_update: bool,
) -> Result<Option<LeaveRequest>, StoreError>
where
    E: Executor<'e, Database = MySql>,
{
    if statuses.is_empty() {
        return Ok(None);
    }
    let sql = format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests l \
         WHERE l.employee_id = ? AND l.status IN ({}) AND l.end_date >= ? AND l.start_date <= ? \
         ORDER BY l.start_date LIMIT 1{}",
        placeholders(statuses.len()),
        if for_update { " FOR UPDATE" } else { "" }
    );

    let mut args = vec![FilterValue::U64(employee_id)];
    args.extend(statuses.iter().map(|s| FilterValue::Str(status_str(*s))));
    args.push(FilterValue::Date(range.start));
    args.push(FilterValue::Date(range.end));

    bind_all(sqlx::query_as::<_, LeaveRow>(&sql), &args)
        .fetch_optional(exec)
        .await?
        .map(LeaveRequest::try_from)
        .transpose()
}

async fn fetch_leave<'e, E>(
    exec: E,
    leave_id: u64,
    for_update: bool,
) -> Result<Option<LeaveRequest>, StoreError>
where
    E: Executor<'e, Database = MySql>,
{
    let sql = format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests l WHERE l.id = ?{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, LeaveRow>(&sql)
        .bind(leave_id)
        .fetch_optional(exec)
        .await?
        .map(LeaveRequest::try_from)
        .transpose()
}

fn status_str(status: LeaveStatus) -> &'static str {
    match status {
        LeaveStatus::Pending => "Pending",
        LeaveStatus::Approved => "Approved",
        LeaveStatus::Rejected => "Rejected",
    }
}

/// MySQL-backed record store. Every call is bounded by the policy timeout;
/// standalone reads are retried within the policy budget.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    policy: StorePolicy,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool, policy: StorePolicy) -> Self {
        Self { pool, policy }
    }
}

impl RecordStore for MySqlStore {
    type Tx = MySqlTx;

    async fn begin(&self) -> Result<MySqlTx, StoreError> {
        let tx = self
            .policy
            .bounded("begin", async { Ok::<_, StoreError>(self.pool.begin().await?) })
            .await?;
        Ok(MySqlTx {
            tx,
            policy: self.policy,
        })
    }

    async fn find_attendance(
        &self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        self.policy
            .read("find_attendance", || {
                fetch_attendance(&self.pool, employee_id, date, false)
            })
            .await
    }

    async fn list_attendance(
        &self,
        employee_id: u64,
        bounds: DateBounds,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut where_sql = String::from(" WHERE employee_id = ?");
        let mut args = vec![FilterValue::U64(employee_id)];
        if let Some(from) = bounds.from {
            where_sql.push_str(" AND date >= ?");
            args.push(FilterValue::Date(from));
        }
        if let Some(to) = bounds.to {
            where_sql.push_str(" AND date <= ?");
            args.push(FilterValue::Date(to));
        }
        let sql =
            format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance{where_sql} ORDER BY date DESC LIMIT ?");
        debug!(sql = %sql, employee_id, limit, "Listing attendance");

        let rows = self
            .policy
            .read("list_attendance", || async {
                Ok::<_, StoreError>(bind_all(sqlx::query_as::<_, AttendanceRow>(&sql), &args)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?)
            })
            .await?;
        rows.into_iter().map(AttendanceRecord::try_from).collect()
    }

    async fn find_overlapping_leave(
        &self,
        employee_id: u64,
        range: DateRange,
        statuses: &[LeaveStatus],
    ) -> Result<Option<LeaveRequest>, StoreError> {
        self.policy
            .read("find_overlapping_leave", || {
                fetch_overlapping_leave(&self.pool, employee_id, range, statuses, false)
            })
            .await
    }

    async fn find_leave(&self, leave_id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        self.policy
            .read("find_leave", || fetch_leave(&self.pool, leave_id, false))
            .await
    }

    async fn list_employee_leaves(
        &self,
        employee_id: u64,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let sql = format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_requests l WHERE l.employee_id = ? \
             ORDER BY l.start_date DESC, l.id DESC"
        );
        let rows = self
            .policy
            .read("list_employee_leaves", || async {
                Ok::<_, StoreError>(sqlx::query_as::<_, LeaveRow>(&sql)
                    .bind(employee_id)
                    .fetch_all(&self.pool)
                    .await?)
            })
            .await?;
        rows.into_iter().map(LeaveRequest::try_from).collect()
    }

    async fn list_leaves(
        &self,
        query: &LeaveQuery,
    ) -> Result<(Vec<LeaveListing>, i64), StoreError> {
        // -------------------------
        // WHERE clause
        // -------------------------
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(emp_id) = query.employee_id {
            where_sql.push_str(" AND l.employee_id = ?");
            args.push(FilterValue::U64(emp_id));
        }

        if let Some(status) = query.status {
            where_sql.push_str(" AND l.status = ?");
            args.push(FilterValue::Str(status_str(status)));
        }

        let from_sql = format!(
            " FROM leave_requests l JOIN employees e ON e.id = l.employee_id{where_sql}"
        );

        // -------------------------
        // COUNT query
        // -------------------------
        let count_sql = format!("SELECT COUNT(*){from_sql}");
        let total = self
            .policy
            .read("count_leaves", || async {
                let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
                for arg in &args {
                    count_q = match arg {
                        FilterValue::U64(v) => count_q.bind(*v),
                        FilterValue::Str(s) => count_q.bind(*s),
                        FilterValue::Date(d) => count_q.bind(*d),
                    };
                }
                Ok::<_, StoreError>(count_q.fetch_one(&self.pool).await?)
            })
            .await?;

        // -------------------------
        // DATA query
        // -------------------------
        let data_sql = format!(
            "SELECT {LEAVE_COLUMNS}, {EMPLOYEE_NAME} AS employee{from_sql} \
             ORDER BY l.start_date DESC, l.id DESC LIMIT ? OFFSET ?"
        );
        debug!(sql = %data_sql, limit = query.limit, offset = query.offset, "Fetching leave list");

        let rows = self
            .policy
            .read("list_leaves", || async {
                Ok::<_, StoreError>(bind_all(sqlx::query_as::<_, LeaveListingRow>(&data_sql), &args)
                    .bind(query.limit)
                    .bind(query.offset)
                    .fetch_all(&self.pool)
                    .await?)
            })
            .await?;

        let listings = rows
            .into_iter()
            .map(|row| {
                Ok(LeaveListing {
                    leave: LeaveRequest::try_from(row.leave)?,
                    employee: row.employee,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok((listings, total))
    }

    async fn monthly_approved_leave_aggregates(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<MonthlyLeaveSummary>, StoreError> {
        // Day-spans are summed whole, even when a leave runs past month end.
        let sql = format!(
            "SELECT l.employee_id, {EMPLOYEE_NAME} AS employee, COUNT(l.id) AS leaves_taken, \
             CAST(COALESCE(SUM(DATEDIFF(l.end_date, l.start_date) + 1), 0) AS SIGNED) AS total_days \
             FROM leave_requests l JOIN employees e ON e.id = l.employee_id \
             WHERE l.status = ? AND YEAR(l.start_date) = ? AND MONTH(l.start_date) = ? \
             GROUP BY l.employee_id, e.first_name, e.last_name \
             ORDER BY l.employee_id"
        );
        let rows = self
            .policy
            .read("monthly_approved_leave_aggregates", || async {
                Ok::<_, StoreError>(sqlx::query_as::<_, MonthlyRow>(&sql)
                    .bind(status_str(LeaveStatus::Approved))
                    .bind(year)
                    .bind(month)
                    .fetch_all(&self.pool)
                    .await?)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| MonthlyLeaveSummary {
                employee_id: r.employee_id,
                employee: r.employee,
                leaves_taken: r.leaves_taken,
                total_days: r.total_days,
            })
            .collect())
    }
}

/// One InnoDB transaction. Precondition reads lock the rows they return, so
/// the later writes act on what was checked. Dropping it rolls back.
pub struct MySqlTx {
    tx: Transaction<'static, MySql>,
    policy: StorePolicy,
}

impl StoreTx for MySqlTx {
    async fn lock_employee(&mut self, employee_id: u64) -> Result<(), StoreError> {
        let tx = &mut self.tx;
        self.policy
            .bounded("lock_employee", async move {
                sqlx::query("SELECT id FROM employees WHERE id = ? FOR UPDATE")
                    .bind(employee_id)
                    .fetch_optional(&mut **tx)
                    .await?;
                Ok::<_, StoreError>(())
            })
            .await
    }

    async fn find_attendance(
        &mut self,
        employee_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        self.policy
            .bounded(
                "find_attendance",
                fetch_attendance(&mut *self.tx, employee_id, date, true),
            )
            .await
    }

    async fn upsert_attendance(
        &mut self,
        record: &AttendanceRecord,
    ) -> Result<AttendanceRecord, StoreError> {
        let tx = &mut self.tx;
        self.policy
            .bounded("upsert_attendance", async move {
                sqlx::query(
                    r#"
                    INSERT INTO attendance
                        (employee_id, date, login_time, logout_time, total_hours, status)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON DUPLICATE KEY UPDATE
                        login_time = VALUES(login_time),
                        logout_time = VALUES(logout_time),
                        total_hours = VALUES(total_hours),
                        status = VALUES(status)
                    "#,
                )
                .bind(record.employee_id)
                .bind(record.date)
                .bind(record.login_time)
                .bind(record.logout_time)
                .bind(&record.total_hours)
                .bind(record.status.as_ref())
                .execute(&mut **tx)
                .await?;

                fetch_attendance(&mut **tx, record.employee_id, record.date, false)
                    .await?
                    .ok_or(StoreError::Missing("attendance"))
            })
            .await
    }

    async fn find_overlapping_leave(
        &mut self,
        employee_id: u64,
        range: DateRange,
        statuses: &[LeaveStatus],
    ) -> Result<Option<LeaveRequest>, StoreError> {
        self.policy
            .bounded(
                "find_overlapping_leave",
                fetch_overlapping_leave(&mut *self.tx, employee_id, range, statuses, true),
            )
            .await
    }

    async fn insert_leave(&mut self, leave: &NewLeave) -> Result<LeaveRequest, StoreError> {
        let tx = &mut self.tx;
        self.policy
            .bounded("insert_leave", async move {
                let result = sqlx::query(
                    r#"
                    INSERT INTO leave_requests
                        (employee_id, leave_type, start_date, end_date, reason, status, applied_on)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(leave.employee_id)
                .bind(leave.leave_type.as_ref())
                .bind(leave.range.start)
                .bind(leave.range.end)
                .bind(leave.reason.as_deref())
                .bind(status_str(LeaveStatus::Pending))
                .bind(leave.applied_on)
                .execute(&mut **tx)
                .await?;

                fetch_leave(&mut **tx, result.last_insert_id(), false)
                    .await?
                    .ok_or(StoreError::Missing("leave_requests"))
            })
            .await
    }

    async fn find_leave(&mut self, leave_id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        self.policy
            .bounded("find_leave", fetch_leave(&mut *self.tx, leave_id, true))
            .await
    }

    async fn update_leave_status(
        &mut self,
        leave_id: u64,
        status: LeaveStatus,
        approver_id: u64,
    ) -> Result<LeaveRequest, StoreError> {
        let tx = &mut self.tx;
        self.policy
            .bounded("update_leave_status", async move {
                sqlx::query("UPDATE leave_requests SET status = ?, approved_by = ? WHERE id = ?")
                    .bind(status_str(status))
                    .bind(approver_id)
                    .bind(leave_id)
                    .execute(&mut **tx)
                    .await?;

                fetch_leave(&mut **tx, leave_id, false)
                    .await?
                    .ok_or(StoreError::Missing("leave_requests"))
            })
            .await
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MySqlTx { tx, policy } = self;
        policy
            .bounded("commit", async move { Ok::<_, StoreError>(tx.commit().await?) })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttendanceStatus;

    #[test]
    fn placeholders_match_status_count() {
        assert_eq!(placeholders(2), "?, ?");
        assert_eq!(placeholders(1), "?");
    }

    #[test]
    fn corrupt_status_is_reported_with_column() {
        let row = AttendanceRow {
            id: 1,
            employee_id: 2,
            date: NaiveDate::from_ymd_opt(2025, 10, 9).unwrap(),
            login_time: None,
            logout_time: None,
            total_hours: "0h 0m".into(),
            status: "Sleeping".into(),
        };

        let err = AttendanceRecord::try_from(row).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(msg) if msg.contains("attendance.status")));
    }

    #[test]
    fn stored_status_strings_parse_back() {
        for status in LeaveStatus::BLOCKING {
            assert_eq!(status_str(status).parse::<LeaveStatus>().unwrap(), status);
        }
        assert_eq!(
            AttendanceStatus::OnLeave.as_ref().parse::<AttendanceStatus>().unwrap(),
            AttendanceStatus::OnLeave
        );
    }
}
