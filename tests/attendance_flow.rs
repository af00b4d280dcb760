use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use worktrack::error::AppError;
use worktrack::model::{
    AttendanceStatus, DateBounds, EmployeeRef, LeaveApplication, LeaveStatus, LeaveType, Role,
};
use worktrack::service::{Actor, AttendanceService, LeaveService};
use worktrack::store::MemoryStore;

const EMPLOYEE: u64 = 1;
const ADMIN: Actor = Actor {
    employee_id: Some(99),
    role: Role::Admin,
};

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, day).unwrap()
}

fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, day, h, m, s).unwrap()
}

async fn setup() -> (
    Arc<MemoryStore>,
    AttendanceService<MemoryStore>,
    LeaveService<MemoryStore>,
) {
    let store = Arc::new(MemoryStore::new());
    store
        .add_employee(EmployeeRef::new(EMPLOYEE, "Grace", Some("Hopper")))
        .await;
    store.add_employee(EmployeeRef::new(99, "Ada", None)).await;
    (
        Arc::clone(&store),
        AttendanceService::new(Arc::clone(&store)),
        LeaveService::new(store),
    )
}

fn october_leave() -> LeaveApplication {
    LeaveApplication {
        leave_type: LeaveType::Annual,
        start_date: d(10),
        end_date: d(12),
        reason: Some("family trip".into()),
    }
}

#[tokio::test]
async fn rejected_leave_turns_leave_days_absent_and_is_not_summarised() {
    let (store, attendance, leave) = setup().await;

    let request = leave.apply(EMPLOYEE, october_leave(), at(1, 8, 0, 0)).await.unwrap();

    for day in 10..=12 {
        let today = attendance.today(EMPLOYEE, at(day, 12, 0, 0)).await.unwrap();
        assert_eq!(today.status, AttendanceStatus::OnLeave);
        assert_ne!(today.id, 0, "leave days are stored, not projected");
        assert_eq!(today.login_time, None);
        assert_eq!(today.logout_time, None);
        assert_eq!(today.total_hours, "0h 0m");
    }

    let decided = leave.decide(request.id, &ADMIN, "reject").await.unwrap();
    assert_eq!(decided.status, LeaveStatus::Rejected);
    assert_eq!(decided.approved_by, Some(99));

    let rows = store.attendance_of(EMPLOYEE).await;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.status == AttendanceStatus::Absent));

    let summary = leave.monthly_summary(&ADMIN, 2025, 10).await.unwrap();
    assert!(summary.iter().all(|s| s.employee_id != EMPLOYEE));
}

#[tokio::test]
async fn approved_leave_is_summarised_and_blocks_punches() {
    let (_, attendance, leave) = setup().await;
    let request = leave.apply(EMPLOYEE, october_leave(), at(1, 8, 0, 0)).await.unwrap();
    leave.decide(request.id, &ADMIN, "approve").await.unwrap();

    assert!(matches!(
        attendance.punch_in(EMPLOYEE, at(11, 9, 0, 0)).await.unwrap_err(),
        AppError::AlreadyOnLeave
    ));

    let summary = leave.monthly_summary(&ADMIN, 2025, 10).await.unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].employee, "Grace Hopper");
    assert_eq!(summary[0].leaves_taken, 1);
    assert_eq!(summary[0].total_days, 3);
}

#[tokio::test]
async fn a_working_day_then_a_rejected_leave_day() {
    let (_, attendance, leave) = setup().await;

    attendance.punch_in(EMPLOYEE, at(9, 9, 0, 0)).await.unwrap();
    let out = attendance.punch_out(EMPLOYEE, at(9, 17, 30, 45)).await.unwrap();
    assert_eq!(out.total_hours, "8h 30m");

    let request = leave.apply(EMPLOYEE, october_leave(), at(9, 18, 0, 0)).await.unwrap();
    leave.decide(request.id, &ADMIN, "reject").await.unwrap();

    // The absence left by the rejection can still be worked.
    let back = attendance.punch_in(EMPLOYEE, at(10, 9, 15, 0)).await.unwrap();
    assert_eq!(back.status, AttendanceStatus::Present);

    let history = attendance
        .summary(EMPLOYEE, DateBounds::default(), None)
        .await
        .unwrap();
    let days: Vec<_> = history.iter().map(|r| (r.date, r.status)).collect();
    assert_eq!(
        days,
        vec![
            (d(12), AttendanceStatus::Absent),
            (d(11), AttendanceStatus::Absent),
            (d(10), AttendanceStatus::Present),
            (d(9), AttendanceStatus::Present),
        ]
    );
}

#[tokio::test]
async fn one_row_per_employee_day_across_mixed_operations() {
    let (store, attendance, leave) = setup().await;

    attendance.punch_in(EMPLOYEE, at(10, 9, 0, 0)).await.unwrap();
    let _ = attendance.punch_in(EMPLOYEE, at(10, 9, 1, 0)).await;
    let request = leave.apply(EMPLOYEE, october_leave(), at(10, 10, 0, 0)).await.unwrap();
    let _ = leave.apply(EMPLOYEE, october_leave(), at(10, 10, 1, 0)).await;
    leave.decide(request.id, &ADMIN, "reject").await.unwrap();
    let again = leave.apply(EMPLOYEE, october_leave(), at(10, 11, 0, 0)).await.unwrap();
    leave.decide(again.id, &ADMIN, "approve").await.unwrap();

    let rows = store.attendance_of(EMPLOYEE).await;
    let mut dates: Vec<_> = rows.iter().map(|r| r.date).collect();
    dates.dedup();
    assert_eq!(dates.len(), rows.len());
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.status == AttendanceStatus::OnLeave));
}
